use rand::prelude::*;

use dslab_power_placement::core::allocation_policy::PowerVmAllocationPolicy;
use dslab_power_placement::core::errors::PlacementError;
use dslab_power_placement::core::host::{Host, PeAllocation, PowerHost};
use dslab_power_placement::core::host_selector::HostSelector;
use dslab_power_placement::core::load_model::ConstLoadModel;
use dslab_power_placement::core::power_model::{ConstantPowerModel, LinearPowerModel};
use dslab_power_placement::core::vm::VirtualMachine;
use dslab_power_placement::core::what_if::{max_utilization_after_allocation, power_after_allocation};

fn host(id: u32, pes: Vec<f64>) -> Box<dyn Host> {
    Box::new(PowerHost::new(
        id,
        pes,
        4096,
        10000,
        Box::new(LinearPowerModel::new_with_idle_power(1., 0.4)),
    ))
}

// VM with one vCPU which already reported its utilization, so it requests `mips * load`.
fn vm(id: u32, mips: f64, load: f64) -> VirtualMachine {
    let mut vm = VirtualMachine::new(
        id,
        0,
        mips,
        1,
        512,
        100,
        0.,
        Box::new(ConstLoadModel::new(load)),
        Box::new(ConstLoadModel::new(1.)),
    );
    vm.update_utilization(1.);
    vm
}

#[derive(Debug, PartialEq)]
struct HostFingerprint {
    vms: Vec<String>,
    used_mips: f64,
    max_available_mips: f64,
    power: f64,
    available_ram: u64,
    available_bw: u64,
    allocations: Vec<Option<PeAllocation>>,
}

fn fingerprint(hosts: &[Box<dyn Host>], vms: &[VirtualMachine]) -> Vec<HostFingerprint> {
    hosts
        .iter()
        .map(|h| HostFingerprint {
            vms: h.vm_uids(),
            used_mips: h.get_used_mips(),
            max_available_mips: h.get_max_available_mips(),
            power: h.get_power(),
            available_ram: h.get_available_ram(),
            available_bw: h.get_available_bw(),
            allocations: vms.iter().map(|vm| h.get_allocated_mips_for_vm(vm)).collect(),
        })
        .collect()
}

fn random_inventory(rng: &mut StdRng, host_count: u32) -> Vec<Box<dyn Host>> {
    (0..host_count)
        .map(|id| {
            let pes = (0..rng.gen_range(1..4)).map(|_| rng.gen_range(500.0..2000.0)).collect();
            host(id, pes)
        })
        .collect()
}

fn random_fleet(rng: &mut StdRng, vm_count: u32) -> Vec<VirtualMachine> {
    (0..vm_count)
        .map(|id| vm(id, rng.gen_range(100.0..1500.0), rng.gen_range(0.1..1.0)))
        .collect()
}

#[test]
// What-if queries must leave every host exactly as it was, including the host the VM already resides on.
fn test_what_if_leaves_hosts_unchanged() {
    let mut rng = StdRng::seed_from_u64(123);
    for _ in 0..20 {
        let mut hosts = random_inventory(&mut rng, 5);
        let mut vms = random_fleet(&mut rng, 12);
        for vm in vms.iter_mut() {
            let target = rng.gen_range(0..hosts.len());
            if hosts[target].is_suitable_for_vm(vm) {
                hosts[target].vm_create(vm);
            }
        }

        for vm in vms.iter() {
            for target in 0..hosts.len() {
                let before = fingerprint(&hosts, &vms);
                power_after_allocation(&mut hosts, target, vm);
                assert_eq!(fingerprint(&hosts, &vms), before);
                max_utilization_after_allocation(&mut hosts, target, vm);
                assert_eq!(fingerprint(&hosts, &vms), before);
            }
        }
    }
}

#[test]
fn test_what_if_infeasible_allocation() {
    let mut hosts = vec![host(0, vec![1000.])];
    let big = vm(0, 1500., 1.);
    assert_eq!(power_after_allocation(&mut hosts, 0, &big), None);
    assert_eq!(max_utilization_after_allocation(&mut hosts, 0, &big), f64::MAX);
    assert_eq!(hosts[0].get_used_mips(), 0.);
}

#[test]
// Evaluating a VM against its own host replaces its reservation instead of adding a second one.
fn test_what_if_on_current_host() {
    let mut hosts = vec![host(0, vec![1000.])];
    let mut placed = vm(0, 400., 1.);
    assert!(hosts[0].vm_create(&mut placed));
    let power = hosts[0].get_power();

    assert_eq!(power_after_allocation(&mut hosts, 0, &placed), Some(power));
    assert_eq!(max_utilization_after_allocation(&mut hosts, 0, &placed), 0.4);
    assert_eq!(hosts[0].get_power(), power);
    assert_eq!(hosts[0].get_allocated_mips_for_vm(&placed).unwrap().mips(), vec![400.]);
}

#[test]
// New share goes to the PE with the most free capacity, so only the load of that PE matters.
fn test_max_utilization_among_vm_pes() {
    let mut hosts = vec![host(0, vec![1000., 1000.])];
    let mut placed = vm(0, 600., 1.);
    assert!(hosts[0].vm_create(&mut placed));

    let small = vm(1, 300., 1.);
    assert_eq!(max_utilization_after_allocation(&mut hosts, 0, &small), 0.3);

    let large = vm(2, 500., 1.);
    assert_eq!(max_utilization_after_allocation(&mut hosts, 0, &large), 0.5);

    // does not fit into any single PE although the host has enough free MIPS in total
    let wide = vm(3, 1100., 1.);
    assert!(!hosts[0].is_suitable_for_vm(&wide));
    assert_eq!(max_utilization_after_allocation(&mut hosts, 0, &wide), f64::MAX);
}

#[test]
// Selected host never exceeds the threshold, has the least power increase,
// and no host is selected only if none qualifies.
fn test_select_host_properties() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..50 {
        let threshold = rng.gen_range(0.3..1.0);
        let selector = HostSelector::new(threshold);
        let mut hosts = random_inventory(&mut rng, 4);
        let mut vms = random_fleet(&mut rng, 6);
        for vm in vms.iter_mut() {
            let target = rng.gen_range(0..hosts.len());
            if hosts[target].is_suitable_for_vm(vm) {
                hosts[target].vm_create(vm);
            }
        }
        let new_vm = vm(100, rng.gen_range(100.0..1500.0), rng.gen_range(0.1..1.0));

        let mut qualifying = Vec::new();
        for idx in 0..hosts.len() {
            if !hosts[idx].is_suitable_for_vm(&new_vm) {
                continue;
            }
            if max_utilization_after_allocation(&mut hosts, idx, &new_vm) > threshold {
                continue;
            }
            let power_before = hosts[idx].get_power();
            let power_after = power_after_allocation(&mut hosts, idx, &new_vm).unwrap();
            qualifying.push((idx, power_after - power_before));
        }

        match selector.select_host(&new_vm, &mut hosts) {
            Some(selected) => {
                assert!(max_utilization_after_allocation(&mut hosts, selected, &new_vm) <= threshold);
                let selected_diff = qualifying.iter().find(|(idx, _)| *idx == selected).unwrap().1;
                for (idx, diff) in qualifying.iter() {
                    assert!(*diff >= selected_diff);
                    if *diff == selected_diff {
                        assert!(*idx >= selected);
                    }
                }
            }
            None => assert!(qualifying.is_empty()),
        }
    }
}

#[test]
fn test_select_host_first_wins_on_tie() {
    let selector = HostSelector::new(0.8);
    let mut hosts = vec![host(0, vec![1000.]), host(1, vec![1000.])];
    assert_eq!(selector.select_host(&vm(0, 500., 1.), &mut hosts), Some(0));
}

#[test]
// Linear model with zero power of an idle host: adding 200 MIPS to the loaded host costs 0.12,
// while switching on the empty one costs 0.52.
fn test_select_host_with_least_power_increase() {
    let selector = HostSelector::new(0.8);
    let mut hosts = vec![host(0, vec![1000.]), host(1, vec![1000.])];
    let mut running = vm(0, 500., 1.);
    assert!(hosts[1].vm_create(&mut running));

    assert_eq!(selector.select_host(&vm(1, 200., 1.), &mut hosts), Some(1));
    // 400 MIPS more would bring host 1 to 0.9
    assert_eq!(selector.select_host(&vm(2, 400., 1.), &mut hosts), Some(0));
}

#[test]
// Placed VM whose demand has dropped releases power on its own host, which beats a host with no power increase.
fn test_select_own_host_with_power_decrease() {
    let constant: Box<dyn Host> = Box::new(PowerHost::new(
        0,
        vec![1000.],
        4096,
        10000,
        Box::new(ConstantPowerModel::new(0.5)),
    ));
    let mut policy = PowerVmAllocationPolicy::new(vec![constant, host(1, vec![1000.])], 0.8).unwrap();
    let mut placed = VirtualMachine::new(
        0,
        0,
        500.,
        1,
        512,
        100,
        0.,
        Box::new(ConstLoadModel::new(0.5)),
        Box::new(ConstLoadModel::new(1.)),
    );
    assert!(policy.allocate_host_for_vm_on(&mut placed, 1));
    placed.update_utilization(1.);

    assert_eq!(policy.find_host_for_vm(&placed), Some(1));
    assert_eq!(policy.host(1).unwrap().get_used_mips(), 500.);
}

#[test]
fn test_allocate_and_deallocate() {
    let hosts = vec![host(0, vec![1000.]), host(1, vec![1000.])];
    let mut policy = PowerVmAllocationPolicy::new(hosts, 0.8).unwrap();
    let mut first = vm(0, 500., 1.);

    assert!(policy.allocate_host_for_vm(&mut first));
    assert_eq!(policy.get_host(&first), Some(0));
    assert_eq!(policy.get_host_by_ids(0, 0), Some(0));
    assert_eq!(first.host(), Some(0));
    assert_eq!(policy.host(0).unwrap().vm_uids(), vec!["0-0".to_string()]);

    policy.deallocate_host_for_vm(&mut first);
    assert_eq!(policy.get_host(&first), None);
    assert_eq!(first.host(), None);
    assert!(policy.host(0).unwrap().vm_uids().is_empty());
    assert_eq!(policy.host(0).unwrap().get_used_mips(), 0.);
}

#[test]
fn test_no_suitable_host() {
    let hosts = vec![host(0, vec![1000.]), host(1, vec![800.])];
    let mut policy = PowerVmAllocationPolicy::new(hosts, 0.8).unwrap();

    // fits into host 0 but exceeds the threshold
    let mut loaded = vm(0, 900., 1.);
    assert_eq!(policy.find_host_for_vm(&loaded), None);
    assert!(!policy.allocate_host_for_vm(&mut loaded));
    assert_eq!(policy.get_host(&loaded), None);

    assert!(policy.set_utilization_threshold(1.).is_ok());
    assert_eq!(policy.find_host_for_vm(&loaded), Some(0));
}

#[test]
fn test_policy_settings() {
    let hosts = vec![host(0, vec![1000.]), host(1, vec![1000.])];
    let mut policy = PowerVmAllocationPolicy::new(hosts, 0.8).unwrap();
    assert_eq!(policy.policy_desc(), "ST0.80");
    assert!(matches!(
        policy.set_utilization_threshold(-0.5),
        Err(PlacementError::InvalidThreshold(_))
    ));
    assert_eq!(policy.utilization_threshold(), 0.8);

    let duplicated = vec![host(3, vec![1000.]), host(3, vec![1000.])];
    assert!(matches!(
        PowerVmAllocationPolicy::new(duplicated, 0.8),
        Err(PlacementError::DuplicateHost(3))
    ));
}

#[test]
// Recently created VM requests its full capacity regardless of the load model.
fn test_recently_created_vm_demand() {
    let mut fresh = VirtualMachine::new(
        0,
        0,
        1000.,
        2,
        512,
        100,
        0.,
        Box::new(ConstLoadModel::new(0.3)),
        Box::new(ConstLoadModel::new(1.)),
    );
    assert!(fresh.is_recently_created());
    assert_eq!(fresh.current_requested_mips(), vec![1000., 1000.]);

    fresh.update_utilization(5.);
    assert!(!fresh.is_recently_created());
    assert_eq!(fresh.current_requested_mips(), vec![300., 300.]);
    assert_eq!(fresh.total_utilization_of_cpu_mips(), 600.);
}
