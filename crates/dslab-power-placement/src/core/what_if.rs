//! What-if evaluation of a VM placement.
//!
//! Both queries place the current demand of the VM on the target host, read the metric and undo the placement,
//! so that the host inventory is left exactly as it was before the call.

use crate::core::host::Host;
use crate::core::vm::VirtualMachine;

/// Runs `metric` on the target host while the VM is trial-allocated there.
///
/// Returns `None` if the trial allocation does not fit.
fn with_trial_allocation<T>(
    hosts: &mut [Box<dyn Host>],
    target: usize,
    vm: &VirtualMachine,
    metric: impl FnOnce(&dyn Host) -> T,
) -> Option<T> {
    // the reservation on the current host is overwritten if it is the target itself
    let prior = vm.host().and_then(|host_id| {
        let idx = hosts.iter().position(|h| h.id() == host_id)?;
        hosts[idx].get_allocated_mips_for_vm(vm).map(|allocation| (idx, allocation))
    });

    if !hosts[target].allocate_pes_for_vm(vm, &vm.current_requested_mips()) {
        return None;
    }
    let value = metric(hosts[target].as_ref());
    hosts[target].deallocate_pes_for_vm(vm);

    if let Some((idx, allocation)) = prior {
        hosts[idx].restore_pes_for_vm(vm, allocation);
    }
    Some(value)
}

/// Returns the power consumption of the target host with the VM placed on it,
/// or `None` if the VM does not fit.
pub fn power_after_allocation(hosts: &mut [Box<dyn Host>], target: usize, vm: &VirtualMachine) -> Option<f64> {
    with_trial_allocation(hosts, target, vm, |host| host.get_power())
}

/// Returns the highest utilization among the target host PEs used by the VM once it is placed there,
/// or `f64::MAX` if the VM does not fit.
pub fn max_utilization_after_allocation(hosts: &mut [Box<dyn Host>], target: usize, vm: &VirtualMachine) -> f64 {
    with_trial_allocation(hosts, target, vm, |host| host.get_max_utilization_among_vms_pes(vm)).unwrap_or(f64::MAX)
}
