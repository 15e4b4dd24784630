//! Physical hosts and their capacity ledgers.

use std::collections::{BTreeMap, BTreeSet};

use crate::core::common::AllocationVerdict;
use crate::core::power_model::PowerModel;
use crate::core::vm::VirtualMachine;

/// Part of VM CPU reservation placed on a single processing element (PE) of a host.
#[derive(Clone, Debug, PartialEq)]
pub struct PeShare {
    pub pe: usize,
    pub mips: f64,
}

/// CPU reservation of a VM on a host, one share per requested vCPU.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct PeAllocation {
    shares: Vec<PeShare>,
}

impl PeAllocation {
    pub fn new(shares: Vec<PeShare>) -> Self {
        Self { shares }
    }

    pub fn shares(&self) -> &[PeShare] {
        &self.shares
    }

    /// Returns requested MIPS per vCPU in the original order.
    pub fn mips(&self) -> Vec<f64> {
        self.shares.iter().map(|s| s.mips).collect()
    }

    pub fn total_mips(&self) -> f64 {
        self.shares.iter().map(|s| s.mips).sum()
    }
}

/// Capabilities of a physical host used by the placement policy.
///
/// Host state queries (power, per-PE utilization) must always reflect the current set of reservations, since
/// the policy reads them right after a trial allocation. Capacity failures are reported via return values.
pub trait Host {
    fn id(&self) -> u32;

    /// Checks whether the host has enough free resources to run the VM with its current demand.
    fn is_suitable_for_vm(&self, vm: &VirtualMachine) -> bool;

    /// Reserves CPU for the VM, replacing its existing reservation on this host if any.
    /// Returns `false` and leaves the host unchanged if the shares do not fit.
    fn allocate_pes_for_vm(&mut self, vm: &VirtualMachine, mips_share: &[f64]) -> bool;

    /// Releases CPU reserved for the VM.
    fn deallocate_pes_for_vm(&mut self, vm: &VirtualMachine);

    /// Returns the current CPU reservation of the VM on this host.
    fn get_allocated_mips_for_vm(&self, vm: &VirtualMachine) -> Option<PeAllocation>;

    /// Puts back a reservation previously returned by [`Host::get_allocated_mips_for_vm`] exactly as it was.
    fn restore_pes_for_vm(&mut self, vm: &VirtualMachine, allocation: PeAllocation);

    /// Returns the current power consumption in W.
    fn get_power(&self) -> f64;

    /// Returns the highest utilization among the PEs holding a share of the VM, or zero if there are none.
    fn get_max_utilization_among_vms_pes(&self, vm: &VirtualMachine) -> f64;

    /// Creates VM on the host reserving memory, bandwidth and CPU. Either everything is reserved or nothing.
    ///
    /// Calling it for a VM which already runs on the host refreshes its reservation with the current demand.
    fn vm_create(&mut self, vm: &mut VirtualMachine) -> bool;

    /// Creates VM on the host with exactly the given CPU reservation, as returned earlier by
    /// [`Host::get_allocated_mips_for_vm`]. Memory and bandwidth are reserved for the VM demand.
    fn vm_restore(&mut self, vm: &mut VirtualMachine, allocation: PeAllocation) -> bool;

    fn vm_destroy(&mut self, vm: &mut VirtualMachine);

    /// Releases all reservations of the VMs created on the host. Reservations of VMs migrating in are kept.
    /// Host references of the VMs are left to their owner.
    fn vm_destroy_all(&mut self);

    /// Reserves resources for a VM which is being migrated to this host.
    fn add_migrating_in_vm(&mut self, vm: &VirtualMachine) -> bool;

    fn remove_migrating_in_vm(&mut self, vm: &VirtualMachine);

    /// Reserves resources for the VMs migrating to this host which have no reservation.
    fn reallocate_migrating_vms(&mut self);

    fn get_total_mips(&self) -> f64;

    fn get_available_mips(&self) -> f64;

    /// Returns the largest free capacity of a single PE.
    fn get_max_available_mips(&self) -> f64;

    fn get_ram(&self) -> u64;

    fn get_available_ram(&self) -> u64;

    fn get_bw(&self) -> u64;

    fn get_available_bw(&self) -> u64;

    /// Returns keys of VMs created on the host.
    fn vm_uids(&self) -> Vec<String>;

    /// Returns keys of VMs migrating to the host.
    fn migrating_in_vm_uids(&self) -> Vec<String>;

    fn get_used_mips(&self) -> f64 {
        self.get_total_mips() - self.get_available_mips()
    }

    fn get_utilization_of_cpu(&self) -> f64 {
        self.get_used_mips() / self.get_total_mips()
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Host with a set of PEs of fixed capacity, memory, bandwidth and a power model.
///
/// Per-PE load is always derived from the stored reservations, so releasing a reservation and putting it back
/// restores exactly the same state.
#[derive(Clone)]
pub struct PowerHost {
    id: u32,
    pes: Vec<f64>,
    ram: u64,
    bw: u64,
    power_model: Box<dyn PowerModel>,
    pe_allocations: BTreeMap<String, PeAllocation>,
    ram_allocations: BTreeMap<String, u64>,
    bw_allocations: BTreeMap<String, u64>,
    vms: BTreeSet<String>,
    vms_migrating_in: BTreeMap<String, VirtualMachine>,
}

impl PowerHost {
    /// Creates host with the specified capacity of each PE (in MIPS), memory and bandwidth.
    pub fn new(id: u32, pes: Vec<f64>, ram: u64, bw: u64, power_model: Box<dyn PowerModel>) -> Self {
        Self {
            id,
            pes,
            ram,
            bw,
            power_model,
            pe_allocations: BTreeMap::new(),
            ram_allocations: BTreeMap::new(),
            bw_allocations: BTreeMap::new(),
            vms: BTreeSet::new(),
            vms_migrating_in: BTreeMap::new(),
        }
    }

    /// Checks if the VM with its current demand fits into the free resources of the host.
    pub fn can_allocate(&self, vm: &VirtualMachine) -> AllocationVerdict {
        let max_pe = self.pes.iter().cloned().fold(0., f64::max);
        if max_pe < vm.current_requested_max_mips() || self.get_available_mips() < vm.current_requested_total_mips() {
            return AllocationVerdict::NotEnoughCPU;
        }
        if self.get_available_ram() < vm.current_requested_ram() {
            return AllocationVerdict::NotEnoughMemory;
        }
        if self.get_available_bw() < vm.current_requested_bw() {
            return AllocationVerdict::NotEnoughBandwidth;
        }
        AllocationVerdict::Success
    }

    /// Returns the load of each PE, optionally ignoring the reservation of one VM.
    fn pe_loads(&self, exclude: Option<&str>) -> Vec<f64> {
        let mut loads = vec![0.; self.pes.len()];
        for (uid, allocation) in self.pe_allocations.iter() {
            if Some(uid.as_str()) == exclude {
                continue;
            }
            for share in allocation.shares() {
                loads[share.pe] += share.mips;
            }
        }
        loads
    }

    /// Maps each requested share to the PE with the most free capacity (the first one on ties).
    ///
    /// With `oversubscribe` a share which does not fit gets the free capacity left on its PE instead of failing.
    fn map_shares(&self, uid: &str, mips_share: &[f64], oversubscribe: bool) -> Option<PeAllocation> {
        let mut loads = self.pe_loads(Some(uid));
        let mut shares = Vec::with_capacity(mips_share.len());
        for &mips in mips_share {
            let mut best: Option<(usize, f64)> = None;
            for (pe, capacity) in self.pes.iter().enumerate() {
                let free = capacity - loads[pe];
                if best.map_or(true, |(_, best_free)| free > best_free) {
                    best = Some((pe, free));
                }
            }
            let (pe, free) = best?;
            let mips = if free >= mips {
                mips
            } else if oversubscribe {
                free.max(0.)
            } else {
                return None;
            };
            loads[pe] += mips;
            shares.push(PeShare { pe, mips });
        }
        Some(PeAllocation::new(shares))
    }

    fn free_ram_for(&self, uid: &str) -> u64 {
        let used: u64 = self.ram_allocations.iter().filter(|(k, _)| *k != uid).map(|(_, v)| v).sum();
        self.ram.saturating_sub(used)
    }

    fn free_bw_for(&self, uid: &str) -> u64 {
        let used: u64 = self.bw_allocations.iter().filter(|(k, _)| *k != uid).map(|(_, v)| v).sum();
        self.bw.saturating_sub(used)
    }

    fn fits_ram_and_bw(&self, uid: &str, vm: &VirtualMachine) -> bool {
        self.free_ram_for(uid) >= vm.current_requested_ram() && self.free_bw_for(uid) >= vm.current_requested_bw()
    }

    /// Reserves memory, bandwidth and CPU for the current demand of the VM.
    ///
    /// Memory and bandwidth are reserved strictly, CPU is over-subscribed if the demand exceeds free capacity.
    fn reserve(&mut self, vm: &VirtualMachine) -> bool {
        let uid = vm.uid();
        if !self.fits_ram_and_bw(&uid, vm) {
            return false;
        }
        let allocation = match self.map_shares(&uid, &vm.current_requested_mips(), true) {
            Some(allocation) => allocation,
            None => return false,
        };
        self.ram_allocations.insert(uid.clone(), vm.current_requested_ram());
        self.bw_allocations.insert(uid.clone(), vm.current_requested_bw());
        self.pe_allocations.insert(uid, allocation);
        true
    }

    fn release(&mut self, uid: &str) {
        self.pe_allocations.remove(uid);
        self.ram_allocations.remove(uid);
        self.bw_allocations.remove(uid);
    }
}

impl Host for PowerHost {
    fn id(&self) -> u32 {
        self.id
    }

    fn is_suitable_for_vm(&self, vm: &VirtualMachine) -> bool {
        self.can_allocate(vm) == AllocationVerdict::Success
    }

    fn allocate_pes_for_vm(&mut self, vm: &VirtualMachine, mips_share: &[f64]) -> bool {
        let uid = vm.uid();
        match self.map_shares(&uid, mips_share, false) {
            Some(allocation) => {
                self.pe_allocations.insert(uid, allocation);
                true
            }
            None => false,
        }
    }

    fn deallocate_pes_for_vm(&mut self, vm: &VirtualMachine) {
        self.pe_allocations.remove(&vm.uid());
    }

    fn get_allocated_mips_for_vm(&self, vm: &VirtualMachine) -> Option<PeAllocation> {
        self.pe_allocations.get(&vm.uid()).cloned()
    }

    fn restore_pes_for_vm(&mut self, vm: &VirtualMachine, allocation: PeAllocation) {
        self.pe_allocations.insert(vm.uid(), allocation);
    }

    fn get_power(&self) -> f64 {
        self.power_model.get_power(self.get_utilization_of_cpu())
    }

    fn get_max_utilization_among_vms_pes(&self, vm: &VirtualMachine) -> f64 {
        let allocation = match self.pe_allocations.get(&vm.uid()) {
            Some(allocation) => allocation,
            None => return 0.,
        };
        let loads = self.pe_loads(None);
        allocation
            .shares()
            .iter()
            .map(|share| loads[share.pe] / self.pes[share.pe])
            .fold(0., f64::max)
    }

    fn vm_create(&mut self, vm: &mut VirtualMachine) -> bool {
        if !self.reserve(vm) {
            return false;
        }
        self.vms.insert(vm.uid());
        vm.set_host(Some(self.id));
        true
    }

    fn vm_restore(&mut self, vm: &mut VirtualMachine, allocation: PeAllocation) -> bool {
        let uid = vm.uid();
        if !self.fits_ram_and_bw(&uid, vm) || allocation.shares().iter().any(|s| s.pe >= self.pes.len()) {
            return false;
        }
        self.ram_allocations.insert(uid.clone(), vm.current_requested_ram());
        self.bw_allocations.insert(uid.clone(), vm.current_requested_bw());
        self.pe_allocations.insert(uid.clone(), allocation);
        self.vms.insert(uid);
        vm.set_host(Some(self.id));
        true
    }

    fn vm_destroy(&mut self, vm: &mut VirtualMachine) {
        let uid = vm.uid();
        if self.vms.remove(&uid) {
            self.release(&uid);
        }
        if vm.host() == Some(self.id) {
            vm.set_host(None);
        }
    }

    fn vm_destroy_all(&mut self) {
        for uid in std::mem::take(&mut self.vms).iter() {
            self.release(uid);
        }
    }

    fn add_migrating_in_vm(&mut self, vm: &VirtualMachine) -> bool {
        let uid = vm.uid();
        if self.vms_migrating_in.contains_key(&uid) {
            return true;
        }
        if !self.reserve(vm) {
            return false;
        }
        self.vms_migrating_in.insert(uid, vm.clone());
        true
    }

    fn remove_migrating_in_vm(&mut self, vm: &VirtualMachine) {
        let uid = vm.uid();
        if self.vms_migrating_in.remove(&uid).is_some() && !self.vms.contains(&uid) {
            self.release(&uid);
        }
    }

    fn reallocate_migrating_vms(&mut self) {
        let migrating: Vec<VirtualMachine> = self
            .vms_migrating_in
            .iter()
            .filter(|(uid, _)| !self.pe_allocations.contains_key(*uid))
            .map(|(_, vm)| vm.clone())
            .collect();
        for vm in migrating.iter() {
            if !self.reserve(vm) {
                log::warn!("host {} can't reserve resources for migrating {}", self.id, vm);
            }
        }
    }

    fn get_total_mips(&self) -> f64 {
        self.pes.iter().sum()
    }

    fn get_available_mips(&self) -> f64 {
        self.get_total_mips() - self.get_used_mips()
    }

    fn get_used_mips(&self) -> f64 {
        self.pe_loads(None).iter().sum()
    }

    fn get_max_available_mips(&self) -> f64 {
        let loads = self.pe_loads(None);
        self.pes
            .iter()
            .zip(loads.iter())
            .map(|(capacity, load)| capacity - load)
            .fold(0., f64::max)
    }

    fn get_ram(&self) -> u64 {
        self.ram
    }

    fn get_available_ram(&self) -> u64 {
        self.ram.saturating_sub(self.ram_allocations.values().sum())
    }

    fn get_bw(&self) -> u64 {
        self.bw
    }

    fn get_available_bw(&self) -> u64 {
        self.bw.saturating_sub(self.bw_allocations.values().sum())
    }

    fn vm_uids(&self) -> Vec<String> {
        self.vms.iter().cloned().collect()
    }

    fn migrating_in_vm_uids(&self) -> Vec<String> {
        self.vms_migrating_in.keys().cloned().collect()
    }
}
