//! Power-aware VM allocation policy with a single utilization threshold.

use std::fs::File;

use log::{debug, info, warn};

use crate::core::allocation_table::AllocationTable;
use crate::core::config::PlannerConfig;
use crate::core::errors::PlacementError;
use crate::core::host::Host;
use crate::core::host_selector::HostSelector;
use crate::core::snapshot::VmUtilizationRecord;
use crate::core::vm::VirtualMachine;

/// Places VMs on the hosts with the least power increase and plans migrations keeping the utilization of every
/// host PE under the threshold.
///
/// The policy owns the host inventory for its whole lifetime. Hosts are never added or removed, their order
/// defines the order of the host scan.
pub struct PowerVmAllocationPolicy {
    pub(crate) hosts: Vec<Box<dyn Host>>,
    pub(crate) vm_table: AllocationTable,
    pub(crate) selector: HostSelector,
    pub(crate) utilization_log: Vec<VmUtilizationRecord>,
}

fn check_threshold(utilization_threshold: f64) -> Result<(), PlacementError> {
    if !utilization_threshold.is_finite() || utilization_threshold <= 0. {
        return Err(PlacementError::InvalidThreshold(utilization_threshold));
    }
    Ok(())
}

impl PowerVmAllocationPolicy {
    pub fn new(hosts: Vec<Box<dyn Host>>, utilization_threshold: f64) -> Result<Self, PlacementError> {
        check_threshold(utilization_threshold)?;
        for (i, host) in hosts.iter().enumerate() {
            if hosts[..i].iter().any(|h| h.id() == host.id()) {
                return Err(PlacementError::DuplicateHost(host.id()));
            }
        }
        Ok(Self {
            hosts,
            vm_table: AllocationTable::new(),
            selector: HostSelector::new(utilization_threshold),
            utilization_log: Vec::new(),
        })
    }

    /// Creates policy with the hosts and threshold from config.
    pub fn from_config(config: &PlannerConfig) -> Result<Self, PlacementError> {
        Self::new(config.build_hosts()?, config.utilization_threshold)
    }

    pub fn utilization_threshold(&self) -> f64 {
        self.selector.utilization_threshold()
    }

    pub fn set_utilization_threshold(&mut self, utilization_threshold: f64) -> Result<(), PlacementError> {
        check_threshold(utilization_threshold)?;
        self.selector.set_utilization_threshold(utilization_threshold);
        Ok(())
    }

    /// Returns short policy description, e.g. `ST0.80`.
    pub fn policy_desc(&self) -> String {
        format!("ST{:.2}", self.utilization_threshold())
    }

    pub fn hosts(&self) -> &[Box<dyn Host>] {
        &self.hosts
    }

    pub fn host(&self, host_id: u32) -> Option<&dyn Host> {
        self.hosts.iter().find(|h| h.id() == host_id).map(|h| h.as_ref())
    }

    pub fn host_mut(&mut self, host_id: u32) -> Option<&mut Box<dyn Host>> {
        self.hosts.iter_mut().find(|h| h.id() == host_id)
    }

    pub(crate) fn host_index(&self, host_id: u32) -> Option<usize> {
        self.hosts.iter().position(|h| h.id() == host_id)
    }

    pub fn allocation_table(&self) -> &AllocationTable {
        &self.vm_table
    }

    /// Returns the sum of the current power consumption of all hosts.
    pub fn total_power(&self) -> f64 {
        self.hosts.iter().map(|h| h.get_power()).sum()
    }

    /// Returns ID of the host with the least power increase among suitable hosts which stay under the
    /// utilization threshold, or `None` if there is no such host.
    ///
    /// Host state is left unchanged.
    pub fn find_host_for_vm(&mut self, vm: &VirtualMachine) -> Option<u32> {
        self.selector
            .select_host(vm, &mut self.hosts)
            .map(|idx| self.hosts[idx].id())
    }

    /// Places VM on the host returned by [`PowerVmAllocationPolicy::find_host_for_vm`].
    pub fn allocate_host_for_vm(&mut self, vm: &mut VirtualMachine) -> bool {
        match self.find_host_for_vm(vm) {
            Some(host_id) => self.allocate_host_for_vm_on(vm, host_id),
            None => {
                debug!("no suitable host for {}", vm);
                false
            }
        }
    }

    /// Places VM on the specified host.
    pub fn allocate_host_for_vm_on(&mut self, vm: &mut VirtualMachine, host_id: u32) -> bool {
        let idx = match self.host_index(host_id) {
            Some(idx) => idx,
            None => return false,
        };
        if !self.hosts[idx].vm_create(vm) {
            debug!("host {} can't create {}", host_id, vm);
            return false;
        }
        self.vm_table.insert(vm.uid(), host_id);
        info!("{} has been allocated to host {}", vm, host_id);
        true
    }

    /// Removes VM from its host.
    pub fn deallocate_host_for_vm(&mut self, vm: &mut VirtualMachine) {
        if let Some(host_id) = self.vm_table.remove(&vm.uid()) {
            if let Some(idx) = self.host_index(host_id) {
                self.hosts[idx].vm_destroy(vm);
            }
        }
    }

    /// Moves placed VM to another host instantly, as if a planned migration has completed.
    ///
    /// Returns `Ok(false)` and leaves the VM in place if the target host has no room for it.
    pub fn migrate_vm(&mut self, vm: &mut VirtualMachine, host_id: u32) -> Result<bool, PlacementError> {
        let idx = self.host_index(host_id).ok_or(PlacementError::UnknownHost(host_id))?;
        if !self.hosts[idx].is_suitable_for_vm(vm) {
            debug!("host {} has no room for migrating {}", host_id, vm);
            return Ok(false);
        }
        let source_host = self.get_host(vm);
        self.deallocate_host_for_vm(vm);
        if !self.allocate_host_for_vm_on(vm, host_id) {
            return Ok(false);
        }
        if let Some(source_host) = source_host {
            info!("{} migrated from host {} to host {}", vm, source_host, host_id);
        }
        Ok(true)
    }

    pub fn get_host(&self, vm: &VirtualMachine) -> Option<u32> {
        self.vm_table.get(&vm.uid())
    }

    pub fn get_host_by_ids(&self, vm_id: u32, user_id: u32) -> Option<u32> {
        self.vm_table.get(&format!("{}-{}", user_id, vm_id))
    }

    /// Samples VM load models at the given time and refreshes CPU reservations of placed VMs with their new demand.
    ///
    /// Returns keys of the VMs whose reservation could not be refreshed, they keep the previous one.
    pub fn update_vms_processing(&mut self, vms: &mut [VirtualMachine], time: f64) -> Vec<String> {
        let mut failed = Vec::new();
        for vm in vms.iter_mut() {
            vm.update_utilization(time);
            if vm.is_in_migration() {
                continue;
            }
            if let Some(idx) = vm.host().and_then(|host_id| self.host_index(host_id)) {
                if !self.hosts[idx].vm_create(vm) {
                    warn!("host {} can't refresh reservation of {}", self.hosts[idx].id(), vm);
                    failed.push(vm.uid());
                }
            }
        }
        failed
    }

    /// Returns telemetry of all VMs recorded by the snapshots taken so far.
    pub fn utilization_log(&self) -> &[VmUtilizationRecord] {
        &self.utilization_log
    }

    /// Returns the recorded telemetry and clears it.
    pub fn take_utilization_log(&mut self) -> Vec<VmUtilizationRecord> {
        std::mem::take(&mut self.utilization_log)
    }

    /// Writes the recorded telemetry to a CSV file.
    pub fn save_utilization_log(&self, path: &str) -> Result<(), PlacementError> {
        let file = File::create(path)?;
        let mut wtr = csv::Writer::from_writer(file);
        for record in &self.utilization_log {
            wtr.serialize(record)?;
        }
        wtr.flush()?;
        Ok(())
    }
}
