//! Snapshot of VM placement taken before a re-optimization pass.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::common::VmHostPair;
use crate::core::host::{Host, PeAllocation};
use crate::core::vm::VirtualMachine;

/// Utilization of a VM and its host at the moment of snapshot, kept for audit.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct VmUtilizationRecord {
    pub time: f64,
    pub vm_id: u32,
    pub host_id: u32,
    pub cpu_utilization: f64,
    pub cpu_mips_used: f64,
    pub host_max_available_mips: f64,
    pub host_used_mips: f64,
    pub host_ram: u64,
    pub vm_requested_ram: u64,
}

/// Ordered VM to host assignments with the CPU reservation of each VM and per-VM telemetry.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AllocationSnapshot {
    entries: Vec<VmHostPair>,
    allocations: BTreeMap<String, PeAllocation>,
    records: Vec<VmUtilizationRecord>,
}

impl AllocationSnapshot {
    /// Captures the current host of every placed VM from the list. VMs without a host are not recorded.
    pub fn capture(vms: &[VirtualMachine], hosts: &[Box<dyn Host>], time: f64) -> Self {
        let mut snapshot = Self::default();
        for vm in vms.iter() {
            let host = match vm.host().and_then(|id| hosts.iter().find(|h| h.id() == id)) {
                Some(host) => host,
                None => continue,
            };
            snapshot.entries.push(VmHostPair {
                vm_uid: vm.uid(),
                vm_id: vm.id,
                host_id: host.id(),
            });
            if let Some(allocation) = host.get_allocated_mips_for_vm(vm) {
                snapshot.allocations.insert(vm.uid(), allocation);
            }
            snapshot.records.push(VmUtilizationRecord {
                time,
                vm_id: vm.id,
                host_id: host.id(),
                cpu_utilization: vm.cpu_utilization(),
                cpu_mips_used: vm.total_utilization_of_cpu_mips(),
                host_max_available_mips: host.get_max_available_mips(),
                host_used_mips: host.get_used_mips(),
                host_ram: host.get_ram(),
                vm_requested_ram: vm.current_requested_ram(),
            });
        }
        snapshot
    }

    pub fn entries(&self) -> &[VmHostPair] {
        &self.entries
    }

    /// Returns the per-PE CPU reservation the VM had on its host at the moment of snapshot.
    pub fn allocation(&self, vm_uid: &str) -> Option<&PeAllocation> {
        self.allocations.get(vm_uid)
    }

    pub fn records(&self) -> &[VmUtilizationRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
