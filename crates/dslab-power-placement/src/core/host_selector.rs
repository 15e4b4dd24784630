//! Power-aware host selection.

use log::trace;

use crate::core::host::Host;
use crate::core::vm::VirtualMachine;
use crate::core::what_if::{max_utilization_after_allocation, power_after_allocation};

/// Selects the host with the least power increase caused by placing the VM on it.
///
/// Hosts are scanned in inventory order, the first one wins on ties. A host is considered only if it is suitable
/// for the VM and none of the PEs used by the VM would be loaded above the utilization threshold.
#[derive(Clone, Debug)]
pub struct HostSelector {
    utilization_threshold: f64,
}

impl HostSelector {
    pub fn new(utilization_threshold: f64) -> Self {
        Self { utilization_threshold }
    }

    pub fn utilization_threshold(&self) -> f64 {
        self.utilization_threshold
    }

    pub fn set_utilization_threshold(&mut self, utilization_threshold: f64) {
        self.utilization_threshold = utilization_threshold;
    }

    /// Returns the index of the selected host in `hosts` or `None` if there is no suitable host.
    pub fn select_host(&self, vm: &VirtualMachine, hosts: &mut [Box<dyn Host>]) -> Option<usize> {
        let mut result: Option<usize> = None;
        let mut min_power_diff = f64::INFINITY;

        for idx in 0..hosts.len() {
            if !hosts[idx].is_suitable_for_vm(vm) {
                continue;
            }
            let max_utilization = max_utilization_after_allocation(hosts, idx, vm);
            if max_utilization > self.utilization_threshold {
                trace!(
                    "host {} is skipped for {}: utilization {} is above threshold",
                    hosts[idx].id(),
                    vm,
                    max_utilization
                );
                continue;
            }
            let power_before = hosts[idx].get_power();
            if let Some(power_after) = power_after_allocation(hosts, idx, vm) {
                // negative only when the VM is evaluated against its own host with lower demand, which keeps it there
                let power_diff = power_after - power_before;
                if power_diff < min_power_diff {
                    min_power_diff = power_diff;
                    result = Some(idx);
                }
            }
        }
        result
    }
}
