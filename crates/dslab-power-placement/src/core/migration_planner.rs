//! Re-optimization pass producing a migration plan.
//!
//! The pass evicts migration candidates, places them again with the host selector and records every VM which
//! landed on another host. Afterwards the placement is rolled back to the snapshot taken at the start of the pass:
//! the plan is only advisory, executing it is up to the caller.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, error, info, warn};

use crate::core::allocation_policy::PowerVmAllocationPolicy;
use crate::core::common::MigrationEntry;
use crate::core::errors::PlacementError;
use crate::core::snapshot::AllocationSnapshot;
use crate::core::vm::VirtualMachine;

/// VM evicted from its host for re-placement.
struct MigrationCandidate {
    idx: usize,
    source_host: u32,
}

/// Orders candidates by decreasing CPU utilization, keeping the input order among equal ones.
fn sort_by_cpu_utilization(vms: &[VirtualMachine], candidates: &mut [MigrationCandidate]) {
    candidates.sort_by(|a, b| {
        let a_mips = vms[a.idx].total_utilization_of_cpu_mips();
        let b_mips = vms[b.idx].total_utilization_of_cpu_mips();
        b_mips.total_cmp(&a_mips)
    });
}

impl PowerVmAllocationPolicy {
    /// Computes migrations improving the placement of the given VMs according to their current utilization.
    ///
    /// Returns the planned migrations in the order they were decided. The placement of hosts and VMs is the same
    /// after the call as before it. [`PlacementError::RestoreFailed`] means that the initial placement could not be
    /// brought back and the host state can not be trusted anymore.
    pub fn optimize_allocation(
        &mut self,
        vms: &mut [VirtualMachine],
        time: f64,
    ) -> Result<Vec<MigrationEntry>, PlacementError> {
        let mut migration_map = Vec::new();
        if vms.is_empty() {
            return Ok(migration_map);
        }

        self.save_allocation(vms, time);

        let mut candidates = self.evict_migration_candidates(vms);
        sort_by_cpu_utilization(vms, &mut candidates);
        debug!("{} vms are candidates for migration", candidates.len());

        for host in self.hosts.iter_mut() {
            host.reallocate_migrating_vms();
        }

        for candidate in candidates {
            let vm = &mut vms[candidate.idx];
            let target = match self.selector.select_host(vm, &mut self.hosts) {
                Some(target) => target,
                None => {
                    warn!("no suitable host for {}, it stays unplaced in this pass", vm);
                    continue;
                }
            };
            if !self.hosts[target].vm_create(vm) {
                warn!("host {} refused selected {}", self.hosts[target].id(), vm);
                continue;
            }
            let host_id = self.hosts[target].id();
            debug!("{} allocated to host {}", vm, host_id);
            if host_id != candidate.source_host {
                info!(
                    "schedule migration of {} from host {} to host {}",
                    vm, candidate.source_host, host_id
                );
                migration_map.push(MigrationEntry {
                    vm_uid: vm.uid(),
                    vm_id: vm.id,
                    source_host: candidate.source_host,
                    host_id,
                });
            }
        }

        self.restore_allocation(vms)?;

        Ok(migration_map)
    }

    /// Starts a transaction on the allocation table with the current placement of the VMs.
    fn save_allocation(&mut self, vms: &[VirtualMachine], time: f64) {
        let snapshot = AllocationSnapshot::capture(vms, &self.hosts, time);
        self.utilization_log.extend_from_slice(snapshot.records());
        self.vm_table.begin(snapshot);
    }

    /// Evicts the VMs which may be migrated from their hosts.
    ///
    /// Hosts of VMs in migration are not touched at all. From any other host at most one VM is evicted.
    /// Recently created VMs are kept in place.
    fn evict_migration_candidates(&mut self, vms: &mut [VirtualMachine]) -> Vec<MigrationCandidate> {
        let mut busy_hosts: BTreeSet<u32> = vms
            .iter()
            .filter(|vm| vm.is_in_migration())
            .filter_map(|vm| self.vm_table.get(&vm.uid()).or(vm.host()))
            .collect();

        let mut candidates = Vec::new();
        for (idx, vm) in vms.iter_mut().enumerate() {
            if vm.is_in_migration() || vm.is_recently_created() {
                continue;
            }
            let host_id = match vm.host() {
                Some(host_id) => host_id,
                None => continue,
            };
            if busy_hosts.contains(&host_id) {
                continue;
            }
            let host_idx = match self.host_index(host_id) {
                Some(host_idx) => host_idx,
                None => continue,
            };
            busy_hosts.insert(host_id);
            self.hosts[host_idx].vm_destroy(vm);
            candidates.push(MigrationCandidate {
                idx,
                source_host: self.vm_table.get(&vm.uid()).unwrap_or(host_id),
            });
        }
        candidates
    }

    /// Brings back the placement from the snapshot for all VMs from the list.
    ///
    /// All hosts are cleared first, then the snapshot is replayed, so nothing placed during the pass survives.
    /// Every VM gets back the same per-PE reservation it had before the pass, regardless of its current demand
    /// and of the order of the list.
    fn restore_allocation(&mut self, vms: &mut [VirtualMachine]) -> Result<(), PlacementError> {
        let snapshot = match self.vm_table.rollback() {
            Some(snapshot) => snapshot,
            None => return Ok(()),
        };
        for host in self.hosts.iter_mut() {
            host.vm_destroy_all();
            host.reallocate_migrating_vms();
        }

        let mut listed = BTreeMap::new();
        for (idx, vm) in vms.iter_mut().enumerate() {
            vm.set_host(None);
            listed.insert(vm.uid(), idx);
        }

        for pair in snapshot.entries() {
            let idx = match listed.get(&pair.vm_uid) {
                Some(&idx) => idx,
                None => continue,
            };
            let vm = &mut vms[idx];
            let restored = match (self.host_index(pair.host_id), snapshot.allocation(&pair.vm_uid)) {
                (Some(host_idx), Some(allocation)) => self.hosts[host_idx].vm_restore(vm, allocation.clone()),
                (Some(host_idx), None) => self.hosts[host_idx].vm_create(vm),
                (None, _) => false,
            };
            if !restored {
                error!("{} can't be restored on host {}", vm, pair.host_id);
                return Err(PlacementError::RestoreFailed {
                    vm_uid: pair.vm_uid.clone(),
                    host_id: pair.host_id,
                });
            }
            debug!("restored {} on host {}", vm, pair.host_id);
        }
        Ok(())
    }
}
