use serde::Serialize;

/// A VM together with the host it is assigned to.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct VmHostPair {
    pub vm_uid: String,
    pub vm_id: u32,
    pub host_id: u32,
}

/// Single decision of a migration plan: move the VM to `host_id`.
///
/// Entries are emitted only when the destination differs from the host the VM occupied before the planning pass.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct MigrationEntry {
    pub vm_uid: String,
    pub vm_id: u32,
    pub source_host: u32,
    pub host_id: u32,
}

#[derive(PartialEq, Debug)]
pub enum AllocationVerdict {
    NotEnoughCPU,
    NotEnoughMemory,
    NotEnoughBandwidth,
    Success,
}
