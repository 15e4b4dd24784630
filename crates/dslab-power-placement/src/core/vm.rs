//! Representation of virtual machine.

use std::fmt::{Display, Formatter};

use crate::core::load_model::LoadModel;

/// Represents virtual machine (VM).
///
// VM is characterized by its ID, resource requirements (vCPUs, MIPS per vCPU, memory and bandwidth) and load models.
// The latter model the actual CPU and memory utilization of VM in time, which defines how much CPU capacity the VM
// currently requests from its host.
#[derive(Clone)]
pub struct VirtualMachine {
    pub id: u32,
    pub user_id: u32,
    pub mips: f64,
    pub pes_number: u32,
    pub ram: u64,
    pub bw: u64,
    start_time: f64,
    host: Option<u32>,
    in_migration: bool,
    recently_created: bool,
    cpu_utilization: f64,
    memory_utilization: f64,
    cpu_load_model: Box<dyn LoadModel>,
    memory_load_model: Box<dyn LoadModel>,
}

impl VirtualMachine {
    /// Creates virtual machine with specified parameters.
    ///
    /// The VM is recently created until the first call of [`VirtualMachine::update_utilization`].
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u32,
        user_id: u32,
        mips: f64,
        pes_number: u32,
        ram: u64,
        bw: u64,
        start_time: f64,
        cpu_load_model: Box<dyn LoadModel>,
        memory_load_model: Box<dyn LoadModel>,
    ) -> Self {
        Self {
            id,
            user_id,
            mips,
            pes_number,
            ram,
            bw,
            start_time,
            host: None,
            in_migration: false,
            recently_created: true,
            cpu_utilization: 0.,
            memory_utilization: 0.,
            cpu_load_model,
            memory_load_model,
        }
    }

    /// Returns key which identifies VM among VMs of all users.
    pub fn uid(&self) -> String {
        format!("{}-{}", self.user_id, self.id)
    }

    /// Returns ID of the host the VM currently resides on.
    pub fn host(&self) -> Option<u32> {
        self.host
    }

    /// Updates host reference. Called by hosts when VM is created on or removed from them.
    pub fn set_host(&mut self, host: Option<u32>) {
        self.host = host;
    }

    pub fn is_in_migration(&self) -> bool {
        self.in_migration
    }

    pub fn set_in_migration(&mut self, in_migration: bool) {
        self.in_migration = in_migration;
    }

    pub fn is_recently_created(&self) -> bool {
        self.recently_created
    }

    pub fn set_recently_created(&mut self, recently_created: bool) {
        self.recently_created = recently_created;
    }

    /// Samples load models at the given time. Clears the recently created flag.
    pub fn update_utilization(&mut self, time: f64) {
        let time_from_start = time - self.start_time;
        self.cpu_utilization = self.cpu_load_model.get_resource_load(time, time_from_start);
        self.memory_utilization = self.memory_load_model.get_resource_load(time, time_from_start);
        self.recently_created = false;
    }

    /// Returns the last sampled CPU utilization.
    pub fn cpu_utilization(&self) -> f64 {
        self.cpu_utilization
    }

    /// Returns the last sampled memory utilization.
    pub fn memory_utilization(&self) -> f64 {
        self.memory_utilization
    }

    /// Returns MIPS requested by each vCPU.
    ///
    /// Recently created VM has no utilization history and requests its full capacity.
    pub fn current_requested_mips(&self) -> Vec<f64> {
        let share = if self.recently_created {
            self.mips
        } else {
            self.mips * self.cpu_utilization
        };
        vec![share; self.pes_number as usize]
    }

    pub fn current_requested_total_mips(&self) -> f64 {
        self.current_requested_mips().iter().sum()
    }

    pub fn current_requested_max_mips(&self) -> f64 {
        self.current_requested_mips().into_iter().fold(0., f64::max)
    }

    pub fn current_requested_ram(&self) -> u64 {
        self.ram
    }

    pub fn current_requested_bw(&self) -> u64 {
        self.bw
    }

    /// Returns MIPS actually used by the VM according to the last sampled utilization.
    pub fn total_utilization_of_cpu_mips(&self) -> f64 {
        self.cpu_utilization * self.mips * self.pes_number as f64
    }
}

impl Display for VirtualMachine {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "vm #{} (user {})", self.id, self.user_id)
    }
}
