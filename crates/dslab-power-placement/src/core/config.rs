//! Planner configuration.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::errors::PlacementError;
use crate::core::host::{Host, PowerHost};
use crate::core::load_model::{load_model_resolver, ConstLoadModel};
use crate::core::power_model::power_model_resolver;
use crate::core::vm::VirtualMachine;

/// Parses config value string, which consists of two parts - name and options.
/// Example: Linear[max=250,idle=175] parts are name Linear and options string "max=250,idle=175".
pub fn parse_config_value(config_str: &str) -> (String, Option<String>) {
    match config_str.split_once('[') {
        Some((l, r)) => (l.trim().to_string(), Some(r.replace(']', ""))),
        None => (config_str.trim().to_string(), None),
    }
}

/// Parses options string from config value, returns map with option names and values.
pub fn parse_options(options_str: &str) -> HashMap<String, String> {
    let mut options = HashMap::new();
    for option_str in options_str.split(',') {
        if let Some((name, value)) = option_str.split_once('=') {
            options.insert(name.trim().to_string(), value.trim().to_string());
        }
    }
    options
}

/// Reads a required option of the model.
pub fn parse_option<T: FromStr>(options: &HashMap<String, String>, model: &str, name: &str) -> Result<T, PlacementError> {
    options
        .get(name)
        .and_then(|value| value.parse::<T>().ok())
        .ok_or_else(|| PlacementError::InvalidOption {
            model: model.to_string(),
            option: name.to_string(),
        })
}

/// Holds raw planner config parsed from YAML file.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
struct RawPlannerConfig {
    pub utilization_threshold: Option<f64>,
    pub hosts: Option<Vec<HostConfig>>,
    pub vms: Option<Vec<VmConfig>>,
}

/// Holds configuration of a single physical host or a set of identical hosts.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct HostConfig {
    /// Number of PEs.
    pub pes: u32,
    /// Capacity of each PE in MIPS.
    pub mips_per_pe: f64,
    /// Memory capacity in MB.
    pub ram: u64,
    /// Bandwidth capacity.
    pub bw: u64,
    /// Power model config value, e.g. `Linear[max=250,idle=175]`.
    pub power_model: String,
    /// Number of such hosts.
    pub count: Option<u32>,
}

/// Holds configuration of a single VM or a set of identical VMs.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct VmConfig {
    /// MIPS of each vCPU.
    pub mips: f64,
    /// Number of vCPUs.
    pub pes: u32,
    /// Memory in MB.
    pub ram: u64,
    pub bw: u64,
    /// CPU load model config value, e.g. `Const[load=0.6]`.
    pub cpu_load: String,
    /// Number of such VMs.
    pub count: Option<u32>,
}

/// Represents planner configuration.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct PlannerConfig {
    /// Maximum allowed utilization of any host PE after placement.
    pub utilization_threshold: f64,
    /// Configurations of physical hosts in inventory order.
    pub hosts: Vec<HostConfig>,
    /// Configurations of VMs.
    pub vms: Vec<VmConfig>,
}

impl PlannerConfig {
    /// Creates config by reading parameter values from YAML file
    /// (uses default values if some parameters are absent).
    pub fn from_file(file_name: &str) -> Result<Self, PlacementError> {
        Self::from_yaml(&std::fs::read_to_string(file_name)?)
    }

    /// Creates config from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, PlacementError> {
        let raw: RawPlannerConfig = serde_yaml::from_str(yaml)?;
        Ok(Self {
            utilization_threshold: raw.utilization_threshold.unwrap_or(0.8),
            hosts: raw.hosts.unwrap_or_default(),
            vms: raw.vms.unwrap_or_default(),
        })
    }

    /// Creates hosts described by config. Host IDs are assigned sequentially starting from zero.
    pub fn build_hosts(&self) -> Result<Vec<Box<dyn Host>>, PlacementError> {
        let mut hosts: Vec<Box<dyn Host>> = Vec::new();
        for host_config in self.hosts.iter() {
            let power_model = power_model_resolver(&host_config.power_model)?;
            for _ in 0..host_config.count.unwrap_or(1) {
                hosts.push(Box::new(PowerHost::new(
                    hosts.len() as u32,
                    vec![host_config.mips_per_pe; host_config.pes as usize],
                    host_config.ram,
                    host_config.bw,
                    power_model.clone(),
                )));
            }
        }
        Ok(hosts)
    }

    /// Creates VMs described by config for the given user. VM IDs are assigned sequentially starting from zero.
    pub fn build_vms(&self, user_id: u32, start_time: f64) -> Result<Vec<VirtualMachine>, PlacementError> {
        let mut vms = Vec::new();
        for vm_config in self.vms.iter() {
            let cpu_load_model = load_model_resolver(&vm_config.cpu_load)?;
            for _ in 0..vm_config.count.unwrap_or(1) {
                vms.push(VirtualMachine::new(
                    vms.len() as u32,
                    user_id,
                    vm_config.mips,
                    vm_config.pes,
                    vm_config.ram,
                    vm_config.bw,
                    start_time,
                    cpu_load_model.clone(),
                    Box::new(ConstLoadModel::new(1.)),
                ));
            }
        }
        Ok(vms)
    }
}
