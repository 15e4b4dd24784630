//! Errors surfaced by the placement policy and its configuration.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlacementError {
    /// A VM could not be put back on the host recorded in the snapshot.
    ///
    /// The host inventory no longer matches the allocation table, so the simulation state is corrupted.
    #[error("vm {vm_uid} can not be restored on host {host_id}")]
    RestoreFailed { vm_uid: String, host_id: u32 },

    #[error("host {0} is registered more than once")]
    DuplicateHost(u32),

    #[error("host {0} does not exist")]
    UnknownHost(u32),

    #[error("utilization threshold must be a positive finite number, got {0}")]
    InvalidThreshold(f64),

    #[error("can't resolve model: {0}")]
    UnknownModel(String),

    #[error("model {model} has missing or malformed option `{option}`")]
    InvalidOption { model: String, option: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}
