//! Power-aware VM placement and migration planning.

pub mod allocation_policy;
pub mod allocation_table;
pub mod common;
pub mod config;
pub mod errors;
pub mod host;
pub mod host_selector;
pub mod load_model;
pub mod migration_planner;
pub mod power_model;
pub mod snapshot;
pub mod vm;
pub mod what_if;
