//! Resource load models.

use dyn_clone::{clone_trait_object, DynClone};

use crate::core::config::{parse_config_value, parse_option, parse_options};
use crate::core::errors::PlacementError;

/// A resource load model is a function, which defines load of resource X at the moment.
/// time - current simulation time, time_from_start - time since the VM was started.
pub trait LoadModel: DynClone {
    fn get_resource_load(&self, time: f64, time_from_start: f64) -> f64;
}

clone_trait_object!(LoadModel);

/// The simplest load model, the constant load.
#[derive(Clone)]
pub struct ConstLoadModel {
    load: f64,
}

impl ConstLoadModel {
    pub fn new(load: f64) -> Self {
        Self { load }
    }
}

impl LoadModel for ConstLoadModel {
    fn get_resource_load(&self, _time: f64, _time_from_start: f64) -> f64 {
        self.load
    }
}

/// Load switches from `initial` to `later` once `switch_time` seconds have passed since VM start.
#[derive(Clone)]
pub struct StepLoadModel {
    initial: f64,
    later: f64,
    switch_time: f64,
}

impl StepLoadModel {
    pub fn new(initial: f64, later: f64, switch_time: f64) -> Self {
        Self {
            initial,
            later,
            switch_time,
        }
    }
}

impl LoadModel for StepLoadModel {
    fn get_resource_load(&self, _time: f64, time_from_start: f64) -> f64 {
        if time_from_start < self.switch_time {
            self.initial
        } else {
            self.later
        }
    }
}

/// Creates load model from config value string, e.g. `Const[load=0.6]` or `Step[initial=1.0,later=0.3,switch=10]`.
pub fn load_model_resolver(config_str: &str) -> Result<Box<dyn LoadModel>, PlacementError> {
    let (model_name, options_str) = parse_config_value(config_str);
    let options = parse_options(&options_str.unwrap_or_default());
    match model_name.as_str() {
        "Const" => Ok(Box::new(ConstLoadModel::new(parse_option(&options, &model_name, "load")?))),
        "Step" => Ok(Box::new(StepLoadModel::new(
            parse_option(&options, &model_name, "initial")?,
            parse_option(&options, &model_name, "later")?,
            parse_option(&options, &model_name, "switch")?,
        ))),
        _ => Err(PlacementError::UnknownModel(config_str.to_string())),
    }
}
