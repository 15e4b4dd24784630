//! Physical host power consumption models.

use dyn_clone::{clone_trait_object, DynClone};

use crate::core::config::{parse_config_value, parse_option, parse_options};
use crate::core::errors::PlacementError;

/// Power model is a function, which computes the power consumption of a physical host
/// based on its current CPU utilization.
///
/// The planner only queries the model, it never changes it.
pub trait PowerModel: DynClone {
    /// Returns the current power consumption of a physical host in W.
    ///
    /// - `utilization` - current host CPU utilization in 0.0-1.0 range.
    fn get_power(&self, utilization: f64) -> f64;
}

clone_trait_object!(PowerModel);

/// Simple linear power model.
///
/// Computes host power consumption as `idle_power + utilization * (max_power - idle_power)`.
///
/// If utilization is zero, then it is assumed that the host is powered off and its power consumption is zero.
#[derive(Clone)]
pub struct LinearPowerModel {
    max_power: f64,
    idle_power: f64,
}

impl LinearPowerModel {
    /// Creates the model with idle power equal to 40% of the maximum power.
    /// - `max_power` - host power, when CPU is fully loaded.
    pub fn new(max_power: f64) -> Self {
        Self {
            idle_power: 0.4 * max_power,
            max_power,
        }
    }

    pub fn new_with_idle_power(max_power: f64, idle_power: f64) -> Self {
        Self { idle_power, max_power }
    }
}

impl PowerModel for LinearPowerModel {
    fn get_power(&self, utilization: f64) -> f64 {
        if utilization == 0. {
            return 0.;
        }
        self.idle_power + utilization * (self.max_power - self.idle_power)
    }
}

/// A power model based on square interpolation between the idle and maximum power consumption values.
#[derive(Clone)]
pub struct SquarePowerModel {
    max_power: f64,
    idle_power: f64,
}

impl SquarePowerModel {
    pub fn new(max_power: f64, idle_power: f64) -> Self {
        Self { max_power, idle_power }
    }
}

impl PowerModel for SquarePowerModel {
    fn get_power(&self, utilization: f64) -> f64 {
        if utilization == 0. {
            return 0.;
        }
        self.idle_power + utilization.powi(2) * (self.max_power - self.idle_power)
    }
}

/// A power model based on cubic interpolation between the idle and maximum power consumption values.
#[derive(Clone)]
pub struct CubicPowerModel {
    max_power: f64,
    idle_power: f64,
}

impl CubicPowerModel {
    pub fn new(max_power: f64, idle_power: f64) -> Self {
        Self { max_power, idle_power }
    }
}

impl PowerModel for CubicPowerModel {
    fn get_power(&self, utilization: f64) -> f64 {
        if utilization == 0. {
            return 0.;
        }
        self.idle_power + utilization.powi(3) * (self.max_power - self.idle_power)
    }
}

/// Host consumes the same power regardless of its load.
#[derive(Clone)]
pub struct ConstantPowerModel {
    power: f64,
}

impl ConstantPowerModel {
    pub fn new(power: f64) -> Self {
        Self { power }
    }
}

impl PowerModel for ConstantPowerModel {
    fn get_power(&self, _utilization: f64) -> f64 {
        self.power
    }
}

/// Creates power model from config value string, e.g. `Linear[max=250,idle=175]` or `Constant[power=100]`.
pub fn power_model_resolver(config_str: &str) -> Result<Box<dyn PowerModel>, PlacementError> {
    let (model_name, options_str) = parse_config_value(config_str);
    let options = parse_options(&options_str.unwrap_or_default());
    match model_name.as_str() {
        "Linear" => {
            let max_power = parse_option(&options, &model_name, "max")?;
            match options.get("idle") {
                Some(_) => Ok(Box::new(LinearPowerModel::new_with_idle_power(
                    max_power,
                    parse_option(&options, &model_name, "idle")?,
                ))),
                None => Ok(Box::new(LinearPowerModel::new(max_power))),
            }
        }
        "Square" => Ok(Box::new(SquarePowerModel::new(
            parse_option(&options, &model_name, "max")?,
            parse_option(&options, &model_name, "idle")?,
        ))),
        "Cubic" => Ok(Box::new(CubicPowerModel::new(
            parse_option(&options, &model_name, "max")?,
            parse_option(&options, &model_name, "idle")?,
        ))),
        "Constant" => Ok(Box::new(ConstantPowerModel::new(parse_option(
            &options,
            &model_name,
            "power",
        )?))),
        _ => Err(PlacementError::UnknownModel(config_str.to_string())),
    }
}
