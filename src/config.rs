use anyhow::Result;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;

use crate::cluster::ClusterConfig;
use crate::reserve::ReserveConfig;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub controller: ControllerConfig,
    pub reserve: ReserveConfig,
    pub cluster: ClusterConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Control cycle period in seconds.
    pub tick_seconds: u64,
    /// Rated apparent power of the storage inverter in W.
    pub max_apparent_power_w: f64,
    /// Whether force-charging from the grid is permitted.
    pub grid_charge_allowed: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            tick_seconds: 1,
            max_apparent_power_w: 10_000.0,
            grid_charge_allowed: true,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("ECE__").split("__"));
        Ok(figment.extract()?)
    }
}
