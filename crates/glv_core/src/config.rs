//! Aggregated settings, loadable from JSON. Missing fields take their defaults.

use crate::assembly::AssemblySettings;
use crate::cavity::CavitySettings;
use crate::dynamics::SimulationSettings;
use crate::error::{GlvError, Result};
use crate::sampling::CommunitySampler;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlvConfig {
    pub simulation: SimulationSettings,
    pub assembly: AssemblySettings,
    pub cavity: CavitySettings,
    pub sampler: CommunitySampler,
}

impl GlvConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| GlvError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| GlvError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        self.simulation.integrator.validate()?;
        self.simulation.equilibrium.validate()?;
        if !(self.simulation.noise_dt > 0.0) {
            return Err(GlvError::InvalidSettings(
                "noise_dt must be positive.".into(),
            ));
        }
        self.assembly.validate()?;
        self.cavity.newton.validate()
    }
}
