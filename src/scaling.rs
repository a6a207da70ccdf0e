//! Characteristic units for nondimensional input.
//!
//! Five primary units are chosen independently; all other units derive from
//! them. The force unit is independent of mass, length and time because the
//! momentum balance is quasi-static, so Newton's second law is not used to
//! relate them.
//!
//! ```text
//! velocity    = length / time          stress           = force / area
//! strain rate = 1 / time               gravity strength = force / mass
//! energy      = force * length         power            = energy / time
//! density     = mass / volume          viscosity        = stress * time
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Primary units as read from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScalingInput {
    pub mass: f64,
    pub time: f64,
    pub length: f64,
    /// Kelvin
    pub temperature: f64,
    pub force: f64,
}

impl Default for ScalingInput {
    fn default() -> Self {
        Self {
            mass: 1.0,
            time: 1.0,
            length: 1.0,
            temperature: 1.0,
            force: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scaling {
    // primary
    pub mass: f64,
    pub time: f64,
    pub length: f64,
    pub temperature: f64,
    pub force: f64,

    pub volume: f64,
    pub area: f64,

    // secondary
    pub velocity: f64,
    pub stress: f64,
    pub strain_rate: f64,
    pub gravity_strength: f64,
    pub energy: f64,
    pub power: f64,
    pub heat_flux: f64,
    pub dissipation_rate: f64,

    // material parameters
    pub density: f64,
    pub viscosity: f64,
    pub specific_heat: f64,
    pub conductivity: f64,
    pub heat_production: f64,
    pub expansivity: f64,
    pub pressure_sensitivity: f64,
}

impl Scaling {
    /// Derive all units from the primary ones. Every primary unit must be positive.
    pub fn new(mass: f64, time: f64, length: f64, temperature: f64, force: f64) -> Result<Self> {
        for (name, v) in [
            ("mass", mass),
            ("time", time),
            ("length", length),
            ("temperature", temperature),
            ("force", force),
        ] {
            if !(v > 0.0 && v.is_finite()) {
                return Err(Error::Config(format!("{} unit must be positive, got {}", name, v)));
            }
        }

        let volume = length * length * length;
        let area = length * length;
        let stress = force / area;
        let energy = force * length;
        let power = energy / time;

        Ok(Self {
            mass,
            time,
            length,
            temperature,
            force,
            volume,
            area,
            velocity: length / time,
            stress,
            strain_rate: 1.0 / time,
            gravity_strength: force / mass,
            energy,
            power,
            heat_flux: power / area,
            dissipation_rate: power / volume,
            density: mass / volume,
            viscosity: stress * time,
            specific_heat: energy / mass / temperature,
            conductivity: power / length / temperature,
            heat_production: power / mass,
            expansivity: 1.0 / temperature,
            pressure_sensitivity: temperature / stress,
        })
    }

    /// Identity scaling: input is already nondimensional.
    pub fn none() -> Self {
        Self {
            mass: 1.0,
            time: 1.0,
            length: 1.0,
            temperature: 1.0,
            force: 1.0,
            volume: 1.0,
            area: 1.0,
            velocity: 1.0,
            stress: 1.0,
            strain_rate: 1.0,
            gravity_strength: 1.0,
            energy: 1.0,
            power: 1.0,
            heat_flux: 1.0,
            dissipation_rate: 1.0,
            density: 1.0,
            viscosity: 1.0,
            specific_heat: 1.0,
            conductivity: 1.0,
            heat_production: 1.0,
            expansivity: 1.0,
            pressure_sensitivity: 1.0,
        }
    }

    pub fn from_input(input: &ScalingInput) -> Result<Self> {
        Self::new(input.mass, input.time, input.length, input.temperature, input.force)
    }

    /// Unit of the constant `B` of a power law `e = B s^n`.
    pub fn power_law(&self, n: f64) -> f64 {
        1.0 / (self.stress.powf(n) * self.time)
    }

    /// Scale a coupled solution vector `[velocities | pressure]` to nondimensional units.
    pub fn nondim_solution(&self, x: &mut [f64], lnv: usize) {
        let (v, p) = x.split_at_mut(lnv.min(x.len()));
        v.iter_mut().for_each(|a| *a /= self.velocity);
        p.iter_mut().for_each(|a| *a /= self.stress);
    }

    /// Inverse of [`Scaling::nondim_solution`].
    pub fn dim_solution(&self, x: &mut [f64], lnv: usize) {
        let (v, p) = x.split_at_mut(lnv.min(x.len()));
        v.iter_mut().for_each(|a| *a *= self.velocity);
        p.iter_mut().for_each(|a| *a *= self.stress);
    }

    pub fn summary(&self) {
        log::info!("Characteristic units:");
        log::info!("  length      : {:e}", self.length);
        log::info!("  time        : {:e}", self.time);
        log::info!("  mass        : {:e}", self.mass);
        log::info!("  temperature : {:e}", self.temperature);
        log::info!("  force       : {:e}", self.force);
        log::info!("  stress      : {:e}", self.stress);
        log::info!("  viscosity   : {:e}", self.viscosity);
    }
}

impl Default for Scaling {
    fn default() -> Self {
        Self::none()
    }
}
