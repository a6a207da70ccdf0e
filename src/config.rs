//! Configuration of a staggered-grid residual setup.
//!
//! Reads a TOML file and turns it into a grid and a residual assembler.
//! All dimensional values are given in physical units and divided by the
//! characteristic units of the optional `[scaling]` section.
//!
//! ```toml
//! [domain]
//! x_left = 0.0
//! y_front = 0.0
//! z_bot = -1.0
//! width = 2.0
//! length = 1.0
//! height = 1.0
//! nel_x = 16
//! nel_y = 8
//! nel_z = 8
//!
//! [limits]
//! dii_ref = 1e-15
//!
//! [[phases]]
//! rho = 3300.0
//! eta = 1e21
//! ```

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::grid::{IndexMode, SegmentInput, StaggeredGrid};
use crate::parallel::Communicator;
use crate::scaling::{Scaling, ScalingInput};
use crate::solution::{MatLimits, Phase, PhaseRheology, ResidualAssembler, ResidualParams};
use crate::timestepping::TimeStepState;

/// Main configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FdstagConfig {
    pub domain: DomainConfig,
    #[serde(default)]
    pub processes: ProcessConfig,
    #[serde(default)]
    pub residual: ResidualParams,
    #[serde(default)]
    pub time: TimeConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub scaling: Option<ScalingInput>,
    #[serde(default)]
    pub phases: Vec<Phase>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DomainConfig {
    pub x_left: f64,
    pub y_front: f64,
    pub z_bot: f64,
    pub width: f64,
    pub length: f64,
    pub height: f64,
    pub nel_x: usize,
    pub nel_y: usize,
    pub nel_z: usize,
    #[serde(default)]
    pub seg_x: SegmentInput,
    #[serde(default)]
    pub seg_y: SegmentInput,
    #[serde(default)]
    pub seg_z: SegmentInput,
}

/// Process grid. Zero lets the decomposition choose.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct ProcessConfig {
    #[serde(default)]
    pub px: usize,
    #[serde(default)]
    pub py: usize,
    #[serde(default)]
    pub pz: usize,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeConfig {
    pub dt: f64,
    pub dtmax: f64,
    pub cmax: f64,
}

impl Default for TimeConfig {
    fn default() -> Self {
        let ts = TimeStepState::default();
        Self {
            dt: ts.dt,
            dtmax: ts.dtmax,
            cmax: ts.cmax,
        }
    }
}

/// Viscosity and stress limits. `dii_ref` has no default.
///
/// An absent `eta_max` or `tau_ult` leaves the quantity unlimited.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub eta_min: f64,
    pub eta_max: Option<f64>,
    pub eta_ref: f64,
    pub dii_ref: Option<f64>,
    pub tau_ult: Option<f64>,
    pub shear_heat_eff: f64,
    pub quasi_harmonic: bool,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        let lim = MatLimits::default();
        Self {
            eta_min: lim.eta_min,
            eta_max: None,
            eta_ref: lim.eta_ref,
            dii_ref: None,
            tau_ult: None,
            shear_heat_eff: lim.shear_heat_eff,
            quasi_harmonic: lim.quasi_harm_avg,
        }
    }
}

impl FdstagConfig {
    /// Load and validate a configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate a configuration string.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: FdstagConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let d = &self.domain;
        if d.nel_x == 0 || d.nel_y == 0 || d.nel_z == 0 {
            return Err(Error::Config(format!(
                "cell counts must be positive, got {} x {} x {}",
                d.nel_x, d.nel_y, d.nel_z
            )));
        }
        if !(d.width > 0.0 && d.length > 0.0 && d.height > 0.0) {
            return Err(Error::Config("domain extents must be positive".into()));
        }
        let beg = [d.x_left, d.y_front, d.z_bot];
        let len = [d.width, d.length, d.height];
        let nel = [d.nel_x, d.nel_y, d.nel_z];
        let segs = [(&d.seg_x, 'x'), (&d.seg_y, 'y'), (&d.seg_z, 'z')];
        for (i, (seg, axis)) in segs.into_iter().enumerate() {
            seg.validate(axis, beg[i], beg[i] + len[i], nel[i])?;
        }
        for (name, v) in [
            ("dt", self.time.dt),
            ("dtmax", self.time.dtmax),
            ("cmax", self.time.cmax),
        ] {
            if !(v > 0.0) {
                return Err(Error::Config(format!("{} must be positive, got {}", name, v)));
            }
        }
        match self.limits.dii_ref {
            Some(v) if v > 0.0 => {}
            _ => return Err(Error::Config("Reference strain rate is not defined".into())),
        }
        if self.phases.is_empty() {
            return Err(Error::Config("at least one phase must be defined".into()));
        }
        Ok(())
    }

    /// Characteristic units, identity when `[scaling]` is absent.
    pub fn scaling(&self) -> Result<Scaling> {
        match &self.scaling {
            Some(input) => Scaling::from_input(input),
            None => Ok(Scaling::none()),
        }
    }

    /// Nondimensional domain box `(beg, end)`.
    pub fn domain_box(&self, scal: &Scaling) -> ([f64; 3], [f64; 3]) {
        let d = &self.domain;
        let beg = [d.x_left, d.y_front, d.z_bot];
        let len = [d.width, d.length, d.height];
        (
            beg.map(|b| b / scal.length),
            [0, 1, 2].map(|i| (beg[i] + len[i]) / scal.length),
        )
    }

    /// Nondimensional segment descriptions.
    pub fn segments(&self, scal: &Scaling) -> [SegmentInput; 3] {
        let d = &self.domain;
        [&d.seg_x, &d.seg_y, &d.seg_z].map(|s| SegmentInput {
            delims: s.delims.iter().map(|x| x / scal.length).collect(),
            ..s.clone()
        })
    }

    pub fn residual_params(&self, scal: &Scaling) -> ResidualParams {
        ResidualParams {
            gravity: self.residual.gravity.map(|g| g / scal.gravity_strength),
            ..self.residual
        }
    }

    pub fn time_step(&self, scal: &Scaling) -> TimeStepState {
        TimeStepState::new(
            self.time.dt / scal.time,
            self.time.dtmax / scal.time,
            self.time.cmax,
        )
    }

    pub fn mat_limits(&self, scal: &Scaling) -> Result<MatLimits> {
        let l = &self.limits;
        let dii_ref = l
            .dii_ref
            .ok_or_else(|| Error::Config("Reference strain rate is not defined".into()))?;
        let unlimited = MatLimits::default();
        Ok(MatLimits {
            eta_min: l.eta_min / scal.viscosity,
            eta_max: l.eta_max.map_or(unlimited.eta_max, |v| v / scal.viscosity),
            eta_ref: l.eta_ref / scal.viscosity,
            dii_ref: dii_ref / scal.strain_rate,
            tau_ult: l.tau_ult.map_or(unlimited.tau_ult, |v| v / scal.stress),
            shear_heat_eff: l.shear_heat_eff,
            quasi_harm_avg: l.quasi_harmonic,
            ..unlimited
        })
    }

    /// Nondimensional reference rheology.
    pub fn rheology(&self, scal: &Scaling) -> PhaseRheology {
        let phases = self
            .phases
            .iter()
            .map(|p| Phase {
                rho: p.rho / scal.density,
                eta: p.eta / scal.viscosity,
                shear_modulus: p.shear_modulus.map(|g| g / scal.stress),
                bulk_modulus: p.bulk_modulus.map(|k| k / scal.stress),
                alpha: p.alpha / scal.expansivity,
                cohesion: p.cohesion.map(|c| c / scal.stress),
                friction_angle: p.friction_angle,
            })
            .collect();
        PhaseRheology::new(phases)
    }

    /// Decompose the domain over `comm`, generate coordinates and number the DOFs.
    pub fn build_grid(&self, comm: Arc<dyn Communicator>) -> Result<StaggeredGrid> {
        let scal = self.scaling()?;
        let d = &self.domain;
        let p = &self.processes;

        let mut fs = StaggeredGrid::new(comm, [d.nel_x, d.nel_y, d.nel_z], [p.px, p.py, p.pz])?;
        let (beg, end) = self.domain_box(&scal);
        fs.gen_coord(beg, end, &self.segments(&scal));
        fs.compute_dof_index(IndexMode::Coupled);
        fs.view()?;
        Ok(fs)
    }

    /// Grid plus an assembler carrying every configured parameter.
    pub fn build_assembler(&self, comm: Arc<dyn Communicator>) -> Result<ResidualAssembler<PhaseRheology>> {
        let scal = self.scaling()?;
        let fs = self.build_grid(comm)?;
        Ok(
            ResidualAssembler::new(fs, self.rheology(&scal), self.residual_params(&scal))
                .with_limits(self.mat_limits(&scal)?)
                .with_time_step(self.time_step(&scal)),
        )
    }
}
