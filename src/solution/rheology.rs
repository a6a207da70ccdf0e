//! Constitutive closures used by the residual assembler.
//!
//! The assembler only needs four closures: the deviatoric law (effective
//! viscosity), the volumetric law (density, compressibility, expansion), and
//! stress evaluation at cells and edges. [`Rheology`] is that seam;
//! [`PhaseRheology`] is a reference multi-phase implementation.

use serde::{Deserialize, Serialize};

use super::state::{SolVarBulk, SolVarCell, SolVarDev, SolVarEdge};

/// Failure of a constitutive evaluation.
///
/// Propagated unchanged to the caller of the residual evaluation, which
/// decides whether to cut the time step and retry.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RheologyError {
    #[error("non-convergent constitutive update: {0}")]
    NonConvergent(String),

    #[error("expected {expected} phase ratios, got {found}")]
    PhaseCount { expected: usize, found: usize },

    #[error("invalid material parameter: {0}")]
    InvalidParameter(String),
}

/// Material parameter limits (global for all phases).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct MatLimits {
    /// Minimum viscosity.
    pub eta_min: f64,
    /// Maximum viscosity.
    pub eta_max: f64,
    /// Reference viscosity (initial guess).
    pub eta_ref: f64,
    /// Reference strain rate, lower bound of the strain rate in plastic viscosities.
    pub dii_ref: f64,
    /// Ultimate yield stress.
    pub tau_ult: f64,
    /// Shear heating efficiency.
    pub shear_heat_eff: f64,
    /// Average phase viscosities as a power mean instead of arithmetically.
    pub quasi_harm_avg: bool,
    /// Gas constant.
    pub rugc: f64,
    /// Relative tolerance of local viscosity iterations.
    pub eta_rtol: f64,
}

impl Default for MatLimits {
    fn default() -> Self {
        Self {
            eta_min: 0.0,
            eta_max: f64::MAX,
            eta_ref: 1.0,
            dii_ref: 1.0,
            tau_ult: f64::MAX,
            shear_heat_eff: 1.0,
            quasi_harm_avg: false,
            rugc: 8.3144621,
            eta_rtol: 1e-8,
        }
    }
}

/// Constitutive closures evaluated per point.
///
/// `phase_ratios` always has one entry per phase and sums to one.
pub trait Rheology {
    /// Number of phases expected in every phase ratio slice.
    fn num_phases(&self) -> usize {
        1
    }

    /// Effective viscosity from the current second invariant (`dev.dii`).
    ///
    /// Writes `dev.eta` (and plastic state), returns the creep viscosity.
    fn deviatoric(
        &self,
        dev: &mut SolVarDev,
        phase_ratios: &[f64],
        limits: &MatLimits,
        dt: f64,
        p: f64,
        t: f64,
    ) -> Result<f64, RheologyError>;

    /// Density, inverse bulk viscosity and thermal expansion.
    ///
    /// The volumetric strain rate and the pressure/temperature history are
    /// left untouched.
    fn volumetric(
        &self,
        bulk: &mut SolVarBulk,
        phase_ratios: &[f64],
        limits: &MatLimits,
        dt: f64,
        p: f64,
        t: f64,
    ) -> Result<(), RheologyError>;

    /// Deviatoric stress at a cell center from the effective strain rate.
    fn stress_cell(
        &self,
        cell: &mut SolVarCell,
        limits: &MatLimits,
        dxx: f64,
        dyy: f64,
        dzz: f64,
    ) -> Result<(), RheologyError> {
        let eta = cell.dev.eta;
        cell.sxx = 2.0 * eta * dxx;
        cell.syy = 2.0 * eta * dyy;
        cell.szz = 2.0 * eta * dzz;
        cell.dev.hr = limits.shear_heat_eff
            * (cell.sxx * cell.dxx + cell.syy * cell.dyy + cell.szz * cell.dzz);
        Ok(())
    }

    /// Shear stress at an edge from the effective strain rate.
    fn stress_edge(&self, edge: &mut SolVarEdge, limits: &MatLimits, d: f64) -> Result<(), RheologyError> {
        edge.s = 2.0 * edge.dev.eta * d;
        // both symmetric off-diagonal entries contribute
        edge.dev.hr = limits.shear_heat_eff * 2.0 * edge.s * edge.d;
        Ok(())
    }

    /// Inverse elastic viscosity `1/(2*G*dt)` of a point. Zero for purely viscous materials.
    fn inverse_elastic_viscosity(&self, _phase_ratios: &[f64], _dt: f64) -> f64 {
        0.0
    }
}

/// Material phase of the reference rheology.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Phase {
    /// Reference density.
    pub rho: f64,
    /// Linear (Newtonian) viscosity.
    pub eta: f64,
    /// Shear modulus, `None` for a viscous phase.
    #[serde(default)]
    pub shear_modulus: Option<f64>,
    /// Bulk modulus, `None` for an incompressible phase.
    #[serde(default)]
    pub bulk_modulus: Option<f64>,
    /// Thermal expansion coefficient.
    #[serde(default)]
    pub alpha: f64,
    /// Drucker-Prager cohesion, `None` disables plasticity.
    #[serde(default)]
    pub cohesion: Option<f64>,
    /// Drucker-Prager friction angle (degrees).
    #[serde(default)]
    pub friction_angle: f64,
}

impl Phase {
    /// Incompressible Newtonian phase.
    pub fn viscous(rho: f64, eta: f64) -> Self {
        Self {
            rho,
            eta,
            shear_modulus: None,
            bulk_modulus: None,
            alpha: 0.0,
            cohesion: None,
            friction_angle: 0.0,
        }
    }

    pub fn with_elasticity(mut self, shear_modulus: f64) -> Self {
        self.shear_modulus = Some(shear_modulus);
        self
    }

    pub fn with_compressibility(mut self, bulk_modulus: f64) -> Self {
        self.bulk_modulus = Some(bulk_modulus);
        self
    }

    pub fn with_expansion(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_plasticity(mut self, cohesion: f64, friction_angle_deg: f64) -> Self {
        self.cohesion = Some(cohesion);
        self.friction_angle = friction_angle_deg;
        self
    }

    /// Drucker-Prager yield stress at pressure `p`:
    ///
    /// ```text
    /// τ_y = C cos φ + p sin φ
    /// ```
    ///
    /// Capped by `tau_ult`, `None` for a non-plastic phase.
    pub fn yield_stress(&self, p: f64, tau_ult: f64) -> Option<f64> {
        let c = self.cohesion?;
        let phi = self.friction_angle.to_radians();
        Some((c * phi.cos() + p * phi.sin()).max(0.0).min(tau_ult))
    }

    /// Maxwell visco-elastic viscosity:
    ///
    /// ```text
    /// η_ve = 1 / (1/η + 1/(G Δt))
    /// ```
    pub fn visco_elastic_viscosity(&self, dt: f64) -> f64 {
        match self.shear_modulus {
            Some(g) => 1.0 / (1.0 / self.eta + 1.0 / (g * dt)),
            None => self.eta,
        }
    }
}

/// Multi-phase reference rheology.
///
/// Per phase: Maxwell visco-elastic viscosity, limited by the Drucker-Prager
/// plastic viscosity `τ_y / (2 max(DII, DII_ref))`. Phase viscosities are
/// averaged arithmetically or, with `quasi_harm_avg`, as a power mean with
/// exponent 1/4. The result is clamped to `[eta_min, eta_max]`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PhaseRheology {
    pub phases: Vec<Phase>,
}

impl PhaseRheology {
    pub fn new(phases: Vec<Phase>) -> Self {
        Self { phases }
    }

    fn check(&self, phase_ratios: &[f64]) -> Result<(), RheologyError> {
        if phase_ratios.len() != self.phases.len() {
            return Err(RheologyError::PhaseCount {
                expected: self.phases.len(),
                found: phase_ratios.len(),
            });
        }
        Ok(())
    }
}

/// Running phase average of viscosities.
struct ViscosityMean {
    quasi_harmonic: bool,
    sum: f64,
}

impl ViscosityMean {
    fn new(quasi_harmonic: bool) -> Self {
        Self { quasi_harmonic, sum: 0.0 }
    }

    fn add(&mut self, weight: f64, eta: f64) {
        self.sum += if self.quasi_harmonic {
            weight * eta.powf(0.25)
        } else {
            weight * eta
        };
    }

    fn value(&self) -> f64 {
        if self.quasi_harmonic {
            self.sum.powi(4)
        } else {
            self.sum
        }
    }
}

impl Rheology for PhaseRheology {
    fn num_phases(&self) -> usize {
        self.phases.len()
    }

    fn deviatoric(
        &self,
        dev: &mut SolVarDev,
        phase_ratios: &[f64],
        limits: &MatLimits,
        dt: f64,
        p: f64,
        _t: f64,
    ) -> Result<f64, RheologyError> {
        self.check(phase_ratios)?;

        let dii = dev.dii.max(limits.dii_ref);

        let mut eta = ViscosityMean::new(limits.quasi_harm_avg);
        let mut creep = ViscosityMean::new(limits.quasi_harm_avg);
        let mut dii_pl = 0.0;
        let mut yield_stress = 0.0;

        for (phase, &phi) in self.phases.iter().zip(phase_ratios) {
            if phi == 0.0 {
                continue;
            }
            let eta_ve = phase.visco_elastic_viscosity(dt);
            let mut eta_ph = eta_ve;

            let tau_y = phase.yield_stress(p, limits.tau_ult).or_else(|| {
                (limits.tau_ult < f64::MAX).then_some(limits.tau_ult)
            });
            if let Some(tau_y) = tau_y {
                let eta_pl = tau_y / (2.0 * dii);
                if eta_pl < eta_ve {
                    eta_ph = eta_pl;
                    // strain rate in excess of the visco-elastic response
                    dii_pl += phi * (dev.dii - tau_y / (2.0 * eta_ve)).max(0.0);
                }
                yield_stress += phi * tau_y;
            }

            eta.add(phi, eta_ph);
            creep.add(phi, phase.eta);
        }

        let eta = eta.value().clamp(limits.eta_min, limits.eta_max);
        if !eta.is_finite() || eta <= 0.0 {
            return Err(RheologyError::NonConvergent(format!(
                "effective viscosity {} at DII = {}",
                eta, dev.dii
            )));
        }

        dev.eta = eta;
        dev.dii_pl = dii_pl;
        dev.yield_stress = yield_stress;

        Ok(creep.value())
    }

    fn volumetric(
        &self,
        bulk: &mut SolVarBulk,
        phase_ratios: &[f64],
        _limits: &MatLimits,
        dt: f64,
        _p: f64,
        t: f64,
    ) -> Result<(), RheologyError> {
        self.check(phase_ratios)?;

        let mut rho = 0.0;
        let mut ikdt = 0.0;
        let mut alpha = 0.0;

        for (phase, &phi) in self.phases.iter().zip(phase_ratios) {
            if phi == 0.0 {
                continue;
            }
            rho += phi * phase.rho * (1.0 - phase.alpha * t);
            if let Some(k) = phase.bulk_modulus {
                ikdt += phi / (k * dt);
            }
            alpha += phi * phase.alpha;
        }

        if !(rho.is_finite() && ikdt.is_finite()) {
            return Err(RheologyError::NonConvergent(format!(
                "volumetric state rho = {}, IKdt = {}",
                rho, ikdt
            )));
        }

        bulk.rho = rho;
        bulk.ikdt = ikdt;
        bulk.alpha = alpha;
        Ok(())
    }

    fn inverse_elastic_viscosity(&self, phase_ratios: &[f64], dt: f64) -> f64 {
        self.phases
            .iter()
            .zip(phase_ratios)
            .filter_map(|(phase, &phi)| phase.shear_modulus.map(|g| phi / (2.0 * g * dt)))
            .sum()
    }
}
