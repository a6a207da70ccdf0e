use std::sync::Arc;

use approx::assert_relative_eq;
use fdstag::grid::IndexMode;
use fdstag::solution::{SolVarBulk, SolVarDev};
use fdstag::{
    BoundaryConstraints, Communicator, Error, MatLimits, Phase, PhaseRheology, ResidualAssembler,
    ResidualParams, Rheology, RheologyError, SegmentInput, SerialComm, StaggeredGrid,
};

const P0: f64 = 3.0;
const PN: f64 = 1.0;
const RHO: f64 = 2.0;
const GZ: f64 = -10.0;

fn unit_box(n: usize) -> StaggeredGrid {
    let comm: Arc<dyn Communicator> = Arc::new(SerialComm);
    let mut fs = StaggeredGrid::new(comm, [n, n, n], [0, 0, 0]).unwrap();
    fs.gen_coord([0.0; 3], [1.0; 3], &Default::default());
    fs.compute_dof_index(IndexMode::Coupled);
    fs
}

/// Zero velocity, uniform pressure `P0`, compressible phase with `IKdt = 1`.
fn resting_box() -> (ResidualAssembler<PhaseRheology>, Vec<f64>) {
    let fs = unit_box(3);
    let rh = PhaseRheology::new(vec![Phase::viscous(RHO, 1.0).with_compressibility(2.0)]);
    let params = ResidualParams {
        gravity: [0.0, 0.0, GZ],
        ..Default::default()
    };
    let mut jr = ResidualAssembler::new(fs, rh, params);
    jr.ts.dt = 0.5;
    jr.set_history(&[PN; 27], &[0.0; 27]).unwrap();

    let dof = &jr.grid().dof;
    let mut x = vec![0.0; dof.ln];
    x[dof.lnv..].fill(P0);
    (jr, x)
}

#[test]
fn test_resting_box_residual() {
    let _ = env_logger::builder().is_test(true).try_init();

    let (mut jr, mut x) = resting_box();
    let mut f = vec![0.0; x.len()];
    jr.evaluate(&mut x, &mut f).unwrap();

    // continuity: only the compressibility term survives
    for &c in jr.continuity_residual() {
        assert_relative_eq!(c, -(P0 - PN), epsilon = 1e-12);
    }

    let fs = jr.grid().clone();
    let h = 1.0 / 3.0;
    let g = RHO * GZ;
    for d in 0..3 {
        let last = fs.ds[d].tnods as isize - 1;
        let gd = if d == 2 { g } else { 0.0 };
        let res = jr.momentum_residual(d);
        for (n, p) in fs.da_face(d).owned_points().enumerate() {
            let expect = if p[d] == 0 {
                P0 / h - gd / 2.0
            } else if p[d] == last {
                -P0 / h - gd / 2.0
            } else {
                -gd
            };
            assert_relative_eq!(res[n], expect, epsilon = 1e-10);
        }
    }

    // the coupled vector carries the same blocks
    let lnv = fs.dof.lnv;
    assert_relative_eq!(f[lnv], -(P0 - PN), epsilon = 1e-12);
    assert_relative_eq!(f[0], P0 / h, epsilon = 1e-10);
}

#[test]
fn test_resting_box_state() {
    let (mut jr, mut x) = resting_box();
    let mut f = vec![0.0; x.len()];
    jr.evaluate(&mut x, &mut f).unwrap();

    for sv in &jr.sv_cell {
        assert_eq!(sv.dev.dii, 0.0);
        assert_relative_eq!(sv.bulk.rho, RHO);
        assert_relative_eq!(sv.bulk.ikdt, 1.0);
        assert_eq!(sv.sxx, 0.0);
        assert_relative_eq!(sv.eta_creep, 1.0);
    }
    for edges in &jr.sv_edge {
        for sv in edges {
            assert_eq!(sv.s, 0.0);
            assert_relative_eq!(sv.dev.eta, 1.0);
        }
    }
}

#[test]
fn test_dirichlet_nullification() {
    let (mut jr, _) = resting_box();
    let bc = BoundaryConstraints::dirichlet_box(jr.grid(), |d, x| (d as f64 + 1.0) * x.x).unwrap();
    jr.bc = bc;
    jr.bc.fix_pressure(jr.grid().dof.lnv + 13, 7.5);

    let ln = jr.grid().dof.ln;
    let mut x: Vec<f64> = (0..ln).map(|i| 0.01 * i as f64).collect();
    let mut f = vec![1.0; ln];
    jr.evaluate(&mut x, &mut f).unwrap();

    let spc: Vec<(usize, f64)> = jr.bc.vel_spc.iter().chain(&jr.bc.p_spc).copied().collect();
    assert!(!spc.is_empty());
    for (id, value) in spc {
        assert_eq!(x[id], value);
        assert_eq!(f[id], 0.0);
    }
}

#[test]
fn test_pressure_shift_only_affects_rheology() {
    let (mut jr, mut x) = resting_box();
    jr.params.shift_pressure = true;
    let mut f = vec![0.0; x.len()];
    jr.evaluate(&mut x, &mut f).unwrap();
    assert_relative_eq!(jr.p_shift, P0);
    // total stress still uses the unshifted pressure
    assert_relative_eq!(jr.momentum_residual(0)[0], P0 * 3.0, epsilon = 1e-10);
}

/// Uniform sinking velocity `w` through a biased z axis with a density jump.
///
/// z cells are 0.4, 0.6 and 0.8 wide (one segment on `[0, 1.8]`, bias 2), so
/// the center distances around the z nodes are 0.4, 0.5, 0.7 and 0.8.
/// The bottom cell layer has density 1, the others density 3.
fn sinking_column(fssa: f64, w: f64) -> (ResidualAssembler<PhaseRheology>, Vec<f64>) {
    let comm: Arc<dyn Communicator> = Arc::new(SerialComm);
    let mut fs = StaggeredGrid::new(comm, [2, 2, 3], [0, 0, 0]).unwrap();
    let seg_z = SegmentInput {
        delims: vec![],
        ncells: vec![3],
        biases: vec![2.0],
    };
    fs.gen_coord(
        [0.0; 3],
        [1.0, 1.0, 1.8],
        &[SegmentInput::default(), SegmentInput::default(), seg_z],
    );
    fs.compute_dof_index(IndexMode::Coupled);

    let rh = PhaseRheology::new(vec![Phase::viscous(1.0, 1.0), Phase::viscous(3.0, 1.0)]);
    let params = ResidualParams {
        gravity: [0.0, 0.0, GZ],
        fssa,
        ..Default::default()
    };
    let mut jr = ResidualAssembler::new(fs, rh, params);
    jr.ts.dt = 0.25;
    jr.set_phase_ratios(|x| usize::from(x.z > 0.4)).unwrap();

    let fs = jr.grid();
    let nx = fs.da_face(0).owned_len();
    let ny = fs.da_face(1).owned_len();
    let nz = fs.da_face(2).owned_len();
    let mut x = vec![0.0; fs.dof.ln];
    x[nx + ny..nx + ny + nz].fill(w);
    (jr, x)
}

#[test]
fn test_free_surface_stabilization() {
    let (mut jr, mut x) = sinking_column(0.8, 0.5);
    let mut f = vec![0.0; x.len()];
    jr.evaluate(&mut x, &mut f).unwrap();

    let fs = jr.grid().clone();
    for (i, h) in [0.4, 0.6, 0.8].into_iter().enumerate() {
        assert_relative_eq!(fs.ds[2].size_cell(i as isize), h, epsilon = 1e-12);
    }
    for (i, h) in [0.4, 0.5, 0.7, 0.8].into_iter().enumerate() {
        assert_relative_eq!(fs.ds[2].size_node(i as isize), h, epsilon = 1e-12);
    }

    // w * fssa * dt * gz = 0.5 * 0.8 * 0.25 * -10 = -1
    // face k: -(rho_below - rho_above) / size_node(k) - gz (rho_below + rho_above) / 2
    let expected = [
        2.5 + 5.0,    // k = 0: (0 - 1) / 0.4
        4.0 + 20.0,   // k = 1: (1 - 3) / 0.5
        30.0,         // k = 2: no density jump
        -3.75 + 15.0, // k = 3: (3 - 0) / 0.8
    ];
    let res = jr.momentum_residual(2);
    for (n, p) in fs.da_face(2).owned_points().enumerate() {
        assert_relative_eq!(res[n], expected[p[2] as usize], epsilon = 1e-10);
    }
    for d in 0..2 {
        for &r in jr.momentum_residual(d) {
            assert_relative_eq!(r, 0.0, epsilon = 1e-12);
        }
    }
}

#[test]
fn test_stabilization_vanishes_at_rest() {
    let (mut jr, mut x) = sinking_column(0.8, 0.0);
    let mut f = vec![0.0; x.len()];
    jr.evaluate(&mut x, &mut f).unwrap();

    let (mut jr0, mut x0) = sinking_column(0.0, 0.0);
    let mut f0 = vec![0.0; x0.len()];
    jr0.evaluate(&mut x0, &mut f0).unwrap();

    for (a, b) in f.iter().zip(&f0) {
        assert_relative_eq!(*a, *b, epsilon = 1e-12);
    }
}

/// Rheology whose local iteration never converges.
struct Stubborn;

impl Rheology for Stubborn {
    fn deviatoric(
        &self,
        _dev: &mut SolVarDev,
        _phase_ratios: &[f64],
        _limits: &MatLimits,
        _dt: f64,
        _p: f64,
        _t: f64,
    ) -> Result<f64, RheologyError> {
        Err(RheologyError::NonConvergent("yield iteration".into()))
    }

    fn volumetric(
        &self,
        _bulk: &mut SolVarBulk,
        _phase_ratios: &[f64],
        _limits: &MatLimits,
        _dt: f64,
        _p: f64,
        _t: f64,
    ) -> Result<(), RheologyError> {
        Ok(())
    }
}

#[test]
fn test_constitutive_failure_propagates() {
    let fs = unit_box(2);
    let ln = fs.dof.ln;
    let mut jr = ResidualAssembler::new(fs, Stubborn, ResidualParams::default());
    let mut x = vec![0.0; ln];
    let mut f = vec![0.0; ln];
    match jr.evaluate(&mut x, &mut f) {
        Err(Error::Constitutive(RheologyError::NonConvergent(msg))) => {
            assert_eq!(msg, "yield iteration")
        }
        other => panic!("unexpected result: {:?}", other),
    }
    // the residual was never completed
    assert!(matches!(jr.copy_residual(&mut f), Err(Error::PhaseOrder(_))));
}
