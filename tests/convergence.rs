//! Residual of an exact Stokes solution under grid refinement.
//!
//! `v = grad(phi)` with the harmonic potential `phi = exp(x) sin(z)` and zero
//! pressure solves the incompressible Stokes equations with constant viscosity
//! and no body force. The discrete residual of the sampled fields is the
//! truncation error of the scheme and must decay as `h^2` away from the
//! boundary.

use std::sync::Arc;

use fdstag::grid::{face_kinds, IndexMode, CENTER_KINDS};
use fdstag::{
    BoundaryConstraints, Communicator, Phase, PhaseRheology, ResidualAssembler, ResidualParams,
    SerialComm, StaggeredGrid,
};
use nalgebra::Point3;

fn velocity(d: usize, x: &Point3<f64>) -> f64 {
    match d {
        0 => x.x.exp() * x.z.sin(),
        1 => 0.0,
        _ => x.x.exp() * x.z.cos(),
    }
}

fn inside(x: &Point3<f64>) -> bool {
    let r = 0.25 - 1e-12..=0.75 + 1e-12;
    r.contains(&x.x) && r.contains(&x.z)
}

/// Largest momentum and continuity residual in the interior window.
fn interior_residual(n: usize) -> (f64, f64) {
    let comm: Arc<dyn Communicator> = Arc::new(SerialComm);
    let mut fs = StaggeredGrid::new(comm, [n, 2, n], [0, 0, 0]).unwrap();
    fs.gen_coord([0.0; 3], [1.0; 3], &Default::default());
    fs.compute_dof_index(IndexMode::Coupled);

    let bc = BoundaryConstraints::dirichlet_box(&fs, velocity).unwrap();
    let rh = PhaseRheology::new(vec![Phase::viscous(0.0, 1.0)]);
    let mut jr = ResidualAssembler::new(fs, rh, ResidualParams::default()).with_constraints(bc);

    let fs = jr.grid().clone();
    let mut x = vec![0.0; fs.dof.ln];
    for d in 0..3 {
        for p in fs.da_face(d).owned_points() {
            let id = fs.dof.velocity_dof(d, p).unwrap();
            x[id] = velocity(d, &fs.coord(face_kinds(d), p));
        }
    }
    let mut f = vec![0.0; x.len()];
    jr.evaluate(&mut x, &mut f).unwrap();

    let mut mom: f64 = 0.0;
    for d in 0..3 {
        let kinds = face_kinds(d);
        let res = jr.momentum_residual(d);
        for (i, p) in fs.da_face(d).owned_points().enumerate() {
            if inside(&fs.coord(kinds, p)) {
                mom = mom.max(res[i].abs());
            }
        }
    }
    let mut div: f64 = 0.0;
    for (i, p) in fs.da_cen.owned_points().enumerate() {
        if inside(&fs.coord(CENTER_KINDS, p)) {
            div = div.max(jr.continuity_residual()[i].abs());
        }
    }
    (mom, div)
}

#[test]
fn test_second_order_convergence() {
    let (mom8, div8) = interior_residual(8);
    let (mom16, div16) = interior_residual(16);

    assert!(mom16 > 0.0 && div16 > 0.0);
    assert!(mom8 / mom16 > 3.0, "momentum ratio {}", mom8 / mom16);
    assert!(div8 / div16 > 3.0, "continuity ratio {}", div8 / div16);
    assert!(mom16 < 5e-2, "momentum residual {}", mom16);
}
