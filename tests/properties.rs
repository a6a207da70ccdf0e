use std::sync::Arc;

use fdstag::grid::IndexMode;
use fdstag::timestepping::max_inverse_step;
use fdstag::{
    Communicator, MeshSeg1D, Phase, PhaseRheology, ResidualAssembler, ResidualParams,
    SegmentInput, SerialComm, StaggeredGrid, TimeStepState,
};
use proptest::prelude::*;

/// 3 x 2 x 2 cells: 16 + 18 + 18 velocities and 12 pressures.
const LN: usize = 64;

fn small_grid(segs: &[SegmentInput; 3]) -> StaggeredGrid {
    let comm: Arc<dyn Communicator> = Arc::new(SerialComm);
    let mut fs = StaggeredGrid::new(comm, [3, 2, 2], [0, 0, 0]).unwrap();
    fs.gen_coord([0.0; 3], [1.5, 1.0, 0.8], segs);
    fs.compute_dof_index(IndexMode::Coupled);
    fs
}

fn stretched() -> [SegmentInput; 3] {
    [
        SegmentInput {
            delims: vec![0.5],
            ncells: vec![1, 2],
            biases: vec![1.0, 3.0],
        },
        SegmentInput::default(),
        SegmentInput::default(),
    ]
}

fn assembler(uniform: bool) -> ResidualAssembler<PhaseRheology> {
    let segs = if uniform { Default::default() } else { stretched() };
    let rh = PhaseRheology::new(vec![
        Phase::viscous(1.0, 1.0).with_elasticity(2.0).with_plasticity(0.5, 30.0),
    ]);
    let mut jr = ResidualAssembler::new(small_grid(&segs), rh, ResidualParams::default());
    // tensile pressures drive the yield stress to zero
    jr.limits.eta_min = 1e-3;
    jr.get_i2gdt();
    jr
}

proptest! {
    #[test]
    fn deviatoric_strain_rate_is_trace_free(
        x in prop::collection::vec(-10.0..10.0f64, LN),
        uniform in any::<bool>(),
    ) {
        let mut jr = assembler(uniform);
        let mut x = x;
        jr.copy_solution(&mut x).unwrap();
        jr.eff_strain_rate().unwrap();

        for sv in &jr.sv_cell {
            let scale = 1.0 + sv.bulk.theta.abs();
            prop_assert!((sv.dxx + sv.dyy + sv.dzz).abs() <= 1e-12 * scale);
        }
    }

    #[test]
    fn second_invariant_is_never_negative(
        x in prop::collection::vec(-1e3..1e3f64, LN),
        hist in -5.0..5.0f64,
    ) {
        let mut jr = assembler(false);
        for sv in jr.sv_cell.iter_mut() {
            sv.hxx = hist;
            sv.hzz = -hist;
        }
        for sv in jr.sv_edge.iter_mut().flatten() {
            sv.h = hist;
        }
        let mut x = x;
        let mut f = vec![0.0; LN];
        jr.evaluate(&mut x, &mut f).unwrap();

        for sv in jr.sv_cell.iter() {
            prop_assert!(sv.dev.dii >= 0.0 && sv.dev.dii.is_finite());
        }
        for sv in jr.sv_edge.iter().flatten() {
            prop_assert!(sv.dev.dii >= 0.0 && sv.dev.dii.is_finite());
        }
        prop_assert!(f.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn courant_step_respects_all_bounds(
        v in prop::collection::vec(-5.0..5.0f64, 52),
        dt in 1e-3..10.0f64,
        dtmax in 1e-3..10.0f64,
        cmax in 0.1..1.0f64,
        uniform in any::<bool>(),
    ) {
        let segs = if uniform { Default::default() } else { stretched() };
        let fs = small_grid(&segs);
        let (vx, rest) = v.split_at(16);
        let (vy, vz) = rest.split_at(18);

        let idtmax = (0..3)
            .map(|d| max_inverse_step(&fs, d, [vx, vy, vz][d]))
            .fold(0.0, f64::max);

        let mut ts = TimeStepState::new(dt, dtmax, cmax);
        let new_dt = ts.courant_step(&fs, [vx, vy, vz]);

        let tol = 1.0 + 1e-12;
        prop_assert!(new_dt <= 1.1 * dt * tol);
        prop_assert!(new_dt <= dtmax);
        prop_assert!(new_dt * idtmax / cmax <= tol);
        prop_assert_eq!(ts.pdt, dt);
    }

    #[test]
    fn segments_join_for_any_bias(
        b0 in 0.2..5.0f64,
        b1 in 0.2..5.0f64,
        n0 in 1usize..8,
        n1 in 1usize..8,
        delim in 0.1..0.9f64,
    ) {
        let ms = MeshSeg1D::new(
            0.0,
            1.0,
            n0 + n1,
            &SegmentInput {
                delims: vec![delim],
                ncells: vec![n0, n1],
                biases: vec![b0, b1],
            },
        );
        let mut a = vec![0.0; n0 + 1];
        ms.gen_coord(0, 0, &mut a);
        let mut b = vec![0.0; n1 + 1];
        ms.gen_coord(1, 0, &mut b);

        prop_assert_eq!(a[0], 0.0);
        prop_assert_eq!(a[n0], b[0]);
        prop_assert_eq!(b[n1], 1.0);
        prop_assert!(a.windows(2).chain(b.windows(2)).all(|w| w[1] > w[0]));
    }
}
