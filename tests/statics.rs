#![warn(clippy::pedantic)]

use approx::assert_relative_eq;
use proptest::prelude::*;
use stabwerk::{
    point2, point3, render_summary, AnalysisError, ElasticBars, ForceLaw, RootOptions, Truss,
    Truss2, Truss3, TrussModel, Vector, DEFAULT_STIFFNESS,
};

const LOAD: f64 = 100.0;

fn build_roof_truss(load: Vector<2>) -> Truss2 {
    Truss::builder(vec![point2(0.0, 0.0), point2(2.0, 0.0), point2(1.0, 1.0)])
        .supports([0, 1])
        .bars([[0, 2], [1, 2]])
        .external_forces([point2(0.0, 0.0), point2(0.0, 0.0), load])
        .build()
        .expect("roof truss is valid")
}

fn build_tripod_truss(load: Vector<3>) -> Truss3 {
    Truss::builder(vec![
        point3(1.0, 0.0, 0.0),
        point3(-0.5, 0.8, 0.0),
        point3(-0.5, -0.8, 0.0),
        point3(0.0, 0.0, 1.5),
    ])
    .supports([0, 1, 2])
    .bars([[0, 3], [1, 3], [2, 3]])
    .masses([0.0, 0.0, 0.0, 20.0])
    .external_forces([
        point3(0.0, 0.0, 0.0),
        point3(0.0, 0.0, 0.0),
        point3(0.0, 0.0, 0.0),
        load,
    ])
    .build()
    .expect("tripod truss is valid")
}

#[test]
fn single_bar_follows_the_sign_convention() {
    let truss = Truss::builder(vec![point2(0.0, 0.0), point2(1.0, 0.0)])
        .supports([0])
        .bars([[0, 1]])
        .without_gravity()
        .build()
        .expect("single bar is valid");
    let mut model = TrussModel::elastic(truss, 500.0).expect("stiffness is positive");

    model
        .truss_mut()
        .move_point(1, point2(1.2, 0.0))
        .expect("point exists");
    let stretched = model.bar_scalar_forces().expect("elastic forces");
    assert!(stretched[0] > 0.0);
    // Tension pulls the free end back towards the support.
    let on_points = model.bar_forces_on_points().expect("elastic forces");
    assert!(on_points[1].x < 0.0);

    model
        .truss_mut()
        .move_point(1, point2(0.8, 0.0))
        .expect("point exists");
    let compressed = model.bar_scalar_forces().expect("elastic forces");
    assert!(compressed[0] < 0.0);
    let on_points = model.bar_forces_on_points().expect("elastic forces");
    assert!(on_points[1].x > 0.0);
}

#[test]
fn rigid_and_stiff_elastic_trusses_agree() {
    let load = point2(0.0, -LOAD);
    let rigid = TrussModel::rigid(build_roof_truss(load));
    let mut elastic = TrussModel::elastic(build_roof_truss(load), 1e8).expect("stiffness is positive");
    elastic
        .find_equilibrium(&RootOptions::default())
        .expect("elastic equilibrium exists");

    let rigid_forces = rigid.bar_scalar_forces().expect("roof is determinate");
    let elastic_forces = elastic.bar_scalar_forces().expect("elastic forces");
    let expected = -LOAD / 2.0_f64.sqrt();
    for (rigid, elastic) in rigid_forces.iter().zip(&elastic_forces) {
        assert_relative_eq!(*rigid, expected, epsilon = 1e-9);
        assert_relative_eq!(*elastic, expected, max_relative = 1e-5);
    }
    assert!(rigid.is_in_equilibrium());
    assert!(elastic.is_in_equilibrium());
}

#[test]
fn elastic_forces_approach_rigid_forces_with_stiffness() {
    let load = point2(40.0, -LOAD);
    let rigid = TrussModel::rigid(build_roof_truss(load))
        .bar_scalar_forces()
        .expect("roof is determinate");

    let errors: Vec<f64> = [1e4, 1e6, 1e8]
        .into_iter()
        .map(|stiffness| {
            let mut elastic =
                TrussModel::elastic(build_roof_truss(load), stiffness).expect("stiffness is positive");
            elastic
                .find_equilibrium(&RootOptions::default())
                .expect("elastic equilibrium exists");
            elastic
                .bar_scalar_forces()
                .expect("elastic forces")
                .iter()
                .zip(&rigid)
                .fold(0.0_f64, |max, (elastic, rigid)| max.max((elastic - rigid).abs()))
        })
        .collect();

    for pair in errors.windows(2) {
        assert!(pair[1] < pair[0] / 10.0, "errors do not shrink: {errors:?}");
    }
    assert!(errors[2] < 1e-3, "errors: {errors:?}");
}

#[test]
fn equilibrium_does_not_depend_on_the_origin() {
    let load = point2(0.0, -LOAD);
    let mut reference =
        TrussModel::elastic(build_roof_truss(load), DEFAULT_STIFFNESS).expect("stiffness is positive");
    reference
        .find_equilibrium(&RootOptions::default())
        .expect("equilibrium exists");
    let sag = reference.truss().points()[2] - point2(1.0, 1.0);

    for offset in [100.0, 1_000.0] {
        let shift = point2(offset, offset);
        let mut truss = build_roof_truss(load);
        let moved = truss.points().iter().map(|point| point + shift).collect();
        truss.set_points(moved).expect("translation keeps the bars");
        let mut model = TrussModel::elastic(truss, DEFAULT_STIFFNESS).expect("stiffness is positive");

        model
            .find_equilibrium(&RootOptions::default())
            .expect("equilibrium exists away from the origin");
        assert!(model.is_in_equilibrium(), "offset {offset}");
        let shifted_sag = model.truss().points()[2] - point2(1.0, 1.0) - shift;
        assert_relative_eq!((shifted_sag - sag).norm(), 0.0, epsilon = 1e-9);
    }
}

#[test]
fn spatial_truss_matches_between_force_laws() {
    let load = point3(30.0, -10.0, -500.0);
    let rigid = TrussModel::rigid(build_tripod_truss(load));
    let mut elastic = TrussModel::elastic(build_tripod_truss(load), 1e8).expect("stiffness is positive");
    elastic
        .find_equilibrium(&RootOptions::default())
        .expect("elastic equilibrium exists");

    let rigid_forces = rigid.bar_scalar_forces().expect("tripod is determinate");
    let elastic_forces = elastic.bar_scalar_forces().expect("elastic forces");
    for (rigid, elastic) in rigid_forces.iter().zip(&elastic_forces) {
        assert!(*rigid < 0.0, "a loaded tripod is in compression");
        assert_relative_eq!(*elastic, *rigid, max_relative = 1e-4);
    }

    let reactions = rigid.support_reactions().expect("tripod is determinate");
    let total: Vector<3> = reactions.iter().sum();
    assert_relative_eq!(total.z, 500.0 + 20.0 * 9.81, epsilon = 1e-9);
    assert_relative_eq!(total.x, -30.0, epsilon = 1e-9);
}

#[test]
fn equilibrium_search_is_idempotent() {
    let mut model =
        TrussModel::elastic(build_roof_truss(point2(40.0, -LOAD)), 1e5).expect("stiffness is positive");
    let first = model
        .find_equilibrium(&RootOptions::default())
        .expect("equilibrium exists");
    assert!(first.iterations > 0);
    let settled = model.truss().points().to_vec();

    let second = model
        .find_equilibrium(&RootOptions::default())
        .expect("equilibrium still holds");
    assert_eq!(second.iterations, 0);
    assert_eq!(model.truss().points(), settled.as_slice());
}

#[test]
fn linearized_and_elastic_equilibria_coincide() {
    let load = point2(40.0, -LOAD);
    let mut elastic = TrussModel::elastic(build_roof_truss(load), 1e4).expect("stiffness is positive");
    let mut linearized = elastic.linearize().expect("elastic model linearizes");
    elastic
        .find_equilibrium(&RootOptions::default())
        .expect("elastic equilibrium exists");
    linearized
        .find_equilibrium(&RootOptions::default())
        .expect("linear steps converge");

    let a = elastic.truss().points()[2];
    let b = linearized.truss().points()[2];
    assert_relative_eq!((a - b).norm(), 0.0, epsilon = 1e-6);
}

#[test]
fn failed_linear_search_restores_the_model() {
    let mut model =
        TrussModel::linearized(build_roof_truss(point2(0.0, -LOAD)), 1e3).expect("stiffness is positive");
    let points = model.truss().points().to_vec();
    let law = model.law().clone();

    let result = model.find_equilibrium(&RootOptions::default().with_max_iterations(1));
    match result {
        Err(AnalysisError::NotConverged(report)) => {
            assert!(!report.success);
            assert_eq!(report.iterations, 1);
        }
        other => panic!("expected a convergence failure, got {other:?}"),
    }
    assert_eq!(model.truss().points(), points.as_slice());
    assert_eq!(model.law(), &law);
    match model.law() {
        ForceLaw::Linearized(linearization) => assert_eq!(linearization.reference(), points.as_slice()),
        law => panic!("unexpected law {}", law.name()),
    }
}

#[test]
fn indeterminate_rigid_truss_is_reported() {
    let truss = Truss::builder(vec![point2(0.0, 0.0), point2(2.0, 0.0), point2(1.0, 1.0)])
        .supports([0, 1])
        .bars([[0, 2], [1, 2], [0, 1]])
        .build()
        .expect("truss is valid");
    let model = TrussModel::rigid(truss);
    assert!(matches!(
        model.bar_scalar_forces(),
        Err(AnalysisError::NonSquareSystem { .. })
    ));
    assert!(!model.is_in_equilibrium());
}

#[test]
fn prestressed_string_carries_its_weight_in_tension() {
    let truss = Truss::builder(vec![point2(0.0, 0.0), point2(1.0, 0.0), point2(2.0, 0.0)])
        .supports([0, 2])
        .bars([[0, 1], [1, 2]])
        .masses([0.0, 1.0, 0.0])
        .build()
        .expect("string is valid");
    let bars = ElasticBars::uniform(&truss, 1e4)
        .and_then(|bars| bars.with_rest_lengths([0.9, 0.9]))
        .expect("material is valid");
    let mut model = TrussModel::with_elastic_bars(truss, bars).expect("material matches");
    model
        .find_equilibrium(&RootOptions::default())
        .expect("tension stiffens the string");

    let forces = model.bar_scalar_forces().expect("elastic forces");
    assert!(forces.iter().all(|force| *force > 1_000.0));
    let sag = model.truss().points()[1].y;
    assert!(sag < 0.0 && sag > -0.01);
    assert!(model.is_in_equilibrium());
}

#[test]
fn summary_reports_the_force_breakdown() {
    let model = TrussModel::rigid(build_roof_truss(point2(0.0, -LOAD)));
    let breakdown = model.force_breakdown().expect("roof is determinate");
    let report = render_summary(&breakdown);
    assert!(report.contains("compression"));
    assert!(report.contains("Support reactions:"));
    assert!(!report.contains("tension"));
}

proptest! {
    #[test]
    fn reactions_balance_every_load(
        fx in -1e3..1e3_f64,
        fy in -1e3..1e3_f64,
        mass in 0.0..50.0_f64,
    ) {
        let mut truss = build_roof_truss(point2(fx, fy));
        truss.set_mass(2, mass).expect("point exists");
        let model = TrussModel::rigid(truss);
        let forces = model.bar_scalar_forces().expect("roof is determinate");
        prop_assert!(model.truss().is_in_equilibrium_with(&forces));

        let reactions: Vector<2> = model.support_reactions().expect("roof is determinate").iter().sum();
        let loads: Vector<2> = model.truss().external_forces().iter().sum();
        let weights: Vector<2> = model.truss().gravity_forces().iter().sum();
        let scale = 1.0 + loads.norm() + weights.norm();
        prop_assert!((reactions + loads + weights).norm() < 1e-9 * scale);
    }

    #[test]
    fn internal_forces_cancel_for_any_bar_forces(
        f0 in -1e4..1e4_f64,
        f1 in -1e4..1e4_f64,
        f2 in -1e4..1e4_f64,
    ) {
        let truss = Truss::builder(vec![point2(0.0, 0.0), point2(2.0, 0.0), point2(1.0, 1.0)])
            .supports([0])
            .bars([[0, 2], [1, 2], [0, 1]])
            .build()
            .expect("truss is valid");
        let on_points: Vector<2> = truss.bar_forces_on_points(&[f0, f1, f2]).iter().sum();
        prop_assert!(on_points.norm() < 1e-9 * (1.0 + f0.abs() + f1.abs() + f2.abs()));
    }
}
