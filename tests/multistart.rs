use core::f64::consts::FRAC_PI_2;

use manifold_bo::manifold::{Manifold, Sphere};
use manifold_bo::multistart::{MultiRestartConfig, MultiRestartOptimizer, SeedSelection};
use manifold_bo::refine::MANIFOLD_TOLERANCE;
use manifold_bo::{Direction, Error, ObservationSet};

fn at_angle(theta: f64) -> Vec<f64> {
    vec![theta.cos(), theta.sin()]
}

#[test]
fn circle_scenario_converges_toward_the_best_observation() {
    let circle = Sphere::new(1).unwrap();
    let observations = ObservationSet::from_pairs(
        Direction::Minimize,
        vec![at_angle(0.0), at_angle(FRAC_PI_2), at_angle(2.0 * FRAC_PI_2)],
        vec![1.0, -1.0, 0.5],
    )
    .unwrap();
    assert_eq!(observations.best_value(), Some(-1.0));
    let best = observations.best_point().unwrap().to_vec();
    assert!(best[0].abs() < 1e-12 && (best[1] - 1.0).abs() < 1e-12);

    // Acquisition stub: the closer to 90 degrees, the better.
    let target = best.clone();
    let score = |x: &[f64]| -circle.distance(x, &target);

    let optimizer = MultiRestartOptimizer::new(
        &circle,
        MultiRestartConfig {
            num_restarts: 5,
            raw_samples: 50,
            ..MultiRestartConfig::default()
        },
    );
    let mut rng = fastrand::Rng::with_seed(2024);
    let outcome = optimizer.optimize(&score, &mut rng).unwrap();

    assert_eq!(outcome.points.len(), 1);
    let point = &outcome.points[0];
    assert!(circle.distance(point, &target) < 1e-3, "ended at {point:?}");
    assert!(outcome.score > -1e-3);
    assert!(outcome.score >= outcome.raw_best_score);
}

#[test]
fn single_raw_sample_and_single_restart() {
    let sphere = Sphere::new(2).unwrap();
    let optimizer = MultiRestartOptimizer::new(
        &sphere,
        MultiRestartConfig {
            num_restarts: 1,
            raw_samples: 1,
            ..MultiRestartConfig::default()
        },
    );
    let calls = parking_lot::Mutex::new(0_usize);
    let score = |x: &[f64]| {
        *calls.lock() += 1;
        x[0]
    };
    let mut rng = fastrand::Rng::with_seed(1);
    let outcome = optimizer.optimize(&score, &mut rng).unwrap();

    assert_eq!(outcome.restarts, 1);
    assert_eq!(outcome.refinements, 1);
    assert_eq!(outcome.restart_index, 0);
    assert!(sphere.contains(&outcome.points[0], MANIFOLD_TOLERANCE));
    assert!(*calls.lock() > 1);
}

#[test]
fn restarts_are_clamped_to_raw_samples() {
    let sphere = Sphere::new(2).unwrap();
    let optimizer = MultiRestartOptimizer::new(
        &sphere,
        MultiRestartConfig {
            num_restarts: 10,
            raw_samples: 3,
            ..MultiRestartConfig::default()
        },
    );
    let mut rng = fastrand::Rng::with_seed(4);
    let outcome = optimizer.optimize(&|x: &[f64]| x[1], &mut rng).unwrap();
    assert_eq!(outcome.restarts, 3);
}

#[test]
fn output_score_dominates_every_raw_score() {
    let sphere = Sphere::new(3).unwrap();
    let wavy = |x: &[f64]| (4.0 * x[0]).sin() * (3.0 * x[1]).cos() + x[2] * x[3];
    for (seed, selection) in [
        (1, SeedSelection::Best),
        (2, SeedSelection::Best),
        (3, SeedSelection::Boltzmann { eta: 2.0 }),
        (4, SeedSelection::Boltzmann { eta: 0.0 }),
    ] {
        let optimizer = MultiRestartOptimizer::new(
            &sphere,
            MultiRestartConfig {
                num_restarts: 4,
                raw_samples: 64,
                selection,
                ..MultiRestartConfig::default()
            },
        );
        let mut rng = fastrand::Rng::with_seed(seed);
        let outcome = optimizer.optimize(&wavy, &mut rng).unwrap();
        assert!(
            outcome.score >= outcome.raw_best_score,
            "{selection:?}: {} < {}",
            outcome.score,
            outcome.raw_best_score
        );
        assert!((outcome.score - wavy(&outcome.points[0])).abs() < 1e-12);
    }
}

#[test]
fn same_seed_gives_the_same_outcome() {
    let sphere = Sphere::new(2).unwrap();
    let optimizer = MultiRestartOptimizer::new(&sphere, MultiRestartConfig::default());
    let score = |x: &[f64]| x[0] * x[1] - x[2];
    let a = optimizer
        .optimize(&score, &mut fastrand::Rng::with_seed(77))
        .unwrap();
    let b = optimizer
        .optimize(&score, &mut fastrand::Rng::with_seed(77))
        .unwrap();
    assert_eq!(a, b);
}

#[test]
fn q_batch_returns_q_points_scored_jointly() {
    let sphere = Sphere::new(2).unwrap();
    let optimizer = MultiRestartOptimizer::new(
        &sphere,
        MultiRestartConfig {
            num_restarts: 3,
            raw_samples: 20,
            q: 3,
            ..MultiRestartConfig::default()
        },
    );
    let score = |x: &[f64]| -x[2];
    let mut rng = fastrand::Rng::with_seed(12);
    let outcome = optimizer.optimize(&score, &mut rng).unwrap();

    assert_eq!(outcome.points.len(), 3);
    assert_eq!(outcome.refinements, 9);
    let joint = outcome
        .points
        .iter()
        .map(|p| score(p))
        .fold(f64::NEG_INFINITY, f64::max);
    assert!((outcome.score - joint).abs() < 1e-12);
    assert!(outcome.score >= outcome.raw_best_score);
    assert!(outcome.points.iter().all(|p| sphere.contains(p, MANIFOLD_TOLERANCE)));
}

#[test]
fn nan_raw_scores_are_degenerate_seeds() {
    let sphere = Sphere::new(2).unwrap();
    let optimizer = MultiRestartOptimizer::new(&sphere, MultiRestartConfig::default());
    let broken = |x: &[f64]| if x[0] > 0.0 { f64::NAN } else { x[1] };
    let mut rng = fastrand::Rng::with_seed(3);
    assert!(matches!(
        optimizer.optimize(&broken, &mut rng),
        Err(Error::DegenerateCandidate(_))
    ));
}

#[test]
fn zero_counts_are_rejected() {
    let sphere = Sphere::new(2).unwrap();
    let optimizer = MultiRestartOptimizer::new(
        &sphere,
        MultiRestartConfig {
            raw_samples: 0,
            ..MultiRestartConfig::default()
        },
    );
    let mut rng = fastrand::Rng::with_seed(3);
    let err = optimizer.optimize(&|x: &[f64]| x[0], &mut rng).unwrap_err();
    assert!(err.is_configuration());
}
