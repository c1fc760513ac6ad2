use manifold_bo::manifold::{Manifold, Sphere};
use manifold_bo::refine::{CandidateRefiner, MANIFOLD_TOLERANCE, RefinerConfig, StopReason};
use manifold_bo::{Direction, Error};

/// Smooth multimodal score on the 2-sphere.
fn bumpy(x: &[f64]) -> f64 {
    (3.0 * x[0]).sin() + x[1] * x[2] + 0.5 * (2.0 * x[2]).cos()
}

#[test]
fn ascent_is_monotone_and_ends_above_the_seed() {
    let sphere = Sphere::new(2).unwrap();
    let refiner = CandidateRefiner::new(&sphere, RefinerConfig::default(), Direction::Maximize);
    let mut rng = fastrand::Rng::with_seed(8);

    for seed in sphere.sample_uniform(25, &mut rng) {
        let refined = refiner.refine(&seed, &bumpy).unwrap();
        assert!(refined.trace.windows(2).all(|w| w[1] >= w[0]));
        assert!(refined.score >= refined.seed_score);
        assert!((refined.score - bumpy(&refined.point)).abs() < 1e-12);
        assert!(sphere.contains(&refined.point, MANIFOLD_TOLERANCE));
    }
}

#[test]
fn descent_is_monotone_for_minimization() {
    let sphere = Sphere::new(2).unwrap();
    let refiner = CandidateRefiner::new(&sphere, RefinerConfig::default(), Direction::Minimize);
    let mut rng = fastrand::Rng::with_seed(9);

    for seed in sphere.sample_uniform(25, &mut rng) {
        let refined = refiner.refine(&seed, &bumpy).unwrap();
        assert!(refined.trace.windows(2).all(|w| w[1] <= w[0]));
        assert!(refined.score <= refined.seed_score);
    }
}

#[test]
fn every_iterate_stays_on_the_manifold() {
    let sphere = Sphere::new(3).unwrap();
    let refiner = CandidateRefiner::new(&sphere, RefinerConfig::default(), Direction::Maximize);
    let seen = parking_lot::Mutex::new(Vec::new());
    let recording = |x: &[f64]| {
        seen.lock().push(x.to_vec());
        x[0] - x[3]
    };
    let refined = refiner.refine(&[0.0, 1.0, 0.0, 0.0], &recording).unwrap();
    assert!(refined.converged);

    // Finite-difference probes sit within one step width of the manifold.
    for (i, point) in seen.lock().iter().enumerate() {
        let residual = sphere.constraint_residual(point);
        assert!(residual < 1e-5, "evaluation {i} residual {residual}");
    }
    assert!(sphere.contains(&refined.point, MANIFOLD_TOLERANCE));
}

#[test]
fn stationary_seed_stops_after_one_iteration() {
    let sphere = Sphere::new(2).unwrap();
    let refiner = CandidateRefiner::new(&sphere, RefinerConfig::default(), Direction::Maximize);
    // The north pole is the maximum of x[2]: the tangent gradient vanishes.
    let seed = [0.0, 0.0, 1.0];
    let north = |x: &[f64]| x[2];

    let refined = refiner.refine(&seed, &north).unwrap();
    assert_eq!(refined.iterations, 1);
    assert_eq!(refined.stop_reason, StopReason::GradientNorm);
    assert!(refined.converged);
    assert_eq!(refined.point, seed.to_vec());
    assert_eq!(refined.score, refined.seed_score);
}

#[test]
fn constant_score_is_stationary_everywhere() {
    let sphere = Sphere::new(1).unwrap();
    let refiner = CandidateRefiner::new(&sphere, RefinerConfig::default(), Direction::Maximize);
    let flat = |_: &[f64]| 2.5;
    let refined = refiner.refine(&[0.6, 0.8], &flat).unwrap();
    assert_eq!(refined.iterations, 1);
    assert_eq!(refined.score, 2.5);
}

#[test]
fn iteration_cap_returns_best_point_unconverged() {
    let sphere = Sphere::new(2).unwrap();
    let config = RefinerConfig {
        max_iterations: 2,
        initial_step: 0.05,
        ..RefinerConfig::default()
    };
    let refiner = CandidateRefiner::new(&sphere, config, Direction::Maximize);
    let north = |x: &[f64]| x[2];

    let refined = refiner.refine(&[1.0, 0.0, 0.0], &north).unwrap();
    assert!(!refined.converged);
    assert_eq!(refined.stop_reason, StopReason::MaxIterations);
    assert_eq!(refined.iterations, 2);
    assert!(refined.score > refined.seed_score);
    assert!(refined.score < 0.999);
}

#[test]
fn nan_gradient_is_degenerate() {
    let sphere = Sphere::new(1).unwrap();
    let refiner = CandidateRefiner::new(&sphere, RefinerConfig::default(), Direction::Maximize);
    // Finite at the seed, NaN anywhere else.
    let spike = |x: &[f64]| if x == [1.0, 0.0] { 0.0 } else { f64::NAN };
    assert!(matches!(
        refiner.refine(&[1.0, 0.0], &spike),
        Err(Error::DegenerateCandidate(_))
    ));
}
