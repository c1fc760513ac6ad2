use std::sync::Arc;

use manifold_bo::acquisition::{AcquisitionFunction, AcquisitionKind, AcquisitionObjective};
use manifold_bo::manifold::{Manifold, Sphere};
use manifold_bo::surrogate::{ExactGp, Posterior, Prediction, RandomFeatureGp, Surrogate};
use manifold_bo::{Direction, Error, ObservationSet};

fn sphere_observations(direction: Direction) -> ObservationSet {
    let sphere = Sphere::new(2).unwrap();
    let mut rng = fastrand::Rng::with_seed(31);
    let points = sphere.sample_uniform(12, &mut rng);
    let values = points.iter().map(|p| p[0] - 2.0 * p[2] * p[1]).collect();
    ObservationSet::from_pairs(direction, points, values).unwrap()
}

struct Fixed(Prediction);

impl Posterior for Fixed {
    fn predict(&self, _point: &[f64]) -> Prediction {
        self.0
    }
}

fn fixed(kind: AcquisitionKind, mean: f64, std: f64, best_f: f64, direction: Direction) -> f64 {
    AcquisitionFunction::new(kind, Arc::new(Fixed(Prediction { mean, std })), best_f, direction)
        .value(&[0.0])
}

#[test]
fn rebuilding_over_an_unchanged_snapshot_is_idempotent() {
    let obs = sphere_observations(Direction::Minimize);
    let mut gp = ExactGp::new();
    gp.fit(&obs, 0, &mut fastrand::Rng::with_seed(0)).unwrap();
    let best = obs.best_value().unwrap();

    let probe = Sphere::new(2)
        .unwrap()
        .sample_uniform(30, &mut fastrand::Rng::with_seed(2));
    for kind in [
        AcquisitionKind::ExpectedImprovement,
        AcquisitionKind::LogExpectedImprovement,
    ] {
        let first = AcquisitionFunction::new(kind, gp.snapshot().unwrap(), best, Direction::Minimize);
        let second = AcquisitionFunction::new(kind, gp.snapshot().unwrap(), best, Direction::Minimize);
        for p in &probe {
            assert_eq!(first.value(p).to_bits(), second.value(p).to_bits());
            assert_eq!(first.value(p).to_bits(), first.value(p).to_bits());
        }
    }
}

#[test]
fn log_ei_is_the_log_of_ei_where_ei_is_representable() {
    for (mean, std, best) in [(0.0, 1.0, 0.0), (0.3, 0.5, 1.0), (2.0, 0.2, 1.5), (-1.0, 2.0, 0.0)] {
        for direction in [Direction::Minimize, Direction::Maximize] {
            let ei = fixed(AcquisitionKind::ExpectedImprovement, mean, std, best, direction);
            let log_ei = fixed(AcquisitionKind::LogExpectedImprovement, mean, std, best, direction);
            assert!(ei > 0.0);
            assert!((ei.ln() - log_ei).abs() < 1e-8, "{mean} {std} {best}: {} vs {log_ei}", ei.ln());
        }
    }
}

#[test]
fn log_ei_stays_finite_where_ei_underflows() {
    // Predicted 40 standard deviations worse than the incumbent.
    let ei = fixed(AcquisitionKind::ExpectedImprovement, 40.0, 1.0, 0.0, Direction::Minimize);
    let log_ei = fixed(AcquisitionKind::LogExpectedImprovement, 40.0, 1.0, 0.0, Direction::Minimize);
    assert!(ei < 1e-300);
    assert!(log_ei.is_finite());
    assert!(log_ei < -700.0);

    let worse = fixed(AcquisitionKind::LogExpectedImprovement, 60.0, 1.0, 0.0, Direction::Minimize);
    assert!(worse < log_ei);
}

#[test]
fn orientation_flips_the_improvement() {
    // A mean below the incumbent is an improvement only when minimizing.
    let min = fixed(AcquisitionKind::ExpectedImprovement, -1.0, 0.1, 0.0, Direction::Minimize);
    let max = fixed(AcquisitionKind::ExpectedImprovement, -1.0, 0.1, 0.0, Direction::Maximize);
    assert!((min - 1.0).abs() < 1e-6);
    assert!(max < 1e-20);
}

#[test]
fn acquisition_kinds_parse_by_name() {
    assert_eq!(
        "expected_improvement".parse::<AcquisitionKind>().unwrap(),
        AcquisitionKind::ExpectedImprovement
    );
    assert_eq!(
        AcquisitionKind::from_name("log_expected_improvement").unwrap(),
        AcquisitionKind::LogExpectedImprovement
    );
    assert!(matches!(
        AcquisitionKind::from_name("upper_confidence_bound"),
        Err(Error::UnknownAcquisition(_))
    ));
    assert_eq!(AcquisitionKind::default().to_string(), "log_expected_improvement");
}

#[test]
fn approximate_snapshot_is_frozen_until_resampled() {
    let obs = sphere_observations(Direction::Maximize);
    let mut model = RandomFeatureGp::new();
    let mut rng = fastrand::Rng::with_seed(17);
    model.fit(&obs, 0, &mut rng).unwrap();
    model.resample_stochastic_state(&mut rng);

    let snapshot = model.snapshot().unwrap();
    let best = obs.best_value().unwrap();
    let acq = AcquisitionFunction::new(
        AcquisitionKind::LogExpectedImprovement,
        Arc::clone(&snapshot),
        best,
        Direction::Maximize,
    );
    let probe = [0.0, 0.6, 0.8];
    let before = acq.value(&probe);

    // Resampling changes later snapshots, never the one already taken.
    model.resample_stochastic_state(&mut rng);
    assert_eq!(acq.value(&probe).to_bits(), before.to_bits());
    let resampled = model.snapshot().unwrap();
    assert_ne!(
        resampled.predict(&probe).mean.to_bits(),
        snapshot.predict(&probe).mean.to_bits()
    );
}

#[test]
fn exact_gp_recovers_the_incumbent_region() {
    let obs = sphere_observations(Direction::Minimize);
    let mut gp = ExactGp::new();
    gp.fit(&obs, 0, &mut fastrand::Rng::with_seed(0)).unwrap();
    let posterior = gp.snapshot().unwrap();
    let best_point = obs.best_point().unwrap();
    let prediction = posterior.predict(best_point);
    assert!((prediction.mean - obs.best_value().unwrap()).abs() < 1e-2);
}
