use manifold_bo::manifold::{Manifold, ManifoldKind, Sphere};
use manifold_bo::sampler::ManifoldPointSampler;
use manifold_bo::{Error, iteration_seed};

fn random_tangent(sphere: &Sphere, point: &[f64], scale: f64, rng: &mut fastrand::Rng) -> Vec<f64> {
    let ambient: Vec<f64> = (0..point.len()).map(|_| scale * (rng.f64() * 2.0 - 1.0)).collect();
    sphere.project_to_tangent(point, &ambient)
}

#[test]
fn retracted_points_stay_on_the_sphere() {
    let mut rng = fastrand::Rng::with_seed(42);
    for dim in 1..=6 {
        let sphere = Sphere::new(dim).unwrap();
        let points = sphere.sample_uniform(50, &mut rng);
        for point in &points {
            for scale in [1e-9, 1e-3, 0.5, 3.0, 40.0] {
                let tangent = random_tangent(&sphere, point, scale, &mut rng);
                let moved = sphere.retract(point, &tangent);
                assert!(
                    sphere.contains(&moved, 1e-6),
                    "dim {dim} scale {scale}: residual {}",
                    sphere.constraint_residual(&moved)
                );
            }
        }
    }
}

#[test]
fn tangent_projection_is_orthogonal_to_the_point() {
    let sphere = Sphere::new(3).unwrap();
    let mut rng = fastrand::Rng::with_seed(1);
    for point in sphere.sample_uniform(20, &mut rng) {
        let v = random_tangent(&sphere, &point, 1.0, &mut rng);
        let dot: f64 = v.iter().zip(&point).map(|(a, b)| a * b).sum();
        assert!(dot.abs() < 1e-12);
        let again = sphere.project_to_tangent(&point, &v);
        for (a, b) in v.iter().zip(&again) {
            assert!((a - b).abs() < 1e-12);
        }
    }
}

#[test]
fn geodesic_distance_on_the_circle() {
    let circle = Sphere::new(1).unwrap();
    let east = [1.0, 0.0];
    let north = [0.0, 1.0];
    let west = [-1.0, 0.0];
    assert!((circle.distance(&east, &north) - core::f64::consts::FRAC_PI_2).abs() < 1e-12);
    assert!((circle.distance(&east, &west) - core::f64::consts::PI).abs() < 1e-12);
    assert!(circle.distance(&north, &north).abs() < 1e-12);
}

#[test]
fn sampler_returns_requested_counts() {
    let sphere = Sphere::new(2).unwrap();
    let sampler = ManifoldPointSampler::new(&sphere);
    let mut rng = fastrand::Rng::with_seed(5);

    let points = sampler.sample(37, &mut rng).unwrap();
    assert_eq!(points.len(), 37);
    assert!(points.iter().all(|p| sphere.contains(p, 1e-12)));

    let batches = sampler.sample_batches(4, 3, &mut rng).unwrap();
    assert_eq!(batches.len(), 4);
    assert!(batches.iter().all(|b| b.len() == 3));
}

#[test]
fn sampler_rejects_zero_samples() {
    let sphere = Sphere::new(2).unwrap();
    let sampler = ManifoldPointSampler::new(&sphere);
    let mut rng = fastrand::Rng::with_seed(5);
    assert!(matches!(sampler.sample(0, &mut rng), Err(Error::InvalidSampleCount)));
    assert!(matches!(
        sampler.sample_batches(3, 0, &mut rng),
        Err(Error::InvalidSampleCount)
    ));
}

#[test]
fn sampling_is_reproducible_per_iteration_seed() {
    let sphere = Sphere::new(4).unwrap();
    let draw = |iteration| {
        let mut rng = fastrand::Rng::with_seed(iteration_seed(99, iteration));
        sphere.sample_uniform(5, &mut rng)
    };
    assert_eq!(draw(3), draw(3));
    assert_ne!(draw(3), draw(4));
}

#[test]
fn manifold_kind_builds_by_name() {
    let kind: ManifoldKind = "sphere".parse().unwrap();
    let manifold = kind.build(3).unwrap();
    assert_eq!(manifold.dimension(), 3);
    assert_eq!(manifold.ambient_dimension(), 4);
    assert_eq!(manifold.name(), "sphere");

    let err = "hyperbolic".parse::<ManifoldKind>().unwrap_err();
    assert!(matches!(err, Error::UnknownManifold(ref name) if name == "hyperbolic"));
    assert!(err.is_configuration());
}

#[test]
fn validate_reports_shape_and_membership() {
    let sphere = Sphere::new(1).unwrap();
    assert!(sphere.validate(&[0.6, 0.8], 1e-6).is_ok());
    assert!(matches!(
        sphere.validate(&[1.0, 0.0, 0.0], 1e-6),
        Err(Error::DimensionMismatch { expected: 2, got: 3 })
    ));
    assert!(matches!(
        sphere.validate(&[0.5, 0.5], 1e-6),
        Err(Error::OffManifold { .. })
    ));
    assert!(sphere.validate(&[f64::NAN, 1.0], 1e-6).is_err());
}
