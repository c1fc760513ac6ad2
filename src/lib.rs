#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(unreachable_pub)]
#![deny(clippy::correctness)]
#![deny(clippy::suspicious)]
#![deny(clippy::style)]
#![deny(clippy::complexity)]
#![deny(clippy::perf)]
#![deny(clippy::pedantic)]
#![deny(clippy::std_instead_of_core)]

//! Bayesian optimization of expensive black-box functions whose domain is a
//! Riemannian manifold embedded in Euclidean space, such as a hypersphere.
//!
//! Each iteration fits a probabilistic surrogate to every observation,
//! builds an acquisition function over it and searches the manifold for the
//! acquisition maximum with many local refinements that never leave the
//! manifold. The run can start on one surrogate family and switch to
//! another at a fixed iteration.
//!
//! # Getting Started
//!
//! ```
//! use manifold_bo::prelude::*;
//!
//! let config = OptimizerConfig::builder()
//!     .manifold("sphere")
//!     .dimension(2)
//!     .num_iter(5)
//!     .num_restarts(3)
//!     .raw_samples(32)
//!     .build()
//!     .unwrap();
//!
//! // Distance to the north pole, minimized.
//! let objective = |x: &[f64]| Ok::<_, Error>(1.0 - x[2]);
//! let initial = vec![
//!     vec![1.0, 0.0, 0.0],
//!     vec![0.0, 1.0, 0.0],
//!     vec![0.0, 0.0, -1.0],
//! ];
//!
//! let mut bo = BayesOptLoop::new(config, DefaultSurrogates::new(), objective, initial).unwrap();
//! let report = bo.run();
//!
//! assert_eq!(report.status, LoopStatus::Exhausted);
//! assert!(report.best_value.unwrap() <= 1.0);
//! ```
//!
//! # Core Concepts
//!
//! | Type | Role |
//! |------|------|
//! | [`BayesOptLoop`] | Drive the iteration and own the observation history. |
//! | [`OptimizerConfig`] | Counts, direction, acquisition and surrogate schedule of a run. |
//! | [`Manifold`](manifold::Manifold) | Tangent projection, retraction and uniform sampling. |
//! | [`Surrogate`](surrogate::Surrogate) | Fit to observations and hand out frozen [`Posterior`](surrogate::Posterior) snapshots. |
//! | [`AcquisitionFunction`](acquisition::AcquisitionFunction) | Expected improvement or its logarithm over a snapshot. |
//! | [`MultiRestartOptimizer`](multistart::MultiRestartOptimizer) | Raw sampling, seed selection and parallel refinement. |
//! | [`MetricsLogger`](logger::MetricsLogger) | Receives one row of metrics per iteration. |
//!
//! # Feature Flags
//!
//! | Flag | What it enables | Default |
//! |------|----------------|---------|
//! | `serde` | `Serialize`/`Deserialize` on configs and state, [`OptimizerConfig::from_json`] | off |
//! | `journal` | [`JsonlLogger`](logger::JsonlLogger) (enables `serde`) | off |
//! | `parallel` | Restart refinement on the `rayon` thread pool | off |
//! | `tracing` | Structured log events via [`tracing`](https://docs.rs/tracing) | off |

/// Emit a `tracing::info!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_info {
    ($($arg:tt)*) => { tracing::info!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_info {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::debug!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_debug {
    ($($arg:tt)*) => { tracing::debug!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_debug {
    ($($arg:tt)*) => {};
}

pub mod acquisition;
pub mod bo;
mod config;
mod error;
pub mod logger;
pub mod manifold;
pub mod multistart;
mod observation;
pub mod refine;
mod rng_util;
pub mod sampler;
pub mod surrogate;
mod types;

pub use bo::{BayesOptLoop, BoState, Objective, RunReport};
pub use config::{OptimizerConfig, OptimizerConfigBuilder};
pub use error::{Error, Result};
pub use observation::ObservationSet;
pub use rng_util::iteration_seed;
pub use types::{Direction, LoopStatus};

/// Convenient wildcard import for the most common types.
///
/// ```
/// use manifold_bo::prelude::*;
/// ```
pub mod prelude {
    pub use crate::acquisition::{AcquisitionFunction, AcquisitionKind, AcquisitionObjective};
    pub use crate::bo::{BayesOptLoop, BoState, Objective, RunReport};
    pub use crate::config::{OptimizerConfig, OptimizerConfigBuilder};
    pub use crate::error::{Error, Result};
    #[cfg(feature = "journal")]
    pub use crate::logger::JsonlLogger;
    pub use crate::logger::{MemoryLogger, Metrics, MetricsLogger, TracingLogger};
    pub use crate::manifold::{Manifold, ManifoldKind, Sphere};
    pub use crate::multistart::{MultiRestartConfig, MultiRestartOptimizer, SeedSelection};
    pub use crate::observation::ObservationSet;
    pub use crate::refine::{CandidateRefiner, RefinerConfig};
    pub use crate::sampler::ManifoldPointSampler;
    pub use crate::surrogate::{
        DefaultSurrogates, ExactGp, RandomFeatureGp, Surrogate, SurrogateFamily,
        SurrogateProvider, SurrogateSchedule,
    };
    pub use crate::types::{Direction, LoopStatus};
}
