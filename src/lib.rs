//! Structured value-based planning for discretized Markov decision processes.
//!
//! Each planning round evaluates the Bellman backup on a random subset of the
//! state-action grid and fills in the rest of the Q-matrix by matrix
//! estimation (universal singular value thresholding).
//!
//! ```
//! use svp::mdp::tabular::TabularMdp;
//! use svp::planning::{SvpConfig, SvpPlanner};
//!
//! // Action 0 moves to state 0, action 1 moves to state 1.
//! // Being in state 0 pays +1, being in state 1 costs 1.
//! let mdp = TabularMdp::new(
//!     vec![
//!         vec![vec![(0, 1.0)], vec![(1, 1.0)]],
//!         vec![vec![(0, 1.0)], vec![(1, 1.0)]],
//!     ],
//!     vec![vec![1.0, 1.0], vec![-1.0, -1.0]],
//! )
//! .unwrap();
//!
//! let config = SvpConfig {
//!     observation_probability: 1.0,
//!     gamma: 0.9,
//!     max_iterations: 99,
//!     tolerance: 1e-5,
//!     ..SvpConfig::default()
//! };
//! let outcome = SvpPlanner::new(config).unwrap().plan(&mdp).unwrap();
//! assert_eq!(outcome.policy().actions(), &[0, 0]);
//! ```

pub mod error;
pub mod estimation;
pub mod mdp;
pub mod persist;
pub mod planning;
pub mod policy;
pub mod simulate;

pub use error::{Result, SvpError};
pub use estimation::{estimate, EstimatorConfig, MatrixEstimator};
pub use mdp::{tabular::TabularMdp, MarkovDecisionProcess};
pub use planning::{run, SvpConfig, SvpOutcome, SvpPlanner};
pub use policy::Policy;
pub use simulate::{simulate, Trajectory};
