//! Value-based planning over a discretized MDP.
//!
//! - [`svp`]: subsampled Bellman backups completed by matrix estimation
//! - [`exact`]: full Q-value iteration, the `p = 1` baseline
//! - [`sampling`]: the per-iteration observation mask

pub mod exact;
pub mod sampling;
pub mod svp;


pub use exact::{q_value_iteration, ExactOutcome};
pub use sampling::ObservationMask;
pub use svp::{
    bellman_backup, max_abs_diff, run, state_values, SvpConfig, SvpOutcome, SvpPlanner,
};
