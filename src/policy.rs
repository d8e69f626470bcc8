use ndarray::Array2;

use crate::error::{Result, SvpError};

/// Deterministic greedy policy: one action index per state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    actions: Vec<usize>,
    action_count: usize,
}

impl Policy {
    /// Picks `argmax_a q(s, a)` for every state. Ties go to the lowest action
    /// index.
    ///
    /// # Examples
    ///
    /// ```
    /// use ndarray::array;
    /// use svp::policy::Policy;
    ///
    /// let q = array![[1.0, 3.0, 3.0], [0.5, 0.5, 0.0]];
    /// let policy = Policy::extract(&q);
    /// assert_eq!(policy.actions(), &[1, 0]);
    /// ```
    pub fn extract(q: &Array2<f64>) -> Self {
        let actions = q
            .outer_iter()
            .map(|row| {
                let mut best_a = 0;
                let mut best_val = f64::NEG_INFINITY;
                for (a, &value) in row.iter().enumerate() {
                    if value > best_val {
                        best_val = value;
                        best_a = a;
                    }
                }
                best_a
            })
            .collect();
        Self {
            actions,
            action_count: q.ncols(),
        }
    }

    /// Action chosen in `state`, or `None` past the last state.
    pub fn action(&self, state: usize) -> Option<usize> {
        self.actions.get(state).copied()
    }

    pub fn actions(&self) -> &[usize] {
        &self.actions
    }

    /// Number of actions the policy was extracted over.
    pub fn action_count(&self) -> usize {
        self.action_count
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Maps every chosen index onto `grid`, the real-valued control each
    /// action index stands for.
    pub fn to_values(&self, grid: &[f64]) -> Result<Vec<f64>> {
        if grid.len() != self.action_count {
            return Err(SvpError::invalid_parameter(format!(
                "action grid has {} values for {} actions",
                grid.len(),
                self.action_count
            )));
        }
        Ok(self.actions.iter().map(|&a| grid[a]).collect())
    }
}
