use std::borrow::Cow;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use svp::planning::{q_value_iteration, SvpConfig, SvpPlanner};
use svp::MarkovDecisionProcess;

/// Walk on a ring of `states` cells; action `a` pushes by `a - actions / 2`
/// cells and slips back one cell 10% of the time. Cell 0 is the target.
struct RingWalk {
    states: usize,
    actions: usize,
}

impl RingWalk {
    fn shift(&self, state: usize, by: isize) -> usize {
        let n = self.states as isize;
        (((state as isize + by) % n + n) % n) as usize
    }
}

impl MarkovDecisionProcess for RingWalk {
    fn state_count(&self) -> usize {
        self.states
    }

    fn action_count(&self) -> usize {
        self.actions
    }

    fn transition(&self, state: usize, action: usize) -> Cow<'_, [(usize, f64)]> {
        let push = action as isize - (self.actions / 2) as isize;
        let next = self.shift(state, push);
        let slip = self.shift(next, -1);
        if slip == next {
            Cow::Owned(vec![(next, 1.0)])
        } else {
            Cow::Owned(vec![(next, 0.9), (slip, 0.1)])
        }
    }

    fn reward(&self, state: usize, action: usize) -> f64 {
        let distance = state.min(self.states - state) as f64;
        let effort = (action as f64 - (self.actions / 2) as f64).abs();
        -(distance / self.states as f64) - 0.01 * effort
    }

    fn reward_range(&self) -> Option<(f64, f64)> {
        Some((-0.5 - 0.01 * (self.actions / 2) as f64, 0.0))
    }
}

fn bench_planning(c: &mut Criterion) {
    let model = RingWalk {
        states: 400,
        actions: 9,
    };
    let mut group = c.benchmark_group("plan_ring_walk");
    group.sample_size(10);

    for p in [0.2, 0.4, 1.0] {
        group.bench_with_input(BenchmarkId::new("svp", p), &p, |b, &p| {
            let planner = SvpPlanner::new(SvpConfig {
                observation_probability: p,
                gamma: 0.95,
                max_iterations: 50,
                tolerance: 1e-6,
                seed: Some(7),
                ..SvpConfig::default()
            })
            .unwrap();
            b.iter(|| planner.plan(black_box(&model)).unwrap())
        });
    }

    group.bench_function("exact", |b| {
        b.iter(|| q_value_iteration(black_box(&model), 0.95, 50, 1e-6).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_planning);
criterion_main!(benches);
