//! Shared fixtures for the Drover benchmarks.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use smallvec::smallvec;

use drover_backend::ReplicaStep;
use drover_core::LocalAgentId;
use drover_space::{SpaceDescriptor, Value};

/// A two-component observation space: a 4-wide continuous block plus a
/// multi-discrete pair.
pub fn bench_obs_space() -> SpaceDescriptor {
    SpaceDescriptor::Composite {
        children: vec![
            SpaceDescriptor::Continuous {
                low: -1.0e6,
                high: 1.0e6,
                shape: smallvec![4],
            },
            SpaceDescriptor::MultiDiscrete {
                branches: smallvec![8, 8],
            },
        ],
    }
}

/// Component-major columns for `agents` agents of synthetic data.
pub fn bench_columns(agents: usize) -> Vec<Vec<Value>> {
    vec![
        (0..agents)
            .map(|a| Value::Continuous(vec![a as f32, 1.0, 2.0, 3.0]))
            .collect(),
        (0..agents)
            .map(|a| Value::MultiDiscrete(smallvec![(a % 8) as i64, 0]))
            .collect(),
    ]
}

/// A replica step where every third agent terminates and every sixth
/// is reborn in the same tick — all three reconciliation categories in
/// realistic proportions.
pub fn mixed_step(agent_count: usize) -> ReplicaStep {
    let mut decision_ids = Vec::new();
    let mut terminal_ids = Vec::new();
    for a in 0..agent_count {
        let id = LocalAgentId(a as u32);
        let terminal = a % 3 == 0;
        let reborn = a % 6 == 0;
        if terminal {
            terminal_ids.push(id);
        }
        if !terminal || reborn {
            decision_ids.push(id);
        }
    }
    let decision_obs = bench_columns(decision_ids.len());
    let terminal_obs = bench_columns(terminal_ids.len());
    ReplicaStep {
        decision_rewards: vec![0.1; decision_ids.len()],
        terminal_rewards: vec![1.0; terminal_ids.len()],
        truncated: vec![false; terminal_ids.len()],
        decision_ids,
        decision_obs,
        terminal_ids,
        terminal_obs,
    }
}
