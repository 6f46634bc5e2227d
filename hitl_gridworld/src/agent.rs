//! Tabular Q-learning agent with a linearly scheduled epsilon-greedy policy.

use crate::error::{GridError, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Hyper-parameters for the Q-learning agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QLearningConfig {
    pub learning_rate: f64,
    pub discount_gamma: f64,
    pub epsilon_start: f64,
    pub epsilon_final: f64,
    /// Number of updates over which epsilon moves from start to final.
    pub epsilon_decay_steps: u64,
    /// Seed for the exploration source. `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for QLearningConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            discount_gamma: 0.99,
            epsilon_start: 0.2,
            epsilon_final: 0.05,
            epsilon_decay_steps: 10_000,
            seed: None,
        }
    }
}

impl QLearningConfig {
    pub fn validate(&self) -> Result<()> {
        let unit = [
            ("learning_rate", self.learning_rate),
            ("discount_gamma", self.discount_gamma),
            ("epsilon_start", self.epsilon_start),
            ("epsilon_final", self.epsilon_final),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(GridError::config(format!("{name} must be in [0, 1], got {value}")));
            }
        }
        Ok(())
    }

    /// Exploration rate after `t` updates.
    ///
    /// Interpolates linearly from `epsilon_start` to `epsilon_final` and holds
    /// the final value from `epsilon_decay_steps` onwards. The schedule may
    /// increase if `epsilon_final > epsilon_start`.
    pub fn epsilon_at(&self, t: u64) -> f64 {
        let decay_steps = self.epsilon_decay_steps.max(1);
        if t >= decay_steps {
            return self.epsilon_final;
        }
        let frac = t as f64 / decay_steps as f64;
        self.epsilon_start + frac * (self.epsilon_final - self.epsilon_start)
    }
}

/// Q-learning agent over a dense `num_states x num_actions` table.
pub struct QLearningAgent {
    num_states: usize,
    num_actions: usize,
    config: QLearningConfig,
    q_table: Vec<f64>,
    steps_done: u64,
    rng: StdRng,
}

impl QLearningAgent {
    pub fn new(num_states: usize, num_actions: usize, config: QLearningConfig) -> Result<Self> {
        if num_states == 0 || num_actions == 0 {
            return Err(GridError::config(format!(
                "q-table dimensions must be positive, got {num_states}x{num_actions}"
            )));
        }
        config.validate()?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        debug!(num_states, num_actions, ?config, "q-learning agent created");

        Ok(Self {
            num_states,
            num_actions,
            q_table: vec![0.0; num_states * num_actions],
            config,
            steps_done: 0,
            rng,
        })
    }

    /// Replace the exploration source with one seeded from `seed`.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Epsilon-greedy action for `state`.
    ///
    /// # Panics
    ///
    /// Panics if `state` is outside `0..num_states`.
    pub fn select_action(&mut self, state: usize) -> usize {
        let epsilon = self.epsilon();
        if self.rng.gen::<f64>() < epsilon {
            self.rng.gen_range(0..self.num_actions)
        } else {
            self.greedy_action(state)
        }
    }

    /// Highest-valued action for `state`; ties go to the lowest index.
    ///
    /// # Panics
    ///
    /// Panics if `state` is outside `0..num_states`.
    pub fn greedy_action(&self, state: usize) -> usize {
        let row = self.q_values(state);
        let mut best = 0;
        for (action, &value) in row.iter().enumerate().skip(1) {
            if value > row[best] {
                best = action;
            }
        }
        best
    }

    /// Q-learning update: `Q(s,a) += lr * (r + gamma * max_a' Q(s',a') - Q(s,a))`,
    /// bootstrapping from zero when `done`.
    ///
    /// # Panics
    ///
    /// Panics if either state or the action is out of range.
    pub fn update(&mut self, state: usize, action: usize, reward: f64, next_state: usize, done: bool) {
        let best_next = if done {
            0.0
        } else {
            self.q_values(next_state)
                .iter()
                .copied()
                .fold(f64::NEG_INFINITY, f64::max)
        };
        let target = reward + self.config.discount_gamma * best_next;

        let idx = self.index(state, action);
        let current = self.q_table[idx];
        let new_q = current + self.config.learning_rate * (target - current);
        self.q_table[idx] = new_q;
        self.steps_done += 1;

        trace!(state, action, reward, current, new_q, "q-update");
    }

    /// Current exploration rate.
    pub fn epsilon(&self) -> f64 {
        self.config.epsilon_at(self.steps_done)
    }

    pub fn q_value(&self, state: usize, action: usize) -> f64 {
        self.q_table[self.index(state, action)]
    }

    /// Row of action values for `state`.
    pub fn q_values(&self, state: usize) -> &[f64] {
        assert!(state < self.num_states, "state {state} out of range 0..{}", self.num_states);
        let start = state * self.num_actions;
        &self.q_table[start..start + self.num_actions]
    }

    pub fn steps_done(&self) -> u64 {
        self.steps_done
    }

    pub fn num_states(&self) -> usize {
        self.num_states
    }

    pub fn num_actions(&self) -> usize {
        self.num_actions
    }

    pub fn config(&self) -> &QLearningConfig {
        &self.config
    }

    fn index(&self, state: usize, action: usize) -> usize {
        assert!(state < self.num_states, "state {state} out of range 0..{}", self.num_states);
        assert!(action < self.num_actions, "action {action} out of range 0..{}", self.num_actions);
        state * self.num_actions + action
    }
}
