//! Grid world reinforcement-learning sandbox.
//!
//! A deterministic grid navigation environment, a tabular Q-learning agent
//! and a persistent store of human feedback that shapes the reward signal.

pub mod agent;
pub mod cli;
pub mod commands;
pub mod dataset;
pub mod env;
pub mod error;
pub mod feedback;
pub mod settings;
pub mod space;
pub mod telemetry;
pub mod training;

pub use agent::{QLearningAgent, QLearningConfig};
pub use env::{GridSpec, GridWorldEnv, Position};
pub use error::{GridError, Result};
pub use feedback::{FeedbackConfig, FeedbackLabel, FeedbackStore};
