//! Episode driver tying the environment, agent and feedback store together.

use crate::agent::QLearningAgent;
use crate::env::{GridWorldEnv, Phase, Position};
use crate::error::{GridError, Result};
use crate::feedback::FeedbackStore;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, instrument};

/// Per-episode seeds are drawn from `0..EPISODE_SEED_RANGE`.
const EPISODE_SEED_RANGE: u64 = 1_000_000;
const PROGRESS_INTERVAL: usize = 50;

/// Training section of the settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub episodes: usize,
    pub seed: u64,
    /// Shape rewards through the feedback store.
    pub use_feedback: bool,
    /// Log the rendered grid at every step of every N-th episode.
    pub render_every: Option<usize>,
    /// Write the training report as JSON here.
    pub report_path: Option<PathBuf>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            episodes: 200,
            seed: 42,
            use_feedback: false,
            render_every: None,
            report_path: None,
        }
    }
}

/// Aggregate statistics of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub episode_returns: Vec<f64>,
    pub episode_lengths: Vec<usize>,
    pub total_steps: u64,
    pub final_epsilon: f64,
    pub used_feedback: bool,
}

impl TrainingReport {
    pub fn episodes(&self) -> usize {
        self.episode_returns.len()
    }

    /// Mean return over the last `n` episodes (or all, if fewer).
    pub fn mean_return_last(&self, n: usize) -> Option<f64> {
        if self.episode_returns.is_empty() || n == 0 {
            return None;
        }
        let tail = &self.episode_returns[self.episode_returns.len().saturating_sub(n)..];
        Some(tail.iter().sum::<f64>() / tail.len() as f64)
    }
}

/// Result of one interactive step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StepOutcome {
    pub action: usize,
    pub next_state: usize,
    /// Reward fed to the agent, shaped when a feedback store was given.
    pub reward: f64,
    pub done: bool,
    pub collision: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeStats {
    pub total_return: f64,
    pub steps: usize,
}

/// Greedy rollout without learning.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GreedyRollout {
    pub path: Vec<Position>,
    pub total_reward: f64,
    pub reached_goal: bool,
}

/// Select an action, apply it, shape the reward and update the agent.
pub fn run_one_step(
    env: &mut GridWorldEnv,
    agent: &mut QLearningAgent,
    state: usize,
    feedback: Option<&FeedbackStore>,
) -> Result<StepOutcome> {
    let action = agent.select_action(state);
    let step = env.step(action)?;
    let reward = match feedback {
        Some(store) => store.shaped_reward(step.reward, state, action),
        None => step.reward,
    };
    let done = step.done();
    agent.update(state, action, reward, step.state, done);

    Ok(StepOutcome {
        action,
        next_state: step.state,
        reward,
        done,
        collision: step.info.collision,
    })
}

/// Run a single episode from `reset` until the environment finishes.
pub fn run_episode(
    env: &mut GridWorldEnv,
    agent: &mut QLearningAgent,
    feedback: Option<&FeedbackStore>,
    seed: Option<u64>,
    render: bool,
) -> Result<EpisodeStats> {
    let mut state = env.reset(seed);
    let mut stats = EpisodeStats { total_return: 0.0, steps: 0 };

    loop {
        let outcome = run_one_step(env, agent, state, feedback)?;
        stats.total_return += outcome.reward;
        stats.steps += 1;
        state = outcome.next_state;
        if render {
            debug!("\n{}", env.render());
        }
        if outcome.done {
            return Ok(stats);
        }
    }
}

/// Train `agent` for `config.episodes` episodes.
///
/// Each episode draws a seed from a generator seeded with `config.seed`; the
/// environment is reset with it and the agent's exploration is reseeded with
/// it, so a run is reproducible for a fixed configuration.
#[instrument(skip_all, fields(episodes = config.episodes, seed = config.seed, feedback = feedback.is_some()))]
pub fn run_training(
    env: &mut GridWorldEnv,
    agent: &mut QLearningAgent,
    feedback: Option<&FeedbackStore>,
    config: &TrainingConfig,
) -> Result<TrainingReport> {
    ensure_compatible(env, agent)?;

    let mut seeder = StdRng::seed_from_u64(config.seed);
    let mut report = TrainingReport {
        episode_returns: Vec::with_capacity(config.episodes),
        episode_lengths: Vec::with_capacity(config.episodes),
        total_steps: 0,
        final_epsilon: agent.epsilon(),
        used_feedback: feedback.is_some(),
    };

    for episode in 0..config.episodes {
        let episode_seed = seeder.gen_range(0..EPISODE_SEED_RANGE);
        agent.reseed(episode_seed);
        let render = config.render_every.is_some_and(|every| every > 0 && episode % every == 0);

        let stats = run_episode(env, agent, feedback, Some(episode_seed), render)?;
        report.episode_returns.push(stats.total_return);
        report.episode_lengths.push(stats.steps);
        report.total_steps += stats.steps as u64;

        if (episode + 1) % PROGRESS_INTERVAL == 0 {
            info!(
                episode = episode + 1,
                mean_return = report.mean_return_last(PROGRESS_INTERVAL).unwrap_or_default(),
                epsilon = agent.epsilon(),
                "training progress"
            );
        }
    }

    report.final_epsilon = agent.epsilon();
    info!(
        total_steps = report.total_steps,
        mean_return = report.mean_return_last(PROGRESS_INTERVAL).unwrap_or_default(),
        "training finished"
    );
    Ok(report)
}

/// Follow the greedy policy from the start cell for at most `max_steps`.
pub fn evaluate_greedy(
    env: &mut GridWorldEnv,
    agent: &QLearningAgent,
    max_steps: usize,
) -> Result<GreedyRollout> {
    ensure_compatible(env, agent)?;

    let mut state = env.reset(None);
    let mut rollout = GreedyRollout {
        path: vec![env.position()],
        total_reward: 0.0,
        reached_goal: false,
    };

    for _ in 0..max_steps {
        let step = env.step(agent.greedy_action(state))?;
        rollout.total_reward += step.reward;
        rollout.path.push(env.position());
        state = step.state;
        if env.phase() == Phase::Finished {
            rollout.reached_goal = step.terminated;
            break;
        }
    }
    Ok(rollout)
}

fn ensure_compatible(env: &GridWorldEnv, agent: &QLearningAgent) -> Result<()> {
    let states = env.observation_space().n();
    let actions = env.action_space().n();
    if agent.num_states() != states || agent.num_actions() != actions {
        return Err(GridError::config(format!(
            "agent table is {}x{} but environment has {states} states and {actions} actions",
            agent.num_states(),
            agent.num_actions()
        )));
    }
    Ok(())
}
