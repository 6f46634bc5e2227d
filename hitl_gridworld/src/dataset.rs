//! Offline trajectory generation.
//!
//! Rolls out episodes under a random, heuristic or trained policy and writes
//! them as JSON Lines, one `{"transitions": [...]}` object per episode.

use crate::agent::QLearningAgent;
use crate::env::{Action, GridSpec, GridWorldEnv};
use crate::error::Result as GridResult;
use crate::settings::Settings;
use crate::training::{run_training, TrainingConfig};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// Which policy drives the rollouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    /// Uniformly random actions.
    Random,
    /// Greedy Manhattan-distance heuristic that avoids obstacles.
    Expert,
    /// Greedy actions of a freshly trained Q-learning agent.
    Agent,
}

/// Dataset section of the settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub episodes: usize,
    pub policy: Policy,
    pub output: PathBuf,
    pub seed: u64,
    /// Training episodes run before rolling out the `agent` policy.
    pub pretrain_episodes: usize,
    pub max_steps_per_episode: usize,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            episodes: 20,
            policy: Policy::Expert,
            output: PathBuf::from("data/gridworld_dataset.jsonl"),
            seed: 123,
            pretrain_episodes: 200,
            max_steps_per_episode: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub s: usize,
    pub a: usize,
    pub r: f64,
    pub s_next: usize,
    pub done: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub transitions: Vec<Transition>,
}

/// Action that brings the agent closest to the goal.
///
/// Moves are scored by the Manhattan distance of their clamped target cell;
/// obstacle cells are never chosen over a free one and ties go to the lowest
/// action index.
pub fn greedy_towards_goal(spec: &GridSpec, state: usize) -> usize {
    let here = spec.decode(state);
    Action::ALL
        .iter()
        .map(|&action| {
            let target = action.apply(here, spec);
            let score = if spec.is_obstacle(target) {
                usize::MAX
            } else {
                target.manhattan(&spec.goal)
            };
            (action.index(), score)
        })
        .min_by_key(|&(_, score)| score)
        .map(|(action, _)| action)
        .unwrap_or(0)
}

/// Roll out one episode under `policy`, stopping after `max_steps`.
pub fn run_policy(
    env: &mut GridWorldEnv,
    policy: Policy,
    agent: Option<&QLearningAgent>,
    max_steps: usize,
) -> Result<Episode> {
    let mut state = env.reset(None);
    let mut episode = Episode::default();
    for _ in 0..max_steps {
        let action = match policy {
            Policy::Random => env.sample_action(),
            Policy::Expert => greedy_towards_goal(env.spec(), state),
            Policy::Agent => agent
                .ok_or_else(|| anyhow!("agent policy requires a trained agent"))?
                .greedy_action(state),
        };
        let step = env.step(action)?;
        episode.transitions.push(Transition {
            s: state,
            a: action,
            r: step.reward,
            s_next: step.state,
            done: step.done(),
        });
        state = step.state;
        if step.done() {
            break;
        }
    }
    Ok(episode)
}

/// Write episodes as JSON Lines, creating parent directories.
pub fn write_jsonl(path: &Path, episodes: &[Episode]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create dataset directory: {:?}", parent))?;
    }
    let file = File::create(path).with_context(|| format!("Failed to create dataset file: {:?}", path))?;
    let mut writer = BufWriter::new(file);
    for episode in episodes {
        serde_json::to_writer(&mut writer, episode)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

fn pretrain_agent(env: &mut GridWorldEnv, settings: &Settings) -> GridResult<QLearningAgent> {
    let mut agent = QLearningAgent::new(
        env.observation_space().n(),
        env.action_space().n(),
        settings.agent.clone(),
    )?;
    let config = TrainingConfig {
        episodes: settings.dataset.pretrain_episodes,
        seed: settings.dataset.seed,
        ..TrainingConfig::default()
    };
    run_training(env, &mut agent, None, &config)?;
    Ok(agent)
}

/// Generate the dataset described by `settings.dataset`.
#[instrument(skip(settings), fields(policy = ?settings.dataset.policy, episodes = settings.dataset.episodes))]
pub fn generate_dataset(settings: &Settings) -> Result<Vec<Episode>> {
    let config = &settings.dataset;
    let mut env = GridWorldEnv::from_config(&settings.environment)?;
    env.reset(Some(config.seed));

    let agent = match config.policy {
        Policy::Agent => Some(pretrain_agent(&mut env, settings).context("Failed to pre-train agent")?),
        Policy::Random | Policy::Expert => None,
    };
    if config.policy == Policy::Agent {
        // Pre-training reseeds the environment per episode; restore the dataset seed.
        env.reset(Some(config.seed));
    }

    let episodes = (0..config.episodes)
        .map(|_| run_policy(&mut env, config.policy, agent.as_ref(), config.max_steps_per_episode))
        .collect::<Result<Vec<_>>>()?;

    write_jsonl(&config.output, &episodes)?;
    info!(output = ?config.output, "dataset saved");
    Ok(episodes)
}
