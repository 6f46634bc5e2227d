//! Command-line interface definitions using clap derive API.

use crate::dataset::Policy;
use crate::feedback::FeedbackLabel;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Grid world Q-learning sandbox with human feedback
#[derive(Parser)]
#[command(name = "gridworld-cli")]
#[command(about = "Train a tabular Q-learning agent on a grid world, shaped by human feedback")]
#[command(version)]
pub struct Cli {
    /// Settings file to load instead of ./gridworld.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train an agent and report episode returns
    Train {
        #[arg(short, long)]
        episodes: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
        /// Shape rewards with stored human feedback
        #[arg(long)]
        use_feedback: bool,
        /// Log the grid at every step of every N-th episode
        #[arg(long)]
        render_every: Option<usize>,
        /// Write the training report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Take interactive learning steps from the start cell
    Step {
        #[arg(short, long, default_value_t = 1)]
        steps: usize,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        use_feedback: bool,
    },
    /// Record human feedback for a state-action pair
    Feedback {
        #[arg(long)]
        state: usize,
        #[arg(long)]
        action: usize,
        #[arg(long, value_enum)]
        label: LabelArg,
    },
    /// Show the accumulated feedback score for a state-action pair
    Score {
        #[arg(long)]
        state: usize,
        #[arg(long)]
        action: usize,
    },
    /// Print the grid
    Render,
    /// Generate an offline trajectory dataset
    Generate {
        #[arg(short, long)]
        episodes: Option<usize>,
        #[arg(long, value_enum)]
        policy: Option<Policy>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LabelArg {
    Like,
    Dislike,
}

impl From<LabelArg> for FeedbackLabel {
    fn from(arg: LabelArg) -> Self {
        match arg {
            LabelArg::Like => FeedbackLabel::Like,
            LabelArg::Dislike => FeedbackLabel::Dislike,
        }
    }
}
