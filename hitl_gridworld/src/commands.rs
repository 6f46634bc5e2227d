//! Handlers behind each CLI subcommand.

use crate::{
    agent::QLearningAgent,
    cli::Commands,
    dataset::generate_dataset,
    feedback::FeedbackStore,
    settings::Settings,
    training::{evaluate_greedy, run_one_step, run_training, TrainingReport},
};
use anyhow::{Context, Result};
use std::path::Path;
use tracing::{info, instrument};

/// Execute `command` against the loaded settings.
pub fn execute(command: Commands, mut settings: Settings) -> Result<()> {
    match command {
        Commands::Train { episodes, seed, use_feedback, render_every, report } => {
            if let Some(episodes) = episodes {
                settings.training.episodes = episodes;
            }
            if let Some(seed) = seed {
                settings.training.seed = seed;
            }
            settings.training.use_feedback |= use_feedback;
            if render_every.is_some() {
                settings.training.render_every = render_every;
            }
            if report.is_some() {
                settings.training.report_path = report;
            }
            train(&settings)
        }
        Commands::Step { steps, seed, use_feedback } => {
            settings.training.use_feedback |= use_feedback;
            interactive_steps(&settings, steps, seed)
        }
        Commands::Feedback { state, action, label } => {
            let mut store = open_store(&settings, state, action)?;
            let score = store.add_feedback(state, action, label.into());
            println!("score({state}, {action}) = {score}");
            if store.persist_failures() > 0 {
                println!("warning: feedback could not be saved to {:?}", store.path());
            }
            Ok(())
        }
        Commands::Score { state, action } => {
            let store = open_store(&settings, state, action)?;
            println!("score({state}, {action}) = {}", store.get_feedback_score(state, action));
            Ok(())
        }
        Commands::Render => {
            let env = settings.build_environment()?;
            println!("{}", env.render());
            Ok(())
        }
        Commands::Generate { episodes, policy, output, seed } => {
            if let Some(episodes) = episodes {
                settings.dataset.episodes = episodes;
            }
            if let Some(policy) = policy {
                settings.dataset.policy = policy;
            }
            if let Some(output) = output {
                settings.dataset.output = output;
            }
            if let Some(seed) = seed {
                settings.dataset.seed = seed;
            }
            let episodes = generate_dataset(&settings)?;
            println!("Saved {} episodes to {:?}", episodes.len(), settings.dataset.output);
            Ok(())
        }
        Commands::Config => {
            print!("{}", settings.to_toml()?);
            Ok(())
        }
    }
}

/// Open the feedback store after checking the pair against the grid.
fn open_store(settings: &Settings, state: usize, action: usize) -> Result<FeedbackStore> {
    let env = settings.build_environment()?;
    anyhow::ensure!(
        env.observation_space().contains(state),
        "state {state} is outside 0..{}",
        env.observation_space().n()
    );
    anyhow::ensure!(
        env.action_space().contains(action),
        "action {action} is outside 0..{}",
        env.action_space().n()
    );
    Ok(FeedbackStore::open(settings.feedback.clone()))
}

/// Train an agent as configured and print a summary.
#[instrument(skip(settings))]
pub fn train(settings: &Settings) -> Result<()> {
    let mut env = settings.build_environment()?;
    let mut agent = QLearningAgent::new(
        env.observation_space().n(),
        env.action_space().n(),
        settings.agent.clone(),
    )?;
    let store = settings
        .training
        .use_feedback
        .then(|| FeedbackStore::open(settings.feedback.clone()));

    let report = run_training(&mut env, &mut agent, store.as_ref(), &settings.training)
        .context("Training failed")?;
    let greedy_limit = env.observation_space().n() * 4;
    let rollout = evaluate_greedy(&mut env, &agent, greedy_limit)?;

    print_training_summary(&report);
    println!(
        "Greedy rollout: {} steps, return {:.2}, goal reached: {}",
        rollout.path.len() - 1,
        rollout.total_reward,
        rollout.reached_goal
    );

    if let Some(ref path) = settings.training.report_path {
        save_training_report(&report, path).context("Failed to save training report")?;
    }
    Ok(())
}

/// Run single learning steps, restarting the episode when it finishes.
fn interactive_steps(settings: &Settings, steps: usize, seed: Option<u64>) -> Result<()> {
    let mut env = settings.build_environment()?;
    let mut agent = QLearningAgent::new(
        env.observation_space().n(),
        env.action_space().n(),
        settings.agent.clone(),
    )?;
    if let Some(seed) = seed {
        agent.reseed(seed);
    }
    let store = settings
        .training
        .use_feedback
        .then(|| FeedbackStore::open(settings.feedback.clone()));

    let mut state = env.reset(seed);
    for i in 0..steps {
        let outcome = run_one_step(&mut env, &mut agent, state, store.as_ref())?;
        println!(
            "step {:>3}: state {:>3} action {} -> state {:>3} reward {:>6.2}{}",
            i + 1,
            state,
            outcome.action,
            outcome.next_state,
            outcome.reward,
            if outcome.collision { " (collision)" } else { "" }
        );
        println!("{}\n", env.render());
        state = outcome.next_state;
        if outcome.done {
            info!("episode finished; resetting");
            state = env.reset(None);
        }
    }
    Ok(())
}

fn print_training_summary(report: &TrainingReport) {
    println!("\n=== Training Summary ===");
    println!("Episodes: {}", report.episodes());
    println!("Total steps: {}", report.total_steps);
    println!("Final epsilon: {:.4}", report.final_epsilon);
    println!("Reward shaping: {}", if report.used_feedback { "on" } else { "off" });
    if let Some(mean) = report.mean_return_last(50) {
        println!("Mean return (last 50): {:.2}", mean);
    }
    if let Some(best) = report.episode_returns.iter().copied().reduce(f64::max) {
        println!("Best return: {:.2}", best);
    }
}

fn save_training_report(report: &TrainingReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report file: {:?}", path))?;

    info!("Training report saved to: {:?}", path);
    Ok(())
}
