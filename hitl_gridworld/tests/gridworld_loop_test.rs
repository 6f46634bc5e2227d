//! End-to-end tests for the learning loop, feedback persistence and dataset
//! generation.

use hitl_gridworld::{
    dataset::{generate_dataset, Episode, Policy},
    env::{Action, GridSpec, Phase, Position, RewardConfig},
    feedback::{FeedbackConfig, FeedbackLabel, FeedbackStore},
    settings::Settings,
    training::{evaluate_greedy, run_training, TrainingConfig},
    GridError, GridWorldEnv, QLearningAgent, QLearningConfig,
};
use proptest::prelude::*;
use std::fs;
use tempfile::tempdir;
use tracing_test::traced_test;

fn default_env() -> GridWorldEnv {
    GridWorldEnv::new(GridSpec::default(), RewardConfig::default()).unwrap()
}

fn fast_learner() -> QLearningConfig {
    QLearningConfig {
        learning_rate: 0.5,
        discount_gamma: 0.95,
        epsilon_start: 1.0,
        epsilon_final: 0.05,
        epsilon_decay_steps: 2_000,
        seed: Some(7),
    }
}

#[test]
#[traced_test]
fn agent_learns_to_reach_goal() {
    let mut env = default_env();
    let mut agent = QLearningAgent::new(25, 4, fast_learner()).unwrap();
    let config = TrainingConfig { episodes: 500, seed: 11, ..TrainingConfig::default() };

    let report = run_training(&mut env, &mut agent, None, &config).unwrap();
    assert_eq!(report.episodes(), 500);
    assert!((report.final_epsilon - 0.05).abs() < 1e-12);

    let rollout = evaluate_greedy(&mut env, &agent, 100).unwrap();
    assert!(rollout.reached_goal, "greedy path: {:?}", rollout.path);
    assert_eq!(rollout.path.first(), Some(&Position::new(0, 0)));
    assert_eq!(rollout.path.last(), Some(&Position::new(4, 4)));
    assert!(rollout.total_reward > -10.0);
}

#[test]
fn training_runs_are_reproducible() {
    let config = TrainingConfig { episodes: 30, seed: 5, ..TrainingConfig::default() };
    let run = || {
        let mut env = default_env();
        let mut agent = QLearningAgent::new(25, 4, QLearningConfig::default()).unwrap();
        run_training(&mut env, &mut agent, None, &config).unwrap()
    };
    assert_eq!(run(), run());
}

#[test]
fn step_after_goal_requires_reset() {
    let mut env = default_env();
    env.reset(None);
    // down x4, right x4 runs along the left and bottom edges
    for action in [1, 1, 1, 1, 3, 3, 3] {
        assert!(!env.step(action).unwrap().done());
    }
    let last = env.step(3).unwrap();
    assert!(last.terminated);
    assert_eq!(last.reward, 9.0);
    assert_eq!(env.phase(), Phase::Finished);

    assert!(matches!(env.step(0), Err(GridError::InvalidState(_))));
    assert_eq!(env.reset(None), 0);
    assert!(env.step(0).is_ok());
}

#[test]
#[traced_test]
fn feedback_survives_reopen_and_shapes_reward() {
    let dir = tempdir().unwrap();
    let config = FeedbackConfig {
        path: dir.path().join("nested").join("feedback.json"),
        beta: 0.5,
    };

    let mut store = FeedbackStore::open(config.clone());
    assert_eq!(store.add_feedback(0, 3, FeedbackLabel::Like), 1);
    assert_eq!(store.add_feedback(0, 3, FeedbackLabel::Like), 2);
    assert_eq!(store.add_feedback(7, 1, FeedbackLabel::Dislike), -1);
    assert_eq!(store.persist_failures(), 0);

    let reopened = FeedbackStore::open(config);
    assert_eq!(reopened.len(), 2);
    assert_eq!(reopened.get_feedback_score(0, 3), 2.0);
    assert_eq!(reopened.get_feedback_score(7, 1), -1.0);
    assert_eq!(reopened.get_feedback_score(24, 0), 0.0);
    assert_eq!(reopened.shaped_reward(-1.0, 0, 3), 0.0);
    assert_eq!(reopened.shaped_reward(-1.0, 7, 1), -1.5);
}

#[test]
fn feedback_shaping_changes_learned_values() {
    let dir = tempdir().unwrap();
    let mut store = FeedbackStore::open(FeedbackConfig {
        path: dir.path().join("feedback.json"),
        beta: 0.5,
    });
    for _ in 0..4 {
        store.add_feedback(0, 1, FeedbackLabel::Like);
    }

    let config = TrainingConfig { episodes: 20, seed: 3, use_feedback: true, ..TrainingConfig::default() };
    let train = |feedback: Option<&FeedbackStore>| {
        let mut env = default_env();
        let mut agent = QLearningAgent::new(25, 4, fast_learner()).unwrap();
        let report = run_training(&mut env, &mut agent, feedback, &config).unwrap();
        (agent.q_value(0, 1), report.used_feedback)
    };

    let (plain, plain_flag) = train(None);
    let (shaped, shaped_flag) = train(Some(&store));
    assert!(!plain_flag);
    assert!(shaped_flag);
    assert!(shaped > plain);
}

#[test]
fn generates_expert_dataset_from_settings() {
    let dir = tempdir().unwrap();
    let mut settings = Settings::default();
    settings.dataset.episodes = 3;
    settings.dataset.policy = Policy::Expert;
    settings.dataset.output = dir.path().join("out").join("dataset.jsonl");

    let episodes = generate_dataset(&settings).unwrap();
    assert_eq!(episodes.len(), 3);

    let text = fs::read_to_string(&settings.dataset.output).unwrap();
    let parsed: Vec<Episode> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(parsed, episodes);
    for episode in &parsed {
        let last = episode.transitions.last().unwrap();
        assert!(last.done);
        assert_eq!(last.s_next, 24);
    }
}

#[test]
fn random_dataset_respects_step_cap() {
    let dir = tempdir().unwrap();
    let mut settings = Settings::default();
    settings.dataset.episodes = 5;
    settings.dataset.policy = Policy::Random;
    settings.dataset.max_steps_per_episode = 4;
    settings.dataset.output = dir.path().join("random.jsonl");

    let episodes = generate_dataset(&settings).unwrap();
    assert!(episodes.iter().all(|e| !e.transitions.is_empty() && e.transitions.len() <= 4));
    assert_eq!(episodes, generate_dataset(&settings).unwrap());
}

fn grid_and_cell() -> impl Strategy<Value = (GridSpec, Position)> {
    (1usize..8, 1usize..8).prop_flat_map(|(width, height)| {
        (Just(width), Just(height), 0..width, 0..height).prop_map(|(width, height, x, y)| {
            let spec = GridSpec {
                width,
                height,
                start: Position::new(0, 0),
                goal: Position::new(width - 1, height - 1),
                obstacles: Vec::new(),
            };
            (spec, Position::new(x, y))
        })
    })
}

proptest! {
    #[test]
    fn moves_stay_on_grid((spec, pos) in grid_and_cell(), action in 0usize..4) {
        let action = Action::try_from(action).unwrap();
        let next = action.apply(pos, &spec);
        prop_assert!(spec.contains(next));
        prop_assert!(pos.manhattan(&next) <= 1);
        prop_assert_eq!(spec.decode(spec.encode(next)), next);
    }

    #[test]
    fn shaped_reward_is_linear_in_score(likes in 0usize..6, dislikes in 0usize..6, beta in 0.0f64..2.0) {
        let dir = tempdir().unwrap();
        let mut store = FeedbackStore::open(FeedbackConfig { path: dir.path().join("f.json"), beta });
        for _ in 0..likes {
            store.add_feedback(1, 2, FeedbackLabel::Like);
        }
        for _ in 0..dislikes {
            store.add_feedback(1, 2, FeedbackLabel::Dislike);
        }
        let score = likes as f64 - dislikes as f64;
        prop_assert_eq!(store.get_feedback_score(1, 2), score);
        prop_assert!((store.shaped_reward(-1.0, 1, 2) - (-1.0 + beta * score)).abs() < 1e-12);
    }
}
