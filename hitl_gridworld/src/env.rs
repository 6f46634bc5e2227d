//! Deterministic grid navigation environment.
//!
//! The agent moves on a `width x height` grid from `start` towards `goal`.
//! Moves clamp at the borders, obstacle cells block movement and cost an
//! extra penalty, and reaching the goal ends the episode. Positions are
//! exposed to learners only through the integer encoding `y * width + x`.

use crate::error::{GridError, Result};
use crate::space::Discrete;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, trace};

/// A cell on the grid. Serialized as an `[x, y]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(usize, usize)", into = "(usize, usize)")]
pub struct Position {
    pub x: usize,
    pub y: usize,
}

impl Position {
    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    /// Manhattan distance to `other`.
    pub fn manhattan(&self, other: &Position) -> usize {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

impl From<(usize, usize)> for Position {
    fn from((x, y): (usize, usize)) -> Self {
        Self { x, y }
    }
}

impl From<Position> for (usize, usize) {
    fn from(p: Position) -> Self {
        (p.x, p.y)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Immutable grid layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub width: usize,
    pub height: usize,
    pub start: Position,
    pub goal: Position,
    #[serde(default)]
    pub obstacles: Vec<Position>,
}

impl Default for GridSpec {
    /// 5x5 grid, start top-left, goal bottom-right, three obstacles.
    fn default() -> Self {
        Self {
            width: 5,
            height: 5,
            start: Position::new(0, 0),
            goal: Position::new(4, 4),
            obstacles: vec![Position::new(1, 2), Position::new(2, 2), Position::new(3, 1)],
        }
    }
}

impl GridSpec {
    pub fn num_states(&self) -> usize {
        self.width * self.height
    }

    pub fn contains(&self, pos: Position) -> bool {
        pos.x < self.width && pos.y < self.height
    }

    pub fn is_obstacle(&self, pos: Position) -> bool {
        self.obstacles.contains(&pos)
    }

    /// Encode a position as `y * width + x`.
    pub fn encode(&self, pos: Position) -> usize {
        pos.y * self.width + pos.x
    }

    /// Inverse of [`GridSpec::encode`].
    pub fn decode(&self, state: usize) -> Position {
        Position::new(state % self.width, state / self.width)
    }

    /// Check dimensions, bounds and obstacle placement.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(GridError::config(format!(
                "grid dimensions must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if self.width.checked_mul(self.height).is_none() {
            return Err(GridError::config("grid dimensions overflow the state space"));
        }
        if !self.contains(self.start) {
            return Err(GridError::config(format!("start {} is outside the grid", self.start)));
        }
        if !self.contains(self.goal) {
            return Err(GridError::config(format!("goal {} is outside the grid", self.goal)));
        }

        let mut seen = HashSet::with_capacity(self.obstacles.len());
        for &obstacle in &self.obstacles {
            if !self.contains(obstacle) {
                return Err(GridError::config(format!("obstacle {obstacle} is outside the grid")));
            }
            if obstacle == self.start || obstacle == self.goal {
                return Err(GridError::config(format!(
                    "obstacle {obstacle} overlaps the start or goal cell"
                )));
            }
            if !seen.insert(obstacle) {
                return Err(GridError::config(format!("duplicate obstacle {obstacle}")));
            }
        }
        Ok(())
    }
}

/// Reward constants applied by [`GridWorldEnv::step`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardConfig {
    pub step_penalty: f64,
    pub obstacle_penalty: f64,
    pub goal_reward: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            step_penalty: -1.0,
            obstacle_penalty: -5.0,
            goal_reward: 10.0,
        }
    }
}

/// Environment section of the settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub grid: GridSpec,
    pub rewards: RewardConfig,
    /// Truncate episodes after this many steps. `None` never truncates.
    pub max_episode_steps: Option<usize>,
}

/// The four grid moves, indexed as the learner sees them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Up = 0,
    Down = 1,
    Left = 2,
    Right = 3,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Up, Action::Down, Action::Left, Action::Right];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Target cell of this move from `pos`, clamped to the grid.
    pub fn apply(self, pos: Position, spec: &GridSpec) -> Position {
        match self {
            Action::Up => Position::new(pos.x, pos.y.saturating_sub(1)),
            Action::Down => Position::new(pos.x, (pos.y + 1).min(spec.height - 1)),
            Action::Left => Position::new(pos.x.saturating_sub(1), pos.y),
            Action::Right => Position::new((pos.x + 1).min(spec.width - 1), pos.y),
        }
    }
}

impl TryFrom<usize> for Action {
    type Error = GridError;

    fn try_from(value: usize) -> Result<Self> {
        Action::ALL
            .get(value)
            .copied()
            .ok_or(GridError::InvalidAction(value))
    }
}

/// Auxiliary per-step information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StepInfo {
    /// The attempted move hit an obstacle and the agent stayed in place.
    pub collision: bool,
}

/// Outcome of a single [`GridWorldEnv::step`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StepResult {
    pub state: usize,
    pub reward: f64,
    pub terminated: bool,
    pub truncated: bool,
    pub info: StepInfo,
}

impl StepResult {
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Active,
    Finished,
}

/// Grid navigation environment.
pub struct GridWorldEnv {
    spec: GridSpec,
    rewards: RewardConfig,
    max_episode_steps: Option<usize>,
    observation_space: Discrete,
    action_space: Discrete,
    position: Position,
    terminated: bool,
    truncated: bool,
    elapsed_steps: usize,
    rng: StdRng,
}

impl GridWorldEnv {
    /// Create an environment, validating the grid layout.
    pub fn new(spec: GridSpec, rewards: RewardConfig) -> Result<Self> {
        spec.validate()?;
        let observation_space = Discrete::new(spec.num_states())?;
        let action_space = Discrete::new(Action::ALL.len())?;
        let position = spec.start;

        debug!(
            width = spec.width,
            height = spec.height,
            obstacles = spec.obstacles.len(),
            "grid environment created"
        );

        Ok(Self {
            spec,
            rewards,
            max_episode_steps: None,
            observation_space,
            action_space,
            position,
            terminated: false,
            truncated: false,
            elapsed_steps: 0,
            rng: StdRng::from_entropy(),
        })
    }

    pub fn from_config(config: &EnvironmentConfig) -> Result<Self> {
        if config.max_episode_steps == Some(0) {
            return Err(GridError::config("max_episode_steps must be positive when set"));
        }
        Ok(Self::new(config.grid.clone(), config.rewards)?
            .with_max_episode_steps(config.max_episode_steps))
    }

    pub fn with_max_episode_steps(mut self, max_episode_steps: Option<usize>) -> Self {
        self.max_episode_steps = max_episode_steps;
        self
    }

    /// Return to the start cell. A seed reseeds the environment's own
    /// random source used by [`GridWorldEnv::sample_action`].
    pub fn reset(&mut self, seed: Option<u64>) -> usize {
        if let Some(seed) = seed {
            self.rng = StdRng::seed_from_u64(seed);
        }
        self.position = self.spec.start;
        self.terminated = false;
        self.truncated = false;
        self.elapsed_steps = 0;
        self.state()
    }

    /// Apply one move.
    ///
    /// Reward is `step_penalty`, plus `obstacle_penalty` when the target cell
    /// is blocked (the agent stays put), plus `goal_reward` when the agent
    /// ends on the goal.
    pub fn step(&mut self, action: usize) -> Result<StepResult> {
        if self.phase() == Phase::Finished {
            return Err(GridError::InvalidState(
                "episode has finished; call reset() before step()".to_string(),
            ));
        }
        let action = Action::try_from(action)?;

        let candidate = action.apply(self.position, &self.spec);
        let mut reward = self.rewards.step_penalty;
        let mut info = StepInfo::default();

        if self.spec.is_obstacle(candidate) {
            reward += self.rewards.obstacle_penalty;
            info.collision = true;
        } else {
            self.position = candidate;
        }
        self.elapsed_steps += 1;

        if self.position == self.spec.goal {
            reward += self.rewards.goal_reward;
            self.terminated = true;
        } else if let Some(limit) = self.max_episode_steps {
            if self.elapsed_steps >= limit {
                self.truncated = true;
            }
        }

        trace!(?action, position = %self.position, reward, collision = info.collision, "step");

        Ok(StepResult {
            state: self.state(),
            reward,
            terminated: self.terminated,
            truncated: self.truncated,
            info,
        })
    }

    /// Uniformly random action from the environment's random source.
    pub fn sample_action(&mut self) -> usize {
        self.action_space.sample(&mut self.rng)
    }

    pub fn phase(&self) -> Phase {
        if self.terminated || self.truncated {
            Phase::Finished
        } else {
            Phase::Active
        }
    }

    pub fn state(&self) -> usize {
        self.spec.encode(self.position)
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn spec(&self) -> &GridSpec {
        &self.spec
    }

    pub fn rewards(&self) -> &RewardConfig {
        &self.rewards
    }

    pub fn observation_space(&self) -> Discrete {
        self.observation_space
    }

    pub fn action_space(&self) -> Discrete {
        self.action_space
    }

    pub fn elapsed_steps(&self) -> usize {
        self.elapsed_steps
    }

    /// Text view: `.` empty, `#` obstacle, `S` start, `G` goal, `A` agent.
    pub fn render(&self) -> String {
        let mut cells = vec![vec!['.'; self.spec.width]; self.spec.height];
        for obstacle in &self.spec.obstacles {
            cells[obstacle.y][obstacle.x] = '#';
        }
        cells[self.spec.start.y][self.spec.start.x] = 'S';
        cells[self.spec.goal.y][self.spec.goal.x] = 'G';
        cells[self.position.y][self.position.x] = 'A';

        cells
            .iter()
            .map(|row| row.iter().map(char::to_string).collect::<Vec<_>>().join(" "))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Numeric view of the current position, see [`GridWorldEnv::as_array_at`].
    pub fn as_array(&self) -> Vec<Vec<i8>> {
        self.as_array_at(self.position)
    }

    /// Row-major matrix: 0 empty, -1 obstacle, 2 goal, 1 agent.
    pub fn as_array_at(&self, agent: Position) -> Vec<Vec<i8>> {
        let mut arr = vec![vec![0i8; self.spec.width]; self.spec.height];
        for obstacle in &self.spec.obstacles {
            arr[obstacle.y][obstacle.x] = -1;
        }
        arr[self.spec.goal.y][self.spec.goal.x] = 2;
        arr[agent.y][agent.x] = 1;
        arr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UP: usize = 0;
    const DOWN: usize = 1;
    const LEFT: usize = 2;
    const RIGHT: usize = 3;

    fn default_env() -> GridWorldEnv {
        GridWorldEnv::new(GridSpec::default(), RewardConfig::default()).unwrap()
    }

    fn open_grid(width: usize, height: usize) -> GridSpec {
        GridSpec {
            width,
            height,
            start: Position::new(0, 0),
            goal: Position::new(width - 1, height - 1),
            obstacles: Vec::new(),
        }
    }

    #[test]
    fn two_steps_right_from_start() {
        let mut env = default_env();
        assert_eq!(env.reset(None), 0);

        let mut total = 0.0;
        for _ in 0..2 {
            let result = env.step(RIGHT).unwrap();
            total += result.reward;
            assert!(!result.terminated);
        }
        assert_eq!(env.position(), Position::new(2, 0));
        assert_eq!(env.state(), 2);
        assert_eq!(total, -2.0);
    }

    #[test]
    fn obstacle_blocks_and_penalizes() {
        let mut env = default_env();
        env.reset(None);
        env.step(RIGHT).unwrap();
        env.step(DOWN).unwrap();
        assert_eq!(env.position(), Position::new(1, 1));

        let result = env.step(DOWN).unwrap();
        assert_eq!(env.position(), Position::new(1, 1));
        assert_eq!(result.state, 6);
        assert_eq!(result.reward, -6.0);
        assert!(result.info.collision);
        assert!(!result.done());
    }

    #[test]
    fn reaching_goal_finishes_episode() {
        let mut env = default_env();
        env.reset(None);
        for _ in 0..4 {
            env.step(DOWN).unwrap();
        }
        for _ in 0..3 {
            env.step(RIGHT).unwrap();
        }
        assert_eq!(env.position(), Position::new(3, 4));

        let result = env.step(RIGHT).unwrap();
        assert_eq!(result.reward, 9.0);
        assert!(result.terminated);
        assert_eq!(result.state, 24);
        assert_eq!(env.phase(), Phase::Finished);

        let err = env.step(LEFT).unwrap_err();
        assert!(matches!(err, GridError::InvalidState(_)));

        env.reset(None);
        assert_eq!(env.phase(), Phase::Active);
        assert!(env.step(LEFT).is_ok());
    }

    #[test]
    fn invalid_action_is_rejected() {
        let mut env = default_env();
        let err = env.step(4).unwrap_err();
        assert!(matches!(err, GridError::InvalidAction(4)));
        assert_eq!(env.position(), Position::new(0, 0));
    }

    #[test]
    fn moves_clamp_at_every_corner() {
        let spec = open_grid(3, 3);
        let corners = [
            (Position::new(0, 0), [UP, LEFT]),
            (Position::new(2, 0), [UP, RIGHT]),
            (Position::new(0, 2), [DOWN, LEFT]),
            (Position::new(2, 2), [DOWN, RIGHT]),
        ];
        for (corner, blocked) in corners {
            for action in blocked {
                let action = Action::try_from(action).unwrap();
                assert_eq!(action.apply(corner, &spec), corner, "{action:?} at {corner}");
            }
        }
    }

    #[test]
    fn clamped_move_costs_only_step_penalty() {
        let mut env = default_env();
        let result = env.step(UP).unwrap();
        assert_eq!(result.reward, -1.0);
        assert!(!result.info.collision);
        assert_eq!(env.position(), Position::new(0, 0));
    }

    #[test]
    fn encoding_round_trips_every_cell() {
        let spec = open_grid(4, 3);
        for state in 0..spec.num_states() {
            assert_eq!(spec.encode(spec.decode(state)), state);
        }
        assert_eq!(spec.encode(Position::new(3, 2)), 11);
    }

    #[test]
    fn malformed_specs_are_rejected() {
        let mut zero = open_grid(3, 3);
        zero.width = 0;
        assert!(zero.validate().is_err());

        let mut outside = open_grid(3, 3);
        outside.goal = Position::new(3, 0);
        assert!(outside.validate().is_err());

        let mut on_start = open_grid(3, 3);
        on_start.obstacles = vec![Position::new(0, 0)];
        assert!(on_start.validate().is_err());

        let mut duplicate = open_grid(3, 3);
        duplicate.obstacles = vec![Position::new(1, 1), Position::new(1, 1)];
        assert!(duplicate.validate().is_err());

        assert!(GridWorldEnv::new(duplicate, RewardConfig::default()).is_err());
    }

    #[test]
    fn truncates_at_step_limit() {
        let config = EnvironmentConfig {
            max_episode_steps: Some(3),
            ..EnvironmentConfig::default()
        };
        let mut env = GridWorldEnv::from_config(&config).unwrap();
        assert!(!env.step(UP).unwrap().truncated);
        assert!(!env.step(UP).unwrap().truncated);
        let last = env.step(UP).unwrap();
        assert!(last.truncated);
        assert!(!last.terminated);
        assert!(matches!(env.step(UP), Err(GridError::InvalidState(_))));
    }

    #[test]
    fn zero_step_limit_is_rejected() {
        let config = EnvironmentConfig {
            max_episode_steps: Some(0),
            ..EnvironmentConfig::default()
        };
        assert!(GridWorldEnv::from_config(&config).is_err());
    }

    #[test]
    fn render_marks_cells() {
        let env = default_env();
        let expected = "A . . . .\n. . . # .\n. # # . .\n. . . . .\n. . . . G";
        assert_eq!(env.render(), expected);
    }

    #[test]
    fn array_view_marks_cells() {
        let env = default_env();
        let arr = env.as_array();
        assert_eq!(arr.len(), 5);
        assert_eq!(arr[0][0], 1);
        assert_eq!(arr[2][1], -1);
        assert_eq!(arr[1][3], -1);
        assert_eq!(arr[4][4], 2);
        assert_eq!(arr[3][3], 0);

        let moved = env.as_array_at(Position::new(2, 3));
        assert_eq!(moved[0][0], 0);
        assert_eq!(moved[3][2], 1);
    }

    #[test]
    fn seeded_reset_makes_sampling_reproducible() {
        let mut a = default_env();
        let mut b = default_env();
        a.reset(Some(11));
        b.reset(Some(11));
        let xs: Vec<_> = (0..20).map(|_| a.sample_action()).collect();
        let ys: Vec<_> = (0..20).map(|_| b.sample_action()).collect();
        assert_eq!(xs, ys);
        assert!(xs.iter().all(|&x| x < 4));
    }
}
