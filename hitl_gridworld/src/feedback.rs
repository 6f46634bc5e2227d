//! Human feedback store and reward shaping.
//!
//! Scores accumulate per `(state, action)` pair and are written to a JSON
//! object keyed by `"<state>:<action>"` after every change. Loading and saving
//! are lenient: a missing or corrupt file yields an empty store, and a failed
//! write is logged and counted without touching the in-memory scores.

use crate::error::{GridError, Result};
use serde::ser::{Serialize, Serializer};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

/// Feedback section of the settings file.
#[derive(Debug, Clone, PartialEq, serde::Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    pub path: PathBuf,
    /// Weight of the feedback score in the shaped reward.
    pub beta: f64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/feedback/gridworld_feedback.json"),
            beta: 0.5,
        }
    }
}

impl FeedbackConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.beta.is_finite() {
            return Err(GridError::config(format!("feedback beta must be finite, got {}", self.beta)));
        }
        if self.path.as_os_str().is_empty() {
            return Err(GridError::config("feedback path must not be empty"));
        }
        Ok(())
    }
}

/// A human judgement of one action taken in one state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackLabel {
    Like,
    Dislike,
}

impl FeedbackLabel {
    pub fn value(self) -> i64 {
        match self {
            FeedbackLabel::Like => 1,
            FeedbackLabel::Dislike => -1,
        }
    }
}

impl TryFrom<i64> for FeedbackLabel {
    type Error = GridError;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            1 => Ok(FeedbackLabel::Like),
            -1 => Ok(FeedbackLabel::Dislike),
            other => Err(GridError::InvalidFeedbackLabel(other)),
        }
    }
}

/// Composite `(state, action)` key, written as `"<state>:<action>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeedbackKey {
    pub state: usize,
    pub action: usize,
}

impl fmt::Display for FeedbackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.state, self.action)
    }
}

impl FromStr for FeedbackKey {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (state, action) = s.split_once(':').ok_or_else(|| format!("missing ':' in key {s:?}"))?;
        let state = state.trim().parse().map_err(|_| format!("bad state in key {s:?}"))?;
        let action = action.trim().parse().map_err(|_| format!("bad action in key {s:?}"))?;
        Ok(Self { state, action })
    }
}

/// Serializes the score map with string keys, ordered by `(state, action)`.
struct PersistedScores<'a>(&'a BTreeMap<FeedbackKey, i64>);

impl Serialize for PersistedScores<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(key, score)| (key.to_string(), score)))
    }
}

/// Persistent `(state, action) -> score` mapping.
pub struct FeedbackStore {
    config: FeedbackConfig,
    scores: BTreeMap<FeedbackKey, i64>,
    persist_failures: usize,
}

impl FeedbackStore {
    /// Open the store at `config.path`, loading any previously saved scores.
    #[instrument(skip(config), fields(path = %config.path.display()))]
    pub fn open(config: FeedbackConfig) -> Self {
        let scores = load_scores(&config.path);
        debug!(entries = scores.len(), "feedback store opened");
        Self {
            config,
            scores,
            persist_failures: 0,
        }
    }

    /// Accumulate `label` for the pair and rewrite the backing file.
    ///
    /// Returns the new score. A write failure is logged and counted in
    /// [`FeedbackStore::persist_failures`]; the in-memory update is kept.
    pub fn add_feedback(&mut self, state: usize, action: usize, label: FeedbackLabel) -> i64 {
        let key = FeedbackKey { state, action };
        let score = self.scores.entry(key).or_insert(0);
        *score += label.value();
        let score = *score;
        info!(%key, ?label, score, "feedback recorded");

        if let Err(e) = self.try_save() {
            self.persist_failures += 1;
            warn!(error = %e, "failed to persist feedback; keeping in-memory update");
        }
        score
    }

    /// Accumulated score for the pair, `0.0` when never labelled.
    pub fn get_feedback_score(&self, state: usize, action: usize) -> f64 {
        self.scores
            .get(&FeedbackKey { state, action })
            .copied()
            .unwrap_or(0) as f64
    }

    /// `env_reward + beta * score(state, action)`.
    pub fn shaped_reward(&self, env_reward: f64, state: usize, action: usize) -> f64 {
        env_reward + self.config.beta * self.get_feedback_score(state, action)
    }

    /// Write the full mapping, surfacing any error.
    ///
    /// The file is written to a temporary sibling and renamed into place.
    pub fn try_save(&self) -> Result<()> {
        let path = &self.config.path;
        let persistence = |source: io::Error| GridError::Persistence {
            path: path.clone(),
            source,
        };

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(persistence)?;

        let json = serde_json::to_string_pretty(&PersistedScores(&self.scores))
            .map_err(|e| persistence(e.into()))?;
        let mut tmp = NamedTempFile::new_in(dir).map_err(persistence)?;
        tmp.write_all(json.as_bytes()).map_err(persistence)?;
        tmp.persist(path).map_err(|e| persistence(e.error))?;
        Ok(())
    }

    /// Number of writes that failed since the store was opened.
    pub fn persist_failures(&self) -> usize {
        self.persist_failures
    }

    pub fn entries(&self) -> impl Iterator<Item = (FeedbackKey, i64)> + '_ {
        self.scores.iter().map(|(k, v)| (*k, *v))
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn beta(&self) -> f64 {
        self.config.beta
    }
}

fn load_scores(path: &Path) -> BTreeMap<FeedbackKey, i64> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            warn!(error = %e, "could not read feedback file; starting empty");
            return BTreeMap::new();
        }
    };

    let raw: serde_json::Map<String, serde_json::Value> = match serde_json::from_str(&text) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "feedback file is not a JSON object; starting empty");
            return BTreeMap::new();
        }
    };

    let mut scores = BTreeMap::new();
    for (key, value) in raw {
        match (key.parse::<FeedbackKey>(), value.as_i64()) {
            (Ok(parsed), Some(score)) => {
                scores.insert(parsed, score);
            }
            (Err(reason), _) => warn!(%reason, "skipping malformed feedback key"),
            (Ok(_), None) => warn!(%key, %value, "skipping non-integer feedback score"),
        }
    }
    scores
}
