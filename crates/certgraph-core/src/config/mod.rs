//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

/// Certgraph configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub learning: LearningConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

/// Structural and search limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Maximum hops explored by direct path search
    pub max_path_depth: usize,
    /// Maximum simple paths enumerated per query
    pub max_candidate_paths: usize,
    /// Effectiveness assigned to concepts with no recorded outcomes
    pub default_effectiveness: f64,
    /// Required embedding length; `None` lets the first embedding decide
    pub embedding_dimensions: Option<usize>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_path_depth: 10,
            max_candidate_paths: 64,
            default_effectiveness: 0.8,
            embedding_dimensions: None,
        }
    }
}

/// Outcome recording and pattern mining parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Ring buffer capacity per concept
    pub window_capacity: usize,
    /// Samples required before a concept is eligible for mining
    pub min_samples_for_mining: usize,
    /// Effectiveness a concept must reach to emit a pattern
    pub pattern_threshold: f64,
    /// Completion faster than `fast_ratio * expected` earns the bonus
    pub fast_ratio: f64,
    /// Completion slower than `slow_ratio * expected` takes the penalty
    pub slow_ratio: f64,
    pub fast_bonus: f64,
    pub slow_penalty: f64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            window_capacity: 20,
            min_samples_for_mining: 10,
            pattern_threshold: 0.8,
            fast_ratio: 0.8,
            slow_ratio: 1.5,
            fast_bonus: 1.1,
            slow_penalty: 0.9,
        }
    }
}

/// Heuristic weights for path and recommendation scoring
///
/// Every score is a weighted mean over the factors that have data, so a
/// weight of zero disables a factor without penalising anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub historical_weight: f64,
    pub progression_weight: f64,
    pub strength_weight: f64,
    pub alignment_weight: f64,
    pub connectivity_weight: f64,
    pub similarity_weight: f64,
    pub effectiveness_weight: f64,
    pub difficulty_fit_weight: f64,
    /// Difficulty increment a learner is expected to handle next
    pub difficulty_step: f64,
    /// Strength assumed for implicit prerequisite hops
    pub neutral_strength: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            historical_weight: 1.0,
            progression_weight: 1.0,
            strength_weight: 1.0,
            alignment_weight: 1.0,
            connectivity_weight: 1.0,
            similarity_weight: 1.0,
            effectiveness_weight: 1.0,
            difficulty_fit_weight: 1.0,
            difficulty_step: 0.1,
            neutral_strength: 0.5,
        }
    }
}

/// Durable store and mirroring settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub database_path: PathBuf,
    /// JSON seed loaded when the durable store cannot be read
    pub seed_path: Option<PathBuf>,
    /// JSONL file receiving mutations that exhausted their retries
    pub dead_letter_path: Option<PathBuf>,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub shutdown_timeout_secs: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            seed_path: None,
            dead_letter_path: None,
            max_attempts: 3,
            backoff_base_ms: 100,
            shutdown_timeout_secs: 10,
        }
    }
}

/// Get the default database path
pub fn default_database_path() -> PathBuf {
    if let Some(data_dir) = dirs::data_dir() {
        data_dir.join("certgraph").join("graph.db")
    } else {
        PathBuf::from("certgraph.db")
    }
}

const KEYS: &[&str] = &[
    "graph.max_path_depth",
    "graph.max_candidate_paths",
    "graph.default_effectiveness",
    "graph.embedding_dimensions",
    "learning.window_capacity",
    "learning.min_samples_for_mining",
    "learning.pattern_threshold",
    "learning.fast_ratio",
    "learning.slow_ratio",
    "learning.fast_bonus",
    "learning.slow_penalty",
    "scoring.historical_weight",
    "scoring.progression_weight",
    "scoring.strength_weight",
    "scoring.alignment_weight",
    "scoring.connectivity_weight",
    "scoring.similarity_weight",
    "scoring.effectiveness_weight",
    "scoring.difficulty_fit_weight",
    "scoring.difficulty_step",
    "scoring.neutral_strength",
    "persistence.database_path",
    "persistence.seed_path",
    "persistence.dead_letter_path",
    "persistence.max_attempts",
    "persistence.backoff_base_ms",
    "persistence.shutdown_timeout_secs",
];

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("CERTGRAPH_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("certgraph")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.graph.max_path_depth == 0 {
            return Err(anyhow!("graph.max_path_depth must be at least 1"));
        }
        if self.graph.max_candidate_paths == 0 {
            return Err(anyhow!("graph.max_candidate_paths must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.graph.default_effectiveness) {
            return Err(anyhow!("graph.default_effectiveness must be between 0.0 and 1.0"));
        }
        if self.learning.window_capacity == 0 {
            return Err(anyhow!("learning.window_capacity must be at least 1"));
        }
        if self.learning.min_samples_for_mining > self.learning.window_capacity {
            return Err(anyhow!(
                "learning.min_samples_for_mining cannot exceed learning.window_capacity"
            ));
        }
        if !(0.0..=1.0).contains(&self.learning.pattern_threshold) {
            return Err(anyhow!("learning.pattern_threshold must be between 0.0 and 1.0"));
        }
        if self.learning.fast_ratio > self.learning.slow_ratio {
            return Err(anyhow!("learning.fast_ratio cannot exceed learning.slow_ratio"));
        }
        let weights = [
            self.scoring.historical_weight,
            self.scoring.progression_weight,
            self.scoring.strength_weight,
            self.scoring.alignment_weight,
            self.scoring.connectivity_weight,
            self.scoring.similarity_weight,
            self.scoring.effectiveness_weight,
            self.scoring.difficulty_fit_weight,
        ];
        if weights.iter().any(|w| *w < 0.0 || !w.is_finite()) {
            return Err(anyhow!("Scoring weights must be finite and non-negative"));
        }
        if self.persistence.max_attempts == 0 {
            return Err(anyhow!("persistence.max_attempts must be at least 1"));
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        let opt_path = |p: &Option<PathBuf>| {
            p.as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(not set)".to_string())
        };

        match key {
            "graph.max_path_depth" => Ok(self.graph.max_path_depth.to_string()),
            "graph.max_candidate_paths" => Ok(self.graph.max_candidate_paths.to_string()),
            "graph.default_effectiveness" => Ok(self.graph.default_effectiveness.to_string()),
            "graph.embedding_dimensions" => Ok(self
                .graph
                .embedding_dimensions
                .map(|d| d.to_string())
                .unwrap_or_else(|| "(auto)".to_string())),

            "learning.window_capacity" => Ok(self.learning.window_capacity.to_string()),
            "learning.min_samples_for_mining" => {
                Ok(self.learning.min_samples_for_mining.to_string())
            }
            "learning.pattern_threshold" => Ok(self.learning.pattern_threshold.to_string()),
            "learning.fast_ratio" => Ok(self.learning.fast_ratio.to_string()),
            "learning.slow_ratio" => Ok(self.learning.slow_ratio.to_string()),
            "learning.fast_bonus" => Ok(self.learning.fast_bonus.to_string()),
            "learning.slow_penalty" => Ok(self.learning.slow_penalty.to_string()),

            "scoring.historical_weight" => Ok(self.scoring.historical_weight.to_string()),
            "scoring.progression_weight" => Ok(self.scoring.progression_weight.to_string()),
            "scoring.strength_weight" => Ok(self.scoring.strength_weight.to_string()),
            "scoring.alignment_weight" => Ok(self.scoring.alignment_weight.to_string()),
            "scoring.connectivity_weight" => Ok(self.scoring.connectivity_weight.to_string()),
            "scoring.similarity_weight" => Ok(self.scoring.similarity_weight.to_string()),
            "scoring.effectiveness_weight" => Ok(self.scoring.effectiveness_weight.to_string()),
            "scoring.difficulty_fit_weight" => Ok(self.scoring.difficulty_fit_weight.to_string()),
            "scoring.difficulty_step" => Ok(self.scoring.difficulty_step.to_string()),
            "scoring.neutral_strength" => Ok(self.scoring.neutral_strength.to_string()),

            "persistence.database_path" => Ok(self.persistence.database_path.display().to_string()),
            "persistence.seed_path" => Ok(opt_path(&self.persistence.seed_path)),
            "persistence.dead_letter_path" => Ok(opt_path(&self.persistence.dead_letter_path)),
            "persistence.max_attempts" => Ok(self.persistence.max_attempts.to_string()),
            "persistence.backoff_base_ms" => Ok(self.persistence.backoff_base_ms.to_string()),
            "persistence.shutdown_timeout_secs" => {
                Ok(self.persistence.shutdown_timeout_secs.to_string())
            }

            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `certgraph config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        fn parse<T: std::str::FromStr>(key: &str, value: &str) -> anyhow::Result<T>
        where
            T::Err: std::error::Error + Send + Sync + 'static,
        {
            value
                .parse::<T>()
                .with_context(|| format!("Invalid {} value: {}", key, value))
        }

        fn unit(key: &str, value: &str) -> anyhow::Result<f64> {
            let v: f64 = parse(key, value)?;
            if !(0.0..=1.0).contains(&v) {
                return Err(anyhow!("{} must be between 0.0 and 1.0", key));
            }
            Ok(v)
        }

        fn weight(key: &str, value: &str) -> anyhow::Result<f64> {
            let v: f64 = parse(key, value)?;
            if v < 0.0 || !v.is_finite() {
                return Err(anyhow!("{} must be a non-negative number", key));
            }
            Ok(v)
        }

        let opt_path = |value: &str| {
            if value.is_empty() || value == "none" {
                None
            } else {
                Some(PathBuf::from(value))
            }
        };

        let mut updated = self.clone();
        match key {
            "graph.max_path_depth" => updated.graph.max_path_depth = parse(key, value)?,
            "graph.max_candidate_paths" => updated.graph.max_candidate_paths = parse(key, value)?,
            "graph.default_effectiveness" => updated.graph.default_effectiveness = unit(key, value)?,
            "graph.embedding_dimensions" => {
                updated.graph.embedding_dimensions = if value == "auto" || value.is_empty() {
                    None
                } else {
                    Some(parse(key, value)?)
                }
            }

            "learning.window_capacity" => updated.learning.window_capacity = parse(key, value)?,
            "learning.min_samples_for_mining" => {
                updated.learning.min_samples_for_mining = parse(key, value)?
            }
            "learning.pattern_threshold" => updated.learning.pattern_threshold = unit(key, value)?,
            "learning.fast_ratio" => updated.learning.fast_ratio = weight(key, value)?,
            "learning.slow_ratio" => updated.learning.slow_ratio = weight(key, value)?,
            "learning.fast_bonus" => updated.learning.fast_bonus = weight(key, value)?,
            "learning.slow_penalty" => updated.learning.slow_penalty = weight(key, value)?,

            "scoring.historical_weight" => updated.scoring.historical_weight = weight(key, value)?,
            "scoring.progression_weight" => updated.scoring.progression_weight = weight(key, value)?,
            "scoring.strength_weight" => updated.scoring.strength_weight = weight(key, value)?,
            "scoring.alignment_weight" => updated.scoring.alignment_weight = weight(key, value)?,
            "scoring.connectivity_weight" => {
                updated.scoring.connectivity_weight = weight(key, value)?
            }
            "scoring.similarity_weight" => updated.scoring.similarity_weight = weight(key, value)?,
            "scoring.effectiveness_weight" => {
                updated.scoring.effectiveness_weight = weight(key, value)?
            }
            "scoring.difficulty_fit_weight" => {
                updated.scoring.difficulty_fit_weight = weight(key, value)?
            }
            "scoring.difficulty_step" => updated.scoring.difficulty_step = unit(key, value)?,
            "scoring.neutral_strength" => updated.scoring.neutral_strength = unit(key, value)?,

            "persistence.database_path" => {
                if value.is_empty() {
                    return Err(anyhow!("persistence.database_path cannot be empty"));
                }
                updated.persistence.database_path = PathBuf::from(value)
            }
            "persistence.seed_path" => updated.persistence.seed_path = opt_path(value),
            "persistence.dead_letter_path" => {
                updated.persistence.dead_letter_path = opt_path(value)
            }
            "persistence.max_attempts" => updated.persistence.max_attempts = parse(key, value)?,
            "persistence.backoff_base_ms" => {
                updated.persistence.backoff_base_ms = parse(key, value)?
            }
            "persistence.shutdown_timeout_secs" => {
                updated.persistence.shutdown_timeout_secs = parse(key, value)?
            }

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `certgraph config list` to see available keys.",
                    key
                ));
            }
        }

        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        KEYS.iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}
