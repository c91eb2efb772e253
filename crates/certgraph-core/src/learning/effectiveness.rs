//! Per-concept effectiveness tracking
//!
//! Every concept owns a [`ConceptStats`]: a bounded window of recent outcome
//! scores behind its own mutex, plus the published score and usage count as
//! atomics. Recording an outcome for one concept never contends with another
//! concept, and readers never wait on a writer.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::config::LearningConfig;
use crate::error::{Error, Result};

/// Mutable learning statistics of one concept
#[derive(Debug)]
pub struct ConceptStats {
    window: Mutex<OutcomeWindow>,
    /// `f64` bits of the current effectiveness score
    score_bits: AtomicU64,
    usage_count: AtomicU64,
    /// Set while a mining pass for this concept is queued
    mining_scheduled: AtomicBool,
}

#[derive(Debug)]
struct OutcomeWindow {
    samples: VecDeque<f64>,
    capacity: usize,
    updated_at: DateTime<Utc>,
}

impl ConceptStats {
    pub fn new(initial_score: f64, capacity: usize) -> Self {
        Self::restore(initial_score, 0, Vec::new(), capacity, Utc::now())
    }

    /// Rebuild statistics from persisted state
    ///
    /// A non-empty window determines the score; otherwise `score` is kept.
    /// Windows longer than `capacity` keep their most recent samples.
    pub fn restore(
        score: f64,
        usage_count: u64,
        window: Vec<f64>,
        capacity: usize,
        updated_at: DateTime<Utc>,
    ) -> Self {
        let capacity = capacity.max(1);
        let skip = window.len().saturating_sub(capacity);
        let samples: VecDeque<f64> = window
            .into_iter()
            .skip(skip)
            .map(|s| s.clamp(0.0, 1.0))
            .collect();
        let score = if samples.is_empty() {
            score.clamp(0.0, 1.0)
        } else {
            mean(&samples)
        };

        Self {
            window: Mutex::new(OutcomeWindow {
                samples,
                capacity,
                updated_at,
            }),
            score_bits: AtomicU64::new(score.to_bits()),
            usage_count: AtomicU64::new(usage_count),
            mining_scheduled: AtomicBool::new(false),
        }
    }

    /// Current effectiveness score (0.0 to 1.0)
    pub fn score(&self) -> f64 {
        f64::from_bits(self.score_bits.load(Ordering::Acquire))
    }

    pub fn usage_count(&self) -> u64 {
        self.usage_count.load(Ordering::Acquire)
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.lock().updated_at
    }

    /// Copy of the buffered samples, oldest first
    pub fn window(&self) -> Vec<f64> {
        self.lock().samples.iter().copied().collect()
    }

    pub fn sample_count(&self) -> usize {
        self.lock().samples.len()
    }

    /// Mark a mining pass as queued; false if one already is
    pub fn try_schedule_mining(&self) -> bool {
        self.mining_scheduled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn finish_mining(&self) {
        self.mining_scheduled.store(false, Ordering::Release);
    }

    fn lock(&self) -> MutexGuard<'_, OutcomeWindow> {
        // The window holds plain numbers; a panic mid-update cannot leave it
        // in a state worse than a lost sample.
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Result of folding one outcome into a concept's window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutcomeSummary {
    /// Score of this single outcome after bonus/penalty and clipping
    pub sample: f64,
    pub previous_score: f64,
    pub effectiveness_score: f64,
    /// Samples currently buffered
    pub samples: usize,
    pub usage_count: u64,
    /// Whether this outcome makes the concept due for a mining pass
    pub mining_due: bool,
}

/// Turns learner outcomes into rolling effectiveness scores
#[derive(Debug, Clone)]
pub struct EffectivenessTracker {
    config: LearningConfig,
}

impl EffectivenessTracker {
    pub fn new(config: LearningConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    /// Score a single outcome
    ///
    /// Success scores 1.0, failure 0.0. Finishing under `fast_ratio` of the
    /// expected time multiplies by `fast_bonus`; taking over `slow_ratio`
    /// multiplies by `slow_penalty`. The result is clipped to [0, 1].
    pub fn outcome_score(&self, success: bool, minutes_taken: f64, expected_minutes: f64) -> f64 {
        let mut score = if success { 1.0 } else { 0.0 };
        if minutes_taken < self.config.fast_ratio * expected_minutes {
            score *= self.config.fast_bonus;
        }
        if minutes_taken > self.config.slow_ratio * expected_minutes {
            score *= self.config.slow_penalty;
        }
        score.clamp(0.0, 1.0)
    }

    /// Record an outcome against a concept's statistics
    ///
    /// The whole read-modify-write of the window happens under the concept's
    /// own lock, so concurrent calls never lose a sample.
    pub fn record(
        &self,
        stats: &ConceptStats,
        expected_minutes: f64,
        success: bool,
        minutes_taken: f64,
    ) -> Result<OutcomeSummary> {
        if !minutes_taken.is_finite() || minutes_taken < 0.0 {
            return Err(Error::InvalidInput(format!(
                "minutes_taken must be a non-negative number, got {}",
                minutes_taken
            )));
        }

        let sample = self.outcome_score(success, minutes_taken, expected_minutes);

        let mut window = stats.lock();
        if window.samples.len() >= window.capacity {
            window.samples.pop_front();
        }
        window.samples.push_back(sample);
        window.updated_at = Utc::now();

        let previous_score = stats.score();
        let score = mean(&window.samples);
        let samples = window.samples.len();
        stats.score_bits.store(score.to_bits(), Ordering::Release);
        let usage_count = stats.usage_count.fetch_add(1, Ordering::AcqRel) + 1;
        drop(window);

        let min_samples = self.config.min_samples_for_mining;
        let threshold = self.config.pattern_threshold;
        let crossed = previous_score < threshold && score >= threshold;
        let mining_due = samples >= min_samples && (samples == min_samples || crossed);

        Ok(OutcomeSummary {
            sample,
            previous_score,
            effectiveness_score: score,
            samples,
            usage_count,
            mining_due,
        })
    }
}

fn mean(samples: &VecDeque<f64>) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().sum::<f64>() / samples.len() as f64).clamp(0.0, 1.0)
}
