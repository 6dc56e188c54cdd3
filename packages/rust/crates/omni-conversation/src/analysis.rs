//! Lightweight conversation heuristics: repetition, length trend, rapid-fire, topic switch.
//!
//! All functions are pure over borrowed tracker state.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ConfigError;
use crate::record::{ContextMemory, HistoryRecord, Metadata};

/// Phrases that mark an explicit topic change (matched case-insensitively).
pub const SWITCH_INDICATORS: [&str; 5] = [
    "new topic",
    "different question",
    "change subject",
    "anyway",
    "by the way",
];

/// Minimum history size before pattern detection runs.
pub const MIN_HISTORY_FOR_PATTERNS: usize = 3;
/// Minimum history size, before the current record, for context-switch detection.
pub const MIN_HISTORY_FOR_SWITCH: usize = 2;

const REPETITION_WINDOW: usize = 5;
const TREND_WINDOW: usize = 3;
const SWITCH_WINDOW: usize = 3;

/// Heuristic constants. Defaults are the documented contract values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicThresholds {
    /// `increasing_length` when recent average exceeds overall average times this.
    pub length_increase_factor: f64,
    /// `decreasing_length` when recent average falls below overall average times this.
    pub length_decrease_factor: f64,
    /// Switch when the length gap exceeds the recent average times this.
    pub switch_length_ratio: f64,
    /// `rapid_execution` when consecutive records are closer than this many seconds.
    pub rapid_execution_secs: f64,
}

impl Default for HeuristicThresholds {
    fn default() -> Self {
        Self {
            length_increase_factor: 1.5,
            length_decrease_factor: 0.5,
            switch_length_ratio: 0.8,
            rapid_execution_secs: 1.0,
        }
    }
}

impl HeuristicThresholds {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("length_increase_factor", self.length_increase_factor),
            ("length_decrease_factor", self.length_decrease_factor),
            ("switch_length_ratio", self.switch_length_ratio),
            ("rapid_execution_secs", self.rapid_execution_secs),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidThreshold { name, value });
            }
        }
        Ok(())
    }
}

/// Outcome of the repetition check. The two variants are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repetition {
    /// At least one duplicate among the recent messages.
    Repetitive,
    /// All recent messages distinct.
    Unique,
}

/// Direction of a significant message-length trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthTrend {
    /// Recent messages much longer than the running average.
    Increasing,
    /// Recent messages much shorter than the running average.
    Decreasing,
}

/// Patterns detected for one invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectedPatterns {
    /// Repetition verdict, when evaluated.
    pub repetition: Option<Repetition>,
    /// Length trend, when significant.
    pub length_trend: Option<LengthTrend>,
    /// Two most recent records arrived in quick succession.
    pub rapid_execution: bool,
}

impl DetectedPatterns {
    /// Whether no flag is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.repetition.is_none() && self.length_trend.is_none() && !self.rapid_execution
    }

    /// Render as a metadata object of boolean flags.
    #[must_use]
    pub fn to_metadata(&self) -> Value {
        let mut flags = Metadata::new();
        match self.repetition {
            Some(Repetition::Repetitive) => {
                flags.insert("repetitive_messages".to_string(), Value::Bool(true));
            }
            Some(Repetition::Unique) => {
                flags.insert("unique_messages".to_string(), Value::Bool(true));
            }
            None => {}
        }
        match self.length_trend {
            Some(LengthTrend::Increasing) => {
                flags.insert("increasing_length".to_string(), Value::Bool(true));
            }
            Some(LengthTrend::Decreasing) => {
                flags.insert("decreasing_length".to_string(), Value::Bool(true));
            }
            None => {}
        }
        if self.rapid_execution {
            flags.insert("rapid_execution".to_string(), Value::Bool(true));
        }
        Value::Object(flags)
    }
}

/// Why a context switch was flagged.
#[derive(Debug, Clone, PartialEq)]
pub enum SwitchTrigger {
    /// The message contains one of [`SWITCH_INDICATORS`].
    Indicator(&'static str),
    /// The message length departs sharply from the recent average.
    LengthShift {
        /// Current message length in characters.
        length: usize,
        /// Mean length of the recent messages compared against.
        recent_average: f64,
    },
}

/// Detect patterns over `history` (current record included) and `memory`.
#[must_use]
pub fn detect_patterns<'a, I>(
    history: I,
    memory: &ContextMemory,
    thresholds: &HeuristicThresholds,
) -> DetectedPatterns
where
    I: IntoIterator<Item = &'a HistoryRecord>,
    I::IntoIter: DoubleEndedIterator + ExactSizeIterator,
{
    let history = history.into_iter();
    if history.len() < MIN_HISTORY_FOR_PATTERNS {
        return DetectedPatterns::default();
    }
    let newest_first: Vec<&HistoryRecord> = history.rev().take(REPETITION_WINDOW).collect();

    let mut seen = HashSet::with_capacity(newest_first.len());
    let repetitive = !newest_first
        .iter()
        .all(|record| seen.insert(record.message.as_str()));

    let rapid_execution = match newest_first.as_slice() {
        [latest, previous, ..] => {
            let gap = latest.timestamp - previous.timestamp;
            seconds(gap) < thresholds.rapid_execution_secs
        }
        _ => false,
    };

    DetectedPatterns {
        repetition: Some(if repetitive {
            Repetition::Repetitive
        } else {
            Repetition::Unique
        }),
        length_trend: length_trend(&memory.message_lengths, thresholds),
        rapid_execution,
    }
}

#[allow(clippy::cast_precision_loss)]
fn length_trend(lengths: &[usize], thresholds: &HeuristicThresholds) -> Option<LengthTrend> {
    if lengths.len() < TREND_WINDOW {
        return None;
    }
    let recent = &lengths[lengths.len() - TREND_WINDOW..];
    let recent_avg = recent.iter().sum::<usize>() as f64 / TREND_WINDOW as f64;
    let overall_avg = lengths.iter().sum::<usize>() as f64 / lengths.len() as f64;

    if recent_avg > overall_avg * thresholds.length_increase_factor {
        Some(LengthTrend::Increasing)
    } else if recent_avg < overall_avg * thresholds.length_decrease_factor {
        Some(LengthTrend::Decreasing)
    } else {
        None
    }
}

/// Detect a topic change at the newest record of `history`.
///
/// `prior_records` is the history size before that record was appended.
/// The length average covers the last three records, the newest included.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn detect_context_switch<'a, I>(
    history: I,
    prior_records: usize,
    thresholds: &HeuristicThresholds,
) -> Option<SwitchTrigger>
where
    I: IntoIterator<Item = &'a HistoryRecord>,
    I::IntoIter: DoubleEndedIterator,
{
    if prior_records < MIN_HISTORY_FOR_SWITCH {
        return None;
    }
    let recent: Vec<&HistoryRecord> = history.into_iter().rev().take(SWITCH_WINDOW).collect();
    let current = recent.first()?;

    let lowered = current.message.to_lowercase();
    if let Some(indicator) = SWITCH_INDICATORS
        .iter()
        .find(|indicator| lowered.contains(*indicator))
    {
        return Some(SwitchTrigger::Indicator(*indicator));
    }

    let recent_average =
        recent.iter().map(|record| record.message_chars()).sum::<usize>() as f64 / recent.len() as f64;
    let length = current.message_chars();
    if (length as f64 - recent_average).abs() > recent_average * thresholds.switch_length_ratio {
        return Some(SwitchTrigger::LengthShift {
            length,
            recent_average,
        });
    }
    None
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn seconds(delta: chrono::TimeDelta) -> f64 {
    match delta.num_microseconds() {
        Some(micros) => micros as f64 / 1_000_000.0,
        None => delta.num_milliseconds() as f64 / 1_000.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeDelta, Utc};

    fn record(at: DateTime<Utc>, seq: u64, message: &str) -> HistoryRecord {
        HistoryRecord::new(at, message, "THINK", seq, Metadata::new())
    }

    fn spaced(messages: &[&str], gap: TimeDelta) -> Vec<HistoryRecord> {
        let start = Utc::now();
        messages
            .iter()
            .zip(0_i32..)
            .map(|(message, i)| record(start + gap * i, u64::from(i.unsigned_abs()) + 1, message))
            .collect()
    }

    fn memory_for(history: &[HistoryRecord]) -> ContextMemory {
        let mut memory = ContextMemory::default();
        for record in history {
            memory.record_length(record.message_chars());
        }
        memory
    }

    #[test]
    fn patterns_need_three_records() {
        let history = spaced(&["a", "a"], TimeDelta::zero());
        let patterns = detect_patterns(&history, &memory_for(&history), &HeuristicThresholds::default());
        assert!(patterns.is_empty());
    }

    #[test]
    fn duplicate_in_window_is_repetitive() {
        let history = spaced(&["x", "y", "x"], TimeDelta::seconds(5));
        let patterns = detect_patterns(&history, &memory_for(&history), &HeuristicThresholds::default());
        assert_eq!(patterns.repetition, Some(Repetition::Repetitive));
        assert!(!patterns.rapid_execution);
    }

    #[test]
    fn duplicates_outside_window_do_not_count() {
        let history = spaced(&["dup", "a", "b", "c", "d", "dup"], TimeDelta::seconds(5));
        let patterns = detect_patterns(&history, &memory_for(&history), &HeuristicThresholds::default());
        assert_eq!(patterns.repetition, Some(Repetition::Unique));
    }

    #[test]
    fn rapid_execution_uses_latest_gap() {
        let history = spaced(&["a", "b", "c"], TimeDelta::milliseconds(200));
        let patterns = detect_patterns(&history, &memory_for(&history), &HeuristicThresholds::default());
        assert!(patterns.rapid_execution);
        let flags = patterns.to_metadata();
        assert_eq!(flags["rapid_execution"], Value::Bool(true));
        assert_eq!(flags["unique_messages"], Value::Bool(true));
    }

    #[test]
    fn increasing_and_decreasing_length_trends() {
        let thresholds = HeuristicThresholds::default();
        let growing = [1, 1, 1, 1, 1, 1, 20, 20, 20];
        assert_eq!(length_trend(&growing, &thresholds), Some(LengthTrend::Increasing));

        let shrinking = [40, 40, 40, 40, 40, 40, 2, 2, 2];
        assert_eq!(length_trend(&shrinking, &thresholds), Some(LengthTrend::Decreasing));

        let flat = [10, 10, 10, 10];
        assert_eq!(length_trend(&flat, &thresholds), None);
    }

    #[test]
    fn indicator_phrase_is_case_insensitive() {
        let history = spaced(&["hello", "hi", "OK, By The Way, what now?"], TimeDelta::seconds(5));
        let trigger = detect_context_switch(&history, 2, &HeuristicThresholds::default());
        assert_eq!(trigger, Some(SwitchTrigger::Indicator("by the way")));
    }

    #[test]
    fn switch_needs_two_prior_records() {
        let history = spaced(&["hello", "anyway"], TimeDelta::seconds(5));
        assert!(detect_context_switch(&history, 1, &HeuristicThresholds::default()).is_none());
    }

    #[test]
    fn length_average_includes_current_message() {
        let thresholds = HeuristicThresholds::default();
        let ten = "0123456789";
        let nineteen = "0123456789012345678";

        // [10, 10, 19] averages 13; a gap of 6 stays under 0.8 * 13.
        let history = spaced(&[ten, ten, ten, nineteen], TimeDelta::seconds(5));
        assert!(detect_context_switch(&history, 3, &thresholds).is_none());

        let history = spaced(
            &["a much much longer opening message", "short", "short", "this one is far longer than five"],
            TimeDelta::seconds(5),
        );
        match detect_context_switch(&history, 3, &thresholds) {
            Some(SwitchTrigger::LengthShift { length, recent_average }) => {
                assert_eq!(length, 32);
                assert!((recent_average - 14.0).abs() < f64::EPSILON);
            }
            other => panic!("expected length shift, got {other:?}"),
        }
    }

    #[test]
    fn invalid_thresholds_are_rejected() {
        let thresholds = HeuristicThresholds {
            switch_length_ratio: f64::NAN,
            ..HeuristicThresholds::default()
        };
        assert!(matches!(
            thresholds.validate(),
            Err(ConfigError::InvalidThreshold { name: "switch_length_ratio", .. })
        ));
    }
}
