//! Weighted transition table.
//!
//! Maps a state name to an ordered list of `(next_state, weight)` pairs.
//! Selection walks the cumulative distribution in declaration order so that a
//! fixed stream of draws always yields the same sequence of states.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// One weighted successor of a state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Successor state name.
    pub to: String,
    /// Relative weight; normalized against the row total.
    pub weight: f64,
}

/// State name to weighted successors.
///
/// A state with no row, or with an empty row, is terminal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionTable {
    rows: BTreeMap<String, Vec<Transition>>,
}

impl TransitionTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare (or replace) the successors of `from`, keeping their order.
    pub fn with<I, T>(mut self, from: impl Into<String>, successors: I) -> Self
    where
        I: IntoIterator<Item = (T, f64)>,
        T: Into<String>,
    {
        self.set(from, successors);
        self
    }

    /// Declare (or replace) the successors of `from` in place.
    pub fn set<I, T>(&mut self, from: impl Into<String>, successors: I)
    where
        I: IntoIterator<Item = (T, f64)>,
        T: Into<String>,
    {
        let row = successors
            .into_iter()
            .map(|(to, weight)| Transition {
                to: to.into(),
                weight,
            })
            .collect();
        self.rows.insert(from.into(), row);
    }

    /// Successors of `state` in declaration order.
    pub fn successors(&self, state: &str) -> &[Transition] {
        self.rows.get(state).map(Vec::as_slice).unwrap_or(&[])
    }

    /// True if stepping must stop after `state`.
    pub fn is_terminal(&self, state: &str) -> bool {
        self.successors(state).is_empty()
    }

    /// States that have a row (possibly empty).
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    /// Overlay `other` row-by-row; rows in `other` replace rows in `self`.
    pub(crate) fn merge(&mut self, other: TransitionTable) {
        self.rows.extend(other.rows);
    }

    /// Pick the successor of `current` for a uniform `draw` in `[0, 1)`.
    ///
    /// Returns `None` when `current` is terminal. Assumes the table passed
    /// [`TransitionTable::validate`].
    pub fn pick_next(&self, current: &str, draw: f64) -> Option<&str> {
        let row = self.successors(current);
        let total: f64 = row.iter().map(|t| t.weight).sum();
        if row.is_empty() || total <= 0.0 {
            return None;
        }

        let mut cumulative = 0.0;
        for transition in row {
            cumulative += transition.weight / total;
            if cumulative > draw {
                return Some(transition.to.as_str());
            }
        }

        // Rounding can leave the last bucket just below 1.0.
        row.iter()
            .rev()
            .find(|t| t.weight > 0.0)
            .map(|t| t.to.as_str())
    }

    /// Check weights and that every source and target names a known state.
    pub fn validate(&self, states: &BTreeSet<&str>) -> ConfigResult<()> {
        for (from, row) in &self.rows {
            if !states.contains(from.as_str()) {
                return Err(ConfigError::UnknownTransitionSource(from.clone()));
            }
            let mut total = 0.0;
            for transition in row {
                if !states.contains(transition.to.as_str()) {
                    return Err(ConfigError::UnknownTransitionTarget {
                        from: from.clone(),
                        to: transition.to.clone(),
                    });
                }
                if !transition.weight.is_finite() || transition.weight < 0.0 {
                    return Err(ConfigError::InvalidWeight {
                        from: from.clone(),
                        to: transition.to.clone(),
                        weight: transition.weight,
                    });
                }
                total += transition.weight;
            }
            if !row.is_empty() && total <= 0.0 {
                return Err(ConfigError::ZeroTotalWeight(from.clone()));
            }
        }
        Ok(())
    }
}
