//! Hysteresis detector for a single parameter

use super::rules::Thresholds;
use crate::models::AlertStatus;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Event produced by one check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertEvent {
    pub timestamp: DateTime<Utc>,
    pub value: u64,
    pub status: AlertStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DetectorState {
    Normal {
        /// First tick of the current crossing above high
        crossed_at: Option<DateTime<Utc>>,
    },
    Raised {
        last_notified: DateTime<Utc>,
        /// First tick of the current run below low
        below_since: Option<DateTime<Utc>>,
    },
}

/// Converts a stream of values into raise/continue/fall events
#[derive(Debug, Clone)]
pub struct AlertProcessor {
    thresholds: Thresholds,
    state: DetectorState,
}

impl AlertProcessor {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            state: DetectorState::Normal { crossed_at: None },
        }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn is_raised(&self) -> bool {
        matches!(self.state, DetectorState::Raised { .. })
    }

    /// Feed one sample and return the event it triggers, if any
    pub fn check(&mut self, now: DateTime<Utc>, value: u64) -> Option<AlertEvent> {
        let Thresholds { low, high, timeout } = self.thresholds;

        match &mut self.state {
            DetectorState::Normal { crossed_at } => {
                if value < high {
                    *crossed_at = None;
                    return None;
                }

                let since = *crossed_at.get_or_insert(now);
                if !elapsed(since, now, timeout) {
                    return None;
                }

                self.state = DetectorState::Raised {
                    last_notified: now,
                    below_since: None,
                };
                Some(event(now, value, AlertStatus::Raise))
            }
            DetectorState::Raised {
                last_notified,
                below_since,
            } => {
                if value >= low {
                    *below_since = None;
                } else {
                    let since = *below_since.get_or_insert(now);
                    if elapsed(since, now, timeout) {
                        self.state = DetectorState::Normal { crossed_at: None };
                        return Some(event(now, value, AlertStatus::Fall));
                    }
                }

                if elapsed(*last_notified, now, timeout) {
                    *last_notified = now;
                    return Some(event(now, value, AlertStatus::Continue));
                }

                None
            }
        }
    }
}

fn event(timestamp: DateTime<Utc>, value: u64, status: AlertStatus) -> AlertEvent {
    AlertEvent {
        timestamp,
        value,
        status,
    }
}

/// Whether `timeout` has passed between `since` and `now`; a clock that
/// went backwards counts as no time passed
fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>, timeout: Duration) -> bool {
    (now - since).to_std().unwrap_or(Duration::ZERO) >= timeout
}
