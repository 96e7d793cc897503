//! Merge thresholds and the severity recompute rule.

use serde::{Deserialize, Serialize};
use time::Duration;

use epiwatch_core::{HazardClass, HazardTag, Severity};

/// Hazard-specific clustering thresholds. Human-case hazards move fast and
/// cluster tightly; environmental ones drift in over days and kilometers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergePolicy {
    pub human_proximity_m: f64,
    pub animal_proximity_m: f64,
    pub environmental_proximity_m: f64,
    pub human_window_hours: i64,
    pub animal_window_hours: i64,
    pub environmental_window_hours: i64,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            human_proximity_m: 5_000.0,
            animal_proximity_m: 10_000.0,
            environmental_proximity_m: 20_000.0,
            human_window_hours: 48,
            animal_window_hours: 7 * 24,
            environmental_window_hours: 14 * 24,
        }
    }
}

impl MergePolicy {
    pub fn proximity_m(&self, hazard: HazardTag) -> f64 {
        match hazard.class() {
            HazardClass::Human => self.human_proximity_m,
            HazardClass::Animal => self.animal_proximity_m,
            HazardClass::Environmental => self.environmental_proximity_m,
        }
    }

    /// Maximum age of an event's most recent contributing signal for the
    /// event to remain a merge candidate.
    pub fn window(&self, hazard: HazardTag) -> Duration {
        let hours = match hazard.class() {
            HazardClass::Human => self.human_window_hours,
            HazardClass::Animal => self.animal_window_hours,
            HazardClass::Environmental => self.environmental_window_hours,
        };
        Duration::hours(hours)
    }
}

/// Severity recompute on merge. Escalates with contributing-signal count
/// and with a high-risk hazard tag; never returns less than `current`, so
/// count fluctuations cannot under-alert. Only an explicit operator action
/// lowers severity.
pub fn recompute_severity(current: Severity, signal_count: usize, high_risk: bool) -> Severity {
    let by_count = if signal_count >= 8 {
        Severity::High
    } else if signal_count >= 3 {
        Severity::Medium
    } else {
        Severity::Low
    };
    let computed = if high_risk {
        if signal_count >= 8 {
            Severity::Critical
        } else {
            Severity::High.max(by_count)
        }
    } else {
        by_count
    };
    computed.max(current)
}
