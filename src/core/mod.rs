//! Core module - the monitoring loop

mod engine;

pub use engine::Monitor;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::detection::AlertState;

/// Running counters for one monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorStats {
    pub running: bool,
    pub readings_stored: u64,
    pub store_errors: u64,
    pub readings_purged: u64,
    pub alert_cycles: u64,
    pub last_cycle: Option<DateTime<Utc>>,
    pub alert_state: AlertState,
    pub ventilation_on: bool,
}

impl Default for MonitorStats {
    fn default() -> Self {
        Self {
            running: false,
            readings_stored: 0,
            store_errors: 0,
            readings_purged: 0,
            alert_cycles: 0,
            last_cycle: None,
            alert_state: AlertState::Quiescent,
            ventilation_on: false,
        }
    }
}
