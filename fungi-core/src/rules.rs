use serde::Deserialize;
use std::time::Duration;

/// Tunables of the ledger, loaded from the `business_rules` config section.
#[derive(Debug, Deserialize, Clone)]
pub struct LedgerRules {
    /// Meeting points a participant may pick for an offer.
    #[serde(default = "default_meeting_points")]
    pub meeting_points: Vec<String>,
    /// Delay before a live board retries after the store failed.
    #[serde(default = "default_resync_interval_secs")]
    pub resync_interval_secs: u64,
}

fn default_meeting_points() -> Vec<String> {
    vec![
        "Main railway station".to_string(),
        "Town hall car park".to_string(),
        "Forest trailhead".to_string(),
    ]
}

fn default_resync_interval_secs() -> u64 {
    5
}

impl Default for LedgerRules {
    fn default() -> Self {
        Self {
            meeting_points: default_meeting_points(),
            resync_interval_secs: default_resync_interval_secs(),
        }
    }
}

impl LedgerRules {
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs.max(1))
    }

    /// The configured spelling of `raw`, if it names a known meeting point.
    pub fn meeting_point(&self, raw: &str) -> Option<&str> {
        let wanted = raw.trim().to_lowercase();
        self.meeting_points
            .iter()
            .find(|p| p.to_lowercase() == wanted)
            .map(String::as_str)
    }
}
