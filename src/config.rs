use crate::focus::FocusTimings;
use crate::model::ColumnId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub const ENDPOINT_ENV: &str = "GRADESHEETD_ENDPOINT";
pub const LOG_ENV: &str = "GRADESHEETD_LOG";

/// Header rows in front of the data, as counted by the store's row addressing.
/// Two sheet layouts exist in the wild.
pub const ALLOWED_ROW_OFFSETS: [usize; 2] = [2, 3];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
    pub header_row_offset: usize,
    pub sheet_offsets: BTreeMap<String, usize>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: 30,
            header_row_offset: 2,
            sheet_offsets: BTreeMap::new(),
        }
    }
}

impl StoreSettings {
    pub fn row_offset_for(&self, sheet: &str) -> usize {
        self.sheet_offsets
            .get(sheet)
            .copied()
            .unwrap_or(self.header_row_offset)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GridSettings {
    pub advance_cooldown_ms: u64,
    pub blur_grace_ms: u64,
    pub scroll_throttle_ms: u64,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            advance_cooldown_ms: 300,
            blur_grace_ms: 150,
            scroll_throttle_ms: 50,
        }
    }
}

impl GridSettings {
    pub fn timings(&self) -> FocusTimings {
        FocusTimings {
            advance_cooldown: Duration::from_millis(self.advance_cooldown_ms),
            blur_grace: Duration::from_millis(self.blur_grace_ms),
            scroll_throttle: Duration::from_millis(self.scroll_throttle_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportSettings {
    pub rows_per_page: usize,
    pub school_name: String,
    pub score_column: ColumnId,
    pub include_narrative: bool,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            rows_per_page: 25,
            school_name: String::new(),
            score_column: ColumnId::Data22,
            include_narrative: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub store: StoreSettings,
    pub grid: GridSettings,
    pub report: ReportSettings,
}

impl Settings {
    /// Defaults plus whatever the environment provides.
    pub fn from_env() -> Self {
        let mut s = Settings::default();
        if let Ok(endpoint) = std::env::var(ENDPOINT_ENV) {
            let endpoint = endpoint.trim();
            if !endpoint.is_empty() {
                s.store.endpoint = Some(endpoint.to_string());
            }
        }
        s
    }
}
