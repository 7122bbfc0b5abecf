use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SnippetId;
use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsEvent {
    View,
    Copy,
}

impl StatsEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            StatsEvent::View => "view",
            StatsEvent::Copy => "copy",
        }
    }
}

impl FromStr for StatsEvent {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "view" => Ok(StatsEvent::View),
            "copy" => Ok(StatsEvent::Copy),
            _ => Err(ApiError::bad_request("Invalid action. Use 'view' or 'copy'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub id: SnippetId,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub copies: u64,
    #[serde(default)]
    pub last_viewed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_copied: Option<DateTime<Utc>>,
}

impl Stats {
    pub fn zeroed(id: SnippetId) -> Self {
        Self {
            id,
            views: 0,
            copies: 0,
            last_viewed: None,
            last_copied: None,
        }
    }

    /// Stats for a snippet whose first recorded event is `event`.
    pub fn first(id: SnippetId, event: StatsEvent) -> Self {
        let mut stats = Self::zeroed(id);
        stats.record(event);
        stats
    }

    pub fn record(&mut self, event: StatsEvent) {
        let now = Utc::now();
        match event {
            StatsEvent::View => {
                self.views = self.views.saturating_add(1);
                self.last_viewed = Some(now);
            }
            StatsEvent::Copy => {
                self.copies = self.copies.saturating_add(1);
                self.last_copied = Some(now);
            }
        }
    }
}
