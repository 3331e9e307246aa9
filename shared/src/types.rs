//! Common types used across the platform

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Document a movement or allocation was recorded for
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reference {
    pub reference_type: String,
    pub reference_id: Uuid,
}

impl Reference {
    pub fn order(id: Uuid) -> Self {
        Self {
            reference_type: crate::models::reference::ORDER.to_string(),
            reference_id: id,
        }
    }

    pub fn purchase_order(id: Uuid) -> Self {
        Self {
            reference_type: crate::models::reference::PURCHASE_ORDER.to_string(),
            reference_id: id,
        }
    }
}

/// Date range for queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// The window from `today` through `today + days`, inclusive
    pub fn ahead(today: NaiveDate, days: i64) -> Self {
        Self {
            start: today,
            end: today + chrono::Duration::days(days),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}
