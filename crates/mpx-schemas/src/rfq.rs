use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ParseStatusError;

/// Lifecycle of a request for quotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RfqStatus {
    /// Accepting quotations until `deadline`.
    Open,
    /// Exactly one quotation was accepted. **Terminal.**
    Awarded,
    /// Closed by the owner without an award. **Terminal.**
    Closed,
    /// Withdrawn by the owner. **Terminal.**
    Cancelled,
}

impl RfqStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RfqStatus::Open => "open",
            RfqStatus::Awarded => "awarded",
            RfqStatus::Closed => "closed",
            RfqStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RfqStatus::Open)
    }
}

impl fmt::Display for RfqStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RfqStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(RfqStatus::Open),
            "awarded" => Ok(RfqStatus::Awarded),
            "closed" => Ok(RfqStatus::Closed),
            "cancelled" => Ok(RfqStatus::Cancelled),
            other => Err(ParseStatusError {
                kind: "rfq status",
                value: other.to_string(),
            }),
        }
    }
}

/// Vessel the requested goods or services are for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VesselInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imo_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vessel_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
}

/// A shipowner's request for quotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rfq {
    pub rfq_id: String,
    pub owner_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vessel_info: Option<VesselInfo>,
    pub deadline: DateTime<Utc>,
    pub status: RfqStatus,
    /// Number of quotations successfully created against this RFQ.
    #[serde(default)]
    pub quotation_count: u64,
    /// Set iff `status == Awarded`.
    #[serde(default)]
    pub awarded_quotation_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rfq {
    /// Deadline evaluation is lazy: callers pass their own `now`.
    pub fn deadline_passed(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline
    }

    pub fn accepting_quotations(&self, now: DateTime<Utc>) -> bool {
        self.status == RfqStatus::Open && !self.deadline_passed(now)
    }
}
