//! Domain records served by the dashboard

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Lifecycle state of a threat record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatStatus {
    Active,
    Investigating,
    Resolved,
}

/// Vendor risk classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// A single entry in a threat's investigation timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatEvent {
    pub timestamp: DateTime<Utc>,
    pub event: String,
}

/// A detected threat, as loaded from the backing data source.
///
/// Immutable within a cache generation: refresh replaces the whole
/// collection, individual records are never patched in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Threat {
    pub id: String,
    pub vendor_name: String,
    pub threat_type: String,
    /// Severity on a 1-10 scale.
    pub severity: u8,
    /// Pre-computed score from the external AI analysis pipeline.
    pub ai_risk_score: f64,
    pub status: ThreatStatus,
    pub detected_at: DateTime<Utc>,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected_systems: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation_steps: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline: Option<Vec<ThreatEvent>>,
}

/// A monitored vendor and its current risk assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vendor {
    pub id: String,
    pub name: String,
    pub risk_level: RiskLevel,
    pub risk_score: f64,
    pub threat_count: u32,
    pub last_assessment: DateTime<Utc>,
    #[serde(default)]
    pub compliance_status: Vec<String>,
    #[serde(default)]
    pub critical_assets: Vec<String>,
}

/// One frame on the live channel: a type tag, a payload, and an emission
/// timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BroadcastMessage {
    ThreatDetected {
        threat: Threat,
        risk_score: f64,
        timestamp: DateTime<Utc>,
    },
    VendorAlert {
        vendor_id: String,
        alert_type: String,
        timestamp: DateTime<Utc>,
    },
    SystemStatus {
        status: String,
        details: String,
        timestamp: DateTime<Utc>,
    },
    /// Acknowledgment sent to a subscriber immediately on registration.
    Connected {
        subscriber_id: Uuid,
        timestamp: DateTime<Utc>,
    },
}

impl BroadcastMessage {
    pub fn threat_detected(threat: Threat) -> Self {
        let risk_score = threat.ai_risk_score;
        Self::ThreatDetected {
            threat,
            risk_score,
            timestamp: Utc::now(),
        }
    }

    pub fn vendor_alert(vendor_id: impl Into<String>, alert_type: impl Into<String>) -> Self {
        Self::VendorAlert {
            vendor_id: vendor_id.into(),
            alert_type: alert_type.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn system_status(status: impl Into<String>, details: impl Into<String>) -> Self {
        Self::SystemStatus {
            status: status.into(),
            details: details.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn connected(subscriber_id: Uuid) -> Self {
        Self::Connected {
            subscriber_id,
            timestamp: Utc::now(),
        }
    }
}

/// Parsed content of one logical data unit.
#[derive(Debug, Clone)]
pub enum UnitData {
    Threats(Vec<Threat>),
    Vendors(Vec<Vendor>),
    /// Dashboard and analytics structures are served verbatim; no operation
    /// inspects their shape.
    Document(Value),
}

/// Point-in-time cache summary, recomputed on demand.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub known_units: usize,
    pub approx_bytes: usize,
}

/// Readiness report for one logical data unit.
#[derive(Debug, Clone, Serialize)]
pub struct UnitStatus {
    pub unit: String,
    pub size_bytes: u64,
    pub modified: Option<DateTime<Utc>>,
    pub loaded: bool,
}
