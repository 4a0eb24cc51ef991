//! Activity-log entries
//!
//! Entries are published to the in-process bus and persisted by a
//! decoupled consumer; the nightly audit job commits to them. The
//! `actor`/`action`/timestamp fields feed the Merkle leaf hash, so they
//! are immutable once stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivitySeverity {
    Info,
    Warning,
    Critical,
}

impl ActivitySeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivitySeverity::Info => "info",
            ActivitySeverity::Warning => "warning",
            ActivitySeverity::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "info" => Some(ActivitySeverity::Info),
            "warning" => Some(ActivitySeverity::Warning),
            "critical" => Some(ActivitySeverity::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for ActivitySeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An entry as published to the bus (no storage id yet).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub actor: String,
    pub actor_role: Option<String>,
    pub action: String,
    pub target_kind: Option<String>,
    pub target_id: Option<String>,
    pub severity: ActivitySeverity,
    pub tenant: Option<String>,
    pub region: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// An entry as read back from storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: i64,
    pub actor: String,
    pub actor_role: Option<String>,
    pub action: String,
    pub target_kind: Option<String>,
    pub target_id: Option<String>,
    pub severity: ActivitySeverity,
    pub tenant: Option<String>,
    pub region: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Builder for activity entries
pub struct ActivityBuilder {
    actor: String,
    actor_role: Option<String>,
    action: String,
    target_kind: Option<String>,
    target_id: Option<String>,
    severity: ActivitySeverity,
    tenant: Option<String>,
    region: Option<String>,
    metadata: Option<serde_json::Value>,
}

impl ActivityBuilder {
    pub fn new(action: impl Into<String>, actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            actor_role: None,
            action: action.into(),
            target_kind: None,
            target_id: None,
            severity: ActivitySeverity::Info,
            tenant: None,
            region: None,
            metadata: None,
        }
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.actor_role = Some(role.into());
        self
    }

    /// Set the target entity kind and id
    pub fn target(mut self, kind: impl Into<String>, id: impl Into<String>) -> Self {
        self.target_kind = Some(kind.into());
        self.target_id = Some(id.into());
        self
    }

    pub fn severity(mut self, severity: ActivitySeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn build(self) -> ActivityEntry {
        ActivityEntry {
            actor: self.actor,
            actor_role: self.actor_role,
            action: self.action,
            target_kind: self.target_kind,
            target_id: self.target_id,
            severity: self.severity,
            tenant: self.tenant,
            region: self.region,
            metadata: self.metadata,
            created_at: Utc::now(),
        }
    }
}
