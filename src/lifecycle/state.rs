//! Entity types for the help-request lifecycle.
//!
//! The status enum is the heart of the workflow: every mutation of a
//! `HelpRequest` other than a requester edit goes through a transition
//! between these statuses, and the side records (`DeclinedReason`,
//! `Comment`) are only valid in particular statuses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Newtype for a help request's database identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub i64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Newtype for a user's database identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(pub i64);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ActorId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Newtype for a comment's database identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommentId(pub i64);

impl From<i64> for CommentId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Workflow status of a help request.
///
/// The wire representation uses the human-readable labels the API has
/// always exposed ("For restoration", "In process"), so they double as
/// the stored form in SQLite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Active,
    Declined,
    #[serde(rename = "For restoration")]
    ForRestoration,
    Approved,
    #[serde(rename = "In process")]
    InProcess,
    Completed,
}

impl Status {
    /// All defined statuses, in workflow order.
    pub const ALL: [Status; 6] = [
        Status::Active,
        Status::Declined,
        Status::ForRestoration,
        Status::Approved,
        Status::InProcess,
        Status::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Active => "Active",
            Status::Declined => "Declined",
            Status::ForRestoration => "For restoration",
            Status::Approved => "Approved",
            Status::InProcess => "In process",
            Status::Completed => "Completed",
        }
    }

    /// Whether comments may be appended to a request in this status.
    pub fn accepts_comments(&self) -> bool {
        matches!(self, Status::InProcess)
    }

    /// Whether a `DeclinedReason` must exist for a request in this status.
    pub fn requires_declined_reason(&self) -> bool {
        matches!(self, Status::Declined)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Status {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(Status::Active),
            "Declined" => Ok(Status::Declined),
            "For restoration" => Ok(Status::ForRestoration),
            "Approved" => Ok(Status::Approved),
            "In process" => Ok(Status::InProcess),
            "Completed" => Ok(Status::Completed),
            other => Err(UnknownVariant {
                kind: "status",
                value: other.to_string(),
            }),
        }
    }
}

/// Priority of a help request, set by the requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Priority {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Low" => Ok(Priority::Low),
            "Medium" => Ok(Priority::Medium),
            "High" => Ok(Priority::High),
            other => Err(UnknownVariant {
                kind: "priority",
                value: other.to_string(),
            }),
        }
    }
}

/// A stored label that is not one of the defined enum values.
///
/// Every persisted request must carry one of the six defined statuses;
/// anything else is a corrupted row and surfaces as a loud error rather
/// than falling back to a default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} value: {:?}", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

/// The central entity: one help request owned by one requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HelpRequest {
    pub id: RequestId,
    /// Short summary line. Immutable after creation.
    pub subject: String,
    /// Full description. Editable by the requester.
    pub text: String,
    /// The owning actor. Immutable after creation.
    pub requester: ActorId,
    pub priority: Priority,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Side record explaining why a request was declined.
///
/// Exists if and only if the owning request's status is `Declined`:
/// created atomically with the Decline transition and deleted atomically
/// with the restoration request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeclinedReason {
    pub request: RequestId,
    pub comment: String,
}

/// Append-only note on a request. Never mutated or deleted individually;
/// removed only by cascade when the owning request is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comment {
    pub id: CommentId,
    pub request: RequestId,
    pub author: ActorId,
    pub message: String,
    pub created_at: DateTime<Utc>,
}
