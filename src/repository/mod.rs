//! Repository abstraction for help-request persistence.
//!
//! The lifecycle service talks to storage exclusively through the
//! `HelpDeskRepository` trait. Implementations provide different backends
//! (in-memory, SQLite) with one shared contract: every transition method
//! performs its precondition check and its write against a single
//! consistent snapshot, so a compound transition (Decline writes the status
//! and the reason row; restoration flips the status and deletes the row)
//! applies both effects or neither, even under concurrent callers.

mod memory;
mod sqlite;

pub use memory::InMemoryRepository;
pub use sqlite::SqliteRepository;

use async_trait::async_trait;

use crate::lifecycle::state::{
    ActorId, Comment, DeclinedReason, HelpRequest, Priority, RequestId, Status,
};

/// Errors surfaced by a storage backend.
///
/// `Integrity` means the status/side-record invariant was found already
/// violated (a reason row existing outside `Declined`, or missing inside
/// it). The lifecycle never produces that state, so its presence indicates
/// corruption, not a recoverable user error.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("storage failure during {operation}: {message}")]
    Storage {
        operation: &'static str,
        message: String,
    },

    #[error("corrupted {what} in storage")]
    Corruption { what: &'static str },

    #[error("integrity violation: {message}")]
    Integrity { message: String },
}

impl RepositoryError {
    pub fn storage(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Storage {
            operation,
            message: message.into(),
        }
    }

    pub fn corruption(what: &'static str) -> Self {
        Self::Corruption { what }
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }
}

/// Fields supplied when creating a request. The repository assigns the
/// identifier, the initial `Active` status, and both timestamps.
#[derive(Debug, Clone)]
pub struct NewHelpRequest {
    pub subject: String,
    pub text: String,
    pub requester: ActorId,
    pub priority: Priority,
}

/// Read-only projection filter over the request set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestFilter {
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub requester: Option<ActorId>,
}

/// Result of an atomic status transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Precondition held inside the snapshot; the updated record.
    Applied(HelpRequest),
    /// No such request.
    NotFound,
    /// The snapshot's status did not satisfy the precondition. Carries
    /// what the status actually was, for the caller's error report.
    PreconditionFailed { current: Status },
}

/// Result of an atomic comment append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentOutcome {
    Appended(Comment),
    NotFound,
    /// The request was not `InProcess` inside the snapshot.
    NotOpen { current: Status },
}

/// Storage contract for the three workflow entities.
#[async_trait]
pub trait HelpDeskRepository: Send + Sync {
    /// Insert a new request with status `Active`.
    async fn create_request(&self, new: NewHelpRequest) -> Result<HelpRequest, RepositoryError>;

    async fn get_request(&self, id: RequestId) -> Result<Option<HelpRequest>, RepositoryError>;

    async fn list_requests(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<HelpRequest>, RepositoryError>;

    /// Update the requester-editable fields (body text and priority),
    /// bumping `updated_at`. Returns `None` if the request does not exist.
    async fn update_details(
        &self,
        id: RequestId,
        text: String,
        priority: Priority,
    ) -> Result<Option<HelpRequest>, RepositoryError>;

    /// Delete a request, cascading to its declined reason and comments.
    /// Returns whether a record was removed.
    async fn delete_request(&self, id: RequestId) -> Result<bool, RepositoryError>;

    /// Atomically set the status to `to` iff the current status is in
    /// `from`. Used for the simple transitions (Approve, StartProcessing,
    /// CompleteProcessing).
    async fn transition_status(
        &self,
        id: RequestId,
        from: &[Status],
        to: Status,
    ) -> Result<TransitionOutcome, RepositoryError>;

    /// Atomically set the status to `Declined` and record the reason, iff
    /// the current status is in `from`. A reason row already present is an
    /// integrity error, never overwritten.
    async fn decline_request(
        &self,
        id: RequestId,
        from: &[Status],
        comment: &str,
    ) -> Result<TransitionOutcome, RepositoryError>;

    /// Atomically set the status to `ForRestoration` and delete the reason
    /// row, iff the current status is in `from`. A missing reason row is an
    /// integrity error: the invariant guarantees one exists while Declined.
    async fn restore_request(
        &self,
        id: RequestId,
        from: &[Status],
    ) -> Result<TransitionOutcome, RepositoryError>;

    async fn declined_reason(
        &self,
        id: RequestId,
    ) -> Result<Option<DeclinedReason>, RepositoryError>;

    /// Atomically append a comment iff the request is `InProcess` inside
    /// the snapshot.
    async fn append_comment(
        &self,
        id: RequestId,
        author: ActorId,
        message: String,
    ) -> Result<CommentOutcome, RepositoryError>;

    /// Comments for a request in insertion order. Empty if the request has
    /// none (or does not exist; callers resolve existence separately).
    async fn list_comments(&self, id: RequestId) -> Result<Vec<Comment>, RepositoryError>;
}
