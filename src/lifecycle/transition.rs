//! Pure transition table for the request workflow.
//!
//! `Transition` enumerates the five status-changing operations. For each,
//! the table records which statuses it may be applied from, which status it
//! produces, and which capability it demands. The table is pure data: the
//! state validity check here has no side effects, and the repository
//! re-checks the same precondition inside its storage snapshot so that a
//! concurrent caller cannot slip between check and write.

use std::fmt;

use super::state::Status;

/// The status-changing operations of the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Approve,
    Decline,
    StartProcessing,
    CompleteProcessing,
    /// The requester resubmits a declined request for review
    /// ("resend review" in the API).
    RequestRestoration,
}

/// Who a transition demands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredCapability {
    /// An administrator, subject to the configured `TransitionPolicy`.
    Administrator,
    /// The requester of record, administrator or not.
    Requester,
}

impl Transition {
    /// Statuses this transition may be applied from.
    ///
    /// Decline accepts only `Active`: the older rule set also allowed it
    /// from `ForRestoration`, but the canonical rules require a restored
    /// request to go back through Approve. This list is the single point
    /// to change if that decision is revisited.
    pub fn allowed_from(&self) -> &'static [Status] {
        match self {
            Transition::Approve => &[Status::Active, Status::ForRestoration],
            Transition::Decline => &[Status::Active],
            Transition::StartProcessing => &[Status::Approved],
            Transition::CompleteProcessing => &[Status::InProcess],
            Transition::RequestRestoration => &[Status::Declined],
        }
    }

    /// Status the request holds after this transition.
    pub fn target(&self) -> Status {
        match self {
            Transition::Approve => Status::Approved,
            Transition::Decline => Status::Declined,
            Transition::StartProcessing => Status::InProcess,
            Transition::CompleteProcessing => Status::Completed,
            Transition::RequestRestoration => Status::ForRestoration,
        }
    }

    pub fn required_capability(&self) -> RequiredCapability {
        match self {
            Transition::Approve
            | Transition::Decline
            | Transition::StartProcessing
            | Transition::CompleteProcessing => RequiredCapability::Administrator,
            Transition::RequestRestoration => RequiredCapability::Requester,
        }
    }

    /// Pure precondition check: the target status if `current` permits this
    /// transition, or the `InvalidTransition` error otherwise.
    pub fn check(&self, current: Status) -> Result<Status, LifecycleError> {
        if self.allowed_from().contains(&current) {
            Ok(self.target())
        } else {
            Err(LifecycleError::InvalidTransition {
                operation: *self,
                current,
            })
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Approve => "approve",
            Transition::Decline => "decline",
            Transition::StartProcessing => "start-processing",
            Transition::CompleteProcessing => "complete-processing",
            Transition::RequestRestoration => "request-restoration",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Typed failure outcomes of lifecycle operations.
///
/// Authorization failures are checked before, and independently of, state
/// validity: a non-administrator invoking Approve on an approvable request
/// gets `NotAuthorized`, never `InvalidTransition`. None of these are
/// transient; the caller reports them without retrying.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// The actor lacks the capability the operation demands.
    #[error("not authorized to perform this operation")]
    NotAuthorized,

    /// The request's current status does not permit the operation.
    #[error("cannot {operation} a request in status {current}")]
    InvalidTransition {
        operation: Transition,
        current: Status,
    },

    /// The referenced request does not exist.
    #[error("help request not found")]
    NotFound,

    /// Comments may only be added while the request is in process.
    #[error("cannot add comments to a request in status {current}")]
    RequestNotOpenForComments { current: Status },

    /// The status/side-record invariant was found violated, or storage
    /// failed. Fatal and unexpected; never reported as a user error.
    #[error(transparent)]
    Repository(#[from] crate::repository::RepositoryError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approve_accepts_active_and_for_restoration() {
        assert_eq!(Transition::Approve.check(Status::Active).unwrap(), Status::Approved);
        assert_eq!(
            Transition::Approve.check(Status::ForRestoration).unwrap(),
            Status::Approved
        );
    }

    #[test]
    fn approve_rejects_every_other_status() {
        for status in [
            Status::Declined,
            Status::Approved,
            Status::InProcess,
            Status::Completed,
        ] {
            let err = Transition::Approve.check(status).unwrap_err();
            assert!(matches!(
                err,
                LifecycleError::InvalidTransition {
                    operation: Transition::Approve,
                    current
                } if current == status
            ));
        }
    }

    #[test]
    fn decline_accepts_only_active() {
        assert_eq!(Transition::Decline.check(Status::Active).unwrap(), Status::Declined);
        for status in Status::ALL {
            if status == Status::Active {
                continue;
            }
            assert!(Transition::Decline.check(status).is_err());
        }
    }

    #[test]
    fn processing_chain_is_linear() {
        assert_eq!(
            Transition::StartProcessing.check(Status::Approved).unwrap(),
            Status::InProcess
        );
        assert_eq!(
            Transition::CompleteProcessing.check(Status::InProcess).unwrap(),
            Status::Completed
        );
        assert!(Transition::StartProcessing.check(Status::Active).is_err());
        assert!(Transition::CompleteProcessing.check(Status::Approved).is_err());
    }

    #[test]
    fn restoration_accepts_only_declined() {
        assert_eq!(
            Transition::RequestRestoration.check(Status::Declined).unwrap(),
            Status::ForRestoration
        );
        assert!(Transition::RequestRestoration.check(Status::ForRestoration).is_err());
    }

    #[test]
    fn every_target_is_a_defined_status() {
        for op in [
            Transition::Approve,
            Transition::Decline,
            Transition::StartProcessing,
            Transition::CompleteProcessing,
            Transition::RequestRestoration,
        ] {
            assert!(Status::ALL.contains(&op.target()));
            for from in op.allowed_from() {
                assert!(Status::ALL.contains(from));
            }
        }
    }

    #[test]
    fn capabilities_split_admin_and_requester_operations() {
        assert_eq!(
            Transition::Approve.required_capability(),
            RequiredCapability::Administrator
        );
        assert_eq!(
            Transition::RequestRestoration.required_capability(),
            RequiredCapability::Requester
        );
    }
}
