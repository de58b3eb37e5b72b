//! Actors and the authorization policy seam.
//!
//! Every authorization decision in the lifecycle is a pure function of the
//! capability predicates `is_administrator` and `is_requester_of` plus the
//! request's current status. The one rule the system's history disagrees
//! on (may an administrator progress their own request?) lives behind the
//! `TransitionPolicy` trait so it can be swapped without touching the state
//! machine.

use super::state::{ActorId, HelpRequest};

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: ActorId,
    pub username: String,
    pub is_admin: bool,
}

impl Actor {
    /// Capability predicate: may perform administrative triage.
    pub fn is_administrator(&self) -> bool {
        self.is_admin
    }

    /// Capability predicate: owns the given request.
    pub fn is_requester_of(&self, request: &HelpRequest) -> bool {
        self.id == request.requester
    }
}

/// Decides whether an actor may perform administrative transitions
/// (Approve/Decline/StartProcessing/CompleteProcessing) on a request.
///
/// Requester-only operations (edit, delete, restoration request) are not
/// policy-variable: both historical rule sets agree on them.
pub trait TransitionPolicy: Send + Sync {
    fn may_administer(&self, actor: &Actor, request: &HelpRequest) -> bool;

    /// Short name for logging.
    fn name(&self) -> &'static str;
}

/// Canonical policy: administrators may not transition their own requests.
/// Self-dealing is treated as unauthorized, not as a state error.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelfDealingForbidden;

impl TransitionPolicy for SelfDealingForbidden {
    fn may_administer(&self, actor: &Actor, request: &HelpRequest) -> bool {
        actor.is_administrator() && !actor.is_requester_of(request)
    }

    fn name(&self) -> &'static str {
        "self-dealing-forbidden"
    }
}

/// Legacy policy: any administrator may transition any request, their own
/// included. Retained so the divergence between the two historical rule
/// sets stays explicit; not used by the server.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelfDealingAllowed;

impl TransitionPolicy for SelfDealingAllowed {
    fn may_administer(&self, actor: &Actor, _request: &HelpRequest) -> bool {
        actor.is_administrator()
    }

    fn name(&self) -> &'static str {
        "self-dealing-allowed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::state::{Priority, RequestId, Status};
    use chrono::Utc;

    fn request_owned_by(requester: ActorId) -> HelpRequest {
        HelpRequest {
            id: RequestId(1),
            subject: "subject".into(),
            text: "text".into(),
            requester,
            priority: Priority::Medium,
            status: Status::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn admin(id: i64) -> Actor {
        Actor {
            id: ActorId(id),
            username: format!("admin-{id}"),
            is_admin: true,
        }
    }

    fn user(id: i64) -> Actor {
        Actor {
            id: ActorId(id),
            username: format!("user-{id}"),
            is_admin: false,
        }
    }

    #[test]
    fn forbidden_policy_rejects_own_request() {
        let actor = admin(7);
        let request = request_owned_by(ActorId(7));
        assert!(!SelfDealingForbidden.may_administer(&actor, &request));
    }

    #[test]
    fn forbidden_policy_allows_other_admins() {
        let actor = admin(7);
        let request = request_owned_by(ActorId(8));
        assert!(SelfDealingForbidden.may_administer(&actor, &request));
    }

    #[test]
    fn forbidden_policy_rejects_non_admins() {
        let actor = user(9);
        let request = request_owned_by(ActorId(8));
        assert!(!SelfDealingForbidden.may_administer(&actor, &request));
    }

    #[test]
    fn legacy_policy_allows_own_request() {
        let actor = admin(7);
        let request = request_owned_by(ActorId(7));
        assert!(SelfDealingAllowed.may_administer(&actor, &request));
    }

    #[test]
    fn legacy_policy_still_rejects_non_admins() {
        let actor = user(9);
        let request = request_owned_by(ActorId(9));
        assert!(!SelfDealingAllowed.may_administer(&actor, &request));
    }
}
