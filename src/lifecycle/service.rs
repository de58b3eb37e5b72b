//! Lifecycle operations over the repository.
//!
//! `LifecycleService` is the single entry point the HTTP layer calls into.
//! Every operation follows the same discipline: resolve the request, check
//! authorization (always before and independently of state validity), check
//! the transition table, then hand the write to the repository, which
//! re-verifies the precondition inside its snapshot. A concurrent caller
//! that wins the race therefore surfaces here as `InvalidTransition`, never
//! as a lost update.

use std::sync::Arc;

use tracing::info;

use super::policy::{Actor, TransitionPolicy};
use super::state::{Comment, DeclinedReason, HelpRequest, Priority, RequestId};
use super::transition::{LifecycleError, RequiredCapability, Transition};
use crate::repository::{
    CommentOutcome, HelpDeskRepository, NewHelpRequest, RequestFilter, TransitionOutcome,
};

pub struct LifecycleService {
    repo: Arc<dyn HelpDeskRepository>,
    policy: Arc<dyn TransitionPolicy>,
}

impl LifecycleService {
    pub fn new(repo: Arc<dyn HelpDeskRepository>, policy: Arc<dyn TransitionPolicy>) -> Self {
        Self { repo, policy }
    }

    /// Create a request owned by `requester`, with initial status `Active`.
    pub async fn create_request(
        &self,
        requester: &Actor,
        subject: String,
        text: String,
        priority: Priority,
    ) -> Result<HelpRequest, LifecycleError> {
        let request = self
            .repo
            .create_request(NewHelpRequest {
                subject,
                text,
                requester: requester.id,
                priority,
            })
            .await?;
        info!(
            request = %request.id,
            requester = %requester.username,
            "created help request"
        );
        Ok(request)
    }

    /// Fetch one request. Requests are visible to administrators and to
    /// their own requester; to anyone else they do not exist.
    pub async fn get_request(
        &self,
        actor: &Actor,
        id: RequestId,
    ) -> Result<HelpRequest, LifecycleError> {
        let request = self.load(id).await?;
        if actor.is_administrator() || actor.is_requester_of(&request) {
            Ok(request)
        } else {
            Err(LifecycleError::NotFound)
        }
    }

    /// Filtered listing. Administrators see the whole set; everyone else
    /// only their own requests, whatever filter they pass.
    pub async fn list_requests(
        &self,
        actor: &Actor,
        mut filter: RequestFilter,
    ) -> Result<Vec<HelpRequest>, LifecycleError> {
        if !actor.is_administrator() {
            filter.requester = Some(actor.id);
        }
        Ok(self.repo.list_requests(&filter).await?)
    }

    /// Requester-initiated edit of the body text and priority. The subject
    /// and requester are immutable after creation; the status is untouched.
    pub async fn edit_request(
        &self,
        actor: &Actor,
        id: RequestId,
        text: String,
        priority: Priority,
    ) -> Result<HelpRequest, LifecycleError> {
        let request = self.load(id).await?;
        if !actor.is_requester_of(&request) {
            return Err(LifecycleError::NotAuthorized);
        }
        self.repo
            .update_details(id, text, priority)
            .await?
            .ok_or(LifecycleError::NotFound)
    }

    /// Requester-initiated deletion, allowed in any status. Cascades to the
    /// declined reason and comments.
    pub async fn delete_request(&self, actor: &Actor, id: RequestId) -> Result<(), LifecycleError> {
        let request = self.load(id).await?;
        if !actor.is_requester_of(&request) {
            return Err(LifecycleError::NotAuthorized);
        }
        if self.repo.delete_request(id).await? {
            info!(request = %id, requester = %actor.username, "deleted help request");
            Ok(())
        } else {
            Err(LifecycleError::NotFound)
        }
    }

    /// Approve: Active or ForRestoration -> Approved.
    pub async fn approve(&self, actor: &Actor, id: RequestId) -> Result<HelpRequest, LifecycleError> {
        let transition = Transition::Approve;
        let request = self.load(id).await?;
        self.authorize(actor, &request, transition)?;
        transition.check(request.status)?;

        let outcome = self
            .repo
            .transition_status(id, transition.allowed_from(), transition.target())
            .await?;
        self.resolve(actor, transition, outcome)
    }

    /// Decline: Active -> Declined, recording the supplied reason in the
    /// same atomic write.
    pub async fn decline(
        &self,
        actor: &Actor,
        id: RequestId,
        comment: &str,
    ) -> Result<HelpRequest, LifecycleError> {
        let transition = Transition::Decline;
        let request = self.load(id).await?;
        self.authorize(actor, &request, transition)?;
        transition.check(request.status)?;

        let outcome = self
            .repo
            .decline_request(id, transition.allowed_from(), comment)
            .await?;
        self.resolve(actor, transition, outcome)
    }

    /// StartProcessing: Approved -> InProcess.
    pub async fn start_processing(
        &self,
        actor: &Actor,
        id: RequestId,
    ) -> Result<HelpRequest, LifecycleError> {
        let transition = Transition::StartProcessing;
        let request = self.load(id).await?;
        self.authorize(actor, &request, transition)?;
        transition.check(request.status)?;

        let outcome = self
            .repo
            .transition_status(id, transition.allowed_from(), transition.target())
            .await?;
        self.resolve(actor, transition, outcome)
    }

    /// CompleteProcessing: InProcess -> Completed.
    pub async fn complete_processing(
        &self,
        actor: &Actor,
        id: RequestId,
    ) -> Result<HelpRequest, LifecycleError> {
        let transition = Transition::CompleteProcessing;
        let request = self.load(id).await?;
        self.authorize(actor, &request, transition)?;
        transition.check(request.status)?;

        let outcome = self
            .repo
            .transition_status(id, transition.allowed_from(), transition.target())
            .await?;
        self.resolve(actor, transition, outcome)
    }

    /// RequestRestoration: Declined -> ForRestoration, deleting the
    /// declined reason in the same atomic write. Requester only.
    pub async fn request_restoration(
        &self,
        actor: &Actor,
        id: RequestId,
    ) -> Result<HelpRequest, LifecycleError> {
        let transition = Transition::RequestRestoration;
        let request = self.load(id).await?;
        self.authorize(actor, &request, transition)?;
        transition.check(request.status)?;

        let outcome = self
            .repo
            .restore_request(id, transition.allowed_from())
            .await?;
        self.resolve(actor, transition, outcome)
    }

    /// The declined reason for a request, visible to the requester and to
    /// administrators.
    pub async fn declined_reason(
        &self,
        actor: &Actor,
        id: RequestId,
    ) -> Result<DeclinedReason, LifecycleError> {
        let request = self.load(id).await?;
        if !actor.is_administrator() && !actor.is_requester_of(&request) {
            return Err(LifecycleError::NotAuthorized);
        }
        self.repo
            .declined_reason(id)
            .await?
            .ok_or(LifecycleError::NotFound)
    }

    /// Append a comment. Requester or administrator, and only while the
    /// request is in process.
    pub async fn add_comment(
        &self,
        actor: &Actor,
        id: RequestId,
        message: String,
    ) -> Result<Comment, LifecycleError> {
        let request = self.load(id).await?;
        if !actor.is_administrator() && !actor.is_requester_of(&request) {
            return Err(LifecycleError::NotAuthorized);
        }

        match self.repo.append_comment(id, actor.id, message).await? {
            CommentOutcome::Appended(comment) => Ok(comment),
            CommentOutcome::NotFound => Err(LifecycleError::NotFound),
            CommentOutcome::NotOpen { current } => {
                Err(LifecycleError::RequestNotOpenForComments { current })
            }
        }
    }

    /// Comments in insertion order, for the requester or an administrator.
    pub async fn list_comments(
        &self,
        actor: &Actor,
        id: RequestId,
    ) -> Result<Vec<Comment>, LifecycleError> {
        let request = self.load(id).await?;
        if !actor.is_administrator() && !actor.is_requester_of(&request) {
            return Err(LifecycleError::NotAuthorized);
        }
        Ok(self.repo.list_comments(id).await?)
    }

    async fn load(&self, id: RequestId) -> Result<HelpRequest, LifecycleError> {
        self.repo
            .get_request(id)
            .await?
            .ok_or(LifecycleError::NotFound)
    }

    fn authorize(
        &self,
        actor: &Actor,
        request: &HelpRequest,
        transition: Transition,
    ) -> Result<(), LifecycleError> {
        let authorized = match transition.required_capability() {
            RequiredCapability::Administrator => self.policy.may_administer(actor, request),
            RequiredCapability::Requester => actor.is_requester_of(request),
        };
        if authorized {
            Ok(())
        } else {
            Err(LifecycleError::NotAuthorized)
        }
    }

    fn resolve(
        &self,
        actor: &Actor,
        transition: Transition,
        outcome: TransitionOutcome,
    ) -> Result<HelpRequest, LifecycleError> {
        match outcome {
            TransitionOutcome::Applied(request) => {
                info!(
                    request = %request.id,
                    operation = %transition,
                    status = %request.status,
                    actor = %actor.username,
                    "applied transition"
                );
                Ok(request)
            }
            TransitionOutcome::NotFound => Err(LifecycleError::NotFound),
            // Lost a race between our pre-check and the storage snapshot.
            TransitionOutcome::PreconditionFailed { current } => {
                Err(LifecycleError::InvalidTransition {
                    operation: transition,
                    current,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::policy::{SelfDealingAllowed, SelfDealingForbidden};
    use crate::lifecycle::state::{ActorId, Status};
    use crate::repository::InMemoryRepository;

    fn service() -> LifecycleService {
        LifecycleService::new(
            Arc::new(InMemoryRepository::new()),
            Arc::new(SelfDealingForbidden),
        )
    }

    fn requester() -> Actor {
        Actor {
            id: ActorId(1),
            username: "alice".into(),
            is_admin: false,
        }
    }

    fn admin() -> Actor {
        Actor {
            id: ActorId(2),
            username: "root".into(),
            is_admin: true,
        }
    }

    async fn submit(service: &LifecycleService, by: &Actor) -> HelpRequest {
        service
            .create_request(
                by,
                "Printer broken".into(),
                "The office printer jams on every job".into(),
                Priority::Medium,
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn happy_path_through_completion() {
        let service = service();
        let alice = requester();
        let root = admin();

        let request = submit(&service, &alice).await;
        assert_eq!(request.status, Status::Active);

        let request = service.approve(&root, request.id).await.unwrap();
        assert_eq!(request.status, Status::Approved);

        let request = service.start_processing(&root, request.id).await.unwrap();
        assert_eq!(request.status, Status::InProcess);

        service
            .add_comment(&alice, request.id, "still broken".into())
            .await
            .unwrap();
        assert_eq!(
            service.list_comments(&alice, request.id).await.unwrap().len(),
            1
        );

        let request = service
            .complete_processing(&root, request.id)
            .await
            .unwrap();
        assert_eq!(request.status, Status::Completed);

        let err = service
            .add_comment(&alice, request.id, "one more".into())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::RequestNotOpenForComments {
                current: Status::Completed
            }
        ));
        assert_eq!(
            service.list_comments(&alice, request.id).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn decline_then_restore_round_trip() {
        let service = service();
        let alice = requester();
        let root = admin();

        let request = submit(&service, &alice).await;
        let request = service
            .decline(&root, request.id, "duplicate")
            .await
            .unwrap();
        assert_eq!(request.status, Status::Declined);
        assert_eq!(
            service
                .declined_reason(&alice, request.id)
                .await
                .unwrap()
                .comment,
            "duplicate"
        );

        let request = service
            .request_restoration(&alice, request.id)
            .await
            .unwrap();
        assert_eq!(request.status, Status::ForRestoration);
        assert!(matches!(
            service.declined_reason(&alice, request.id).await,
            Err(LifecycleError::NotFound)
        ));

        // A restored request takes the same path to approval as a fresh one.
        let request = service.approve(&root, request.id).await.unwrap();
        assert_eq!(request.status, Status::Approved);
    }

    #[tokio::test]
    async fn authorization_is_checked_before_state() {
        let service = service();
        let alice = requester();
        let mallory = Actor {
            id: ActorId(3),
            username: "mallory".into(),
            is_admin: false,
        };

        // The request is validly approvable, so a state-first implementation
        // would report InvalidTransition here. It must be NotAuthorized.
        let request = submit(&service, &alice).await;
        let err = service.approve(&mallory, request.id).await.unwrap_err();
        assert!(matches!(err, LifecycleError::NotAuthorized));

        let unchanged = service.get_request(&alice, request.id).await.unwrap();
        assert_eq!(unchanged.status, Status::Active);
    }

    #[tokio::test]
    async fn unauthorized_decline_leaves_no_reason() {
        let service = service();
        let alice = requester();
        let mallory = Actor {
            id: ActorId(3),
            username: "mallory".into(),
            is_admin: false,
        };

        let request = submit(&service, &alice).await;
        let err = service
            .decline(&mallory, request.id, "go away")
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::NotAuthorized));

        let unchanged = service.get_request(&alice, request.id).await.unwrap();
        assert_eq!(unchanged.status, Status::Active);
        assert!(matches!(
            service.declined_reason(&alice, request.id).await,
            Err(LifecycleError::NotFound)
        ));
    }

    #[tokio::test]
    async fn admins_may_not_transition_their_own_requests() {
        let service = service();
        let root = admin();

        let request = submit(&service, &root).await;
        let err = service.approve(&root, request.id).await.unwrap_err();
        assert!(matches!(err, LifecycleError::NotAuthorized));

        let err = service
            .decline(&root, request.id, "self-decline")
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::NotAuthorized));
    }

    #[tokio::test]
    async fn legacy_policy_permits_self_dealing() {
        let service = LifecycleService::new(
            Arc::new(InMemoryRepository::new()),
            Arc::new(SelfDealingAllowed),
        );
        let root = admin();

        let request = submit(&service, &root).await;
        let request = service.approve(&root, request.id).await.unwrap();
        assert_eq!(request.status, Status::Approved);
    }

    #[tokio::test]
    async fn approve_from_wrong_status_is_invalid_transition() {
        let service = service();
        let alice = requester();
        let root = admin();

        let request = submit(&service, &alice).await;
        let request = service.approve(&root, request.id).await.unwrap();

        let err = service.approve(&root, request.id).await.unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InvalidTransition {
                operation: Transition::Approve,
                current: Status::Approved
            }
        ));
    }

    #[tokio::test]
    async fn decline_is_not_allowed_from_for_restoration() {
        let service = service();
        let alice = requester();
        let root = admin();

        let request = submit(&service, &alice).await;
        service.decline(&root, request.id, "duplicate").await.unwrap();
        service.request_restoration(&alice, request.id).await.unwrap();

        let err = service
            .decline(&root, request.id, "again")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InvalidTransition {
                operation: Transition::Decline,
                current: Status::ForRestoration
            }
        ));
    }

    #[tokio::test]
    async fn restoration_is_requester_only() {
        let service = service();
        let alice = requester();
        let root = admin();

        let request = submit(&service, &alice).await;
        service.decline(&root, request.id, "duplicate").await.unwrap();

        // Even an administrator may not resubmit on the requester's behalf.
        let err = service
            .request_restoration(&root, request.id)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::NotAuthorized));
    }

    #[tokio::test]
    async fn edits_are_requester_only_and_leave_status_alone() {
        let service = service();
        let alice = requester();
        let root = admin();

        let request = submit(&service, &alice).await;
        service.approve(&root, request.id).await.unwrap();

        let err = service
            .edit_request(&root, request.id, "hijacked".into(), Priority::Low)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::NotAuthorized));

        let updated = service
            .edit_request(&alice, request.id, "now with error codes".into(), Priority::High)
            .await
            .unwrap();
        assert_eq!(updated.status, Status::Approved);
        assert_eq!(updated.text, "now with error codes");
        assert_eq!(updated.priority, Priority::High);
        assert_eq!(updated.subject, "Printer broken");
    }

    #[tokio::test]
    async fn deletion_is_requester_only_but_unguarded_by_status() {
        let service = service();
        let alice = requester();
        let root = admin();

        let request = submit(&service, &alice).await;
        service.approve(&root, request.id).await.unwrap();
        service.start_processing(&root, request.id).await.unwrap();

        let err = service.delete_request(&root, request.id).await.unwrap_err();
        assert!(matches!(err, LifecycleError::NotAuthorized));

        service.delete_request(&alice, request.id).await.unwrap();
        assert!(matches!(
            service.get_request(&alice, request.id).await,
            Err(LifecycleError::NotFound)
        ));
    }

    #[tokio::test]
    async fn non_admins_only_ever_see_their_own_requests() {
        let service = service();
        let alice = requester();
        let bob = Actor {
            id: ActorId(5),
            username: "bob".into(),
            is_admin: false,
        };
        let root = admin();

        let mine = submit(&service, &alice).await;
        submit(&service, &bob).await;

        let visible = service
            .list_requests(&alice, RequestFilter::default())
            .await
            .unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, mine.id);

        let all = service
            .list_requests(&root, RequestFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        // Direct fetch of someone else's request behaves as if it did not exist.
        let other = submit(&service, &bob).await;
        assert!(matches!(
            service.get_request(&alice, other.id).await,
            Err(LifecycleError::NotFound)
        ));
    }

    #[tokio::test]
    async fn comments_are_private_to_requester_and_admins() {
        let service = service();
        let alice = requester();
        let bob = Actor {
            id: ActorId(5),
            username: "bob".into(),
            is_admin: false,
        };
        let root = admin();

        let request = submit(&service, &alice).await;
        service.approve(&root, request.id).await.unwrap();
        service.start_processing(&root, request.id).await.unwrap();
        service
            .add_comment(&root, request.id, "looking into it".into())
            .await
            .unwrap();

        let err = service.list_comments(&bob, request.id).await.unwrap_err();
        assert!(matches!(err, LifecycleError::NotAuthorized));

        let err = service
            .add_comment(&bob, request.id, "me too".into())
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::NotAuthorized));

        assert_eq!(
            service.list_comments(&root, request.id).await.unwrap().len(),
            1
        );
    }
}
