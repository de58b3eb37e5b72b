//! In-memory implementation of the repository traits.
//!
//! Everything lives in one `RwLock`-protected structure, so each trait
//! method is a single critical section: the precondition check and the
//! write of a compound transition happen under the same write lock, which
//! is this backend's equivalent of a storage transaction. All state is
//! lost on restart; the server uses SQLite, tests use this.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{
    CommentOutcome, HelpDeskRepository, NewHelpRequest, RepositoryError, RequestFilter,
    TransitionOutcome,
};
use crate::auth::{AuthRepository, TokenRecord, UserRecord};
use crate::lifecycle::state::{
    ActorId, Comment, CommentId, DeclinedReason, HelpRequest, Priority, RequestId, Status,
};

#[derive(Default)]
struct Inner {
    requests: HashMap<RequestId, HelpRequest>,
    reasons: HashMap<RequestId, DeclinedReason>,
    /// Global insertion order; per-request order falls out of filtering.
    comments: Vec<Comment>,
    users: HashMap<ActorId, UserRecord>,
    tokens: HashMap<String, TokenRecord>,
    next_request_id: i64,
    next_comment_id: i64,
    next_user_id: i64,
}

/// In-memory backend.
pub struct InMemoryRepository {
    inner: RwLock<Inner>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HelpDeskRepository for InMemoryRepository {
    async fn create_request(&self, new: NewHelpRequest) -> Result<HelpRequest, RepositoryError> {
        let mut inner = self.inner.write().await;
        inner.next_request_id += 1;
        let now = Utc::now();
        let request = HelpRequest {
            id: RequestId(inner.next_request_id),
            subject: new.subject,
            text: new.text,
            requester: new.requester,
            priority: new.priority,
            status: Status::Active,
            created_at: now,
            updated_at: now,
        };
        inner.requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn get_request(&self, id: RequestId) -> Result<Option<HelpRequest>, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(inner.requests.get(&id).cloned())
    }

    async fn list_requests(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<HelpRequest>, RepositoryError> {
        let inner = self.inner.read().await;
        let mut requests: Vec<HelpRequest> = inner
            .requests
            .values()
            .filter(|r| filter.status.is_none_or(|s| r.status == s))
            .filter(|r| filter.priority.is_none_or(|p| r.priority == p))
            .filter(|r| filter.requester.is_none_or(|a| r.requester == a))
            .cloned()
            .collect();
        requests.sort_by_key(|r| r.id.0);
        Ok(requests)
    }

    async fn update_details(
        &self,
        id: RequestId,
        text: String,
        priority: Priority,
    ) -> Result<Option<HelpRequest>, RepositoryError> {
        let mut inner = self.inner.write().await;
        Ok(inner.requests.get_mut(&id).map(|request| {
            request.text = text;
            request.priority = priority;
            request.updated_at = Utc::now();
            request.clone()
        }))
    }

    async fn delete_request(&self, id: RequestId) -> Result<bool, RepositoryError> {
        let mut inner = self.inner.write().await;
        let removed = inner.requests.remove(&id).is_some();
        if removed {
            inner.reasons.remove(&id);
            inner.comments.retain(|c| c.request != id);
        }
        Ok(removed)
    }

    async fn transition_status(
        &self,
        id: RequestId,
        from: &[Status],
        to: Status,
    ) -> Result<TransitionOutcome, RepositoryError> {
        let mut inner = self.inner.write().await;
        let Some(request) = inner.requests.get_mut(&id) else {
            return Ok(TransitionOutcome::NotFound);
        };
        if !from.contains(&request.status) {
            return Ok(TransitionOutcome::PreconditionFailed {
                current: request.status,
            });
        }
        request.status = to;
        request.updated_at = Utc::now();
        Ok(TransitionOutcome::Applied(request.clone()))
    }

    async fn decline_request(
        &self,
        id: RequestId,
        from: &[Status],
        comment: &str,
    ) -> Result<TransitionOutcome, RepositoryError> {
        let mut inner = self.inner.write().await;
        let Inner {
            requests, reasons, ..
        } = &mut *inner;
        let Some(request) = requests.get_mut(&id) else {
            return Ok(TransitionOutcome::NotFound);
        };
        if !from.contains(&request.status) {
            return Ok(TransitionOutcome::PreconditionFailed {
                current: request.status,
            });
        }
        if reasons.contains_key(&id) {
            return Err(RepositoryError::integrity(format!(
                "request {id} already has a declined reason while in status {}",
                request.status
            )));
        }
        request.status = Status::Declined;
        request.updated_at = Utc::now();
        reasons.insert(
            id,
            DeclinedReason {
                request: id,
                comment: comment.to_string(),
            },
        );
        Ok(TransitionOutcome::Applied(request.clone()))
    }

    async fn restore_request(
        &self,
        id: RequestId,
        from: &[Status],
    ) -> Result<TransitionOutcome, RepositoryError> {
        let mut inner = self.inner.write().await;
        let Inner {
            requests, reasons, ..
        } = &mut *inner;
        let Some(request) = requests.get_mut(&id) else {
            return Ok(TransitionOutcome::NotFound);
        };
        if !from.contains(&request.status) {
            return Ok(TransitionOutcome::PreconditionFailed {
                current: request.status,
            });
        }
        if reasons.remove(&id).is_none() {
            return Err(RepositoryError::integrity(format!(
                "request {id} is declined but has no declined reason"
            )));
        }
        request.status = Status::ForRestoration;
        request.updated_at = Utc::now();
        Ok(TransitionOutcome::Applied(request.clone()))
    }

    async fn declined_reason(
        &self,
        id: RequestId,
    ) -> Result<Option<DeclinedReason>, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(inner.reasons.get(&id).cloned())
    }

    async fn append_comment(
        &self,
        id: RequestId,
        author: ActorId,
        message: String,
    ) -> Result<CommentOutcome, RepositoryError> {
        let mut inner = self.inner.write().await;
        let Some(request) = inner.requests.get(&id) else {
            return Ok(CommentOutcome::NotFound);
        };
        if !request.status.accepts_comments() {
            return Ok(CommentOutcome::NotOpen {
                current: request.status,
            });
        }
        inner.next_comment_id += 1;
        let comment = Comment {
            id: CommentId(inner.next_comment_id),
            request: id,
            author,
            message,
            created_at: Utc::now(),
        };
        inner.comments.push(comment.clone());
        Ok(CommentOutcome::Appended(comment))
    }

    async fn list_comments(&self, id: RequestId) -> Result<Vec<Comment>, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(inner
            .comments
            .iter()
            .filter(|c| c.request == id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AuthRepository for InMemoryRepository {
    async fn create_user(
        &self,
        username: &str,
        password_digest: &str,
        is_admin: bool,
    ) -> Result<Option<UserRecord>, RepositoryError> {
        let mut inner = self.inner.write().await;
        if inner.users.values().any(|u| u.username == username) {
            return Ok(None);
        }
        inner.next_user_id += 1;
        let user = UserRecord {
            id: ActorId(inner.next_user_id),
            username: username.to_string(),
            password_digest: password_digest.to_string(),
            is_admin,
        };
        inner.users.insert(user.id, user.clone());
        Ok(Some(user))
    }

    async fn find_user_by_name(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(inner.users.values().find(|u| u.username == username).cloned())
    }

    async fn insert_token(
        &self,
        key: &str,
        user: ActorId,
        last_seen: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.inner.write().await;
        inner.tokens.insert(
            key.to_string(),
            TokenRecord {
                key: key.to_string(),
                user,
                last_seen,
            },
        );
        Ok(())
    }

    async fn token_with_user(
        &self,
        key: &str,
    ) -> Result<Option<(TokenRecord, UserRecord)>, RepositoryError> {
        let inner = self.inner.read().await;
        let Some(token) = inner.tokens.get(key) else {
            return Ok(None);
        };
        let user = inner
            .users
            .get(&token.user)
            .cloned()
            .ok_or_else(|| RepositoryError::corruption("token without user"))?;
        Ok(Some((token.clone(), user)))
    }

    async fn touch_token(
        &self,
        key: &str,
        last_seen: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.inner.write().await;
        if let Some(token) = inner.tokens.get_mut(key) {
            token.last_seen = last_seen;
        }
        Ok(())
    }

    async fn delete_token(&self, key: &str) -> Result<bool, RepositoryError> {
        let mut inner = self.inner.write().await;
        Ok(inner.tokens.remove(key).is_some())
    }
}
