//! The request lifecycle state machine and its authorization model.
//!
//! This module separates:
//! - **State**: what a request is (`state`)
//! - **Policy**: who may act on it (`policy`)
//! - **Transitions**: which status changes are legal (`transition`, pure)
//! - **Service**: executing operations atomically against storage (`service`)

pub mod policy;
pub mod service;
pub mod state;
pub mod transition;

pub use policy::{Actor, SelfDealingForbidden, TransitionPolicy};
pub use service::LifecycleService;
pub use state::{
    ActorId, Comment, CommentId, DeclinedReason, HelpRequest, Priority, RequestId, Status,
};
pub use transition::{LifecycleError, Transition};
