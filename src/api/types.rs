//! Wire types for the REST API.

use serde::{Deserialize, Serialize};

use crate::lifecycle::state::{Priority, Status};

#[derive(Debug, Deserialize)]
pub struct RegisterBody {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginBody {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateRequestBody {
    pub subject: String,
    pub text: String,
    pub priority: Priority,
}

/// Requester edit: body text and priority only. The subject is immutable
/// after creation and deliberately absent here.
#[derive(Debug, Deserialize)]
pub struct EditRequestBody {
    pub text: String,
    pub priority: Priority,
}

#[derive(Debug, Deserialize)]
pub struct DeclineBody {
    pub comment: String,
}

#[derive(Debug, Deserialize)]
pub struct CommentBody {
    pub message: String,
}

/// Query-string filters for the request listing.
#[derive(Debug, Default, Deserialize)]
pub struct ListRequestsQuery {
    pub status: Option<Status>,
    pub priority: Option<Priority>,
}
