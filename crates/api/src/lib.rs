#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

mod authorization;
mod resolver_http;
mod resource;

pub use authorization::{authorization_router, AuthorizationState};
pub use resolver_http::{resolver_router, ResolverState};
pub use resource::{resource_router, ResourceState};

/// JSON body of every error response the servers emit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl ErrorResponse {
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            error_description: None,
        }
    }

    #[must_use]
    pub fn with_description(error: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            error_description: Some(description.into()),
        }
    }
}
