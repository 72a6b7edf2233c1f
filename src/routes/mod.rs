/**
 * Routes Module
 * API route handlers
 */
use serde::{Deserialize, Serialize};

pub mod articles;
pub mod auth;
pub mod comments;
pub mod cron;
pub mod feeds;
pub mod health;
pub mod logs;
pub mod newsletter;
pub mod settings;

/// Error envelope shared by every handler.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

/// Success envelope for mutations that return no data.
#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}
