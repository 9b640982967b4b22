//! Request and response bodies for the chat API.

use serde::{Deserialize, Serialize};

/// Request body for `POST /api/message`.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    /// `naive`, `advanced` or `compare`; defaults to `advanced`.
    #[serde(default)]
    pub mode: Option<String>,
}

/// Response body for `GET /`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}
