//! WebSocket Message Types
//!
//! Wire payloads exchanged with room clients.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message sent by a client into its room
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InboundPayload {
    /// Text to broadcast
    #[serde(default)]
    pub message: String,
    /// Bearer credential, validated for every message
    #[serde(default)]
    pub authorization: String,
}

impl InboundPayload {
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Message fanned out to every room member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundPayload {
    /// Sender identity
    pub email: String,
    pub message: String,
}

impl OutboundPayload {
    pub fn new(email: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            message: message.into(),
        }
    }

    pub fn encode(&self) -> Result<String, DecodeError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Sent once to a connection refused at join time
#[derive(Debug, Clone, Serialize)]
pub struct Rejection {
    pub error: String,
}

impl Rejection {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }

    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"error":"rejected"}"#.to_string())
    }
}

/// A single frame could not be decoded or encoded
#[derive(Debug, Error)]
#[error("Invalid message format: {0}")]
pub struct DecodeError(#[from] serde_json::Error);
