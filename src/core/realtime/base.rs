//! Base types for the realtime voice session.
//!
//! Errors, session lifecycle state, callback aliases and the tool-calling
//! contract shared by the session controller, dispatcher and transport.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::messages::{ApiError, ServerEvent};
use crate::core::audio::AudioError;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during realtime operations.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Connection or handshake with the service failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// No `session.updated` acknowledgment within the negotiation window
    #[error("Session negotiation timed out after {0:?}")]
    NegotiationTimeout(Duration),

    /// Malformed inbound message
    #[error("Protocol decode error: {0}")]
    ProtocolDecode(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Not connected
    #[error("Not connected")]
    NotConnected,

    /// The caller's cancellation token fired
    #[error("Operation cancelled")]
    Cancelled,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Audio pipeline error
    #[error(transparent)]
    Audio(#[from] AudioError),
}

/// Result type for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

impl From<serde_json::Error> for RealtimeError {
    fn from(e: serde_json::Error) -> Self {
        RealtimeError::Serialization(e.to_string())
    }
}

// =============================================================================
// Session State
// =============================================================================

/// Lifecycle of a realtime session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Created, not yet connected
    #[default]
    Uninitialized,
    /// Connected, waiting for `session.created`
    AwaitingCreation,
    /// `session.update` sent, waiting for `session.updated`
    Negotiating,
    /// Negotiated; audio flows
    Active,
    /// Terminated
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Uninitialized => write!(f, "uninitialized"),
            SessionState::AwaitingCreation => write!(f, "awaiting_creation"),
            SessionState::Negotiating => write!(f, "negotiating"),
            SessionState::Active => write!(f, "active"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

// =============================================================================
// Tools
// =============================================================================

/// Tool choice policy sent with the session configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    Auto,
    None,
    Required,
}

/// Tool definition advertised to the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// Tool type (always "function")
    #[serde(rename = "type", default = "default_tool_type")]
    pub tool_type: String,
    /// Function name
    pub name: String,
    /// Function description
    #[serde(default)]
    pub description: String,
    /// JSON schema for parameters
    #[serde(default)]
    pub parameters: ToolParameters,
}

fn default_tool_type() -> String {
    "function".to_string()
}

impl Tool {
    /// Create a function tool with an empty object schema.
    pub fn function(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            tool_type: default_tool_type(),
            name: name.into(),
            description: description.into(),
            parameters: ToolParameters::default(),
        }
    }

    /// Add a property to the parameter schema.
    pub fn with_property(
        mut self,
        name: impl Into<String>,
        property: ToolProperty,
        required: bool,
    ) -> Self {
        let name = name.into();
        if required {
            self.parameters.required.push(name.clone());
        }
        self.parameters.properties.insert(name, property);
        self
    }
}

/// Object schema for tool parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameters {
    #[serde(rename = "type")]
    pub schema_type: String,
    #[serde(default)]
    pub properties: HashMap<String, ToolProperty>,
    #[serde(default)]
    pub required: Vec<String>,
}

impl Default for ToolParameters {
    fn default() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: HashMap::new(),
            required: Vec::new(),
        }
    }
}

/// A single parameter property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolProperty {
    #[serde(rename = "type")]
    pub property_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<serde_json::Value>>,
}

impl ToolProperty {
    pub fn string(description: impl Into<String>) -> Self {
        Self {
            property_type: "string".to_string(),
            description: Some(description.into()),
            enum_values: None,
        }
    }
}

/// A completed function call requested by the agent.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub call_id: String,
    pub name: String,
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

/// Errors returned by tool handlers. Sent back to the service, never raised
/// locally.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{0}")]
    Failed(String),
}

/// Outcome of a tool invocation. `Ok(None)` reports plain success.
pub type ToolResult = Result<Option<serde_json::Value>, ToolError>;

/// Serialize a tool outcome into the `output` string of a
/// `function_call_output` item.
pub fn tool_output(result: &ToolResult) -> String {
    let value = match result {
        Err(e) => serde_json::json!({ "error": e.to_string() }),
        Ok(Some(value)) => value.clone(),
        Ok(None) => serde_json::json!({ "success": true }),
    };
    value.to_string()
}

// =============================================================================
// Callback Types
// =============================================================================

/// Callback for every dispatched server event.
pub type EventCallback =
    Arc<dyn Fn(ServerEvent) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback for protocol errors reported by the service.
pub type ErrorCallback =
    Arc<dyn Fn(ApiError) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback invoked for completed function calls.
pub type ToolCallCallback =
    Arc<dyn Fn(ToolCall) -> Pin<Box<dyn Future<Output = ToolResult> + Send>> + Send + Sync>;
