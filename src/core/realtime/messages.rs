//! Realtime API WebSocket message types.
//!
//! Client events are wrapped in an [`OutboundEvent`] carrying a fresh
//! `event_id` before serialization. Server events are decoded once into the
//! closed [`ServerEvent`] enum; any `type` this crate does not interpret lands
//! in [`ServerEvent::Unknown`].
//!
//! # Protocol Overview
//!
//! Client events (sent to server):
//! - session.update - Update session configuration
//! - input_audio_buffer.append - Append audio to buffer
//! - input_audio_buffer.commit - Commit audio buffer
//! - input_audio_buffer.clear - Clear audio buffer
//! - conversation.item.create - Add item to conversation
//! - response.create - Generate a response
//! - response.cancel - Cancel current response
//!
//! Server events (received from server):
//! - error - Error occurred
//! - session.created / session.updated - Session lifecycle
//! - input_audio_buffer.speech_started / speech_stopped - VAD (barge-in)
//! - input_audio_buffer.committed - Audio buffer committed
//! - conversation.item.created - Item added to conversation
//! - response.created / response.done - Response lifecycle
//! - response.audio.delta / response.audio.done - Agent audio
//! - response.audio_transcript.delta / done - Agent transcript
//! - response.text.delta / done - Agent text
//! - response.function_call_arguments.done - Function call arguments complete

use base64::prelude::*;
use serde::{Deserialize, Serialize};

use super::base::{Tool, ToolChoice};

/// Audio format identifier for PCM 16-bit little-endian.
pub const AUDIO_FORMAT_PCM16: &str = "pcm16";

// =============================================================================
// Session Configuration
// =============================================================================

/// Payload of a `session.update` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionUpdate {
    /// Response modalities (text, audio)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Vec<String>>,

    /// System instructions for the assistant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    /// Voice for audio output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,

    /// Input audio format
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_format: Option<String>,

    /// Output audio format
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_format: Option<String>,

    /// Turn detection configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_detection: Option<TurnDetection>,

    /// Tool definitions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,

    /// Tool choice strategy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,

    /// Temperature for response generation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Playback speed of agent audio
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,

    /// Maximum response output tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_response_output_tokens: Option<MaxTokens>,
}

/// Maximum tokens configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaxTokens {
    /// Specific number of tokens
    Number(i32),
    /// Infinite tokens
    Infinite(String), // "inf"
}

/// Turn detection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TurnDetection {
    /// Server-side VAD
    #[serde(rename = "server_vad")]
    ServerVad {
        /// Activation threshold
        #[serde(default, skip_serializing_if = "Option::is_none")]
        threshold: Option<f32>,
        /// Audio prefix padding in ms
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prefix_padding_ms: Option<u32>,
        /// Silence duration in ms
        #[serde(default, skip_serializing_if = "Option::is_none")]
        silence_duration_ms: Option<u32>,
        /// Whether to create response on turn end
        #[serde(default, skip_serializing_if = "Option::is_none")]
        create_response: Option<bool>,
        /// Whether to interrupt on speech
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interrupt_response: Option<bool>,
    },
    /// Semantic VAD
    #[serde(rename = "semantic_vad")]
    SemanticVad {
        /// Eagerness level
        #[serde(default, skip_serializing_if = "Option::is_none")]
        eagerness: Option<String>,
        /// Whether to create response on turn end
        #[serde(default, skip_serializing_if = "Option::is_none")]
        create_response: Option<bool>,
        /// Whether to interrupt on speech
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interrupt_response: Option<bool>,
    },
}

impl Default for TurnDetection {
    /// Server VAD that starts a response at end of turn and lets the user
    /// interrupt the agent.
    fn default() -> Self {
        TurnDetection::ServerVad {
            threshold: None,
            prefix_padding_ms: None,
            silence_duration_ms: None,
            create_response: Some(true),
            interrupt_response: Some(true),
        }
    }
}

// =============================================================================
// Conversation Items
// =============================================================================

/// Conversation item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationItem {
    /// Item ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Item type (message, function_call, function_call_output)
    #[serde(rename = "type")]
    pub item_type: String,
    /// Item status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Item role (user, assistant, system)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Content parts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<ContentPart>>,
    /// Call ID for function call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    /// Function name for function call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Function arguments for function call (JSON text)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
    /// Function output for function call result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl ConversationItem {
    /// A user text message.
    pub fn user_text(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            item_type: "message".to_string(),
            role: Some("user".to_string()),
            content: Some(vec![ContentPart {
                content_type: "input_text".to_string(),
                text: Some(text.into()),
                audio: None,
                transcript: None,
            }]),
            ..Default::default()
        }
    }

    /// The result of a function call.
    pub fn function_call_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        let call_id = call_id.into();
        Self {
            id: Some(call_id.clone()),
            item_type: "function_call_output".to_string(),
            call_id: Some(call_id),
            output: Some(output.into()),
            ..Default::default()
        }
    }

    /// Whether this is a function call the agent has finished emitting.
    pub fn is_completed_function_call(&self) -> bool {
        self.item_type == "function_call" && self.status.as_deref() == Some("completed")
    }
}

/// Content part within a conversation item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPart {
    /// Content type (input_text, input_audio, text, audio)
    #[serde(rename = "type")]
    pub content_type: String,
    /// Text content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Audio content (base64 encoded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    /// Transcript of audio content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

// =============================================================================
// Response Configuration
// =============================================================================

/// Payload of a `response.create` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseConfig {
    /// Response modalities
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Vec<String>>,
    /// System instructions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// Voice for audio
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    /// Output audio format
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_format: Option<String>,
    /// Tools
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    /// Tool choice
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    /// Temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Max output tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<MaxTokens>,
}

// =============================================================================
// Client Events (sent to server)
// =============================================================================

/// Client events sent to the Realtime API.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Update session configuration
    #[serde(rename = "session.update")]
    SessionUpdate {
        /// Session configuration
        session: SessionUpdate,
    },

    /// Append audio to input buffer
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend {
        /// Base64-encoded audio data
        audio: String,
    },

    /// Commit the input audio buffer
    #[serde(rename = "input_audio_buffer.commit")]
    InputAudioBufferCommit,

    /// Clear the input audio buffer
    #[serde(rename = "input_audio_buffer.clear")]
    InputAudioBufferClear,

    /// Create a conversation item
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate {
        /// Item to create
        item: ConversationItem,
        /// Previous item ID to insert after
        #[serde(skip_serializing_if = "Option::is_none")]
        previous_item_id: Option<String>,
    },

    /// Create a response
    #[serde(rename = "response.create")]
    ResponseCreate {
        /// Response configuration
        response: ResponseConfig,
    },

    /// Cancel the current response
    #[serde(rename = "response.cancel")]
    ResponseCancel,
}

impl ClientEvent {
    /// Create an audio append event from raw bytes.
    pub fn audio_append(data: &[u8]) -> Self {
        ClientEvent::InputAudioBufferAppend {
            audio: BASE64_STANDARD.encode(data),
        }
    }

    /// Wire name of the event.
    pub fn event_type(&self) -> &'static str {
        match self {
            ClientEvent::SessionUpdate { .. } => "session.update",
            ClientEvent::InputAudioBufferAppend { .. } => "input_audio_buffer.append",
            ClientEvent::InputAudioBufferCommit => "input_audio_buffer.commit",
            ClientEvent::InputAudioBufferClear => "input_audio_buffer.clear",
            ClientEvent::ConversationItemCreate { .. } => "conversation.item.create",
            ClientEvent::ResponseCreate { .. } => "response.create",
            ClientEvent::ResponseCancel => "response.cancel",
        }
    }
}

/// A client event stamped with its `event_id`.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundEvent {
    pub event_id: String,
    #[serde(flatten)]
    pub event: ClientEvent,
}

impl OutboundEvent {
    /// Stamp `event` with a fresh identifier.
    pub fn new(event: ClientEvent) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            event,
        }
    }
}

// =============================================================================
// Server Events (received from server)
// =============================================================================

/// Server events received from the Realtime API.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Error occurred
    #[serde(rename = "error")]
    Error {
        /// Error details
        error: ApiError,
    },

    /// Session created
    #[serde(rename = "session.created")]
    SessionCreated {
        /// Session information
        session: Session,
    },

    /// Session updated
    #[serde(rename = "session.updated")]
    SessionUpdated {
        /// Session information
        session: Session,
    },

    /// Speech started (VAD detected speech)
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted {
        /// Audio start timestamp in ms
        #[serde(default)]
        audio_start_ms: u64,
        /// Item ID
        #[serde(default)]
        item_id: String,
    },

    /// Speech stopped (VAD detected silence)
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped {
        /// Audio end timestamp in ms
        #[serde(default)]
        audio_end_ms: u64,
        /// Item ID
        #[serde(default)]
        item_id: String,
    },

    /// Audio buffer committed
    #[serde(rename = "input_audio_buffer.committed")]
    InputAudioBufferCommitted {
        /// Previous item ID
        #[serde(default)]
        previous_item_id: Option<String>,
        /// New item ID
        item_id: String,
    },

    /// Conversation item created
    #[serde(rename = "conversation.item.created")]
    ConversationItemCreated {
        /// Previous item ID
        #[serde(default)]
        previous_item_id: Option<String>,
        /// Created item
        item: ConversationItem,
    },

    /// Response created
    #[serde(rename = "response.created")]
    ResponseCreated {
        /// Response information
        response: Response,
    },

    /// Response done
    #[serde(rename = "response.done")]
    ResponseDone {
        /// Response information
        response: Response,
    },

    /// Text delta
    #[serde(rename = "response.text.delta")]
    TextDelta {
        #[serde(flatten)]
        part: PartRef,
        /// Text delta
        delta: String,
    },

    /// Text done
    #[serde(rename = "response.text.done")]
    TextDone {
        #[serde(flatten)]
        part: PartRef,
        /// Full text
        text: String,
    },

    /// Audio transcript delta
    #[serde(rename = "response.audio_transcript.delta")]
    AudioTranscriptDelta {
        #[serde(flatten)]
        part: PartRef,
        /// Transcript delta
        delta: String,
    },

    /// Audio transcript done
    #[serde(rename = "response.audio_transcript.done")]
    AudioTranscriptDone {
        #[serde(flatten)]
        part: PartRef,
        /// Full transcript
        transcript: String,
    },

    /// Audio delta (audio data chunk)
    #[serde(rename = "response.audio.delta")]
    AudioDelta {
        #[serde(flatten)]
        part: PartRef,
        /// Base64-encoded audio delta
        delta: String,
    },

    /// Audio done
    #[serde(rename = "response.audio.done")]
    AudioDone {
        #[serde(flatten)]
        part: PartRef,
    },

    /// Function call arguments done
    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        /// Response ID
        #[serde(default)]
        response_id: String,
        /// Item ID
        #[serde(default)]
        item_id: String,
        /// Call ID
        call_id: String,
        /// Full arguments
        arguments: String,
    },

    /// Any event type not interpreted by this crate
    #[serde(other)]
    Unknown,
}

impl ServerEvent {
    /// Decode a raw text message.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Decode base64 audio from an AudioDelta event.
    pub fn decode_audio_delta(delta: &str) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64_STANDARD.decode(delta)
    }

    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::Error { .. } => "error",
            ServerEvent::SessionCreated { .. } => "session.created",
            ServerEvent::SessionUpdated { .. } => "session.updated",
            ServerEvent::SpeechStarted { .. } => "input_audio_buffer.speech_started",
            ServerEvent::SpeechStopped { .. } => "input_audio_buffer.speech_stopped",
            ServerEvent::InputAudioBufferCommitted { .. } => "input_audio_buffer.committed",
            ServerEvent::ConversationItemCreated { .. } => "conversation.item.created",
            ServerEvent::ResponseCreated { .. } => "response.created",
            ServerEvent::ResponseDone { .. } => "response.done",
            ServerEvent::TextDelta { .. } => "response.text.delta",
            ServerEvent::TextDone { .. } => "response.text.done",
            ServerEvent::AudioTranscriptDelta { .. } => "response.audio_transcript.delta",
            ServerEvent::AudioTranscriptDone { .. } => "response.audio_transcript.done",
            ServerEvent::AudioDelta { .. } => "response.audio.delta",
            ServerEvent::AudioDone { .. } => "response.audio.done",
            ServerEvent::FunctionCallArgumentsDone { .. } => {
                "response.function_call_arguments.done"
            }
            ServerEvent::Unknown => "unknown",
        }
    }
}

// =============================================================================
// Supporting Types
// =============================================================================

/// Location of a content part inside a response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PartRef {
    #[serde(default)]
    pub response_id: String,
    #[serde(default)]
    pub item_id: String,
    #[serde(default)]
    pub output_index: u32,
    #[serde(default)]
    pub content_index: u32,
}

/// API error information.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ApiError {
    /// Error type
    #[serde(rename = "type", default)]
    pub error_type: String,
    /// Error code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Error message
    #[serde(default)]
    pub message: String,
    /// Parameter that caused the error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
    /// Event ID that caused the error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{}: {}", code, self.message),
            None => write!(f, "{}: {}", self.error_type, self.message),
        }
    }
}

/// Session information.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Session {
    /// Session ID
    #[serde(default)]
    pub id: String,
    /// Model used
    #[serde(default)]
    pub model: Option<String>,
    /// Expires at timestamp
    #[serde(default)]
    pub expires_at: Option<u64>,
    /// Response modalities
    #[serde(default)]
    pub modalities: Vec<String>,
    /// System instructions
    #[serde(default)]
    pub instructions: Option<String>,
    /// Voice
    #[serde(default)]
    pub voice: Option<String>,
    /// Input audio format
    #[serde(default)]
    pub input_audio_format: Option<String>,
    /// Output audio format
    #[serde(default)]
    pub output_audio_format: Option<String>,
    /// Turn detection config
    #[serde(default)]
    pub turn_detection: Option<TurnDetection>,
    /// Tools
    #[serde(default)]
    pub tools: Vec<Tool>,
    /// Temperature
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Speed
    #[serde(default)]
    pub speed: Option<f32>,
}

/// Response information.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Response {
    /// Response ID
    #[serde(default)]
    pub id: String,
    /// Response status
    #[serde(default)]
    pub status: String,
    /// Status details
    #[serde(default)]
    pub status_details: Option<serde_json::Value>,
    /// Output items
    #[serde(default)]
    pub output: Vec<ConversationItem>,
    /// Usage information
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// Usage information.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub total_tokens: u32,
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_event_carries_event_id() {
        let event = OutboundEvent::new(ClientEvent::InputAudioBufferCommit);
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "input_audio_buffer.commit");
        assert_eq!(json["event_id"].as_str().unwrap().len(), 36);

        let other = OutboundEvent::new(ClientEvent::ResponseCancel);
        assert_ne!(event.event_id, other.event_id);
    }

    #[test]
    fn test_audio_append() {
        let data = vec![0u8, 1, 2, 3];
        let event = ClientEvent::audio_append(&data);
        match &event {
            ClientEvent::InputAudioBufferAppend { audio } => {
                let decoded = BASE64_STANDARD.decode(audio).unwrap();
                assert_eq!(decoded, data);
            }
            _ => panic!("Wrong event type"),
        }
        assert_eq!(event.event_type(), "input_audio_buffer.append");
    }

    #[test]
    fn test_session_update_serialization() {
        let event = OutboundEvent::new(ClientEvent::SessionUpdate {
            session: SessionUpdate {
                modalities: Some(vec!["text".to_string(), "audio".to_string()]),
                voice: Some("coral".to_string()),
                tool_choice: Some(ToolChoice::None),
                turn_detection: Some(TurnDetection::default()),
                speed: Some(1.3),
                ..Default::default()
            },
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "session.update");
        assert_eq!(json["session"]["voice"], "coral");
        assert_eq!(json["session"]["tool_choice"], "none");
        assert_eq!(json["session"]["turn_detection"]["type"], "server_vad");
        assert_eq!(json["session"]["turn_detection"]["create_response"], true);
        assert!(json["session"].get("instructions").is_none());
    }

    #[test]
    fn test_function_call_output_item() {
        let event = ClientEvent::ConversationItemCreate {
            item: ConversationItem::function_call_output("call_1", r#"{"success":true}"#),
            previous_item_id: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "conversation.item.create");
        assert_eq!(json["item"]["type"], "function_call_output");
        assert_eq!(json["item"]["call_id"], "call_1");
        assert_eq!(json["item"]["output"], r#"{"success":true}"#);
        assert!(json.get("previous_item_id").is_none());
    }

    #[test]
    fn test_user_text_item() {
        let item = ConversationItem::user_text("item_1", "hello");
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"][0]["type"], "input_text");
        assert_eq!(json["content"][0]["text"], "hello");
    }

    #[test]
    fn test_response_create_serialization() {
        let event = ClientEvent::ResponseCreate {
            response: ResponseConfig::default(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"response.create","response":{}}"#);
    }

    #[test]
    fn test_server_error_deserialization() {
        let json = r#"{
            "event_id": "evt_1",
            "type": "error",
            "error": {
                "type": "invalid_request_error",
                "code": "invalid_value",
                "message": "Test error"
            }
        }"#;
        match ServerEvent::parse(json).unwrap() {
            ServerEvent::Error { error } => {
                assert_eq!(error.message, "Test error");
                assert_eq!(error.to_string(), "invalid_value: Test error");
            }
            other => panic!("Wrong event type: {:?}", other),
        }
    }

    #[test]
    fn test_audio_delta_deserialization() {
        let json = r#"{
            "type": "response.audio.delta",
            "event_id": "evt_2",
            "response_id": "resp_1",
            "item_id": "item_1",
            "output_index": 0,
            "content_index": 0,
            "delta": "AAEC"
        }"#;
        match ServerEvent::parse(json).unwrap() {
            ServerEvent::AudioDelta { part, delta } => {
                assert_eq!(part.response_id, "resp_1");
                assert_eq!(ServerEvent::decode_audio_delta(&delta).unwrap(), vec![0, 1, 2]);
            }
            other => panic!("Wrong event type: {:?}", other),
        }
    }

    #[test]
    fn test_response_done_with_function_call() {
        let json = r#"{
            "type": "response.done",
            "response": {
                "id": "resp_1",
                "status": "completed",
                "output": [{
                    "id": "item_1",
                    "type": "function_call",
                    "status": "completed",
                    "name": "get_time",
                    "call_id": "call_1",
                    "arguments": "{}"
                }]
            }
        }"#;
        match ServerEvent::parse(json).unwrap() {
            ServerEvent::ResponseDone { response } => {
                assert_eq!(response.output.len(), 1);
                assert!(response.output[0].is_completed_function_call());
                assert_eq!(response.output[0].name.as_deref(), Some("get_time"));
            }
            other => panic!("Wrong event type: {:?}", other),
        }
    }

    #[test]
    fn test_minimal_session_events() {
        let created = ServerEvent::parse(r#"{"type":"session.created","session":{"id":"sess_1"}}"#)
            .unwrap();
        match created {
            ServerEvent::SessionCreated { session } => assert_eq!(session.id, "sess_1"),
            other => panic!("Wrong event type: {:?}", other),
        }
        assert_eq!(
            ServerEvent::parse(r#"{"type":"input_audio_buffer.speech_started"}"#)
                .unwrap()
                .kind(),
            "input_audio_buffer.speech_started"
        );
    }

    #[test]
    fn test_unknown_event_type() {
        let event = ServerEvent::parse(r#"{"type":"rate_limits.updated","rate_limits":[]}"#).unwrap();
        assert!(matches!(event, ServerEvent::Unknown));
    }

    #[test]
    fn test_malformed_event() {
        assert!(ServerEvent::parse("not json").is_err());
        assert!(ServerEvent::parse(r#"{"type":"session.created"}"#).is_err());
        assert!(ServerEvent::parse(r#"{"session":{}}"#).is_err());
    }
}
