use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present here
/// override environment variables and defaults.
///
/// # Example YAML structure
/// ```yaml
/// api_key: "sk-..."
/// url: "wss://api.openai.com/v1/realtime"
/// model: "gpt-4o-realtime-preview-2025-06-03"
/// voice: "coral"
/// instructions: "You are a helpcenter agent and help the user."
/// temperature: 0.7
/// speed: 1.3
///
/// audio:
///   sample_rate: 8000
///   latency_ms: 200
///
/// timeouts:
///   negotiation_ms: 10000
///   dial_ms: 10000
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub api_key: Option<String>,
    pub url: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub instructions: Option<String>,
    pub temperature: Option<f32>,
    pub speed: Option<f32>,
    pub audio: Option<AudioYaml>,
    pub timeouts: Option<TimeoutsYaml>,
}

/// Local audio device settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AudioYaml {
    /// Device sample rate in Hz
    pub sample_rate: Option<u32>,
    /// Frame duration in milliseconds
    pub latency_ms: Option<u64>,
}

/// Timeouts from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TimeoutsYaml {
    /// Wait for `session.updated` in milliseconds
    pub negotiation_ms: Option<u64>,
    /// WebSocket dial timeout in milliseconds
    pub dial_ms: Option<u64>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Fields have invalid types
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
