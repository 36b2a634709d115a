//! Configuration for realtime sessions
//!
//! This module builds a [`ClientConfig`] from various sources: .env files,
//! environment variables and YAML files. Priority: YAML > ENV vars > .env
//! values > defaults.
//!
//! # Example
//! ```rust,no_run
//! use waav_realtime::config::ClientConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ClientConfig::from_env()?;
//!
//! // Load from YAML file with environment variable fallbacks
//! let config_path = PathBuf::from("realtime.yaml");
//! let config = ClientConfig::from_file(&config_path)?;
//!
//! println!("Using model {}", config.model);
//! # Ok(())
//! # }
//! ```

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::core::realtime::Tool;

mod yaml;

pub use yaml::{AudioYaml, TimeoutsYaml, YamlConfig};

/// Default realtime endpoint
pub const DEFAULT_URL: &str = "wss://api.openai.com/v1/realtime";
/// Default realtime model
pub const DEFAULT_MODEL: &str = "gpt-4o-realtime-preview-2025-06-03";
/// Default agent voice
pub const DEFAULT_VOICE: &str = "coral";
/// Default system instructions
pub const DEFAULT_INSTRUCTIONS: &str = "You are a helpcenter agent and help the user.";

/// Settings for one realtime session.
#[derive(Clone)]
pub struct ClientConfig {
    /// API key sent as a bearer token
    pub api_key: String,
    /// Endpoint, without the `model` query parameter
    pub url: String,
    pub model: String,
    pub voice: String,
    pub instructions: String,
    pub temperature: f32,
    /// Playback speed of agent audio
    pub speed: f32,
    /// Sample rate of the local audio device in Hz
    pub sample_rate: u32,
    /// Frame duration on both audio paths
    pub latency: Duration,
    /// How long to wait for `session.updated`
    pub negotiation_timeout: Duration,
    /// How long to wait for the WebSocket handshake
    pub dial_timeout: Duration,
    /// Functions offered to the agent
    pub tools: Vec<Tool>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            url: DEFAULT_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            temperature: 0.7,
            speed: 1.3,
            sample_rate: 24000,
            latency: Duration::from_millis(200),
            negotiation_timeout: Duration::from_secs(10),
            dial_timeout: Duration::from_secs(10),
            tools: Vec::new(),
        }
    }
}

// The API key never ends up in logs
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &if self.api_key.is_empty() { "" } else { "***" })
            .field("url", &self.url)
            .field("model", &self.model)
            .field("voice", &self.voice)
            .field("temperature", &self.temperature)
            .field("speed", &self.speed)
            .field("sample_rate", &self.sample_rate)
            .field("latency", &self.latency)
            .field("negotiation_timeout", &self.negotiation_timeout)
            .field("dial_timeout", &self.dial_timeout)
            .field("tools", &self.tools.len())
            .finish()
    }
}

impl ClientConfig {
    /// Load configuration from environment variables
    ///
    /// Reads `OPENAI_KEY` (falling back to `OPENAI_API_KEY`), `REALTIME_MODEL`,
    /// `REALTIME_VOICE`, `REALTIME_SAMPLE_RATE` and `REALTIME_LATENCY_MS` on top
    /// of the defaults. The .env file is loaded by the binary at startup.
    ///
    /// # Errors
    /// Returns an error if a numeric variable cannot be parsed or validation
    /// fails.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variables as the
    /// base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = YamlConfig::from_file(path)?;

        let mut config = Self::default();
        config.apply_env()?;
        config.apply_yaml(yaml_config);
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration can open a session.
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.api_key.trim().is_empty() {
            return Err("API key is required (set OPENAI_KEY or OPENAI_API_KEY)".into());
        }
        if self.model.trim().is_empty() {
            return Err("model must not be empty".into());
        }
        if self.sample_rate == 0 {
            return Err("sample_rate must be greater than zero".into());
        }
        if self.latency.is_zero() {
            return Err("latency must be greater than zero".into());
        }
        if !(0.6..=1.2).contains(&self.temperature) {
            return Err(format!(
                "temperature must be between 0.6 and 1.2, got {}",
                self.temperature
            )
            .into());
        }
        if !(0.25..=1.5).contains(&self.speed) {
            return Err(format!("speed must be between 0.25 and 1.5, got {}", self.speed).into());
        }
        if self.negotiation_timeout.is_zero() || self.dial_timeout.is_zero() {
            return Err("timeouts must be greater than zero".into());
        }
        Ok(())
    }

    /// Offer `tools` to the agent.
    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }

    fn apply_env(&mut self) -> Result<(), String> {
        if let Some(key) = env_string("OPENAI_KEY").or_else(|| env_string("OPENAI_API_KEY")) {
            self.api_key = key;
        }
        if let Some(model) = env_string("REALTIME_MODEL") {
            self.model = model;
        }
        if let Some(voice) = env_string("REALTIME_VOICE") {
            self.voice = voice;
        }
        if let Some(rate) = env_parse::<u32>("REALTIME_SAMPLE_RATE")? {
            self.sample_rate = rate;
        }
        if let Some(ms) = env_parse::<u64>("REALTIME_LATENCY_MS")? {
            self.latency = Duration::from_millis(ms);
        }
        Ok(())
    }

    fn apply_yaml(&mut self, yaml: YamlConfig) {
        if let Some(api_key) = yaml.api_key {
            self.api_key = api_key;
        }
        if let Some(url) = yaml.url {
            self.url = url;
        }
        if let Some(model) = yaml.model {
            self.model = model;
        }
        if let Some(voice) = yaml.voice {
            self.voice = voice;
        }
        if let Some(instructions) = yaml.instructions {
            self.instructions = instructions;
        }
        if let Some(temperature) = yaml.temperature {
            self.temperature = temperature;
        }
        if let Some(speed) = yaml.speed {
            self.speed = speed;
        }
        if let Some(audio) = yaml.audio {
            if let Some(rate) = audio.sample_rate {
                self.sample_rate = rate;
            }
            if let Some(ms) = audio.latency_ms {
                self.latency = Duration::from_millis(ms);
            }
        }
        if let Some(timeouts) = yaml.timeouts {
            if let Some(ms) = timeouts.negotiation_ms {
                self.negotiation_timeout = Duration::from_millis(ms);
            }
            if let Some(ms) = timeouts.dial_ms {
                self.dial_timeout = Duration::from_millis(ms);
            }
        }
    }
}

/// Non-empty environment variable
fn env_string(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>, String> {
    match env_string(name) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| format!("Invalid {} value: {}", name, value)),
        None => Ok(None),
    }
}
