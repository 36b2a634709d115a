pub mod audio;
pub mod realtime;

// Re-export commonly used types for convenience
pub use audio::{AudioError, AudioIo, AudioRead, AudioResult, AudioWrite, BlockingBuffer};

pub use realtime::{
    ClientEvent, RealtimeError, RealtimeResult, RealtimeSession, ServerEvent, SessionState,
};
