//! The voice session: one child talking to Grandpa, turn after turn.

pub mod controller;
pub mod events;
pub mod state;

pub use controller::{SessionOptions, VoiceSession};
pub use events::{SessionCommand, SessionEvent};
pub use state::{SessionState, StatusSnapshot, TurnOutcome};
