//! BoxBox Core Library
//!
//! Competitor state model, trigger evaluation engine and the collaborator
//! traits the delivery pipeline talks to.

pub mod collaborator;
pub mod context;
pub mod engine;
pub mod event;
pub mod model;
pub mod session;
pub mod store;
pub mod track;
pub mod trigger;

pub use collaborator::{AudioClip, AudioOutput, LapRecord, LapRecorder, SpeechSynthesizer, TextGenerator};
pub use engine::{EngineConfig, TriggerEngine};
pub use event::AdvisoryEvent;
pub use model::{CarSnapshot, CompetitorState};
pub use session::{SessionKind, SessionNumbering};
pub use store::{StoreView, TelemetryStore};
pub use trigger::TriggerKind;
