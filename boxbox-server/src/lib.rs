//! BoxBox Server Library
//!
//! Exposes server components for integration testing.

pub mod api;
pub mod audio;
pub mod config;
pub mod pipeline;
pub mod recorder;
pub mod state;
pub mod voice;
