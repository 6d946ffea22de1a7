//! Core data model types for flowexec.
//!
//! This module contains the types every other component exchanges:
//! - The event envelope
//! - Step processing types
//! - Invocation outcomes

mod event;
mod outcome;
mod processing_type;

pub use event::{Event, EventError};
pub use outcome::Outcome;
pub use processing_type::ProcessingType;
