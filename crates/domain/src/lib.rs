//! `sg-domain` — shared types for the SessionGuard workspace.
//!
//! Holds the error type, lifecycle configuration, the core session data
//! model (credentials, contexts, change events, validation results), and
//! the structured trace events emitted by the lifecycle manager.

pub mod config;
pub mod error;
pub mod session;
pub mod trace;

pub use config::LifecycleConfig;
pub use error::{Error, Result};
pub use session::{
    Credential, SessionChangeEvent, SessionChangeKind, SessionContext, ValidationResult,
};
pub use trace::TraceEvent;
