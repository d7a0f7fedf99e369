//! Session orchestration for gateway agents.
//!
//! Provides:
//! - `SessionController` - identity, per-attempt credentials, bounded reconnects
//! - `SessionObserver` - explicit pre/post invocation hooks

pub mod controller;
pub mod observer;

pub use controller::{AttemptPolicy, SessionController, SessionOutcome, SessionState};
pub use observer::{AttemptOutcome, InvocationContext, ObserverError, Observers, SessionObserver, TracingObserver};
