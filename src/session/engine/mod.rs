//! Session state machine and orchestration.

pub mod controller;
pub mod events;

pub use controller::{SessionBackends, SessionController, SubmitOutcome};
pub use events::{SessionEvent, SessionState};
