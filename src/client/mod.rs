//! Student-side session controller.
//!
//! The controller drives one attempt from `start` to a terminal state over the
//! HTTP API. The server owns the timer and the violation counts; everything kept
//! here is a display cache resynced from server responses.

mod autosave;
mod controller;
mod countdown;
mod error;
mod optimistic;
mod outbox;
mod retry;
mod signals;
mod transport;

pub use autosave::{AutosaveBuffer, DraftAnswer, OutgoingSave, SyncIndicator};
pub use controller::{SessionConfig, SessionController, SessionEvent, SessionInput, SessionOutcome};
pub use countdown::{format_clock, Countdown};
pub use error::ClientError;
pub use optimistic::Optimistic;
pub use outbox::ViolationOutbox;
pub use retry::{retry_request, RetryConfig};
pub use signals::{EnvironmentSignal, SignalGate};
pub use transport::{ExamApi, HttpExamApi};
