//! The editing session: one calculator document, its computed result and
//! the saved project tree, driven by a single actor task.
//!
//! Local edits apply immediately. Recomputes run after a quiet window (or
//! at once on [`SessionHandle::recalculate`]); recompute and project load
//! responses are ordered by one shared [`Sequencer`], so only the response
//! to the most recently dispatched call can change the document or result.

mod actor;
mod backend;
mod debounce;
mod sequence;
mod state;

pub use actor::{Session, SessionHandle};
pub use backend::{Backend, LocalBackend, PricingEngine, ProjectStore, SettingsStore};
pub use debounce::Debouncer;
pub use sequence::{Sequencer, Ticket};
pub use state::{AppState, CurrentProject, Transition};
