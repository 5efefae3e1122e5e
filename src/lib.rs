//! ChatGusto: a multi-mode Gemini chat client.
//!
//! The library holds everything except the terminal front end: mode
//! profiles, tool executors, model sessions, the turn orchestrator, the
//! shared view state and speech playback.

pub mod config;
pub mod error;
pub mod llm;
pub mod modes;
pub mod orchestrator;
pub mod playback;
pub mod session;
pub mod tools;
pub mod view;

pub use error::{GustoError, Result};
pub use modes::{Mode, ModeProfile};
pub use orchestrator::{Orchestrator, OrchestratorEvent, SubmitError, TurnOutcome, TurnState, TurnSummary};
pub use view::{ChatMessage, MessageRole, ViewEvent, ViewState};
