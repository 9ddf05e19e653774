//! Session orchestration: recognition outcomes → playback, plus the record
//! of every resolved attempt.

pub mod orchestrator;
pub mod record;

pub use orchestrator::{SessionCommand, SessionError, SessionEvent, SessionOrchestrator};
pub use record::{SessionEntry, SessionRecord};
