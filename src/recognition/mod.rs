//! Recognition: capture → matcher request → ranked outcome.
//!
//! [`RecognitionCoordinator`] owns the single active attempt.  Each attempt
//! runs a [`CaptureSession`](crate::audio::CaptureSession), then submits the
//! recording through [`submit`], then ranks the candidates into a
//! [`RecognitionOutcome`] and emits it on the outcome channel.

pub mod coordinator;
pub mod outcome;
pub mod request;

pub use coordinator::{
    AttemptHandle, AttemptId, CoordinatorState, OutcomeEvent, RecognitionCoordinator,
    RecognitionSettings,
};
pub use outcome::{rank_candidates, RecognitionOutcome};
pub use request::{
    submit, RecognitionRequest, RequestControl, RequestHandle, RequestId, RequestOutcome,
    RequestStatus,
};
