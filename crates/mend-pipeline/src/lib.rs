pub mod apply;
pub mod conflict;
pub mod event_log;
pub mod orchestrator;
pub mod publish;
pub mod safety;
pub mod validate;

pub use apply::{apply, Overlay};
pub use conflict::{detect_conflicts, ConflictCheck};
pub use event_log::{Event, EventLogger};
pub use orchestrator::{ApplyMode, ApplyPipeline, PipelineResult, PipelineStage};
pub use publish::{GitPublisher, Publisher, RecordingPublisher};
pub use safety::{SafetyChecker, SafetyVerdict};
pub use validate::{dry_run, DryRunVerdict};
