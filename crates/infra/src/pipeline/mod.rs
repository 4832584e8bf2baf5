//! The resumable batch delivery pipeline.
//!
//! ```text
//! RecipientSource ──batch──▶ DeliveryEngine ──outcomes──▶ FeedbackCommitter
//!        ▲                                                      │
//!        └──────────── watermark (checkpoint) ◀─────────────────┘
//! ```
//!
//! [`RunOrchestrator`] drives the loop per frequency phase.

pub mod committer;
pub mod engine;
pub mod orchestrator;
pub mod report;
pub mod source;

pub use committer::{CommitError, FeedbackCommitter};
pub use engine::{DeliveryEngine, DeliveryError, DeliveryPolicy, SenderIdentity};
pub use orchestrator::{Phase, RunConfig, RunContext, RunError, RunOrchestrator};
pub use report::RunReport;
pub use source::{BatchCursor, RecipientSource};
