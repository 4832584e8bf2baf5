//! `mindfuel-core` : domain building blocks for the daily delivery pipeline.
//!
//! This crate contains **pure domain** types (no infrastructure concerns):
//! recipients and their eligibility predicate, batches, checkpoints, delivery
//! outcomes and run statistics.

pub mod checkpoint;
pub mod content;
pub mod error;
pub mod id;
pub mod outcome;
pub mod recipient;
pub mod stats;

pub use checkpoint::Checkpoint;
pub use content::Content;
pub use error::DomainError;
pub use id::{RecipientId, RunId};
pub use outcome::{DeliveryOutcome, DeliveryStatus};
pub use recipient::{Batch, Frequency, Recipient, SubscriptionStatus};
pub use stats::{PhaseStatistics, RunStatistics};
