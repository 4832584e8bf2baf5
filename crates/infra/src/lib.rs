//! Infrastructure layer: backing store, checkpoints, content, templates,
//! transport, alerts, and the resumable delivery pipeline built on them.

pub mod alerts;
pub mod checkpoint;
pub mod clock;
pub mod config;
pub mod content;
pub mod db;
pub mod io;
pub mod pipeline;
pub mod recipients;
pub mod render;
pub mod retry;
pub mod transport;

pub use alerts::{AlertSink, LogAlertSink, MailAlertSink};
pub use checkpoint::{CheckpointError, CheckpointStore};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{CheckpointBackend, ConfigError, PipelineConfig};
pub use content::{ContentError, ContentProvider};
pub use pipeline::{RunOrchestrator, RunReport};
pub use recipients::{RecipientStore, StorageError};
pub use render::{Renderer, TemplateRenderer};
pub use retry::RetryPolicy;
pub use transport::{Transport, TransportError};
