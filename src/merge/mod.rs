//! The per-row merge pipeline.

pub mod address;
pub mod context;
pub mod driver;
pub mod message;
pub mod template;
pub mod writeback;

pub use address::RecipientList;
pub use context::{Context, build_context};
pub use driver::{MergeDriver, MergeReport};
pub use message::OutgoingMessage;
pub use template::{Template, TemplateEngine};
pub use writeback::{FlushSummary, WritebackBuffers};
