//! Application layer: consumers of the loader.

/// Escalation chain and bulk population services.
pub mod services;

pub use services::{BulkThumbnailService, EscalationService, Resolved, ResolvedBy};
