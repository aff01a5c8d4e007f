pub mod escalation_service;
pub mod thumbnail_population_service;

pub use escalation_service::{DEFAULT_DIRECT_TIMEOUT, EscalationService, Resolved, ResolvedBy};
pub use thumbnail_population_service::BulkThumbnailService;
