//! Pipeline configuration.

pub mod args;
pub mod pipeline_config;

pub use args::CliArgs;
pub use pipeline_config::{
    EscalationSection, LoaderSection, LogLevel, PipelineConfig, PrefetchSection, StoreSection,
    ThumbnailSection,
};
