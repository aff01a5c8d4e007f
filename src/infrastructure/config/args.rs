use super::pipeline_config::{LogLevel, PipelineConfig};
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "pixelpipe",
    version,
    about = "Fetch images through a prioritized, cached loading pipeline",
    long_about = None
)]
pub struct CliArgs {
    /// Image sources (URLs or local paths) to load.
    #[arg(required = true, value_name = "SOURCE")]
    pub sources: Vec<String>,

    /// Directory the loaded images are written to.
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub output: PathBuf,

    /// Write derived thumbnails instead of full images.
    #[arg(short, long)]
    pub thumbnails: bool,

    /// Configuration file path.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH")]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Maximum simultaneous network fetches.
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Durable store directory.
    #[arg(long, value_name = "DIR")]
    pub store_dir: Option<PathBuf>,
}

impl PipelineConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(max_concurrent) = args.max_concurrent {
            self.loader.max_concurrent = max_concurrent;
        }
        if let Some(store_dir) = &args.store_dir {
            self.store.directory = Some(store_dir.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_override_config() {
        let args = CliArgs::parse_from([
            "pixelpipe",
            "--log-level",
            "trace",
            "--max-concurrent",
            "2",
            "--store-dir",
            "/tmp/store",
            "https://x/a.jpg",
        ]);
        let mut config = PipelineConfig::default();

        config.merge_with_args(&args);

        assert_eq!(config.log_level, LogLevel::Trace);
        assert_eq!(config.loader.max_concurrent, 2);
        assert_eq!(config.store.directory, Some(PathBuf::from("/tmp/store")));
        assert_eq!(args.sources, vec!["https://x/a.jpg".to_string()]);
        assert!(!args.thumbnails);
    }

    #[test]
    fn test_absent_args_keep_config() {
        let args = CliArgs::parse_from(["pixelpipe", "-t", "a.jpg"]);
        let mut config = PipelineConfig::default();

        config.merge_with_args(&args);

        assert_eq!(config, PipelineConfig::default());
        assert!(args.thumbnails);
    }
}
