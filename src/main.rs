use std::path::{Path, PathBuf};

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use futures_util::future::join_all;
use tracing::{info, warn};

use pixelpipe::domain::{EncodedImage, LoadResult, Priority, SourceId};
use pixelpipe::infrastructure::{CliArgs, Pipeline, PipelineConfig, init_logging};

fn output_path(dir: &Path, index: usize, image: &EncodedImage) -> PathBuf {
    let ext = image
        .format()
        .and_then(|f| f.extensions_str().first().copied())
        .unwrap_or("img");
    dir.join(format!("{index:04}.{ext}"))
}

async fn run(pipeline: &Pipeline, args: &CliArgs) -> Result<usize> {
    tokio::fs::create_dir_all(&args.output)
        .await
        .wrap_err("Failed to create output directory")?;

    let loader = pipeline.loader();
    let loads = args.sources.iter().enumerate().map(|(index, raw)| {
        let source = SourceId::new(raw.as_str());
        // The first source is what the user is looking at.
        let priority = if index == 0 {
            Priority::High
        } else {
            Priority::Normal
        };
        async move {
            let result: LoadResult<EncodedImage> = if args.thumbnails {
                loader.load_thumbnail(source.clone(), priority).await
            } else {
                loader.load(source.clone(), priority).await
            };
            (index, source, result)
        }
    });

    let mut failures = 0;
    for (index, source, result) in join_all(loads).await {
        match result {
            Ok(image) => {
                let path = output_path(&args.output, index, &image);
                tokio::fs::write(&path, image.as_bytes())
                    .await
                    .wrap_err_with(|| format!("Failed to write {}", path.display()))?;
                println!("{source} -> {}", path.display());
            }
            Err(e) => {
                warn!(source = %source, error = %e, "Load failed");
                eprintln!("{source}: {e}");
                failures += 1;
            }
        }
    }

    Ok(failures)
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = CliArgs::parse();
    let mut config = PipelineConfig::load(args.config.as_deref())?;
    config.merge_with_args(&args);

    init_logging(&config)?;

    info!(version = pixelpipe::VERSION, "Starting pixelpipe");

    let pipeline = Pipeline::build(config).await?;
    let failures = run(&pipeline, &args).await?;

    let stats = pipeline.loader().memory_cache_stats();
    info!(%stats, failures, "Finished");

    if failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}
