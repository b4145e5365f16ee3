use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use futures::future::join_all;
use tracing::{error, info};
use wadoload_config::{LoaderConfig, LoaderConfigSource, init_tracing};
use wadoload_core::{ImageLoaderRegistry, LoadOptions};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "wadoload")]
#[command(about = "Load DICOM images by image id and report their geometry and timings")]
struct Cli {
    /// Image ids, e.g. `wadouri:https://pacs/wado?objectUID=1.2.3&frame=0`
    #[arg(required = true)]
    image_ids: Vec<String>,

    /// Loader config file (TOML or JSON)
    #[arg(short, long, env = "WADOLOAD_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// JSON object forwarded to the image factory
    #[arg(long)]
    options: Option<String>,

    /// Evict each image's data set once it has been reported
    #[arg(long)]
    decache: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_file_loaded = dotenvy::dotenv().is_ok();
    init_tracing();
    if env_file_loaded {
        info!("loaded .env file");
    }

    let cli = Cli::parse();

    let (config, source) = match &cli.config {
        Some(path) => (
            LoaderConfig::load_from_file(path)?,
            LoaderConfigSource::File(path.clone()),
        ),
        None => LoaderConfig::load_from_env()?,
    };
    info!(?source, "loader configuration resolved");

    let options = match &cli.options {
        Some(raw) => serde_json::from_str::<LoadOptions>(raw)
            .context("--options must be a JSON object")?,
        None => LoadOptions::default(),
    };

    let loader = config.build_loader()?;
    let registry = ImageLoaderRegistry::new();
    loader.register(&registry);

    let results = join_all(
        cli.image_ids
            .iter()
            .map(|image_id| registry.load_image(image_id, &options)),
    )
    .await;

    let mut failures = 0usize;
    for (image_id, result) in cli.image_ids.iter().zip(results) {
        match result {
            Ok(loaded) => {
                let image = &loaded.image;
                println!(
                    "{image_id}: {}x{} x{} @ {} bits, {}, {} bytes; data set ready in {}, image in {}",
                    image.columns,
                    image.rows,
                    image.samples_per_pixel,
                    image.bits_allocated,
                    image
                        .photometric_interpretation
                        .as_deref()
                        .unwrap_or("unknown photometric"),
                    image.pixel_data.len(),
                    humantime::format_duration(loaded.load_time),
                    humantime::format_duration(loaded.total_time),
                );
                if cli.decache {
                    loaded.decache();
                }
            }
            Err(err) => {
                failures += 1;
                error!(image_id, stage = err.stage(), error = %err, "load failed");
            }
        }
    }

    let info = loader.cache().info();
    let stats = loader.cache().singleflight_stats();
    println!(
        "cache: {} data sets, {} bytes; {} fetches, {} joined in flight",
        info.number_of_data_sets_cached,
        info.cache_size_in_bytes,
        stats.leaders,
        stats.waiters,
    );

    if failures > 0 {
        bail!("{failures} of {} image loads failed", cli.image_ids.len());
    }
    Ok(())
}
