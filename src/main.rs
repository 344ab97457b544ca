use clap::{Parser, Subcommand};
use property_images::config::{self, PipelineConfig};
use property_images::imaging::{EncoderSettings, OutputFormat, RustBackend};
use property_images::ingest::UploadedFile;
use property_images::output;
use property_images::policy::OptimizeOverrides;
use property_images::service::ImagePipeline;
use property_images::store::JsonDirStore;
use property_images::types::{NewProperty, RESERVED_FIELDS};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "property-images")]
#[command(about = "Image pipeline for property listings")]
#[command(long_about = "\
Image pipeline for property listings

Uploads are validated, re-encoded by size (JPEG for most files, WebP for
very large ones), resized to fit 1920x1080 and given a 300x200 thumbnail.
Each property keeps an ordered image list with exactly one cover.

Properties are stored as JSON files under --store; optimized images and
thumbnails go to the uploads root from config.toml.

Run 'property-images gen-config' to generate a documented config.toml.
Set RUST_LOG=debug for per-file details.")]
#[command(version)]
struct Cli {
    /// Pipeline config file (missing file = defaults)
    #[arg(long, default_value = "config.toml", global = true)]
    config: PathBuf,

    /// Directory holding one JSON record per property
    #[arg(long, default_value = "properties", global = true)]
    store: PathBuf,

    /// Print results as JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate and optimize files without attaching them to a property
    Ingest {
        #[arg(long = "file", required = true)]
        files: Vec<PathBuf>,
        /// Title used for alt text
        #[arg(long)]
        title: Option<String>,
    },
    /// Create a property from uploaded files
    Create {
        #[arg(long)]
        title: String,
        /// Extra listing field, KEY=VALUE (VALUE parsed as JSON when possible)
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, serde_json::Value)>,
        #[arg(long = "file")]
        files: Vec<PathBuf>,
    },
    /// Keep the listed image URLs (in order), append new files, delete the rest
    Update {
        property: String,
        #[arg(long = "keep")]
        keep: Vec<String>,
        #[arg(long = "file")]
        files: Vec<PathBuf>,
    },
    /// Append files to a property
    Add {
        property: String,
        #[arg(long = "file", required = true)]
        files: Vec<PathBuf>,
    },
    /// Delete one image and its files
    DeleteImage { property: String, image: String },
    /// Make one image the cover
    SetCover { property: String, image: String },
    /// Reorder images; every image id must be listed exactly once
    Reorder {
        property: String,
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Show compression statistics
    Stats { property: String },
    /// Show optimization suggestions
    Suggest { property: String },
    /// Re-encode one stored image
    Reoptimize {
        property: String,
        image: String,
        #[arg(long)]
        quality: Option<u32>,
        #[arg(long)]
        max_width: Option<u32>,
        #[arg(long)]
        max_height: Option<u32>,
    },
    /// Delete a property and every stored file it owns
    DeleteProperty { property: String },
    /// Print a property and its images
    Show { property: String },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    init_tracing();
    let config = config::load_config(&cli.config)?;
    init_thread_pool(&config);
    let pipeline = build_pipeline(&cli.store, config)?;
    let json = cli.json;

    match cli.command {
        Command::Ingest { files, title } => {
            let images = pipeline.ingest_images(&uploads(&files)?, title.as_deref())?;
            emit(json, &images, || output::print_images(&images))?;
        }
        Command::Create {
            title,
            fields,
            files,
        } => {
            let data = NewProperty {
                title,
                fields: fields.into_iter().collect(),
            };
            let property = pipeline.create_with_images(data, &uploads(&files)?)?;
            emit(json, &property, || output::print_property(&property))?;
        }
        Command::Update {
            property,
            keep,
            files,
        } => {
            let property = pipeline.update_images(&property, &keep, &uploads(&files)?)?;
            emit(json, &property, || output::print_property(&property))?;
        }
        Command::Add { property, files } => {
            let property = pipeline.add_images(&property, &uploads(&files)?)?;
            emit(json, &property, || output::print_property(&property))?;
        }
        Command::DeleteImage { property, image } => {
            let property = pipeline.delete_image(&property, &image)?;
            emit(json, &property, || output::print_property(&property))?;
        }
        Command::SetCover { property, image } => {
            let property = pipeline.set_cover(&property, &image)?;
            emit(json, &property, || output::print_property(&property))?;
        }
        Command::Reorder { property, ids } => {
            let property = pipeline.reorder_images(&property, &ids)?;
            emit(json, &property, || output::print_property(&property))?;
        }
        Command::Stats { property } => {
            let stats = pipeline.image_stats(&property)?;
            emit(json, &stats, || output::print_stats(&stats))?;
        }
        Command::Suggest { property } => {
            let suggestions = pipeline.optimization_suggestions(&property)?;
            emit(json, &suggestions, || output::print_suggestions(&suggestions))?;
        }
        Command::Reoptimize {
            property,
            image,
            quality,
            max_width,
            max_height,
        } => {
            let overrides = OptimizeOverrides {
                quality,
                max_width,
                max_height,
            };
            let image = pipeline.reoptimize_image(&property, &image, &overrides)?;
            emit(json, &image, || {
                for line in output::format_image(&image) {
                    println!("{}", line);
                }
            })?;
        }
        Command::DeleteProperty { property } => {
            pipeline.delete_property(&property)?;
            println!("Deleted {}", property);
        }
        Command::Show { property } => {
            let property = pipeline.property(&property)?;
            emit(json, &property, || output::print_property(&property))?;
        }
        Command::GenConfig => {}
    }

    Ok(())
}

/// Log to stderr; `RUST_LOG` overrides the default `info` level.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores.
fn init_thread_pool(config: &PipelineConfig) {
    let threads = config::effective_threads(&config.processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

fn build_pipeline(
    store_dir: &Path,
    config: PipelineConfig,
) -> Result<ImagePipeline<RustBackend, JsonDirStore>, Box<dyn std::error::Error>> {
    let backend = RustBackend::with_settings(EncoderSettings {
        webp_effort: config.optimization.webp_effort,
        png_preset: config.optimization.png_preset,
    });
    let store = JsonDirStore::open(store_dir)?;
    Ok(ImagePipeline::new(backend, store, config)?)
}

/// Describe local files as uploads, guessing the MIME type from the
/// extension. Unknown extensions get a type the validator will reject.
fn uploads(paths: &[PathBuf]) -> std::io::Result<Vec<UploadedFile>> {
    paths
        .iter()
        .map(|path| {
            let mime = OutputFormat::from_path(path)
                .map(|f| f.mime_type())
                .unwrap_or("application/octet-stream");
            UploadedFile::from_path(path.clone(), mime)
        })
        .collect()
}

fn parse_field(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {raw:?}"))?;
    if RESERVED_FIELDS.contains(&key) {
        return Err(format!("{key:?} is set by the pipeline and cannot be a listing field"));
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn emit<T: Serialize>(
    json: bool,
    value: &T,
    print_text: impl FnOnce(),
) -> Result<(), serde_json::Error> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print_text();
    }
    Ok(())
}
