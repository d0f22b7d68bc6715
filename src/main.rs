use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use glad_glclu_stac::batch::{self, ItemPlan, PlanReport};
use glad_glclu_stac::collection::{CollectionBuilder, CollectionKind};
use glad_glclu_stac::config::Settings;
use glad_glclu_stac::extensions;
use glad_glclu_stac::href_format::HrefFormat;
use glad_glclu_stac::item::ItemBuilder;
use glad_glclu_stac::media_type::MediaType;
use glad_glclu_stac::schema::SchemaValidator;
use glad_glclu_stac::stac_operations;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "glad-glclu-stac",
    version,
    about = "Generate STAC metadata for the GLAD Global Land Cover and Land Use Change dataset"
)]
struct Cli {
    /// TOML settings file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the annual or change collection
    CreateCollection {
        /// annual or change
        #[arg(long = "type", value_name = "TYPE")]
        kind: CollectionKind,

        /// Media type of the data assets
        #[arg(long)]
        media_type: Option<MediaType>,

        /// Asset read to determine the media type and nodata value
        #[arg(long)]
        sample_asset_href: Option<String>,

        /// Path of the collection JSON
        destination: PathBuf,
    },

    /// Create an item for one asset
    CreateItem {
        /// Template the asset href is parsed with, e.g.
        /// s3://bucket/{version}/{year}/{loc}.tif
        #[arg(long)]
        href_format: Option<String>,

        /// Asset href
        source: String,

        /// Path of the item JSON
        destination: PathBuf,
    },

    /// Create items for every asset in a list, one after another
    CreateItems {
        #[arg(long)]
        href_format: Option<String>,

        /// Treat the list as tile locations of this year instead of hrefs
        #[arg(long)]
        year: Option<String>,

        /// Dataset version used with --year
        #[arg(long = "dataset-version", default_value = "v2")]
        version: String,

        /// Replace items that already exist
        #[arg(long)]
        overwrite: bool,

        /// Also write the generated plan to this file
        #[arg(long)]
        plan: Option<PathBuf>,

        /// File with one href (or tile location) per line
        list: PathBuf,

        /// Directory the items are written to
        destination: PathBuf,
    },

    /// Run a plan written by create-items --plan
    RunPlan {
        #[arg(long)]
        href_format: Option<String>,

        /// Replace items that already exist
        #[arg(long)]
        overwrite: bool,

        plan: PathBuf,
    },

    /// Check a collection or item against the STAC schemas
    Validate {
        /// Only run the checks that need no network access
        #[arg(long)]
        skip_schemas: bool,

        path: PathBuf,
    },

    /// Write a settings file with the default values
    InitConfig { path: PathBuf },
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    match path {
        Some(path) => Settings::read(path)
            .with_context(|| format!("Failed to read settings from {}", path.display())),
        None => Ok(Settings::default()),
    }
}

fn item_builder(settings: &Settings, href_format: Option<&str>) -> Result<ItemBuilder> {
    let href_format = match href_format {
        Some(template) => HrefFormat::new(template)?,
        None => settings.href_format()?,
    };
    Ok(ItemBuilder::new(href_format)
        .reader_options(settings.reader_options())
        .legends(settings.legends()?))
}

/// Without a media type or a sample asset the collection is typed GeoTIFF.
fn collection_builder(
    settings: &Settings,
    kind: CollectionKind,
    media_type: Option<MediaType>,
    sample_asset_href: Option<&str>,
) -> Result<CollectionBuilder> {
    let mut builder = CollectionBuilder::new(kind)
        .reader_options(settings.reader_options())
        .legends(settings.legends()?);
    if media_type.is_none() && sample_asset_href.is_none() {
        warn!(
            "No sample_asset_href or media_type provided. Defaulting to {} media type.",
            MediaType::GeoTiff
        );
        builder = builder.media_type(MediaType::GeoTiff);
    }
    if let Some(media_type) = media_type {
        builder = builder.media_type(media_type);
    }
    if let Some(href) = sample_asset_href {
        builder = builder.sample_asset_href(href);
    }
    Ok(builder)
}

fn write_document(value: &Value, destination: &Path) -> Result<()> {
    stac_operations::write_json(value, destination)
        .with_context(|| format!("Failed to write {}", destination.display()))?;
    info!(destination = %destination.display(), "Wrote document");
    Ok(())
}

async fn validate_file(path: &Path, schemas: Option<&mut SchemaValidator>) -> Result<()> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)?;
    match value.get("type").and_then(Value::as_str) {
        Some("Collection") => {
            extensions::validate_collection(&value)?;
            stac_operations::read_collection_from_file(path)?;
        }
        Some("Feature") => {
            extensions::validate_item(&value)?;
            stac_operations::read_item_from_file(path)?;
        }
        other => return Err(anyhow!("Not a STAC collection or item (type {other:?})")),
    }
    if let Some(schemas) = schemas {
        schemas.validate(&value).await?;
    }
    info!(path = %path.display(), "Document is valid");
    Ok(())
}

fn log_report(report: &PlanReport) {
    info!(
        written = report.written.len(),
        skipped = report.skipped.len(),
        "Finished creating items"
    );
}

async fn run(cli: Cli) -> Result<()> {
    let settings = load_settings(cli.config.as_deref())?;

    match cli.command {
        Command::CreateCollection {
            kind,
            media_type,
            sample_asset_href,
            destination,
        } => {
            let builder =
                collection_builder(&settings, kind, media_type, sample_asset_href.as_deref())?;
            let collection = builder.build().await?;
            let value = stac_operations::add_self_link(&collection, &destination)?;
            write_document(&value, &destination)?;
        }
        Command::CreateItem {
            href_format,
            source,
            destination,
        } => {
            let builder = item_builder(&settings, href_format.as_deref())?;
            let item = builder.create_item(&source).await?;
            let value = stac_operations::add_self_link(&item, &destination)?;
            write_document(&value, &destination)?;
        }
        Command::CreateItems {
            href_format,
            year,
            version,
            overwrite,
            plan,
            list,
            destination,
        } => {
            let builder = item_builder(&settings, href_format.as_deref())?;
            let entries = batch::read_list(&list)
                .with_context(|| format!("Failed to read {}", list.display()))?;
            let item_plan = match year {
                Some(year) => {
                    ItemPlan::from_tiles(&builder, &version, &year, &entries, &destination)?
                }
                None => ItemPlan::from_hrefs(&builder, &entries, &destination)?,
            };
            if let Some(plan_path) = plan {
                item_plan.write(&plan_path)?;
            }
            log_report(&item_plan.execute(&builder, overwrite).await?);
        }
        Command::RunPlan {
            href_format,
            overwrite,
            plan,
        } => {
            let builder = item_builder(&settings, href_format.as_deref())?;
            let item_plan = ItemPlan::read(&plan)
                .with_context(|| format!("Failed to read plan {}", plan.display()))?;
            log_report(&item_plan.execute(&builder, overwrite).await?);
        }
        Command::Validate { skip_schemas, path } => {
            let mut schemas = if skip_schemas {
                None
            } else {
                Some(SchemaValidator::new(settings.reader_options().http_timeout)?)
            };
            validate_file(&path, schemas.as_mut()).await?;
        }
        Command::InitConfig { path } => {
            Settings::from_template(&Settings::template())?.write(&path)?;
            info!(path = %path.display(), "Wrote settings template");
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    run(Cli::parse()).await
}
