use gallery_stream::config::{self, Config, ResolutionPolicy};
use gallery_stream::error::{Error, Result};
use gallery_stream::gallery::{AssetStreamPipeline, CatalogIndex, EventSink, GalleryStreamHandler};
use gallery_stream::state::import::import_folder_async;
use gallery_stream::state::library::Library;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

const USAGE: &str = "\
Usage: gallery-stream [--db <catalog.db>] <command>

Commands:
  import <folder>                         Add every photo under <folder> to the catalog
  stream --start <ms> --end <ms> [--policy path|thumbnail]
                                          Print assets created in [start, end] as JSON lines
  verify                                  Hide catalogued photos whose files are gone
                                          and restore those that came back";

#[tokio::main]
async fn main() -> ExitCode {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    match run(pico_args::Arguments::from_env()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(mut args: pico_args::Arguments) -> Result<()> {
    if args.contains(["-h", "--help"]) {
        println!("{USAGE}");
        return Ok(());
    }

    let mut config = config::load().unwrap_or_else(|e| {
        log::warn!("Using default settings: {}", e);
        Config::default()
    });
    if let Some(db) = args.opt_value_from_str::<_, PathBuf>("--db").map_err(usage_error)? {
        config.catalog_path = Some(db);
    }

    let command = args.subcommand().map_err(usage_error)?;
    match command.as_deref() {
        Some("import") => {
            let folder: PathBuf = args.free_from_str().map_err(usage_error)?;
            let result = import_folder_async(folder, config.catalog_path()).await?;
            println!(
                "Imported {} photos, restored {}, skipped {}",
                result.imported_count, result.restored_count, result.skipped_count
            );
            Ok(())
        }
        Some("stream") => {
            let start: f64 = args.value_from_str("--start").map_err(usage_error)?;
            let end: f64 = args.value_from_str("--end").map_err(usage_error)?;
            if let Some(policy) = args
                .opt_value_from_fn("--policy", parse_policy)
                .map_err(usage_error)?
            {
                config.resolution_policy = policy;
            }
            stream(&config, start, end).await
        }
        Some("verify") => {
            let library = Library::open(&config.catalog_path())?;
            let hidden = library.verify_files()?;
            println!("{} of {} photos missing on disk", hidden, library.asset_count()?);
            Ok(())
        }
        _ => Err(Error::InvalidArguments(USAGE.to_string())),
    }
}

/// Act as the host: listen on the channel and print every event
async fn stream(config: &Config, start: f64, end: f64) -> Result<()> {
    let index = Arc::new(CatalogIndex::new(config.catalog_path()));
    let handler = GalleryStreamHandler::new(AssetStreamPipeline::from_config(index, config));

    let (sink, mut events) = EventSink::channel();
    let arguments = serde_json::json!({ "startPeriod": start, "endPeriod": end });
    let running = handler.on_listen(&arguments, sink)?;

    while let Some(event) = events.recv().await {
        println!("{}", serde_json::to_string(&event)?);
        if event.is_end() {
            break;
        }
    }

    running.await?;
    Ok(())
}

fn parse_policy(value: &str) -> std::result::Result<ResolutionPolicy, String> {
    match value {
        "path" => Ok(ResolutionPolicy::PathOnly),
        "thumbnail" => Ok(ResolutionPolicy::ThumbnailWithMetadata),
        other => Err(format!("unknown policy `{other}`, expected path or thumbnail")),
    }
}

fn usage_error(e: pico_args::Error) -> Error {
    Error::InvalidArguments(format!("{e}\n\n{USAGE}"))
}
