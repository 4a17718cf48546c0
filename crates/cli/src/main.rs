use anyhow::{bail, Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use context_bundle::{BundleConfig, BundleService};
use context_indexer::CancellationToken;
use context_store::{FileId, PathSource, StoredFile};
use std::path::PathBuf;

mod config;

use config::{FileConfig, Overrides};

#[derive(Parser)]
#[command(name = "context-bundle")]
#[command(about = "Import archives and source files, then assemble bounded context bundles", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Storage directory for imported copies and the record store
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    /// TOML file with [limits] and [bundle] tables
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the smaller browsing limits for trees
    #[arg(long, global = true)]
    compact: bool,

    /// Override the tree output cap (bytes)
    #[arg(long, global = true)]
    total_cap: Option<usize>,

    /// Override the per-entry content cap (chars)
    #[arg(long, global = true)]
    entry_cap: Option<usize>,

    /// Override the archive entry ceiling
    #[arg(long, global = true)]
    max_entries: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy a file into storage (archives are indexed right away)
    Import(ImportArgs),

    /// List non-archived files, favorites first
    List(ListArgs),

    /// Find files by name or extension
    Search(SearchArgs),

    /// Print the tree of an imported archive
    Tree(TreeArgs),

    /// Assemble a context bundle
    Bundle(BundleArgs),

    /// Print a window of a stored file
    Preview(PreviewArgs),

    /// Set or clear the summary of a file
    Summary(SummaryArgs),

    /// Mark or unmark a file as favorite
    Favorite(FlagArgs),

    /// Hide or restore a file in listings
    Archive(FlagArgs),

    /// Delete a file and its stored copy
    Delete(IdArgs),
}

#[derive(Args)]
struct ImportArgs {
    path: PathBuf,

    /// Display name (defaults to the file name)
    #[arg(long)]
    name: Option<String>,

    /// Skip building the tree after import
    #[arg(long)]
    no_index: bool,

    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ListArgs {
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct SearchArgs {
    query: String,

    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct TreeArgs {
    id: FileId,

    /// Rebuild even if a tree is cached
    #[arg(long)]
    force: bool,

    /// Print build statistics to stderr
    #[arg(long)]
    stats: bool,

    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct BundleArgs {
    id: FileId,

    #[arg(long)]
    no_tree: bool,

    #[arg(long)]
    no_source: bool,

    #[arg(long)]
    no_summary: bool,

    #[arg(long)]
    no_instructions: bool,

    /// Write the bundle to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct PreviewArgs {
    id: FileId,

    #[arg(long, default_value_t = 0)]
    offset: u64,

    /// Window size in bytes (defaults to the preview size)
    #[arg(long)]
    size: Option<usize>,
}

#[derive(Args)]
struct SummaryArgs {
    id: FileId,

    text: Option<String>,

    #[arg(long, conflicts_with = "text")]
    clear: bool,
}

#[derive(Args)]
struct FlagArgs {
    id: FileId,

    /// Remove the flag instead of setting it
    #[arg(long)]
    off: bool,
}

#[derive(Args)]
struct IdArgs {
    id: FileId,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let file_config = FileConfig::load_optional(cli.config.as_deref())?;
    let overrides = Overrides {
        storage_dir: cli.store_dir.clone(),
        compact: cli.compact,
        total_cap_bytes: cli.total_cap,
        per_entry_cap_chars: cli.entry_cap,
        max_entries: cli.max_entries,
    };
    let mut service_config = config::service_config(&file_config, &overrides);
    if let Commands::Import(args) = &cli.command {
        service_config.index_on_import &= !args.no_index;
    }

    let service = BundleService::open(service_config)
        .await
        .context("Failed to open store")?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    match cli.command {
        Commands::Import(args) => run_import(&service, args, &cancel).await?,
        Commands::List(args) => {
            let files = service.files().await?;
            print_files(&files, args.json)?;
        }
        Commands::Search(args) => {
            let files = service.search(&args.query).await?;
            print_files(&files, args.json)?;
        }
        Commands::Tree(args) => run_tree(&service, args, &cancel).await?,
        Commands::Bundle(args) => run_bundle(&service, &file_config.bundle, args, &cancel).await?,
        Commands::Preview(args) => {
            let size = args.size.unwrap_or(service.config().preview_chunk_bytes);
            if size == 0 {
                bail!("--size must be positive");
            }
            let chunk = service.read_chunk(args.id, args.offset, size).await?;
            print!("{}", chunk.text);
            match chunk.next_offset {
                Some(next) => log::info!("More content from offset {next}"),
                None => log::debug!("End of file"),
            }
        }
        Commands::Summary(args) => {
            if !args.clear && args.text.is_none() {
                bail!("Pass the summary text or --clear");
            }
            let text = if args.clear { None } else { args.text };
            service.update_summary(args.id, text).await?;
        }
        Commands::Favorite(args) => service.set_favorite(args.id, !args.off).await?,
        Commands::Archive(args) => service.set_archived(args.id, !args.off).await?,
        Commands::Delete(args) => {
            if !service.delete(args.id).await? {
                bail!("File {} not found", args.id);
            }
        }
    }

    Ok(())
}

async fn run_import(
    service: &BundleService,
    args: ImportArgs,
    cancel: &CancellationToken,
) -> Result<()> {
    if !args.path.is_file() {
        bail!("{} is not a file", args.path.display());
    }
    let file = service
        .import(&PathSource::new(&args.path), args.name.as_deref(), cancel)
        .await
        .with_context(|| format!("Failed to import {}", args.path.display()))?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&file)?);
    } else {
        println!("{}\t{}\t{}", file.id, file.language, file.display_name);
    }
    Ok(())
}

async fn run_tree(service: &BundleService, args: TreeArgs, cancel: &CancellationToken) -> Result<()> {
    let view = service.request_tree(args.id, args.force, cancel).await?;
    if args.json {
        let body = serde_json::json!({
            "id": args.id,
            "from_cache": view.from_cache(),
            "tree": view.text,
            "stats": view.stats,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }
    print!("{}", view.text);
    if args.stats {
        match &view.stats {
            Some(stats) => eprintln!(
                "scanned {} | shown {} | ignored {} | with content {} | binary {} | outcome {:?} | {} ms",
                stats.entries_scanned,
                stats.entries_included,
                stats.entries_ignored,
                stats.entries_with_content,
                stats.binary_skipped,
                stats.outcome,
                stats.time_ms
            ),
            None => eprintln!("served from cache"),
        }
    }
    Ok(())
}

async fn run_bundle(
    service: &BundleService,
    defaults: &BundleConfig,
    args: BundleArgs,
    cancel: &CancellationToken,
) -> Result<()> {
    let config = BundleConfig {
        include_tree: defaults.include_tree && !args.no_tree,
        include_source: defaults.include_source && !args.no_source,
        include_summary: defaults.include_summary && !args.no_summary,
        include_instructions: defaults.include_instructions && !args.no_instructions,
    };
    let bundle = service.prepare_bundle(args.id, config, cancel).await?;
    match args.output {
        Some(path) => {
            std::fs::write(&path, &bundle)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            log::info!("Wrote {} bytes to {}", bundle.len(), path.display());
        }
        None => print!("{bundle}"),
    }
    Ok(())
}

fn print_files(files: &[StoredFile], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(files)?);
        return Ok(());
    }
    for file in files {
        let star = if file.is_favorite { "*" } else { " " };
        let tree = if file.last_known_tree.is_some() {
            "tree"
        } else {
            "-"
        };
        println!(
            "{}{}\t{}\t{}\t{} bytes\t{}",
            star, file.id, file.language, tree, file.size_bytes, file.display_name
        );
    }
    Ok(())
}
