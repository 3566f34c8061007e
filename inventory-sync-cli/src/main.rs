//! Inventory Sync CLI Application
//!
//! This is the command-line front end for the inventory-sync-core library.
//! It adds:
//! - TOML settings file and JSON state file (the store)
//! - HTTP and local-file row sources (CSV, Sheets values API)
//! - One-shot commands (refresh, annotate, check, hide-sold)
//! - Watch mode: scheduled refreshes plus live re-annotation of a page file

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use inventory_sync_core::{
    apply_settings, extract_stock_from_text, find_vin_in_text, format_last_sync,
    normalize_stock, set_hide_sold, DataSource, ItemIdentifiers, PageContext, Refresher,
    Request, Response, Settings, Store,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod config;
mod notify;
mod page;
mod source;
mod store;
mod watch;

use notify::LogNotifier;
use source::HttpRowSource;
use store::FileStore;

/// Inventory Sync - Mark sold inventory items using a published sheet
#[derive(Parser, Debug)]
#[command(name = "inventory-sync")]
#[command(about = "Mark sold vehicles on inventory pages from a shared sheet", long_about = None)]
#[command(version)]
struct Args {
    /// Path to settings file
    #[arg(short, long, value_name = "FILE", default_value = config::DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Directory holding the cache and hide flag
    #[arg(long, value_name = "DIR", default_value = ".inventory-sync", global = true)]
    state_dir: PathBuf,

    /// HTTP timeout in seconds
    #[arg(long, value_name = "SECS", default_value_t = 30, global = true)]
    timeout: u64,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch the sheet now and replace the cache
    Refresh {
        /// Print the response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show when the cache was last refreshed
    LastSync {
        /// Print the response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Turn hiding of sold items on or off
    HideSold {
        #[arg(value_parser = parse_switch, action = clap::ArgAction::Set)]
        value: bool,
    },

    /// Annotate an HTML page once
    Annotate {
        /// Page to annotate
        #[arg(short, long, value_name = "FILE")]
        page: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// Show the identifiers extracted from a piece of item text
    Check {
        text: String,
    },

    /// Create or show the settings file
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Refresh on a schedule and keep a page annotated
    Watch {
        /// Page to keep annotated
        #[arg(short, long, value_name = "FILE")]
        page: Option<PathBuf>,

        /// Output file (default: the page itself)
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,

        /// Stop after this many seconds
        #[arg(long = "for", value_name = "SECS")]
        run_for: Option<u64>,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    /// Write a settings file with defaults
    Init {
        /// Published CSV url (or local path)
        #[arg(long, value_name = "URL")]
        csv_url: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective settings
    Show,
}

fn parse_switch(value: &str) -> std::result::Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        other => Err(format!("expected on or off, got {:?}", other)),
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::debug!("Inventory Sync CLI v{}", env!("CARGO_PKG_VERSION"));
    log::debug!("Using core library v{}", inventory_sync_core::VERSION);

    let store = FileStore::new(&args.config, &args.state_dir);
    let timeout = Duration::from_secs(args.timeout.max(1));

    match &args.command {
        Command::Refresh { json } => refresh(&store, timeout, *json),
        Command::LastSync { json } => last_sync(&store, *json),
        Command::HideSold { value } => {
            set_hide_sold(&store, &LogNotifier, *value)?;
            println!("Hide sold: {}", if *value { "on" } else { "off" });
            Ok(())
        }
        Command::Annotate { page, out } => annotate(&store, page, out.as_deref()),
        Command::Check { text } => check(&store, text),
        Command::Settings { action } => match action {
            SettingsAction::Init { csv_url, force } => {
                init_settings(&store, csv_url.as_deref(), *force)
            }
            SettingsAction::Show => show_settings(&store),
        },
        Command::Watch { page, out, run_for } => {
            let options = watch::WatchOptions {
                page: page.clone(),
                out: out.clone(),
                run_for: run_for.map(Duration::from_secs),
                tick: Duration::from_millis(250),
            };
            watch::run(&store, HttpRowSource::new(timeout)?, &options)
        }
    }
}

fn refresh(store: &FileStore, timeout: Duration, json: bool) -> Result<()> {
    let refresher = Refresher::new(store, HttpRowSource::new(timeout)?, LogNotifier);
    let response = refresher.handle(Request::RefreshNow);
    if json {
        println!("{}", serde_json::to_string(&response)?);
        return Ok(());
    }
    match response {
        Response::Refresh(resp) if resp.success => {
            println!(
                "Refreshed {} rows at {}",
                resp.count.unwrap_or_default(),
                format_last_sync(resp.last_sync.unwrap_or_default())
            );
            Ok(())
        }
        Response::Refresh(resp) => Err(anyhow::anyhow!(
            "{}",
            resp.error.unwrap_or_else(|| "Refresh failed".to_string())
        )),
        Response::LastSync(_) => anyhow::bail!("Unexpected response to refresh request"),
    }
}

fn last_sync(store: &FileStore, json: bool) -> Result<()> {
    let millis = store.load_cache()?.last_sync_millis();
    if json {
        let response = Response::LastSync(inventory_sync_core::LastSyncResponse { last_sync: millis });
        println!("{}", serde_json::to_string(&response)?);
    } else {
        println!("Last sync: {}", format_last_sync(millis));
    }
    Ok(())
}

fn annotate(store: &FileStore, input: &Path, out: Option<&Path>) -> Result<()> {
    let mut ctx = PageContext::new(store.load_settings()?, store.load_cache()?, store.hide_sold()?)?;
    let mut doc = page::load_document(input)?;
    let summary = ctx.on_load(&mut doc);

    log::info!(
        "{} items, {} sold, {} without identifiers",
        summary.items,
        summary.sold,
        summary.unidentified
    );
    match out {
        Some(path) => page::write_document(path, &doc)?,
        None => print!("{}", inventory_sync_core::to_html(&doc)),
    }
    Ok(())
}

fn check(store: &FileStore, text: &str) -> Result<()> {
    let settings = store.load_settings()?;
    let ids = ItemIdentifiers {
        vin: find_vin_in_text(text),
        stock: normalize_stock(&extract_stock_from_text(text, &settings.heuristics)?),
    };
    let cache = store.load_cache()?;

    println!("VIN:   {}", display_or_dash(&ids.vin));
    println!("Stock: {}", display_or_dash(&ids.stock));
    if ids.is_empty() {
        println!("Sold:  unknown (no identifier found)");
    } else {
        println!("Sold:  {}", if cache.is_sold(&ids) { "yes" } else { "no" });
    }
    Ok(())
}

fn display_or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}

fn init_settings(store: &FileStore, csv_url: Option<&str>, force: bool) -> Result<()> {
    let path = store.config_path();
    if path.exists() && !force {
        anyhow::bail!("{:?} already exists (use --force to overwrite)", path);
    }
    let mut settings = Settings::default();
    if let Some(url) = csv_url {
        settings = settings.with_source(DataSource::Csv {
            url: url.to_string(),
        });
    }
    apply_settings(store, &LogNotifier, &settings)
        .with_context(|| format!("Failed to write settings to {:?}", path))?;
    println!("Wrote {:?}", path);
    Ok(())
}

fn show_settings(store: &FileStore) -> Result<()> {
    let settings = store.load_settings()?;
    print!("{}", config::render_config(&settings)?);
    println!("\n# effective hide_sold (state file wins): {}", store.hide_sold()?);
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
