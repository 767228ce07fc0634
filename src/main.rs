use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use nxmodman::config::{Paths, SetLanguage};
use nxmodman::json_store::JsonFile;
use nxmodman::mods::{self, Operation, ProgressChannel, TransferEngine};
use nxmodman::task::AsyncTask;
use nxmodman::titles::{
    sort_titles, ControlData, NacpProvider, TitleIndex, TitleScanner,
};
use nxmodman::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "nxmodman")]
#[command(
    author,
    version = nxmodman::APP_VERSION,
    about = "Mod manager core for Atmosphere-based Switch homebrew"
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Filesystem root holding mods2/ and atmosphere/ (defaults to /)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Raw system language value (0-17)
    #[arg(long, default_value_t = 1)]
    lang: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan titles and print the catalogue
    Scan,

    /// List the mods of one title
    Mods {
        /// Slot directory name under mods2/
        slot: String,
    },

    /// Install a mod directory into the atmosphere overlay
    Install {
        /// Path of the mod directory
        path: PathBuf,
    },

    /// Remove a mod's files from the atmosphere overlay
    Uninstall {
        /// Path of the mod directory
        path: PathBuf,
    },
}

/// Stand-in for the on-console NS service: every query fails, so records
/// resolve from the cache file or fall back to slot names.
struct OfflineNs;

impl NacpProvider for OfflineNs {
    fn control_data(&self, title_id: u64) -> nxmodman::Result<ControlData> {
        Err(nxmodman::Error::NsQueryFailed(title_id))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "nxmodman=warn",
        1 => "nxmodman=info",
        2 => "nxmodman=debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let paths = match cli.root {
        Some(root) => Paths::with_root(root),
        None => Paths::new(),
    };
    let config = Config::new(paths, SetLanguage::from_raw(cli.lang));
    config.paths.ensure_layout()?;

    match cli.command {
        Commands::Scan => cmd_scan(&config),
        Commands::Mods { slot } => cmd_mods(&config, &slot),
        Commands::Install { path } => cmd_transfer(&config, &path, Operation::Install),
        Commands::Uninstall { path } => cmd_transfer(&config, &path, Operation::Uninstall),
    }
}

fn cmd_scan(config: &Config) -> Result<()> {
    let index = Arc::new(TitleIndex::new());
    let scanner = TitleScanner::new(config.clone(), OfflineNs);
    let worker_index = Arc::clone(&index);
    let task = AsyncTask::spawn(move |cancel| {
        scanner.scan(&worker_index, None, None, cancel);
    });
    task.get();

    let mut entries = index.entries.lock().unwrap().clone();
    sort_titles(&mut entries, config.strings.none_game);

    if entries.is_empty() {
        println!("no titles found under {}", config.paths.mods_root().display());
        return Ok(());
    }
    for record in &entries {
        println!(
            "{}  {:<32} {:<10} mods: {}",
            record.id,
            record.display_name,
            record.display_version,
            record.mod_count
        );
    }
    Ok(())
}

fn cmd_mods(config: &Config, slot: &str) -> Result<()> {
    let slot_dir = config.paths.slot_dir(slot);
    if !slot_dir.is_dir() {
        bail!("no such slot: {}", slot_dir.display());
    }

    // the single hex-named directory below the slot is the title root
    let title_root = std::fs::read_dir(&slot_dir)
        .with_context(|| format!("cannot open {}", slot_dir.display()))?
        .flatten()
        .map(|e| e.path())
        .find(|p| {
            p.is_dir()
                && p.file_name()
                    .map(|n| {
                        let n = n.to_string_lossy();
                        n.len() == 16 && n.chars().all(|c| c.is_ascii_hexdigit())
                    })
                    .unwrap_or(false)
        })
        .with_context(|| format!("{} has no title directory", slot_dir.display()))?;

    let overrides = JsonFile::new(title_root.join("mod_name.json"));
    let records = mods::scan_mods(&title_root, &overrides);
    for record in &records {
        println!(
            "{} {:<4} {}",
            if record.installed { "*" } else { " " },
            record.mod_type_tag.text(),
            record.display_name
        );
    }
    Ok(())
}

fn cmd_transfer(config: &Config, mod_dir: &std::path::Path, operation: Operation) -> Result<()> {
    if !mod_dir.is_dir() {
        bail!("not a mod directory: {}", mod_dir.display());
    }

    let progress = Arc::new(ProgressChannel::new());
    let started = Instant::now();

    let worker_config = config.clone();
    let worker_progress = Arc::clone(&progress);
    let worker_dir = mod_dir.to_path_buf();
    let mut task = AsyncTask::spawn(move |cancel| {
        let engine = TransferEngine::new(&worker_config, &worker_progress, cancel);
        let result = engine.run(&worker_dir, operation);
        worker_progress.finish(result.as_ref().err().map(|e| e.to_string()));
        result
    });

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
            .expect("static template"),
    );

    let mut seen_version = 0;
    let result = loop {
        if task.wait_for(Duration::from_millis(50)) {
            break task.try_get().expect("task reported ready");
        }
        let version = progress.version();
        if version != seen_version {
            seen_version = version;
            let snap = progress.snapshot();
            bar.set_length(snap.total_files as u64);
            bar.set_position(snap.files_done as u64);
            bar.set_message(snap.current_file);
        }
    };
    bar.finish_and_clear();

    match result {
        Ok(()) => {
            let flipped = mods::set_installed(mod_dir, operation == Operation::Install)?;
            println!("{}", config.strings.done_message(started.elapsed().as_secs_f64()));
            tracing::info!("mod directory now {}", flipped.display());
            Ok(())
        }
        Err(e) if e.is_cancelled() => {
            println!("{}", config.strings.cancelled);
            Ok(())
        }
        Err(e) => bail!("{e}"),
    }
}
