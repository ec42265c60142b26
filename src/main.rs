//! ftp-inventory - Resilient FTP Media Inventory and Redirect Generator
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use ftp_inventory::config::{
    timestamped_path, CliArgs, ReconcileConfig, RehashConfig, RunConfig, ScanConfig,
    INVENTORY_PREFIX,
};
use ftp_inventory::ftp::{FtpConnection, FtpConnectionBuilder, RemoteSession};
use ftp_inventory::hasher::{HashPass, HashRun};
use ftp_inventory::inventory::{self, FileDescriptor, Inventory, InventoryFormat};
use ftp_inventory::progress::{
    print_hash_summary, print_header, print_reconcile_summary, print_walk_summary,
    ProgressReporter,
};
use ftp_inventory::reconcile::{reconcile, save_mappings_csv, save_mappings_json};
use ftp_inventory::redirect::{self, EmitOutcome};
use ftp_inventory::walker::TreeWalker;
use ftp_inventory::{HashConfig, RemoteConfig};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    // Validate and create config (prompts for missing credentials on a terminal)
    let config = RunConfig::from_args(args, true).context("Invalid configuration")?;

    match config {
        RunConfig::Scan(config) => run_scan(config),
        RunConfig::Rehash(config) => run_rehash(config),
        RunConfig::Reconcile(config) => run_reconcile(config),
    }
}

/// Walk the remote tree, hash every file, save the inventory
fn run_scan(config: ScanConfig) -> Result<()> {
    let started_at = Utc::now();
    let stem = timestamped_path(&config.output_dir, INVENTORY_PREFIX, started_at, "");
    let checkpoint = checkpoint_path(&config.output_dir, started_at);

    if config.show_progress {
        print_header(
            "scan",
            &format!(
                "ftp://{}:{}{}",
                config.remote.host, config.remote.port, config.start_path
            ),
            &config.output_dir,
        );
    }

    let resume = config
        .resume
        .as_deref()
        .map(inventory::load)
        .transpose()
        .context("Failed to load resume inventory")?;
    if let Some(previous) = &resume {
        info!(
            "Resuming with {} previously hashed file(s)",
            previous.total_files() - previous.unhashed_count()
        );
    }

    let shutdown = install_shutdown_handler()?;
    let mut session = connect(&config.remote)?;

    // Phase 1: walk
    let spinner = config.show_progress.then(ProgressReporter::spinner);
    let mut walker = TreeWalker::new(&mut session).with_shutdown(Arc::clone(&shutdown));
    if let Some(p) = &spinner {
        p.set_status("Listing remote directories...");
        walker = walker.on_progress(|wp| p.update_walk(wp));
    }
    let walked = walker.walk(&config.start_path);
    if let Some(p) = &spinner {
        p.finish_and_clear();
    }
    let walked = walked.context("Walk failed")?;

    if config.show_progress {
        print_walk_summary(&walked.stats);
    }
    for skipped in &walked.skipped {
        warn!("Not inventoried: {}", skipped.path());
    }

    // Phase 2: hash
    let run = hash_files(
        &mut session,
        walked.files,
        &config.hash,
        resume.as_ref(),
        &shutdown,
        &checkpoint,
        started_at,
        config.show_progress,
    )?;
    session.disconnect();

    finish_run(
        run,
        &stem,
        &checkpoint,
        &config.formats,
        config.show_progress,
        "scan --resume",
    )
}

/// Re-hash only the unhashed files of an existing inventory
fn run_rehash(config: RehashConfig) -> Result<()> {
    let started_at = Utc::now();
    let stem = timestamped_path(&config.output_dir, INVENTORY_PREFIX, started_at, "");
    let checkpoint = checkpoint_path(&config.output_dir, started_at);

    let input = inventory::load(&config.input)
        .with_context(|| format!("Failed to load inventory {}", config.input.display()))?;
    let pending = input.unhashed_count();

    if pending == 0 {
        println!(
            "All {} file(s) in {} already have a digest; nothing to rehash.",
            input.total_files(),
            config.input.display()
        );
        return Ok(());
    }

    if config.show_progress {
        print_header(
            "rehash",
            &format!(
                "ftp://{}:{} ({} of {} files)",
                config.remote.host,
                config.remote.port,
                pending,
                input.total_files()
            ),
            &config.output_dir,
        );
    }

    let shutdown = install_shutdown_handler()?;
    let mut session = connect(&config.remote)?;

    let run = hash_files(
        &mut session,
        input.into_files(),
        &config.hash,
        None,
        &shutdown,
        &checkpoint,
        started_at,
        config.show_progress,
    )?;
    session.disconnect();

    finish_run(
        run,
        &stem,
        &checkpoint,
        &config.formats,
        config.show_progress,
        "rehash",
    )
}

/// Compare two inventories and write mappings and redirect rules
fn run_reconcile(config: ReconcileConfig) -> Result<()> {
    let generated_at = Utc::now();

    let before = inventory::load(&config.before)
        .with_context(|| format!("Failed to load BEFORE inventory {}", config.before.display()))?;
    let after = inventory::load(&config.after)
        .with_context(|| format!("Failed to load AFTER inventory {}", config.after.display()))?;
    info!(
        "Loaded BEFORE ({} files) and AFTER ({} files)",
        before.total_files(),
        after.total_files()
    );

    let result = reconcile(&before, &after, config.base_url.as_deref());
    if config.show_progress {
        print_reconcile_summary(&result.summary, &result.events);
    }

    if result.events.is_empty() {
        info!("No files were moved or renamed; nothing to emit");
        return Ok(());
    }

    let mut written: Vec<PathBuf> = Vec::new();

    if config.write_mappings {
        let csv_path = timestamped_path(&config.output_dir, "url_mappings", generated_at, ".csv");
        if let EmitOutcome::Written { .. } = save_mappings_csv(&result.events, &csv_path)
            .context("Failed to write CSV mappings")?
        {
            written.push(csv_path);
        }

        let json_path = timestamped_path(&config.output_dir, "url_mappings", generated_at, ".json");
        if let EmitOutcome::Written { .. } = save_mappings_json(
            &result.events,
            config.base_url.as_deref(),
            generated_at,
            &json_path,
        )
        .context("Failed to write JSON mappings")?
        {
            written.push(json_path);
        }
    }

    for dialect in &config.dialects {
        let path = timestamped_path(
            &config.output_dir,
            "redirects",
            generated_at,
            &format!(".{}", dialect.extension()),
        );
        match redirect::emit(&result.events, *dialect, generated_at, &path)
            .with_context(|| format!("Failed to write {} redirects", dialect.name()))?
        {
            EmitOutcome::Written { rules } => {
                info!("{} {} redirect(s) saved", rules, dialect.name());
                written.push(path);
            }
            EmitOutcome::NothingToEmit => {}
        }
    }

    for path in &written {
        println!("Saved {}", path.display());
    }

    Ok(())
}

fn connect(remote: &RemoteConfig) -> Result<FtpConnection> {
    let session = FtpConnectionBuilder::new(remote.clone())
        .connect()
        .with_context(|| format!("Failed to connect to {}:{}", remote.host, remote.port))?;
    info!("Connected to {}", session.endpoint());
    Ok(session)
}

#[allow(clippy::too_many_arguments)]
fn hash_files(
    session: &mut FtpConnection,
    files: Vec<FileDescriptor>,
    hash: &HashConfig,
    resume: Option<&Inventory>,
    shutdown: &Arc<AtomicBool>,
    checkpoint: &Path,
    started_at: DateTime<Utc>,
    show_progress: bool,
) -> Result<HashRun> {
    let bar = show_progress.then(|| ProgressReporter::bar(files.len() as u64));

    let mut pass = HashPass::new(session, hash.clone())
        .with_shutdown(Arc::clone(shutdown))
        .with_checkpoint(checkpoint.to_path_buf())
        .generated_at(started_at);
    if let Some(previous) = resume {
        pass = pass.resume_from(previous);
    }
    if let Some(b) = &bar {
        pass = pass.on_progress(|hp| b.update_hash(hp));
    }

    let run = pass.run(files);

    if let Some(b) = &bar {
        match &run {
            Ok(r) if r.summary.completed => b.finish("Hashing completed"),
            Ok(_) => b.finish("Hashing interrupted"),
            Err(_) => b.finish_and_clear(),
        }
    }

    run.context("Hash pass failed")
}

/// Save the final inventory, or point at the checkpoint when interrupted
fn finish_run(
    run: HashRun,
    stem: &Path,
    checkpoint: &Path,
    formats: &[InventoryFormat],
    show_progress: bool,
    resume_command: &str,
) -> Result<()> {
    if !run.summary.completed {
        if show_progress {
            print_hash_summary(&run.summary, &[checkpoint]);
        }
        info!(
            "Run interrupted; continue with: ftp-inventory {} {}",
            resume_command,
            checkpoint.display()
        );
        return Ok(());
    }

    let written = inventory::save_all(&run.inventory, stem, formats)
        .context("Failed to save inventory")?;

    if checkpoint.exists() {
        if let Err(e) = std::fs::remove_file(checkpoint) {
            warn!("Could not remove checkpoint {}: {}", checkpoint.display(), e);
        }
    }

    if show_progress {
        let paths: Vec<&Path> = written.iter().map(PathBuf::as_path).collect();
        print_hash_summary(&run.summary, &paths);
    } else {
        info!(
            hashed = run.summary.hashed,
            carried_over = run.summary.carried_over,
            errored = run.summary.errored,
            "Inventory saved to {}",
            stem.display()
        );
    }

    let remaining = run.inventory.unhashed_count();
    if remaining > 0 {
        if let Some(first) = written.first() {
            warn!(
                "{} file(s) could not be hashed; retry them with: ftp-inventory rehash {}",
                remaining,
                first.display()
            );
        }
    }

    Ok(())
}

fn checkpoint_path(dir: &Path, started_at: DateTime<Utc>) -> PathBuf {
    timestamped_path(
        dir,
        INVENTORY_PREFIX,
        started_at,
        &format!(".checkpoint.{}", InventoryFormat::Json.extension()),
    )
}

/// Setup signal handler for graceful shutdown
fn install_shutdown_handler() -> Result<Arc<AtomicBool>> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, saving checkpoint...");
        flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;
    Ok(shutdown)
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("ftp_inventory=debug,warn")
    } else {
        EnvFilter::new("ftp_inventory=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
