use anyhow::{bail, Context, Result};
use clap::Parser;
use leadsplit::{
    config::Config,
    process::clean::CleaningPolicy,
    queue::{Orchestrator, ProgressEvent},
};
use std::{
    io::{self, BufRead},
    path::PathBuf,
    sync::Arc,
    thread,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Split lead spreadsheets by country and archive CRM-ready exports"
)]
struct Args {
    /// Spreadsheet exports (.xlsx, .xls, .ods, .csv, .tsv, .txt) or .zip bundles of them
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Archive destination (defaults to each input's directory)
    #[arg(short, long)]
    dest: Option<PathBuf>,

    /// Split files at or above this many MiB before archiving
    #[arg(long)]
    split_mb: Option<u64>,

    /// Worker threads per stage
    #[arg(short, long)]
    workers: Option<usize>,

    #[arg(long, value_enum)]
    cleaning: Option<CleaningPolicy>,

    /// Parent directory for temporary working directories
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Print progress events as JSON lines
    #[arg(long)]
    json: bool,

    /// Read pause / resume / stop / status commands from stdin
    #[arg(short, long)]
    interactive: bool,
}

fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(dest) = args.dest.clone() {
        config.destination = Some(dest);
    }
    if let Some(mb) = args.split_mb {
        config.split_threshold_mb = mb;
    }
    if let Some(workers) = args.workers {
        config.workers = Some(workers);
    }
    if let Some(policy) = args.cleaning {
        config.cleaning = policy;
    }
    if let Some(work_dir) = args.work_dir.clone() {
        config.work_root = Some(work_dir);
    }
    let settings = config.resolve()?;
    std::fs::create_dir_all(&settings.work_root)
        .with_context(|| format!("creating work dir {}", settings.work_root.display()))?;
    info!(
        workers = settings.workers,
        split_threshold = settings.split_threshold,
        cleaning = ?settings.cleaning,
        "startup"
    );

    let (orchestrator, events) = Orchestrator::with_events(settings);
    let orchestrator = Arc::new(orchestrator);

    let mut queued = 0;
    for input in &args.inputs {
        match orchestrator.enqueue(input) {
            Ok(n) => queued += n,
            Err(e) => error!(input = %input.display(), error = %e, "cannot queue input"),
        }
    }
    if queued == 0 {
        bail!("nothing to process");
    }

    if args.interactive {
        let control = Arc::clone(&orchestrator);
        thread::Builder::new()
            .name("stdin-control".to_string())
            .spawn(move || read_commands(&control))
            .context("spawning stdin reader")?;
    }

    orchestrator.start()?;
    for event in events.iter() {
        print_event(&event, args.json)?;
        if !orchestrator.snapshot().running {
            break;
        }
    }
    orchestrator.wait();
    for event in events.try_iter() {
        print_event(&event, args.json)?;
    }

    let snapshot = orchestrator.snapshot();
    info!(
        completed = snapshot.completed,
        failed = snapshot.failed,
        status = %snapshot.status,
        "finished"
    );
    if snapshot.failed > 0 {
        bail!("{} of {} job(s) failed", snapshot.failed, queued);
    }
    Ok(())
}

fn print_event(event: &ProgressEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }
    match (&event.job, event.stage) {
        (Some(job), Some(stage)) => {
            println!("[{:>3}%] {job} {stage}: {}", event.percent, event.status)
        }
        _ => println!("{}", event.status),
    }
    Ok(())
}

fn read_commands(orchestrator: &Orchestrator) {
    for line in io::stdin().lock().lines() {
        let Ok(line) = line else {
            break;
        };
        match line.trim() {
            "" => {}
            "pause" | "p" => orchestrator.pause(),
            "resume" | "r" => orchestrator.resume(),
            "stop" | "s" => {
                orchestrator.stop();
                break;
            }
            "status" => match serde_json::to_string_pretty(&orchestrator.snapshot()) {
                Ok(text) => eprintln!("{text}"),
                Err(e) => warn!(error = %e, "cannot render status"),
            },
            other => warn!(command = other, "unknown command (pause, resume, stop, status)"),
        }
    }
}
