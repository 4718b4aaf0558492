use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use contract_harvest::api::ApiBackend;
use contract_harvest::backend::RetrievalBackend;
use contract_harvest::browser::BrowserBackend;
use contract_harvest::checkpoint::{Checkpoint, resume_after};
use contract_harvest::config::{ConfigLoader, ResolvedConfig};
use contract_harvest::controller::{BatchController, ProgressSink};
use contract_harvest::domain::BackendKind;
use contract_harvest::error::HarvestError;
use contract_harvest::ids::IdSource;
use contract_harvest::output::{JsonOutput, OutputMode};
use contract_harvest::pacing::{CancelFlag, ThreadSleeper};
use contract_harvest::report::BatchReport;
use contract_harvest::sink::PersistenceSink;
use contract_harvest::tui::Tui;

#[derive(Parser)]
#[command(name = "contract-harvest")]
#[command(about = "Paced bulk retrieval of contract documents and metadata by ID")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Retrieve every contract listed in an ID file")]
    Run(RunArgs),
    #[command(about = "Check an ID file without retrieving anything")]
    Ids(IdsArgs),
}

#[derive(Args)]
struct RunArgs {
    #[arg(long)]
    ids: PathBuf,

    #[arg(long, value_enum, default_value_t = BackendKind::Api)]
    backend: BackendKind,

    #[arg(long)]
    config: Option<String>,

    /// Skip identifiers up to and including the last checkpointed one.
    #[arg(long)]
    resume: bool,

    #[arg(long)]
    no_archive: bool,
}

#[derive(Args)]
struct IdsArgs {
    file: PathBuf,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<HarvestError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &HarvestError) -> u8 {
    match error {
        HarvestError::InvalidContractId(_)
        | HarvestError::ConfigRead(_)
        | HarvestError::ConfigParse(_)
        | HarvestError::IdSourceRead(_)
        | HarvestError::ResumeWithoutCheckpoint => 2,
        HarvestError::ApiHttp(_)
        | HarvestError::ApiStatus { .. }
        | HarvestError::Browser(_)
        | HarvestError::BrowserTimeout(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    match cli.command {
        Commands::Run(args) => run_batch(args, output_mode),
        Commands::Ids(args) => run_ids(args, output_mode),
    }
}

fn run_ids(args: IdsArgs, output_mode: OutputMode) -> miette::Result<()> {
    let list = IdSource::from_path(&args.file).map_err(miette::Report::new)?;
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_ids(&list).into_diagnostic(),
        OutputMode::Interactive => {
            println!("accepted: {}", list.accepted.len());
            println!("rejected: {}", list.rejected);
            Ok(())
        }
    }
}

fn run_batch(args: RunArgs, output_mode: OutputMode) -> miette::Result<()> {
    let RunArgs {
        ids,
        backend,
        config,
        resume,
        no_archive,
    } = args;

    let config = ConfigLoader::resolve(config.as_deref()).map_err(miette::Report::new)?;
    let list = IdSource::from_path(&ids).map_err(miette::Report::new)?;
    tracing::info!(
        accepted = list.accepted.len(),
        rejected = list.rejected,
        "identifiers loaded"
    );

    let checkpoint = config.output.checkpoint.clone().map(Checkpoint::new);
    let mut ids = list.accepted;
    if resume {
        let checkpoint = checkpoint
            .as_ref()
            .ok_or(HarvestError::ResumeWithoutCheckpoint)
            .map_err(miette::Report::new)?;
        let last = checkpoint.load();
        ids = resume_after(&ids, last.as_ref()).to_vec();
        tracing::info!(remaining = ids.len(), last = ?last, "resuming");
    }

    let cancel = CancelFlag::new();
    install_interrupt_handler(cancel.clone());

    let worker_cancel = cancel.clone();
    let job = move |progress: &dyn ProgressSink| -> Result<BatchReport, HarvestError> {
        let sink = PersistenceSink::new(config.output.clone())?;
        let retrieval = open_backend(backend, &config)?;
        let controller =
            BatchController::new(retrieval, sink, config.pacing.clone(), ThreadSleeper::new())
                .with_ceiling_factor(config.ceiling_factor)
                .with_checkpoint(checkpoint)
                .with_archive(!no_archive);
        Ok(controller.run(&ids, progress, &worker_cancel))
    };

    match output_mode {
        OutputMode::NonInteractive => {
            let report = job(&JsonOutput).map_err(miette::Report::new)?;
            eprint!("{}", report.dashboard());
            JsonOutput::print_report(&report).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            let mut tui = Tui::new(backend, cancel);
            let report = tui.run(job)?;
            print_batch_summary(&report);
        }
    }
    Ok(())
}

fn open_backend(
    kind: BackendKind,
    config: &ResolvedConfig,
) -> Result<Box<dyn RetrievalBackend>, HarvestError> {
    Ok(match kind {
        BackendKind::Api => Box::new(ApiBackend::new(&config.api)?),
        BackendKind::Browser => Box::new(BrowserBackend::launch(config.browser.clone())?),
    })
}

/// Ctrl-C flips the cancel flag; the run then winds down and still writes its results.
fn install_interrupt_handler(cancel: CancelFlag) {
    let spawned = thread::Builder::new()
        .name("harvest-signal".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    tracing::warn!(error = %err, "interrupt handler unavailable");
                    return;
                }
            };
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("interrupt received, finishing current attempt");
                    cancel.cancel();
                }
            });
        });
    if let Err(err) = spawned {
        tracing::warn!(error = %err, "interrupt handler unavailable");
    }
}

fn print_batch_summary(report: &BatchReport) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let red = "\x1b[31m";
    let reset = "\x1b[0m";

    let status = match report.aborted {
        Some(reason) => format!("{yellow}aborted: {}{reset}", reason.label()),
        None => format!("{green}complete{reset}"),
    };
    println!("{cyan}contract-harvest summary{reset} ({status})");
    println!(
        "{green}Retrieved: {}{reset} of {} ({} attempts, {} retries)",
        report.success, report.total, report.attempts, report.retried
    );
    println!("{yellow}Skipped: {}{reset}", report.skipped);
    println!("{red}Still failing: {}{reset}", report.still_failing.len());

    for info in &report.still_failing {
        println!("{red}  {} [{}] {}{reset}", info.id, info.status, info.message);
    }
    if let Some(path) = &report.failure_log {
        println!("{red}Failure log: {path}{reset}");
    }
    match (&report.archive, &report.archive_error) {
        (Some(path), _) => println!("{cyan}Archive: {path}{reset}"),
        (None, Some(err)) => println!("{red}Archive failed: {err}{reset}"),
        (None, None) => {}
    }
    for err in &report.persistence_errors {
        println!("{red}Write error: {err}{reset}");
    }
}
