use clap::{Parser, Subcommand};
use redirect_doctor_core::config::{RevisionControlProvider, Settings};
use redirect_doctor_core::dispatch::CommandDispatcher;
use redirect_doctor_core::fixer::{BatchReport, FixOptions, RedirectFixer};
use redirect_doctor_core::logging::init_logging;
use redirect_doctor_core::progress::ConsoleProgress;
use redirect_doctor_core::selection::{CombinedSelection, ConfigScan, ExplicitSelection};
use redirect_doctor_core::{vcs, DoctorError};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "redirect-doctor",
    about = "Deduplicate assembly binding redirects in web.config and app.config files"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the data directory (settings and logs)
    #[arg(long, default_value = ".redirect-doctor", global = true)]
    data_dir: PathBuf,

    /// Settings file [default: <data-dir>/settings.json]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge duplicate binding redirects (backs up every file to <file>.bak first)
    Fix {
        /// Config files to fix
        paths: Vec<PathBuf>,
        /// Also fix every matching config file under this directory
        #[arg(long)]
        scan: Option<PathBuf>,
        /// How deep --scan descends
        #[arg(long, default_value_t = ConfigScan::DEFAULT_MAX_DEPTH)]
        max_depth: usize,
        /// Report what would change without writing anything
        #[arg(long)]
        dry_run: bool,
        /// Print the batch report as JSON
        #[arg(long)]
        json: bool,
        /// Files processed at once [default: from settings]
        #[arg(short, long)]
        jobs: Option<usize>,
    },
    /// Write a default settings file
    Init {
        /// Overwrite an existing file without asking
        #[arg(long)]
        force: bool,
    },
    /// Show the effective configuration
    Status,
}

fn settings_path(cli: &Cli) -> PathBuf {
    cli.config
        .clone()
        .unwrap_or_else(|| cli.data_dir.join("settings.json"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Fix {
            paths,
            scan,
            max_depth,
            dry_run,
            json,
            jobs,
        } => {
            let request = FixRequest {
                paths: paths.clone(),
                scan: scan.clone(),
                max_depth: *max_depth,
                dry_run: *dry_run,
                json: *json,
                jobs: *jobs,
            };
            cmd_fix(&cli, request).await
        }
        Commands::Init { force } => cmd_init(&cli, *force),
        Commands::Status => cmd_status(&cli),
    }
}

struct FixRequest {
    paths: Vec<PathBuf>,
    scan: Option<PathBuf>,
    max_depth: usize,
    dry_run: bool,
    json: bool,
    jobs: Option<usize>,
}

async fn cmd_fix(cli: &Cli, request: FixRequest) -> anyhow::Result<()> {
    let settings = Settings::load_or_default(&settings_path(cli))?;

    let filter = if cli.verbose {
        "debug"
    } else {
        settings.logging.filter.as_str()
    };
    let guard = init_logging(&cli.data_dir.join(&settings.logging.directory), filter)?;

    let cwd = std::env::current_dir()?;
    let absolute = |p: &Path| -> PathBuf {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            cwd.join(p)
        }
    };

    let mut selection = CombinedSelection::new().with(ExplicitSelection::new(
        request.paths.iter().map(|p| absolute(p.as_path())).collect(),
    ));
    if let Some(root) = &request.scan {
        selection = selection.with(
            ConfigScan::new(absolute(root.as_path()), settings.files.patterns.clone())
                .with_max_depth(request.max_depth),
        );
    }

    let mut fixer = RedirectFixer::new(
        &settings,
        vcs::from_settings(&settings.revision_control),
        Arc::new(ConsoleProgress::new()),
    );
    if let Some(jobs) = request.jobs {
        fixer = fixer.with_parallelism(jobs);
    }

    let dispatcher = CommandDispatcher::new(Arc::new(fixer), Arc::new(selection));
    let invocation = dispatcher.trigger(FixOptions {
        dry_run: request.dry_run,
    })?;
    tracing::debug!(invocation = %invocation.id, "Fix triggered");

    let ok = match invocation.wait().await {
        Ok(report) => {
            if request.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
            report.succeeded()
        }
        Err(DoctorError::NoFilesSelected) => false,
        Err(e) => return Err(e.into()),
    };

    // Flush the log file before a non-zero exit skips destructors.
    drop(guard);
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

fn print_report(report: &BatchReport) {
    println!();
    for file in &report.files {
        let outcome = if report.dry_run {
            "dry run"
        } else if file.written {
            "updated"
        } else {
            "already clean"
        };
        println!(
            "  {}: {} bindings before, {} after ({})",
            file.path.display(),
            file.merge.before,
            file.merge.after,
            outcome
        );
        for resolution in &file.merge.resolutions {
            let verb = if resolution.updated { "updated" } else { "kept" };
            println!(
                "    {} {} {} (dropped {})",
                resolution.name, verb, resolution.kept, resolution.discarded
            );
        }
    }
    for failure in &report.failures {
        println!("  {}: FAILED: {}", failure.path.display(), failure.message);
    }
    println!();
    println!(
        "{} file(s) processed, {} failed in {} ms",
        report.files.len() + report.failures.len(),
        report.failures.len(),
        (report.finished_at - report.started_at).num_milliseconds()
    );
}

fn cmd_init(cli: &Cli, force: bool) -> anyhow::Result<()> {
    let path = settings_path(cli);

    if path.exists()
        && !force
        && !dialoguer::Confirm::new()
            .with_prompt(format!("Overwrite existing settings at {}?", path.display()))
            .default(false)
            .interact()?
    {
        println!("Settings left unchanged.");
        return Ok(());
    }

    Settings::default().save(&path)?;

    println!();
    println!("Configuration saved to {}", path.display());
    println!();
    println!("Fix a file with: redirect-doctor fix path/to/Web.config");
    println!("Fix a solution:  redirect-doctor fix --scan path/to/solution");
    println!();

    Ok(())
}

fn cmd_status(cli: &Cli) -> anyhow::Result<()> {
    println!("Redirect Doctor Status");
    println!("======================");
    println!();

    let path = settings_path(cli);
    let settings = if path.exists() {
        println!("Configuration: {}", path.display());
        Settings::load(&path)?
    } else {
        println!("Configuration: Not found, using defaults");
        println!("  Run 'redirect-doctor init' to create one");
        Settings::default()
    };

    println!("  File patterns: {:?}", settings.files.patterns);
    println!("  Backup extension: .{}", settings.files.backup_extension);
    println!(
        "  Parallelism: {}",
        settings.batch.effective_parallelism()
    );
    match settings.revision_control.provider {
        RevisionControlProvider::None => println!("  Revision control: none"),
        RevisionControlProvider::Git => println!("  Revision control: git"),
        RevisionControlProvider::Command => {
            println!("  Revision control: command");
            println!("    status: {:?}", settings.revision_control.status_command);
            println!("    checkout: {:?}", settings.revision_control.checkout_command);
        }
    }
    println!(
        "  Log file: {}",
        cli.data_dir
            .join(&settings.logging.directory)
            .join(redirect_doctor_core::logging::LOG_FILE_NAME)
            .display()
    );

    Ok(())
}
