//! HostCare: repair commands and event log triage for Windows hosts.
//!
//! Entry point: initialises structured logging, loads the configuration and
//! dispatches one subcommand. The process exit status reflects the outcome.

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{Local, Utc};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::Layer as _;

use hostcare::core::event_query::{generate, platform_event_source, ReportOptions};
use hostcare::core::log_entry::Level;
use hostcare::diag::health;
use hostcare::exec::{ByteDecoder, ProcessRunner};
use hostcare::export::csv_export::write_csv;
use hostcare::export::json_export::write_json;
use hostcare::export::text_report::{render_text, write_text};
use hostcare::export::{validate_export_path, ReportAnalysis};
use hostcare::tasks::dism::DismTask;
use hostcare::tasks::drivers::DriversTask;
use hostcare::tasks::network::NetworkResetTask;
use hostcare::tasks::sfc::SfcTask;
use hostcare::tasks::winupdate::WinUpdateTask;
use hostcare::tasks::{run_task, LogSink, RemediationTask, TaskContext};
use hostcare::util::cancel::CancelToken;
use hostcare::util::config::{app_data_dir, Settings};
use hostcare::util::constants;
use hostcare::util::elevation::is_elevated;
use hostcare::util::error::{HostCareError, Result};
use hostcare::util::time::days_ago;

/// Exit status for configuration and usage problems (sysexits `EX_CONFIG`).
const EXIT_CONFIG: u8 = 78;

#[derive(Parser, Debug)]
#[command(
    name = "HostCare",
    version,
    about = "Reparaciones de Windows y triage del registro de eventos",
    after_long_help = "Ejemplos:\n  HostCare sfc\n  HostCare win-update --deep\n  HostCare health\n  HostCare report --logs System,Application --days 7 --txt reporte.txt --csv reporte.csv"
)]
struct Cli {
    /// Archivo de configuración TOML
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Comprobador de archivos de sistema (sfc /scannow)
    Sfc,
    /// Reparación de la imagen de Windows (DISM /RestoreHealth)
    Dism,
    /// Reescaneo de dispositivos (pnputil /scan-devices)
    Drivers,
    /// Reinicio de los componentes de Windows Update
    WinUpdate {
        /// Ejecuta además diagnósticos DISM y muestra eventos recientes
        #[arg(long)]
        deep: bool,
    },
    /// Reinicio de la pila de red (DNS, Winsock, TCP/IP, DHCP)
    Network {
        /// Reinstala además los adaptadores (netcfg -d)
        #[arg(long)]
        deep: bool,
    },
    /// Reporte de triage del registro de eventos
    Report(ReportArgs),
    /// Chequeo rápido del equipo (sistema, memoria, discos y red)
    Health,
}

#[derive(Args, Debug)]
struct ReportArgs {
    /// Logs a consultar, separados por comas
    #[arg(long, value_delimiter = ',')]
    logs: Vec<String>,
    /// Niveles (critical, error, warning, information, verbose o 1-5)
    #[arg(long, value_delimiter = ',')]
    levels: Vec<String>,
    /// Días hacia atrás
    #[arg(long)]
    days: Option<u32>,
    /// Máximo de eventos en total
    #[arg(long)]
    max_events: Option<usize>,
    /// Incluye el mensaje completo en lugar del resumen de una línea
    #[arg(long)]
    full: bool,
    /// Escribe el reporte de texto en este archivo
    #[arg(long)]
    txt: Option<PathBuf>,
    /// Escribe la tabla CSV en este archivo
    #[arg(long)]
    csv: Option<PathBuf>,
    /// Escribe el análisis en JSON en este archivo
    #[arg(long)]
    json: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Dual-layer logging: stderr (env-controlled) + file (always debug).
    let log_dir = init_log_dir();
    init_logging(&log_dir);

    tracing::info!("{} v{} starting", constants::APP_NAME, constants::APP_VERSION);
    if let Some(dir) = &log_dir {
        tracing::info!("Log file: {}", dir.join(constants::LOG_FILE_NAME).display());
    }

    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let sink = LogSink::new(|line: &str| {
        println!("[{}] {line}", Local::now().format("%Y-%m-%d %H:%M:%S"));
    });
    let cancel = CancelToken::new();

    let task: Box<dyn RemediationTask> = match cli.command {
        Command::Sfc => Box::new(SfcTask),
        Command::Dism => Box::new(DismTask),
        Command::Drivers => Box::new(DriversTask::new()),
        Command::WinUpdate { deep } => Box::new(WinUpdateTask::new(deep)),
        Command::Network { deep } => Box::new(NetworkResetTask::new(deep)),
        Command::Health => {
            for line in health::collect().lines() {
                sink.line(&line);
            }
            return ExitCode::SUCCESS;
        }
        Command::Report(args) => {
            return match run_report(&args, &settings, &sink, &cancel) {
                Ok(()) => ExitCode::SUCCESS,
                Err(HostCareError::Cancelled) => ExitCode::from(130),
                Err(e @ HostCareError::InvalidOptions(_)) => {
                    eprintln!("{e}");
                    ExitCode::from(EXIT_CONFIG)
                }
                Err(e) => {
                    tracing::error!("Report failed: {}", e);
                    eprintln!("{e}");
                    ExitCode::FAILURE
                }
            };
        }
    };

    let runner = ProcessRunner::new(ByteDecoder::for_system());
    let ctx = TaskContext::new(&runner, &sink, &cancel, &settings);
    let outcome = run_task(task.as_ref(), is_elevated(), &ctx);

    println!("{}: {}", outcome.verdict, outcome.human_summary);
    ExitCode::from(outcome.verdict.process_exit_code())
}

fn run_report(
    args: &ReportArgs,
    settings: &Settings,
    sink: &LogSink,
    cancel: &CancelToken,
) -> Result<()> {
    let defaults = &settings.report;
    let log_names = if args.logs.is_empty() {
        defaults.logs.clone()
    } else {
        args.logs.clone()
    };
    let level_names = if args.levels.is_empty() {
        &defaults.levels
    } else {
        &args.levels
    };
    let levels = level_names
        .iter()
        .map(|s| s.parse::<Level>())
        .collect::<Result<Vec<_>>>()?;

    // Fail on an unwritable target before spending time on the query.
    for path in [&args.txt, &args.csv, &args.json].into_iter().flatten() {
        validate_export_path(path)?;
    }

    let now = Utc::now();
    let options = ReportOptions {
        log_names,
        levels,
        from_utc: days_ago(now, args.days.unwrap_or(defaults.days)),
        max_events: args.max_events.unwrap_or(defaults.max_events),
        include_full_message: args.full,
    };

    sink.line(&format!(
        "Reporte: consultando {} desde {}...",
        options.log_names.join(", "),
        options.from_utc.with_timezone(&Local).format("%Y-%m-%d %H:%M")
    ));
    let source = platform_event_source();
    let result = generate(source.as_ref(), &options, cancel, &mut |n| {
        tracing::debug!("Report progress: {} entries", n);
    })?;
    for warning in &result.warnings {
        sink.line(warning);
    }

    let analysis = ReportAnalysis::from_result(&result);
    sink.line(&format!(
        "Reporte: {} eventos en {} grupos ({} marcados como ACTIONABLE).",
        analysis.total_entries,
        analysis.groups.len(),
        analysis.actionable().count()
    ));

    let mut wrote_any = false;
    if let Some(path) = &args.txt {
        write_text(&analysis, &now, path)?;
        sink.line(&format!("Reporte de texto: {}", path.display()));
        wrote_any = true;
    }
    if let Some(path) = &args.csv {
        write_csv(&analysis, path)?;
        sink.line(&format!("CSV: {}", path.display()));
        wrote_any = true;
    }
    if let Some(path) = &args.json {
        write_json(&analysis, path)?;
        sink.line(&format!("JSON: {}", path.display()));
        wrote_any = true;
    }
    if !wrote_any {
        print!("{}", render_text(&analysis, &now));
    }
    Ok(())
}

/// Create the persistent log directory under `%LOCALAPPDATA%`.
///
/// Returns `Some(path)` to the log directory on success, `None` if the
/// directory cannot be created (logging falls back to stderr only).
fn init_log_dir() -> Option<PathBuf> {
    let log_dir = app_data_dir()?.join(constants::LOG_DIR);
    std::fs::create_dir_all(&log_dir).ok()?;

    let log_file = log_dir.join(constants::LOG_FILE_NAME);
    if let Ok(meta) = std::fs::metadata(&log_file) {
        if meta.len() > constants::MAX_LOG_FILE_SIZE {
            let backup = log_dir.join(format!("{}.old", constants::LOG_FILE_NAME));
            let _ = std::fs::rename(&log_file, &backup);
        }
    }

    Some(log_dir)
}

/// Initialise the dual-layer tracing subscriber.
///
/// - **stderr layer**: filtered by `RUST_LOG` env var (default: `info`).
/// - **file layer** (if `log_dir` is `Some`): always writes at `debug` level
///   to a persistent log file.
fn init_logging(log_dir: &Option<PathBuf>) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    if let Some(dir) = log_dir {
        let log_path = dir.join(constants::LOG_FILE_NAME);
        if let Ok(file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
        {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .with_filter(tracing_subscriber::EnvFilter::new("debug"));

            tracing_subscriber::registry()
                .with(stderr_layer.with_filter(env_filter))
                .with(file_layer)
                .init();
            return;
        }
    }

    tracing_subscriber::registry()
        .with(stderr_layer.with_filter(env_filter))
        .init();
}
