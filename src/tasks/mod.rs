//! Remediation tasks.
//!
//! Every repair tool (integrity scan, image repair, driver rescan,
//! update-stack reset, network-stack reset) is a [`RemediationTask`]: a
//! scripted sequence of command runs that ends in a [`TaskReport`].
//! [`run_task`] wraps any task with the shared lifecycle: the elevation
//! pre-check, the heartbeat, cancellation and panic containment, wall-clock
//! timing and the single closing summary line.

pub mod dism;
pub mod drivers;
pub mod heartbeat;
pub mod network;
pub mod output;
pub mod sfc;
pub mod winupdate;

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::exec::classifier::{classify, Classification};
use crate::exec::executor::{CommandResult, CommandRunner, CommandSpec};
use crate::tasks::heartbeat::Heartbeat;
use crate::tasks::output::{clean_output, trim_lines};
use crate::util::cancel::CancelToken;
use crate::util::config::Settings;
use crate::util::constants::*;
use crate::util::error::{HostCareError, Result};
use crate::util::time::format_duration;

/// Terminal state of a remediation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Verdict {
    Ok,
    OkRebootRequired,
    PartialWarning,
    NotElevated,
    Canceled,
    CommandError,
    Exception,
}

impl Verdict {
    /// Short Spanish label for status lines.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ok => "Correcto",
            Self::OkRebootRequired => "Correcto (requiere reinicio)",
            Self::PartialWarning => "Completado con advertencias",
            Self::NotElevated => "Sin permisos de Administrador",
            Self::Canceled => "Cancelado",
            Self::CommandError => "Error del comando",
            Self::Exception => "Error inesperado",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Ok | Self::OkRebootRequired)
    }

    /// Exit status the command-line front end reports for this verdict.
    pub fn process_exit_code(&self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::CommandError => 1,
            Self::PartialWarning => 2,
            Self::OkRebootRequired => 3,
            Self::NotElevated => 4,
            Self::Exception => 70,
            Self::Canceled => 130,
        }
    }

    /// Default mapping from a classified command result.
    pub fn from_classification(class: Classification) -> Self {
        match class {
            Classification::Ok => Self::Ok,
            Classification::Partial => Self::PartialWarning,
            Classification::Critical => Self::CommandError,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of one task invocation. Never mutated after [`run_task`] returns.
#[derive(Debug, Clone, Serialize)]
pub struct RemediationOutcome {
    pub verdict: Verdict,
    pub exit_code: i32,
    pub duration: Duration,
    pub human_summary: String,
    pub raw_stdout: String,
    pub raw_stderr: String,
}

/// What a task body hands back to [`run_task`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub verdict: Verdict,
    pub exit_code: i32,
    pub summary: String,
    pub stdout: String,
    pub stderr: String,
}

impl TaskReport {
    pub fn new(verdict: Verdict, exit_code: i32, summary: impl Into<String>) -> Self {
        Self {
            verdict,
            exit_code,
            summary: summary.into(),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// Report carrying the exit code and raw output of `result`.
    pub fn from_result(verdict: Verdict, summary: impl Into<String>, result: &CommandResult) -> Self {
        Self {
            verdict,
            exit_code: result.exit_code,
            summary: summary.into(),
            stdout: result.stdout.clone(),
            stderr: result.stderr.clone(),
        }
    }
}

/// Line-oriented progress callback.
///
/// Cheap to clone and safe to call from any thread. A panicking callback is
/// contained and never unwinds into the task. Every line is also mirrored to
/// `tracing` at debug level.
#[derive(Clone)]
pub struct LogSink {
    callback: Arc<dyn Fn(&str) + Send + Sync>,
}

impl LogSink {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// A sink that only mirrors to `tracing`.
    pub fn silent() -> Self {
        Self::new(|_| {})
    }

    pub fn line(&self, line: &str) {
        tracing::debug!(target: "hostcare::task", "{}", line);
        let callback = &self.callback;
        if panic::catch_unwind(AssertUnwindSafe(|| callback(line))).is_err() {
            tracing::warn!("Log callback panicked; line dropped");
        }
    }
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink").finish_non_exhaustive()
    }
}

/// Everything a task body needs: the command runner, the progress sink,
/// the cancellation token and the configured timeouts.
pub struct TaskContext<'a> {
    pub runner: &'a dyn CommandRunner,
    pub log: &'a LogSink,
    pub cancel: &'a CancelToken,
    pub settings: &'a Settings,
}

impl<'a> TaskContext<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        log: &'a LogSink,
        cancel: &'a CancelToken,
        settings: &'a Settings,
    ) -> Self {
        Self {
            runner,
            log,
            cancel,
            settings,
        }
    }

    pub fn log(&self, line: impl AsRef<str>) {
        self.log.line(line.as_ref());
    }

    /// Run `spec` without logging it.
    ///
    /// # Errors
    /// [`HostCareError::Cancelled`] if cancellation was requested before or
    /// during the run.
    pub fn run_quiet(&self, spec: &CommandSpec) -> Result<CommandResult> {
        self.cancel.check()?;
        tracing::debug!("Running {}", spec);
        let result = self.runner.run(spec, self.cancel);
        if result.canceled {
            return Err(HostCareError::Cancelled);
        }
        Ok(result)
    }

    /// Run `spec` as a titled step: logs the header, the command line, the
    /// exit code and the cleaned output (at most
    /// [`MAX_LOGGED_OUTPUT_LINES`] lines per stream).
    pub fn run_step(&self, title: &str, spec: &CommandSpec) -> Result<CommandResult> {
        self.cancel.check()?;
        self.log(format!("---- {title} ----"));
        self.log(format!("Ejecutando: {spec}"));

        let result = self.runner.run(spec, self.cancel);

        self.log(format!("ExitCode: {}", result.exit_code));
        for stream in [&result.stdout, &result.stderr] {
            let cleaned = trim_lines(&clean_output(stream), MAX_LOGGED_OUTPUT_LINES);
            if !cleaned.trim().is_empty() {
                self.log(cleaned.trim_end());
            }
        }
        self.log("----------------------------");

        if result.canceled {
            return Err(HostCareError::Cancelled);
        }
        Ok(result)
    }

    /// Best-effort `net stop`: a failure is logged and the sequence goes on.
    pub fn stop_service(&self, name: &str) -> Result<CommandResult> {
        self.service_step("stop", name)
    }

    /// Best-effort `net start`: a failure is logged and the sequence goes on.
    pub fn start_service(&self, name: &str) -> Result<CommandResult> {
        self.service_step("start", name)
    }

    fn service_step(&self, verb: &str, name: &str) -> Result<CommandResult> {
        let spec = CommandSpec::new("net.exe", [verb, name], self.settings.timeouts.service());
        let result = self.run_step(&format!("net {verb} {name}"), &spec)?;
        if classify(&result) != Classification::Ok {
            tracing::warn!("net {} {} exited with {}", verb, name, result.exit_code);
            self.log(format!(
                "Aviso: 'net {verb} {name}' terminó con código {}. Se continúa.",
                result.exit_code
            ));
        }
        Ok(result)
    }
}

/// A scripted remediation.
pub trait RemediationTask {
    /// Name used as the prefix of progress lines (e.g. `"SFC"`).
    fn label(&self) -> &str;

    /// Execute the task body. Only called when the process is elevated.
    ///
    /// # Errors
    /// [`HostCareError::Cancelled`] becomes [`Verdict::Canceled`]; any other
    /// error becomes [`Verdict::Exception`].
    fn run(&self, ctx: &TaskContext<'_>) -> Result<TaskReport>;
}

/// Drive `task` through its lifecycle and produce exactly one outcome.
///
/// Without elevation no command is run. Otherwise a heartbeat line is logged
/// on the configured interval while the body runs; errors and panics are
/// converted into terminal verdicts. The duration is always filled in and a
/// single closing summary line is logged.
pub fn run_task(task: &dyn RemediationTask, elevated: bool, ctx: &TaskContext<'_>) -> RemediationOutcome {
    let start = Instant::now();
    let label = task.label();

    let report = if !elevated {
        TaskReport::new(
            Verdict::NotElevated,
            EXIT_NOT_ELEVATED,
            format!("{label} requiere permisos de Administrador."),
        )
    } else {
        let _heartbeat = match ctx.settings.heartbeat_interval() {
            Some(interval) => Heartbeat::start(interval, label, ctx.log.clone()),
            None => Heartbeat::disabled(),
        };

        match panic::catch_unwind(AssertUnwindSafe(|| task.run(ctx))) {
            Ok(Ok(report)) => report,
            Ok(Err(HostCareError::Cancelled)) => TaskReport::new(
                Verdict::Canceled,
                EXIT_CANCELED,
                "Operación cancelada por el usuario.",
            ),
            Ok(Err(e)) => {
                tracing::error!("{} failed: {}", label, e);
                let mut report = TaskReport::new(
                    Verdict::Exception,
                    EXIT_EXCEPTION,
                    format!("Falló por excepción: {e}. Revisa el log."),
                );
                report.stderr = e.to_string();
                report
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!("{} panicked: {}", label, message);
                let mut report = TaskReport::new(
                    Verdict::Exception,
                    EXIT_EXCEPTION,
                    format!("Falló por excepción: {message}. Revisa el log."),
                );
                report.stderr = message;
                report
            }
        }
    };

    let duration = start.elapsed();
    ctx.log(format!(
        "{label}: {} (duración: {})",
        report.summary,
        format_duration(duration)
    ));
    tracing::info!(
        "{} finished: {:?}, exit code {}, {:.1}s",
        label,
        report.verdict,
        report.exit_code,
        duration.as_secs_f64()
    );

    RemediationOutcome {
        verdict: report.verdict,
        exit_code: report.exit_code,
        duration,
        human_summary: report.summary,
        raw_stdout: report.stdout,
        raw_stderr: report.stderr,
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "pánico sin mensaje".to_string()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    struct Scripted(fn(&TaskContext<'_>) -> Result<TaskReport>);

    impl RemediationTask for Scripted {
        fn label(&self) -> &str {
            "Prueba"
        }

        fn run(&self, ctx: &TaskContext<'_>) -> Result<TaskReport> {
            (self.0)(ctx)
        }
    }

    #[test]
    fn test_not_elevated_short_circuits() {
        let runner = ScriptedRunner::new(|_| ok(""));
        let h = Harness::new();
        let task = Scripted(|ctx| {
            ctx.run_quiet(&CommandSpec::new("x.exe", Vec::<String>::new(), Duration::from_secs(1)))?;
            Ok(TaskReport::new(Verdict::Ok, 0, "hecho"))
        });

        let outcome = run_task(&task, false, &h.ctx(&runner));

        assert_eq!(outcome.verdict, Verdict::NotElevated);
        assert!(runner.calls().is_empty());
        assert_eq!(outcome.human_summary, "Prueba requiere permisos de Administrador.");
    }

    #[test]
    fn test_single_closing_line_with_duration() {
        let runner = ScriptedRunner::new(|_| ok(""));
        let h = Harness::new();
        let task = Scripted(|_| Ok(TaskReport::new(Verdict::Ok, 0, "Todo bien.")));

        let outcome = run_task(&task, true, &h.ctx(&runner));

        assert_eq!(outcome.verdict, Verdict::Ok);
        let lines = h.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("Prueba: Todo bien. (duración: "));
    }

    #[test]
    fn test_cancelled_error_becomes_canceled_verdict() {
        let runner = ScriptedRunner::new(|_| ok(""));
        let h = Harness::new();
        h.cancel.cancel();
        let task = Scripted(|ctx| {
            ctx.cancel.check()?;
            Ok(TaskReport::new(Verdict::Ok, 0, "no llega"))
        });

        let outcome = run_task(&task, true, &h.ctx(&runner));
        assert_eq!(outcome.verdict, Verdict::Canceled);
        assert_eq!(outcome.exit_code, EXIT_CANCELED);
    }

    #[test]
    fn test_error_and_panic_become_exception() {
        let runner = ScriptedRunner::new(|_| ok(""));
        let h = Harness::new();

        let failing = Scripted(|_| Err(HostCareError::Export("disco lleno".into())));
        let outcome = run_task(&failing, true, &h.ctx(&runner));
        assert_eq!(outcome.verdict, Verdict::Exception);
        assert_eq!(outcome.exit_code, EXIT_EXCEPTION);
        assert!(outcome.human_summary.contains("disco lleno"));

        let panicking = Scripted(|_| panic!("boom"));
        let outcome = run_task(&panicking, true, &h.ctx(&runner));
        assert_eq!(outcome.verdict, Verdict::Exception);
        assert!(outcome.raw_stderr.contains("boom"));
    }

    #[test]
    fn test_canceled_command_result_stops_the_task() {
        let runner = ScriptedRunner::new(|_| CommandResult {
            canceled: true,
            exit_code: EXIT_CANCELED,
            ..ok("")
        });
        let h = Harness::new();
        let task = Scripted(|ctx| {
            let spec = CommandSpec::new("a.exe", Vec::<String>::new(), Duration::from_secs(1));
            ctx.run_step("A", &spec)?;
            ctx.run_step("B", &spec)?;
            Ok(TaskReport::new(Verdict::Ok, 0, "no llega"))
        });

        let outcome = run_task(&task, true, &h.ctx(&runner));
        assert_eq!(outcome.verdict, Verdict::Canceled);
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn test_panicking_log_callback_is_contained() {
        let sink = LogSink::new(|_| panic!("callback roto"));
        sink.line("hola");
    }

    #[test]
    fn test_service_step_failure_is_logged_not_raised() {
        let runner = ScriptedRunner::new(|_| exited(2, "El servicio no se ha iniciado."));
        let h = Harness::new();
        let ctx = h.ctx(&runner);

        let result = ctx.stop_service("wuauserv").unwrap();

        assert_eq!(result.exit_code, 2);
        assert_eq!(runner.calls(), vec!["net.exe stop wuauserv".to_string()]);
        assert!(h.lines().iter().any(|l| l.starts_with("Aviso:")));
    }
}
