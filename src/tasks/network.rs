//! Network stack reset: DNS cache, Winsock catalog, TCP/IP settings and
//! DHCP lease, plus a full adapter reinstall (`netcfg -d`) in deep mode.
//!
//! Every step runs regardless of how the previous one ended; the verdict
//! aggregates them all. A reboot is always recommended afterwards.

use std::path::PathBuf;

use crate::exec::classifier::{classify, Classification};
use crate::exec::executor::{CommandResult, CommandSpec};
use crate::tasks::{RemediationTask, TaskContext, TaskReport, Verdict};
use crate::util::error::Result;

#[derive(Debug, Clone)]
pub struct NetworkResetTask {
    deep: bool,
    ip_reset_log: PathBuf,
}

impl NetworkResetTask {
    /// Task writing the `netsh int ip reset` log to the temp directory.
    pub fn new(deep: bool) -> Self {
        Self::with_log_path(deep, std::env::temp_dir().join("ipreset.log"))
    }

    pub fn with_log_path(deep: bool, ip_reset_log: impl Into<PathBuf>) -> Self {
        Self {
            deep,
            ip_reset_log: ip_reset_log.into(),
        }
    }

    /// Titled steps in execution order.
    pub fn steps(&self, ctx: &TaskContext<'_>) -> Vec<(&'static str, CommandSpec)> {
        let t = ctx.settings.timeouts.network();
        let log_path = self.ip_reset_log.to_string_lossy().into_owned();
        let mut steps = vec![
            ("ipconfig /flushdns", CommandSpec::new("ipconfig.exe", ["/flushdns"], t)),
            ("netsh winsock reset", CommandSpec::new("netsh.exe", ["winsock", "reset"], t)),
            (
                "netsh int ip reset (log)",
                CommandSpec::new(
                    "netsh.exe",
                    ["int".to_string(), "ip".into(), "reset".into(), log_path],
                    t,
                ),
            ),
            ("ipconfig /release", CommandSpec::new("ipconfig.exe", ["/release"], t)),
            ("ipconfig /renew", CommandSpec::new("ipconfig.exe", ["/renew"], t)),
        ];
        if self.deep {
            steps.push(("netcfg -d (profundo)", CommandSpec::new("netcfg.exe", ["-d"], t)));
        }
        steps
    }
}

impl RemediationTask for NetworkResetTask {
    fn label(&self) -> &str {
        "Red"
    }

    fn run(&self, ctx: &TaskContext<'_>) -> Result<TaskReport> {
        ctx.log(format!(
            "Red: reiniciando componentes de red (DNS / Winsock / IP){}...",
            if self.deep { " en modo profundo" } else { "" }
        ));

        let mut results = Vec::new();
        for (title, spec) in self.steps(ctx) {
            results.push(ctx.run_step(title, &spec)?);
        }
        ctx.log(format!(
            "Red: log de 'netsh int ip reset' en {}",
            self.ip_reset_log.display()
        ));

        let verdict = aggregate(&results);
        let summary = match verdict {
            Verdict::Canceled => "Reset de red cancelado.",
            Verdict::CommandError => {
                "Reset de red finalizado con algunos errores. Revisa el log. Se recomienda reiniciar el equipo."
            }
            Verdict::PartialWarning => {
                "Reset de red completado con advertencias. Reinicia el equipo para finalizar."
            }
            _ => "Reset de red completado correctamente. Reinicia el equipo para aplicar todos los cambios.",
        };
        let exit_code = results
            .iter()
            .map(|r| r.exit_code)
            .find(|&c| c != 0)
            .unwrap_or(0);

        let mut report = TaskReport::new(verdict, exit_code, summary);
        report.stdout = results
            .iter()
            .map(|r| r.stdout.trim_end())
            .collect::<Vec<_>>()
            .join("\n");
        report.stderr = results
            .iter()
            .map(|r| r.stderr.trim_end())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        Ok(report)
    }
}

/// Combine step results: any cancellation wins, then any timeout or
/// critical failure, then any partial success. Otherwise the reset worked
/// and needs a reboot.
pub fn aggregate(results: &[CommandResult]) -> Verdict {
    if results.iter().any(|r| r.canceled) {
        return Verdict::Canceled;
    }
    let classes: Vec<Classification> = results.iter().map(classify).collect();
    if results.iter().any(|r| r.timed_out) || classes.contains(&Classification::Critical) {
        Verdict::CommandError
    } else if classes.contains(&Classification::Partial) {
        Verdict::PartialWarning
    } else {
        Verdict::OkRebootRequired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::run_task;
    use crate::tasks::testing::*;

    #[test]
    fn test_aggregate_precedence() {
        let denied = exited(1, "Restableciendo Interfaz, error.\nAcceso denegado.");
        let broken = exited(1, "El parámetro no es correcto.");
        let mut timed_out = exited(-1, "");
        timed_out.timed_out = true;
        let mut canceled = exited(-3, "");
        canceled.canceled = true;

        assert_eq!(aggregate(&[ok(""), ok("")]), Verdict::OkRebootRequired);
        assert_eq!(aggregate(&[ok(""), denied.clone()]), Verdict::PartialWarning);
        assert_eq!(aggregate(&[denied.clone(), broken]), Verdict::CommandError);
        assert_eq!(aggregate(&[denied.clone(), timed_out]), Verdict::CommandError);
        assert_eq!(aggregate(&[denied, canceled]), Verdict::Canceled);
    }

    #[test]
    fn test_all_steps_run_even_after_partial_failure() {
        let runner = ScriptedRunner::new(|spec| {
            if spec.args.first().map(String::as_str) == Some("int") {
                exited(1, "Restableciendo , error.\nAcceso denegado.")
            } else {
                ok("")
            }
        });
        let h = Harness::new();
        let task = NetworkResetTask::with_log_path(false, "/tmp/ipreset.log");

        let outcome = run_task(&task, true, &h.ctx(&runner));

        assert_eq!(outcome.verdict, Verdict::PartialWarning);
        assert_eq!(outcome.exit_code, 1);
        assert_eq!(
            runner.calls(),
            vec![
                "ipconfig.exe /flushdns",
                "netsh.exe winsock reset",
                "netsh.exe int ip reset /tmp/ipreset.log",
                "ipconfig.exe /release",
                "ipconfig.exe /renew",
            ]
        );
    }

    #[test]
    fn test_deep_mode_adds_netcfg() {
        let runner = ScriptedRunner::new(|_| ok(""));
        let h = Harness::new();

        let outcome = run_task(&NetworkResetTask::with_log_path(true, "ipreset.log"), true, &h.ctx(&runner));

        assert_eq!(outcome.verdict, Verdict::OkRebootRequired);
        assert_eq!(runner.calls().last().map(String::as_str), Some("netcfg.exe -d"));
    }
}
