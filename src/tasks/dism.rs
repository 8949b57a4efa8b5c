//! Component store repair (`dism /Online /Cleanup-Image /RestoreHealth`).

use crate::exec::classifier::classify;
use crate::exec::executor::{CommandResult, CommandSpec};
use crate::tasks::{RemediationTask, TaskContext, TaskReport, Verdict};
use crate::util::constants::EXIT_REBOOT_REQUIRED;
use crate::util::error::Result;

#[derive(Debug, Clone, Copy, Default)]
pub struct DismTask;

impl RemediationTask for DismTask {
    fn label(&self) -> &str {
        "DISM"
    }

    fn run(&self, ctx: &TaskContext<'_>) -> Result<TaskReport> {
        ctx.log("DISM: reparando imagen del sistema (RestoreHealth). Esto puede tardar bastante...");
        let spec = CommandSpec::new(
            "dism.exe",
            ["/Online", "/Cleanup-Image", "/RestoreHealth"],
            ctx.settings.timeouts.dism(),
        );
        let result = ctx.run_step("DISM RestoreHealth", &spec)?;
        let (verdict, summary) = summarize(&result);
        Ok(TaskReport::from_result(verdict, summary, &result))
    }
}

pub fn summarize(result: &CommandResult) -> (Verdict, &'static str) {
    if result.timed_out {
        return (Verdict::CommandError, "DISM superó el tiempo límite y fue detenido.");
    }
    if result.exit_code == EXIT_REBOOT_REQUIRED {
        return (
            Verdict::OkRebootRequired,
            "DISM finalizó correctamente. Requiere reinicio para aplicar cambios.",
        );
    }
    match Verdict::from_classification(classify(result)) {
        Verdict::Ok => (Verdict::Ok, "DISM finalizó correctamente."),
        Verdict::PartialWarning => (
            Verdict::PartialWarning,
            "DISM terminó con advertencias (acceso denegado). Revisa el log.",
        ),
        other => (other, "DISM terminó con error. Revisa el log para el detalle."),
    }
}
