//! System file integrity scan (`sfc /scannow`).
//!
//! SFC depends on the Windows Modules Installer service (TrustedInstaller),
//! so the task makes sure it is running before starting the scan. The
//! verdict comes from the phrases SFC prints, in Spanish or English; the
//! exit code alone does not distinguish "nothing found" from "repaired".

use crate::exec::classifier::{classify, mentions_access_denied};
use crate::exec::executor::{CommandResult, CommandSpec};
use crate::tasks::{RemediationTask, TaskContext, TaskReport, Verdict};
use crate::util::error::Result;

const NO_VIOLATIONS: &[&str] = &[
    "no encontró ninguna infracción de integridad",
    "did not find any integrity violations",
];
const REPAIRED: &[&str] = &[
    "encontró archivos dañados y los reparó correctamente",
    "found corrupt files and successfully repaired them",
];
const NEXT_REBOOT: &[&str] = &["siguiente reinicio", "next reboot"];
const REPAIR_SERVICE_FAILED: &[&str] = &[
    "no pudo iniciar el servicio de reparación",
    "could not start the repair service",
];
const UNABLE_TO_FIX: &[&str] = &["no pudo reparar algunos", "unable to fix some"];

/// Integrity scan with a TrustedInstaller pre-check.
#[derive(Debug, Clone, Copy, Default)]
pub struct SfcTask;

impl RemediationTask for SfcTask {
    fn label(&self) -> &str {
        "SFC"
    }

    fn run(&self, ctx: &TaskContext<'_>) -> Result<TaskReport> {
        ctx.log("SFC: iniciando análisis de archivos del sistema...");

        if !ensure_trusted_installer(ctx)? {
            return Ok(TaskReport::new(
                Verdict::CommandError,
                1,
                "No se pudo iniciar/usar TrustedInstaller (Windows Modules Installer). \
                 Ejecuta como Administrador y valida el servicio.",
            ));
        }

        let spec = CommandSpec::new("sfc.exe", ["/scannow"], ctx.settings.timeouts.sfc());
        let result = ctx.run_step("SFC /scannow", &spec)?;
        let (verdict, summary) = summarize(&result);
        Ok(TaskReport::from_result(verdict, summary, &result))
    }
}

/// Map SFC output to a verdict and a human summary.
pub fn summarize(result: &CommandResult) -> (Verdict, &'static str) {
    if result.timed_out {
        return (Verdict::CommandError, "SFC superó el tiempo límite y fue detenido.");
    }

    let text = result.combined_text().to_lowercase();
    let has = |phrases: &[&str]| phrases.iter().any(|p| text.contains(p));

    if has(NO_VIOLATIONS) {
        (Verdict::Ok, "No se encontró ninguna infracción de integridad.")
    } else if has(REPAIRED) {
        if has(NEXT_REBOOT) {
            (
                Verdict::OkRebootRequired,
                "Reparó archivos correctamente. Requiere reinicio para aplicar cambios.",
            )
        } else {
            (Verdict::Ok, "Reparó archivos dañados correctamente.")
        }
    } else if has(REPAIR_SERVICE_FAILED) {
        (
            Verdict::CommandError,
            "Protección de recursos de Windows no pudo iniciar el servicio de reparación (TrustedInstaller).",
        )
    } else if has(UNABLE_TO_FIX) {
        (
            Verdict::PartialWarning,
            "Encontró archivos dañados pero no pudo reparar algunos. Revisa CBS.log.",
        )
    } else {
        match Verdict::from_classification(classify(result)) {
            Verdict::Ok => (Verdict::Ok, "SFC terminó sin errores."),
            Verdict::PartialWarning => (
                Verdict::PartialWarning,
                "SFC terminó con advertencias (acceso denegado en algunos componentes).",
            ),
            other => (other, "SFC terminó con error. Revisa el log para el detalle."),
        }
    }
}

/// Query TrustedInstaller, start it if needed, and report whether it runs.
fn ensure_trusted_installer(ctx: &TaskContext<'_>) -> Result<bool> {
    let query = CommandSpec::new("sc.exe", ["query", "trustedinstaller"], ctx.settings.timeouts.service());

    let initial = ctx.run_quiet(&query)?.combined_text().to_uppercase();
    let state = if initial.contains("RUNNING") {
        "RUNNING"
    } else if initial.contains("STOPPED") {
        "STOPPED"
    } else {
        "DESCONOCIDO"
    };
    ctx.log(format!("TrustedInstaller estado inicial: {state}"));
    if state == "RUNNING" {
        return Ok(true);
    }

    ctx.log("Intentando iniciar TrustedInstaller...");
    let start = CommandSpec::new("net.exe", ["start", "trustedinstaller"], ctx.settings.timeouts.service());
    let started = ctx.run_quiet(&start)?;
    if mentions_access_denied(&started.combined_text()) {
        ctx.log("TrustedInstaller: acceso denegado al intentar iniciarlo (faltan permisos).");
        return Ok(false);
    }

    let running = ctx
        .run_quiet(&query)?
        .combined_text()
        .to_uppercase()
        .contains("RUNNING");
    ctx.log(format!(
        "TrustedInstaller estado tras iniciar: {}",
        if running { "RUNNING" } else { "NO RUNNING" }
    ));
    Ok(running)
}
