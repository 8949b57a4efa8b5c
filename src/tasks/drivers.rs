//! Plug and Play device rescan (`pnputil /scan-devices`).

use std::path::{Path, PathBuf};

use crate::exec::classifier::classify;
use crate::exec::executor::CommandSpec;
use crate::tasks::{RemediationTask, TaskContext, TaskReport, Verdict};
use crate::util::error::Result;

#[derive(Debug, Clone)]
pub struct DriversTask {
    windows_dir: PathBuf,
}

impl Default for DriversTask {
    fn default() -> Self {
        Self::new()
    }
}

impl DriversTask {
    /// Task rooted at `%SystemRoot%` (`C:\Windows` when unset).
    pub fn new() -> Self {
        let root = std::env::var_os("SystemRoot")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(r"C:\Windows"));
        Self::with_windows_dir(root)
    }

    pub fn with_windows_dir(windows_dir: impl Into<PathBuf>) -> Self {
        Self {
            windows_dir: windows_dir.into(),
        }
    }

    /// `Sysnative\pnputil.exe` when it exists (a 32-bit process on a 64-bit
    /// system would otherwise be redirected to the 32-bit tool), else
    /// `System32\pnputil.exe`.
    pub fn pnputil_path(&self) -> PathBuf {
        pnputil_under(&self.windows_dir)
    }
}

fn pnputil_under(windows_dir: &Path) -> PathBuf {
    let sysnative = windows_dir.join("Sysnative").join("pnputil.exe");
    if sysnative.exists() {
        sysnative
    } else {
        windows_dir.join("System32").join("pnputil.exe")
    }
}

impl RemediationTask for DriversTask {
    fn label(&self) -> &str {
        "Drivers"
    }

    fn run(&self, ctx: &TaskContext<'_>) -> Result<TaskReport> {
        ctx.log("Drivers: iniciando re-escaneo de hardware (pnputil /scan-devices)...");
        let program = self.pnputil_path().to_string_lossy().into_owned();
        let spec = CommandSpec::new(program, ["/scan-devices"], ctx.settings.timeouts.drivers());
        let result = ctx.run_step("PnPUtil scan-devices", &spec)?;

        let verdict = Verdict::from_classification(classify(&result));
        let summary = if result.timed_out {
            "El re-escaneo superó el tiempo límite y fue detenido."
        } else {
            match verdict {
                Verdict::Ok => "Re-escaneo completado.",
                Verdict::PartialWarning => "Re-escaneo completado con advertencias (acceso denegado).",
                _ => "El re-escaneo terminó con error. Revisa el log.",
            }
        };
        Ok(TaskReport::from_result(verdict, summary, &result))
    }
}
