//! Windows Update stack reset.
//!
//! Ordered, best-effort steps with no rollback:
//!
//! 1. (deep mode) DISM CheckHealth / ScanHealth and the last 50
//!    WindowsUpdateClient events;
//! 2. stop wuauserv, bits, cryptsvc, msiserver;
//! 3. delete the BITS queue (`qmgr*.dat`);
//! 4. rename `SoftwareDistribution` and `catroot2` to
//!    `<name>_bak_<yyyyMMdd_HHmmss>`;
//! 5. start cryptsvc, bits, wuauserv, msiserver.
//!
//! Service states are snapshotted before and after. A failed rename does not
//! stop the remaining steps; it downgrades the verdict to a warning.

use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::exec::executor::CommandSpec;
use crate::tasks::output::sc_state_line;
use crate::tasks::{RemediationTask, TaskContext, TaskReport, Verdict};
use crate::util::error::Result;

const STOP_ORDER: [&str; 4] = ["wuauserv", "bits", "cryptsvc", "msiserver"];
const START_ORDER: [&str; 4] = ["cryptsvc", "bits", "wuauserv", "msiserver"];

/// Filesystem locations the reset touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePaths {
    pub software_distribution: PathBuf,
    pub catroot2: PathBuf,
    /// Directory holding the BITS job queue files.
    pub bits_queue: PathBuf,
}

impl UpdatePaths {
    /// Locations derived from `%SystemRoot%` and `%ALLUSERSPROFILE%`.
    pub fn system() -> Self {
        let windows = env_dir("SystemRoot", r"C:\Windows");
        let all_users = env_dir("ALLUSERSPROFILE", r"C:\ProgramData");
        Self::under(&windows, &all_users)
    }

    pub fn under(windows_dir: &Path, all_users_dir: &Path) -> Self {
        Self {
            software_distribution: windows_dir.join("SoftwareDistribution"),
            catroot2: windows_dir.join("System32").join("catroot2"),
            bits_queue: all_users_dir.join("Microsoft").join("Network").join("Downloader"),
        }
    }
}

fn env_dir(var: &str, fallback: &str) -> PathBuf {
    std::env::var_os(var)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(fallback))
}

#[derive(Debug, Clone)]
pub struct WinUpdateTask {
    deep: bool,
    paths: UpdatePaths,
}

impl WinUpdateTask {
    pub fn new(deep: bool) -> Self {
        Self::with_paths(deep, UpdatePaths::system())
    }

    pub fn with_paths(deep: bool, paths: UpdatePaths) -> Self {
        Self { deep, paths }
    }

    fn diagnostics(&self, ctx: &TaskContext<'_>) -> Result<()> {
        ctx.log("---- Diagnóstico ----");
        let dism = ctx.settings.timeouts.dism();
        ctx.run_step(
            "dism /checkhealth",
            &CommandSpec::new("dism.exe", ["/Online", "/Cleanup-Image", "/CheckHealth"], dism),
        )?;
        ctx.run_step(
            "dism /scanhealth",
            &CommandSpec::new("dism.exe", ["/Online", "/Cleanup-Image", "/ScanHealth"], dism),
        )?;
        ctx.run_step(
            "Eventos recientes de Windows Update",
            &CommandSpec::new(
                "wevtutil.exe",
                [
                    "qe",
                    "Microsoft-Windows-WindowsUpdateClient/Operational",
                    "/c:50",
                    "/rd:true",
                    "/f:text",
                ],
                ctx.settings.timeouts.service(),
            ),
        )?;
        Ok(())
    }
}

impl RemediationTask for WinUpdateTask {
    fn label(&self) -> &str {
        "WinUpdate"
    }

    fn run(&self, ctx: &TaskContext<'_>) -> Result<TaskReport> {
        ctx.log("WinUpdate: iniciando reparación de Windows Update...");
        ctx.log(format!(
            "WinUpdate: modo {}",
            if self.deep { "PROFUNDO" } else { "NORMAL" }
        ));
        ctx.cancel.check()?;

        let before = services_snapshot(ctx)?;

        if self.deep {
            self.diagnostics(ctx)?;
        }

        ctx.log("---- Reset Windows Update ----");
        for service in STOP_ORDER {
            ctx.stop_service(service)?;
        }

        ctx.cancel.check()?;
        clear_bits_queue(ctx, &self.paths.bits_queue);

        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let mut failed_renames = Vec::new();
        for dir in [&self.paths.software_distribution, &self.paths.catroot2] {
            ctx.cancel.check()?;
            match rename_with_backup(dir, &stamp) {
                Ok(Some(renamed)) => ctx.log(format!(
                    "Renombrado: {} -> {}",
                    dir.display(),
                    renamed.display()
                )),
                Ok(None) => ctx.log(format!("Se omite el renombrado: no existe {}", dir.display())),
                Err(e) => {
                    tracing::warn!("Rename of {} failed: {}", dir.display(), e);
                    ctx.log(format!("No se pudo renombrar {}: {e}", dir.display()));
                    failed_renames.push(dir.display().to_string());
                }
            }
        }

        for service in START_ORDER {
            ctx.start_service(service)?;
        }

        let after = services_snapshot(ctx)?;

        let mut report = if failed_renames.is_empty() {
            TaskReport::new(Verdict::Ok, 0, "Reparación completada correctamente.")
        } else {
            TaskReport::new(
                Verdict::PartialWarning,
                1,
                format!(
                    "Reparación completada con advertencias: no se pudo renombrar {}.",
                    failed_renames.join(", ")
                ),
            )
        };
        report.stdout = format!("Antes:\n{before}\nDespués:\n{after}");
        Ok(report)
    }
}

/// One `- name: STATE ...` line per update service, logged and returned.
fn services_snapshot(ctx: &TaskContext<'_>) -> Result<String> {
    let mut snapshot = String::from("Servicios:");
    for service in STOP_ORDER {
        let spec = CommandSpec::new("sc.exe", ["query", service], ctx.settings.timeouts.service());
        let result = ctx.run_quiet(&spec)?;
        let state = sc_state_line(&result.stdout).unwrap_or("(desconocido)");
        snapshot.push_str(&format!("\n- {service}: {state}"));
    }
    ctx.log(&snapshot);
    Ok(snapshot)
}

/// Delete `qmgr*.dat` under `dir`. Failures are logged only.
fn clear_bits_queue(ctx: &TaskContext<'_>, dir: &Path) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            ctx.log(format!("Cola BITS: no se pudo leer {}: {e}", dir.display()));
            return;
        }
    };

    let mut removed = 0usize;
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_lowercase();
        if !(name.starts_with("qmgr") && name.ends_with(".dat")) {
            continue;
        }
        match std::fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(e) => ctx.log(format!("Cola BITS: no se pudo borrar {}: {e}", entry.path().display())),
        }
    }
    ctx.log(format!("Cola BITS: {removed} archivo(s) qmgr*.dat eliminados."));
}

/// Rename `dir` to `<name>_bak_<stamp>` next to it. `Ok(None)` when `dir`
/// does not exist.
pub fn rename_with_backup(dir: &Path, stamp: &str) -> io::Result<Option<PathBuf>> {
    if !dir.exists() {
        return Ok(None);
    }
    let name = dir
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no final component"))?
        .to_string_lossy()
        .into_owned();
    let target = dir.with_file_name(format!("{name}_bak_{stamp}"));
    std::fs::rename(dir, &target)?;
    Ok(Some(target))
}
