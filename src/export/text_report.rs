//! Narrative text report.
//!
//! Sections, in order: severity summary, temporal context (only when
//! something was found), groups flagged as actionable, the full grouped
//! listing, generator warnings (only when present) and a closing caveat.

use std::fmt::Write as _;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::core::grouping::EntryGroup;
use crate::export::{write_file, ReportAnalysis};
use crate::util::constants::*;
use crate::util::error::Result;
use crate::util::text::shorten;
use crate::util::time::{format_local_time, format_optional};

const SEPARATOR_WIDTH: usize = 80;

/// Render the whole report. `generated_at` goes into the header.
pub fn render_text(analysis: &ReportAnalysis, generated_at: &DateTime<Utc>) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_report(&mut out, analysis, generated_at);
    out
}

/// Render and write to `path` as UTF-8.
///
/// # Errors
/// [`HostCareError::Export`](crate::util::error::HostCareError::Export) if the
/// path is not writable.
pub fn write_text(analysis: &ReportAnalysis, generated_at: &DateTime<Utc>, path: &Path) -> Result<()> {
    write_file(path, render_text(analysis, generated_at).as_bytes(), "text")
}

fn write_report(
    out: &mut String,
    a: &ReportAnalysis,
    generated_at: &DateTime<Utc>,
) -> std::fmt::Result {
    writeln!(out, "=== Event Log Report (Ejecutivo/Técnico) ===")?;
    writeln!(out, "Generado: {}", format_optional(Some(generated_at), "N/A"))?;
    writeln!(out)?;

    writeln!(out, "== Resumen por severidad ==")?;
    let s = &a.summary;
    writeln!(
        out,
        "Errores: {} | Críticos: {} | Advertencias: {} | Información: {} | Verbose: {}",
        s.error, s.critical, s.warning, s.information, s.verbose
    )?;
    writeln!(out, "Total exportado: {}", a.total_entries)?;
    writeln!(out)?;

    if !a.insights.is_empty() {
        writeln!(out, "== Contexto temporal ==")?;
        for insight in &a.insights {
            writeln!(out, "{}", insight.title())?;
            writeln!(out, "  {}", insight.detail())?;
        }
        writeln!(out)?;
    }

    writeln!(out, "== Eventos marcados como [ACTIONABLE] ==")?;
    let mut any_actionable = false;
    for g in a.actionable().take(REPORT_MAX_ACTIONABLE) {
        any_actionable = true;
        writeln!(
            out,
            "[ACTIONABLE] {} EventId {} ({}) – {} ocurrencias",
            g.provider,
            event_id(g),
            g.log_name,
            g.count
        )?;
        writeln!(
            out,
            "  Ventana: {} → {}",
            time_of_day(g.first_seen.as_ref()),
            time_of_day(g.last_seen.as_ref())
        )?;
        if let Some(reason) = g.reason.as_deref().filter(|r| !r.trim().is_empty()) {
            writeln!(out, "  Motivo: {reason}")?;
        }
        if let Some(sample) = sample(g) {
            writeln!(out, "  Ejemplo: {sample}")?;
        }
        writeln!(out)?;
    }
    if !any_actionable {
        writeln!(
            out,
            "(Ninguno marcado por heurística. Ojo: esto no significa que no haya problemas.)"
        )?;
        writeln!(out)?;
    }

    writeln!(
        out,
        "== Agrupación de eventos repetidos (Top {REPORT_MAX_GROUPS} por frecuencia) =="
    )?;
    let separator = "-".repeat(SEPARATOR_WIDTH);
    for g in a.groups.iter().take(REPORT_MAX_GROUPS) {
        let level = g.level.map(|l| l.name()).unwrap_or("N/A");
        write!(
            out,
            "{} EventId {} [{}] [{level}] – {} ocurrencias",
            g.provider,
            event_id(g),
            g.log_name,
            g.count
        )?;
        if g.actionable {
            write!(out, "  [ACTIONABLE]")?;
        }
        writeln!(out)?;
        writeln!(
            out,
            "  Primer: {} | Último: {}",
            format_optional(g.first_seen.as_ref(), "N/A"),
            format_optional(g.last_seen.as_ref(), "N/A")
        )?;
        if let Some(sample) = sample(g) {
            writeln!(out, "  Muestra: {sample}")?;
        }
        writeln!(out, "{separator}")?;
    }
    writeln!(out)?;

    if !a.warnings.is_empty() {
        writeln!(out, "== Advertencias del generador ==")?;
        for w in &a.warnings {
            writeln!(out, "- {w}")?;
        }
        writeln!(out)?;
    }

    writeln!(out, "== Conclusión honesta ==")?;
    writeln!(
        out,
        "El reporte agrupa y prioriza, pero usa heurísticas: sirve para triage, no para veredicto absoluto."
    )?;
    writeln!(
        out,
        "Si algo se repite mucho, es crítico o está marcado como [ACTIONABLE], vale la pena investigarlo primero."
    )
}

fn event_id(g: &EntryGroup) -> String {
    g.event_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "N/A".into())
}

fn time_of_day(ts: Option<&DateTime<Utc>>) -> String {
    ts.map(format_local_time).unwrap_or_else(|| "N/A".into())
}

fn sample(g: &EntryGroup) -> Option<String> {
    g.sample_message
        .as_deref()
        .filter(|m| !m.trim().is_empty())
        .map(|m| shorten(m, SHORT_MESSAGE_MAX_CHARS))
}
