//! Clean-up of console output before it is echoed to the progress log.

/// Characters that do not count against a line in [`is_mostly_symbols`].
const PLAIN_PUNCTUATION: &[char] = &['.', ',', ':', '/', '-', '%', '(', ')', '[', ']'];

/// DISM-style progress bar, e.g. `[==========         20.0%          ]`.
pub fn is_progress_line(line: &str) -> bool {
    let t = line.trim();
    if t.len() < 5 || !t.starts_with('[') || !t.ends_with(']') || !t.contains('%') {
        return false;
    }
    t.chars()
        .all(|c| matches!(c, '[' | ']' | '=' | ' ' | '%' | '.') || c.is_ascii_digit())
}

/// A line of at least 20 visible characters of which more than 60% are
/// symbols: box drawing, mojibake and similar artefacts.
pub fn is_mostly_symbols(line: &str) -> bool {
    let (total, weird) = line
        .chars()
        .filter(|c| !matches!(c, ' ' | '\t'))
        .fold((0usize, 0usize), |(t, w), c| {
            let plain = c.is_alphanumeric() || PLAIN_PUNCTUATION.contains(&c);
            (t + 1, w + usize::from(!plain))
        });
    total >= 20 && weird * 10 > total * 6
}

/// Drop progress bars and symbol noise and collapse runs of blank lines.
///
/// Carriage returns used to redraw progress in place are treated as line
/// breaks.
pub fn clean_output(text: &str) -> String {
    let normalised = text.replace("\r\r\n", "\n").replace("\r\n", "\n").replace('\r', "\n");

    let mut out = String::with_capacity(normalised.len());
    let mut last_blank = true;
    for line in normalised.split('\n') {
        if is_progress_line(line) || is_mostly_symbols(line) {
            continue;
        }
        let blank = line.trim().is_empty();
        if blank && last_blank {
            continue;
        }
        out.push_str(line.trim_end());
        out.push('\n');
        last_blank = blank;
    }
    out.trim_end().to_string()
}

/// Keep the first `max` lines, marking the cut.
pub fn trim_lines(text: &str, max: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= max {
        return text.to_string();
    }
    let mut out = lines[..max].join("\n");
    out.push_str("\n... (salida recortada)");
    out
}

/// The `STATE` line of `sc query` output, trimmed.
pub fn sc_state_line(output: &str) -> Option<&str> {
    output
        .lines()
        .find(|l| l.to_ascii_uppercase().contains("STATE"))
        .map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_lines_are_detected() {
        assert!(is_progress_line("[==========================100.0%==========================]"));
        assert!(is_progress_line("  [===                        5.4%                           ] "));
        assert!(!is_progress_line("[Versión de imagen: 10.0.19045.3803]"));
    }

    #[test]
    fn test_mostly_symbols() {
        assert!(is_mostly_symbols("╔══════════════════════╗"));
        assert!(!is_mostly_symbols("La operación se completó correctamente."));
        // Too short to judge.
        assert!(!is_mostly_symbols("***"));
    }

    #[test]
    fn test_clean_output_drops_noise_and_blank_runs() {
        let raw = "Herramienta DISM\r\n\r\n\r\n[==   5.4%   ]\r[== 10.0% ]\r\nLa restauración se completó.\r\n\r\n";
        assert_eq!(
            clean_output(raw),
            "Herramienta DISM\n\nLa restauración se completó."
        );
    }

    #[test]
    fn test_trim_lines_marks_the_cut() {
        let text = (1..=5).map(|i| i.to_string()).collect::<Vec<_>>().join("\n");
        assert_eq!(trim_lines(&text, 3), "1\n2\n3\n... (salida recortada)");
        assert_eq!(trim_lines(&text, 5), text);
    }

    #[test]
    fn test_sc_state_line() {
        let out = "SERVICE_NAME: bits\n        TYPE               : 30  WIN32\n        STATE              : 4  RUNNING\n";
        assert_eq!(sc_state_line(out), Some("STATE              : 4  RUNNING"));
        assert_eq!(sc_state_line("[SC] OpenService FAILED 1060"), None);
    }
}
