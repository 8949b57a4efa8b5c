//! Quick health check: a read-only snapshot of the machine.
//!
//! [`collect`] gathers identity, OS, uptime, CPU, memory, volumes and active
//! IPv4 adapters. Host facts come from `sysinfo`; the BIOS serial number and
//! the Windows product caption come from WMI. Nothing here fails: a fact that
//! cannot be read is shown as unavailable.

use std::net::Ipv4Addr;
use std::time::Duration;

use sysinfo::{Disks, Networks, System};

use crate::util::constants::*;

const UNAVAILABLE: &str = "(no disponible)";

/// One mounted volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeInfo {
    pub mount_point: String,
    /// Media kind as reported by the OS (`SSD`, `HDD`, ...).
    pub kind: String,
    /// Fixed (non-removable) volume. Only these get the low-space alert.
    pub fixed: bool,
    pub total_bytes: u64,
    pub available_bytes: u64,
}

impl VolumeInfo {
    pub fn percent_free(&self) -> f64 {
        if self.total_bytes == 0 {
            0.0
        } else {
            self.available_bytes as f64 * 100.0 / self.total_bytes as f64
        }
    }

    /// Fixed volume under [`LOW_SPACE_PERCENT`] free or under
    /// [`LOW_SPACE_BYTES`] free.
    pub fn is_low_on_space(&self) -> bool {
        self.fixed
            && (self.percent_free() < LOW_SPACE_PERCENT || self.available_bytes < LOW_SPACE_BYTES)
    }

    pub fn line(&self) -> String {
        let alert = if self.is_low_on_space() {
            " ⚠️ ESPACIO BAJO"
        } else {
            ""
        };
        format!(
            "{} ({}) - Libre: {} / {} ({:.1}% libre){alert}",
            self.mount_point,
            self.kind,
            format_bytes(self.available_bytes),
            format_bytes(self.total_bytes),
            self.percent_free()
        )
    }
}

/// A network interface holding at least one non-loopback IPv4 address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterInfo {
    pub name: String,
    pub mac: Option<String>,
    pub ipv4: Vec<Ipv4Addr>,
}

impl AdapterInfo {
    pub fn line(&self) -> String {
        let ips = self
            .ipv4
            .iter()
            .map(|ip| ip.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        match &self.mac {
            Some(mac) => format!("{} [MAC {mac}] | IP: {ips}", self.name),
            None => format!("{} | IP: {ips}", self.name),
        }
    }
}

/// Everything the health check reports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HealthSnapshot {
    pub machine: Option<String>,
    pub user: Option<String>,
    /// Raw BIOS serial number, before placeholder detection.
    pub serial_number: Option<String>,
    pub windows: Option<String>,
    pub is_64_bit: bool,
    pub uptime: Option<Duration>,
    pub cpu: Option<String>,
    pub total_memory: u64,
    pub available_memory: u64,
    pub volumes: Vec<VolumeInfo>,
    pub adapters: Vec<AdapterInfo>,
}

impl HealthSnapshot {
    /// The report, one line per fact, framed by a header and a footer.
    pub fn lines(&self) -> Vec<String> {
        let or_unavailable = |v: &Option<String>| v.clone().unwrap_or_else(|| UNAVAILABLE.into());

        let mut lines = vec![
            "===== CHEQUEO RÁPIDO =====".to_string(),
            format!("Equipo: {}", or_unavailable(&self.machine)),
            format!("Usuario: {}", or_unavailable(&self.user)),
            format!("Número de serie: {}", serial_label(self.serial_number.as_deref())),
            format!("Windows: {}", or_unavailable(&self.windows)),
            format!(
                "Arquitectura: {}",
                if self.is_64_bit { "64-bit" } else { "32-bit" }
            ),
            format!(
                "Uptime: {}",
                self.uptime
                    .map(format_uptime)
                    .unwrap_or_else(|| UNAVAILABLE.into())
            ),
        ];

        if let Some(cpu) = self.cpu.as_deref().filter(|c| !c.trim().is_empty()) {
            lines.push(format!("CPU: {}", cpu.trim()));
        }
        if self.total_memory > 0 {
            lines.push(format!(
                "RAM: Total {} | Disponible {}",
                format_bytes(self.total_memory),
                format_bytes(self.available_memory)
            ));
        }

        lines.push("Discos:".into());
        if self.volumes.is_empty() {
            lines.push("  - No se pudieron enumerar discos.".into());
        }
        lines.extend(self.volumes.iter().map(|v| format!("  - {}", v.line())));

        lines.push("Red:".into());
        if self.adapters.is_empty() {
            lines.push("  - No se detectó interfaz activa con IPv4.".into());
        }
        lines.extend(self.adapters.iter().map(|a| format!("  - {}", a.line())));

        lines.push("==========================".into());
        lines
    }
}

/// Take the snapshot of this machine.
pub fn collect() -> HealthSnapshot {
    let sys = System::new_all();
    let firmware = firmware_details();

    let snapshot = HealthSnapshot {
        machine: System::host_name(),
        user: current_user(),
        serial_number: firmware.serial_number,
        windows: firmware.os_caption.or_else(System::long_os_version),
        is_64_bit: is_64_bit_os(),
        uptime: Some(Duration::from_secs(System::uptime())),
        cpu: sys.cpus().first().map(|c| c.brand().trim().to_string()),
        total_memory: sys.total_memory(),
        available_memory: sys.available_memory(),
        volumes: collect_volumes(),
        adapters: collect_adapters(),
    };
    tracing::info!(
        "Health check: {} volumes, {} adapters",
        snapshot.volumes.len(),
        snapshot.adapters.len()
    );
    snapshot
}

fn collect_volumes() -> Vec<VolumeInfo> {
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|d| d.total_space() > 0)
        .map(|d| VolumeInfo {
            mount_point: d.mount_point().display().to_string(),
            kind: format!("{:?}", d.kind()),
            fixed: !d.is_removable(),
            total_bytes: d.total_space(),
            available_bytes: d.available_space(),
        })
        .collect()
}

fn collect_adapters() -> Vec<AdapterInfo> {
    let networks = Networks::new_with_refreshed_list();
    let mut adapters: Vec<AdapterInfo> = networks
        .list()
        .iter()
        .filter_map(|(name, data)| {
            let ipv4: Vec<Ipv4Addr> = data
                .ip_networks()
                .iter()
                .filter_map(|n| match n.addr {
                    std::net::IpAddr::V4(v4) if !v4.is_loopback() => Some(v4),
                    _ => None,
                })
                .collect();
            if ipv4.is_empty() {
                return None;
            }
            let mac = data.mac_address().to_string();
            Some(AdapterInfo {
                name: name.clone(),
                mac: (mac != "00:00:00:00:00:00").then_some(mac),
                ipv4,
            })
        })
        .collect();
    adapters.sort_by(|a, b| a.name.cmp(&b.name));
    adapters
}

fn current_user() -> Option<String> {
    ["USERNAME", "USER"]
        .iter()
        .find_map(|var| std::env::var(var).ok())
        .filter(|u| !u.trim().is_empty())
}

/// A 32-bit process on 64-bit Windows sees `PROCESSOR_ARCHITEW6432`.
fn is_64_bit_os() -> bool {
    cfg!(target_pointer_width = "64") || std::env::var_os("PROCESSOR_ARCHITEW6432").is_some()
}

#[derive(Debug, Default)]
struct FirmwareDetails {
    serial_number: Option<String>,
    os_caption: Option<String>,
}

#[cfg(windows)]
fn firmware_details() -> FirmwareDetails {
    use serde::Deserialize;
    use wmi::WMIConnection;

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct BiosRow {
        serial_number: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct OsRow {
        caption: Option<String>,
        version: Option<String>,
    }

    let mut details = FirmwareDetails::default();
    let wmi = match WMIConnection::new() {
        Ok(wmi) => wmi,
        Err(e) => {
            tracing::debug!("WMI unavailable: {}", e);
            return details;
        }
    };

    match wmi.raw_query::<BiosRow>("SELECT SerialNumber FROM Win32_BIOS") {
        Ok(rows) => {
            details.serial_number = rows.into_iter().find_map(|r| r.serial_number);
        }
        Err(e) => tracing::debug!("Win32_BIOS query failed: {}", e),
    }

    match wmi.raw_query::<OsRow>("SELECT Caption, Version FROM Win32_OperatingSystem") {
        Ok(rows) => {
            details.os_caption = rows.into_iter().find_map(|r| {
                let caption = r.caption?.trim().to_string();
                if caption.is_empty() {
                    return None;
                }
                Some(match r.version.as_deref().map(str::trim) {
                    Some(v) if !v.is_empty() => format!("{caption} (v{v})"),
                    _ => caption,
                })
            });
        }
        Err(e) => tracing::debug!("Win32_OperatingSystem query failed: {}", e),
    }
    details
}

#[cfg(not(windows))]
fn firmware_details() -> FirmwareDetails {
    FirmwareDetails::default()
}

/// Display form of a BIOS serial. Vendor placeholders are called out.
pub fn serial_label(serial: Option<&str>) -> String {
    match serial.map(str::trim).filter(|s| !s.is_empty()) {
        None => UNAVAILABLE.into(),
        Some(s) if s.eq_ignore_ascii_case("Default string") || s.to_uppercase().contains("O.E.M") => {
            "(no definido por el fabricante)".into()
        }
        Some(s) => s.to_string(),
    }
}

/// Binary units up to TB with at most two decimals: `1.5 KB`, `10 GB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let number = format!("{value:.2}");
    let number = number.trim_end_matches('0').trim_end_matches('.');
    format!("{number} {}", UNITS[unit])
}

/// `2d 3h 4m`, `5h 6m` or `7m 8s`, whichever is the largest that applies.
pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    let (days, hours, minutes, seconds) = (secs / 86_400, secs / 3_600 % 24, secs / 60 % 60, secs % 60);
    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m {seconds}s")
    }
}
