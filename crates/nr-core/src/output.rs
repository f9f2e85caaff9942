//! Result rendering: batch records, the Nagios plugin line, and the human
//! listing.
//!
//! Batch mode emits one record per line with stable prefixes; consumers
//! parse these, so the set of prefixes and their shapes are a contract.

use std::collections::BTreeMap;
use std::fmt::Write;

use nr_common::DetailMode;
use nr_config::KernelHints;

use crate::exit_codes::NagiosStatus;
use crate::kernel::{KernelInfo, KernelStatus};
use crate::reduce::{Reduction, SessionInfo};

/// Everything one run produced, ready for rendering.
#[derive(Debug)]
pub struct Report {
    pub version: &'static str,
    pub kernel: Option<KernelInfo>,
    pub reduction: Reduction,
    /// Containers needing restart, name → restart argv.
    pub containers: BTreeMap<String, Vec<String>>,
}

/// Batch-mode records, one per line.
pub fn render_batch(report: &Report) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "NEEDRESTART-VER: {}", report.version);

    if let Some(kernel) = &report.kernel {
        let _ = writeln!(out, "NEEDRESTART-KCUR: {}", kernel.running);
        if let Some(expected) = &kernel.expected {
            let _ = writeln!(out, "NEEDRESTART-KEXP: {}", expected);
        }
        let _ = writeln!(out, "NEEDRESTART-KSTA: {}", kernel.status.batch_code());
    }

    for name in report.reduction.units.keys() {
        let _ = writeln!(out, "NEEDRESTART-SVC: {}", name);
    }

    for name in report.containers.keys() {
        let _ = writeln!(out, "NEEDRESTART-CONT: {}", name);
    }

    for (comm, pids) in &report.reduction.user_pids {
        let list = pids
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let _ = writeln!(out, "NEEDRESTART-PID: {}={}", comm, list);
    }

    out
}

/// Nagios plugin line and the combined status.
pub fn render_nagios(report: &Report) -> (String, NagiosStatus) {
    let mut status = NagiosStatus::Ok;

    let (kernel_text, kernel_code, kernel_status) = match &report.kernel {
        Some(k) => {
            let st = match k.status {
                KernelStatus::NoUpgrade => NagiosStatus::Ok,
                KernelStatus::AbiUpgrade => NagiosStatus::Warning,
                KernelStatus::VerUpgrade => NagiosStatus::Critical,
                KernelStatus::Unknown => NagiosStatus::Unknown,
            };
            let text = match (&k.expected, k.status) {
                (_, KernelStatus::NoUpgrade) => k.running.clone(),
                (Some(exp), _) => format!("{} -> {}", k.running, exp),
                (None, _) => format!("{} (no image found)", k.running),
            };
            (text, k.status.batch_code(), st)
        }
        None => ("skipped".to_string(), 0, NagiosStatus::Ok),
    };
    status = status.combine(kernel_status);

    let services = report.reduction.units.len();
    let containers = report.containers.len();
    let sessions = report.reduction.sessions.len();

    let service_status = if services > 0 {
        NagiosStatus::Warning
    } else {
        NagiosStatus::Ok
    };
    let container_status = if containers > 0 {
        NagiosStatus::Warning
    } else {
        NagiosStatus::Ok
    };
    let session_status = if sessions > 0 {
        NagiosStatus::Warning
    } else {
        NagiosStatus::Ok
    };
    status = status
        .combine(service_status)
        .combine(container_status)
        .combine(session_status);

    let bang = |s: NagiosStatus| if s > NagiosStatus::Ok { " (!)" } else { "" };

    let line = format!(
        "{} - Kernel: {}{}, Services: {}{}, Containers: {}{}, Sessions: {}{}|Kernel={} Services={} Containers={} Sessions={}",
        status.label(),
        kernel_text,
        bang(kernel_status),
        services,
        bang(service_status),
        containers,
        bang(container_status),
        sessions,
        bang(session_status),
        kernel_code,
        services,
        containers,
        sessions,
    );

    (line, status)
}

/// Human-readable listing.
pub fn render_human(report: &Report, detail: DetailMode, kernelhints: KernelHints) -> String {
    let mut out = String::new();

    if let Some(kernel) = &report.kernel {
        render_kernel_text(&mut out, kernel, kernelhints);
    }

    let units = &report.reduction.units;
    let sessions = &report.reduction.sessions;

    if units.is_empty() && report.containers.is_empty() && sessions.is_empty() {
        if report.reduction.user_pids.is_empty() {
            out.push_str("No services need to be restarted.\n");
        } else {
            render_user_pids(&mut out, &report.reduction.user_pids);
        }
        return out;
    }

    match detail {
        DetailMode::Easy => {
            let _ = writeln!(
                out,
                "Services to be restarted: {} (run with -m a for the full list)",
                units.len()
            );
            if !report.containers.is_empty() {
                let _ = writeln!(out, "Containers to be restarted: {}", report.containers.len());
            }
            if !sessions.is_empty() {
                let _ = writeln!(out, "Sessions running outdated binaries: {}", sessions.len());
            }
        }
        DetailMode::Advanced => {
            if !units.is_empty() {
                out.push_str("Services to be restarted:\n");
                for name in units.keys() {
                    let _ = writeln!(out, "  {}", name);
                }
            }
            if !report.containers.is_empty() {
                out.push_str("Containers to be restarted:\n");
                for name in report.containers.keys() {
                    let _ = writeln!(out, "  {}", name);
                }
            }
            render_sessions(&mut out, sessions);
            if !report.reduction.skipped.is_empty() {
                out.push_str("Skipped by configuration:\n");
                for name in &report.reduction.skipped {
                    let _ = writeln!(out, "  {}", name);
                }
            }
        }
    }

    if !report.reduction.user_pids.is_empty() {
        render_user_pids(&mut out, &report.reduction.user_pids);
    }

    out
}

fn render_kernel_text(out: &mut String, kernel: &KernelInfo, hints: KernelHints) {
    match kernel.status {
        KernelStatus::NoUpgrade => {
            let _ = writeln!(out, "Running kernel {} is up to date.", kernel.running);
        }
        KernelStatus::AbiUpgrade | KernelStatus::VerUpgrade => {
            let expected = kernel.expected.as_deref().unwrap_or("?");
            let _ = writeln!(
                out,
                "Pending kernel upgrade: running {}, expected {}.",
                kernel.running, expected
            );
            if hints == KernelHints::Full {
                out.push_str("Reboot to load the new kernel.\n");
            }
        }
        KernelStatus::Unknown => {
            let _ = writeln!(
                out,
                "Running kernel {}: no installed image found, status unknown.",
                kernel.running
            );
        }
    }
}

fn render_sessions(out: &mut String, sessions: &BTreeMap<(u32, String), SessionInfo>) {
    if sessions.is_empty() {
        return;
    }
    out.push_str("User sessions running outdated binaries:\n");
    for ((uid, label), info) in sessions {
        let commands = info
            .commands
            .iter()
            .map(|(comm, pids)| {
                let list = pids
                    .iter()
                    .map(|p| p.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                format!("{}[{}]", comm, list)
            })
            .collect::<Vec<_>>()
            .join(" ");
        let _ = writeln!(out, "  uid {} @ {}: {}", uid, label, commands);
    }
}

fn render_user_pids(out: &mut String, user_pids: &BTreeMap<String, Vec<u32>>) {
    out.push_str("Your processes running outdated binaries:\n");
    for (comm, pids) in user_pids {
        let list = pids
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let _ = writeln!(out, "  {}={}", comm, list);
    }
}
