//! Restart execution.
//!
//! Builds the command lines for a restart set and, depending on the restart
//! mode, runs them directly or after a per-unit prompt. Command assembly is
//! separate from execution so the mapping stays testable without touching
//! the system.
//!
//! Systemd services restart one `systemctl` invocation per unit, or as a
//! single combined invocation when `systemctl_combine` is set. The systemd
//! manager re-executes itself; a SysV init re-reads its binary with
//! `telinit u`; init scripts go through `service`; containers use the argv
//! their runtime detector recorded.

use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::process::{Command, Stdio};

use nr_common::RestartMode;
use nr_config::Config;
use tracing::{debug, warn};

use crate::reduce::RestartUnit;

/// Build the commands that restart a unit set, in listing order.
///
/// Combined mode folds all `.service`-style units into one alphabetical
/// `systemctl restart` call; everything else keeps its own command.
pub fn build_restart_commands(
    units: &BTreeMap<String, RestartUnit>,
    combine: bool,
) -> Vec<Vec<String>> {
    let mut commands: Vec<Vec<String>> = Vec::new();
    let mut combined: Vec<String> = Vec::new();

    for unit in units.values() {
        match unit {
            RestartUnit::SystemdService(name) => {
                if combine {
                    combined.push(name.clone());
                } else {
                    commands.push(vec![
                        "systemctl".to_string(),
                        "restart".to_string(),
                        name.clone(),
                    ]);
                }
            }
            RestartUnit::SystemdManager => {
                commands.push(vec!["systemctl".to_string(), "daemon-reexec".to_string()]);
            }
            RestartUnit::SysVInit => {
                commands.push(vec!["telinit".to_string(), "u".to_string()]);
            }
            RestartUnit::InitScript { name, .. } => {
                commands.push(vec![
                    "service".to_string(),
                    name.clone(),
                    "restart".to_string(),
                ]);
            }
            RestartUnit::Container { restart_argv, .. } => {
                commands.push(restart_argv.clone());
            }
        }
    }

    if !combined.is_empty() {
        // BTreeMap iteration already yields unit names alphabetically.
        let mut cmd = vec!["systemctl".to_string(), "restart".to_string()];
        cmd.extend(combined);
        commands.push(cmd);
    }

    commands
}

/// Execute the restart set according to the restart mode.
///
/// Returns the number of failed commands. List-only mode runs nothing.
pub fn execute(units: &BTreeMap<String, RestartUnit>, config: &Config) -> usize {
    match config.restart {
        RestartMode::ListOnly => 0,
        RestartMode::Automatic => run_commands(&build_restart_commands(
            units,
            config.systemctl_combine,
        )),
        RestartMode::Interactive => {
            let approved: BTreeMap<String, RestartUnit> = units
                .iter()
                .filter(|(name, _)| confirm(name, config.defno))
                .map(|(name, unit)| (name.clone(), unit.clone()))
                .collect();
            run_commands(&build_restart_commands(
                &approved,
                config.systemctl_combine,
            ))
        }
    }
}

/// Run commands sequentially, draining output and always reaping children.
pub fn run_commands(commands: &[Vec<String>]) -> usize {
    let mut failures = 0;

    for argv in commands {
        let Some((program, args)) = argv.split_first() else {
            continue;
        };
        debug!(command = %argv.join(" "), "restarting");

        let spawned = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn();

        match spawned {
            Ok(mut child) => match child.wait() {
                Ok(status) if status.success() => {}
                Ok(status) => {
                    warn!(command = %argv.join(" "), %status, "restart command failed");
                    failures += 1;
                }
                Err(e) => {
                    warn!(command = %argv.join(" "), error = %e, "wait failed");
                    failures += 1;
                }
            },
            Err(e) => {
                warn!(command = %argv.join(" "), error = %e, "spawn failed");
                failures += 1;
            }
        }
    }

    failures
}

/// One y/n prompt on the controlling terminal.
fn confirm(unit: &str, default_no: bool) -> bool {
    let hint = if default_no { "[y/N]" } else { "[Y/n]" };
    print!("Restart {}? {} ", unit, hint);
    let _ = std::io::stdout().flush();

    let mut answer = String::new();
    if std::io::stdin().lock().read_line(&mut answer).is_err() {
        return !default_no;
    }
    match answer.trim() {
        "" => !default_no,
        "y" | "Y" | "yes" => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(name: &str) -> (String, RestartUnit) {
        (name.to_string(), RestartUnit::SystemdService(name.into()))
    }

    #[test]
    fn test_combined_single_command_alphabetical() {
        let units = BTreeMap::from([service("foo.service"), service("bar.service")]);
        let commands = build_restart_commands(&units, true);
        assert_eq!(commands.len(), 1);
        assert_eq!(
            commands[0],
            vec!["systemctl", "restart", "bar.service", "foo.service"]
        );
    }

    #[test]
    fn test_uncombined_one_command_per_unit() {
        let units = BTreeMap::from([service("foo.service"), service("bar.service")]);
        let commands = build_restart_commands(&units, false);
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0], vec!["systemctl", "restart", "bar.service"]);
        assert_eq!(commands[1], vec!["systemctl", "restart", "foo.service"]);
    }

    #[test]
    fn test_manager_and_sysv_commands() {
        let units = BTreeMap::from([
            ("systemd manager".to_string(), RestartUnit::SystemdManager),
            ("sysvinit".to_string(), RestartUnit::SysVInit),
        ]);
        let commands = build_restart_commands(&units, true);
        assert!(commands.contains(&vec!["systemctl".to_string(), "daemon-reexec".to_string()]));
        assert!(commands.contains(&vec!["telinit".to_string(), "u".to_string()]));
    }

    #[test]
    fn test_init_script_command() {
        let units = BTreeMap::from([(
            "nginx".to_string(),
            RestartUnit::InitScript {
                name: "nginx".into(),
                has_lsb: true,
                default_start: vec!['2', '3', '4', '5'],
                pidfiles: vec!["/run/nginx.pid".into()],
            },
        )]);
        let commands = build_restart_commands(&units, false);
        assert_eq!(commands, vec![vec!["service", "nginx", "restart"]]);
    }

    #[test]
    fn test_container_uses_recorded_argv() {
        let units = BTreeMap::from([(
            "web01".to_string(),
            RestartUnit::Container {
                name: "web01".into(),
                restart_argv: vec!["docker".into(), "restart".into(), "web01".into()],
            },
        )]);
        let commands = build_restart_commands(&units, true);
        assert_eq!(commands, vec![vec!["docker", "restart", "web01"]]);
    }

    #[test]
    fn test_combine_does_not_swallow_non_services() {
        let mut units = BTreeMap::from([service("foo.service")]);
        units.insert("systemd manager".to_string(), RestartUnit::SystemdManager);
        let commands = build_restart_commands(&units, true);
        assert_eq!(commands.len(), 2);
    }

    #[test]
    fn test_run_commands_counts_failures() {
        let commands = vec![
            vec!["true".to_string()],
            vec!["false".to_string()],
            vec!["/nonexistent/needrestart-test".to_string()],
        ];
        assert_eq!(run_commands(&commands), 2);
    }
}
