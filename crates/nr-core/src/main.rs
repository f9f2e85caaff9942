//! needrestart: restart check for daemons running outdated code.
//!
//! The driver wires the pipeline together: snapshot the process table,
//! classify each process, reduce stale processes to restart units, compare
//! the kernel, render the result, and (mode permitting) execute restarts
//! and session notifications. All mutable run state lives here; the
//! components below are pure functions over the snapshot plus explicit
//! side effects.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use clap::Parser;
use tracing::{debug, warn};

use nr_common::{DetailMode, RestartMode, Verbosity};
use nr_config::load_config;
use nr_core::collect::{self, Snapshot, StaleCheck};
use nr_core::exit_codes::NagiosStatus;
use nr_core::interp;
use nr_core::kernel;
use nr_core::logging::init_logging;
use nr_core::notify;
use nr_core::output::{render_batch, render_human, render_nagios, Report};
use nr_core::reduce::{self, LiveHost, Reduction, RestartUnit};
use nr_core::restart;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Restart check for daemons running outdated binaries, libraries or
/// interpreted scripts, and for pending kernel upgrades.
#[derive(Parser, Debug)]
#[command(name = "needrestart", version, about)]
struct Cli {
    /// Verbose output
    #[arg(short = 'v', overrides_with = "quiet")]
    verbose: bool,

    /// Quiet mode, errors only
    #[arg(short = 'q', overrides_with = "verbose")]
    quiet: bool,

    /// Default answer "no" in interactive prompts
    #[arg(short = 'n')]
    defno: bool,

    /// Configuration file
    #[arg(short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Restart mode: (l)ist only, (i)nteractive, (a)utomatic
    #[arg(short = 'r', value_enum, value_name = "MODE")]
    restart: Option<RestartMode>,

    /// Detail level: (e)asy, (a)dvanced
    #[arg(short = 'm', value_enum, value_name = "MODE")]
    ui_mode: Option<DetailMode>,

    /// Batch mode: machine-readable output on stdout
    #[arg(short = 'b')]
    batch: bool,

    /// Nagios plugin mode (implies -b, requires root)
    #[arg(short = 'p')]
    plugin: bool,

    /// Override the interactive dialog frontend
    #[arg(short = 'f', value_name = "FRONTEND")]
    frontend: Option<String>,

    /// Check for pending kernel upgrades only
    #[arg(short = 'k')]
    kernel: bool,

    /// Check for outdated processes/libraries only
    #[arg(short = 'l')]
    libs: bool,
}

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    // Usage errors exit 1, not clap's default 2; --help/--version exit 0.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = e.print();
            return code;
        }
    };
    let batch = cli.batch || cli.plugin;
    let euid = nix::unistd::geteuid().as_raw();
    let root = euid == 0;

    if cli.plugin && !root {
        println!("UNKN - needs to be root");
        return NagiosStatus::Unknown.as_i32();
    }

    let mut config = match load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("needrestart: {}", e);
            return 1;
        }
    };

    // CLI values win over file values; the merged result is frozen.
    if cli.verbose {
        config.verbosity = Verbosity::Verbose;
    } else if cli.quiet {
        config.verbosity = Verbosity::Quiet;
    }
    if let Some(mode) = cli.restart {
        config.restart = mode;
    }
    if batch {
        // Machine output never restarts anything.
        config.restart = RestartMode::ListOnly;
    }
    if let Some(mode) = cli.ui_mode {
        config.ui_mode = mode;
    }
    if cli.defno {
        config.defno = true;
    }
    let config = config;

    init_logging(config.verbosity);

    if let Some(frontend) = &cli.frontend {
        // The dialog layer reads this; the core never does.
        std::env::set_var("NEEDRESTART_FRONTEND", frontend);
    }

    let (do_kernel, do_libs) =
        plan_checks(cli.kernel, cli.libs, root, config.kernelhints.enabled());

    let kernel_info = if do_kernel && !collect::pid1_in_container() {
        Some(kernel::check_kernel())
    } else {
        None
    };

    let mut reduction = Reduction::default();
    let mut containers = BTreeMap::new();

    if do_libs {
        let snapshot = match collect::snapshot() {
            Ok(s) => s,
            Err(e) => {
                eprintln!("needrestart: {}", e);
                return 1;
            }
        };

        let stale = classify(&snapshot, &config);
        debug!(stale = stale.len(), "staleness classification complete");

        let host = LiveHost {
            config: &config,
            verbose: config.verbosity.is_verbose(),
        };
        reduction = reduce::reduce(&snapshot, &stale, &config, &host, euid);

        if root {
            let stale_vec: Vec<u32> = stale.iter().copied().collect();
            containers =
                collect::enumerate_containers(&snapshot, &stale_vec, &config.override_cont);
        }
    }

    let report = Report {
        version: VERSION,
        kernel: kernel_info,
        reduction,
        containers,
    };

    if cli.plugin {
        let (line, status) = render_nagios(&report);
        println!("{}", line);
        return status.as_i32();
    }

    if batch {
        print!("{}", render_batch(&report));
        return 0;
    }

    print!(
        "{}",
        render_human(&report, config.ui_mode, config.kernelhints)
    );

    if root && do_libs {
        let mut units = report.reduction.units.clone();
        for (name, argv) in &report.containers {
            units.insert(
                name.clone(),
                RestartUnit::Container {
                    name: name.clone(),
                    restart_argv: argv.clone(),
                },
            );
        }

        let failures = restart::execute(&units, &config);
        if failures > 0 {
            warn!(failures, "restart commands failed");
        }

        if config.sendnotify {
            notify::notify_all(&config.notify_d, &report.reduction.sessions);
        }
    }

    0
}

/// Which checks this run performs, as `(kernel, libs)`.
///
/// `-k` and `-l` each restrict the run to one check; with neither flag both
/// run. The kernel check is root-only. For a non-root `-k` the restriction
/// is dropped, not the run: the library check still happens.
fn plan_checks(kernel_only: bool, libs_only: bool, root: bool, kernelhints: bool) -> (bool, bool) {
    let do_kernel = (kernel_only || !libs_only) && root && kernelhints;
    let do_libs = libs_only || !kernel_only || !root;
    (do_kernel, do_libs)
}

/// Classify every snapshot process as fresh or stale.
///
/// Priority: blacklisted exe is fresh outright; then the deleted-exe marker
/// and the map inspection; an interpreter whose script outlived it comes
/// last and only when interpreter scanning is enabled.
fn classify(snapshot: &Snapshot, config: &nr_config::Config) -> BTreeSet<u32> {
    let check = StaleCheck {
        blacklist: &config.blacklist,
    };
    let mut stale = BTreeSet::new();

    for (&pid, rec) in &snapshot.processes {
        let Some(exe) = &rec.exe else {
            continue; // kernel thread
        };

        let mut is_stale = collect::is_stale(pid, exe, &check);

        if !is_stale
            && config.interpscan
            && !config.exe_blacklisted(&exe.path.to_string_lossy())
        {
            if let Some(start) = snapshot.start_time_unix(pid) {
                is_stale = interp::interp_check(pid, &exe.path, start);
            }
        }

        if is_stale {
            debug!(pid, exe = %exe.path.display(), comm = %rec.comm, "stale process");
            stale.insert(pid);
        }
    }

    stale
}

#[cfg(test)]
mod tests {
    use super::plan_checks;

    #[test]
    fn test_plan_checks_root_defaults() {
        assert_eq!(plan_checks(false, false, true, true), (true, true));
    }

    #[test]
    fn test_plan_checks_root_restrictions() {
        assert_eq!(plan_checks(true, false, true, true), (true, false));
        assert_eq!(plan_checks(false, true, true, true), (false, true));
        assert_eq!(plan_checks(true, true, true, true), (true, true));
    }

    #[test]
    fn test_plan_checks_kernelhints_disable_kernel_only() {
        assert_eq!(plan_checks(false, false, true, false), (false, true));
        assert_eq!(plan_checks(true, false, true, false), (false, false));
    }

    #[test]
    fn test_plan_checks_non_root_never_checks_kernel() {
        assert_eq!(plan_checks(false, false, false, true), (false, true));
        assert_eq!(plan_checks(false, true, false, true), (false, true));
    }

    #[test]
    fn test_plan_checks_non_root_kernel_flag_still_checks_libs() {
        // -k without root drops the restriction, not the whole run.
        assert_eq!(plan_checks(true, false, false, true), (false, true));
    }
}
