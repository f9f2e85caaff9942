//! Process snapshot and per-process evidence collection.
//!
//! This layer reads `/proc` and nothing else:
//! - Process table snapshot (pid, ppid, uid, start ticks, exe symlink)
//! - Memory-map staleness inspection
//! - Cgroup membership parsing for unit attribution
//! - Container detection
//!
//! Per-PID failures never abort a scan; a process that exits mid-walk is
//! silently skipped.

pub mod cgroup;
pub mod container;
pub mod maps;
pub mod proc_table;

pub use cgroup::{
    classify_cgroup_line, systemctl_unit_for_pid, unit_for_pid, unit_from_content, CgroupUnit,
};
pub use container::{
    container_from_content, container_of_pid, detect_container_from_cgroup, enumerate_containers,
    in_container, pid1_in_container, ContainerHit, ContainerRuntime,
};
pub use maps::{
    device_matches, entry_verdict, is_stale, parse_maps_content, MapEntry, StaleCheck, Verdict,
};
pub use proc_table::{
    clk_tck, classify_exe_link, parse_btime_content, parse_stat_content, read_exe, snapshot,
    ExeLink, ProcessRecord, Snapshot, StatFields,
};
