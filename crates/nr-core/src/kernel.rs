//! Booted-kernel vs installed-image comparison.
//!
//! The running kernel's release string (`uname -r`) is its ABI tag; its
//! version is the leading run of numeric components (`5.10.0-21-amd64` →
//! `5.10.0-21`). Installed images are the `vmlinuz-*`/`vmlinux-*` files in
//! `/boot`, ordered by kernel-version ordering: components split on `.` and
//! `-` compare numerically when both are numeric, byte-wise otherwise.
//!
//! Any failure to read or parse collapses to `Unknown`; the kernel check
//! never aborts the library check.

use std::cmp::Ordering;
use std::fs;
use std::path::Path;

use tracing::debug;

/// Outcome of the kernel comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelStatus {
    /// Running kernel equals the newest installed image.
    NoUpgrade,
    /// Same version base, different ABI tag.
    AbiUpgrade,
    /// Version differs.
    VerUpgrade,
    /// No installed kernel image found.
    Unknown,
}

impl KernelStatus {
    /// Stable integer for the batch `NEEDRESTART-KSTA` record.
    pub fn batch_code(self) -> u8 {
        match self {
            KernelStatus::NoUpgrade => 0,
            KernelStatus::AbiUpgrade => 1,
            KernelStatus::VerUpgrade => 2,
            KernelStatus::Unknown => 3,
        }
    }
}

/// Kernel comparison result.
#[derive(Debug, Clone)]
pub struct KernelInfo {
    /// ABI tag of the booted kernel.
    pub running: String,
    /// ABI tag of the newest installed image, when one was found.
    pub expected: Option<String>,
    pub status: KernelStatus,
}

/// The leading numeric component run of a release string.
pub fn version_base(release: &str) -> &str {
    let mut cursor = 0usize;
    let mut end = 0usize;

    for part in release.split(['.', '-']) {
        let part_end = cursor + part.len();
        if !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()) {
            end = part_end;
        } else {
            break;
        }
        cursor = part_end + 1;
    }

    &release[..end]
}

/// Kernel-version ordering, not string ordering.
pub fn compare_kernel_versions(a: &str, b: &str) -> Ordering {
    let mut pa = a.split(['.', '-']);
    let mut pb = b.split(['.', '-']);

    loop {
        match (pa.next(), pb.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(ca), Some(cb)) => {
                let ord = match (ca.parse::<u64>(), cb.parse::<u64>()) {
                    (Ok(na), Ok(nb)) => na.cmp(&nb),
                    _ => ca.cmp(cb),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

/// Release tags of installed kernel images in a boot directory.
pub fn installed_kernels(boot_dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(boot_dir) else {
        return Vec::new();
    };

    entries
        .flatten()
        .filter_map(|e| {
            let name = e.file_name().to_str()?.to_string();
            let release = name
                .strip_prefix("vmlinuz-")
                .or_else(|| name.strip_prefix("vmlinux-"))?;
            (!release.is_empty()).then(|| release.to_string())
        })
        .collect()
}

/// Compare a running release against the images in `boot_dir`.
pub fn check_kernel_with(boot_dir: &Path, running: &str) -> KernelInfo {
    let expected = installed_kernels(boot_dir)
        .into_iter()
        .max_by(|a, b| compare_kernel_versions(a, b));

    let status = match expected.as_deref() {
        None => KernelStatus::Unknown,
        Some(exp) if exp == running => KernelStatus::NoUpgrade,
        Some(exp) if version_base(exp) == version_base(running) => KernelStatus::AbiUpgrade,
        Some(_) => KernelStatus::VerUpgrade,
    };

    debug!(running, expected = expected.as_deref().unwrap_or("-"),
        status = ?status, "kernel comparison");

    KernelInfo {
        running: running.to_string(),
        expected,
        status,
    }
}

/// Compare the booted kernel against `/boot`.
pub fn check_kernel() -> KernelInfo {
    let running = match nix::sys::utsname::uname() {
        Ok(uts) => uts.release().to_string_lossy().into_owned(),
        Err(_) => {
            return KernelInfo {
                running: String::new(),
                expected: None,
                status: KernelStatus::Unknown,
            }
        }
    };

    check_kernel_with(Path::new("/boot"), &running)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boot_dir_with(images: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        for image in images {
            fs::write(dir.path().join(image), b"\x1f\x8b").expect("write image");
        }
        dir
    }

    #[test]
    fn test_version_base() {
        assert_eq!(version_base("5.10.0-21-amd64"), "5.10.0-21");
        assert_eq!(version_base("6.1.0-13-cloud-amd64"), "6.1.0-13");
        assert_eq!(version_base("5.10.0"), "5.10.0");
        assert_eq!(version_base("custom"), "");
    }

    #[test]
    fn test_compare_numeric_components() {
        assert_eq!(
            compare_kernel_versions("5.10.0-21-amd64", "5.10.0-23-amd64"),
            Ordering::Less
        );
        // Numeric comparison, not string: 9 < 10.
        assert_eq!(
            compare_kernel_versions("5.9.0-1-amd64", "5.10.0-1-amd64"),
            Ordering::Less
        );
        assert_eq!(
            compare_kernel_versions("5.10.0-21-amd64", "5.10.0-21-amd64"),
            Ordering::Equal
        );
    }

    #[test]
    fn test_compare_mixed_components() {
        // Non-numeric components fall back to byte ordering.
        assert_eq!(
            compare_kernel_versions("5.10.0-21-amd64", "5.10.0-21-cloud-amd64"),
            Ordering::Less
        );
        // Shorter is less on a common prefix.
        assert_eq!(
            compare_kernel_versions("5.10.0-21", "5.10.0-21-amd64"),
            Ordering::Less
        );
    }

    #[test]
    fn test_no_upgrade() {
        let boot = boot_dir_with(&["vmlinuz-5.10.0-21-amd64", "vmlinuz-5.10.0-19-amd64"]);
        let info = check_kernel_with(boot.path(), "5.10.0-21-amd64");
        assert_eq!(info.status, KernelStatus::NoUpgrade);
        assert_eq!(info.expected.as_deref(), Some("5.10.0-21-amd64"));
    }

    #[test]
    fn test_version_upgrade() {
        let boot = boot_dir_with(&[
            "vmlinuz-5.10.0-21-amd64",
            "vmlinuz-5.10.0-23-amd64",
            "System.map-5.10.0-23-amd64",
            "config-5.10.0-23-amd64",
        ]);
        let info = check_kernel_with(boot.path(), "5.10.0-21-amd64");
        assert_eq!(info.status, KernelStatus::VerUpgrade);
        assert_eq!(info.status.batch_code(), 2);
        assert_eq!(info.expected.as_deref(), Some("5.10.0-23-amd64"));
        assert_eq!(info.running, "5.10.0-21-amd64");
    }

    #[test]
    fn test_abi_upgrade() {
        let boot = boot_dir_with(&["vmlinuz-5.10.0-21-amd64", "vmlinuz-5.10.0-21-cloud-amd64"]);
        let info = check_kernel_with(boot.path(), "5.10.0-21-amd64");
        assert_eq!(info.status, KernelStatus::AbiUpgrade);
        assert_eq!(info.status.batch_code(), 1);
    }

    #[test]
    fn test_unknown_without_images() {
        let boot = boot_dir_with(&["System.map-5.10.0-21-amd64", "grub"]);
        let info = check_kernel_with(boot.path(), "5.10.0-21-amd64");
        assert_eq!(info.status, KernelStatus::Unknown);
        assert!(info.expected.is_none());
        assert_eq!(info.status.batch_code(), 3);
    }

    #[test]
    fn test_unknown_missing_boot_dir() {
        let info = check_kernel_with(Path::new("/nonexistent/boot"), "5.10.0-21-amd64");
        assert_eq!(info.status, KernelStatus::Unknown);
    }

    #[test]
    fn test_vmlinux_prefix_accepted() {
        let boot = boot_dir_with(&["vmlinux-6.1.0-13-powerpc64"]);
        let info = check_kernel_with(boot.path(), "6.1.0-13-powerpc64");
        assert_eq!(info.status, KernelStatus::NoUpgrade);
    }
}
