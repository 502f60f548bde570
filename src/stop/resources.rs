//! Resource probes used by the resource-exhaustion detector.

use std::path::{Path, PathBuf};
use std::process::Command;

use sysinfo::{Disks, System};

use crate::error::{EvalLoopError, Result};

const MB: u64 = 1024 * 1024;

/// Available resources at one point in time. `None` means unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceSnapshot {
    pub available_memory_mb: Option<u64>,
    pub available_disk_mb: Option<u64>,
}

/// Source of [`ResourceSnapshot`]s.
pub trait ResourceProbe: Send + Sync {
    fn sample(&self) -> Result<ResourceSnapshot>;
}

/// Samples available memory and the free space of the filesystem holding
/// `path` (the working directory by default).
#[derive(Debug, Clone)]
pub struct SystemResourceProbe {
    path: PathBuf,
}

impl SystemResourceProbe {
    pub fn new() -> Self {
        Self {
            path: PathBuf::from("."),
        }
    }

    /// Measure disk space on the filesystem holding `path`.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn available_memory_mb(&self) -> Option<u64> {
        let mut sys = System::new();
        sys.refresh_memory();
        let available = sys.available_memory();
        // Some platforms report 0 available; fall back to total - used
        let available = if available == 0 {
            sys.total_memory().saturating_sub(sys.used_memory())
        } else {
            available
        };
        (available > 0).then_some(available / MB)
    }

    fn available_disk_mb(&self) -> Result<Option<u64>> {
        let path = self.path.canonicalize().map_err(|e| EvalLoopError::Detector {
            name: "resource_exhausted".to_string(),
            message: format!("cannot resolve {}: {}", self.path.display(), e),
        })?;

        let disks = Disks::new_with_refreshed_list();
        let mounts: Vec<(PathBuf, u64)> = disks
            .list()
            .iter()
            .map(|d| (d.mount_point().to_path_buf(), d.available_space()))
            .collect();
        if let Some(bytes) = available_on(&mounts, &path) {
            return Ok(Some(bytes / MB));
        }

        log::debug!("No mount found for {}, asking df", path.display());
        Ok(df_available(&path).map(|bytes| bytes / MB))
    }
}

impl Default for SystemResourceProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProbe for SystemResourceProbe {
    fn sample(&self) -> Result<ResourceSnapshot> {
        let snapshot = ResourceSnapshot {
            available_memory_mb: self.available_memory_mb(),
            available_disk_mb: self.available_disk_mb()?,
        };
        tracing::debug!(
            memory_mb = ?snapshot.available_memory_mb,
            disk_mb = ?snapshot.available_disk_mb,
            path = %self.path.display(),
            "Sampled resources"
        );
        Ok(snapshot)
    }
}

/// Available bytes on the mount that holds `path`: the longest mount point
/// that is a prefix of it.
fn available_on(mounts: &[(PathBuf, u64)], path: &Path) -> Option<u64> {
    mounts
        .iter()
        .filter(|(mount, _)| path.starts_with(mount))
        .max_by_key(|(mount, _)| mount.components().count())
        .map(|(_, available)| *available)
}

/// Available bytes reported by `df` for `path`, or `None` if df is missing or
/// its output is unreadable.
fn df_available(path: &Path) -> Option<u64> {
    let output = Command::new("df")
        .args(["-B1", "--output=avail"])
        .arg(path)
        .output()
        .ok()?;
    if !output.status.success() {
        log::warn!("df failed: {}", String::from_utf8_lossy(&output.stderr).trim());
        return None;
    }
    parse_df_avail(&String::from_utf8_lossy(&output.stdout))
}

/// Parse `df -B1 --output=avail`: a header line, then the byte count.
fn parse_df_avail(output: &str) -> Option<u64> {
    output
        .lines()
        .skip(1)
        .find_map(|line| line.trim().parse().ok())
}
