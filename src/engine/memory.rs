//! Peak memory tracking around the timed region

use std::process::Command;

use sysinfo::{Pid, ProcessesToUpdate, System};

use crate::config::MemoryPolicy;

const MIB: f64 = 1024.0 * 1024.0;

/// Peak readings for one configuration point, in MB
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MemorySnapshot {
    /// Peak usage seen by the driver (or the OS, for host memory)
    pub device_peak_mb: f64,
    /// Peak bytes handed out by the engine allocator
    pub engine_allocated_peak_mb: Option<f64>,
    /// Peak bytes reserved by the engine allocator
    pub engine_reserved_peak_mb: Option<f64>,
}

impl MemorySnapshot {
    /// Reduce the snapshot to a single figure under `policy`
    ///
    /// `AllocatedPlusExternal` is a rough estimate; it falls back to the
    /// device peak when the engine does not expose allocator statistics.
    pub fn report(&self, policy: MemoryPolicy) -> f64 {
        match policy {
            MemoryPolicy::DeviceTotal => self.device_peak_mb,
            MemoryPolicy::AllocatedPlusExternal => {
                match (self.engine_allocated_peak_mb, self.engine_reserved_peak_mb) {
                    (Some(allocated), Some(reserved)) => {
                        allocated + (self.device_peak_mb - reserved)
                    }
                    _ => self.device_peak_mb,
                }
            }
        }
    }
}

/// Device memory hooks called by the trial runner
///
/// `clear` and `reset_peak` run before warmup and again before the timed
/// region; `sample` runs after every timed trial.
pub trait MemoryProbe {
    /// Release cached allocations
    fn clear(&mut self);

    /// Forget the previous peak
    fn reset_peak(&mut self);

    /// Record current usage
    fn sample(&mut self);

    /// Peak since the last reset, if anything was sampled
    fn peak(&self) -> Option<MemorySnapshot>;
}

/// Probe that records nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMemoryProbe;

impl MemoryProbe for NoMemoryProbe {
    fn clear(&mut self) {}

    fn reset_peak(&mut self) {}

    fn sample(&mut self) {}

    fn peak(&self) -> Option<MemorySnapshot> {
        None
    }
}

/// Tracks the resident set size of the current process
pub struct HostMemoryProbe {
    sys: System,
    pid: Pid,
    peak_mb: Option<f64>,
}

impl HostMemoryProbe {
    pub fn new() -> Self {
        Self {
            sys: System::new(),
            pid: Pid::from(std::process::id() as usize),
            peak_mb: None,
        }
    }

    fn current_rss_mb(&mut self) -> f64 {
        self.sys.refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);
        self.sys
            .process(self.pid)
            .map(|p| p.memory() as f64 / MIB)
            .unwrap_or(0.0)
    }
}

impl Default for HostMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for HostMemoryProbe {
    fn clear(&mut self) {
        // Host allocations are freed when the previous model is dropped.
        tracing::debug!("host memory probe: nothing to clear");
    }

    fn reset_peak(&mut self) {
        self.peak_mb = None;
    }

    fn sample(&mut self) {
        let rss = self.current_rss_mb();
        self.peak_mb = Some(self.peak_mb.map_or(rss, |p| p.max(rss)));
    }

    fn peak(&self) -> Option<MemorySnapshot> {
        self.peak_mb.map(|device_peak_mb| MemorySnapshot {
            device_peak_mb,
            engine_allocated_peak_mb: None,
            engine_reserved_peak_mb: None,
        })
    }
}

/// Tracks used memory on the first NVIDIA GPU through `nvidia-smi`
///
/// The driver reports usage across all processes; nothing here can release
/// another process's allocations, so `clear` only logs.
#[derive(Debug, Default)]
pub struct GpuMemoryProbe {
    peak_mb: Option<f64>,
}

impl GpuMemoryProbe {
    pub fn new() -> Self {
        Self::default()
    }

    fn used_mb() -> Option<f64> {
        let output = Command::new("nvidia-smi")
            .arg("--query-gpu=memory.used")
            .arg("--format=csv,noheader,nounits")
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        parse_used_mb(&String::from_utf8_lossy(&output.stdout))
    }
}

/// First non-empty line of `memory.used` output, in MB
fn parse_used_mb(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())?
        .parse()
        .ok()
}

impl MemoryProbe for GpuMemoryProbe {
    fn clear(&mut self) {
        tracing::debug!("gpu memory probe: caches are released when the model is dropped");
    }

    fn reset_peak(&mut self) {
        self.peak_mb = None;
    }

    fn sample(&mut self) {
        match Self::used_mb() {
            Some(used) => self.peak_mb = Some(self.peak_mb.map_or(used, |p| p.max(used))),
            None => tracing::warn!("nvidia-smi did not report memory usage"),
        }
    }

    fn peak(&self) -> Option<MemorySnapshot> {
        self.peak_mb.map(|device_peak_mb| MemorySnapshot {
            device_peak_mb,
            engine_allocated_peak_mb: None,
            engine_reserved_peak_mb: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_device_total() {
        let snapshot = MemorySnapshot {
            device_peak_mb: 9000.0,
            engine_allocated_peak_mb: Some(6000.0),
            engine_reserved_peak_mb: Some(7000.0),
        };
        assert_eq!(snapshot.report(MemoryPolicy::DeviceTotal), 9000.0);
        // 6000 allocated + (9000 - 7000) external
        assert_eq!(snapshot.report(MemoryPolicy::AllocatedPlusExternal), 8000.0);
    }

    #[test]
    fn test_report_falls_back_without_allocator_stats() {
        let snapshot = MemorySnapshot {
            device_peak_mb: 512.0,
            ..Default::default()
        };
        assert_eq!(snapshot.report(MemoryPolicy::AllocatedPlusExternal), 512.0);
    }

    #[test]
    fn test_parse_used_mb() {
        assert_eq!(parse_used_mb("  5321\n812\n"), Some(5321.0));
        assert_eq!(parse_used_mb("[N/A]"), None);
        assert_eq!(parse_used_mb(""), None);
    }

    #[test]
    fn test_host_probe_tracks_peak() {
        let mut probe = HostMemoryProbe::new();
        assert!(probe.peak().is_none());

        probe.sample();
        let peak = probe.peak().unwrap();
        assert!(peak.device_peak_mb > 0.0);

        probe.reset_peak();
        assert!(probe.peak().is_none());
    }
}
