//! Machine introspection
//!
//! The identity is computed once per invocation and copied into every record.
//! GPU facts come from `nvidia-smi`; RAM and CPU count come from `sysinfo`.

use std::path::Path;
use std::process::Command;

use serde::{Deserialize, Serialize};
use sysinfo::System;

use crate::bench::aggregate::round2;
use crate::error::{BenchError, Result};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Device name recorded when no accelerator is present
pub const CPU_ONLY: &str = "cpu only";

/// Hardware and model facts that identify where a record was measured
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineIdentity {
    #[serde(rename = "Device")]
    pub device: String,
    #[serde(rename = "VRAM (GB)")]
    pub vram_gb: f64,
    #[serde(rename = "RAM (GB)")]
    pub ram_gb: f64,
    #[serde(rename = "CPU Count")]
    pub cpu_count: usize,
    #[serde(rename = "Model")]
    pub model: String,
    #[serde(rename = "Model Size (GB)")]
    pub model_size_gb: f64,
}

/// First accelerator reported by the driver
#[derive(Debug, Clone, PartialEq)]
pub struct GpuInfo {
    pub name: String,
    pub memory_total_mb: f64,
}

impl MachineIdentity {
    /// Probe the host and stat the model file
    pub fn detect(model_path: &Path, gpu: Option<&GpuInfo>) -> Result<Self> {
        let sys = System::new_all();

        let model_size = std::fs::metadata(model_path)?.len();
        let model = model_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| model_path.display().to_string());

        let identity = Self {
            device: gpu.map_or_else(|| CPU_ONLY.to_string(), |g| g.name.clone()),
            vram_gb: gpu.map_or(0.0, |g| round2(g.memory_total_mb / 1024.0)),
            ram_gb: round2(sys.total_memory() as f64 / GIB),
            cpu_count: sys.cpus().len(),
            model,
            model_size_gb: round2(model_size as f64 / GIB),
        };
        tracing::info!(
            "Machine: {} ({} GB VRAM, {} GB RAM, {} CPUs)",
            identity.device,
            identity.vram_gb,
            identity.ram_gb,
            identity.cpu_count
        );
        Ok(identity)
    }
}

/// Query the first NVIDIA GPU, if any
pub fn detect_gpu() -> Option<GpuInfo> {
    let output = Command::new("nvidia-smi")
        .arg("--query-gpu=name,memory.total")
        .arg("--format=csv,noheader,nounits")
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    parse_nvidia_smi(&String::from_utf8_lossy(&output.stdout))
}

/// Parse `name, memory.total` lines; only the first GPU is used
pub fn parse_nvidia_smi(stdout: &str) -> Option<GpuInfo> {
    let line = stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
    let (name, memory) = line.rsplit_once(',')?;
    Some(GpuInfo {
        name: name.trim().to_string(),
        memory_total_mb: memory.trim().parse().ok()?,
    })
}

/// Fail fast when an accelerator is required but absent
pub fn require_accelerator(gpu: Option<GpuInfo>) -> Result<GpuInfo> {
    gpu.ok_or_else(|| {
        BenchError::EnvironmentUnavailable(
            "no CUDA device found (nvidia-smi unavailable); pass --cpu to benchmark on the host"
                .to_string(),
        )
    })
}
