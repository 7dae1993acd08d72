//! Benchmark sweep command

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Result};

use super::BenchArgs;
use crate::bench::RunContext;
use crate::config::BenchConfig;
use crate::engine::{GpuMemoryProbe, HostMemoryProbe, MemoryProbe};
use crate::loader::resolve_model_path;
use crate::machine::{detect_gpu, require_accelerator, MachineIdentity};

/// Run a benchmark sweep
pub async fn bench(args: BenchArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => BenchConfig::from_file(path)?,
        None => BenchConfig::default(),
    };
    args.apply(&mut config);

    let model_path = resolve_model_path(&args.model)?;
    tracing::info!("Benchmarking {}", model_path.display());

    let on_host = runs_on_host(args.cpu)?;
    if on_host && !args.cpu {
        tracing::info!("Built without CUDA, trials run on the host");
    }
    let gpu = if on_host {
        None
    } else {
        Some(require_accelerator(detect_gpu())?)
    };
    let machine = MachineIdentity::detect(&model_path, gpu.as_ref())?;

    let ctx = RunContext::new(machine, config.run.clone(), config.generation.clone());
    tracing::info!("Run name: {}", ctx.run_name);

    let cancel = ctx.cancel_handle();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if interrupt(&cancel) {
                tracing::warn!("Second interrupt, exiting without finishing the sweep");
                std::process::exit(130);
            }
            tracing::warn!(
                "Interrupt received, finishing the current configuration (Ctrl-C again to exit)"
            );
        }
    });

    let mut memory: Box<dyn MemoryProbe> = if on_host {
        Box::new(HostMemoryProbe::new())
    } else {
        Box::new(GpuMemoryProbe::new())
    };

    let report = tokio::task::block_in_place(|| {
        sweep(&config, &model_path, &ctx, memory.as_mut())
    })?;

    println!(
        "\n{}: {} succeeded, {} failed, {} skipped",
        ctx.run_name, report.succeeded, report.failed, report.skipped
    );
    if report.cancelled {
        println!("Sweep interrupted; completed configurations were kept.");
    }
    Ok(())
}

/// Whether trials execute on the host instead of an accelerator
///
/// Only a CUDA build runs on the GPU, and it cannot fall back to the host.
fn runs_on_host(cpu_flag: bool) -> Result<bool> {
    let cuda = cfg!(feature = "cuda");
    if cpu_flag && cuda {
        bail!("--cpu is not available in a CUDA build. Rebuild without --features cuda.");
    }
    Ok(!cuda)
}

/// Flag the sweep for cancellation; true when it was already flagged
fn interrupt(cancel: &AtomicBool) -> bool {
    cancel.swap(true, Ordering::SeqCst)
}

#[cfg(feature = "boostr")]
fn sweep(
    config: &BenchConfig,
    model_path: &std::path::Path,
    ctx: &RunContext,
    memory: &mut dyn MemoryProbe,
) -> Result<crate::bench::SweepReport> {
    let engine = crate::engine::GgufEngine::new();
    Ok(crate::bench::run_benchmark(&engine, config, model_path, ctx, memory)?)
}

#[cfg(not(feature = "boostr"))]
fn sweep(
    _config: &BenchConfig,
    _model_path: &std::path::Path,
    _ctx: &RunContext,
    _memory: &mut dyn MemoryProbe,
) -> Result<crate::bench::SweepReport> {
    Err(crate::error::BenchError::EnvironmentUnavailable(
        "no inference backend compiled in. Rebuild with --features boostr (or --features cuda)."
            .to_string(),
    )
    .into())
}
