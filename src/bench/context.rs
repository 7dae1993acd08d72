//! Per-invocation state shared by every point of a sweep

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::bench::run_name::random_run_name;
use crate::config::{GenerationConfig, RunOptions};
use crate::machine::MachineIdentity;

/// Built once per invocation and passed explicitly to the sweep
#[derive(Debug, Clone)]
pub struct RunContext {
    /// `adjective_noun` label shared by all records of this invocation
    pub run_name: String,
    pub machine: MachineIdentity,
    pub options: RunOptions,
    pub generation: GenerationConfig,
    cancel: Arc<AtomicBool>,
}

impl RunContext {
    pub fn new(machine: MachineIdentity, options: RunOptions, generation: GenerationConfig) -> Self {
        Self {
            run_name: random_run_name(&mut rand::thread_rng()),
            machine,
            options,
            generation,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_run_name(mut self, run_name: impl Into<String>) -> Self {
        self.run_name = run_name.into();
        self
    }

    /// Flag an interrupt handler can set to stop the sweep between points
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn machine() -> MachineIdentity {
        MachineIdentity {
            device: "NVIDIA A10".to_string(),
            vram_gb: 22.49,
            ram_gb: 62.8,
            cpu_count: 16,
            model: "llama-2-7b.Q5_K_M.gguf".to_string(),
            model_size_gb: 4.45,
        }
    }

    pub(crate) fn context() -> RunContext {
        RunContext::new(machine(), RunOptions::default(), GenerationConfig::default())
            .with_run_name("calm_heron")
    }

    #[test]
    fn test_cancel_handle_is_shared() {
        let ctx = context();
        assert!(!ctx.is_cancelled());
        ctx.cancel_handle().store(true, Ordering::SeqCst);
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_run_name_generated() {
        let ctx = RunContext::new(machine(), RunOptions::default(), GenerationConfig::default());
        assert!(ctx.run_name.contains('_'));
    }
}
