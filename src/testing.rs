//! In-memory engine for unit tests

use std::cell::{Cell, RefCell};
use std::path::Path;
use std::rc::Rc;

use anyhow::{bail, Result};

use crate::config::GenerationConfig;
use crate::engine::{
    EngineTimings, InferenceEngine, LoadConfig, LoadedModel, ModelMetadata, RunOutput,
};

/// Call counters shared between an engine and the models it loads
#[derive(Debug, Default)]
pub struct Calls {
    pub loads: Cell<usize>,
    pub runs: Cell<usize>,
    pub resets: Cell<usize>,
    pub prompts: RefCell<Vec<Vec<u32>>>,
}

/// Engine that returns canned timings
pub struct ScriptedEngine {
    pub metadata: ModelMetadata,
    pub timings: EngineTimings,
    /// Fail every run on points with this thread count
    pub fail_threads: Option<usize>,
    /// Completion id returned by every run; a counter-based id otherwise
    pub fixed_id: Option<String>,
    /// Emit this many tokens instead of the requested count
    pub short_output: Option<usize>,
    pub calls: Rc<Calls>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            metadata: ModelMetadata {
                architecture: "llama".to_string(),
                block_count: 39,
                vocab_size: 32000,
                context_length: Some(4096),
                quantization: Some("Q5_K".to_string()),
            },
            timings: EngineTimings {
                load_ms: 1500.0,
                sample_ms: 20.0,
                prompt_eval_ms: 400.0,
                eval_ms: 2000.0,
                start_ms: 0.0,
                end_ms: 2500.0,
                n_sample: 100,
                n_prompt_eval: 500,
                n_eval: 99,
            },
            fail_threads: None,
            fixed_id: None,
            short_output: None,
            calls: Rc::new(Calls::default()),
        }
    }
}

impl InferenceEngine for ScriptedEngine {
    type Model = ScriptedModel;

    fn name(&self) -> &str {
        "scripted"
    }

    fn kernel(&self) -> Option<&str> {
        Some("naive")
    }

    fn inspect(&self, _path: &Path) -> Result<ModelMetadata> {
        Ok(self.metadata.clone())
    }

    fn load(&self, config: &LoadConfig) -> Result<ScriptedModel> {
        self.calls.loads.set(self.calls.loads.get() + 1);
        Ok(ScriptedModel {
            metadata: self.metadata.clone(),
            timings: self.timings,
            fail: self.fail_threads == Some(config.n_threads),
            fixed_id: self.fixed_id.clone(),
            short_output: self.short_output,
            calls: Rc::clone(&self.calls),
        })
    }
}

pub struct ScriptedModel {
    metadata: ModelMetadata,
    timings: EngineTimings,
    fail: bool,
    fixed_id: Option<String>,
    short_output: Option<usize>,
    calls: Rc<Calls>,
}

impl LoadedModel for ScriptedModel {
    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn run(&mut self, prompt: &[u32], params: &GenerationConfig) -> Result<RunOutput> {
        let n = self.calls.runs.get() + 1;
        self.calls.runs.set(n);
        self.calls.prompts.borrow_mut().push(prompt.to_vec());
        if self.fail {
            bail!("CUDA out of memory");
        }

        let count = self.short_output.unwrap_or(params.max_tokens);
        Ok(RunOutput {
            id: Some(
                self.fixed_id
                    .clone()
                    .unwrap_or_else(|| format!("cmpl-{}", n)),
            ),
            tokens: vec![7; count],
        })
    }

    fn reset(&mut self) {
        self.calls.resets.set(self.calls.resets.get() + 1);
    }

    fn timings(&self) -> EngineTimings {
        self.timings
    }
}
