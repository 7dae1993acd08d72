//! GGUF inference backend built on boostr
//!
//! Loads GGUF models and runs a prefill + decode loop over a positional KV
//! cache. Sampling happens on the host so the EOS bias and the seeded RNG are
//! applied exactly; phase timings are measured around each forward pass.

use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use anyhow::{anyhow, bail, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use boostr::format::gguf_tokenizer::GgufTokenizer;
use boostr::format::Gguf;
use boostr::inference::LayeredKvCache;
use boostr::model::{AttentionConfig, UniversalConfig};
use boostr::{DType, Runtime, Tensor, VarBuilder, VarMap};

use super::{
    EngineTimings, InferenceEngine, LoadConfig, LoadedModel, ModelMetadata, RunOutput,
};
use crate::config::GenerationConfig;

#[cfg(feature = "cuda")]
type EngineRuntime = boostr::CudaRuntime;
#[cfg(not(feature = "cuda"))]
type EngineRuntime = boostr::CpuRuntime;

type EngineDevice = <EngineRuntime as Runtime>::Device;

const BOS_TOKEN: u32 = 1;

/// GGUF engine
pub struct GgufEngine {
    device: EngineDevice,
}

impl GgufEngine {
    pub fn new() -> Self {
        #[cfg(feature = "cuda")]
        let device = boostr::CudaDevice::new(0);
        #[cfg(not(feature = "cuda"))]
        let device = boostr::CpuDevice::new();

        Self { device }
    }
}

impl Default for GgufEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceEngine for GgufEngine {
    type Model = GgufModel;

    fn name(&self) -> &str {
        if cfg!(feature = "cuda") {
            "boostr-cuda"
        } else {
            "boostr-cpu"
        }
    }

    fn inspect(&self, path: &Path) -> Result<ModelMetadata> {
        let gguf = Gguf::open(path).map_err(|e| anyhow!("Failed to open GGUF file: {}", e))?;
        metadata_from_gguf(&gguf)
    }

    fn load(&self, config: &LoadConfig) -> Result<GgufModel> {
        let start = Instant::now();
        let path = config.model_path.as_path();

        tracing::debug!(
            "Loading {} (threads={}, batch threads={}, batch={}, gpu layers={}, ctx={})",
            path.display(),
            config.n_threads,
            config.n_threads_batch,
            config.n_batch,
            config.n_gpu_layers,
            config.n_ctx
        );

        let gguf = Gguf::open_with_mmap(path, false)
            .map_err(|e| anyhow!("Failed to open GGUF file: {}", e))?;
        let metadata = metadata_from_gguf(&gguf)?;
        let model_config = config_from_gguf(&gguf, &metadata)?;
        let tokenizer = GgufTokenizer::from_gguf(&gguf)?;

        let mut var_map = VarMap::<EngineRuntime>::from_gguf(path, &self.device)
            .map_err(|e| anyhow!("Failed to load GGUF tensors: {}", e))?;
        tracing::debug!("Loaded {} tensors from GGUF", var_map.len());

        let mut vb = VarBuilder::new(&mut var_map, &self.device);
        let model = boostr::model::LoadedModel::load(&model_config, &mut vb)
            .map_err(|e| anyhow!("Failed to load model: {}", e))?;

        let load_ms = start.elapsed().as_secs_f64() * 1000.0;

        Ok(GgufModel {
            num_layers: model.num_layers(),
            num_kv_heads: model.num_kv_heads().unwrap_or(8),
            head_dim: model.head_dim().unwrap_or(64),
            max_seq_len: model_config.max_seq_len.max(config.n_ctx),
            model,
            metadata,
            eos_token_id: tokenizer.eos_token_id(),
            device: self.device.clone(),
            n_ctx: config.n_ctx,
            kv_cache: None,
            origin: Instant::now(),
            timings: EngineTimings {
                load_ms,
                ..Default::default()
            },
        })
    }
}

/// A GGUF model loaded for one configuration point
pub struct GgufModel {
    model: boostr::model::LoadedModel<EngineRuntime>,
    metadata: ModelMetadata,
    eos_token_id: u32,
    device: EngineDevice,
    n_ctx: usize,
    num_layers: usize,
    num_kv_heads: usize,
    head_dim: usize,
    max_seq_len: usize,
    kv_cache: Option<LayeredKvCache<EngineRuntime>>,
    origin: Instant,
    timings: EngineTimings,
}

impl GgufModel {
    fn since_origin_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }

    fn new_kv_cache(&self) -> Result<LayeredKvCache<EngineRuntime>> {
        LayeredKvCache::new_positional(
            self.num_layers,
            1,
            self.num_kv_heads,
            self.n_ctx,
            self.max_seq_len,
            self.head_dim,
            DType::F32,
            &self.device,
        )
        .map_err(|e| anyhow!("Failed to create KV cache: {}", e))
    }

    /// Pick the next token from the last-position logits
    fn sample_token(
        &self,
        logits: &Tensor<EngineRuntime>,
        params: &GenerationConfig,
        rng: &mut StdRng,
    ) -> Result<u32> {
        let seq_len = logits.dim(1)?;
        let last = logits.narrow(1, seq_len - 1, 1)?.squeeze(Some(1)).contiguous();
        let mut values: Vec<f32> = last.to_vec();

        if let Some(eos) = values.get_mut(self.eos_token_id as usize) {
            *eos += params.eos_bias();
        }

        if params.is_greedy() {
            return Ok(argmax(&values));
        }

        // Softmax with temperature, then multinomial
        let max = values.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let scale = 1.0 / params.temperature;
        let mut sum = 0.0f32;
        for v in values.iter_mut() {
            *v = ((*v - max) * scale).exp();
            sum += *v;
        }

        let sample: f32 = rng.gen::<f32>() * sum;
        let mut cumsum = 0.0;
        for (i, &p) in values.iter().enumerate() {
            cumsum += p;
            if cumsum > sample {
                return Ok(i as u32);
            }
        }

        Ok(argmax(&values))
    }
}

impl LoadedModel for GgufModel {
    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn run(&mut self, prompt: &[u32], params: &GenerationConfig) -> Result<RunOutput> {
        // A zero-length prompt still needs one position to produce logits.
        let prompt: &[u32] = if prompt.is_empty() { &[BOS_TOKEN] } else { prompt };

        let mut timings = EngineTimings {
            load_ms: self.timings.load_ms,
            start_ms: self.since_origin_ms(),
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(params.seed);

        let mut kv_cache = match self.kv_cache.take() {
            Some(cache) => cache,
            None => self.new_kv_cache()?,
        };

        // Prefill
        let input = Tensor::from_slice(prompt, &[1, prompt.len()], &self.device);
        let position = kv_cache.seq_len();
        let t = Instant::now();
        let mut logits = self
            .model
            .forward_with_kv_cache(&input, &mut kv_cache, position)
            .map_err(|e| anyhow!("Forward pass failed: {}", e))?;
        timings.prompt_eval_ms = t.elapsed().as_secs_f64() * 1000.0;
        timings.n_prompt_eval = prompt.len();

        // Decode
        let mut tokens = Vec::with_capacity(params.max_tokens);
        for i in 0..params.max_tokens {
            let t = Instant::now();
            let next_token = self.sample_token(&logits, params, &mut rng)?;
            timings.sample_ms += t.elapsed().as_secs_f64() * 1000.0;
            timings.n_sample += 1;

            if next_token == self.eos_token_id {
                tracing::debug!("Hit EOS token after {} tokens", i);
                break;
            }
            tokens.push(next_token);

            if i + 1 == params.max_tokens {
                break;
            }

            let next_input = Tensor::from_slice(&[next_token], &[1, 1], &self.device);
            let position = kv_cache.seq_len();
            let t = Instant::now();
            logits = self
                .model
                .forward_with_kv_cache(&next_input, &mut kv_cache, position)
                .map_err(|e| anyhow!("Forward pass failed: {}", e))?;
            timings.eval_ms += t.elapsed().as_secs_f64() * 1000.0;
            timings.n_eval += 1;
        }

        timings.end_ms = self.since_origin_ms();
        self.timings = timings;
        self.kv_cache = Some(kv_cache);

        Ok(RunOutput {
            id: Some(format!("cmpl-{}", uuid::Uuid::new_v4())),
            tokens,
        })
    }

    fn reset(&mut self) {
        self.kv_cache = None;
    }

    fn timings(&self) -> EngineTimings {
        self.timings
    }
}

fn argmax(values: &[f32]) -> u32 {
    values
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i as u32)
        .unwrap_or(0)
}

fn metadata_from_gguf(gguf: &Gguf) -> Result<ModelMetadata> {
    let metadata = gguf.metadata();
    let arch = metadata.architecture().unwrap_or("llama");

    let vocab_size = if let Some(vs) = metadata.get_u32("general.vocab_size") {
        vs as usize
    } else if let Some(tokens) = metadata.get_array("tokenizer.ggml.tokens") {
        tokens.len()
    } else {
        bail!("GGUF missing vocabulary size");
    };

    let block_count = metadata
        .block_count()
        .ok_or_else(|| anyhow!("GGUF missing {}.block_count", arch))?
        .try_into()?;

    Ok(ModelMetadata {
        architecture: arch.to_string(),
        block_count,
        vocab_size,
        context_length: metadata.context_length().map(|v| v as usize),
        quantization: detect_quantization_type(gguf),
    })
}

/// Build the model configuration from GGUF metadata
///
/// Only attention (llama-family) architectures are supported; the decode loop
/// relies on a KV cache.
fn config_from_gguf(gguf: &Gguf, info: &ModelMetadata) -> Result<UniversalConfig> {
    let metadata = gguf.metadata();
    let arch = info.architecture.as_str();

    let model_type = match arch {
        "llama" | "llama2" | "llama3" => "llama",
        "mistral" => "mistral",
        other if other.starts_with("mamba") => {
            bail!("architecture '{}' has no KV cache and cannot be benchmarked", other)
        }
        _ => "llama",
    };

    let hidden_size: usize = metadata
        .embedding_length()
        .ok_or_else(|| anyhow!("GGUF missing {}.embedding_length", arch))?
        .try_into()?;

    let num_heads = metadata
        .get_u32(&format!("{}.attention.head_count", arch))
        .map(|v| v as usize)
        .unwrap_or(32);
    let num_kv_heads = metadata
        .get_u32(&format!("{}.attention.head_count_kv", arch))
        .map(|v| v as usize);
    let rope_theta = metadata
        .get_f32(&format!("{}.rope.freq_base", arch))
        .unwrap_or(10000.0);

    let attention = AttentionConfig {
        num_heads,
        num_kv_heads,
        head_dim: (num_heads > 0).then(|| hidden_size / num_heads),
        rope_theta: rope_theta as f32,
        rope_scaling: None,
        kv_latent_dim: None,
        q_latent_dim: None,
        d_rope: None,
        sliding_window: None,
    };

    Ok(UniversalConfig {
        model_type: model_type.to_string(),
        vocab_size: info.vocab_size,
        hidden_size,
        num_layers: info.block_count,
        max_seq_len: info.context_length.unwrap_or(4096),
        intermediate_size: metadata
            .get_u32(&format!("{}.feed_forward_length", arch))
            .map(|v| v as usize),
        rms_norm_eps: metadata
            .get_f32(&format!("{}.attention.layer_norm_rms_epsilon", arch))
            .map(|v| v as f64)
            .unwrap_or(1e-5),
        attention: Some(attention),
        ssm: None,
        moe: None,
        hybrid_layers: None,
        tie_word_embeddings: false,
    })
}

/// Most common tensor type in the file
fn detect_quantization_type(gguf: &Gguf) -> Option<String> {
    let mut type_counts: HashMap<String, usize> = HashMap::new();

    for name in gguf.tensor_names() {
        if let Ok(info) = gguf.tensor_info(name) {
            *type_counts.entry(format!("{:?}", info.ggml_type)).or_insert(0) += 1;
        }
    }

    type_counts
        .into_iter()
        .max_by_key(|(_, count)| *count)
        .map(|(t, _)| t)
}
