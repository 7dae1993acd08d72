//! Generation parameters used for every benchmark trial

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};

/// Sampling configuration handed to the inference engine
///
/// Benchmarks need every trial to emit exactly the requested number of tokens,
/// so the defaults pin the seed and push the EOS logit to negative infinity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Number of tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Temperature for sampling (0 = greedy)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Random seed for the sampler
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Apply a -inf logit bias to the EOS token so generation never stops early
    #[serde(default = "default_true")]
    pub suppress_eos: bool,
}

fn default_max_tokens() -> usize {
    100
}

fn default_temperature() -> f32 {
    0.3
}

fn default_seed() -> u64 {
    101
}

fn default_true() -> bool {
    true
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            seed: default_seed(),
            suppress_eos: true,
        }
    }
}

impl GenerationConfig {
    /// Same sampling settings, fixed output length
    pub fn with_max_tokens(&self, max_tokens: usize) -> Self {
        Self {
            max_tokens,
            ..self.clone()
        }
    }

    /// Reject temperatures the sampler cannot use
    pub fn validate(&self) -> Result<()> {
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(BenchError::invalid(
                "temperature",
                self.temperature,
                "must be a finite value of at least 0",
            ));
        }
        Ok(())
    }

    /// Check if greedy decoding should be used
    pub fn is_greedy(&self) -> bool {
        self.temperature == 0.0
    }

    /// Logit bias to add to the EOS token
    pub fn eos_bias(&self) -> f32 {
        if self.suppress_eos {
            f32::NEG_INFINITY
        } else {
            0.0
        }
    }
}
