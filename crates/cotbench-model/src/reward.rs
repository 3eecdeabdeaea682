//! Reward model for RLHF scoring

use crate::policy::NetConfig;
use anyhow::Result;
use aprender::autograd::Tensor;
use aprender::nn::{Linear, Module, ReLU};

/// Scalar reward model
///
/// Same trunk as the policy but with a single-unit value head; the score
/// of a sequence is the mean of the per-position values. Loaded
/// separately from the policy and never trained in this layer.
pub struct RewardLm {
    embed: Linear,
    hidden: Linear,
    value_head: Linear,
    act: ReLU,
    config: NetConfig,
}

impl RewardLm {
    /// Create a reward model with untrained weights
    pub fn new(config: NetConfig) -> Self {
        Self {
            embed: Linear::new(config.vocab_size, config.n_embd),
            hidden: Linear::new(config.n_embd, config.n_embd),
            value_head: Linear::new(config.n_embd, 1),
            act: ReLU::new(),
            config,
        }
    }

    /// Architecture dimensions
    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    /// Forward pass producing per-position values `[batch, seq_len, 1]`
    pub fn forward(&self, input_ids: &Tensor) -> Result<Tensor> {
        let shape = input_ids.shape();
        if shape.len() != 2 {
            anyhow::bail!("Expected 2D [batch, seq_len] ids, got shape {:?}", shape);
        }
        let (batch, seq) = (shape[0], shape[1]);

        let ids = input_ids.data();
        let mut encoded = vec![0.0f32; batch * seq * self.config.vocab_size];
        for (position, &id) in ids.iter().enumerate() {
            let id = id as usize;
            if id >= self.config.vocab_size {
                anyhow::bail!(
                    "Token id {} out of range for vocab size {}",
                    id,
                    self.config.vocab_size
                );
            }
            encoded[position * self.config.vocab_size + id] = 1.0;
        }
        let x = Tensor::new(&encoded, &[batch, seq, self.config.vocab_size]);

        let h = self.embed.forward(&x);
        let h = self.act.forward(&self.hidden.forward(&h));
        Ok(self.value_head.forward(&h))
    }

    /// Score one token sequence
    ///
    /// # Arguments
    /// * `ids` - Token ids of the full sequence (prompt plus completion)
    ///
    /// # Returns
    /// Mean per-position value
    pub fn score(&self, ids: &[u32]) -> Result<f32> {
        if ids.is_empty() {
            anyhow::bail!("Cannot score an empty sequence");
        }
        let start = ids.len().saturating_sub(self.config.context_window);
        let window = &ids[start..];

        let id_data: Vec<f32> = window.iter().map(|&id| id as f32).collect();
        let input = Tensor::new(&id_data, &[1, window.len()]);
        let values = self.forward(&input)?;

        let data = values.data();
        let sum: f32 = data.iter().sum();
        Ok(sum / window.len() as f32)
    }
}

impl Module for RewardLm {
    fn forward(&self, input: &Tensor) -> Tensor {
        self.forward(input).expect("Reward forward pass failed")
    }

    fn parameters(&self) -> Vec<&Tensor> {
        let mut params = Vec::new();
        params.extend(self.embed.parameters());
        params.extend(self.hidden.parameters());
        params.extend(self.value_head.parameters());
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = Vec::new();
        params.extend(self.embed.parameters_mut());
        params.extend(self.hidden.parameters_mut());
        params.extend(self.value_head.parameters_mut());
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_is_finite() {
        let model = RewardLm::new(NetConfig {
            vocab_size: 16,
            n_embd: 8,
            context_window: 32,
        });
        let score = model.score(&[1, 2, 3]).expect("Scoring failed");
        assert!(score.is_finite());
    }

    #[test]
    fn test_empty_sequence_rejected() {
        let model = RewardLm::new(NetConfig {
            vocab_size: 16,
            n_embd: 8,
            context_window: 32,
        });
        assert!(model.score(&[]).is_err());
    }
}
