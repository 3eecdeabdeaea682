//! Policy language model

use crate::lm::CausalLm;
use anyhow::Result;
use aprender::autograd::Tensor;
use aprender::nn::loss::CrossEntropyLoss;
use aprender::nn::{Linear, Module, ReLU};
use cotbench_config::Precision;
use serde::{Deserialize, Serialize};

/// Architecture dimensions shared by the policy and reward trunks
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NetConfig {
    /// Vocabulary size (must match the tokenizer)
    pub vocab_size: usize,
    /// Hidden width
    pub n_embd: usize,
    /// Maximum context length in tokens
    pub context_window: usize,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            vocab_size: 50304,
            n_embd: 256,
            context_window: 1024,
        }
    }
}

/// Low-rank adapter applied on top of the policy head
///
/// The adapter holds the `down`/`up` projection pair; the alpha/rank
/// scaling is folded into the up projection when the adapter checkpoint is
/// written, so applying it is a plain forward through both layers.
#[derive(Debug)]
pub struct LoraAdapter {
    /// Projection into the adapter rank
    pub(crate) down: Linear,
    /// Projection back out to the vocabulary
    pub(crate) up: Linear,
    rank: usize,
}

impl LoraAdapter {
    /// Create an adapter with untrained weights
    pub fn new(n_embd: usize, vocab_size: usize, rank: usize) -> Self {
        Self {
            down: Linear::new(n_embd, rank),
            up: Linear::new(rank, vocab_size),
            rank,
        }
    }

    /// Adapter rank
    pub fn rank(&self) -> usize {
        self.rank
    }

    fn delta(&self, hidden: &Tensor) -> Tensor {
        self.up.forward(&self.down.forward(hidden))
    }
}

impl Module for LoraAdapter {
    fn forward(&self, input: &Tensor) -> Tensor {
        self.delta(input)
    }

    fn parameters(&self) -> Vec<&Tensor> {
        let mut params = Vec::new();
        params.extend(self.down.parameters());
        params.extend(self.up.parameters());
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = Vec::new();
        params.extend(self.down.parameters_mut());
        params.extend(self.up.parameters_mut());
        params
    }
}

/// Causal policy model
///
/// A small decoder head over framework modules: token one-hot → embedding
/// projection → ReLU hidden layer → vocabulary head, with an optional LoRA
/// delta added to the head's logits. Shapes follow the usual
/// `[batch, seq_len]` ids in, `[batch, seq_len, vocab]` logits out.
#[derive(Debug)]
pub struct PolicyLm {
    embed: Linear,
    hidden: Linear,
    lm_head: Linear,
    act: ReLU,
    lora: Option<LoraAdapter>,
    config: NetConfig,
    precision: Precision,
}

impl PolicyLm {
    /// Create a policy model with untrained weights
    pub fn new(config: NetConfig) -> Self {
        Self {
            embed: Linear::new(config.vocab_size, config.n_embd),
            hidden: Linear::new(config.n_embd, config.n_embd),
            lm_head: Linear::new(config.n_embd, config.vocab_size),
            act: ReLU::new(),
            lora: None,
            config,
            precision: Precision::Float32,
        }
    }

    /// Attach a loaded LoRA adapter
    pub fn with_adapter(mut self, adapter: LoraAdapter) -> Self {
        self.lora = Some(adapter);
        self
    }

    /// Record the precision this model was loaded at
    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    /// Architecture dimensions
    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    /// Precision the model was loaded at
    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Whether a LoRA adapter is attached
    pub fn has_adapter(&self) -> bool {
        self.lora.is_some()
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `input_ids` - Token ids as a `[batch, seq_len]` tensor
    ///
    /// # Returns
    /// Logits tensor `[batch, seq_len, vocab_size]`
    pub fn forward(&self, input_ids: &Tensor) -> Result<Tensor> {
        let (x, batch, seq) = one_hot(input_ids, self.config.vocab_size)?;
        let h = self.embed.forward(&x);
        let h = self.act.forward(&self.hidden.forward(&h));
        let mut logits = self.lm_head.forward(&h);
        if let Some(adapter) = &self.lora {
            logits = logits.add(&adapter.delta(&h));
        }

        let shape = logits.shape();
        if shape.len() != 3 || shape[0] != batch || shape[1] != seq {
            anyhow::bail!(
                "Head produced shape {:?}, expected [{}, {}, {}]",
                shape,
                batch,
                seq,
                self.config.vocab_size
            );
        }
        Ok(logits)
    }

    /// Forward pass with next-token cross-entropy loss
    ///
    /// # Arguments
    /// * `input_ids` - Token ids `[batch, seq_len]`
    /// * `targets` - Target ids `[batch, seq_len]`, aligned with inputs
    ///
    /// # Returns
    /// Scalar loss tensor suitable for `backward()`
    pub fn forward_training(&self, input_ids: &Tensor, targets: &Tensor) -> Result<Tensor> {
        let logits = self.forward(input_ids)?;
        let shape = logits.shape();
        let (batch, seq, vocab) = (shape[0], shape[1], shape[2]);

        let target_shape = targets.shape();
        if target_shape.len() != 2 || target_shape[0] != batch || target_shape[1] != seq {
            anyhow::bail!(
                "Targets shape {:?} does not match inputs [{}, {}]",
                target_shape,
                batch,
                seq
            );
        }

        // Flatten positions for the framework's cross-entropy
        let logits_data = logits.data();
        let flat_logits = Tensor::new(&logits_data[..], &[batch * seq, vocab]);
        let target_data = targets.data();
        let flat_targets = Tensor::new(&target_data[..], &[batch * seq]);

        let loss_fn = CrossEntropyLoss::new();
        Ok(loss_fn.forward(&flat_logits, &flat_targets))
    }
}

impl Module for PolicyLm {
    fn forward(&self, input: &Tensor) -> Tensor {
        self.forward(input).expect("Policy forward pass failed")
    }

    fn parameters(&self) -> Vec<&Tensor> {
        let mut params = Vec::new();
        params.extend(self.embed.parameters());
        params.extend(self.hidden.parameters());
        params.extend(self.lm_head.parameters());
        if let Some(adapter) = &self.lora {
            params.extend(adapter.parameters());
        }
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = Vec::new();
        params.extend(self.embed.parameters_mut());
        params.extend(self.hidden.parameters_mut());
        params.extend(self.lm_head.parameters_mut());
        if let Some(adapter) = &mut self.lora {
            params.extend(adapter.parameters_mut());
        }
        params
    }
}

impl CausalLm for PolicyLm {
    fn next_logits(&self, context: &[u32]) -> Result<Vec<f32>> {
        if context.is_empty() {
            anyhow::bail!("Cannot compute next-token logits for an empty context");
        }
        let start = context.len().saturating_sub(self.config.context_window);
        let window = &context[start..];

        let ids: Vec<f32> = window.iter().map(|&id| id as f32).collect();
        let input = Tensor::new(&ids, &[1, window.len()]);
        let logits = self.forward(&input)?;

        let shape = logits.shape();
        let (seq, vocab) = (shape[1], shape[2]);
        let data = logits.data();
        Ok(data[(seq - 1) * vocab..seq * vocab].to_vec())
    }

    fn context_window(&self) -> usize {
        self.config.context_window
    }
}

/// One-hot encode a `[batch, seq_len]` id tensor into `[batch, seq_len, vocab]`
fn one_hot(input_ids: &Tensor, vocab_size: usize) -> Result<(Tensor, usize, usize)> {
    let shape = input_ids.shape();
    if shape.len() != 2 {
        anyhow::bail!("Expected 2D [batch, seq_len] ids, got shape {:?}", shape);
    }
    let (batch, seq) = (shape[0], shape[1]);

    let ids = input_ids.data();
    let mut encoded = vec![0.0f32; batch * seq * vocab_size];
    for (position, &id) in ids.iter().enumerate() {
        let id = id as usize;
        if id >= vocab_size {
            anyhow::bail!("Token id {} out of range for vocab size {}", id, vocab_size);
        }
        encoded[position * vocab_size + id] = 1.0;
    }

    Ok((Tensor::new(&encoded, &[batch, seq, vocab_size]), batch, seq))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_config() -> NetConfig {
        NetConfig {
            vocab_size: 16,
            n_embd: 8,
            context_window: 32,
        }
    }

    #[test]
    fn test_forward_shapes() {
        let model = PolicyLm::new(tiny_config());
        let input = Tensor::new(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        let logits = model.forward(&input).expect("Forward failed");
        assert_eq!(logits.shape(), &[2, 3, 16]);
    }

    #[test]
    fn test_out_of_range_token_rejected() {
        let model = PolicyLm::new(tiny_config());
        let input = Tensor::new(&[99.0], &[1, 1]);
        assert!(model.forward(&input).is_err());
    }

    #[test]
    fn test_next_logits_vocab_width() {
        let model = PolicyLm::new(tiny_config());
        let logits = model.next_logits(&[1, 2, 3]).expect("next_logits failed");
        assert_eq!(logits.len(), 16);
    }

    #[test]
    fn test_empty_context_rejected() {
        let model = PolicyLm::new(tiny_config());
        assert!(model.next_logits(&[]).is_err());
    }

    #[test]
    fn test_adapter_changes_parameter_count() {
        let base = PolicyLm::new(tiny_config());
        let base_params = base.parameters().len();

        let adapted = PolicyLm::new(tiny_config()).with_adapter(LoraAdapter::new(8, 16, 2));
        assert!(adapted.has_adapter());
        assert!(adapted.parameters().len() > base_params);
    }
}
