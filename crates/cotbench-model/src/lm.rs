//! The seam between the harness and a loaded language model

use anyhow::Result;

/// Next-token interface the generation driver runs against
///
/// Implementations own their tensors, caching, and device placement; the
/// driver only ever asks for the logits of the next position given the
/// token ids so far. Tests implement this directly with scripted logits.
pub trait CausalLm {
    /// Logits over the vocabulary for the position following `context`
    ///
    /// # Arguments
    /// * `context` - Token ids so far; implementations may truncate to
    ///   their own context window
    fn next_logits(&self, context: &[u32]) -> Result<Vec<f32>>;

    /// Maximum number of tokens the model attends over
    fn context_window(&self) -> usize;
}
