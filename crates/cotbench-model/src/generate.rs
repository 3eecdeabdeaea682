//! Text generation driver
//!
//! Decoding runs against the [`CausalLm`] seam one token at a time:
//! greedy argmax by default, nucleus sampling when `do_sample` is set,
//! and beam search when more than one beam is configured. The repetition
//! penalty and EOS handling follow the usual generation-API semantics.

use crate::lm::CausalLm;
use anyhow::Result;
use cotbench_config::RunConfig;
use cotbench_tokenizer::Tokenizer;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Decoding parameters for one generation call
#[derive(Debug, Clone)]
pub struct GenerationParams {
    /// Maximum tokens generated per prompt
    pub max_new_tokens: usize,
    /// Sampling temperature (only with `do_sample`)
    pub temperature: f32,
    /// Nucleus threshold (only with `do_sample`)
    pub top_p: f32,
    /// Sample instead of greedy/beam decoding
    pub do_sample: bool,
    /// Beam count; 1 disables beam search
    pub num_beams: usize,
    /// Stop beam search once the best beam has finished
    pub early_stopping: bool,
    /// Penalty applied to logits of already-seen tokens
    pub repetition_penalty: f32,
    /// End-of-sequence token id
    pub eos_token_id: Option<u32>,
    /// Padding token id
    pub pad_token_id: Option<u32>,
    /// Sampling seed; entropy-seeded when absent
    pub seed: Option<u64>,
}

impl GenerationParams {
    /// Build decoding parameters from the run config and tokenizer
    pub fn from_config(config: &RunConfig, tokenizer: &Tokenizer) -> Self {
        Self {
            max_new_tokens: config.max_new_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
            do_sample: config.do_sample,
            num_beams: config.num_beams,
            early_stopping: config.early_stopping,
            repetition_penalty: config.repetition_penalty,
            eos_token_id: tokenizer.eos_token_id(),
            pad_token_id: tokenizer.pad_token_id(),
            seed: config.seed,
        }
    }
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_new_tokens: 256,
            temperature: 1.0,
            top_p: 1.0,
            do_sample: false,
            num_beams: 1,
            early_stopping: false,
            repetition_penalty: 1.0,
            eos_token_id: None,
            pad_token_id: None,
            seed: None,
        }
    }
}

/// Batch text generation, the only operation the loop layer requires
pub trait TextGenerator {
    /// Generate one completion per prompt
    ///
    /// Returned strings contain the prompt followed by the continuation,
    /// aligned with the input order.
    fn generate(&self, prompts: &[String], params: &GenerationParams) -> Result<Vec<String>>;
}

/// A loaded model and tokenizer bound together for generation
pub struct GenerationSession<'a, M: CausalLm> {
    model: &'a M,
    tokenizer: &'a Tokenizer,
}

impl<'a, M: CausalLm> GenerationSession<'a, M> {
    /// Bind a model and tokenizer
    pub fn new(model: &'a M, tokenizer: &'a Tokenizer) -> Self {
        Self { model, tokenizer }
    }
}

impl<M: CausalLm> TextGenerator for GenerationSession<'_, M> {
    fn generate(&self, prompts: &[String], params: &GenerationParams) -> Result<Vec<String>> {
        // Leave room in the context window for the continuation
        let budget = self
            .model
            .context_window()
            .saturating_sub(params.max_new_tokens)
            .max(1);

        let refs: Vec<&str> = prompts.iter().map(|p| p.as_str()).collect();
        let batch = self.tokenizer.encode_batch_padded(&refs, Some(budget))?;

        let mut rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut texts = Vec::with_capacity(prompts.len());
        for (row, (&len, prompt)) in batch
            .input_ids
            .iter()
            .zip(batch.lengths.iter().zip(prompts.iter()))
        {
            let prompt_ids = row[..len].to_vec();
            if prompt_ids.is_empty() {
                texts.push(prompt.clone());
                continue;
            }

            let ids = decode_ids_with(self.model, prompt_ids, params, &mut rng)?;
            texts.push(self.tokenizer.decode(&ids)?);
        }
        Ok(texts)
    }
}

/// Decode one sequence of token ids
///
/// Dispatches to beam search when beams are configured and sampling is
/// off, otherwise to the greedy/sampling loop. The returned ids include
/// the prompt.
pub fn decode_ids<M: CausalLm>(
    model: &M,
    prompt_ids: Vec<u32>,
    params: &GenerationParams,
) -> Result<Vec<u32>> {
    let mut rng = match params.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    decode_ids_with(model, prompt_ids, params, &mut rng)
}

fn decode_ids_with<M: CausalLm>(
    model: &M,
    prompt_ids: Vec<u32>,
    params: &GenerationParams,
    rng: &mut StdRng,
) -> Result<Vec<u32>> {
    if !params.do_sample && params.num_beams > 1 {
        beam_search(model, prompt_ids, params)
    } else {
        decode_one(model, prompt_ids, params, rng)
    }
}

/// Greedy or sampled decoding of a single sequence
fn decode_one<M: CausalLm>(
    model: &M,
    prompt_ids: Vec<u32>,
    params: &GenerationParams,
    rng: &mut StdRng,
) -> Result<Vec<u32>> {
    let mut ids = prompt_ids;
    for _ in 0..params.max_new_tokens {
        let mut logits = model.next_logits(&ids)?;
        apply_repetition_penalty(&mut logits, &ids, params.repetition_penalty);

        let next = if params.do_sample {
            sample_token(&logits, params.temperature, params.top_p, rng)?
        } else {
            argmax(&logits)
        };

        ids.push(next);
        if params.eos_token_id == Some(next) {
            break;
        }
    }
    Ok(ids)
}

struct Beam {
    ids: Vec<u32>,
    score: f32,
    finished: bool,
}

/// Beam search over joint log-probability
fn beam_search<M: CausalLm>(
    model: &M,
    prompt_ids: Vec<u32>,
    params: &GenerationParams,
) -> Result<Vec<u32>> {
    let width = params.num_beams;
    let mut beams = vec![Beam {
        ids: prompt_ids,
        score: 0.0,
        finished: false,
    }];

    for _ in 0..params.max_new_tokens {
        if beams.iter().all(|b| b.finished) {
            break;
        }
        if params.early_stopping && beams.first().map(|b| b.finished).unwrap_or(false) {
            break;
        }

        let mut candidates: Vec<Beam> = Vec::with_capacity(beams.len() * width);
        for beam in &beams {
            if beam.finished {
                candidates.push(Beam {
                    ids: beam.ids.clone(),
                    score: beam.score,
                    finished: true,
                });
                continue;
            }

            let mut logits = model.next_logits(&beam.ids)?;
            apply_repetition_penalty(&mut logits, &beam.ids, params.repetition_penalty);
            let log_probs = log_softmax(&logits);

            let mut ranked: Vec<usize> = (0..log_probs.len()).collect();
            ranked.sort_by(|&a, &b| {
                log_probs[b]
                    .partial_cmp(&log_probs[a])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

            for &token in ranked.iter().take(width) {
                let mut ids = beam.ids.clone();
                ids.push(token as u32);
                candidates.push(Beam {
                    ids,
                    score: beam.score + log_probs[token],
                    finished: params.eos_token_id == Some(token as u32),
                });
            }
        }

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(width);
        beams = candidates;
    }

    let best = beams
        .into_iter()
        .max_by(|a, b| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .ok_or_else(|| anyhow::anyhow!("Beam search produced no candidates"))?;
    Ok(best.ids)
}

/// Penalize tokens that already appear in the sequence
///
/// Positive logits are divided by the penalty and negative logits
/// multiplied, so a penalty above 1.0 always lowers the likelihood of a
/// repeat.
fn apply_repetition_penalty(logits: &mut [f32], seen: &[u32], penalty: f32) {
    if (penalty - 1.0).abs() < f32::EPSILON {
        return;
    }
    for &token in seen {
        let token = token as usize;
        if let Some(logit) = logits.get_mut(token) {
            if *logit > 0.0 {
                *logit /= penalty;
            } else {
                *logit *= penalty;
            }
        }
    }
}

fn argmax(logits: &[f32]) -> u32 {
    let mut max_logit = f32::NEG_INFINITY;
    let mut max_idx = 0;
    for (idx, &logit) in logits.iter().enumerate() {
        if logit > max_logit {
            max_logit = logit;
            max_idx = idx;
        }
    }
    max_idx as u32
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

fn log_softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let log_sum: f32 = logits.iter().map(|&l| (l - max).exp()).sum::<f32>().ln();
    logits.iter().map(|&l| l - max - log_sum).collect()
}

/// Temperature + nucleus sampling over one logit vector
fn sample_token(logits: &[f32], temperature: f32, top_p: f32, rng: &mut StdRng) -> Result<u32> {
    let temperature = temperature.max(1e-5);
    let scaled: Vec<f32> = logits.iter().map(|&l| l / temperature).collect();
    let probs = softmax(&scaled);

    let mut ranked: Vec<usize> = (0..probs.len()).collect();
    ranked.sort_by(|&a, &b| {
        probs[b]
            .partial_cmp(&probs[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // Keep the smallest prefix of the distribution covering top_p
    let mut nucleus: Vec<usize> = Vec::new();
    let mut mass = 0.0f32;
    for &token in &ranked {
        nucleus.push(token);
        mass += probs[token];
        if mass >= top_p {
            break;
        }
    }

    let total: f32 = nucleus.iter().map(|&t| probs[t]).sum();
    let mut draw = rng.gen::<f32>() * total;
    for &token in &nucleus {
        draw -= probs[token];
        if draw <= 0.0 {
            return Ok(token as u32);
        }
    }
    nucleus
        .last()
        .map(|&t| t as u32)
        .ok_or_else(|| anyhow::anyhow!("Sampling produced an empty nucleus"))
}
