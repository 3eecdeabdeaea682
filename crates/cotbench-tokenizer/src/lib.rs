//! Pretrained BPE tokenizer loading for cotbench
//!
//! Wraps `aprender::text::tokenize::BpeTokenizer` behind the small surface
//! the harness needs: encode/decode (single and batch), special-token
//! lookup, directory round-tripping, and padded batch encoding for the
//! inference loop.
//!
//! A tokenizer directory holds a single `tokenizer.json` with the
//! vocabulary and merge rules; nothing else is required.

use anyhow::{Context, Result};
use aprender::text::tokenize::BpeTokenizer;
use std::path::Path;

/// End-of-sequence marker, when present in the vocabulary
pub const EOS_TOKEN: &str = "<|eos|>";
/// Padding marker, when present in the vocabulary
pub const PAD_TOKEN: &str = "<|pad|>";

/// Serialized tokenizer contents
///
/// Only the vocabulary and merge rules are persisted; special tokens live
/// inside the vocabulary itself.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct TokenizerData {
    /// Token to ID mapping
    pub vocabulary: std::collections::HashMap<String, u32>,
    /// BPE merge rules
    pub merges: Vec<(String, String)>,
}

/// A batch of encoded prompts, right-padded to a common length
#[derive(Debug, Clone)]
pub struct PaddedBatch {
    /// Token ids, one row per prompt, all rows the same length
    pub input_ids: Vec<Vec<u32>>,
    /// 1 for real tokens, 0 for padding, aligned with `input_ids`
    pub attention_mask: Vec<Vec<u8>>,
    /// Unpadded lengths, aligned with `input_ids`
    pub lengths: Vec<usize>,
}

/// Tokenizer handle used across the workspace
#[derive(Debug, Clone)]
pub struct Tokenizer {
    bpe: BpeTokenizer,
}

impl Tokenizer {
    /// Train a tokenizer from an iterator of text (test fixtures mostly)
    pub fn train_from_iterator<I, S>(text_iterator: I, vocab_size: usize) -> Result<Self>
    where
        I: Iterator<Item = S>,
        S: AsRef<str>,
    {
        let corpus_owned: Vec<String> = text_iterator.map(|s| s.as_ref().to_string()).collect();
        let corpus: Vec<&str> = corpus_owned.iter().map(|s| s.as_str()).collect();

        let bpe = BpeTokenizer::train(&corpus, vocab_size)
            .map_err(|e| anyhow::anyhow!("Failed to train BPE tokenizer: {}", e))?;

        Ok(Self { bpe })
    }

    /// Load a pretrained tokenizer from a directory
    ///
    /// # Arguments
    /// * `path` - Directory containing `tokenizer.json`
    pub fn from_directory<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let tokenizer_file = path.join("tokenizer.json");

        if !tokenizer_file.exists() {
            anyhow::bail!("Tokenizer file not found: {}", tokenizer_file.display());
        }

        let content = std::fs::read_to_string(&tokenizer_file).with_context(|| {
            format!("Failed to read tokenizer file: {}", tokenizer_file.display())
        })?;
        let data: TokenizerData =
            serde_json::from_str(&content).context("Failed to parse tokenizer JSON")?;

        let bpe = BpeTokenizer::from_vocab(data.vocabulary, data.merges);
        Ok(Self { bpe })
    }

    /// Save the tokenizer into a directory as `tokenizer.json`
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;

        let data = TokenizerData {
            vocabulary: self.bpe.vocab().clone(),
            merges: self.bpe.merges().to_vec(),
        };
        let content = serde_json::to_string(&data).context("Failed to serialize tokenizer")?;

        let tokenizer_file = path.join("tokenizer.json");
        std::fs::write(&tokenizer_file, content).with_context(|| {
            format!("Failed to write tokenizer file: {}", tokenizer_file.display())
        })?;
        Ok(())
    }

    /// Encode text to token ids
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        self.bpe
            .encode(text)
            .map_err(|e| anyhow::anyhow!("Encoding failed: {}", e))
    }

    /// Encode a batch of texts
    pub fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<u32>>> {
        texts.iter().map(|text| self.encode(text)).collect()
    }

    /// Encode a batch with right-padding and truncation
    ///
    /// Every row is truncated to `max_len` (when given) and padded to the
    /// longest surviving row with the pad token id (0 when the vocabulary
    /// has no pad token). The attention mask marks real tokens with 1.
    pub fn encode_batch_padded(&self, texts: &[&str], max_len: Option<usize>) -> Result<PaddedBatch> {
        let mut rows = self.encode_batch(texts)?;
        if let Some(max_len) = max_len {
            for row in &mut rows {
                row.truncate(max_len);
            }
        }

        let width = rows.iter().map(|r| r.len()).max().unwrap_or(0);
        let pad_id = self.pad_token_id().unwrap_or(0);

        let mut input_ids = Vec::with_capacity(rows.len());
        let mut attention_mask = Vec::with_capacity(rows.len());
        let mut lengths = Vec::with_capacity(rows.len());
        for row in rows {
            let len = row.len();
            let mut padded = row;
            padded.resize(width, pad_id);
            let mut mask = vec![1u8; len];
            mask.resize(width, 0);
            input_ids.push(padded);
            attention_mask.push(mask);
            lengths.push(len);
        }

        Ok(PaddedBatch {
            input_ids,
            attention_mask,
            lengths,
        })
    }

    /// Decode token ids to text
    pub fn decode(&self, ids: &[u32]) -> Result<String> {
        self.bpe
            .decode(ids)
            .map_err(|e| anyhow::anyhow!("Decoding failed: {}", e))
    }

    /// Decode a batch of token id sequences
    pub fn decode_batch(&self, ids_batch: &[Vec<u32>]) -> Result<Vec<String>> {
        ids_batch.iter().map(|ids| self.decode(ids)).collect()
    }

    /// Look up a token's id, if it is in the vocabulary
    pub fn token_id(&self, token: &str) -> Option<u32> {
        self.bpe.token_to_id(token)
    }

    /// Id of the end-of-sequence token, if the vocabulary has one
    pub fn eos_token_id(&self) -> Option<u32> {
        self.token_id(EOS_TOKEN)
    }

    /// Id of the padding token, if the vocabulary has one
    pub fn pad_token_id(&self) -> Option<u32> {
        self.token_id(PAD_TOKEN)
    }

    /// Vocabulary size
    pub fn vocab_size(&self) -> usize {
        self.bpe.vocab_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture() -> Tokenizer {
        let corpus = [
            "Janet has 5 apples.",
            "The answer is 42.",
            "How many remain?",
        ];
        Tokenizer::train_from_iterator(corpus.iter(), 400).expect("Failed to train tokenizer")
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let tokenizer = fixture();
        let ids = tokenizer.encode("The answer is 42.").expect("Encoding failed");
        assert!(!ids.is_empty());
        let text = tokenizer.decode(&ids).expect("Decoding failed");
        assert!(text.contains("42"));
    }

    #[test]
    fn test_save_and_reload() {
        let tokenizer = fixture();
        let dir = TempDir::new().expect("Failed to create temp dir");
        tokenizer.save(dir.path()).expect("Failed to save tokenizer");

        let reloaded = Tokenizer::from_directory(dir.path()).expect("Failed to reload tokenizer");
        assert_eq!(reloaded.vocab_size(), tokenizer.vocab_size());

        let original = tokenizer.encode("Janet has 5 apples.").expect("Encoding failed");
        let roundtrip = reloaded.encode("Janet has 5 apples.").expect("Encoding failed");
        assert_eq!(original, roundtrip);
    }

    #[test]
    fn test_missing_directory_fails() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        assert!(Tokenizer::from_directory(dir.path().join("nope")).is_err());
    }

    #[test]
    fn test_padded_batch_shapes() {
        let tokenizer = fixture();
        let batch = tokenizer
            .encode_batch_padded(&["Janet has 5 apples.", "How many remain?"], None)
            .expect("Failed to encode batch");

        assert_eq!(batch.input_ids.len(), 2);
        let width = batch.input_ids[0].len();
        assert_eq!(batch.input_ids[1].len(), width);
        assert_eq!(batch.attention_mask[0].len(), width);

        for (row, (mask, len)) in batch
            .input_ids
            .iter()
            .zip(batch.attention_mask.iter().zip(batch.lengths.iter()))
        {
            assert_eq!(row.len(), width);
            assert_eq!(mask.iter().filter(|&&m| m == 1).count(), *len);
        }
    }

    #[test]
    fn test_padded_batch_truncates() {
        let tokenizer = fixture();
        let batch = tokenizer
            .encode_batch_padded(&["Janet has 5 apples. The answer is 42."], Some(3))
            .expect("Failed to encode batch");
        assert!(batch.input_ids[0].len() <= 3);
        assert_eq!(batch.lengths[0], batch.input_ids[0].len());
    }
}
