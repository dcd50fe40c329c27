//! ONNX summarization backend — local inference of a BART-family checkpoint
//!
//! Uses the `ort` crate for ONNX Runtime and `tokenizers` for BPE tokenization.
//! Expects an encoder/decoder pair as exported by `optimum-cli export onnx
//! --task summarization` (without past key values) plus `tokenizer.json`.
//!
//! Decoding is greedy: one decoder pass per generated token, argmax over the
//! logits of the last position.

use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use crate::summarizer::{
    OnnxConfig, SpecialTokens, SummarizationBackend, SummarizeParams, SummarizerError,
};

/// Local ONNX summarizer.
pub struct OnnxSummarizer {
    encoder: Arc<Mutex<Session>>,
    decoder: Arc<Mutex<Session>>,
    tokenizer: Arc<tokenizers::Tokenizer>,
    settings: DecodeSettings,
    model: String,
}

impl std::fmt::Debug for OnnxSummarizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxSummarizer")
            .field("model", &self.model)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Generation settings that do not change between requests.
#[derive(Debug, Clone, Copy)]
struct DecodeSettings {
    max_input_tokens: usize,
    no_repeat_ngram_size: usize,
    special: SpecialTokens,
}

impl OnnxSummarizer {
    /// Load the encoder, decoder and tokenizer named in `config`.
    ///
    /// Returns `SummarizerError::ModelNotFound` if any file is missing.
    pub fn new(config: OnnxConfig) -> Result<Self, SummarizerError> {
        for path in [&config.encoder_path, &config.decoder_path, &config.tokenizer_path] {
            if !path.exists() {
                return Err(SummarizerError::ModelNotFound {
                    path: path.display().to_string(),
                });
            }
        }

        let encoder = load_session(&config.encoder_path)?;
        let decoder = load_session(&config.decoder_path)?;

        let tokenizer = tokenizers::Tokenizer::from_file(&config.tokenizer_path)
            .map_err(|e| SummarizerError::Tokenizer(e.to_string()))?;

        tracing::info!(
            model = %config.model,
            encoder = %config.encoder_path.display(),
            "Loaded ONNX summarization model"
        );

        Ok(Self {
            encoder: Arc::new(Mutex::new(encoder)),
            decoder: Arc::new(Mutex::new(decoder)),
            tokenizer: Arc::new(tokenizer),
            settings: DecodeSettings {
                max_input_tokens: config.max_input_tokens,
                no_repeat_ngram_size: config.no_repeat_ngram_size,
                special: config.special_tokens,
            },
            model: config.model,
        })
    }
}

fn load_session(path: &Path) -> Result<Session, SummarizerError> {
    Session::builder()
        .and_then(|b| b.commit_from_file(path))
        .map_err(|e| SummarizerError::OnnxInference(e.to_string()))
}

#[async_trait]
impl SummarizationBackend for OnnxSummarizer {
    async fn summarize(&self, params: &SummarizeParams) -> Result<String, SummarizerError> {
        if !params.deterministic {
            return Err(SummarizerError::Unsupported(
                "the onnx backend only supports deterministic (greedy) decoding".to_string(),
            ));
        }

        // ONNX inference is CPU-bound — run on the blocking thread pool.
        let encoder = Arc::clone(&self.encoder);
        let decoder = Arc::clone(&self.decoder);
        let tokenizer = Arc::clone(&self.tokenizer);
        let settings = self.settings;
        let params = params.clone();

        tokio::task::spawn_blocking(move || {
            summarize_sync(&encoder, &decoder, &tokenizer, &settings, &params)
        })
        .await
        .map_err(|e| SummarizerError::OnnxInference(format!("spawn_blocking join error: {e}")))?
    }

    fn name(&self) -> &str {
        "onnx"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Tokenize, encode, greedily decode and detokenize one input.
fn summarize_sync(
    encoder: &Mutex<Session>,
    decoder: &Mutex<Session>,
    tokenizer: &tokenizers::Tokenizer,
    settings: &DecodeSettings,
    params: &SummarizeParams,
) -> Result<String, SummarizerError> {
    let special = settings.special;

    // 1. Tokenize (adds <s> ... </s>)
    let encoding = tokenizer
        .encode(params.text.as_str(), true)
        .map_err(|e| SummarizerError::Tokenizer(e.to_string()))?;
    let original_len = encoding.get_ids().len();
    let input_ids = truncate_input_ids(encoding.get_ids(), settings.max_input_tokens, special.eos);
    if input_ids.len() < original_len {
        tracing::warn!(
            tokens = original_len,
            kept = input_ids.len(),
            "Input exceeds model context; truncating"
        );
    }

    let src_len = input_ids.len();
    let input_ids: Vec<i64> = input_ids.iter().map(|&id| id as i64).collect();
    let attention_mask: Vec<i64> = vec![1; src_len];
    let src_shape = vec![1i64, src_len as i64];

    // 2. Encoder pass
    let (hidden_shape, hidden_states) = {
        let mut session = encoder
            .lock()
            .map_err(|e| SummarizerError::OnnxInference(format!("encoder lock poisoned: {e}")))?;

        let input_ids_tensor = Tensor::from_array((src_shape.clone(), input_ids))
            .map_err(|e| SummarizerError::OnnxInference(e.to_string()))?;
        let attention_mask_tensor = Tensor::from_array((src_shape.clone(), attention_mask.clone()))
            .map_err(|e| SummarizerError::OnnxInference(e.to_string()))?;

        let outputs = session
            .run(ort::inputs! {
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
            })
            .map_err(|e| SummarizerError::OnnxInference(e.to_string()))?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| SummarizerError::OnnxInference(e.to_string()))?;

        // Expected shape: [1, src_len, hidden_dim]
        if shape.len() != 3 {
            return Err(SummarizerError::OnnxInference(format!(
                "Expected 3D encoder output, got {}D",
                shape.len()
            )));
        }
        (shape.to_vec(), data.to_vec())
    };

    // 3. Greedy decoding
    let max_length = params.max_length as usize;
    let min_length = params.min_length as usize;
    let mut generated: Vec<u32> = vec![special.decoder_start];

    let mut session = decoder
        .lock()
        .map_err(|e| SummarizerError::OnnxInference(format!("decoder lock poisoned: {e}")))?;

    while generated.len() < max_length {
        let tgt_len = generated.len();
        let decoder_ids: Vec<i64> = generated.iter().map(|&id| id as i64).collect();

        let decoder_ids_tensor = Tensor::from_array((vec![1i64, tgt_len as i64], decoder_ids))
            .map_err(|e| SummarizerError::OnnxInference(e.to_string()))?;
        let encoder_mask_tensor = Tensor::from_array((src_shape.clone(), attention_mask.clone()))
            .map_err(|e| SummarizerError::OnnxInference(e.to_string()))?;
        let hidden_tensor = Tensor::from_array((hidden_shape.clone(), hidden_states.clone()))
            .map_err(|e| SummarizerError::OnnxInference(e.to_string()))?;

        let next = {
            let outputs = session
                .run(ort::inputs! {
                    "input_ids" => decoder_ids_tensor,
                    "encoder_attention_mask" => encoder_mask_tensor,
                    "encoder_hidden_states" => hidden_tensor,
                })
                .map_err(|e| SummarizerError::OnnxInference(e.to_string()))?;

            let (shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| SummarizerError::OnnxInference(e.to_string()))?;

            // Expected shape: [1, tgt_len, vocab]
            if shape.len() != 3 {
                return Err(SummarizerError::OnnxInference(format!(
                    "Expected 3D logits, got {}D",
                    shape.len()
                )));
            }
            let vocab = shape[2] as usize;
            let offset = (shape[1] as usize - 1) * vocab;
            let mut logits = data[offset..offset + vocab].to_vec();

            constrain_logits(
                &mut logits,
                &generated,
                min_length,
                settings.no_repeat_ngram_size,
                &special,
            );
            argmax(&logits).ok_or_else(|| {
                SummarizerError::OnnxInference("decoder produced empty logits".to_string())
            })?
        };

        generated.push(next);
        if next == special.eos {
            break;
        }
    }
    drop(session);

    // 4. Detokenize
    let text = tokenizer
        .decode(&generated, true)
        .map_err(|e| SummarizerError::Tokenizer(e.to_string()))?;

    Ok(clean_up_tokenization(text.trim()))
}

/// Keep at most `max_tokens` ids, closing a truncated sequence with `eos`.
fn truncate_input_ids(ids: &[u32], max_tokens: usize, eos: u32) -> Vec<u32> {
    if max_tokens == 0 || ids.len() <= max_tokens {
        return ids.to_vec();
    }
    let mut out = ids[..max_tokens - 1].to_vec();
    out.push(eos);
    out
}

/// Apply the generation rules to the next-token logits in place.
///
/// - the first generated token is forced to `bos`
/// - `eos` is unavailable until `min_length` tokens exist
/// - tokens completing an already-seen n-gram are banned
fn constrain_logits(
    logits: &mut [f32],
    generated: &[u32],
    min_length: usize,
    no_repeat_ngram_size: usize,
    special: &SpecialTokens,
) {
    if generated.len() == 1 {
        for (idx, v) in logits.iter_mut().enumerate() {
            if idx != special.bos as usize {
                *v = f32::NEG_INFINITY;
            }
        }
        return;
    }

    if generated.len() < min_length {
        if let Some(v) = logits.get_mut(special.eos as usize) {
            *v = f32::NEG_INFINITY;
        }
    }

    for banned in banned_ngram_tokens(generated, no_repeat_ngram_size) {
        if let Some(v) = logits.get_mut(banned as usize) {
            *v = f32::NEG_INFINITY;
        }
    }
}

/// Tokens that would repeat an n-gram of size `n` already present in `generated`.
fn banned_ngram_tokens(generated: &[u32], n: usize) -> Vec<u32> {
    if n == 0 || generated.len() + 1 < n {
        return Vec::new();
    }
    let prefix = &generated[generated.len() + 1 - n..];
    generated
        .windows(n)
        .filter(|w| &w[..n - 1] == prefix)
        .map(|w| w[n - 1])
        .collect()
}

fn argmax(logits: &[f32]) -> Option<u32> {
    logits
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(idx, _)| idx as u32)
}

/// Remove the spaces BPE decoding leaves before punctuation and contractions.
fn clean_up_tokenization(text: &str) -> String {
    static SPACES: OnceLock<Regex> = OnceLock::new();
    let re = SPACES.get_or_init(|| {
        Regex::new(r" (\.|\?|!|,|'m|n't|'s|'ve|'re)").expect("static regex is valid")
    });
    re.replace_all(text, "$1").into_owned()
}

/// Resolve the default model directory.
pub fn default_model_dir() -> PathBuf {
    let data_home = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".local/share")
        });
    data_home.join("synopsis/models")
}

/// Resolve paths for the encoder, decoder and tokenizer.
///
/// If `model_dir` is empty, uses `<default_model_dir>/<model basename>`.
pub fn resolve_model_paths(model_dir: &str, model: &str) -> (PathBuf, PathBuf, PathBuf) {
    let dir = if model_dir.is_empty() {
        let basename = model.rsplit('/').next().unwrap_or(model);
        default_model_dir().join(basename)
    } else {
        PathBuf::from(shellexpand::tilde(model_dir).into_owned())
    };
    (
        dir.join("encoder_model.onnx"),
        dir.join("decoder_model.onnx"),
        dir.join("tokenizer.json"),
    )
}

// ============================================================================
// TESTS
// ============================================================================
