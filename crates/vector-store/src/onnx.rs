//! ONNX Runtime session plumbing shared by the embedder and the cross-encoder judge.

use crate::error::Result;
use crate::models::{ModelKind, ModelSpec};
use ndarray::{Array, ArrayD, Dimension, IxDyn};
use ort::session::{builder::GraphOptimizationLevel, Input, Session, SessionInputs};
use ort::tensor::TensorElementType;
use ort::value::{DynTensor, Tensor};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tokenizers::{EncodeInput, Encoding, PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

pub(crate) struct OnnxSession {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    kind: ModelKind,
    pub(crate) max_length: usize,
    pub(crate) max_batch: usize,
}

/// Raw model output plus the attention mask of every row (needed for mean pooling).
pub(crate) struct BatchOutput {
    pub array: ArrayD<f32>,
    pub mask_rows: Vec<Vec<i64>>,
}

impl OnnxSession {
    pub(crate) fn load(spec: &ModelSpec, model_dir: &Path) -> Result<Self> {
        let kind = spec.kind;
        if !tokenizers::utils::parallelism::is_parallelism_configured() {
            tokenizers::utils::parallelism::set_parallelism(false);
        }

        let assets = spec.assets_in(model_dir);
        if !assets.model_path.exists() || !assets.tokenizer_path.exists() {
            return Err(kind.error(format!(
                "Model files for '{}' are missing. Expected ONNX at {} and tokenizer at {} (set REELQA_MODEL_DIR).",
                spec.id,
                assets.model_path.display(),
                assets.tokenizer_path.display(),
            )));
        }

        let mut tokenizer = Tokenizer::from_file(&assets.tokenizer_path)
            .map_err(|e| kind.error(format!("Tokenizer load failed: {e}")))?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..PaddingParams::default()
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: spec.max_length,
                ..TruncationParams::default()
            }))
            .map_err(|e| kind.error(format!("Tokenizer truncation failed: {e}")))?;

        let (intra_threads, inter_threads) = default_ort_threads();
        let session = Session::builder()
            .map_err(|e| kind.error(format!("{e}")))?
            .with_intra_threads(intra_threads)
            .map_err(|e| kind.error(format!("Failed to set ORT intra threads: {e}")))?
            .with_inter_threads(inter_threads)
            .map_err(|e| kind.error(format!("Failed to set ORT inter threads: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| kind.error(format!("Failed to set optimization level: {e}")))?
            .commit_from_file(&assets.model_path)
            .map_err(|e| kind.error(format!("Failed to load ONNX model: {e}")))?;

        log::info!(
            "Loaded ONNX {:?} model '{}' (max_length {}, batch {})",
            kind,
            spec.id,
            spec.max_length,
            spec.max_batch
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            kind,
            max_length: spec.max_length,
            max_batch: spec.max_batch,
        })
    }

    /// Tokenize one batch (single texts or text pairs) and run a forward pass.
    pub(crate) fn run<'s, E>(&self, inputs: Vec<E>) -> Result<Option<BatchOutput>>
    where
        E: Into<EncodeInput<'s>> + Send,
    {
        let kind = self.kind;
        let batch = inputs.len();
        let encodings = self
            .tokenizer
            .encode_batch(inputs, true)
            .map_err(|e| kind.error(format!("Tokenization failed: {e}")))?;
        if encodings.is_empty() {
            return Ok(None);
        }

        let seq_len = encodings[0].len();
        if seq_len > self.max_length {
            return Err(kind.error(format!(
                "Tokenized length {seq_len} exceeds max_length {}",
                self.max_length
            )));
        }
        if encodings.iter().any(|e| e.len() != seq_len) {
            return Err(kind.error("Inconsistent sequence lengths after padding"));
        }
        let (ids, masks, type_ids, mask_rows) = build_flat_tensors(&encodings, seq_len);

        let ids_array = Array::from_shape_vec((batch, seq_len), ids)
            .map_err(|e| kind.error(format!("IDs shape error: {e}")))?;
        let mask_array = Array::from_shape_vec((batch, seq_len), masks)
            .map_err(|e| kind.error(format!("Mask shape error: {e}")))?;
        let type_array = Array::from_shape_vec((batch, seq_len), type_ids)
            .map_err(|e| kind.error(format!("Types shape error: {e}")))?;
        let ids_shape = ids_array.raw_dim().into_dyn();

        let mut available: HashMap<String, DynTensor> = HashMap::new();
        available.insert("input_ids".to_string(), self.tensor(ids_array.into_dyn())?);
        available.insert("attention_mask".to_string(), self.tensor(mask_array.into_dyn())?);
        available.insert("token_type_ids".to_string(), self.tensor(type_array.into_dyn())?);

        let mut session = self
            .session
            .lock()
            .map_err(|_| kind.error("Failed to lock ONNX session"))?;

        let mut feed: HashMap<String, DynTensor> = HashMap::new();
        for input in &session.inputs {
            let key = input.name.clone();
            if let Some(value) = available.remove(&key) {
                feed.insert(key, value);
            } else {
                let zeros = zero_tensor(kind, &ids_shape, input)?;
                feed.insert(key, zeros);
            }
        }

        let outputs = session
            .run(SessionInputs::from(feed))
            .map_err(|e| kind.error(format!("ONNX forward failed: {e}")))?;
        if outputs.len() == 0 {
            return Err(kind.error("ONNX returned no outputs"));
        }
        let array = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| kind.error(format!("Failed to decode ONNX output: {e}")))?
            .to_owned();

        drop(outputs);
        drop(session);

        Ok(Some(BatchOutput { array, mask_rows }))
    }

    fn tensor(&self, array: ArrayD<i64>) -> Result<DynTensor> {
        Ok(Tensor::from_array(array)
            .map_err(|e| self.kind.error(format!("{e}")))?
            .upcast())
    }
}

fn default_ort_threads() -> (usize, usize) {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);

    let intra_threads = if cpus <= 4 {
        1
    } else if cpus <= 12 {
        2
    } else {
        4
    };
    (intra_threads, 1)
}

fn build_flat_tensors(
    encodings: &[Encoding],
    seq_len: usize,
) -> (Vec<i64>, Vec<i64>, Vec<i64>, Vec<Vec<i64>>) {
    let mut ids = Vec::with_capacity(encodings.len() * seq_len);
    let mut masks = Vec::with_capacity(encodings.len() * seq_len);
    let mut type_ids = Vec::with_capacity(encodings.len() * seq_len);
    let mut mask_rows = Vec::with_capacity(encodings.len());

    for encoding in encodings {
        let encoding_ids = encoding.get_ids();
        let encoding_masks = encoding.get_attention_mask();
        let encoding_types = encoding.get_type_ids();

        for idx in 0..seq_len {
            ids.push(i64::from(*encoding_ids.get(idx).unwrap_or(&0)));
            masks.push(i64::from(*encoding_masks.get(idx).unwrap_or(&0)));
            type_ids.push(i64::from(*encoding_types.get(idx).unwrap_or(&0)));
        }

        mask_rows.push(
            encoding_masks
                .iter()
                .take(seq_len)
                .map(|v| i64::from(*v))
                .collect(),
        );
    }

    (ids, masks, type_ids, mask_rows)
}

fn zero_tensor(kind: ModelKind, shape: &IxDyn, input: &Input) -> Result<DynTensor> {
    let unsupported = |detail: String| {
        kind.error(format!("Unsupported ONNX input '{}': {detail}", input.name))
    };
    let tensor = match &input.input_type {
        ort::value::ValueType::Tensor { ty, .. } => match ty {
            TensorElementType::Int64 => Tensor::from_array(Array::<i64, _>::zeros(shape.clone()))
                .map_err(|e| unsupported(e.to_string()))?
                .upcast(),
            TensorElementType::Bool => Tensor::from_array(Array::from_elem(shape.clone(), false))
                .map_err(|e| unsupported(e.to_string()))?
                .upcast(),
            TensorElementType::Float32 => {
                Tensor::from_array(Array::<f32, _>::zeros(shape.clone()))
                    .map_err(|e| unsupported(e.to_string()))?
                    .upcast()
            }
            other => return Err(unsupported(format!("cannot synthesize zeros for {other:?}"))),
        },
        other => return Err(unsupported(format!("{other:?}"))),
    };
    Ok(tensor)
}
