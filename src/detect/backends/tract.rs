#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use tract_onnx::prelude::*;

use crate::detect::backend::{InferenceModel, InputTensor, RawCandidate};

/// Optional JSON descriptor shipped next to the weights.
#[derive(Debug, Deserialize, Default)]
struct ModelDescriptor {
    input_size: Option<u32>,
}

/// Tract-based backend for ONNX inference.
///
/// Loads a local detector export whose outputs are rows of
/// `[cx, cy, w, h, objectness, class scores...]`. Multiple output heads are
/// concatenated. It does not perform any network I/O or write to disk.
pub struct TractModel {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
}

impl TractModel {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn load(weights: &Path, config: Option<&Path>, input_size: u32) -> Result<Self> {
        let input_size = match config {
            Some(path) => read_descriptor(path)?.input_size.unwrap_or(input_size),
            None => input_size,
        };
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(weights)
            .with_context(|| format!("failed to load ONNX model from {}", weights.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "loaded ONNX model {} ({}x{} input)",
            weights.display(),
            input_size,
            input_size
        );
        Ok(Self { model, input_size })
    }

    fn build_input(&self, input: &InputTensor) -> Result<Tensor> {
        if input.size != self.input_size {
            return Err(anyhow!(
                "input tensor is {}x{}, model expects {}x{}",
                input.size,
                input.size,
                self.input_size,
                self.input_size
            ));
        }
        let side = input.size as usize;
        let array = tract_ndarray::Array4::from_shape_vec((1, 3, side, side), input.data.clone())
            .context("input tensor has wrong length")?;
        Ok(array.into_tensor())
    }
}

impl InferenceModel for TractModel {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn infer(&mut self, input: &InputTensor) -> Result<Vec<RawCandidate>> {
        let tensor = self.build_input(input)?;
        let outputs = self
            .model
            .run(tvec!(tensor.into()))
            .context("ONNX inference failed")?;

        let mut candidates = Vec::new();
        for output in outputs.iter() {
            let view = output
                .to_array_view::<f32>()
                .context("model output tensor was not f32")?;
            let row_len = *view
                .shape()
                .last()
                .ok_or_else(|| anyhow!("model output tensor is a scalar"))?;
            if row_len < 6 {
                return Err(anyhow!(
                    "model output rows have {} values; expected box, objectness and class scores",
                    row_len
                ));
            }
            let values: Vec<f32> = view.iter().copied().collect();
            candidates.extend(values.chunks_exact(row_len).filter_map(RawCandidate::from_row));
        }
        Ok(candidates)
    }

    fn warm_up(&mut self) -> Result<()> {
        let side = self.input_size as usize;
        let input = InputTensor {
            size: self.input_size,
            data: vec![0.0; 3 * side * side],
        };
        self.infer(&input).map(|_| ())
    }
}

fn read_descriptor(path: &Path) -> Result<ModelDescriptor> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read model config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid model config {}", path.display()))
}
