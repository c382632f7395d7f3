//! Vehicle detection.
//!
//! - `backend`: the inference seam (`InferenceModel`), input preparation and class names
//! - `backends`: stub and tract (ONNX) models
//! - `postprocess`: class selection, domain filter, box conversion and NMS
//! - `engine`: `DetectionEngine`, the per-frame detect-and-annotate step

mod backend;
mod backends;
mod engine;
mod postprocess;
mod result;

pub use backend::{load_model, ClassNames, InferenceModel, InputTensor, RawCandidate};
pub use backends::StubModel;
#[cfg(feature = "backend-tract")]
pub use backends::TractModel;
pub use engine::DetectionEngine;
pub use postprocess::{non_max_suppression, select_candidates, Candidate};
pub use result::{BoundingBox, Detection, DetectionResult};
