use anyhow::Result;

use crate::detect::backend::{InferenceModel, InputTensor, RawCandidate};

/// Stub model for testing and dry runs. Returns the same candidates for every input.
pub struct StubModel {
    input_size: u32,
    candidates: Vec<RawCandidate>,
    invocations: u64,
}

impl StubModel {
    pub fn new(input_size: u32, candidates: Vec<RawCandidate>) -> Self {
        Self {
            input_size,
            candidates,
            invocations: 0,
        }
    }

    /// A model that never sees anything.
    pub fn empty(input_size: u32) -> Self {
        Self::new(input_size, Vec::new())
    }

    /// Number of `infer` calls so far.
    pub fn invocations(&self) -> u64 {
        self.invocations
    }
}

impl InferenceModel for StubModel {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn infer(&mut self, _input: &InputTensor) -> Result<Vec<RawCandidate>> {
        self.invocations += 1;
        Ok(self.candidates.clone())
    }
}
