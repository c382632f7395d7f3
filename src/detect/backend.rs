use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};

use crate::config::ModelSettings;
use crate::frame::Frame;

/// Normalized NCHW input for a square model input.
#[derive(Clone, Debug, PartialEq)]
pub struct InputTensor {
    /// Side length of the square input.
    pub size: u32,
    /// RGB planes, pixel values scaled into [0, 1].
    pub data: Vec<f32>,
}

impl InputTensor {
    /// Resize the frame to `size`×`size` (no letterboxing) and scale by 1/255.
    pub fn from_frame(frame: &Frame, size: u32) -> Self {
        let resized = imageops::resize(frame.image(), size, size, FilterType::Triangle);
        let plane = (size as usize) * (size as usize);
        let mut data = vec![0.0f32; plane * 3];
        for (i, pixel) in resized.pixels().enumerate() {
            for channel in 0..3 {
                data[channel * plane + i] = pixel[channel] as f32 / 255.0;
            }
        }
        Self { size, data }
    }

    pub fn shape(&self) -> [usize; 4] {
        [1, 3, self.size as usize, self.size as usize]
    }
}

/// One raw prediction, box encoded as fractions of the input dimensions.
#[derive(Clone, Debug, PartialEq)]
pub struct RawCandidate {
    pub center_x: f32,
    pub center_y: f32,
    pub width: f32,
    pub height: f32,
    pub class_scores: Vec<f32>,
}

impl RawCandidate {
    /// Parse a `[cx, cy, w, h, objectness, class scores...]` row.
    pub fn from_row(row: &[f32]) -> Option<Self> {
        if row.len() < 6 {
            return None;
        }
        Some(Self {
            center_x: row[0],
            center_y: row[1],
            width: row[2],
            height: row[3],
            class_scores: row[5..].to_vec(),
        })
    }

    /// Highest-scoring class; the first one wins a tie.
    pub fn best_class(&self) -> Option<(usize, f32)> {
        self.class_scores
            .iter()
            .copied()
            .enumerate()
            .fold(None, |best, (id, score)| match best {
                Some((_, best_score)) if score <= best_score => best,
                _ if score.is_nan() => best,
                _ => Some((id, score)),
            })
    }
}

/// Inference capability behind the detection engine.
///
/// Implementations own the loaded network. The engine hands them a prepared tensor
/// and interprets whatever candidates come back; a returned error is a detection
/// failure for that frame only.
pub trait InferenceModel {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Side length of the square input the network expects.
    fn input_size(&self) -> u32;

    /// Run the network on one prepared input.
    fn infer(&mut self, input: &InputTensor) -> Result<Vec<RawCandidate>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<M: InferenceModel + ?Sized> InferenceModel for Box<M> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn input_size(&self) -> u32 {
        (**self).input_size()
    }

    fn infer(&mut self, input: &InputTensor) -> Result<Vec<RawCandidate>> {
        (**self).infer(input)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}

/// Ordered class labels, one per model output class.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassNames {
    names: Vec<String>,
}

impl ClassNames {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Read a names file, one label per line.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read class names from {}", path.display()))?;
        let names = Self::parse(&raw);
        if names.is_empty() {
            return Err(anyhow!("class names file {} is empty", path.display()));
        }
        Ok(names)
    }

    pub fn parse(raw: &str) -> Self {
        Self::new(
            raw.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty()),
        )
    }

    pub fn get(&self, id: usize) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Resolve labels to class ids; every label must be known.
    pub fn ids_of(&self, labels: &[String]) -> Result<Vec<usize>> {
        labels
            .iter()
            .map(|label| {
                self.names
                    .iter()
                    .position(|name| name == label)
                    .ok_or_else(|| anyhow!("target class '{}' not found in class names", label))
            })
            .collect()
    }
}

/// Load the configured network and its class names.
///
/// Any failure here is fatal for the caller: there is nothing to detect with.
pub fn load_model(settings: &ModelSettings) -> Result<(Box<dyn InferenceModel>, ClassNames)> {
    let class_names = ClassNames::load(&settings.class_names)?;

    #[cfg(feature = "backend-tract")]
    {
        let model = super::backends::TractModel::load(
            &settings.weights,
            settings.config.as_deref(),
            settings.input_size,
        )?;
        Ok((Box::new(model), class_names))
    }
    #[cfg(not(feature = "backend-tract"))]
    {
        let _ = class_names;
        Err(anyhow!(
            "cannot load {}: model inference requires the backend-tract feature",
            settings.weights.display()
        ))
    }
}
