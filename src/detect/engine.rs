use anyhow::Result;

use super::backend::{ClassNames, InferenceModel, InputTensor};
use super::postprocess::{non_max_suppression, select_candidates};
use super::result::Detection;
use crate::config::DetectionSettings;
use crate::frame::{AnnotatedFrame, Frame};
use crate::render::Annotator;

/// Turns frames into filtered, de-duplicated vehicle detections.
///
/// Errors from the model are returned to the caller untouched; deciding how to
/// degrade is the scheduler's job.
pub struct DetectionEngine<M> {
    model: M,
    class_names: ClassNames,
    target_classes: Vec<usize>,
    confidence_threshold: f32,
    nms_score_threshold: f32,
    iou_threshold: f32,
    annotator: Annotator,
}

impl<M: InferenceModel> DetectionEngine<M> {
    /// Fails when a configured target class is missing from `class_names`.
    pub fn new(
        model: M,
        class_names: ClassNames,
        settings: &DetectionSettings,
        annotator: Annotator,
    ) -> Result<Self> {
        let target_classes = class_names.ids_of(&settings.target_classes)?;
        Ok(Self {
            model,
            class_names,
            target_classes,
            confidence_threshold: settings.confidence_threshold,
            nms_score_threshold: settings.nms_score_threshold,
            iou_threshold: settings.iou_threshold,
            annotator,
        })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn annotator(&self) -> &Annotator {
        &self.annotator
    }

    /// Run inference and post-processing without touching the frame.
    pub fn detections(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let input = InputTensor::from_frame(frame, self.model.input_size());
        let raw = self.model.infer(&input)?;
        let candidates = select_candidates(
            &raw,
            &self.target_classes,
            self.confidence_threshold,
            frame.width(),
            frame.height(),
        );
        let survivors =
            non_max_suppression(candidates, self.nms_score_threshold, self.iou_threshold);
        log::debug!(
            "{} raw candidates, {} survived suppression",
            raw.len(),
            survivors.len()
        );
        Ok(survivors
            .into_iter()
            .map(|candidate| Detection {
                label: self
                    .class_names
                    .get(candidate.class_id)
                    .unwrap_or("unknown")
                    .to_string(),
                class_id: candidate.class_id,
                confidence: candidate.confidence,
                bbox: candidate.bbox,
            })
            .collect())
    }

    /// Draw `detections` onto `frame`.
    pub fn annotate(&self, frame: Frame, detections: &[Detection]) -> AnnotatedFrame {
        self.annotator.annotate(frame, detections)
    }

    /// Detect and annotate in one step.
    pub fn detect(&mut self, frame: Frame) -> Result<(AnnotatedFrame, Vec<Detection>)> {
        let detections = self.detections(&frame)?;
        let annotated = self.annotate(frame, &detections);
        Ok((annotated, detections))
    }
}
