//! Frame decimation.
//!
//! Detection is expensive, so only every Nth acquired frame runs the engine. The
//! frames in between reuse the last `DetectionResult`, drawn onto the fresh frame.
//! The cache holds at most one result and is only written on a successful Detect.

use crate::detect::{DetectionEngine, DetectionResult, InferenceModel};
use crate::frame::{AnnotatedFrame, Frame};

/// Per-frame scheduling decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Detect,
    Reuse,
}

/// What actually happened to a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Detection ran and the cache was overwritten.
    Detected,
    /// The cached result was reused.
    Reused,
    /// Reuse before any detection: raw frame, zero detections.
    ColdStart,
    /// Detection failed: raw frame, zero detections, cache untouched.
    DetectionFailed,
}

/// One scheduled frame, ready for the HUD and display.
pub struct ProcessedFrame {
    pub index: u64,
    pub decision: Decision,
    pub outcome: Outcome,
    pub annotated: AnnotatedFrame,
    pub result: DetectionResult,
}

pub struct FrameScheduler<M> {
    engine: DetectionEngine<M>,
    decimation: u64,
    counter: u64,
    cache: Option<DetectionResult>,
}

impl<M: InferenceModel> FrameScheduler<M> {
    /// `decimation` of zero is treated as one (detect every frame).
    pub fn new(engine: DetectionEngine<M>, decimation: u32) -> Self {
        Self {
            engine,
            decimation: u64::from(decimation.max(1)),
            counter: 0,
            cache: None,
        }
    }

    pub fn engine(&self) -> &DetectionEngine<M> {
        &self.engine
    }

    pub fn cached(&self) -> Option<&DetectionResult> {
        self.cache.as_ref()
    }

    pub fn decide(&self, index: u64) -> Decision {
        if index % self.decimation == 0 {
            Decision::Detect
        } else {
            Decision::Reuse
        }
    }

    /// Assign the next index to `frame` and detect or reuse.
    pub fn process(&mut self, frame: Frame) -> ProcessedFrame {
        self.counter += 1;
        let index = self.counter;
        let decision = self.decide(index);

        let (outcome, annotated, result) = match decision {
            Decision::Detect => match self.engine.detections(&frame) {
                Ok(detections) => {
                    let result = DetectionResult::new(index, detections);
                    let annotated = self.engine.annotate(frame, &result.detections);
                    self.cache = Some(result.clone());
                    (Outcome::Detected, annotated, result)
                }
                Err(err) => {
                    log::warn!("detection failed on frame {}: {:#}", index, err);
                    (
                        Outcome::DetectionFailed,
                        AnnotatedFrame::unannotated(frame),
                        DetectionResult::empty(index),
                    )
                }
            },
            Decision::Reuse => match &self.cache {
                Some(cached) => (
                    Outcome::Reused,
                    self.engine.annotate(frame, &cached.detections),
                    cached.clone(),
                ),
                None => (
                    Outcome::ColdStart,
                    AnnotatedFrame::unannotated(frame),
                    DetectionResult::empty(index),
                ),
            },
        };

        ProcessedFrame {
            index,
            decision,
            outcome,
            annotated,
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::{anyhow, Result};
    use image::RgbImage;

    use super::*;
    use crate::config::DetectionSettings;
    use crate::detect::{ClassNames, InputTensor, RawCandidate};
    use crate::render::Annotator;

    /// Reports a car whose horizontal position moves with each call; fails on
    /// the calls listed in `fail_on`.
    struct SequenceModel {
        calls: u64,
        fail_on: Vec<u64>,
    }

    impl InferenceModel for SequenceModel {
        fn name(&self) -> &'static str {
            "sequence"
        }

        fn input_size(&self) -> u32 {
            16
        }

        fn infer(&mut self, _input: &InputTensor) -> Result<Vec<RawCandidate>> {
            self.calls += 1;
            if self.fail_on.contains(&self.calls) {
                return Err(anyhow!("malformed frame"));
            }
            Ok(vec![RawCandidate {
                center_x: 0.1 * self.calls as f32,
                center_y: 0.5,
                width: 0.1,
                height: 0.1,
                class_scores: vec![0.0, 0.0, 0.9],
            }])
        }
    }

    fn scheduler(decimation: u32, fail_on: Vec<u64>) -> FrameScheduler<SequenceModel> {
        let engine = DetectionEngine::new(
            SequenceModel { calls: 0, fail_on },
            ClassNames::new(["person", "bicycle", "car"]),
            &DetectionSettings {
                target_classes: vec!["car".to_string()],
                ..DetectionSettings::default()
            },
            Annotator::default(),
        )
        .unwrap();
        FrameScheduler::new(engine, decimation)
    }

    fn frame() -> Frame {
        Frame::from_rgb(RgbImage::new(100, 100))
    }

    #[test]
    fn detects_on_multiples_of_the_interval() {
        let mut scheduler = scheduler(3, vec![]);
        let mut detect_indices = Vec::new();
        let mut last_detect = None;
        for _ in 1..=9 {
            let processed = scheduler.process(frame());
            match processed.decision {
                Decision::Detect => {
                    detect_indices.push(processed.index);
                    last_detect = Some(processed.result.clone());
                }
                Decision::Reuse => {
                    if let Some(expected) = &last_detect {
                        assert_eq!(processed.outcome, Outcome::Reused);
                        assert_eq!(&processed.result, expected);
                    }
                }
            }
        }
        assert_eq!(detect_indices, vec![3, 6, 9]);
        assert_eq!(scheduler.engine().model().calls, 3);
        assert_eq!(scheduler.cached().map(|r| r.frame_index), Some(9));
    }

    #[test]
    fn cold_start_yields_raw_frame_without_detections() {
        let mut scheduler = scheduler(3, vec![]);
        let processed = scheduler.process(frame());
        assert_eq!(processed.index, 1);
        assert_eq!(processed.decision, Decision::Reuse);
        assert_eq!(processed.outcome, Outcome::ColdStart);
        assert_eq!(processed.annotated.vehicle_count(), 0);
        assert!(processed.result.detections.is_empty());
        assert!(scheduler.cached().is_none());
    }

    #[test]
    fn reuse_draws_cached_detections_on_the_new_frame() {
        let mut scheduler = scheduler(2, vec![]);
        scheduler.process(frame());
        let detected = scheduler.process(frame());
        assert_eq!(detected.outcome, Outcome::Detected);
        assert_eq!(detected.annotated.vehicle_count(), 1);

        let reused = scheduler.process(frame());
        assert_eq!(reused.outcome, Outcome::Reused);
        assert_eq!(reused.result, detected.result);
        assert_eq!(reused.result.frame_index, 2);
        assert_eq!(reused.annotated.vehicle_count(), 1);
    }

    #[test]
    fn detection_failure_degrades_and_keeps_previous_cache() {
        let mut scheduler = scheduler(1, vec![2]);
        let first = scheduler.process(frame());
        assert_eq!(first.outcome, Outcome::Detected);

        let failed = scheduler.process(frame());
        assert_eq!(failed.outcome, Outcome::DetectionFailed);
        assert_eq!(failed.annotated.vehicle_count(), 0);
        assert_eq!(scheduler.cached(), Some(&first.result));

        let third = scheduler.process(frame());
        assert_eq!(third.outcome, Outcome::Detected);
        assert_eq!(scheduler.cached().map(|r| r.frame_index), Some(3));
    }
}
