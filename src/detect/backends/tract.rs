#![cfg(feature = "backend-tract")]

//! ONNX perception backends running on `tract`.
//!
//! Both backends load a local model file once and only do in-memory inference
//! per call. They hold no per-request state but `run` is not shared across
//! threads; [`Perception`](crate::detect::Perception) serializes access.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::{HandDetector, ObjectDetector};
use crate::detect::postprocess::{decode_yolo_head, non_max_suppression};
use crate::detect::result::{
    HandObservation, HandPosition, ObjectCategory, ObjectObservation, Point,
    OBJECT_ACCEPTANCE_THRESHOLD,
};
use crate::frame::DecodedImage;

type Plan = TypedRunnableModel<TypedModel>;

const YOLO_INPUT_SIZE: u32 = 640;
const YOLO_NMS_IOU: f32 = 0.45;

const HAND_INPUT_SIZE: u32 = 224;
const HAND_LANDMARK_COUNT: usize = 21;
const HAND_WRIST: usize = 0;
const HAND_INDEX_TIP: usize = 8;
const HAND_PRESENCE_THRESHOLD: f32 = 0.5;

fn load_plan(model_path: &Path, shape: TVec<usize>) -> Result<Plan> {
    let plan = tract_onnx::onnx()
        .model_for_path(model_path)
        .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
        .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), shape))
        .context("failed to set input fact")?
        .into_optimized()
        .context("failed to optimize ONNX model")?
        .into_runnable()
        .context("failed to build runnable ONNX model")?;
    Ok(plan)
}

/// YOLOv8 object detector over the COCO-80 class set.
///
/// Classes outside the activity vocabulary are discarded after NMS.
pub struct TractObjectDetector {
    model: Plan,
    input_size: u32,
}

impl TractObjectDetector {
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let size = YOLO_INPUT_SIZE as usize;
        let model = load_plan(model_path.as_ref(), tvec!(1, 3, size, size))?;
        Ok(Self {
            model,
            input_size: YOLO_INPUT_SIZE,
        })
    }

    fn build_input(&self, image: &DecodedImage) -> Result<Tensor> {
        let resized = image.resized(self.input_size, self.input_size)?;
        let pixels = resized.pixels();
        let side = self.input_size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, channel, y, x)| {
            pixels[(y * side + x) * 3 + channel] as f32 / 255.0
        });
        Ok(input.into_tensor())
    }
}

impl ObjectDetector for TractObjectDetector {
    fn name(&self) -> &'static str {
        "tract-yolov8"
    }

    fn detect(&mut self, image: &DecodedImage) -> Result<ObjectObservation> {
        let input = self.build_input(image)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let head = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let shape = head.shape();
        if shape.len() != 3 || shape[0] != 1 {
            return Err(anyhow!("unexpected detection head shape {:?}", shape));
        }
        let data = head
            .as_slice::<f32>()
            .context("detection head tensor was not f32")?;

        let scale_x = image.width() as f32 / self.input_size as f32;
        let scale_y = image.height() as f32 / self.input_size as f32;
        let raw = decode_yolo_head(
            data,
            shape[1],
            shape[2],
            scale_x,
            scale_y,
            OBJECT_ACCEPTANCE_THRESHOLD,
        )?;

        let mut observation = ObjectObservation::empty();
        for det in non_max_suppression(raw, YOLO_NMS_IOU) {
            if let Some(category) = ObjectCategory::from_coco_class(det.class_id) {
                observation.insert(category, det.bbox, det.confidence);
            }
        }
        Ok(observation)
    }
}

/// Full-frame hand-landmark model (21 landmarks, NHWC 224x224 input).
///
/// Without a palm-detection stage this reports at most one hand per image.
pub struct TractHandDetector {
    model: Plan,
    input_size: u32,
}

impl TractHandDetector {
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let size = HAND_INPUT_SIZE as usize;
        let model = load_plan(model_path.as_ref(), tvec!(1, size, size, 3))?;
        Ok(Self {
            model,
            input_size: HAND_INPUT_SIZE,
        })
    }

    fn build_input(&self, image: &DecodedImage) -> Result<Tensor> {
        let resized = image.resized(self.input_size, self.input_size)?;
        let pixels = resized.pixels();
        let side = self.input_size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, side, side, 3), |(_, y, x, channel)| {
            pixels[(y * side + x) * 3 + channel] as f32 / 255.0
        });
        Ok(input.into_tensor())
    }
}

impl HandDetector for TractHandDetector {
    fn name(&self) -> &'static str {
        "tract-hand-landmark"
    }

    fn detect(&mut self, image: &DecodedImage) -> Result<HandObservation> {
        let input = self.build_input(image)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;

        let mut landmarks = None;
        let mut presence = None;
        for output in outputs.iter() {
            let values = output
                .as_slice::<f32>()
                .context("hand model output tensor was not f32")?;
            match values.len() {
                n if n == HAND_LANDMARK_COUNT * 3 && landmarks.is_none() => landmarks = Some(values),
                1 if presence.is_none() => presence = Some(values[0]),
                _ => {}
            }
        }
        let landmarks = landmarks.ok_or_else(|| anyhow!("hand model produced no landmark tensor"))?;
        let presence = presence.ok_or_else(|| anyhow!("hand model produced no presence score"))?;

        if presence.is_nan() || presence < HAND_PRESENCE_THRESHOLD {
            return Ok(HandObservation::none());
        }

        let scale_x = image.width() as f32 / self.input_size as f32;
        let scale_y = image.height() as f32 / self.input_size as f32;
        let point = |index: usize| {
            Point::new(
                landmarks[index * 3] * scale_x,
                landmarks[index * 3 + 1] * scale_y,
            )
        };
        Ok(HandObservation::from_positions(vec![HandPosition {
            wrist: point(HAND_WRIST),
            fingertip: point(HAND_INDEX_TIP),
        }]))
    }
}
