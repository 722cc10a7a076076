//! Decoding of YOLOv8-style detection heads.
//!
//! The head is a `[4 + classes, anchors]` tensor laid out channel-major:
//! rows 0..4 hold centre-x, centre-y, width, height in model-input pixels,
//! the remaining rows hold per-class scores.

use anyhow::{anyhow, Result};

use crate::detect::result::BoundingBox;

#[derive(Clone, Debug, PartialEq)]
pub struct RawDetection {
    pub class_id: usize,
    pub confidence: f32,
    /// Source-image pixels.
    pub bbox: BoundingBox,
}

/// Decode a flat head tensor into detections above `confidence_threshold`.
///
/// `scale_x`/`scale_y` map model-input pixels back to source pixels.
pub fn decode_yolo_head(
    output: &[f32],
    num_attrs: usize,
    num_anchors: usize,
    scale_x: f32,
    scale_y: f32,
    confidence_threshold: f32,
) -> Result<Vec<RawDetection>> {
    if num_attrs <= 4 {
        return Err(anyhow!("detection head has no class scores ({} attrs)", num_attrs));
    }
    let expected = num_attrs
        .checked_mul(num_anchors)
        .ok_or_else(|| anyhow!("detection head dimensions overflow"))?;
    if output.len() != expected {
        return Err(anyhow!(
            "detection head length mismatch: expected {}, got {}",
            expected,
            output.len()
        ));
    }

    let at = |attr: usize, anchor: usize| output[attr * num_anchors + anchor];
    let mut detections = Vec::new();
    for anchor in 0..num_anchors {
        let (class_id, confidence) = (4..num_attrs)
            .map(|attr| (attr - 4, at(attr, anchor)))
            .fold((0, f32::NEG_INFINITY), |best, cur| {
                if cur.1 > best.1 {
                    cur
                } else {
                    best
                }
            });
        if !confidence.is_finite() || confidence <= confidence_threshold {
            continue;
        }
        let (cx, cy) = (at(0, anchor), at(1, anchor));
        let (w, h) = (at(2, anchor), at(3, anchor));
        detections.push(RawDetection {
            class_id,
            confidence,
            bbox: BoundingBox {
                x1: (cx - w / 2.0) * scale_x,
                y1: (cy - h / 2.0) * scale_y,
                x2: (cx + w / 2.0) * scale_x,
                y2: (cy + h / 2.0) * scale_y,
            },
        });
    }
    Ok(detections)
}

/// Class-aware greedy non-maximum suppression, highest confidence first.
pub fn non_max_suppression(mut detections: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<RawDetection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && iou(&k.bbox, &candidate.bbox) >= iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let ix = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let iy = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let intersection = ix * iy;
    let union = area(a) + area(b) - intersection;
    if union <= 0.0 {
        0.0
    } else {
        intersection / union
    }
}

fn area(b: &BoundingBox) -> f32 {
    (b.x2 - b.x1).max(0.0) * (b.y2 - b.y1).max(0.0)
}
