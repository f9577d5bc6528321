/// YOLOv8-style object detector using ONNX Runtime via `ort`.
///
/// Handles letterbox preprocessing, inference, per-class score filtering on
/// the configured target class, and NMS. Tracking happens downstream.
use std::path::Path;

use crate::detection::domain::object_detector::{ObjectDetector, RawDetection};
use crate::detection::domain::target_class::ClassId;
use crate::shared::bbox::BoundingBox;
use crate::shared::frame::Frame;

use super::execution_provider::preferred_execution_providers;

/// Fallback model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.45;

/// Leading box values per prediction row: cx, cy, w, h.
const BOX_VALUES: usize = 4;

pub struct OnnxYoloDetector {
    session: ort::session::Session,
    target: ClassId,
    confidence: f64,
    max_detections: usize,
    input_size: u32,
}

impl OnnxYoloDetector {
    /// Load a YOLO ONNX model restricted to `target`.
    ///
    /// The input resolution is read from the model's NCHW input shape,
    /// falling back to 640 when it is dynamic.
    pub fn new(
        model_path: &Path,
        target: ClassId,
        confidence: f64,
        max_detections: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let session = ort::session::Session::builder()?
            .with_execution_providers(preferred_execution_providers())?
            .commit_from_file(model_path)?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| match input.dtype() {
                ort::value::ValueType::Tensor { shape, .. } if shape.len() >= 4 && shape[2] > 0 => {
                    Some(shape[2] as u32)
                }
                _ => None,
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        log::info!(
            "Loaded detector {} (input {input_size}px, class {})",
            model_path.display(),
            target.0
        );

        Ok(Self {
            session,
            target,
            confidence,
            max_detections,
            input_size,
        })
    }
}

impl ObjectDetector for OnnxYoloDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>, Box<dyn std::error::Error>> {
        if frame.width() == 0 || frame.height() == 0 {
            return Ok(Vec::new());
        }

        let (input_tensor, geometry) = letterbox(frame, self.input_size);

        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("YOLO model produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;

        let mut candidates = decode_predictions(data, tensor.shape(), self.target, self.confidence)?;
        let kept = nms(&mut candidates, NMS_IOU_THRESH);

        Ok(kept
            .into_iter()
            .filter_map(|c| {
                let (x1, y1, x2, y2) = geometry.unmap(&c);
                BoundingBox::from_corners(x1, y1, x2, y2)
                    .clamp_to(frame.width(), frame.height())
                    .map(|bbox| RawDetection {
                        bbox,
                        confidence: c.confidence,
                    })
            })
            .take(self.max_detections)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Scale and padding applied by `letterbox`, needed to map boxes back.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Letterbox {
    scale: f64,
    pad_x: u32,
    pad_y: u32,
}

impl Letterbox {
    fn unmap(&self, c: &Candidate) -> (f64, f64, f64, f64) {
        let (px, py) = (self.pad_x as f64, self.pad_y as f64);
        (
            (c.x1 - px) / self.scale,
            (c.y1 - py) / self.scale,
            (c.x2 - px) / self.scale,
            (c.y2 - py) / self.scale,
        )
    }
}

/// Letterbox-resize a frame to `target_size` × `target_size` as an NCHW
/// float tensor padded with YOLO grey.
fn letterbox(frame: &Frame, target_size: u32) -> (ndarray::Array4<f32>, Letterbox) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    // Nearest-neighbour resize into the padded region
    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    (
        tensor,
        Letterbox {
            scale,
            pad_x,
            pad_y,
        },
    )
}

// ---------------------------------------------------------------------------
// Postprocessing
// ---------------------------------------------------------------------------

/// A prediction in letterbox coordinates, as corners.
#[derive(Clone, Debug, PartialEq)]
struct Candidate {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    confidence: f64,
}

/// Extract predictions whose best class is the target and whose score
/// reaches `min_confidence`. Ties go to the lower class index.
///
/// YOLOv8 emits `[1, 4 + classes, predictions]`; some exports transpose it
/// to `[1, predictions, 4 + classes]`. Both are accepted.
fn decode_predictions(
    data: &[f32],
    shape: &[usize],
    target: ClassId,
    min_confidence: f64,
) -> Result<Vec<Candidate>, Box<dyn std::error::Error>> {
    if shape.len() != 3 {
        return Err(format!("Unexpected YOLO output shape: {shape:?}").into());
    }
    let transposed = shape[1] < shape[2];
    let (num_preds, num_feats) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    let score_idx = BOX_VALUES + target.0;
    if score_idx >= num_feats {
        return Err(format!(
            "class {} out of range for a model with {} classes",
            target.0,
            num_feats.saturating_sub(BOX_VALUES)
        )
        .into());
    }
    if data.len() < num_preds * num_feats {
        return Err("YOLO output shorter than its shape".into());
    }

    let value = |pred: usize, feat: usize| -> f64 {
        let i = if transposed {
            feat * num_preds + pred
        } else {
            pred * num_feats + feat
        };
        data[i] as f64
    };

    let mut out = Vec::new();
    for p in 0..num_preds {
        let confidence = value(p, score_idx);
        if confidence < min_confidence {
            continue;
        }
        let outscored = (BOX_VALUES..num_feats).any(|f| {
            let other = value(p, f);
            other > confidence || (other == confidence && f < score_idx)
        });
        if outscored {
            continue;
        }
        let (cx, cy, w, h) = (value(p, 0), value(p, 1), value(p, 2), value(p, 3));
        out.push(Candidate {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
            confidence,
        });
    }
    Ok(out)
}

/// Greedy NMS: sort by confidence descending, suppress overlapping boxes.
fn nms(dets: &mut [Candidate], iou_thresh: f64) -> Vec<Candidate> {
    dets.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep = Vec::new();
    let mut suppressed = vec![false; dets.len()];

    for i in 0..dets.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(dets[i].clone());
        for j in (i + 1)..dets.len() {
            if !suppressed[j] && corner_iou(&dets[i], &dets[j]) > iou_thresh {
                suppressed[j] = true;
            }
        }
    }
    keep
}

fn corner_iou(a: &Candidate, b: &Candidate) -> f64 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = (a.x2 - a.x1) * (a.y2 - a.y1);
    let area_b = (b.x2 - b.x1) * (b.y2 - b.y1);
    inter / (area_a + area_b - inter)
}
