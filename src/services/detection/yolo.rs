//! YOLOv8 pre- and post-processing
//!
//! Independent of the inference runtime so the tensor layout handling can be
//! tested without model weights.

use image::{imageops::FilterType, DynamicImage};
use ndarray::{Array4, ArrayView2};

use crate::models::{BoundingBox, Detection};

/// Square input edge of the standard YOLOv8 export
pub const INPUT_SIZE: u32 = 640;

/// Default IoU threshold for non-maximum suppression
pub const NMS_IOU: f32 = 0.45;

/// COCO class names (80 classes), used by the generic pretrained weights
pub const COCO_CLASSES: &[&str] = &[
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat",
    "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack",
    "umbrella", "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball",
    "kite", "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket",
    "bottle", "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple",
    "sandwich", "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair",
    "couch", "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
    "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator",
    "book", "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

pub fn coco_class_names() -> Vec<String> {
    COCO_CLASSES.iter().map(|s| s.to_string()).collect()
}

/// Parses the `names` metadata written by Ultralytics exports,
/// e.g. `{0: 'apple', 1: 'ash gourd -kubhindo-'}`.
///
/// Names are quoted Python strings, so they may contain commas and colons.
pub fn parse_class_names(metadata: &str) -> Option<Vec<String>> {
    let body = metadata.trim().strip_prefix('{')?.strip_suffix('}')?;
    let mut rest = body.trim_start();

    let mut entries: Vec<(usize, String)> = Vec::new();
    while !rest.is_empty() {
        let (index, after_index) = rest.split_once(':')?;
        let index: usize = index.trim().parse().ok()?;
        let (name, after_name) = parse_quoted(after_index.trim_start())?;
        entries.push((index, name));

        rest = after_name.trim_start();
        if let Some(next) = rest.strip_prefix(',') {
            rest = next.trim_start();
        } else if !rest.is_empty() {
            return None;
        }
    }

    entries.sort_by_key(|(index, _)| *index);
    let contiguous = entries.iter().enumerate().all(|(i, (index, _))| i == *index);
    if entries.is_empty() || !contiguous {
        return None;
    }

    Some(entries.into_iter().map(|(_, name)| name).collect())
}

/// Reads one `'...'` or `"..."` literal, returning it and the remaining input
fn parse_quoted(input: &str) -> Option<(String, &str)> {
    let quote = input.chars().next().filter(|c| *c == '\'' || *c == '"')?;

    let mut value = String::new();
    let mut chars = input.char_indices().skip(1);
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => value.push(chars.next()?.1),
            c if c == quote => return Some((value, &input[i + c.len_utf8()..])),
            c => value.push(c),
        }
    }
    None
}

/// Number of classes in an output of `rows` rows (`4 + classes`)
pub fn output_class_count(rows: usize) -> Option<usize> {
    rows.checked_sub(4).filter(|classes| *classes > 0)
}

/// Picks the class names for a model.
///
/// `metadata` is the raw `names` entry of the export and `classes` the class
/// count read from the output shape, when it is static. Without usable
/// metadata the COCO names are only accepted for an 80-class output.
pub fn resolve_class_names(metadata: Option<&str>, classes: Option<usize>) -> Result<Vec<String>, String> {
    let names = match metadata.and_then(parse_class_names) {
        Some(names) => names,
        None if classes.map_or(true, |c| c == COCO_CLASSES.len()) => coco_class_names(),
        None => {
            return Err(format!(
                "model has {} classes but no readable class names",
                classes.unwrap_or_default()
            ))
        }
    };

    match classes {
        Some(count) if count != names.len() => Err(format!(
            "model has {} classes but {} class names",
            count,
            names.len()
        )),
        _ => Ok(names),
    }
}

/// Resizes to the model input and lays the pixels out as `[1, 3, H, W]` in [0, 1]
pub fn to_input_tensor(image: &DynamicImage, width: u32, height: u32) -> Array4<f32> {
    let resized = image.resize_exact(width, height, FilterType::Triangle).to_rgb8();

    let mut input = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        input[[0, 0, y as usize, x as usize]] = r as f32 / 255.0;
        input[[0, 1, y as usize, x as usize]] = g as f32 / 255.0;
        input[[0, 2, y as usize, x as usize]] = b as f32 / 255.0;
    }
    input
}

/// Thresholds and geometry needed to decode one output tensor
#[derive(Debug, Clone, Copy)]
pub struct DecodeParams {
    pub confidence: f32,
    pub iou: f32,
    pub input_size: (u32, u32),
    pub image_size: (u32, u32),
}

/// Decodes a YOLOv8 output of shape `[4 + classes, anchors]`.
///
/// Each anchor column holds `cx, cy, w, h` in input-pixel space followed by
/// one score per class. The best class is kept when it clears the confidence
/// threshold; boxes are rescaled to the source image and suppressed per class.
pub fn decode_predictions(
    output: ArrayView2<f32>,
    names: &[String],
    params: &DecodeParams,
) -> Vec<Detection> {
    let (rows, anchors) = output.dim();
    if rows <= 4 {
        return Vec::new();
    }

    let scale_x = params.image_size.0 as f32 / params.input_size.0 as f32;
    let scale_y = params.image_size.1 as f32 / params.input_size.1 as f32;
    let (image_w, image_h) = (params.image_size.0 as f32, params.image_size.1 as f32);

    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let column = output.column(anchor);

        let Some((class_idx, score)) = column
            .iter()
            .skip(4)
            .copied()
            .enumerate()
            .filter(|(_, s)| s.is_finite())
            .max_by(|a, b| a.1.total_cmp(&b.1))
        else {
            continue;
        };

        if score < params.confidence {
            continue;
        }

        let bbox = BoundingBox::from_center(
            column[0] * scale_x,
            column[1] * scale_y,
            column[2] * scale_x,
            column[3] * scale_y,
        )
        .clamp_to(image_w, image_h);

        if bbox.area() <= 0.0 {
            continue;
        }

        let label = names
            .get(class_idx)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_idx));

        candidates.push(Detection::new(label, bbox, score));
    }

    non_max_suppression(candidates, params.iou)
}

/// Greedy per-label non-maximum suppression, highest confidence first
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Detection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let overlaps = keep.iter().any(|kept| {
            kept.label == candidate.label
                && kept.bounding_box.iou(&candidate.bounding_box) > iou_threshold
        });
        if !overlaps {
            keep.push(candidate);
        }
    }
    keep
}
