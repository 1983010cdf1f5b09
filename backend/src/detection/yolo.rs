use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};
use ndarray::{Array4, ArrayView2, s};

use super::config::DetectionConfig;
use super::{BoundingBox, Detection, DetectionError};

const PAD_VALUE: u8 = 114;

/// How an image was fitted into the square model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub original_width: f32,
    pub original_height: f32,
}

impl Letterbox {
    /// Maps a centre/size box in model input pixels back onto the original image.
    pub fn restore(&self, cx: f32, cy: f32, w: f32, h: f32) -> BoundingBox {
        let unmap_x = |x: f32| ((x - self.pad_x) / self.scale).clamp(0.0, self.original_width);
        let unmap_y = |y: f32| ((y - self.pad_y) / self.scale).clamp(0.0, self.original_height);
        BoundingBox {
            x1: unmap_x(cx - w / 2.0),
            y1: unmap_y(cy - h / 2.0),
            x2: unmap_x(cx + w / 2.0),
            y2: unmap_y(cy + h / 2.0),
        }
    }
}

/// Resizes keeping the aspect ratio, pads to `size`x`size` with grey and
/// returns an NCHW tensor scaled to [0, 1].
pub fn letterbox(image: &DynamicImage, size: u32) -> Result<(Array4<f32>, Letterbox), DetectionError> {
    if size == 0 {
        return Err(DetectionError::Shape("model input size must be positive".into()));
    }
    let (width, height) = (image.width().max(1), image.height().max(1));
    let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
    let new_width = ((width as f32 * scale).round() as u32).clamp(1, size);
    let new_height = ((height as f32 * scale).round() as u32).clamp(1, size);

    let resized = image::imageops::resize(&image.to_rgb8(), new_width, new_height, FilterType::Triangle);
    let pad_x = (size - new_width) / 2;
    let pad_y = (size - new_height) / 2;
    let mut canvas = RgbImage::from_pixel(size, size, Rgb([PAD_VALUE; 3]));
    image::imageops::replace(&mut canvas, &resized, pad_x as i64, pad_y as i64);

    let side = size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
    for (x, y, pixel) in canvas.enumerate_pixels() {
        for channel in 0..3 {
            tensor[[0, channel, y as usize, x as usize]] = pixel[channel] as f32 / 255.0;
        }
    }

    let frame = Letterbox {
        scale,
        pad_x: pad_x as f32,
        pad_y: pad_y as f32,
        original_width: width as f32,
        original_height: height as f32,
    };
    Ok((tensor, frame))
}

/// Decodes a YOLOv8-style head of shape `[4 + classes, anchors]` where each
/// column is `cx, cy, w, h, score_0 .. score_n` in model input pixels.
pub fn decode_predictions(
    output: ArrayView2<f32>,
    frame: &Letterbox,
    config: &DetectionConfig,
) -> Result<Vec<Detection>, DetectionError> {
    if output.nrows() < 5 {
        return Err(DetectionError::Shape(format!(
            "expected at least 5 rows (box + one class), got {:?}",
            output.shape()
        )));
    }

    let threshold = config.model.confidence_threshold;
    let mut detections = Vec::new();
    for column in output.columns() {
        let scores = column.slice(s![4..]);
        let Some((class_id, &confidence)) = scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
        else {
            continue;
        };
        if confidence < threshold {
            continue;
        }
        detections.push(Detection {
            class_id,
            label: config.class_label(class_id),
            confidence,
            bbox: frame.restore(column[0], column[1], column[2], column[3]),
        });
    }

    Ok(non_max_suppression(detections, config.model.nms_threshold))
}

/// Per-class NMS, highest confidence first.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::new();
    for candidate in detections {
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) >= iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn identity_frame(size: f32) -> Letterbox {
        Letterbox {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
            original_width: size,
            original_height: size,
        }
    }

    /// Builds a `[4 + 3, anchors]` head from `(cx, cy, w, h, [scores])` tuples.
    fn head(anchors: &[(f32, f32, f32, f32, [f32; 3])]) -> Array2<f32> {
        let mut output = Array2::<f32>::zeros((7, anchors.len()));
        for (i, (cx, cy, w, h, scores)) in anchors.iter().enumerate() {
            output[[0, i]] = *cx;
            output[[1, i]] = *cy;
            output[[2, i]] = *w;
            output[[3, i]] = *h;
            for (c, score) in scores.iter().enumerate() {
                output[[4 + c, i]] = *score;
            }
        }
        output
    }

    #[test]
    fn letterbox_pads_the_short_side() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 100, Rgb([255, 0, 0])));
        let (tensor, frame) = letterbox(&image, 64).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 64, 64]);
        assert!((frame.scale - 0.32).abs() < 1e-6);
        assert_eq!(frame.pad_x, 0.0);
        assert_eq!(frame.pad_y, 16.0);
        // padding row is grey, content row is red
        assert!((tensor[[0, 0, 0, 10]] - 114.0 / 255.0).abs() < 1e-6);
        assert!((tensor[[0, 0, 32, 10]] - 1.0).abs() < 1e-6);
        assert!(tensor[[0, 1, 32, 10]].abs() < 1e-6);
    }

    #[test]
    fn letterbox_rejects_zero_size() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(20, 10));
        assert!(matches!(letterbox(&image, 0), Err(DetectionError::Shape(_))));
    }

    #[test]
    fn restore_undoes_letterbox() {
        let frame = Letterbox {
            scale: 0.5,
            pad_x: 0.0,
            pad_y: 80.0,
            original_width: 1280.0,
            original_height: 960.0,
        };
        let bbox = frame.restore(320.0, 320.0, 100.0, 60.0);
        assert!((bbox.x1 - 540.0).abs() < 1e-3);
        assert!((bbox.x2 - 740.0).abs() < 1e-3);
        assert!((bbox.y1 - 420.0).abs() < 1e-3);
        assert!((bbox.y2 - 540.0).abs() < 1e-3);
    }

    #[test]
    fn keeps_confident_anchors_with_labels() {
        let output = head(&[
            (50.0, 50.0, 20.0, 20.0, [0.1, 0.9, 0.05]),
            (150.0, 150.0, 20.0, 20.0, [0.1, 0.1, 0.1]),
            (300.0, 100.0, 40.0, 40.0, [0.6, 0.0, 0.0]),
        ]);
        let detections = decode_predictions(
            output.view(),
            &identity_frame(640.0),
            &DetectionConfig::default(),
        )
        .unwrap();
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].label, "garbage");
        assert!((detections[0].confidence - 0.9).abs() < 1e-6);
        assert_eq!(detections[1].label, "pothole");
        assert!((detections[1].bbox.x1 - 280.0).abs() < 1e-3);
    }

    #[test]
    fn suppresses_overlapping_boxes_of_the_same_class() {
        let output = head(&[
            (100.0, 100.0, 50.0, 50.0, [0.0, 0.0, 0.8]),
            (102.0, 101.0, 50.0, 50.0, [0.0, 0.0, 0.7]),
            (101.0, 100.0, 50.0, 50.0, [0.75, 0.0, 0.0]),
            (400.0, 400.0, 50.0, 50.0, [0.0, 0.0, 0.5]),
        ]);
        let detections = decode_predictions(
            output.view(),
            &identity_frame(640.0),
            &DetectionConfig::default(),
        )
        .unwrap();
        let summary: Vec<(&str, f32)> = detections
            .iter()
            .map(|d| (d.label.as_str(), d.confidence))
            .collect();
        assert_eq!(
            summary,
            vec![("graffiti", 0.8), ("pothole", 0.75), ("graffiti", 0.5)]
        );
    }

    #[test]
    fn rejects_malformed_heads() {
        let output = Array2::<f32>::zeros((4, 10));
        assert!(matches!(
            decode_predictions(output.view(), &identity_frame(640.0), &DetectionConfig::default()),
            Err(DetectionError::Shape(_))
        ));
    }
}
