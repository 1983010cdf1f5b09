use std::path::Path;
use std::sync::{Arc, Mutex};

use image::DynamicImage;
use ndarray::Array2;
use tch::{CModule, Device, Kind, Tensor, nn::ModuleT};

use super::config::DetectionConfig;
use super::{Detection, DetectionError, Detector, yolo};

/// YOLO detector exported to TorchScript (`yolo export format=torchscript`).
pub struct TorchDetector {
    model: Mutex<CModule>,
    device: Device,
    config: Arc<DetectionConfig>,
}

impl TorchDetector {
    pub fn load(model_path: &Path, config: Arc<DetectionConfig>) -> Result<Self, DetectionError> {
        let device = Device::cuda_if_available();
        let model = CModule::load_on_device(model_path, device)?;
        log::info!(
            "Loaded detector {} on {:?} ({} classes configured)",
            model_path.display(),
            device,
            config.classes.len()
        );
        Ok(Self {
            model: Mutex::new(model),
            device,
            config,
        })
    }
}

impl Detector for TorchDetector {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<Detection>, DetectionError> {
        let (input, frame) = yolo::letterbox(image, self.config.model.input_size)?;
        let shape: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
        let pixels = input
            .as_slice()
            .ok_or_else(|| DetectionError::Shape("input tensor is not contiguous".into()))?;
        let tensor = Tensor::from_slice(pixels)
            .view(shape.as_slice())
            .to_device(self.device);

        let output = {
            let model = self.model.lock().map_err(|_| DetectionError::Poisoned)?;
            tch::no_grad(|| model.forward_t(&tensor, false))
        };
        let output = output
            .to_device(Device::Cpu)
            .to_kind(Kind::Float)
            .squeeze_dim(0)
            .contiguous();

        let size = output.size();
        let [rows, cols] = size.as_slice() else {
            return Err(DetectionError::Shape(format!(
                "expected [1, 4 + classes, anchors], got {:?}",
                size
            )));
        };
        let (rows, cols) = (*rows as usize, *cols as usize);
        let num_elements = rows * cols;
        let mut values = vec![0.0f32; num_elements];
        output.view([-1]).copy_data(&mut values, num_elements);

        let predictions = Array2::from_shape_vec((rows, cols), values)
            .map_err(|e| DetectionError::Shape(e.to_string()))?;
        yolo::decode_predictions(predictions.view(), &frame, &self.config)
    }
}
