//! Model backends
//!
//! A backend turns a preprocessed `[1, 3, H, W]` tensor into one logit per
//! class. `OnnxBackend` runs an ONNX export with tract.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tract_onnx::prelude::tract_ndarray::Array4;
use tract_onnx::prelude::*;
use tracing::{info, warn};

use crate::ClassifierError;

/// Device the forward pass executes on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    Accelerator,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
            Device::Accelerator => "accelerator",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested execution device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    /// Accelerator when available, CPU otherwise
    #[default]
    Auto,
    Cpu,
    Accelerator,
}

/// Preprocessed NCHW model input
pub type InputTensor = Array4<f32>;

/// Forward pass over a preprocessed image tensor
pub trait ModelBackend: Send + Sync {
    /// Run the model and return the logits of the single batch item
    fn forward(&self, input: InputTensor) -> Result<Vec<f32>, ClassifierError>;

    /// Width of the logit vector
    fn num_classes(&self) -> usize;

    fn device(&self) -> Device {
        Device::Cpu
    }
}

type Plan = TypedRunnableModel<TypedModel>;

/// tract-backed ONNX model
pub struct OnnxBackend {
    plan: Plan,
    num_classes: usize,
    device: Device,
}

impl OnnxBackend {
    /// Load and optimize `model.onnx` for a fixed `(height, width)` input
    pub fn load(
        path: &Path,
        input_dims: (u32, u32),
        preference: DevicePreference,
    ) -> Result<Self, ClassifierError> {
        if !path.is_file() {
            return Err(ClassifierError::ModelLoad(format!(
                "model weights not found at {}",
                path.display()
            )));
        }

        let device = select_device(preference);
        info!("Loading ONNX model from {} on {}", path.display(), device);

        let (plan, num_classes) = build_plan(path, input_dims)
            .map_err(|e| ClassifierError::ModelLoad(format!("{}: {}", path.display(), e)))?;

        let num_classes = num_classes.ok_or_else(|| {
            ClassifierError::ModelLoad("model output has no fixed class dimension".into())
        })?;

        Ok(Self {
            plan,
            num_classes,
            device,
        })
    }
}

fn build_plan(path: &Path, (height, width): (u32, u32)) -> TractResult<(Plan, Option<usize>)> {
    let model = tract_onnx::onnx()
        .model_for_path(path)?
        .with_input_fact(0, f32::fact([1, 3, height as usize, width as usize]).into())?
        .into_optimized()?;

    let num_classes = model
        .output_fact(0)?
        .shape
        .as_concrete()
        .and_then(|dims| dims.last().copied());

    Ok((model.into_runnable()?, num_classes))
}

/// tract executes on the host CPU only
fn select_device(preference: DevicePreference) -> Device {
    if preference == DevicePreference::Accelerator {
        warn!("No accelerator support in the tract backend, falling back to cpu");
    }
    Device::Cpu
}

impl ModelBackend for OnnxBackend {
    fn forward(&self, input: InputTensor) -> Result<Vec<f32>, ClassifierError> {
        let tensor: Tensor = input.into();
        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;

        let logits = outputs
            .first()
            .ok_or_else(|| ClassifierError::Inference("model produced no outputs".into()))?
            .to_array_view::<f32>()
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;

        Ok(logits.iter().copied().collect())
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn device(&self) -> Device {
        self.device
    }
}
