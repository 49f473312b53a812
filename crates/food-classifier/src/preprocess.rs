//! Image decoding and model input preprocessing

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::InputTensor;
use crate::ClassifierError;

/// Resampling filter, encoded as the integer codes used by pretrained
/// preprocessor configs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Resample {
    Nearest,
    Lanczos,
    Bilinear,
    Bicubic,
}

impl TryFrom<u8> for Resample {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Resample::Nearest),
            1 => Ok(Resample::Lanczos),
            2 => Ok(Resample::Bilinear),
            3 => Ok(Resample::Bicubic),
            other => Err(format!("unsupported resample code {}", other)),
        }
    }
}

impl From<Resample> for u8 {
    fn from(r: Resample) -> u8 {
        match r {
            Resample::Nearest => 0,
            Resample::Lanczos => 1,
            Resample::Bilinear => 2,
            Resample::Bicubic => 3,
        }
    }
}

impl From<Resample> for FilterType {
    fn from(r: Resample) -> FilterType {
        match r {
            Resample::Nearest => FilterType::Nearest,
            Resample::Lanczos => FilterType::Lanczos3,
            Resample::Bilinear => FilterType::Triangle,
            Resample::Bicubic => FilterType::CatmullRom,
        }
    }
}

/// Target size of a resize or crop step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SizeSpec {
    /// Square output of the given side
    Square(u32),
    /// Exact output dimensions
    Exact { height: u32, width: u32 },
    /// Scale so the shorter side matches, keeping aspect ratio
    ShortestEdge { shortest_edge: u32 },
}

impl SizeSpec {
    /// Fixed (height, width), if any
    fn fixed(&self) -> Option<(u32, u32)> {
        match *self {
            SizeSpec::Square(n) => Some((n, n)),
            SizeSpec::Exact { height, width } => Some((height, width)),
            SizeSpec::ShortestEdge { .. } => None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_size() -> SizeSpec {
    SizeSpec::Square(224)
}

fn default_resample() -> Resample {
    Resample::Bilinear
}

fn default_rescale_factor() -> f32 {
    1.0 / 255.0
}

fn default_half() -> [f32; 3] {
    [0.5, 0.5, 0.5]
}

/// Preprocessing transform, deserialized from `preprocessor_config.json`.
///
/// Missing keys take ViT defaults: 224x224 bilinear resize, rescale by
/// 1/255, normalize with mean and std of 0.5.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessorConfig {
    #[serde(default = "default_true")]
    pub do_resize: bool,
    #[serde(default = "default_size")]
    pub size: SizeSpec,
    #[serde(default = "default_resample")]
    pub resample: Resample,
    #[serde(default)]
    pub do_center_crop: bool,
    #[serde(default)]
    pub crop_size: Option<SizeSpec>,
    #[serde(default = "default_true")]
    pub do_rescale: bool,
    #[serde(default = "default_rescale_factor")]
    pub rescale_factor: f32,
    #[serde(default = "default_true")]
    pub do_normalize: bool,
    #[serde(default = "default_half")]
    pub image_mean: [f32; 3],
    #[serde(default = "default_half")]
    pub image_std: [f32; 3],
}

impl Default for PreprocessorConfig {
    fn default() -> Self {
        Self {
            do_resize: true,
            size: default_size(),
            resample: default_resample(),
            do_center_crop: false,
            crop_size: None,
            do_rescale: true,
            rescale_factor: default_rescale_factor(),
            do_normalize: true,
            image_mean: default_half(),
            image_std: default_half(),
        }
    }
}

impl PreprocessorConfig {
    /// Load `<model_dir>/preprocessor_config.json`, or defaults if absent
    pub fn load(model_dir: &Path) -> Result<Self, ClassifierError> {
        let path = model_dir.join("preprocessor_config.json");
        let config = if path.is_file() {
            let json = std::fs::read_to_string(&path)
                .map_err(|e| ClassifierError::ModelLoad(format!("{}: {}", path.display(), e)))?;
            serde_json::from_str(&json).map_err(|e| {
                ClassifierError::ModelLoad(format!("invalid {}: {}", path.display(), e))
            })?
        } else {
            debug!("No preprocessor_config.json in {}, using defaults", model_dir.display());
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Check the transform yields a fixed input shape
    pub fn validate(&self) -> Result<(), ClassifierError> {
        if self.image_std.iter().any(|s| *s == 0.0) {
            return Err(ClassifierError::ModelLoad("image_std contains zero".into()));
        }
        if self.input_dims().is_none() {
            return Err(ClassifierError::ModelLoad(
                "preprocessor must produce a fixed input size (set size or crop_size)".into(),
            ));
        }
        Ok(())
    }

    /// Model input (height, width) produced by this transform
    pub fn input_dims(&self) -> Option<(u32, u32)> {
        if self.do_center_crop {
            return match self.crop_size {
                Some(spec) => spec.fixed(),
                None => self.size.fixed(),
            };
        }
        if self.do_resize {
            self.size.fixed()
        } else {
            None
        }
    }

    /// Transform a decoded image into an NCHW `[1, 3, H, W]` tensor
    pub fn apply(&self, image: &DynamicImage) -> Result<InputTensor, ClassifierError> {
        let (height, width) = self
            .input_dims()
            .ok_or_else(|| ClassifierError::Preprocess("no fixed input size".into()))?;

        let mut rgb = image.to_rgb8();
        if rgb.width() == 0 || rgb.height() == 0 {
            return Err(ClassifierError::Preprocess("image has no pixels".into()));
        }

        if self.do_resize {
            rgb = self.resize(&rgb);
        }
        if self.do_center_crop {
            rgb = center_crop(&rgb, width, height, self.resample.into());
        }

        let mut input = InputTensor::zeros((1, 3, height as usize, width as usize));
        for (x, y, pixel) in rgb.enumerate_pixels() {
            for c in 0..3 {
                input[[0, c, y as usize, x as usize]] = self.scale(pixel[c], c);
            }
        }

        Ok(input)
    }

    fn resize(&self, rgb: &RgbImage) -> RgbImage {
        let filter: FilterType = self.resample.into();
        let (w, h) = match self.size {
            SizeSpec::Square(n) => (n, n),
            SizeSpec::Exact { height, width } => (width, height),
            SizeSpec::ShortestEdge { shortest_edge } => {
                shortest_edge_dims(rgb.width(), rgb.height(), shortest_edge)
            }
        };
        imageops::resize(rgb, w, h, filter)
    }

    fn scale(&self, value: u8, channel: usize) -> f32 {
        let mut v = value as f32;
        if self.do_rescale {
            v *= self.rescale_factor;
        }
        if self.do_normalize {
            v = (v - self.image_mean[channel]) / self.image_std[channel];
        }
        v
    }
}

/// Output (width, height) scaling the shorter side to `target`
fn shortest_edge_dims(width: u32, height: u32, target: u32) -> (u32, u32) {
    if width <= height {
        let h = (target as u64 * height as u64 / width as u64) as u32;
        (target, h.max(1))
    } else {
        let w = (target as u64 * width as u64 / height as u64) as u32;
        (w.max(1), target)
    }
}

fn center_crop(rgb: &RgbImage, width: u32, height: u32, filter: FilterType) -> RgbImage {
    if rgb.width() < width || rgb.height() < height {
        return imageops::resize(rgb, width, height, filter);
    }
    let x = (rgb.width() - width) / 2;
    let y = (rgb.height() - height) / 2;
    imageops::crop_imm(rgb, x, y, width, height).to_image()
}

/// Decode encoded image bytes of any supported format
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, ClassifierError> {
    image::load_from_memory(bytes).map_err(|e| ClassifierError::ImageDecode(e.to_string()))
}
