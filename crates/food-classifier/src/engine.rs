//! Food Classifier Implementation

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::backend::{Device, DevicePreference, ModelBackend, OnnxBackend};
use crate::labels::LabelTable;
use crate::preprocess::{decode_image, PreprocessorConfig};
use crate::ranking::{rank, Prediction};
use crate::{ClassifierError, ImageClassifier};

/// Pretrained classifier: preprocessing, model backend and label table
pub struct FoodClassifier<B = OnnxBackend> {
    model_id: String,
    backend: B,
    preprocessor: PreprocessorConfig,
    labels: LabelTable,
}

impl FoodClassifier<OnnxBackend> {
    /// Load a model by identifier.
    ///
    /// `model_id` is used as a directory path when it exists, otherwise it
    /// is looked up under `model_root`. The directory must hold `model.onnx`
    /// and may hold `preprocessor_config.json` and `config.json`.
    pub fn load(
        model_id: &str,
        model_root: &Path,
        device: DevicePreference,
    ) -> Result<Self, ClassifierError> {
        let dir = resolve_model_dir(model_id, model_root)?;
        info!("Loading model {} from {}", model_id, dir.display());

        let preprocessor = PreprocessorConfig::load(&dir)?;
        let labels = LabelTable::load(&dir)?;
        let input_dims = preprocessor
            .input_dims()
            .ok_or_else(|| ClassifierError::ModelLoad("no fixed input size".into()))?;

        let backend = OnnxBackend::load(&dir.join("model.onnx"), input_dims, device)?;
        let classifier = Self::with_backend(model_id, backend, preprocessor, labels)?;

        info!(
            "Model loaded: {} classes, input {}x{}, device {}",
            classifier.num_classes(),
            input_dims.1,
            input_dims.0,
            classifier.device()
        );
        Ok(classifier)
    }
}

impl<B: ModelBackend> FoodClassifier<B> {
    /// Assemble a classifier around an already loaded backend
    pub fn with_backend(
        model_id: &str,
        backend: B,
        preprocessor: PreprocessorConfig,
        labels: LabelTable,
    ) -> Result<Self, ClassifierError> {
        preprocessor.validate()?;

        if backend.num_classes() == 0 {
            return Err(ClassifierError::ModelLoad("model scores zero classes".into()));
        }
        if labels.len() != backend.num_classes() {
            warn!(
                "Label table has {} entries but model scores {} classes",
                labels.len(),
                backend.num_classes()
            );
        }

        Ok(Self {
            model_id: model_id.to_string(),
            backend,
            preprocessor,
            labels,
        })
    }

    /// Label table in use
    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    /// Decode, preprocess, run the model and rank the result
    pub fn predict(&self, image_bytes: &[u8], top_k: usize) -> Result<Vec<Prediction>, ClassifierError> {
        let classes = self.backend.num_classes();
        if top_k == 0 || top_k > classes {
            return Err(ClassifierError::InvalidTopK {
                requested: top_k,
                max: classes,
            });
        }

        let start = Instant::now();

        let image = decode_image(image_bytes)?;
        let input = self.preprocessor.apply(&image)?;
        let logits = self.backend.forward(input)?;

        if logits.len() != classes {
            return Err(ClassifierError::Inference(format!(
                "expected {} logits, got {}",
                classes,
                logits.len()
            )));
        }

        let predictions = rank(&logits, top_k, &self.labels)?;

        let elapsed = start.elapsed();
        metrics::histogram!("food_vision_inference_seconds").record(elapsed.as_secs_f64());
        debug!(
            "Inference completed in {}ms, top-1 {:?}",
            elapsed.as_millis(),
            predictions.first().map(|p| &p.class_name)
        );

        Ok(predictions)
    }
}

impl<B: ModelBackend> ImageClassifier for FoodClassifier<B> {
    fn classify(&self, image_bytes: &[u8], top_k: usize) -> Result<Vec<Prediction>, ClassifierError> {
        self.predict(image_bytes, top_k)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn num_classes(&self) -> usize {
        self.backend.num_classes()
    }

    fn device(&self) -> Device {
        self.backend.device()
    }
}

/// Resolve a model identifier to its directory
fn resolve_model_dir(model_id: &str, model_root: &Path) -> Result<PathBuf, ClassifierError> {
    let direct = PathBuf::from(model_id);
    if direct.is_dir() {
        return Ok(direct);
    }

    let nested = model_root.join(model_id);
    if nested.is_dir() {
        return Ok(nested);
    }

    Err(ClassifierError::ModelLoad(format!(
        "cannot resolve model '{}' (looked in {})",
        model_id,
        nested.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InputTensor;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    /// Scores classes by distance between the class position and the mean
    /// channel value of the input
    struct MeanBackend {
        classes: usize,
    }

    impl ModelBackend for MeanBackend {
        fn forward(&self, input: InputTensor) -> Result<Vec<f32>, ClassifierError> {
            let mean = input.mean().unwrap_or(0.0);
            Ok((0..self.classes)
                .map(|i| {
                    let center = -1.0 + 2.0 * i as f32 / self.classes as f32;
                    -(mean - center).powi(2) * 40.0
                })
                .collect())
        }

        fn num_classes(&self) -> usize {
            self.classes
        }
    }

    fn classifier() -> FoodClassifier<MeanBackend> {
        FoodClassifier::with_backend(
            "test/food",
            MeanBackend { classes: 101 },
            PreprocessorConfig::default(),
            LabelTable::food101(),
        )
        .unwrap()
    }

    fn jpeg(color: [u8; 3]) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::from_pixel(50, 50, Rgb(color)))
            .write_to(&mut buf, ImageFormat::Jpeg)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_classify_returns_top_k_sorted() {
        let predictions = classifier().classify(&jpeg([200, 120, 40]), 5).unwrap();

        assert_eq!(predictions.len(), 5);
        for p in &predictions {
            assert!((0.0..=100.0).contains(&p.confidence));
        }
        for pair in predictions.windows(2) {
            assert!(pair[0].confidence >= pair[1].confidence);
        }
    }

    #[test]
    fn test_classify_is_deterministic() {
        let clf = classifier();
        let bytes = jpeg([30, 160, 90]);
        assert_eq!(clf.classify(&bytes, 5).unwrap(), clf.classify(&bytes, 5).unwrap());
    }

    #[test]
    fn test_undecodable_bytes() {
        let err = classifier().classify(b"hello, plain text", 5).unwrap_err();
        assert!(matches!(err, ClassifierError::ImageDecode(_)));
    }

    #[test]
    fn test_top_k_checked_before_decode() {
        let err = classifier().classify(b"not decoded", 102).unwrap_err();
        assert!(matches!(err, ClassifierError::InvalidTopK { requested: 102, max: 101 }));
    }

    #[test]
    fn test_zero_class_backend_rejected() {
        let result = FoodClassifier::with_backend(
            "empty",
            MeanBackend { classes: 0 },
            PreprocessorConfig::default(),
            LabelTable::food101(),
        );
        assert!(matches!(result, Err(ClassifierError::ModelLoad(_))));
    }

    #[test]
    fn test_metadata() {
        let clf = classifier();
        assert_eq!(clf.model_id(), "test/food");
        assert_eq!(clf.num_classes(), 101);
        assert_eq!(clf.device(), Device::Cpu);
        assert_eq!(clf.labels().len(), 101);
    }

    #[test]
    fn test_resolve_under_root() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("nateraw/food")).unwrap();

        let dir = resolve_model_dir("nateraw/food", root.path()).unwrap();
        assert_eq!(dir, root.path().join("nateraw/food"));
    }

    #[test]
    fn test_load_unknown_model() {
        let root = tempfile::tempdir().unwrap();
        let result = FoodClassifier::load("nobody/nothing", root.path(), DevicePreference::Auto);
        assert!(matches!(result, Err(ClassifierError::ModelLoad(_))));
    }

    #[test]
    fn test_load_onnx_model_dir() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("tiny/linear");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::copy(
            Path::new(env!("CARGO_MANIFEST_DIR")).join("testdata/tiny_linear.onnx"),
            dir.join("model.onnx"),
        )
        .unwrap();
        std::fs::write(dir.join("preprocessor_config.json"), r#"{"size": 2}"#).unwrap();
        std::fs::write(
            dir.join("config.json"),
            r#"{"id2label": {"0": "pho", "1": "ramen", "2": "sushi"}}"#,
        )
        .unwrap();

        let clf = FoodClassifier::load("tiny/linear", root.path(), DevicePreference::Auto).unwrap();
        assert_eq!(clf.num_classes(), 3);

        // white normalizes to all ones: logits [1.0, 2.25, 2.0]
        let predictions = clf.classify(&jpeg([255, 255, 255]), 3).unwrap();
        let names: Vec<&str> = predictions.iter().map(|p| p.class_name.as_str()).collect();
        assert_eq!(names, ["ramen", "sushi", "pho"]);

        let total: f64 = predictions.iter().map(|p| p.confidence).sum();
        assert!((total - 100.0).abs() < 0.05);
    }

    #[test]
    fn test_load_without_weights() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("nateraw/food");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.json"), r#"{"id2label": {"0": "pho"}}"#).unwrap();

        let result = FoodClassifier::load("nateraw/food", root.path(), DevicePreference::Cpu);
        assert!(matches!(result, Err(ClassifierError::ModelLoad(_))));
    }
}
