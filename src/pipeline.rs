use crate::decision::{decide, Prediction, Threshold};
use crate::error::InferenceError;
use crate::model::{infer_probability, InputSize, Model, OutputLayout};
use crate::preprocessing::image::{to_tensor, ImageInput};
use image::RgbImage;
use std::sync::Arc;

/// Everything needed to classify one image. Built once at startup and
/// shared read-only between inference workers.
#[derive(Clone)]
pub struct Classifier {
    model: Arc<dyn Model>,
    input_size: InputSize,
    layout: OutputLayout,
    threshold: Threshold,
}

impl Classifier {
    /// Resolves input size and output layout from the model's declared
    /// metadata.
    pub fn from_model(
        model: Arc<dyn Model>,
        layout_fallback: Option<OutputLayout>,
        threshold: Threshold,
    ) -> Result<Self, InferenceError> {
        let input_size = InputSize::from_declared(model.input_shape().as_deref());
        let layout = OutputLayout::resolve(model.output_shape().as_deref(), layout_fallback)?;
        Ok(Self::new(model, input_size, layout, threshold))
    }

    pub fn new(
        model: Arc<dyn Model>,
        input_size: InputSize,
        layout: OutputLayout,
        threshold: Threshold,
    ) -> Self {
        Self {
            model,
            input_size,
            layout,
            threshold,
        }
    }

    pub fn input_size(&self) -> InputSize {
        self.input_size
    }

    pub fn layout(&self) -> OutputLayout {
        self.layout
    }

    pub fn threshold(&self) -> Threshold {
        self.threshold
    }

    /// Preprocess, infer and decide. Blocks for the duration of the forward
    /// pass.
    pub fn predict(&self, image: &RgbImage) -> Result<Prediction, InferenceError> {
        let tensor = to_tensor(ImageInput::Decoded(image), self.input_size)?;
        let probability =
            infer_probability(self.model.as_ref(), tensor.view().into_dyn(), self.layout)?;
        Ok(decide(probability, self.threshold))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::Label;
    use crate::model::adapter::tests::FixedModel;
    use ndarray::{ArrayD, ArrayViewD};

    struct DeclaredModel {
        inner: FixedModel,
        input: Vec<i64>,
        output: Vec<i64>,
    }

    impl Model for DeclaredModel {
        fn run(&self, input: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>, InferenceError> {
            self.inner.run(input)
        }

        fn input_shape(&self) -> Option<Vec<i64>> {
            Some(self.input.clone())
        }

        fn output_shape(&self) -> Option<Vec<i64>> {
            Some(self.output.clone())
        }
    }

    #[test]
    fn test_metadata_drives_size_and_layout() {
        let model = Arc::new(DeclaredModel {
            inner: FixedModel::new(&[1, 2], vec![0.2, 0.8]),
            input: vec![-1, 96, 128, 3],
            output: vec![-1, 2],
        });
        let classifier = Classifier::from_model(model.clone(), None, Threshold::default()).unwrap();

        assert_eq!(
            classifier.input_size(),
            InputSize {
                width: 128,
                height: 96
            }
        );
        assert_eq!(classifier.layout(), OutputLayout::TwoClassSoftmax);

        let prediction = classifier.predict(&RgbImage::new(10, 30)).unwrap();
        assert_eq!(prediction.label, Label::Tumor);
        assert_eq!(prediction.probability, 0.8);
        assert_eq!(model.inner.seen.lock().unwrap()[0], vec![1, 96, 128, 3]);
    }

    #[test]
    fn test_unsupported_output_width_fails_at_load() {
        let model = Arc::new(DeclaredModel {
            inner: FixedModel::new(&[1, 5], vec![0.2; 5]),
            input: vec![-1, 224, 224, 3],
            output: vec![-1, 5],
        });
        assert!(Classifier::from_model(model, None, Threshold::default()).is_err());
    }

    #[test]
    fn test_undeclared_metadata_uses_defaults() {
        let model = Arc::new(FixedModel::new(&[1, 1], vec![0.3]));
        let classifier = Classifier::from_model(
            model.clone(),
            Some(OutputLayout::SingleSigmoid),
            Threshold::default(),
        )
        .unwrap();

        assert_eq!(classifier.input_size(), InputSize::default());
        let prediction = classifier.predict(&RgbImage::new(500, 20)).unwrap();
        assert_eq!(prediction.label, Label::Normal);
        assert_eq!(model.seen.lock().unwrap()[0], vec![1, 224, 224, 3]);
    }

    #[test]
    fn test_output_mismatch_is_an_error() {
        let model = Arc::new(FixedModel::new(&[1, 3], vec![0.1, 0.2, 0.7]));
        let classifier = Classifier::new(
            model,
            InputSize::default(),
            OutputLayout::TwoClassSoftmax,
            Threshold::default(),
        );
        assert!(matches!(
            classifier.predict(&RgbImage::new(4, 4)),
            Err(InferenceError::OutputShape { .. })
        ));
    }
}
