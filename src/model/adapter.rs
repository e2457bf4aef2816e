use crate::error::InferenceError;
use ndarray::{ArrayD, ArrayViewD, Axis, Ix2, IxDyn};
use serde::Deserialize;
use std::fmt;

/// Spatial size the model was exported for. Resolved once at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSize {
    pub width: u32,
    pub height: u32,
}

impl Default for InputSize {
    fn default() -> Self {
        Self {
            width: 224,
            height: 224,
        }
    }
}

impl InputSize {
    /// Reads H and W from a declared NHWC shape `(batch, H, W, C)`.
    /// Dynamic (`-1`) or missing dimensions fall back to 224x224.
    pub fn from_declared(shape: Option<&[i64]>) -> Self {
        match shape {
            Some(dims) if dims.len() >= 4 && dims[1] > 0 && dims[2] > 0 => Self {
                width: dims[2] as u32,
                height: dims[1] as u32,
            },
            _ => Self::default(),
        }
    }
}

impl fmt::Display for InputSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// How the positive-class probability is read out of the model's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum OutputLayout {
    /// `(batch, 2)`; index 1 of row 0.
    #[serde(rename = "softmax2")]
    TwoClassSoftmax,
    /// `(batch, 1)`; index 0 of row 0.
    #[serde(rename = "sigmoid1")]
    SingleSigmoid,
}

impl OutputLayout {
    /// Picks the layout from the declared output shape. When the model does
    /// not fix the last dimension, `fallback` (or sigmoid) is used.
    pub fn resolve(
        declared: Option<&[i64]>,
        fallback: Option<OutputLayout>,
    ) -> Result<Self, InferenceError> {
        match declared.and_then(|dims| dims.last().copied()) {
            Some(2) => Ok(OutputLayout::TwoClassSoftmax),
            Some(1) => Ok(OutputLayout::SingleSigmoid),
            Some(width) if width > 0 => Err(InferenceError::UnsupportedOutputWidth(width)),
            _ => {
                let layout = fallback.unwrap_or(OutputLayout::SingleSigmoid);
                tracing::warn!(
                    "Model does not declare its output width, assuming {}",
                    layout
                );
                Ok(layout)
            }
        }
    }

    fn width(&self) -> usize {
        match self {
            OutputLayout::TwoClassSoftmax => 2,
            OutputLayout::SingleSigmoid => 1,
        }
    }

    fn positive_index(&self) -> usize {
        match self {
            OutputLayout::TwoClassSoftmax => 1,
            OutputLayout::SingleSigmoid => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputLayout::TwoClassSoftmax => "softmax2",
            OutputLayout::SingleSigmoid => "sigmoid1",
        }
    }

    /// Extracts the row-0 positive probability, rejecting any output that
    /// is not `(batch, width)` for this layout.
    pub fn extract(&self, output: ArrayViewD<'_, f32>) -> Result<f32, InferenceError> {
        let shape = output.shape();
        if shape.len() != 2 || shape[0] == 0 || shape[1] != self.width() {
            return Err(InferenceError::OutputShape {
                layout: self.as_str(),
                got: shape.to_vec(),
            });
        }

        let rows = output.into_dimensionality::<Ix2>()?;
        let prob = rows[[0, self.positive_index()]];
        if !prob.is_finite() || !(0.0..=1.0).contains(&prob) {
            return Err(InferenceError::ProbabilityRange(prob));
        }
        Ok(prob)
    }
}

impl fmt::Display for OutputLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A loaded, read-only model that can be run from several threads at once.
pub trait Model: Send + Sync + 'static {
    /// Runs the forward pass on a `(batch, H, W, C)` float tensor.
    fn run(&self, input: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>, InferenceError>;

    /// Declared input shape, `-1` for dynamic dimensions.
    fn input_shape(&self) -> Option<Vec<i64>> {
        None
    }

    /// Declared output shape, `-1` for dynamic dimensions.
    fn output_shape(&self) -> Option<Vec<i64>> {
        None
    }
}

/// Runs `model` on a rank-3 or rank-4 tensor and reads the positive-class
/// probability according to `layout`.
pub fn infer_probability(
    model: &dyn Model,
    tensor: ArrayViewD<'_, f32>,
    layout: OutputLayout,
) -> Result<f32, InferenceError> {
    let tensor = match tensor.ndim() {
        3 => tensor.insert_axis(Axis(0)),
        _ => tensor,
    };
    if tensor.ndim() != 4 {
        return Err(InferenceError::InputRank(tensor.shape().to_vec()));
    }

    let output = model.run(tensor)?;
    layout.extract(output.view())
}

/// Shorthand for building dynamic-rank arrays from a shape slice.
pub(crate) fn dyn_array(shape: &[usize], data: Vec<f32>) -> Result<ArrayD<f32>, InferenceError> {
    Ok(ArrayD::from_shape_vec(IxDyn(shape), data)?)
}
