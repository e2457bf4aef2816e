use crate::error::InferenceError;
use crate::model::adapter::{dyn_array, Model};
use ndarray::{ArrayD, ArrayViewD};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::{TensorRef, ValueType},
};
use std::path::Path;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

/// An ONNX model backed by a small set of identical sessions. A session run
/// needs exclusive access, so each one sits behind its own lock and callers
/// are spread across them round-robin.
pub struct OrtModel {
    sessions: Vec<Mutex<Session>>,
    counter: AtomicUsize,
    input_shape: Option<Vec<i64>>,
    output_shape: Option<Vec<i64>>,
}

fn declared_shape(value_type: &ValueType) -> Option<Vec<i64>> {
    match value_type {
        ValueType::Tensor { shape, .. } => Some(shape.iter().copied().collect()),
        _ => None,
    }
}

/// Loads an ONNX model from disk and creates `sessions` inference sessions.
///
/// # Arguments
/// * `model_path` - Path to the .onnx file
/// * `sessions` - Number of sessions, normally one per inference worker
/// * `intra_threads` - Parallelism within an op, per session
pub fn load_model(
    model_path: impl AsRef<Path>,
    sessions: usize,
    intra_threads: usize,
) -> Result<OrtModel, InferenceError> {
    let path = model_path.as_ref();
    if !path.exists() {
        return Err(InferenceError::ModelNotFound(path.display().to_string()));
    }

    let sessions = (0..sessions.max(1))
        .map(|_| {
            let session = Session::builder()?
                .with_optimization_level(GraphOptimizationLevel::Level3)?
                .with_intra_threads(intra_threads)?
                .commit_from_file(path)?;
            Ok(Mutex::new(session))
        })
        .collect::<Result<Vec<_>, InferenceError>>()?;

    let (input_shape, output_shape) = {
        let first = sessions[0]
            .lock()
            .map_err(|_| InferenceError::SessionPoisoned)?;
        for (i, input) in first.inputs.iter().enumerate() {
            tracing::debug!("Input {}: {} ({:?})", i, input.name, input.input_type);
        }
        for (i, output) in first.outputs.iter().enumerate() {
            tracing::debug!("Output {}: {} ({:?})", i, output.name, output.output_type);
        }
        (
            first.inputs.first().and_then(|i| declared_shape(&i.input_type)),
            first
                .outputs
                .first()
                .and_then(|o| declared_shape(&o.output_type)),
        )
    };

    tracing::info!(
        "Loaded model {} into {} session(s)",
        path.display(),
        sessions.len()
    );

    Ok(OrtModel {
        sessions,
        counter: AtomicUsize::new(0),
        input_shape,
        output_shape,
    })
}

impl Model for OrtModel {
    fn run(&self, input: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>, InferenceError> {
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        // A panic mid-run poisons the lock but leaves the session usable.
        let mut session = match self.sessions[index].lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Session {} lock was poisoned, reclaiming it", index);
                self.sessions[index].clear_poison();
                poisoned.into_inner()
            }
        };
        tracing::debug!("Running inference on session {}", index);

        let owned_buffer;
        let input_view = if input.is_standard_layout() {
            input.view()
        } else {
            owned_buffer = input.as_standard_layout().into_owned();
            owned_buffer.view()
        };

        let tensor_ref = TensorRef::from_array_view(input_view)?;
        let outputs = session.run(ort::inputs![tensor_ref])?;

        let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
        dyn_array(&dims, data.to_vec())
    }

    fn input_shape(&self) -> Option<Vec<i64>> {
        self.input_shape.clone()
    }

    fn output_shape(&self) -> Option<Vec<i64>> {
        self.output_shape.clone()
    }
}
