use crate::decision::Prediction;
use crate::error::InferenceError;
use crate::pipeline::Classifier;
use image::RgbImage;
use metrics::histogram;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Instant;
use tokio::sync::oneshot;

type PredictionResult = Result<Prediction, InferenceError>;

// The message sent from Handler -> Worker
pub struct InferenceJob {
    pub image: RgbImage,
    pub result_sender: oneshot::Sender<PredictionResult>,
}

/// Fixed set of OS threads running blocking inference off the async runtime.
/// Jobs beyond the pool's capacity wait in an unbounded queue; there is no
/// timeout, so a hung forward pass holds its worker indefinitely.
pub struct InferencePool {
    sender: mpsc::Sender<InferenceJob>,
    size: usize,
}

impl InferencePool {
    pub fn new(classifier: Classifier, size: usize) -> Self {
        let size = size.max(1);
        let classifier = Arc::new(classifier);
        let (sender, receiver) = mpsc::channel::<InferenceJob>();
        let receiver = Arc::new(Mutex::new(receiver));

        for id in 0..size {
            let receiver = receiver.clone();
            let classifier = classifier.clone();
            let spawned = thread::Builder::new()
                .name(format!("inference-{id}"))
                .spawn(move || worker_loop(id, receiver, classifier));
            if let Err(e) = spawned {
                tracing::error!("Failed to spawn inference worker {}: {}", id, e);
            }
        }

        Self { sender, size }
    }

    /// Number of worker threads, after clamping to at least one.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Queues `image` and waits for its prediction without blocking the
    /// calling task's runtime thread.
    pub async fn predict(&self, image: RgbImage) -> PredictionResult {
        let (result_sender, result_receiver) = oneshot::channel();
        self.sender
            .send(InferenceJob {
                image,
                result_sender,
            })
            .map_err(|_| InferenceError::WorkerGone)?;

        result_receiver
            .await
            .map_err(|_| InferenceError::WorkerGone)?
    }
}

fn worker_loop(
    id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<InferenceJob>>>,
    classifier: Arc<Classifier>,
) {
    loop {
        let job = {
            let Ok(guard) = receiver.lock() else {
                tracing::error!("Inference worker {} found a poisoned queue, exiting", id);
                return;
            };
            guard.recv()
        };

        // Channel closed, shutdown
        let Ok(job) = job else {
            tracing::debug!("Inference worker {} stopping", id);
            return;
        };

        let start = Instant::now();
        // A panicking forward pass fails its own request; the worker lives on.
        let result = panic::catch_unwind(AssertUnwindSafe(|| classifier.predict(&job.image)))
            .unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                tracing::error!("Inference worker {} recovered from panic: {}", id, message);
                Err(InferenceError::WorkerPanicked(message))
            });
        histogram!("inference_duration_seconds").record(start.elapsed().as_secs_f64());

        // The requester may have gone away; nothing to do then.
        let _ = job.result_sender.send(result);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
