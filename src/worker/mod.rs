pub mod pool;

pub use pool::InferencePool;
