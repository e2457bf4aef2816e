pub mod adapter;
pub mod loader;

pub use adapter::{infer_probability, InputSize, Model, OutputLayout};
pub use loader::{load_model, OrtModel};
