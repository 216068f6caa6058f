//! Client for the character prediction service.
//!
//! Uploads one image as `multipart/form-data` (field `file`) to a fixed
//! endpoint and reads the `predicted_class` field of the JSON reply.

pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod staging;
pub mod types;
pub mod upload;

pub use client::PredictionClient;
pub use config::PredictConfig;
pub use error::{ErrorKind, PredictError, PredictResult};
pub use staging::StagedImage;
pub use types::{parse_prediction, ImageSource, Prediction, PredictionOutcome};
