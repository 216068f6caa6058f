//! Prediction service HTTP client.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::multipart::Form;
use reqwest::{Client, Response};
use tracing::{debug, info_span, warn, Instrument};

use crate::config::PredictConfig;
use crate::error::{ErrorKind, PredictError, PredictResult};
use crate::metrics::record_prediction;
use crate::staging::StagedImage;
use crate::types::{parse_prediction, ImageSource, Prediction, PredictionOutcome};
use crate::upload::{PhaseBounds, UploadProgress};

/// Multipart field carrying the image.
pub const FILE_FIELD: &str = "file";

/// Client for the prediction endpoint.
///
/// Each call issues exactly one request; there is no retry. Concurrent calls
/// are independent and share only the connection pool.
#[derive(Clone)]
pub struct PredictionClient {
    http: Client,
    config: PredictConfig,
}

impl PredictionClient {
    /// Create a new prediction client.
    pub fn new(config: PredictConfig) -> PredictResult<Self> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(PredictError::Transport)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> PredictResult<Self> {
        Self::new(PredictConfig::from_env()?)
    }

    pub fn config(&self) -> &PredictConfig {
        &self.config
    }

    /// Upload `image` and return the predicted label.
    pub async fn predict(&self, image: ImageSource) -> PredictResult<Prediction> {
        let span = info_span!(
            "predict",
            endpoint = %self.config.endpoint,
            image = %image.describe()
        );

        async {
            let started = Instant::now();
            let result = self.predict_once(image).await;
            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

            match &result {
                Ok(prediction) => {
                    debug!(label = %prediction.label, latency_ms, "Prediction succeeded");
                    record_prediction("success", latency_ms);
                }
                Err(e) => {
                    warn!(kind = e.kind().as_str(), latency_ms, "Prediction failed: {}", e);
                    record_prediction(e.kind().as_str(), latency_ms);
                }
            }

            result
        }
        .instrument(span)
        .await
    }

    /// Submit an image and flatten the result for display. Never fails.
    ///
    /// `None` means nothing was picked; no request is made.
    pub async fn submit(&self, image: Option<ImageSource>) -> PredictionOutcome {
        match image {
            Some(image) => self.predict(image).await.into(),
            None => PredictionOutcome::Failure {
                kind: ErrorKind::Read,
                message: "No image selected".to_string(),
            },
        }
    }

    async fn predict_once(&self, image: ImageSource) -> PredictResult<Prediction> {
        // Held until the end of this function; dropping it deletes the file.
        let staged = StagedImage::stage(image, self.config.staging_dir.as_deref()).await?;

        let progress = UploadProgress::new(PhaseBounds {
            connect: self.config.connect_timeout,
            write: self.config.write_timeout,
            read: self.config.read_timeout,
        });
        let form = Form::new().part(FILE_FIELD, staged.to_part(Arc::clone(&progress)).await?);

        debug!(
            "Posting {} ({} bytes) to {}",
            staged.file_name(),
            staged.len(),
            self.config.endpoint
        );

        let result = self.send(form, &progress).await;

        if let Err(e) = staged.close() {
            warn!("Failed to remove staging file: {}", e);
        }

        result
    }

    async fn send(&self, form: Form, progress: &UploadProgress) -> PredictResult<Prediction> {
        let request = self
            .http
            .post(self.config.endpoint.clone())
            .multipart(form)
            .send();

        // Dropping the request future aborts the upload and closes the file.
        let mut response = tokio::select! {
            result = request => result.map_err(PredictError::from_transport)?,
            err = progress.watchdog() => return Err(err),
        };

        let status = response.status();
        if !status.is_success() {
            let reason = reason_phrase(&response);
            let body = read_body(&mut response, self.config.read_timeout)
                .await
                .unwrap_or_default();
            return Err(PredictError::server(status, reason.as_deref(), body));
        }

        let body = read_body(&mut response, self.config.read_timeout).await?;
        parse_prediction(&body)
    }
}

/// Reason phrase from the status line, when the server sent a non-standard one.
fn reason_phrase(response: &Response) -> Option<String> {
    response
        .extensions()
        .get::<hyper::ext::ReasonPhrase>()
        .map(|reason| String::from_utf8_lossy(reason.as_bytes()).into_owned())
}

/// Read the response body, allowing at most `bound` between chunks.
async fn read_body(response: &mut Response, bound: Duration) -> PredictResult<String> {
    let mut body = Vec::new();

    loop {
        match tokio::time::timeout(bound, response.chunk()).await {
            Ok(Ok(Some(chunk))) => body.extend_from_slice(&chunk),
            Ok(Ok(None)) => break,
            Ok(Err(e)) => return Err(PredictError::from_transport(e)),
            Err(_) => {
                return Err(PredictError::Timeout(format!(
                    "response body stalled for more than {:?}",
                    bound
                )))
            }
        }
    }

    Ok(String::from_utf8_lossy(&body).into_owned())
}
