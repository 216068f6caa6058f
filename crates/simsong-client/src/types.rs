//! Prediction request/response types.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, PredictError, PredictResult};

/// Image bytes to submit. Consumed by a single prediction.
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Local file
    Path(PathBuf),
    /// In-memory buffer, e.g. picked from a content provider
    Bytes {
        data: Vec<u8>,
        file_name: Option<String>,
    },
}

impl ImageSource {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::Bytes {
            data: data.into(),
            file_name: None,
        }
    }

    /// Short description for logs.
    pub fn describe(&self) -> String {
        match self {
            ImageSource::Path(path) => path.display().to_string(),
            ImageSource::Bytes {
                file_name: Some(name),
                data,
            } => format!("{} ({} bytes)", name, data.len()),
            ImageSource::Bytes { data, .. } => format!("<buffer> ({} bytes)", data.len()),
        }
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<Vec<u8>> for ImageSource {
    fn from(data: Vec<u8>) -> Self {
        Self::bytes(data)
    }
}

/// A successful prediction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prediction {
    /// Predicted class label
    pub label: String,
}

/// Response body from the prediction service. Extra fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct PredictResponse {
    pub predicted_class: ClassLabel,
}

/// Label as sent by the service: a name, or a bare class index.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ClassLabel {
    Name(String),
    Index(serde_json::Number),
}

impl fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassLabel::Name(name) => f.write_str(name),
            ClassLabel::Index(index) => write!(f, "{}", index),
        }
    }
}

/// Decode a success body into a [`Prediction`].
pub fn parse_prediction(body: &str) -> PredictResult<Prediction> {
    let response: PredictResponse = serde_json::from_str(body)
        .map_err(|e| PredictError::malformed(format!("{} (body: {})", e, truncate(body, 200))))?;

    Ok(Prediction {
        label: response.predicted_class.to_string(),
    })
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Final, displayable result of one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PredictionOutcome {
    Success { label: String },
    Failure { kind: ErrorKind, message: String },
}

impl PredictionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PredictionOutcome::Success { .. })
    }

    /// Text shown in place of the prediction.
    pub fn display_text(&self) -> &str {
        match self {
            PredictionOutcome::Success { label } => label,
            PredictionOutcome::Failure { message, .. } => message,
        }
    }
}

impl From<PredictResult<Prediction>> for PredictionOutcome {
    fn from(result: PredictResult<Prediction>) -> Self {
        match result {
            Ok(prediction) => PredictionOutcome::Success {
                label: prediction.label,
            },
            Err(e) => PredictionOutcome::Failure {
                kind: e.kind(),
                message: e.user_message(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_string_label() {
        let prediction = parse_prediction(r#"{"predicted_class":"Homer Simpson"}"#).unwrap();
        assert_eq!(prediction.label, "Homer Simpson");
    }

    #[test]
    fn test_parse_ignores_extra_fields() {
        let body = r#"{"predicted_class":"Lisa Simpson","confidence":0.93}"#;
        assert_eq!(parse_prediction(body).unwrap().label, "Lisa Simpson");
    }

    #[test]
    fn test_parse_numeric_label() {
        assert_eq!(parse_prediction(r#"{"predicted_class":7}"#).unwrap().label, "7");
    }

    #[test]
    fn test_parse_missing_field_is_malformed() {
        let err = parse_prediction(r#"{"label":"Bart"}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
    }

    #[test]
    fn test_parse_wrong_type_is_malformed() {
        let err = parse_prediction(r#"{"predicted_class":null}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
        let err = parse_prediction(r#"{"predicted_class":["Bart"]}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
    }

    #[test]
    fn test_parse_non_json_is_malformed() {
        let err = parse_prediction("<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, PredictError::MalformedResponse(_)));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }

    #[test]
    fn test_outcome_from_result() {
        let ok: PredictionOutcome = Ok(Prediction {
            label: "Marge Simpson".to_string(),
        })
        .into();
        assert!(ok.is_success());
        assert_eq!(ok.display_text(), "Marge Simpson");

        let failed: PredictionOutcome = Err(PredictError::malformed("missing field")).into();
        assert!(!failed.is_success());
        assert_eq!(
            failed,
            PredictionOutcome::Failure {
                kind: ErrorKind::MalformedResponse,
                message: "Error: Malformed response: missing field".to_string(),
            }
        );
    }

    #[test]
    fn test_outcome_json_shape() {
        let outcome = PredictionOutcome::Success {
            label: "Homer Simpson".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            serde_json::json!({"status": "success", "label": "Homer Simpson"})
        );

        let outcome = PredictionOutcome::Failure {
            kind: ErrorKind::Timeout,
            message: "Error: timed out".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&outcome).unwrap()["kind"],
            serde_json::json!("timeout")
        );
    }
}
