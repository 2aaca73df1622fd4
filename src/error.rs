use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::providers::RemoteError;

/// Who has to fix a failure: the caller (bad upload) or the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Client,
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    ResolvingAngles,
    GeneratingCanonical,
    ExtractingSpec,
    GeneratingRemainingAngles,
    Complete,
    Failed,
}

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("image payload is empty")]
    Empty,
    #[error("image format not recognized")]
    UnrecognizedFormat,
    #[error("unsupported image type: {0}")]
    UnsupportedMime(String),
}

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("remote call failed: {0}")]
    Remote(#[from] RemoteError),
    #[error("generation blocked: {reason}")]
    Blocked { reason: String },
    #[error("no image in response")]
    NoImage { text: Option<String> },
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Faults in the service's own credentials or project setup. Gemini reports
/// some of these as 400 INVALID_ARGUMENT, so they are checked first.
const SERVER_ERROR_MARKERS: &[&str] = &[
    "api_key_invalid",
    "api key not valid",
    "api key expired",
    "permission_denied",
    "failed_precondition",
    "billing",
    "user location is not supported",
];

const CLIENT_ERROR_MARKERS: &[&str] = &[
    "invalid_argument",
    "invalid argument",
    "unsupported",
    "invalid image",
    "unable to process input image",
    "mime type",
];

impl SynthesisError {
    pub fn class(&self) -> ErrorClass {
        match self {
            SynthesisError::Remote(err) => classify_remote(err),
            _ => ErrorClass::Server,
        }
    }
}

/// Invalid or unsupported input is the caller's problem; everything else
/// (credentials, quota, transport, malformed responses) is ours.
pub fn classify_remote(err: &RemoteError) -> ErrorClass {
    let message = err.to_string().to_lowercase();
    if SERVER_ERROR_MARKERS.iter().any(|m| message.contains(m)) {
        return ErrorClass::Server;
    }
    if let RemoteError::Status { status: 415 | 422, .. } = err {
        return ErrorClass::Client;
    }
    if CLIENT_ERROR_MARKERS.iter().any(|m| message.contains(m)) {
        ErrorClass::Client
    } else {
        ErrorClass::Server
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no template image was provided for any angle")]
    MissingTemplate,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("failed to establish canonical design for angle '{angle}': {source}")]
    CanonicalGenerationFailed {
        angle: String,
        #[source]
        source: SynthesisError,
    },

    #[error(
        "failed to generate angle {index} of {total} ('{angle}') after {} succeeded: {source}",
        .completed.len()
    )]
    AngleGenerationFailed {
        /// 1-based position in the request.
        index: usize,
        angle: String,
        completed: Vec<String>,
        total: usize,
        #[source]
        source: SynthesisError,
    },

    #[error("result does not cover the request (missing: {missing:?}, unexpected: {unexpected:?})")]
    IncompleteResult { missing: Vec<String>, unexpected: Vec<String> },
}

impl PipelineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            PipelineError::MissingTemplate | PipelineError::InvalidRequest(_) => ErrorClass::Client,
            PipelineError::CanonicalGenerationFailed { source, .. }
            | PipelineError::AngleGenerationFailed { source, .. } => source.class(),
            PipelineError::IncompleteResult { .. } => ErrorClass::Server,
        }
    }

    /// Stage the pipeline was in when it failed.
    pub fn stage(&self) -> PipelineStage {
        match self {
            PipelineError::MissingTemplate | PipelineError::InvalidRequest(_) => {
                PipelineStage::ResolvingAngles
            }
            PipelineError::CanonicalGenerationFailed { .. } => PipelineStage::GeneratingCanonical,
            PipelineError::AngleGenerationFailed { .. } => PipelineStage::GeneratingRemainingAngles,
            PipelineError::IncompleteResult { .. } => PipelineStage::Complete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn gemini_400(message: &str, reason: Option<&str>) -> RemoteError {
        let mut error = json!({ "code": 400, "message": message, "status": "INVALID_ARGUMENT" });
        if let Some(reason) = reason {
            error["details"] = json!([{ "reason": reason }]);
        }
        RemoteError::Status { status: 400, body: json!({ "error": error }).to_string() }
    }

    #[test]
    fn rejected_input_is_client_error() {
        let err = SynthesisError::Remote(gemini_400("Unable to process input image.", None));
        assert_eq!(err.class(), ErrorClass::Client);
        let err = RemoteError::Status { status: 415, body: String::new() };
        assert_eq!(classify_remote(&err), ErrorClass::Client);
    }

    #[test]
    fn invalid_api_key_is_server_error() {
        let err = gemini_400(
            "API key not valid. Please pass a valid API key.",
            Some("API_KEY_INVALID"),
        );
        assert_eq!(classify_remote(&err), ErrorClass::Server);

        let err = RemoteError::Status {
            status: 400,
            body: "FAILED_PRECONDITION: User location is not supported".into(),
        };
        assert_eq!(classify_remote(&err), ErrorClass::Server);
    }

    #[test]
    fn bare_bad_request_is_server_error() {
        let err = RemoteError::Status { status: 400, body: "bad".into() };
        assert_eq!(classify_remote(&err), ErrorClass::Server);
    }

    #[test]
    fn unsupported_input_message_is_client_error() {
        let err = RemoteError::Transport("Unsupported MIME type: image/gif".into());
        assert_eq!(classify_remote(&err), ErrorClass::Client);
    }

    #[test]
    fn quota_and_missing_image_are_server_errors() {
        let quota = SynthesisError::Remote(RemoteError::Status {
            status: 429,
            body: "RESOURCE_EXHAUSTED".into(),
        });
        assert_eq!(quota.class(), ErrorClass::Server);
        assert_eq!(SynthesisError::NoImage { text: None }.class(), ErrorClass::Server);
        assert_eq!(SynthesisError::Blocked { reason: "SAFETY".into() }.class(), ErrorClass::Server);
    }

    #[test]
    fn angle_failure_inherits_class_and_reports_progress() {
        let err = PipelineError::AngleGenerationFailed {
            index: 3,
            angle: "side".into(),
            completed: vec!["top".into(), "45degree".into()],
            total: 4,
            source: SynthesisError::Remote(gemini_400(
                "Request contains an invalid argument.",
                None,
            )),
        };
        assert_eq!(err.class(), ErrorClass::Client);
        assert_eq!(err.stage(), PipelineStage::GeneratingRemainingAngles);
        assert!(err.to_string().contains("angle 3 of 4 ('side') after 2 succeeded"));
    }
}
