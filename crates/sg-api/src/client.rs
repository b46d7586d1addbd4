use std::cell::RefCell;
use std::collections::VecDeque;

use serde::Deserialize;
use sg_core::{CorrectionRequest, CorrectionResponse, RetryRequest, SceneGuardError};

/// Transport to the code-generating collaborator.
pub trait CorrectionClient {
    fn request_patch(
        &self,
        request: &CorrectionRequest,
    ) -> Result<CorrectionResponse, SceneGuardError>;

    fn request_retry(&self, request: &RetryRequest) -> Result<CorrectionResponse, SceneGuardError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedRequest {
    Patch(CorrectionRequest),
    Retry(RetryRequest),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ReplayFile {
    Wrapped { responses: Vec<CorrectionResponse> },
    Bare(Vec<CorrectionResponse>),
}

/// Serves recorded responses in order, for offline runs and tests.
#[derive(Debug, Default)]
pub struct ReplayCorrectionClient {
    responses: RefCell<VecDeque<CorrectionResponse>>,
    requests: RefCell<Vec<RecordedRequest>>,
}

impl ReplayCorrectionClient {
    pub fn new(responses: Vec<CorrectionResponse>) -> Self {
        Self {
            responses: RefCell::new(responses.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Accepts either `[response, ...]` or `{ "responses": [...] }`.
    pub fn from_json_str(raw: &str) -> Result<Self, SceneGuardError> {
        let file: ReplayFile = serde_json::from_str(raw)
            .map_err(|error| SceneGuardError::new("REPLAY_INVALID", error.to_string()))?;
        let responses = match file {
            ReplayFile::Wrapped { responses } | ReplayFile::Bare(responses) => responses,
        };
        Ok(Self::new(responses))
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.borrow().clone()
    }

    pub fn remaining(&self) -> usize {
        self.responses.borrow().len()
    }

    fn next_response(&self) -> Result<CorrectionResponse, SceneGuardError> {
        self.responses.borrow_mut().pop_front().ok_or_else(|| {
            SceneGuardError::new(
                "REPLAY_EXHAUSTED",
                "No recorded correction response is left.",
            )
        })
    }
}

impl CorrectionClient for ReplayCorrectionClient {
    fn request_patch(
        &self,
        request: &CorrectionRequest,
    ) -> Result<CorrectionResponse, SceneGuardError> {
        self.requests
            .borrow_mut()
            .push(RecordedRequest::Patch(request.clone()));
        self.next_response()
    }

    fn request_retry(&self, request: &RetryRequest) -> Result<CorrectionResponse, SceneGuardError> {
        self.requests
            .borrow_mut()
            .push(RecordedRequest::Retry(request.clone()));
        self.next_response()
    }
}

#[cfg(test)]
mod client_tests {
    use super::*;

    #[test]
    fn parses_both_replay_shapes() {
        let bare = ReplayCorrectionClient::from_json_str(
            r#"[{"explanation": "fix", "edits": [{"searchText": "a", "replaceText": "b"}]}]"#,
        )
        .expect("bare list should parse");
        assert_eq!(bare.remaining(), 1);

        let wrapped = ReplayCorrectionClient::from_json_str(
            r#"{"responses": [{"explanation": "x", "edits": []}, {"explanation": "y", "edits": []}]}"#,
        )
        .expect("wrapped list should parse");
        assert_eq!(wrapped.remaining(), 2);

        let error = ReplayCorrectionClient::from_json_str("{}").expect_err("shape mismatch");
        assert_eq!(error.code, "REPLAY_INVALID");
    }

    #[test]
    fn records_requests_and_reports_exhaustion() {
        let client = ReplayCorrectionClient::new(Vec::new());
        let request = CorrectionRequest {
            prior_code: "x".to_string(),
            parameters: Vec::new(),
            error_message: "boom".to_string(),
            stack_trace: None,
            static_warnings: Vec::new(),
        };
        let error = client
            .request_patch(&request)
            .expect_err("no responses recorded");
        assert_eq!(error.code, "REPLAY_EXHAUSTED");
        assert_eq!(client.requests(), vec![RecordedRequest::Patch(request)]);
    }
}
