//! JSON wire protocol.
//!
//! Requests are tagged by `action`:
//! ```text
//! {"action":"replace_lines","document_id":"…","start_line":5,"end_line":5,"content":["…"]}
//! ```
//! Every response is an envelope:
//! ```text
//! {"status":"success","data":{…}}
//! {"status":"error","error":{"kind":"version_conflict","message":"…"}}
//! ```
//! Line numbers are 1-based and ranges inclusive on both ends.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{DocError, ErrorKind};

/// One call, as it arrives on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Request {
    CreateDocument {
        document_name: String,
        #[serde(default)]
        initial_content: String,
        /// agent id -> "read" | "read_write"
        #[serde(default)]
        access_permissions: HashMap<String, String>,
    },
    GetDocument {
        document_id: String,
    },
    OpenDocument {
        document_id: String,
    },
    GetDocumentContent {
        document_id: String,
        #[serde(default = "default_true")]
        include_comments: bool,
        #[serde(default = "default_true")]
        include_presence: bool,
    },
    SaveDocument {
        document_id: String,
        content: String,
    },
    ReplaceLines {
        document_id: String,
        start_line: usize,
        end_line: usize,
        content: Vec<String>,
        #[serde(default)]
        expected_version: Option<u64>,
    },
    AddComment {
        document_id: String,
        line_number: usize,
        comment_text: String,
    },
    ResolveComment {
        document_id: String,
        comment_id: String,
    },
    UpdateCursorPosition {
        document_id: String,
        line_number: usize,
        column_number: usize,
    },
    GetAgentPresence {
        document_id: String,
    },
    GetDocumentHistory {
        document_id: String,
        #[serde(default)]
        limit: Option<usize>,
    },
    ListDocuments,
    CloseDocument {
        document_id: String,
    },
    GetDocumentAtVersion {
        document_id: String,
        version: u64,
    },
    SetPermission {
        document_id: String,
        agent_id: String,
        permission: String,
    },
    DeleteDocument {
        document_id: String,
    },
}

fn default_true() -> bool {
    true
}

impl Request {
    /// The `action` tag of this request.
    pub fn action(&self) -> &'static str {
        match self {
            Request::CreateDocument { .. } => "create_document",
            Request::GetDocument { .. } => "get_document",
            Request::OpenDocument { .. } => "open_document",
            Request::GetDocumentContent { .. } => "get_document_content",
            Request::SaveDocument { .. } => "save_document",
            Request::ReplaceLines { .. } => "replace_lines",
            Request::AddComment { .. } => "add_comment",
            Request::ResolveComment { .. } => "resolve_comment",
            Request::UpdateCursorPosition { .. } => "update_cursor_position",
            Request::GetAgentPresence { .. } => "get_agent_presence",
            Request::GetDocumentHistory { .. } => "get_document_history",
            Request::ListDocuments => "list_documents",
            Request::CloseDocument { .. } => "close_document",
            Request::GetDocumentAtVersion { .. } => "get_document_at_version",
            Request::SetPermission { .. } => "set_permission",
            Request::DeleteDocument { .. } => "delete_document",
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(raw).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}

/// Outcome tag of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    Error,
}

/// Error part of an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

/// `{status, data?, error?}` result of every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Envelope {
    pub fn success(data: serde_json::Value) -> Self {
        Self { status: Status::Success, data: Some(data), error: None }
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            data: None,
            error: Some(ErrorBody { kind, message: message.into() }),
        }
    }

    pub fn from_error(err: &DocError) -> Self {
        Self::failure(err.kind(), err.to_string())
    }

    /// Wrap an engine result, serializing the success value as `data`.
    pub fn from_result<T: Serialize>(result: Result<T, DocError>) -> Self {
        match result {
            Ok(value) => match serde_json::to_value(value) {
                Ok(data) => Self::success(data),
                Err(e) => Self::from_protocol_error(&ProtocolError::Encode(e.to_string())),
            },
            Err(e) => Self::from_error(&e),
        }
    }

    pub fn from_protocol_error(err: &ProtocolError) -> Self {
        Self::failure(ErrorKind::InvalidArgument, err.to_string())
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Error kind, if this is an error envelope.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(raw).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}

/// Protocol errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Decode(String),
    #[error("failed to encode message: {0}")]
    Encode(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_replace_lines() {
        let raw = r#"{"action":"replace_lines","document_id":"d","start_line":5,"end_line":5,
                     "content":["Define the core features"],"expected_version":3}"#;
        let req = Request::decode(raw).unwrap();
        assert_eq!(
            req,
            Request::ReplaceLines {
                document_id: "d".into(),
                start_line: 5,
                end_line: 5,
                content: vec!["Define the core features".into()],
                expected_version: Some(3),
            }
        );
        assert_eq!(req.action(), "replace_lines");
    }

    #[test]
    fn test_optional_fields_default() {
        let req = Request::decode(r#"{"action":"get_document_history","document_id":"d"}"#).unwrap();
        assert_eq!(req, Request::GetDocumentHistory { document_id: "d".into(), limit: None });

        let req = Request::decode(r#"{"action":"get_document_content","document_id":"d"}"#).unwrap();
        assert_eq!(
            req,
            Request::GetDocumentContent {
                document_id: "d".into(),
                include_comments: true,
                include_presence: true,
            }
        );

        let req = Request::decode(r#"{"action":"create_document","document_name":"Spec"}"#).unwrap();
        match req {
            Request::CreateDocument { initial_content, access_permissions, .. } => {
                assert!(initial_content.is_empty());
                assert!(access_permissions.is_empty());
            }
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[test]
    fn test_list_documents_has_no_fields() {
        let req = Request::decode(r#"{"action":"list_documents"}"#).unwrap();
        assert_eq!(req, Request::ListDocuments);
        assert_eq!(req.encode().unwrap(), r#"{"action":"list_documents"}"#);
    }

    #[test]
    fn test_unknown_action_rejected() {
        let err = Request::decode(r#"{"action":"drop_tables"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }

    #[test]
    fn test_success_envelope_shape() {
        let env = Envelope::success(json!({"document_id": "abc", "version": 1}));
        let value: serde_json::Value = serde_json::from_str(&env.encode().unwrap()).unwrap();
        assert_eq!(value, json!({"status": "success", "data": {"document_id": "abc", "version": 1}}));
    }

    #[test]
    fn test_error_envelope_shape() {
        let env = Envelope::from_error(&DocError::VersionConflict { expected: 2, actual: 3 });
        assert!(!env.is_success());
        assert_eq!(env.error_kind(), Some(ErrorKind::VersionConflict));

        let value: serde_json::Value = serde_json::from_str(&env.encode().unwrap()).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["error"]["kind"], "version_conflict");
        assert!(value.get("data").is_none());
    }

    #[test]
    fn test_envelope_decode() {
        let env = Envelope::decode(r#"{"status":"error","error":{"kind":"timeout","message":"slow"}}"#)
            .unwrap();
        assert_eq!(env.error_kind(), Some(ErrorKind::Timeout));
        assert!(env.data.is_none());
    }
}
