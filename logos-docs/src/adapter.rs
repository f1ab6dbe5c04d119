//! Agent-bound facade over the engine.
//!
//! A [`DocumentsAdapter`] is what a connected agent talks to: every call is
//! attributed to the agent it was built for, takes wire-level arguments
//! (string IDs, string permission levels) and answers with an [`Envelope`].

use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use crate::access::{parse_grants, Permission};
use crate::comments::Comment;
use crate::engine::DocumentEngine;
use crate::error::{DocError, Result};
use crate::ids::{AgentId, CommentId, DocumentId};
use crate::presence::PresenceView;
use crate::protocol::{Envelope, ProtocolError, Request};

/// Payload of `get_document_content`; unrequested parts are left out.
#[derive(Debug, Serialize)]
struct DocumentContent {
    document_id: DocumentId,
    name: String,
    content: String,
    lines: Vec<String>,
    version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    comments: Option<Vec<Comment>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence: Option<Vec<PresenceView>>,
}

fn parse_document_id(raw: &str) -> Result<DocumentId> {
    raw.parse()
        .map_err(|_| DocError::invalid(format!("malformed document id '{raw}'")))
}

fn parse_comment_id(raw: &str) -> Result<CommentId> {
    raw.parse()
        .map_err(|_| DocError::invalid(format!("malformed comment id '{raw}'")))
}

/// The engine as seen by one agent.
#[derive(Clone)]
pub struct DocumentsAdapter {
    engine: Arc<DocumentEngine>,
    agent: AgentId,
}

impl DocumentsAdapter {
    pub fn new(engine: Arc<DocumentEngine>, agent: impl Into<AgentId>) -> Self {
        Self { engine, agent: agent.into() }
    }

    pub fn agent(&self) -> &AgentId {
        &self.agent
    }

    pub fn engine(&self) -> &Arc<DocumentEngine> {
        &self.engine
    }

    /// Decode a JSON request, run it, and encode the envelope.
    pub async fn handle_json(&self, raw: &str) -> String {
        let envelope = match Request::decode(raw) {
            Ok(request) => self.handle(request).await,
            Err(e) => {
                log::warn!("{}: rejected request: {e}", self.agent);
                Envelope::from_protocol_error(&e)
            }
        };
        envelope.encode().unwrap_or_else(|e: ProtocolError| {
            log::error!("Failed to encode response envelope: {e}");
            r#"{"status":"error","error":{"kind":"invalid_argument","message":"unencodable response"}}"#
                .to_string()
        })
    }

    /// Dispatch a decoded request.
    pub async fn handle(&self, request: Request) -> Envelope {
        log::trace!("{} -> {}", self.agent, request.action());
        match request {
            Request::CreateDocument { document_name, initial_content, access_permissions } => {
                self.create_document(&document_name, &initial_content, &access_permissions)
                    .await
            }
            Request::GetDocument { document_id } => self.get_document(&document_id).await,
            Request::OpenDocument { document_id } => self.open_document(&document_id).await,
            Request::GetDocumentContent { document_id, include_comments, include_presence } => {
                self.get_document_content(&document_id, include_comments, include_presence)
                    .await
            }
            Request::SaveDocument { document_id, content } => {
                self.save_document(&document_id, &content).await
            }
            Request::ReplaceLines { document_id, start_line, end_line, content, expected_version } => {
                self.replace_lines(&document_id, start_line, end_line, content, expected_version)
                    .await
            }
            Request::AddComment { document_id, line_number, comment_text } => {
                self.add_comment(&document_id, line_number, &comment_text).await
            }
            Request::ResolveComment { document_id, comment_id } => {
                self.resolve_comment(&document_id, &comment_id).await
            }
            Request::UpdateCursorPosition { document_id, line_number, column_number } => {
                self.update_cursor_position(&document_id, line_number, column_number)
                    .await
            }
            Request::GetAgentPresence { document_id } => self.get_agent_presence(&document_id).await,
            Request::GetDocumentHistory { document_id, limit } => {
                self.get_document_history(&document_id, limit).await
            }
            Request::ListDocuments => self.list_documents().await,
            Request::CloseDocument { document_id } => self.close_document(&document_id).await,
            Request::GetDocumentAtVersion { document_id, version } => {
                self.get_document_at_version(&document_id, version).await
            }
            Request::SetPermission { document_id, agent_id, permission } => {
                self.set_permission(&document_id, &agent_id, &permission).await
            }
            Request::DeleteDocument { document_id } => self.delete_document(&document_id).await,
        }
    }

    pub async fn create_document(
        &self,
        document_name: &str,
        initial_content: &str,
        access_permissions: &HashMap<String, String>,
    ) -> Envelope {
        let result = async {
            let grants = parse_grants(access_permissions)?;
            self.engine
                .create_document(&self.agent, document_name, initial_content, grants)
                .await
        };
        Envelope::from_result(result.await)
    }

    pub async fn get_document(&self, document_id: &str) -> Envelope {
        let result = async {
            let id = parse_document_id(document_id)?;
            self.engine.get_document(&self.agent, id).await
        };
        Envelope::from_result(result.await)
    }

    pub async fn open_document(&self, document_id: &str) -> Envelope {
        let result = async {
            let id = parse_document_id(document_id)?;
            self.engine.open_document(&self.agent, id).await
        };
        Envelope::from_result(result.await)
    }

    /// Content read with optional comments and presence.
    pub async fn get_document_content(
        &self,
        document_id: &str,
        include_comments: bool,
        include_presence: bool,
    ) -> Envelope {
        let result = async {
            let id = parse_document_id(document_id)?;
            let snap = self.engine.get_document(&self.agent, id).await?;
            Ok::<_, DocError>(DocumentContent {
                document_id: snap.document_id,
                name: snap.name,
                content: snap.content,
                lines: snap.lines,
                version: snap.version,
                comments: include_comments.then_some(snap.comments),
                presence: include_presence.then_some(snap.presence),
            })
        };
        Envelope::from_result(result.await)
    }

    pub async fn save_document(&self, document_id: &str, content: &str) -> Envelope {
        let result = async {
            let id = parse_document_id(document_id)?;
            self.engine.save_document(&self.agent, id, content).await
        };
        Envelope::from_result(result.await)
    }

    pub async fn replace_lines(
        &self,
        document_id: &str,
        start_line: usize,
        end_line: usize,
        content: Vec<String>,
        expected_version: Option<u64>,
    ) -> Envelope {
        let result = async {
            let id = parse_document_id(document_id)?;
            self.engine
                .replace_lines(&self.agent, id, start_line, end_line, content, expected_version)
                .await
        };
        Envelope::from_result(result.await)
    }

    pub async fn add_comment(&self, document_id: &str, line_number: usize, comment_text: &str) -> Envelope {
        let result = async {
            let id = parse_document_id(document_id)?;
            let comment = self
                .engine
                .add_comment(&self.agent, id, line_number, comment_text)
                .await?;
            Ok::<_, DocError>(json!({ "comment_id": comment.id, "comment": comment }))
        };
        Envelope::from_result(result.await)
    }

    pub async fn resolve_comment(&self, document_id: &str, comment_id: &str) -> Envelope {
        let result = async {
            let id = parse_document_id(document_id)?;
            let comment_id = parse_comment_id(comment_id)?;
            let changed = self.engine.resolve_comment(&self.agent, id, comment_id).await?;
            Ok::<_, DocError>(json!({ "comment_id": comment_id, "resolved": true, "changed": changed }))
        };
        Envelope::from_result(result.await)
    }

    pub async fn update_cursor_position(
        &self,
        document_id: &str,
        line_number: usize,
        column_number: usize,
    ) -> Envelope {
        let result = async {
            let id = parse_document_id(document_id)?;
            self.engine
                .update_cursor_position(&self.agent, id, line_number, column_number)
                .await?;
            Ok::<_, DocError>(json!({
                "document_id": id,
                "line_number": line_number,
                "column_number": column_number,
            }))
        };
        Envelope::from_result(result.await)
    }

    pub async fn get_agent_presence(&self, document_id: &str) -> Envelope {
        let result = async {
            let id = parse_document_id(document_id)?;
            let presence = self.engine.get_agent_presence(&self.agent, id).await?;
            Ok::<_, DocError>(json!({ "document_id": id, "presence": presence }))
        };
        Envelope::from_result(result.await)
    }

    /// `limit` defaults to the engine's configured page size.
    pub async fn get_document_history(&self, document_id: &str, limit: Option<usize>) -> Envelope {
        let result = async {
            let id = parse_document_id(document_id)?;
            let limit = limit.unwrap_or(self.engine.config().default_history_limit);
            let operations = self.engine.get_document_history(&self.agent, id, limit).await?;
            Ok::<_, DocError>(json!({ "document_id": id, "operations": operations }))
        };
        Envelope::from_result(result.await)
    }

    pub async fn list_documents(&self) -> Envelope {
        let result = async {
            let documents = self.engine.list_documents(&self.agent).await?;
            Ok::<_, DocError>(json!({ "documents": documents }))
        };
        Envelope::from_result(result.await)
    }

    pub async fn close_document(&self, document_id: &str) -> Envelope {
        let result = async {
            let id = parse_document_id(document_id)?;
            let closed = self.engine.close_document(&self.agent, id).await?;
            Ok::<_, DocError>(json!({ "document_id": id, "closed": closed }))
        };
        Envelope::from_result(result.await)
    }

    pub async fn get_document_at_version(&self, document_id: &str, version: u64) -> Envelope {
        let result = async {
            let id = parse_document_id(document_id)?;
            let lines = self.engine.get_document_at_version(&self.agent, id, version).await?;
            Ok::<_, DocError>(json!({
                "document_id": id,
                "version": version,
                "content": lines.join("\n"),
                "lines": lines,
            }))
        };
        Envelope::from_result(result.await)
    }

    pub async fn set_permission(&self, document_id: &str, agent_id: &str, permission: &str) -> Envelope {
        let result = async {
            let id = parse_document_id(document_id)?;
            let level: Permission = permission.parse()?;
            self.engine
                .set_permission(&self.agent, id, AgentId::new(agent_id), level)
                .await?;
            Ok::<_, DocError>(json!({ "document_id": id, "agent_id": agent_id, "permission": level }))
        };
        Envelope::from_result(result.await)
    }

    pub async fn delete_document(&self, document_id: &str) -> Envelope {
        let result = async {
            let id = parse_document_id(document_id)?;
            self.engine.delete_document(&self.agent, id).await?;
            Ok::<_, DocError>(json!({ "document_id": id, "deleted": true }))
        };
        Envelope::from_result(result.await)
    }
}
