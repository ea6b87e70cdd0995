//! Built-in vault tools.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use super::params::{flag, optional_str, optional_usize, required_str};
use super::{ParamSpec, ParamType, Tool, ToolContext, ToolDefinition, ToolOutput};
use crate::error::{GatewayError, GatewayResult};
use crate::search::{SearchMode, SearchRequest};
use crate::vault::normalize_file_path;

/// Characters of each source document included in an `ask_vault` prompt.
const CONTEXT_CHARS_PER_SOURCE: usize = 2000;

/// Every built-in tool, in catalog order.
pub fn all() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(ListFilesTool),
        Arc::new(ReadNoteTool),
        Arc::new(CreateNoteTool),
        Arc::new(UpdateNoteTool),
        Arc::new(AppendNoteTool),
        Arc::new(DeleteNoteTool),
        Arc::new(SearchTool),
        Arc::new(AskVaultTool),
    ]
}

fn text_param(description: &str) -> ParamSpec {
    ParamSpec::required(ParamType::String, description)
}

// ============ Document Tools ============

pub struct ListFilesTool;

#[async_trait]
impl Tool for ListFilesTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("list_files", "List notes and folders in a vault folder").param(
            "path",
            ParamSpec::optional(ParamType::String, "Folder to list; the vault root when omitted"),
        )
    }

    async fn execute(
        &self,
        params: Map<String, Value>,
        ctx: &ToolContext,
    ) -> GatewayResult<ToolOutput> {
        let dir = optional_str(&params, "path")?;
        let entries = ctx.vault.list_documents(dir).await?;
        let message = format!("{} entries", entries.len());
        Ok(ToolOutput::new(serde_json::to_value(entries)?, message))
    }
}

pub struct ReadNoteTool;

#[async_trait]
impl Tool for ReadNoteTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("read_note", "Read the full text of a note")
            .param("path", text_param("Vault-relative note path"))
    }

    async fn execute(
        &self,
        params: Map<String, Value>,
        ctx: &ToolContext,
    ) -> GatewayResult<ToolOutput> {
        let path = normalize_file_path(required_str(&params, "path")?)?;
        let content = ctx.vault.read_document(&path).await?;
        let message = format!("read {} ({} bytes)", path, content.len());
        Ok(ToolOutput::new(
            json!({ "path": path, "content": content }),
            message,
        ))
    }
}

pub struct CreateNoteTool;

#[async_trait]
impl Tool for CreateNoteTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("create_note", "Create a new note")
            .param("path", text_param("Vault-relative path of the new note"))
            .param("content", text_param("Note text"))
            .param(
                "overwrite",
                ParamSpec::optional(ParamType::Boolean, "Replace the note if it already exists")
                    .with_default(false),
            )
    }

    async fn execute(
        &self,
        params: Map<String, Value>,
        ctx: &ToolContext,
    ) -> GatewayResult<ToolOutput> {
        let path = normalize_file_path(required_str(&params, "path")?)?;
        let content = required_str(&params, "content")?;

        if !flag(&params, "overwrite") && ctx.vault.exists(&path).await? {
            return Err(GatewayError::ClientError {
                status: 409,
                message: format!("note already exists: {}", path),
            });
        }
        ctx.vault.write_document(&path, content).await?;
        Ok(ToolOutput::new(json!({ "path": path }), format!("created {}", path)))
    }
}

pub struct UpdateNoteTool;

#[async_trait]
impl Tool for UpdateNoteTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("update_note", "Replace the text of an existing note")
            .param("path", text_param("Vault-relative note path"))
            .param("content", text_param("New note text"))
    }

    async fn execute(
        &self,
        params: Map<String, Value>,
        ctx: &ToolContext,
    ) -> GatewayResult<ToolOutput> {
        let path = normalize_file_path(required_str(&params, "path")?)?;
        let content = required_str(&params, "content")?;

        if !ctx.vault.exists(&path).await? {
            return Err(GatewayError::ClientError {
                status: 404,
                message: format!("note not found: {}", path),
            });
        }
        ctx.vault.write_document(&path, content).await?;
        Ok(ToolOutput::new(json!({ "path": path }), format!("updated {}", path)))
    }
}

pub struct AppendNoteTool;

#[async_trait]
impl Tool for AppendNoteTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("append_note", "Append text to a note, creating it if absent")
            .param("path", text_param("Vault-relative note path"))
            .param("content", text_param("Text to append"))
    }

    async fn execute(
        &self,
        params: Map<String, Value>,
        ctx: &ToolContext,
    ) -> GatewayResult<ToolOutput> {
        let path = normalize_file_path(required_str(&params, "path")?)?;
        let content = required_str(&params, "content")?;
        ctx.vault.append_document(&path, content).await?;
        Ok(ToolOutput::new(
            json!({ "path": path, "appended": content.len() }),
            format!("appended to {}", path),
        ))
    }
}

pub struct DeleteNoteTool;

#[async_trait]
impl Tool for DeleteNoteTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("delete_note", "Delete a note")
            .param("path", text_param("Vault-relative note path"))
    }

    async fn execute(
        &self,
        params: Map<String, Value>,
        ctx: &ToolContext,
    ) -> GatewayResult<ToolOutput> {
        let path = normalize_file_path(required_str(&params, "path")?)?;
        ctx.vault.delete_document(&path).await?;
        Ok(ToolOutput::new(json!({ "path": path }), format!("deleted {}", path)))
    }
}

// ============ Retrieval Tools ============

pub struct SearchTool;

#[async_trait]
impl Tool for SearchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "search",
            "Rank vault notes against a query using keyword, semantic, and proximity signals",
        )
        .param("query", ParamSpec::required(ParamType::String, "Search text"))
        .param(
            "mode",
            ParamSpec::optional(ParamType::String, "Ranking mode; the configured default when omitted")
                .one_of(SearchMode::ALL),
        )
        .param(
            "limit",
            ParamSpec::optional(ParamType::Integer, "Maximum number of results").at_least(1),
        )
        .param(
            "folder",
            ParamSpec::optional(ParamType::String, "Only search under this folder"),
        )
        .param(
            "explain",
            ParamSpec::optional(ParamType::Boolean, "Include per-scorer score breakdown")
                .with_default(false),
        )
    }

    async fn execute(
        &self,
        params: Map<String, Value>,
        ctx: &ToolContext,
    ) -> GatewayResult<ToolOutput> {
        let mode = optional_str(&params, "mode")?
            .map(|m| m.parse::<SearchMode>())
            .transpose()
            .map_err(|e| GatewayError::invalid(e.to_string()))?;
        let request = SearchRequest {
            query: required_str(&params, "query")?.to_string(),
            mode,
            limit: optional_usize(&params, "limit")?,
            folder: optional_str(&params, "folder")?.map(str::to_string),
            explain: flag(&params, "explain"),
        };

        let response = ctx.search.search(&request).await?;
        let mut message = format!("{} results ({})", response.results.len(), response.mode);
        if response.degraded {
            message.push_str(", semantic scoring unavailable");
        }
        Ok(ToolOutput::new(serde_json::to_value(response)?, message))
    }
}

pub struct AskVaultTool;

#[async_trait]
impl Tool for AskVaultTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "ask_vault",
            "Answer a question from the most relevant vault notes",
        )
        .param("question", ParamSpec::required(ParamType::String, "Question to answer"))
        .param(
            "top_k",
            ParamSpec::optional(ParamType::Integer, "Number of notes to use as context")
                .with_default(5)
                .at_least(1),
        )
    }

    async fn execute(
        &self,
        params: Map<String, Value>,
        ctx: &ToolContext,
    ) -> GatewayResult<ToolOutput> {
        let question = required_str(&params, "question")?;
        if !ctx.inference.is_available() {
            return Err(GatewayError::Unavailable(
                "no inference provider is configured".to_string(),
            ));
        }

        let request = SearchRequest {
            query: question.to_string(),
            mode: Some(SearchMode::Hybrid),
            limit: optional_usize(&params, "top_k")?,
            ..Default::default()
        };
        let hits = ctx.search.search(&request).await?.results;
        let sources: Vec<String> = hits.iter().map(|h| h.path.clone()).collect();

        let mut context = String::new();
        for path in &sources {
            match ctx.vault.read_document(path).await {
                Ok(text) => {
                    let excerpt: String = text.chars().take(CONTEXT_CHARS_PER_SOURCE).collect();
                    context.push_str(&format!("### {}\n{}\n\n", path, excerpt));
                }
                Err(e) => tracing::warn!(%path, error = %e, "skipping context source"),
            }
        }

        let prompt = build_prompt(question, &context);
        let answer = ctx
            .inference
            .complete(&prompt)
            .await
            .map_err(|e| GatewayError::Unavailable(format!("completion failed: {:#}", e)))?;

        Ok(ToolOutput::new(
            json!({ "answer": answer.trim(), "sources": sources }),
            format!("answered from {} notes", sources.len()),
        ))
    }
}

fn build_prompt(question: &str, context: &str) -> String {
    if context.is_empty() {
        return format!(
            "No notes in the vault matched this question. Say so briefly.\n\nQuestion: {}\nAnswer:",
            question
        );
    }
    format!(
        "Answer the question using only the notes below. Cite note paths you rely on.\n\n{}Question: {}\nAnswer:",
        context, question
    )
}
