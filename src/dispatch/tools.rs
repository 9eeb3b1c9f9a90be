//! JSON tool surface: `{"tool": ..., "params": {...}}` in, [`ToolResponse`] out.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use tracing::debug;

use super::{DispatchError, Dispatcher, EditOutcome};

pub const EDIT_FILE: &str = "edit_file";
pub const READ_FILE: &str = "read_file";
pub const COUNT_LINES: &str = "count_lines";

#[derive(Debug, Clone, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EditFileParams {
    path: PathBuf,
    #[serde(
        alias = "total_lines",
        alias = "original_line_count",
        alias = "declared_line_count"
    )]
    line_count: usize,
    #[serde(alias = "directives")]
    edits: String,
    #[serde(default)]
    dry_run: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReadFileParams {
    path: PathBuf,
    #[serde(default, alias = "start")]
    start_line: Option<usize>,
    #[serde(default, alias = "end")]
    end_line: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CountLinesParams {
    path: PathBuf,
}

/// Reply to one tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub ok: bool,
    /// Step that produced the reply: the operation on success, the failing
    /// stage otherwise.
    pub stage: String,
    /// Human-readable text relayed to the agent.
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
}

impl ToolResponse {
    fn success(stage: &str, message: String) -> Self {
        Self {
            ok: true,
            stage: stage.to_string(),
            message,
            content: None,
            diagnostics: Vec::new(),
        }
    }

    fn failure(stage: &str, message: String) -> Self {
        Self {
            ok: false,
            stage: stage.to_string(),
            message,
            content: None,
            diagnostics: Vec::new(),
        }
    }

    fn with_content(mut self, content: String) -> Self {
        self.content = Some(content);
        self
    }
}

impl From<DispatchError> for ToolResponse {
    fn from(err: DispatchError) -> Self {
        ToolResponse::failure(err.stage(), err.diagnostic())
    }
}

impl Dispatcher {
    /// Route a tool call by name.
    pub fn call(&self, tool: &str, params: Value) -> ToolResponse {
        debug!(tool, "tool call");
        match tool {
            EDIT_FILE => match decode::<EditFileParams>(tool, params) {
                Ok(p) => self.call_edit(p),
                Err(response) => response,
            },
            READ_FILE => match decode::<ReadFileParams>(tool, params) {
                Ok(p) => match self.read_file(&p.path, p.start_line, p.end_line) {
                    Ok(view) => ToolResponse::success(
                        READ_FILE,
                        format!(
                            "{}: lines {}-{} of {}",
                            view.path.display(),
                            view.start_line,
                            view.end_line,
                            view.total_lines
                        ),
                    )
                    .with_content(view.content),
                    Err(e) => e.into(),
                },
                Err(response) => response,
            },
            COUNT_LINES => match decode::<CountLinesParams>(tool, params) {
                Ok(p) => match self.count_lines(&p.path) {
                    Ok(n) => ToolResponse::success(
                        COUNT_LINES,
                        format!("{} has {n} lines", p.path.display()),
                    )
                    .with_content(n.to_string()),
                    Err(e) => e.into(),
                },
                Err(response) => response,
            },
            other => ToolResponse::failure(
                "unknown_tool",
                format!("unknown tool `{other}`; expected one of {EDIT_FILE}, {READ_FILE}, {COUNT_LINES}"),
            ),
        }
    }

    /// Handle one line of the JSON-lines protocol.
    pub fn call_json(&self, line: &str) -> ToolResponse {
        match serde_json::from_str::<ToolCall>(line) {
            Ok(call) => self.call(&call.tool, call.params),
            Err(e) => ToolResponse::failure("invalid_request", format!("invalid tool call: {e}")),
        }
    }

    fn call_edit(&self, p: EditFileParams) -> ToolResponse {
        let result = if p.dry_run {
            self.preview_edit(&p.path, p.line_count, &p.edits)
        } else {
            self.edit_file(&p.path, p.line_count, &p.edits)
        };
        match result {
            Ok(outcome) => edit_response(outcome),
            Err(e) => e.into(),
        }
    }
}

fn edit_response(outcome: EditOutcome) -> ToolResponse {
    let mut response = ToolResponse::success(EDIT_FILE, outcome.to_string());
    response.diagnostics = outcome
        .result
        .warnings
        .iter()
        .cloned()
        .chain(outcome.lint.into_iter().map(|d| d.message))
        .collect();
    response.content = Some(outcome.result.final_content);
    response
}

fn decode<T: for<'de> Deserialize<'de>>(tool: &str, params: Value) -> Result<T, ToolResponse> {
    serde_json::from_value(params).map_err(|e| {
        ToolResponse::failure("invalid_params", format!("invalid parameters for `{tool}`: {e}"))
    })
}
