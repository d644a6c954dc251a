//! Sandboxed filesystem tool (spec.md §4.10).
//!
//! Every operation is gated through [`FilesystemTool::resolve`], which
//! rejects `..` components and requires the resolved path to fall under
//! `base_path` or one of `allowlist`'s prefixes. This mirrors the
//! teacher's git command allowlist — reject first, execute second —
//! applied to paths instead of CLI flags.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use glob::Pattern;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Tool, ToolError};

/// A single filesystem tool dispatching on an `operation` argument.
pub struct FilesystemTool {
    base_path: PathBuf,
    allowlist: Vec<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
enum Operation {
    ReadFile { path: String },
    WriteFile { path: String, content: String },
    ListDirectory { path: String },
    CreateDirectory { path: String },
    DeleteFile { path: String },
    MoveFile { from: String, to: String },
    GetFileInfo { path: String },
    FindFiles { path: String, pattern: String },
}

#[derive(Debug, Serialize)]
struct FileInfo {
    path: String,
    is_dir: bool,
    is_file: bool,
    size_bytes: u64,
}

#[derive(Debug, Serialize)]
struct DirEntry {
    name: String,
    is_dir: bool,
}

impl FilesystemTool {
    #[must_use]
    pub fn new(base_path: PathBuf, allowlist: Vec<PathBuf>) -> Self {
        Self { base_path, allowlist }
    }

    /// Resolves `requested` against the sandbox, rejecting traversal
    /// outside `base_path` and any `allowlist` prefix.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::SandboxViolation`] if `requested` contains a
    /// `..` component or lies outside every permitted root.
    fn resolve(&self, requested: &str) -> Result<PathBuf, ToolError> {
        let requested_path = Path::new(requested);
        if requested_path
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(ToolError::SandboxViolation {
                message: format!("path traversal rejected: {requested}"),
            });
        }

        let candidate = if requested_path.is_absolute() {
            requested_path.to_path_buf()
        } else {
            self.base_path.join(requested_path)
        };

        let under_base = candidate.starts_with(&self.base_path);
        let under_allowlist = self.allowlist.iter().any(|root| candidate.starts_with(root));
        if under_base || under_allowlist {
            Ok(candidate)
        } else {
            Err(ToolError::SandboxViolation {
                message: format!("path outside sandbox: {}", candidate.display()),
            })
        }
    }
}

#[async_trait]
impl Tool for FilesystemTool {
    fn name(&self) -> &str {
        "filesystem"
    }

    fn description(&self) -> &str {
        "Read, write and inspect files within a sandboxed directory tree."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": [
                        "read_file", "write_file", "list_directory",
                        "create_directory", "delete_file", "move_file", "get_file_info",
                        "find_files"
                    ]
                },
                "path": { "type": "string" },
                "content": { "type": "string" },
                "from": { "type": "string" },
                "to": { "type": "string" },
                "pattern": { "type": "string" }
            },
            "required": ["operation"]
        })
    }

    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        let op: Operation = serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments {
            message: e.to_string(),
        })?;

        match op {
            Operation::ReadFile { path } => {
                let resolved = self.resolve(&path)?;
                let content = tokio::fs::read_to_string(&resolved).await?;
                Ok(serde_json::json!({ "content": content }))
            }
            Operation::WriteFile { path, content } => {
                let resolved = self.resolve(&path)?;
                if let Some(parent) = resolved.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&resolved, content).await?;
                Ok(serde_json::json!({ "written": true }))
            }
            Operation::ListDirectory { path } => {
                let resolved = self.resolve(&path)?;
                let mut entries = tokio::fs::read_dir(&resolved).await?;
                let mut result = Vec::new();
                while let Some(entry) = entries.next_entry().await? {
                    let file_type = entry.file_type().await?;
                    result.push(DirEntry {
                        name: entry.file_name().to_string_lossy().into_owned(),
                        is_dir: file_type.is_dir(),
                    });
                }
                result.sort_by(|a, b| a.name.cmp(&b.name));
                Ok(serde_json::to_value(result).unwrap_or(Value::Null))
            }
            Operation::CreateDirectory { path } => {
                let resolved = self.resolve(&path)?;
                tokio::fs::create_dir_all(&resolved).await?;
                Ok(serde_json::json!({ "created": true }))
            }
            Operation::DeleteFile { path } => {
                let resolved = self.resolve(&path)?;
                tokio::fs::remove_file(&resolved).await?;
                Ok(serde_json::json!({ "deleted": true }))
            }
            Operation::MoveFile { from, to } => {
                let from_resolved = self.resolve(&from)?;
                let to_resolved = self.resolve(&to)?;
                tokio::fs::rename(&from_resolved, &to_resolved).await?;
                Ok(serde_json::json!({ "moved": true }))
            }
            Operation::GetFileInfo { path } => {
                let resolved = self.resolve(&path)?;
                let metadata = tokio::fs::metadata(&resolved).await?;
                Ok(serde_json::to_value(FileInfo {
                    path: resolved.display().to_string(),
                    is_dir: metadata.is_dir(),
                    is_file: metadata.is_file(),
                    size_bytes: metadata.len(),
                })
                .unwrap_or(Value::Null))
            }
            Operation::FindFiles { path, pattern } => {
                let resolved = self.resolve(&path)?;
                let compiled = Pattern::new(&pattern).map_err(|e| ToolError::InvalidArguments {
                    message: format!("invalid glob pattern '{pattern}': {}", e.msg),
                })?;

                let mut entries = tokio::fs::read_dir(&resolved).await?;
                let mut matches = Vec::new();
                while let Some(entry) = entries.next_entry().await? {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    if compiled.matches(&name) {
                        matches.push(name);
                    }
                }
                matches.sort();
                Ok(serde_json::json!({ "matches": matches }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FilesystemTool::new(dir.path().to_path_buf(), vec![]);

        tool.call(serde_json::json!({
            "operation": "write_file", "path": "note.txt", "content": "hello"
        }))
        .await
        .unwrap();

        let result = tool
            .call(serde_json::json!({ "operation": "read_file", "path": "note.txt" }))
            .await
            .unwrap();
        assert_eq!(result["content"], "hello");
    }

    #[tokio::test]
    async fn rejects_parent_dir_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FilesystemTool::new(dir.path().to_path_buf(), vec![]);

        let err = tool
            .call(serde_json::json!({ "operation": "read_file", "path": "../secret" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::SandboxViolation { .. }));
    }

    #[tokio::test]
    async fn rejects_path_outside_base_and_allowlist() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FilesystemTool::new(dir.path().to_path_buf(), vec![]);

        let err = tool
            .call(serde_json::json!({ "operation": "read_file", "path": "/etc/passwd" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::SandboxViolation { .. }));
    }

    #[tokio::test]
    async fn list_directory_returns_sorted_entries() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("b.txt"), "b").await.unwrap();
        tokio::fs::write(dir.path().join("a.txt"), "a").await.unwrap();
        let tool = FilesystemTool::new(dir.path().to_path_buf(), vec![]);

        let result = tool
            .call(serde_json::json!({ "operation": "list_directory", "path": "." }))
            .await
            .unwrap();
        let entries = result.as_array().unwrap();
        assert_eq!(entries[0]["name"], "a.txt");
        assert_eq!(entries[1]["name"], "b.txt");
    }

    #[tokio::test]
    async fn find_files_matches_glob_pattern() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.rs"), "").await.unwrap();
        tokio::fs::write(dir.path().join("b.rs"), "").await.unwrap();
        tokio::fs::write(dir.path().join("c.txt"), "").await.unwrap();
        let tool = FilesystemTool::new(dir.path().to_path_buf(), vec![]);

        let result = tool
            .call(serde_json::json!({ "operation": "find_files", "path": ".", "pattern": "*.rs" }))
            .await
            .unwrap();
        let matches = result["matches"].as_array().unwrap();
        assert_eq!(matches.len(), 2);
    }
}
