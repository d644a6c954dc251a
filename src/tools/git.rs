//! Git tool: a fixed set of repository operations run as `git` subprocesses
//! (spec.md §4.10), grounded in the same allowlist-then-execute shape as
//! the teacher's remote-command proxy, but covering local read/write
//! operations instead of remote-only ones.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::process::Command;

use super::{Tool, ToolError};

/// One line of `git status --porcelain=v1` output, classified per
/// spec.md §4.10.
#[derive(Debug, Clone, Serialize)]
pub struct GitStatusEntry {
    pub path: String,
    pub index_status: char,
    pub worktree_status: char,
}

/// Structured `git status` result: current branch, remote (best-effort),
/// and the working tree's staged/modified/deleted/untracked/renamed
/// classification.
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GitStatusResult {
    pub branch: Option<String>,
    pub remote: Option<String>,
    pub is_clean: bool,
    pub staged: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
    pub untracked: Vec<String>,
    pub renamed: Vec<String>,
}

/// A parsed `git log` entry: spec.md §4.10's six-field
/// `%H|%h|%an|%ae|%ad|%s` format.
#[derive(Debug, Clone, Serialize)]
pub struct GitCommit {
    pub hash: String,
    pub short_hash: String,
    pub author: String,
    pub email: String,
    pub date: String,
    pub subject: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
enum Operation {
    Status,
    Log {
        #[serde(default = "default_log_limit")]
        limit: u32,
        #[serde(default)]
        since: Option<String>,
        #[serde(default)]
        until: Option<String>,
        #[serde(default)]
        author: Option<String>,
        #[serde(default)]
        grep: Option<String>,
    },
    Diff {
        #[serde(default)]
        staged: bool,
    },
    CreateBranch {
        name: String,
    },
    SwitchBranch {
        name: String,
    },
    Commit {
        message: String,
    },
    Push {
        #[serde(default)]
        remote: Option<String>,
        #[serde(default)]
        branch: Option<String>,
    },
    Pull {
        #[serde(default)]
        remote: Option<String>,
        #[serde(default)]
        branch: Option<String>,
    },
}

const fn default_log_limit() -> u32 {
    20
}

/// Runs a fixed set of `git` subcommands against one repository checkout.
pub struct GitTool {
    repo_path: PathBuf,
    timeout: Duration,
}

impl GitTool {
    #[must_use]
    pub fn new(repo_path: PathBuf, timeout: Duration) -> Self {
        Self { repo_path, timeout }
    }

    async fn run(&self, args: &[&str]) -> Result<(String, String, i32), ToolError> {
        let mut cmd = Command::new("git");
        cmd.current_dir(&self.repo_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("GIT_TERMINAL_PROMPT", "0");

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ToolError::Timeout {
                seconds: self.timeout.as_secs(),
            })??;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let code = output.status.code().unwrap_or(-1);
        Ok((stdout, stderr, code))
    }

    async fn run_checked(&self, args: &[&str]) -> Result<String, ToolError> {
        let (stdout, stderr, code) = self.run(args).await?;
        if code == 0 {
            Ok(stdout)
        } else {
            Err(ToolError::ExecutionFailed {
                message: if stderr.is_empty() { stdout } else { stderr },
            })
        }
    }

    /// Best-effort subprocess call: returns `None` on any non-zero exit or
    /// spawn failure rather than propagating an error, for calls spec.md
    /// §4.10 marks best-effort (`remote get-url origin` on a repo with no
    /// configured remote).
    async fn run_best_effort(&self, args: &[&str]) -> Option<String> {
        let (stdout, _stderr, code) = self.run(args).await.ok()?;
        if code == 0 {
            Some(stdout.trim().to_string())
        } else {
            None
        }
    }

    async fn status(&self) -> Result<GitStatusResult, ToolError> {
        let branch = self
            .run_best_effort(&["rev-parse", "--abbrev-ref", "HEAD"])
            .await
            .filter(|b| !b.is_empty());
        let remote = self.run_best_effort(&["remote", "get-url", "origin"]).await;
        let raw = self.run_checked(&["status", "--porcelain=v1"]).await?;

        let mut result = GitStatusResult {
            branch,
            remote,
            ..GitStatusResult::default()
        };
        for entry in Self::parse_status(&raw) {
            let GitStatusEntry {
                path,
                index_status,
                worktree_status,
            } = entry;
            if index_status == 'R' {
                result.renamed.push(path.clone());
            } else if matches!(index_status, 'A' | 'M' | 'D' | 'C') {
                result.staged.push(path.clone());
            }
            match worktree_status {
                'M' => result.modified.push(path),
                'D' => result.deleted.push(path),
                '?' => result.untracked.push(path),
                _ => {}
            }
        }
        result.is_clean = result.staged.is_empty()
            && result.modified.is_empty()
            && result.deleted.is_empty()
            && result.untracked.is_empty()
            && result.renamed.is_empty();
        Ok(result)
    }

    fn parse_status(raw: &str) -> Vec<GitStatusEntry> {
        raw.lines()
            .filter(|line| line.len() >= 3)
            .map(|line| {
                let mut chars = line.chars();
                let index_status = chars.next().unwrap_or(' ');
                let worktree_status = chars.next().unwrap_or(' ');
                let path = line[3..].to_string();
                GitStatusEntry {
                    path,
                    index_status,
                    worktree_status,
                }
            })
            .collect()
    }

    fn parse_log(raw: &str) -> Vec<GitCommit> {
        raw.lines()
            .filter(|line| !line.is_empty())
            .filter_map(|line| {
                let mut parts = line.splitn(6, '|');
                Some(GitCommit {
                    hash: parts.next()?.to_string(),
                    short_hash: parts.next()?.to_string(),
                    author: parts.next()?.to_string(),
                    email: parts.next()?.to_string(),
                    date: parts.next()?.to_string(),
                    subject: parts.next().unwrap_or("").to_string(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl Tool for GitTool {
    fn name(&self) -> &str {
        "git"
    }

    fn description(&self) -> &str {
        "Inspect and modify a Git repository: status, log, diff, branches, commits, push and pull."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": [
                        "status", "log", "diff", "create_branch", "switch_branch",
                        "commit", "push", "pull"
                    ]
                },
                "limit": { "type": "integer" },
                "since": { "type": "string" },
                "until": { "type": "string" },
                "author": { "type": "string" },
                "grep": { "type": "string" },
                "staged": { "type": "boolean" },
                "name": { "type": "string" },
                "message": { "type": "string" },
                "remote": { "type": "string" },
                "branch": { "type": "string" }
            },
            "required": ["operation"]
        })
    }

    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        let op: Operation = serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments {
            message: e.to_string(),
        })?;

        match op {
            Operation::Status => {
                let result = self.status().await?;
                Ok(serde_json::to_value(result).unwrap_or(Value::Null))
            }
            Operation::Log {
                limit,
                since,
                until,
                author,
                grep,
            } => {
                let limit_arg = format!("-{limit}");
                let mut args = vec![
                    "log".to_string(),
                    limit_arg,
                    "--pretty=format:%H|%h|%an|%ae|%ad|%s".to_string(),
                    "--date=iso".to_string(),
                ];
                if let Some(s) = &since {
                    args.push(format!("--since={s}"));
                }
                if let Some(u) = &until {
                    args.push(format!("--until={u}"));
                }
                if let Some(a) = &author {
                    args.push(format!("--author={a}"));
                }
                if let Some(g) = &grep {
                    args.push(format!("--grep={g}"));
                }
                let args_ref: Vec<&str> = args.iter().map(String::as_str).collect();
                let raw = self.run_checked(&args_ref).await?;
                Ok(serde_json::to_value(Self::parse_log(&raw)).unwrap_or(Value::Null))
            }
            Operation::Diff { staged } => {
                let args: &[&str] = if staged { &["diff", "--staged"] } else { &["diff"] };
                let raw = self.run_checked(args).await?;
                Ok(serde_json::json!({ "diff": raw }))
            }
            Operation::CreateBranch { name } => {
                self.run_checked(&["branch", &name]).await?;
                Ok(serde_json::json!({ "created": name }))
            }
            Operation::SwitchBranch { name } => {
                self.run_checked(&["switch", &name]).await?;
                Ok(serde_json::json!({ "switched_to": name }))
            }
            Operation::Commit { message } => {
                let raw = self.run_checked(&["commit", "-m", &message]).await?;
                Ok(serde_json::json!({ "output": raw }))
            }
            Operation::Push { remote, branch } => {
                let mut args = vec!["push".to_string()];
                if let Some(r) = &remote {
                    args.push(r.clone());
                }
                if let Some(b) = &branch {
                    args.push(b.clone());
                }
                let args_ref: Vec<&str> = args.iter().map(String::as_str).collect();
                let raw = self.run_checked(&args_ref).await?;
                Ok(serde_json::json!({ "output": raw }))
            }
            Operation::Pull { remote, branch } => {
                let mut args = vec!["pull".to_string()];
                if let Some(r) = &remote {
                    args.push(r.clone());
                }
                if let Some(b) = &branch {
                    args.push(b.clone());
                }
                let args_ref: Vec<&str> = args.iter().map(String::as_str).collect();
                let raw = self.run_checked(&args_ref).await?;
                Ok(serde_json::json!({ "output": raw }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_porcelain_status_lines() {
        let raw = " M src/lib.rs\n?? new_file.rs\n";
        let entries = GitTool::parse_status(raw);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, "src/lib.rs");
        assert_eq!(entries[0].worktree_status, 'M');
        assert_eq!(entries[1].index_status, '?');
    }

    #[test]
    fn parses_log_entries() {
        let raw = "abc123|abc|Jane Doe|jane@example.com|2024-01-01 10:00:00 +0000|Initial commit\n";
        let commits = GitTool::parse_log(raw);
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].hash, "abc123");
        assert_eq!(commits[0].short_hash, "abc");
        assert_eq!(commits[0].email, "jane@example.com");
        assert_eq!(commits[0].subject, "Initial commit");
    }

    #[test]
    fn malformed_log_lines_are_skipped() {
        let raw = "only|four|fields|here\ngood|g|Jane|jane@example.com|2024-01-01|Fix bug\n";
        let commits = GitTool::parse_log(raw);
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].hash, "good");
    }

    #[test]
    fn staged_and_worktree_changes_are_classified() {
        let raw = "A  staged.rs\n M modified.rs\n D deleted.rs\n?? untracked.rs\nR  renamed.rs -> new.rs\n";
        let entries = GitTool::parse_status(raw);
        assert_eq!(entries.len(), 5);
        assert_eq!(entries[0].index_status, 'A');
        assert_eq!(entries[4].index_status, 'R');
    }

    #[tokio::test]
    async fn status_on_fresh_repo_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        let status = Command::new("git")
            .current_dir(dir.path())
            .args(["init", "-q"])
            .status()
            .await;
        if status.map(|s| s.success()).unwrap_or(false) {
            let tool = GitTool::new(dir.path().to_path_buf(), Duration::from_secs(5));
            let result = tool.call(serde_json::json!({ "operation": "status" })).await.unwrap();
            assert_eq!(result["isClean"], true);
            assert_eq!(result["staged"].as_array().unwrap().len(), 0);
        }
    }

    #[tokio::test]
    async fn status_reports_untracked_file() {
        let dir = tempfile::tempdir().unwrap();
        let init = Command::new("git")
            .current_dir(dir.path())
            .args(["init", "-q"])
            .status()
            .await;
        if init.map(|s| s.success()).unwrap_or(false) {
            std::fs::write(dir.path().join("new.txt"), b"hello").unwrap();
            let tool = GitTool::new(dir.path().to_path_buf(), Duration::from_secs(5));
            let result = tool.call(serde_json::json!({ "operation": "status" })).await.unwrap();
            assert_eq!(result["isClean"], false);
            assert_eq!(result["untracked"].as_array().unwrap().len(), 1);
        }
    }
}
