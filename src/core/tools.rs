//! External executable invocation and discovery

use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::process::Stdio;
use tokio::process::Command;

use super::config::ToolConfig;
use super::models::{AppError, AppResult};

/// Captured output of a finished tool run
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs `binary` to completion
///
/// A missing executable maps to [`AppError::ToolNotFound`]; a non-zero exit
/// maps to [`AppError::ExternalTool`] carrying the tail of stderr.
pub async fn run_tool<I, S>(binary: &str, args: I) -> AppResult<ToolOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    tracing::debug!("Running {}", binary);

    let output = Command::new(binary)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => AppError::ToolNotFound(binary.to_string()),
            _ => AppError::ExternalTool {
                tool: binary.to_string(),
                message: format!("failed to start: {e}"),
            },
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        return Err(AppError::ExternalTool {
            tool: binary.to_string(),
            message: format!("{} ({})", tail(&stderr, 20), output.status),
        });
    }

    Ok(ToolOutput { stdout, stderr })
}

/// Last `lines` lines of tool output
fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolStatus {
    pub name: String,
    pub path: String,
    pub version: Option<String>,
    pub is_available: bool,
}

/// Version flag differs between tools
fn version_args(name: &str) -> &'static [&'static str] {
    if name.contains("ffmpeg") {
        &["-version"]
    } else {
        &["--version"]
    }
}

/// First stdout line of the tool's version output
pub async fn tool_version(binary: &str) -> Option<String> {
    match run_tool(binary, version_args(binary)).await {
        Ok(output) => output.stdout.lines().next().map(|l| l.trim().to_string()),
        Err(_) => None,
    }
}

/// Availability report for every configured tool
pub async fn get_all_tools(config: &ToolConfig) -> Vec<ToolStatus> {
    let mut statuses = Vec::new();
    for (name, path) in [("ffmpeg", &config.ffmpeg), ("yt-dlp", &config.yt_dlp)] {
        let version = tool_version(path).await;
        statuses.push(ToolStatus {
            name: name.to_string(),
            path: path.clone(),
            is_available: version.is_some(),
            version,
        });
    }
    statuses
}
