// Locates the external media engines and reports their versions

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;
use tokio::task::JoinError;

use super::config::EngineConfig;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ToolType {
    Ffmpeg,
    Ffprobe,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::Ffmpeg => "ffmpeg",
            ToolType::Ffprobe => "ffprobe",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub tool_type: ToolType,
    pub version: Option<String>,
    pub path: Option<String>,
    pub is_available: bool,
}

/// Finds engine binaries: explicit config first, then common install
/// locations, then `PATH`.
pub struct ToolManager {
    config: EngineConfig,
}

impl ToolManager {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn get_tool_info(&self, tool_type: ToolType) -> ToolInfo {
        let (path, version) = self.detect_tool(tool_type);

        ToolInfo {
            name: tool_type.as_str().to_string(),
            tool_type,
            is_available: version.is_some(),
            version,
            path,
        }
    }

    /// `get_all_tools` on the blocking pool; detection spawns processes
    pub async fn detect_all(config: EngineConfig) -> Result<Vec<ToolInfo>, JoinError> {
        tokio::task::spawn_blocking(move || Self::new(config).get_all_tools()).await
    }

    /// `(ffmpeg, ffprobe)` programs, looked up on the blocking pool
    pub async fn locate_engines(config: EngineConfig) -> Result<(String, String), JoinError> {
        tokio::task::spawn_blocking(move || {
            let tools = Self::new(config);
            (tools.program(ToolType::Ffmpeg), tools.program(ToolType::Ffprobe))
        })
        .await
    }

    pub fn get_all_tools(&self) -> Vec<ToolInfo> {
        vec![
            self.get_tool_info(ToolType::Ffmpeg),
            self.get_tool_info(ToolType::Ffprobe),
        ]
    }

    /// Path to run the tool with. Falls back to the bare name so a missing
    /// binary shows up as a launch error at call time.
    pub fn program(&self, tool_type: ToolType) -> String {
        if let Some(path) = self.configured_path(tool_type) {
            return path.to_string();
        }
        self.search_path(tool_type)
            .unwrap_or_else(|| tool_type.as_str().to_string())
    }

    fn configured_path(&self, tool_type: ToolType) -> Option<&str> {
        match tool_type {
            ToolType::Ffmpeg => self.config.ffmpeg_path.as_deref(),
            ToolType::Ffprobe => self.config.ffprobe_path.as_deref(),
        }
    }

    fn detect_tool(&self, tool_type: ToolType) -> (Option<String>, Option<String>) {
        let path = match self.configured_path(tool_type) {
            Some(path) => Some(path.to_string()),
            None => self.search_path(tool_type),
        };

        match path {
            Some(path) => {
                let version = self.get_version(&path);
                (Some(path), version)
            }
            None => (None, None),
        }
    }

    fn search_path(&self, tool_type: ToolType) -> Option<String> {
        let binary_name = tool_type.as_str();

        // 1. Common install locations
        let common_paths = [
            format!("/opt/homebrew/bin/{}", binary_name),
            format!("/usr/local/bin/{}", binary_name),
            format!("/usr/bin/{}", binary_name),
        ];

        for path in common_paths {
            if Path::new(&path).exists() {
                return Some(path);
            }
        }

        // 2. PATH
        if let Ok(output) = Command::new("which").arg(binary_name).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    return Some(path);
                }
            }
        }

        None
    }

    fn get_version(&self, path: &str) -> Option<String> {
        match Command::new(path).arg("-version").output() {
            Ok(output) if output.status.success() => {
                let out = String::from_utf8_lossy(&output.stdout);
                parse_version_line(&out)
            }
            _ => None,
        }
    }
}

/// "ffmpeg version 6.1.1-3ubuntu5 Copyright ..." -> "6.1.1-3ubuntu5"
fn parse_version_line(output: &str) -> Option<String> {
    let first = output.lines().next()?;
    let mut words = first.split_whitespace();
    while let Some(word) = words.next() {
        if word == "version" {
            return words.next().map(|v| v.to_string());
        }
    }
    None
}
