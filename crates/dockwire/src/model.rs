//! Engine API records.
//!
//! Plain serde types, one per resource. Unknown fields are ignored so newer
//! engines keep working.

use std::collections::BTreeMap;
use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use dockwire_http::WireError;

/// Engine-side filter expression: name to accepted values.
pub type Filters = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct SystemVersion {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub api_version: String,
    #[serde(default, rename = "MinAPIVersion")]
    pub min_api_version: Option<String>,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub arch: String,
    #[serde(default)]
    pub kernel_version: Option<String>,
    #[serde(default)]
    pub go_version: Option<String>,
    #[serde(default)]
    pub git_commit: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct SystemInfo {
    #[serde(default, rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub containers: u64,
    #[serde(default)]
    pub containers_running: u64,
    #[serde(default)]
    pub containers_paused: u64,
    #[serde(default)]
    pub containers_stopped: u64,
    #[serde(default)]
    pub images: u64,
    #[serde(default)]
    pub server_version: String,
    #[serde(default)]
    pub operating_system: String,
    #[serde(default)]
    pub architecture: String,
    #[serde(default, rename = "NCPU")]
    pub ncpu: u64,
    #[serde(default)]
    pub mem_total: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSummary {
    pub id: String,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub command: String,
    /// Unix seconds.
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub status: String,
}

impl ContainerSummary {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.created, 0)
    }

    /// First name without the leading slash the engine adds.
    pub fn display_name(&self) -> &str {
        self.names
            .first()
            .map(|name| name.trim_start_matches('/'))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct HostConfig {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub auto_remove: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub binds: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,
}

/// Container configuration, sent on create and returned by inspect.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSpec {
    #[serde(default)]
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
    #[serde(default)]
    pub tty: bool,
    #[serde(default)]
    pub open_stdin: bool,
    #[serde(default)]
    pub stdin_once: bool,
    #[serde(default)]
    pub attach_stdin: bool,
    #[serde(default)]
    pub attach_stdout: bool,
    #[serde(default)]
    pub attach_stderr: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_config: Option<HostConfig>,
}

impl ContainerSpec {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerCreateResponse {
    pub id: String,
    #[serde(default)]
    pub warnings: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerState {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub exit_code: i64,
    #[serde(default)]
    pub pid: i64,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerInspect {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub state: ContainerState,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub config: Option<ContainerSpec>,
}

impl ContainerInspect {
    pub fn is_tty(&self) -> bool {
        self.config.as_ref().is_some_and(|config| config.tty)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct WaitError {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerWaitResponse {
    pub status_code: i64,
    #[serde(default)]
    pub error: Option<WaitError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitCondition {
    NotRunning,
    NextExit,
    Removed,
}

impl WaitCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitCondition::NotRunning => "not-running",
            WaitCondition::NextExit => "next-exit",
            WaitCondition::Removed => "removed",
        }
    }
}

/// One filesystem change. `kind` is 0 modified, 1 added, 2 deleted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerChange {
    pub path: String,
    pub kind: u8,
}

impl ContainerChange {
    pub fn kind_symbol(&self) -> char {
        match self.kind {
            0 => 'C',
            1 => 'A',
            2 => 'D',
            _ => '?',
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerPruneResponse {
    #[serde(default)]
    pub containers_deleted: Option<Vec<String>>,
    #[serde(default)]
    pub space_reclaimed: u64,
}

/// Metadata of a path inside a container, carried base64-encoded in the
/// `X-Docker-Container-Path-Stat` response header.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PathStat {
    pub name: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub mode: u32,
    #[serde(default)]
    pub mtime: String,
    #[serde(default)]
    pub link_target: String,
}

impl PathStat {
    pub const HEADER: &'static str = "X-Docker-Container-Path-Stat";

    pub fn decode(header: &str) -> Result<Self, WireError> {
        let json = STANDARD.decode(header.trim()).map_err(|e| {
            WireError::ProtocolViolation(format!("invalid {} header: {e}", Self::HEADER))
        })?;
        Ok(serde_json::from_slice(&json)?)
    }

    pub fn is_dir(&self) -> bool {
        self.mode & (1 << 31) != 0
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ExecConfig {
    #[serde(default)]
    pub attach_stdin: bool,
    #[serde(default)]
    pub attach_stdout: bool,
    #[serde(default)]
    pub attach_stderr: bool,
    #[serde(default)]
    pub tty: bool,
    pub cmd: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detach_keys: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct IdResponse {
    pub id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ExecInspect {
    #[serde(default, rename = "ID")]
    pub id: String,
    #[serde(default, rename = "ContainerID")]
    pub container_id: String,
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub exit_code: Option<i64>,
    #[serde(default)]
    pub pid: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ImageInspect {
    pub id: String,
    #[serde(default)]
    pub repo_tags: Vec<String>,
    #[serde(default)]
    pub repo_digests: Vec<String>,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub architecture: String,
    #[serde(default)]
    pub os: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressErrorDetail {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub message: String,
}

/// One JSON record of pull, push or build progress.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<String>,
    /// Build output text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<ProgressErrorDetail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aux: Option<serde_json::Value>,
}

impl ProgressRecord {
    /// Message of a terminal error record.
    pub fn error_message(&self) -> Option<&str> {
        self.error_detail
            .as_ref()
            .map(|detail| detail.message.as_str())
            .filter(|message| !message.is_empty())
            .or(self.error.as_deref())
    }

    /// Single-line rendering for terminals.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if let Some(id) = &self.id {
            parts.push(format!("{id}:"));
        }
        if let Some(status) = &self.status {
            parts.push(status.clone());
        }
        if let Some(progress) = &self.progress {
            parts.push(progress.clone());
        }
        if let Some(stream) = &self.stream {
            parts.push(stream.trim_end().to_string());
        }
        parts.join(" ")
    }
}

/// Registry credentials. Sent as base64 JSON in `X-Registry-Auth`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serveraddress: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identitytoken: Option<String>,
}

impl AuthConfig {
    pub const HEADER: &'static str = "X-Registry-Auth";

    pub fn encode(&self) -> Result<String, WireError> {
        Ok(STANDARD.encode(serde_json::to_vec(self)?))
    }
}

/// Query options of an image build.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub tag: Option<String>,
    pub dockerfile: Option<String>,
    pub quiet: bool,
    pub no_cache: bool,
    pub rm: bool,
    pub force_rm: bool,
    pub pull: bool,
    pub build_args: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub network_mode: Option<String>,
}

/// Query options of a log read.
#[derive(Debug, Clone)]
pub struct LogsOptions {
    pub follow: bool,
    pub stdout: bool,
    pub stderr: bool,
    pub timestamps: bool,
    pub since: i64,
    pub tail: Option<String>,
}

impl Default for LogsOptions {
    fn default() -> Self {
        Self {
            follow: false,
            stdout: true,
            stderr: true,
            timestamps: false,
            since: 0,
            tail: None,
        }
    }
}

/// Which streams an attach call connects.
#[derive(Debug, Clone)]
pub struct AttachOptions {
    pub stdin: bool,
    pub stdout: bool,
    pub stderr: bool,
    pub stream: bool,
    pub logs: bool,
    pub detach_keys: Option<String>,
}

impl Default for AttachOptions {
    fn default() -> Self {
        Self {
            stdin: false,
            stdout: true,
            stderr: true,
            stream: true,
            logs: false,
            detach_keys: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_version_field_names() {
        let version: SystemVersion = serde_json::from_value(json!({
            "Version": "24.0.7",
            "ApiVersion": "1.43",
            "MinAPIVersion": "1.12",
            "Os": "linux",
            "Arch": "amd64",
            "Components": [{"Name": "Engine"}]
        }))
        .unwrap();
        assert_eq!(version.api_version, "1.43");
        assert_eq!(version.min_api_version.as_deref(), Some("1.12"));
    }

    #[test]
    fn test_container_spec_skips_unset_fields() {
        let mut spec = ContainerSpec::new("alpine");
        spec.cmd = Some(vec!["echo".into(), "hi".into()]);
        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(value["Image"], "alpine");
        assert_eq!(value["Cmd"], json!(["echo", "hi"]));
        assert!(value.get("HostConfig").is_none());
        assert!(value.get("Env").is_none());
        assert_eq!(value["Tty"], false);
    }

    #[test]
    fn test_inspect_parses_timestamps() {
        let inspect: ContainerInspect = serde_json::from_value(json!({
            "Id": "abc",
            "Name": "/web",
            "Created": "2024-03-01T10:00:00.123456789Z",
            "State": {"Status": "exited", "ExitCode": 3, "StartedAt": "0001-01-01T00:00:00Z"},
            "Config": {"Image": "alpine", "Tty": true}
        }))
        .unwrap();
        assert_eq!(inspect.state.exit_code, 3);
        assert!(inspect.created.is_some());
        assert!(inspect.is_tty());
    }

    #[test]
    fn test_path_stat_decodes_header() {
        let header = STANDARD.encode(
            br#"{"name":"hosts","size":174,"mode":420,"mtime":"2024-03-01T10:00:00Z","linkTarget":""}"#,
        );
        let stat = PathStat::decode(&header).unwrap();
        assert_eq!(stat.name, "hosts");
        assert_eq!(stat.size, 174);
        assert!(!stat.is_dir());

        assert!(matches!(
            PathStat::decode("not base64!"),
            Err(WireError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_auth_config_encoding() {
        let auth = AuthConfig {
            username: Some("bob".into()),
            password: Some("secret".into()),
            ..AuthConfig::default()
        };
        let decoded = STANDARD.decode(auth.encode().unwrap()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(value, json!({"username": "bob", "password": "secret"}));
    }

    #[test]
    fn test_progress_error_message() {
        let record: ProgressRecord = serde_json::from_value(json!({
            "errorDetail": {"message": "manifest unknown"},
            "error": "manifest unknown (legacy)"
        }))
        .unwrap();
        assert_eq!(record.error_message(), Some("manifest unknown"));

        let record: ProgressRecord =
            serde_json::from_value(json!({"id": "a1b2", "status": "Downloading", "progress": "[==>  ]"}))
                .unwrap();
        assert!(record.error_message().is_none());
        assert_eq!(record.summary(), "a1b2: Downloading [==>  ]");
    }

    #[test]
    fn test_summary_display_name() {
        let summary = ContainerSummary {
            id: "abc".into(),
            names: vec!["/web".into()],
            created: 1_700_000_000,
            ..ContainerSummary::default()
        };
        assert_eq!(summary.display_name(), "web");
        assert!(summary.created_at().is_some());
    }
}
