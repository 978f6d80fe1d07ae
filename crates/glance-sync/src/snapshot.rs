use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Record layout version written by this build.
pub const SNAPSHOT_VERSION: u32 = 1;

fn legacy_version() -> u32 {
    1
}

/// Immutable, timestamped picture of the terminal for another process.
///
/// Serialized as `{ version, outputText, timestamp, currentDirectory,
/// isExecutingCommand }` with an RFC 3339 timestamp.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default = "legacy_version")]
    pub version: u32,
    /// Raw output, escape sequences included.
    pub output_text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "currentDirectory")]
    pub working_directory: String,
    #[serde(rename = "isExecutingCommand")]
    pub executing: bool,
}

impl Snapshot {
    /// Capture a snapshot stamped with the current time.
    pub fn new(output_text: impl Into<String>, working_directory: impl Into<String>, executing: bool) -> Self {
        Self::at(output_text, working_directory, executing, Utc::now())
    }

    pub fn at(
        output_text: impl Into<String>,
        working_directory: impl Into<String>,
        executing: bool,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            output_text: output_text.into(),
            timestamp,
            working_directory: working_directory.into(),
            executing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_field_names() {
        let snapshot = Snapshot::new("\x1b[31mhi\x1b[0m", "/tmp", true);
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["version"], 1);
        assert_eq!(value["outputText"], "\x1b[31mhi\x1b[0m");
        assert_eq!(value["currentDirectory"], "/tmp");
        assert_eq!(value["isExecutingCommand"], true);
        assert!(value["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_missing_version_reads_as_one() {
        let json = r#"{
            "outputText": "x",
            "timestamp": "2024-01-02T03:04:05Z",
            "currentDirectory": "/",
            "isExecutingCommand": false
        }"#;
        let snapshot: Snapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.version, 1);
        assert_eq!(snapshot.output_text, "x");
        assert_eq!(snapshot.timestamp.to_rfc3339(), "2024-01-02T03:04:05+00:00");
    }
}
