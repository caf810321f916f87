use crate::{GateError, Result};
use serde::{Deserialize, Serialize};

/// Status report a logger posts before uploading. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckinStatus {
    pub versions: CheckinVersions,
    pub files: CheckinFiles,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckinVersions {
    pub firmware: String,
    #[serde(alias = "commandproc")]
    pub command_processor: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckinFiles {
    pub count: u64,
}

#[derive(Debug, Clone)]
pub struct CheckinOperationRequest {
    pub identity: String,
    pub body: bytes::Bytes,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CheckinOperation;

impl CheckinOperation {
    pub fn new() -> Self {
        Self
    }

    pub fn run(&self, request: CheckinOperationRequest) -> Result<CheckinStatus> {
        let status: CheckinStatus = serde_json::from_slice(&request.body).map_err(|error| {
            tracing::error!(
                "failed to parse status update from logger {}: {}",
                request.identity,
                error
            );
            GateError::MalformedRequest(format!("invalid status update: {}", error))
        })?;

        tracing::info!(
            "status update from logger {} with firmware {}, command processor {}, total {} files",
            request.identity,
            status.versions.firmware,
            status.versions.command_processor,
            status.files.count
        );
        Ok(status)
    }
}
