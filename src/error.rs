use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ProcessorError {
    #[error("configuration error: {0}")]
    #[diagnostic(code(dandi::configuration))]
    Configuration(String),

    #[error("missing manifest file dandi-upload.json in current directory")]
    MissingManifest,

    #[error("failed to read manifest file at {0}")]
    ManifestRead(PathBuf),

    #[error("failed to parse JSON manifest: {0}")]
    ManifestParse(String),

    #[error("unsafe destination path {path:?}: {reason}")]
    #[diagnostic(
        code(dandi::unsafe_path),
        help("destination names must be relative, without '.', '..' or empty segments")
    )]
    UnsafePath { path: String, reason: String },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("{tool} failed ({status}) running `{command}`: {stderr}")]
    #[diagnostic(code(dandi::external_tool))]
    ExternalTool {
        tool: String,
        command: String,
        status: String,
        stderr: String,
    },

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("DANDI API returned status {status}: {body}")]
    #[diagnostic(code(dandi::remote_api))]
    RemoteApi { status: u16, body: String },

    #[error("DANDI API request failed: {0}")]
    RemoteHttp(String),

    #[error("unexpected asset metadata: {0}")]
    MetadataShape(String),

    #[error("failed to transfer input {input}: {message}")]
    InputTransfer { input: String, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("malformed NWB units table: {0}")]
    NwbLayout(String),

    #[cfg(feature = "nwb")]
    #[error("failed to read NWB file: {0}")]
    Nwb(String),
}
