use thiserror::Error;

/// Failure reported by the XR host (WebXR or the simulator).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum XrError {
    #[error("XR device API is not available")]
    Unavailable,
    #[error("session request rejected: {0}")]
    SessionRejected(String),
    #[error("reference space request rejected: {0}")]
    ReferenceSpaceRejected(String),
    #[error("session has already ended")]
    SessionEnded,
    #[error("{0}")]
    Host(String),
}

/// Failure while fetching or decoding the model asset.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unable to read {name}: {message}")]
    Fetch { name: String, message: String },
    #[error("{name} is not a valid glTF binary: {source}")]
    Parse {
        name: String,
        #[source]
        source: gltf::Error,
    },
    #[error("{name}: {message}")]
    Unsupported { name: String, message: String },
    #[error("{name} does not contain any triangle meshes")]
    Empty { name: String },
}

/// Failure while creating the render surface or submitting a frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("render surface unavailable: {0}")]
    Surface(String),
    #[error("draw failed: {0}")]
    Draw(String),
}

/// Errors that can abort a session bootstrap.
///
/// Each variant names the step that failed so the single log line emitted by
/// the orchestrator says where setup stopped.
#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("failed to request AR session: {0}")]
    SessionRequest(#[source] XrError),
    #[error("failed to request reference space: {0}")]
    ReferenceSpace(#[source] XrError),
    #[error("failed to create render surface: {0}")]
    Surface(#[source] RenderError),
    #[error("failed to load model: {0}")]
    ModelLoad(#[from] ModelError),
}
