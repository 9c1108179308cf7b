use std::path::PathBuf;
use thiserror::Error;

use crate::schedule::{ResourceSet, StageId};

/// Failures that abort IBL initialization or indicate a broken frame schedule.
#[derive(Debug, Error)]
pub enum IblError {
    #[error("failed to read {kind} '{}'", path.display())]
    Io {
        kind: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode panorama '{}'", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("sky table '{}' holds {actual} bytes, expected at least {expected}", path.display())]
    TableSize { path: PathBuf, expected: usize, actual: usize },
    #[error("shader '{label}' failed validation:\n{message}")]
    ShaderValidation { label: &'static str, message: String },
    #[error("GPU rejected {label}: {message}")]
    GpuValidation { label: String, message: String },
    #[error("stage {stage:?} reads {resources:?} written earlier in the same batch")]
    UnsynchronizedRead { stage: StageId, resources: ResourceSet },
}
