//! Error taxonomy shared by every stage of the stitching pipeline.
//!
//! Only `Decode` is an exceptional failure; the other variants are expected
//! outcomes of running the pipeline on poorly-overlapping input and are
//! handled internally by the orchestrator where the contract allows it.

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An input image could not be read or decoded. Aborts the whole run:
    /// later stages assume every declared index has a valid feature set.
    #[error("failed to decode '{path}': {source}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },

    /// A finished panorama could not be encoded or written out.
    #[error("failed to write '{path}': {source}")]
    Encode {
        path: String,
        #[source]
        source: image::ImageError,
    },

    /// Fewer than 2 images were loaded, or fewer than 2 remain.
    #[error("need at least 2 images, got {count}")]
    InsufficientInput { count: usize },

    /// Confidence clustering found no connected component of size >= 2.
    #[error("no viable cluster above the confidence threshold")]
    NoViableCluster,

    /// Camera estimation could not converge for the current cluster.
    #[error("camera estimation degenerate: {0}")]
    GeometryDegenerate(String),

    /// Invalid runtime configuration, e.g. a bad worker-count override.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Internal numeric failure inside a capability.
    #[error("algorithm error: {0}")]
    Algorithm(String),
}
