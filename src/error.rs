//! Error types shared by the parsers, exporters and the intermediate format.

use thiserror::Error;

/// An error that stops a parse, export or SIF operation.
///
/// Structural oddities in a subtitle file are not errors, they end up as
/// [`ParseWarning`](crate::parsers::ParseWarning)s on the parser instead.
#[derive(Debug, Error)]
pub enum Error {
    /// None of the candidate encodings could decode the input.
    #[error("could not detect proper encoding (tried: {})", .tried_encodings.join(", "))]
    EncodingExhausted {
        /// Every encoding that was attempted, in attempt order.
        tried_encodings: Vec<String>,
    },
    /// No parser is registered under the given format name.
    #[error("could not find parser for format '{0}'")]
    FormatNotRegistered(String),
    /// No exporter is registered under the given format name.
    #[error("could not find exporter with name '{0}'")]
    NoExporterFound(String),
    /// None of the registered parsers recognized the data.
    #[error("could not find a parser for the given data")]
    FormatNotDetected,
    /// `parse()` was called on a parser without bound data.
    #[error("parser has no data bound to it")]
    NoData,
    /// The configured output encoding is not a known encoding label.
    #[error("unknown encoding '{0}'")]
    UnknownEncoding(String),
    /// A stream could not be read or written.
    #[error("file error: {0}")]
    Io(#[from] std::io::Error),
    /// The intermediate format framing is broken or truncated.
    #[error("invalid subtitle intermediate format: {0}")]
    Sif(String),
    /// The intermediate format payload is not valid.
    #[error("invalid subtitle intermediate format payload: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
