//! CLI output: error mapping from domain errors to the CLI surface.

use crate::error::{ApiError, ErrorKind};

/// Map an engine error to a one-line message prefixed with its class.
pub fn map_error(e: &ApiError) -> String {
    let class = match e.kind() {
        ErrorKind::NotFound => "not found",
        ErrorKind::Forbidden => "forbidden",
        ErrorKind::BadRequest => "bad request",
        ErrorKind::UpstreamFailure => "upstream failure",
        ErrorKind::Internal => "error",
    };
    format!("{}: {}", class, e)
}
