//! Component J: the wire encoders selected per request by the `format`
//! form parameter (§4.J, §6).
//!
//! One small encoder lives behind a shared [`Format`] selector, mirroring
//! the teacher's own house style of keeping a formatter next to the thing
//! it formats (`fmt.rs`) rather than behind a heavyweight trait object.

pub mod json;
pub mod pickle;
pub mod protobuf;

use crate::error::ServerError;
use crate::glob::Match;
use crate::types::{ArchiveMetadata, PointVector};

/// The four wire encodings a request may ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Pickle,
    Protobuf,
    Protobuf3,
}

impl Format {
    /// Parses the `format` form parameter. Returns `None` for anything
    /// outside the closed set §4.F requires handlers to validate against.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "json" => Some(Self::Json),
            "pickle" => Some(Self::Pickle),
            "protobuf" => Some(Self::Protobuf),
            "protobuf3" => Some(Self::Protobuf3),
            _ => None,
        }
    }

    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Pickle => "application/pickle",
            Self::Protobuf | Self::Protobuf3 => "application/x-protobuf",
        }
    }
}

/// Encodes a `/metrics/find/` response body. `now` feeds the pickle
/// encoder's `IntervalSet{start=0, end=now+60}` compatibility shim (§6).
pub fn encode_find(format: Format, now: i64, matches: &[Match]) -> Result<Vec<u8>, ServerError> {
    match format {
        Format::Json => Ok(json::encode_find(matches)),
        Format::Pickle => Ok(pickle::encode_find(now, matches)),
        Format::Protobuf | Format::Protobuf3 => protobuf::encode_find(matches),
    }
}

/// Encodes a `/render/` response body: one `PointVector` per matched leaf.
pub fn encode_render(format: Format, vectors: &[PointVector]) -> Result<Vec<u8>, ServerError> {
    match format {
        Format::Json => Ok(json::encode_render(vectors)),
        Format::Pickle => Ok(pickle::encode_render(vectors)),
        Format::Protobuf => protobuf::encode_render(vectors, protobuf::SchemaVersion::V2),
        Format::Protobuf3 => protobuf::encode_render(vectors, protobuf::SchemaVersion::V3),
    }
}

/// Encodes a `/metrics/list/` response body. Pickle is not an accepted
/// format for this route (§6); callers must reject it before reaching here.
pub fn encode_list(format: Format, names: &[String]) -> Result<Vec<u8>, ServerError> {
    match format {
        Format::Json => Ok(json::encode_list(names)),
        Format::Pickle => Err(ServerError::BadRequest("pickle is not supported for metrics/list".into())),
        Format::Protobuf | Format::Protobuf3 => protobuf::encode_list(names),
    }
}

/// Encodes an `/info/` response body for one metric's retention schema.
pub fn encode_info(format: Format, metric: &str, meta: &ArchiveMetadata) -> Result<Vec<u8>, ServerError> {
    match format {
        Format::Json => Ok(json::encode_info(metric, meta)),
        Format::Pickle => Err(ServerError::BadRequest("pickle is not supported for info".into())),
        Format::Protobuf | Format::Protobuf3 => protobuf::encode_info(metric, meta),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_exactly_the_closed_set() {
        assert_eq!(Format::parse("json"), Some(Format::Json));
        assert_eq!(Format::parse("pickle"), Some(Format::Pickle));
        assert_eq!(Format::parse("protobuf"), Some(Format::Protobuf));
        assert_eq!(Format::parse("protobuf3"), Some(Format::Protobuf3));
        assert_eq!(Format::parse("xml"), None);
    }

    #[test]
    fn list_rejects_pickle() {
        let err = encode_list(Format::Pickle, &[]).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}
