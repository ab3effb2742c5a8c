//! Protobuf response messages for the `protobuf`/`protobuf3` formats
//! (§4.J). Message structs derive `prost::Message` directly; there is no
//! `build.rs`/`.proto` codegen step since the shapes are small and fixed.
//! `prost` is the ecosystem-standard protobuf crate used throughout the
//! retrieved corpus's larger repos.
//!
//! v2 and v3 differ only in which fields get populated, not in wire
//! mechanics: v2 mirrors the historical schema, which never carried an
//! explicit absent-point flag (consumers inferred absence from a NaN
//! sentinel the transport can't carry, so v2 responses simply omit it);
//! v3 is the full, self-describing shape.

use crate::error::ServerError;
use crate::glob::Match;
use crate::types::{ArchiveMetadata, PointVector};
use prost::Message;

#[derive(Clone, PartialEq, prost::Message)]
pub struct GlobMatchMessage {
    #[prost(string, tag = "1")]
    pub path: String,
    #[prost(bool, tag = "2")]
    pub is_leaf: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GlobResponse {
    #[prost(message, repeated, tag = "1")]
    pub matches: Vec<GlobMatchMessage>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FetchResponse {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(int64, tag = "2")]
    pub start_time: i64,
    #[prost(int64, tag = "3")]
    pub stop_time: i64,
    #[prost(uint32, tag = "4")]
    pub step_time: u32,
    #[prost(double, repeated, tag = "5")]
    pub values: Vec<f64>,
    /// Populated only for [`SchemaVersion::V3`].
    #[prost(bool, repeated, tag = "6")]
    pub is_absent: Vec<bool>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct MultiFetchResponse {
    #[prost(message, repeated, tag = "1")]
    pub series: Vec<FetchResponse>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct MetricsListResponse {
    #[prost(string, repeated, tag = "1")]
    pub metrics: Vec<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct RetentionMessage {
    #[prost(uint32, tag = "1")]
    pub seconds_per_point: u32,
    #[prost(uint32, tag = "2")]
    pub max_retention: u32,
    #[prost(uint32, tag = "3")]
    pub points: u32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct InfoResponse {
    #[prost(string, tag = "1")]
    pub metric: String,
    #[prost(message, repeated, tag = "2")]
    pub retentions: Vec<RetentionMessage>,
    #[prost(uint32, tag = "3")]
    pub aggregation_method: u32,
    #[prost(uint32, tag = "4")]
    pub max_retention: u32,
    #[prost(float, tag = "5")]
    pub x_files_factor: f32,
}

/// Selects which of the two response shapes an assembly function builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    V2,
    V3,
}

fn encode_message(message: &impl Message) -> Result<Vec<u8>, ServerError> {
    let mut buf = Vec::with_capacity(message.encoded_len());
    message
        .encode(&mut buf)
        .map_err(|e| ServerError::UpstreamFormatError(e.to_string()))?;
    Ok(buf)
}

pub fn encode_find(matches: &[Match]) -> Result<Vec<u8>, ServerError> {
    let response = GlobResponse {
        matches: matches
            .iter()
            .map(|m| GlobMatchMessage {
                path: m.path.clone(),
                is_leaf: m.is_leaf,
            })
            .collect(),
    };
    encode_message(&response)
}

pub fn encode_render(vectors: &[PointVector], version: SchemaVersion) -> Result<Vec<u8>, ServerError> {
    let response = MultiFetchResponse {
        series: vectors
            .iter()
            .map(|pv| FetchResponse {
                name: pv.name.clone(),
                start_time: pv.start_time,
                stop_time: pv.stop_time,
                step_time: pv.step_time,
                values: pv.values.clone(),
                is_absent: match version {
                    SchemaVersion::V2 => Vec::new(),
                    SchemaVersion::V3 => pv.is_absent.clone(),
                },
            })
            .collect(),
    };
    encode_message(&response)
}

pub fn encode_list(names: &[String]) -> Result<Vec<u8>, ServerError> {
    let response = MetricsListResponse {
        metrics: names.to_vec(),
    };
    encode_message(&response)
}

pub fn encode_info(metric: &str, meta: &ArchiveMetadata) -> Result<Vec<u8>, ServerError> {
    let response = InfoResponse {
        metric: metric.to_string(),
        retentions: meta
            .retentions
            .iter()
            .map(|r| RetentionMessage {
                seconds_per_point: r.seconds_per_point,
                max_retention: r.max_retention,
                points: r.points,
            })
            .collect(),
        aggregation_method: meta.aggregation_method,
        max_retention: meta.max_retention,
        x_files_factor: meta.x_files_factor,
    };
    encode_message(&response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Retention;

    #[test]
    fn v2_render_omits_is_absent_v3_includes_it() {
        let pv = PointVector {
            name: "m".into(),
            start_time: 0,
            stop_time: 60,
            step_time: 60,
            values: vec![1.0],
            is_absent: vec![false],
        };
        let v2 = encode_render(&[pv.clone()], SchemaVersion::V2).unwrap();
        let v3 = encode_render(&[pv], SchemaVersion::V3).unwrap();
        let decoded_v2 = MultiFetchResponse::decode(v2.as_slice()).unwrap();
        let decoded_v3 = MultiFetchResponse::decode(v3.as_slice()).unwrap();
        assert!(decoded_v2.series[0].is_absent.is_empty());
        assert_eq!(decoded_v3.series[0].is_absent, vec![false]);
    }

    #[test]
    fn find_round_trips_through_encode_decode() {
        let matches = vec![Match {
            path: "servers.web1.cpu".into(),
            is_leaf: true,
        }];
        let bytes = encode_find(&matches).unwrap();
        let decoded = GlobResponse::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded.matches.len(), 1);
        assert_eq!(decoded.matches[0].path, "servers.web1.cpu");
        assert!(decoded.matches[0].is_leaf);
    }

    #[test]
    fn info_carries_every_retention_tier() {
        let meta = ArchiveMetadata {
            retentions: vec![Retention::new(10, 3600, 360), Retention::new(60, 86400, 1440)],
            aggregation_method: 1,
            max_retention: 86400,
            x_files_factor: 0.5,
        };
        let bytes = encode_info("m", &meta).unwrap();
        let decoded = InfoResponse::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded.retentions.len(), 2);
        assert_eq!(decoded.retentions[1].seconds_per_point, 60);
    }
}
