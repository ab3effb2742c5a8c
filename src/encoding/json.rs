//! The JSON encoder: `serde_json` over the response DTOs directly, no
//! intermediate tree-building.

use crate::glob::Match;
use crate::types::{ArchiveMetadata, PointVector};
use serde::Serialize;

#[derive(Serialize)]
struct FindEntry<'a> {
    path: &'a str,
    is_leaf: bool,
}

pub fn encode_find(matches: &[Match]) -> Vec<u8> {
    let entries: Vec<FindEntry<'_>> = matches
        .iter()
        .map(|m| FindEntry {
            path: &m.path,
            is_leaf: m.is_leaf,
        })
        .collect();
    serde_json::to_vec(&entries).expect("FindEntry serialization is infallible")
}

pub fn encode_render(vectors: &[PointVector]) -> Vec<u8> {
    serde_json::to_vec(vectors).expect("PointVector serialization is infallible")
}

pub fn encode_list(names: &[String]) -> Vec<u8> {
    serde_json::to_vec(names).expect("metric name list serialization is infallible")
}

#[derive(Serialize)]
struct InfoResponse<'a> {
    metric: &'a str,
    #[serde(flatten)]
    meta: &'a ArchiveMetadata,
}

pub fn encode_info(metric: &str, meta: &ArchiveMetadata) -> Vec<u8> {
    let response = InfoResponse { metric, meta };
    serde_json::to_vec(&response).expect("InfoResponse serialization is infallible")
}
