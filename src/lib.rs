//! wspserve: a read-only HTTP query frontend over a tree of fixed-schema
//! time-series files.
//!
//! Serves metric discovery (glob expansion and full listing), metadata
//! lookup (per-metric retention schema), and windowed point fetch (disk
//! samples merged with a hot write buffer) behind a small HTTP surface.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 axum HTTP server              │
//! │   /metrics/list/  /metrics/find/  /render/    │
//! │           /info/          /robots.txt         │
//! └───────────────────┬────────────────────────────┘
//!                     │
//! ┌───────────────────▼────────────────────────────┐
//! │              request handlers (F)               │
//! └──────┬─────────────────────────────┬────────────┘
//!        │                             │
//! ┌──────▼──────┐              ┌───────▼───────┐
//! │ glob expander│              │ fetch engine  │
//! │  (A, B)      │              │    (E)        │
//! └──────┬──────┘              └───┬───────┬───┘
//!        │                          │       │
//! ┌──────▼──────┐           ┌───────▼──┐ ┌──▼─────────┐
//! │ path index   │           │ archive  │ │ hot cache  │
//! │  (C, D)      │           │ file (H) │ │    (I)     │
//! └─────────────┘            └──────────┘ └────────────┘
//! ```

pub mod archive;
pub mod config;
pub mod encoding;
pub mod error;
pub mod fetch;
pub mod glob;
pub mod hotcache;
pub mod index;
pub mod metrics;
pub mod security;
pub mod server;
pub mod trigram;
pub mod types;

pub use error::{FetchError, ServerError};
