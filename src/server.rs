//! Components F and K: the stateless request handlers and the `axum`
//! HTTP transport that drives them (§4.F, §4.K, §6 "HTTP surface").

use crate::config::Config;
use crate::encoding::{self, Format};
use crate::error::ServerError;
use crate::fetch::{ArchiveOpener, FetchEngine, WhisperOpener};
use crate::glob::GlobExpander;
use crate::hotcache::HotCache;
use crate::index::{Builder, IndexHandle};
use crate::metrics::{Counter, Metrics};
use crate::types::path_to_metric;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, self.to_string()).into_response()
    }
}

/// Everything a request handler needs, shared read-only across the pool.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    index: IndexHandle,
    hot_cache: Arc<dyn HotCache>,
    opener: Arc<dyn ArchiveOpener>,
    metrics: Arc<Metrics>,
}

/// Recovers a panic inside `f`, logging it with the offending metric
/// label and converting it into an internal error rather than letting it
/// take down the request task (§4.F, §7).
fn catch_panic<T>(label: &str, f: impl FnOnce() -> Result<T, ServerError>) -> Result<T, ServerError> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            error!(metric = label, panic = %message, "recovered panic in request handler");
            Err(ServerError::InternalFetchError(format!("internal error handling {label}")))
        }
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn parse_format(raw: Option<&str>, allowed: &[Format]) -> Result<Format, ServerError> {
    let raw = raw.unwrap_or("json");
    let format = Format::parse(raw).ok_or_else(|| ServerError::BadRequest(format!("unsupported format '{raw}'")))?;
    if !allowed.contains(&format) {
        return Err(ServerError::BadRequest(format!("format '{raw}' is not accepted on this route")));
    }
    Ok(format)
}

fn respond(content_type: &'static str, body: Vec<u8>) -> Response {
    ([("content-type", content_type)], body).into_response()
}

#[derive(Debug, Deserialize)]
struct FormatQuery {
    format: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FindQuery {
    query: Option<String>,
    format: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RenderQuery {
    target: Option<String>,
    format: Option<String>,
    from: Option<i64>,
    until: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct InfoQuery {
    target: Option<String>,
    format: Option<String>,
}

async fn metrics_list_handler(State(state): State<AppState>, Query(q): Query<FormatQuery>) -> Response {
    let start = Instant::now();
    let result = catch_panic("metrics/list", || {
        state.metrics.incr(Counter::list_requests);
        let format = parse_format(q.format.as_deref(), &[Format::Json, Format::Protobuf, Format::Protobuf3])?;

        let Some(snapshot) = state.index.load() else {
            state.metrics.incr(Counter::list_errors);
            return Err(ServerError::IndexUnavailable);
        };

        state.metrics.add(Counter::metrics_known, snapshot.known_metric_count);
        let names: Vec<String> = snapshot
            .paths
            .iter()
            .filter(|p| p.ends_with(".wsp"))
            .map(|p| path_to_metric(p))
            .collect();
        state.metrics.add(Counter::metrics_returned, names.len() as u64);

        let body = encoding::encode_list(format, &names).map_err(|e| {
            state.metrics.incr(Counter::list_errors);
            e
        })?;
        Ok(respond(format.content_type(), body))
    });
    state.metrics.record_latency(start.elapsed().as_secs_f64() * 1000.0);
    response_or_error(result)
}

async fn metrics_find_handler(State(state): State<AppState>, Query(q): Query<FindQuery>) -> Response {
    let start = Instant::now();
    let result = catch_panic("metrics/find", || {
        state.metrics.incr(Counter::find_requests);
        let format = parse_format(
            q.format.as_deref(),
            &[Format::Json, Format::Pickle, Format::Protobuf, Format::Protobuf3],
        )?;
        let query = q.query.ok_or_else(|| ServerError::BadRequest("missing required form value 'query'".into()))?;

        let snapshot = state.index.load();
        let expander = GlobExpander::new(&state.config.data_root, state.config.max_globs);
        let matches = expander.expand(&query, snapshot.as_deref());

        if matches.is_empty() {
            state.metrics.incr(Counter::find_zero);
        }
        state.metrics.add(Counter::metrics_found, matches.len() as u64);

        let body = encoding::encode_find(format, now_unix(), &matches).map_err(|e| {
            state.metrics.incr(Counter::find_errors);
            e
        })?;
        Ok(respond(format.content_type(), body))
    });
    state.metrics.record_latency(start.elapsed().as_secs_f64() * 1000.0);
    response_or_error(result)
}

async fn render_handler(State(state): State<AppState>, Query(q): Query<RenderQuery>) -> Response {
    let start = Instant::now();
    let result = catch_panic("render", || {
        state.metrics.incr(Counter::render_requests);
        let format = parse_format(
            q.format.as_deref(),
            &[Format::Json, Format::Pickle, Format::Protobuf, Format::Protobuf3],
        )?;
        let target = q.target.ok_or_else(|| ServerError::BadRequest("missing required form value 'target'".into()))?;
        let from = q.from.ok_or_else(|| ServerError::BadRequest("missing required form value 'from'".into()))?;
        let until = q.until.ok_or_else(|| ServerError::BadRequest("missing required form value 'until'".into()))?;

        let snapshot = state.index.load();
        let engine = FetchEngine::new(
            &state.config.data_root,
            state.opener.as_ref(),
            state.hot_cache.as_ref(),
            &state.metrics,
        );
        let vectors = engine.fetch_many(&target, from, until, now_unix(), snapshot.as_deref(), state.config.max_globs);

        let body = encoding::encode_render(format, &vectors).map_err(|e| {
            state.metrics.incr(Counter::render_errors);
            e
        })?;
        state.metrics.add(Counter::fetch_size_bytes, body.len() as u64);
        Ok(respond(format.content_type(), body))
    });
    state.metrics.record_latency(start.elapsed().as_secs_f64() * 1000.0);
    response_or_error(result)
}

async fn info_handler(State(state): State<AppState>, Query(q): Query<InfoQuery>) -> Response {
    let start = Instant::now();
    let result = catch_panic("info", || {
        let format = parse_format(q.format.as_deref(), &[Format::Json, Format::Protobuf, Format::Protobuf3])?;
        let target = q.target.ok_or_else(|| ServerError::BadRequest("missing required form value 'target'".into()))?;

        let relative = crate::types::metric_to_wsp_path(&target);
        let path = crate::security::validate_metric_path(&state.config.data_root, &relative)
            .map_err(|e| ServerError::BadRequest(e.to_string()))?;
        let archive = state.opener.open(&path)?;

        let body = encoding::encode_info(format, &target, archive.metadata())?;
        Ok(respond(format.content_type(), body))
    });
    state.metrics.record_latency(start.elapsed().as_secs_f64() * 1000.0);
    response_or_error(result)
}

async fn robots_handler() -> Response {
    ([("content-type", "text/plain")], "User-agent: *\nDisallow: /\n").into_response()
}

fn response_or_error(result: Result<Response, ServerError>) -> Response {
    match result {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

fn router(state: AppState) -> Router {
    // `axum::serve`'s accept loop does not expose separate read/write/idle
    // phases the way a hand-rolled hyper server would; the single
    // `TimeoutLayer` bounds whichever of the three configured deadlines is
    // longest, so no request can run past the most permissive one.
    let request_timeout = state
        .config
        .read_timeout
        .max(state.config.write_timeout)
        .max(state.config.idle_timeout);
    Router::new()
        .route("/metrics/list/", get(metrics_list_handler))
        .route("/metrics/find/", get(metrics_find_handler))
        .route("/render/", get(render_handler))
        .route("/info/", get(info_handler))
        .route("/robots.txt", get(robots_handler))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Starts the index builder (if `scan_frequency` is nonzero) and serves
/// HTTP until a shutdown signal arrives, then lets in-flight requests
/// finish (§4.K, §5 "Cancellation and timeouts").
pub async fn run(config: Config) -> anyhow::Result<()> {
    let config = Arc::new(config);
    let (builder, index) = Builder::new(config.data_root.clone());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let builder_task = if config.builder_enabled() {
        let scan_frequency = config.scan_frequency;
        let shutdown_rx = shutdown_rx.clone();
        Some(tokio::spawn(builder.run(scan_frequency, shutdown_rx)))
    } else {
        info!("scan_frequency is zero; index builder disabled, falling back to filesystem globbing");
        None
    };

    let state = AppState {
        config: Arc::clone(&config),
        index,
        hot_cache: Arc::new(crate::hotcache::EmptyHotCache),
        opener: Arc::new(WhisperOpener),
        metrics: Arc::new(Metrics::new(config.buckets, config.metrics_as_counters)),
    };

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    if let Some(task) = builder_task {
        let _ = task.await;
    }
    Ok(())
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received, draining in-flight requests");
    let _ = shutdown_tx.send(true);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn parse_format_rejects_unlisted_formats() {
        let err = parse_format(Some("xml"), &[Format::Json]).unwrap_err();
        assert!(matches!(err, ServerError::BadRequest(_)));
    }

    #[test]
    fn parse_format_rejects_formats_not_allowed_on_the_route() {
        let err = parse_format(Some("pickle"), &[Format::Json, Format::Protobuf]).unwrap_err();
        assert!(matches!(err, ServerError::BadRequest(_)));
    }

    #[test]
    fn parse_format_defaults_to_json() {
        let format = parse_format(None, &[Format::Json]).unwrap();
        assert_eq!(format, Format::Json);
    }

    #[test]
    fn catch_panic_converts_a_panicking_handler_into_an_internal_error() {
        let result: Result<(), ServerError> = catch_panic("test.metric", || panic!("boom"));
        assert!(matches!(result, Err(ServerError::InternalFetchError(_))));
    }

    fn test_state() -> AppState {
        let (_builder, index) = Builder::new(PathBuf::from("/tmp/wspserve-test-nonexistent"));
        AppState {
            config: Arc::new(Config {
                data_root: PathBuf::from("/tmp/wspserve-test-nonexistent"),
                max_globs: 1000,
                buckets: 10,
                scan_frequency: std::time::Duration::from_secs(60),
                read_timeout: std::time::Duration::from_secs(30),
                idle_timeout: std::time::Duration::from_secs(60),
                write_timeout: std::time::Duration::from_secs(30),
                metrics_as_counters: crate::metrics::CounterMode::Cumulative,
                bind_addr: "127.0.0.1:0".parse().unwrap(),
                log_filter: "info".to_string(),
            }),
            index,
            hot_cache: Arc::new(crate::hotcache::EmptyHotCache),
            opener: Arc::new(WhisperOpener),
            metrics: Arc::new(Metrics::new(10, crate::metrics::CounterMode::Cumulative)),
        }
    }

    // Regression test: every handler must record a latency sample even when
    // it returns an error, or the histogram/`requests_in_*` surface (§4.G)
    // stays permanently empty.
    #[tokio::test]
    async fn metrics_list_handler_records_a_latency_sample_even_on_error() {
        let state = test_state();
        let before: u64 = state.metrics.histogram_snapshot().iter().map(|(_, _, c)| c).sum();

        let _ = metrics_list_handler(State(state.clone()), Query(FormatQuery { format: None })).await;

        let after: u64 = state.metrics.histogram_snapshot().iter().map(|(_, _, c)| c).sum();
        assert_eq!(after, before + 1);
    }
}
