use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use anyhow::Context;
use axum::{
    Json,
    Router,
    body::{
        Body,
        to_bytes,
    },
    extract::{
        ConnectInfo,
        State,
    },
    http::{
        HeaderName,
        HeaderValue,
        Method,
        Request,
        StatusCode,
        header,
    },
    response::{
        IntoResponse,
        Response,
    },
    routing::{any, get},
};
use bytes::Bytes;
use http_body_util::LengthLimitError;
use uuid::Uuid;

use crate::{
    config::{NETLIFY_ROUTE, RateLimitBackendConfig, ServiceConfig},
    context::RequestContext,
    error::{ServiceError, ServiceResult},
    metrics::MetricsRegistry,
    models::{ExecutionResult, RunRequest},
    ratelimit::{
        RateLimitBackend,
        RateLimiter,
        SlidingWindowPolicy,
        in_memory::InMemoryRateLimitBackend,
        redis_backend::RedisRateLimitBackend,
    },
    sandbox::{ProcessSandbox, SandboxBackend},
    validation,
};

/// The run-code endpoint: validate, rate-limit, execute, respond.
pub struct RunCodeService {
    sandbox: Arc<dyn SandboxBackend>,
    limiter: Option<RateLimiter>,
    fail_open_on_error: bool,
    metrics: Arc<MetricsRegistry>,
    max_code_size: usize,
    max_body_bytes: usize,
    development: bool,
}

impl RunCodeService {
    pub async fn from_config(config: &ServiceConfig) -> anyhow::Result<Self> {
        let limiter = if config.rate_limit.enabled {
            let backend: Arc<dyn RateLimitBackend> = match &config.rate_limit.backend {
                RateLimitBackendConfig::InMemory => Arc::new(InMemoryRateLimitBackend::new()),
                RateLimitBackendConfig::Redis { url, key_prefix } => Arc::new(
                    RedisRateLimitBackend::new(url.clone(), key_prefix.clone())
                        .await
                        .context("redis rate limit backend init failed")?,
                ),
            };
            Some(RateLimiter::new(backend, policy_from(config)))
        } else {
            None
        };

        let sandbox: Arc<dyn SandboxBackend> = Arc::new(ProcessSandbox::from_config(config));
        Ok(Self::new(config, sandbox, limiter))
    }

    pub fn new(
        config: &ServiceConfig,
        sandbox: Arc<dyn SandboxBackend>,
        limiter: Option<RateLimiter>,
    ) -> Self {
        Self {
            sandbox,
            limiter,
            fail_open_on_error: config.rate_limit.fail_open_on_error,
            metrics: Arc::new(MetricsRegistry::new()),
            max_code_size: config.limits.max_code_size,
            max_body_bytes: config.max_body_bytes,
            development: config.development,
        }
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    pub fn describe(&self) -> String {
        format!(
            "sandbox={} rate_limit={}",
            self.sandbox.name(),
            self.limiter
                .as_ref()
                .map(RateLimiter::backend_name)
                .unwrap_or("disabled")
        )
    }

    pub async fn handle_http(&self, request: Request<Body>, peer_ip: Option<IpAddr>) -> Response {
        let (parts, body) = request.into_parts();
        self.metrics.request();

        let request_id = parts
            .headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if parts.method == Method::OPTIONS {
            let mut response = (StatusCode::OK, Body::empty()).into_response();
            self.finalize(&request_id, &mut response);
            return response;
        }

        if parts.method != Method::POST {
            let mut response = self.reject(&request_id, ServiceError::MethodNotAllowed);
            self.finalize(&request_id, &mut response);
            return response;
        }

        let body = match to_bytes(body, self.max_body_bytes).await {
            Ok(body) => body,
            Err(err) => {
                let mut response = self.reject(&request_id, body_read_error(&request_id, err));
                self.finalize(&request_id, &mut response);
                return response;
            }
        };

        let ctx = RequestContext::new(request_id, parts.headers, body, peer_ip);
        tracing::info!(
            request_id = %ctx.request_id,
            client = %ctx.client_key(),
            body_bytes = ctx.body.len(),
            "incoming run request"
        );

        let mut response = match self.run(&ctx).await {
            Ok(result) => {
                tracing::info!(
                    request_id = %ctx.request_id,
                    status = ?result.status,
                    execution_time_ms = result.execution_time,
                    latency_ms = ctx.started_at.elapsed().as_millis() as u64,
                    "run request completed"
                );
                (StatusCode::OK, Json(result)).into_response()
            }
            Err(err) => self.reject(&ctx.request_id, err),
        };
        self.finalize(&ctx.request_id, &mut response);
        response
    }

    async fn run(&self, ctx: &RequestContext) -> ServiceResult<ExecutionResult> {
        let raw = parse_body(&ctx.body)?;
        let request = validation::validate(&raw, self.max_code_size)?;
        self.enforce_rate_limit(ctx).await?;

        let report = {
            let _in_flight = self.metrics.in_flight();
            self.sandbox.execute(&request).await
        };
        if let Ok(report) = &report {
            self.metrics.outcome(report.outcome);
        }

        let report = report.map_err(|err| {
            tracing::error!(
                request_id = %ctx.request_id,
                language = %request.language,
                error = %format!("{err:#}"),
                "code execution failed"
            );
            ServiceError::internal(format!("{err:#}"), self.development)
        })?;

        tracing::debug!(
            request_id = %ctx.request_id,
            language = %request.language,
            outcome = report.outcome.label(),
            "sandbox finished"
        );
        Ok(report.result)
    }

    async fn enforce_rate_limit(&self, ctx: &RequestContext) -> ServiceResult<()> {
        let Some(limiter) = &self.limiter else {
            return Ok(());
        };

        match limiter.check(&ctx.client_key(), &ctx.request_id).await {
            Ok(decision) if decision.allowed => {
                tracing::debug!(
                    request_id = %ctx.request_id,
                    remaining = decision.remaining,
                    "rate limit check passed"
                );
                Ok(())
            }
            Ok(decision) => Err(ServiceError::RateLimited {
                retry_after_secs: decision.retry_after_secs,
            }),
            Err(err) if self.fail_open_on_error => {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    error = %err,
                    "rate limiter backend failed; allowing request because fail-open is enabled"
                );
                Ok(())
            }
            Err(err) => Err(ServiceError::internal(
                format!("rate limiter backend unavailable: {err:#}"),
                self.development,
            )),
        }
    }

    fn reject(&self, request_id: &str, err: ServiceError) -> Response {
        match &err {
            ServiceError::InvalidInput(_) | ServiceError::SecurityViolation => {
                self.metrics.rejected()
            }
            ServiceError::RateLimited { .. } => self.metrics.rate_limited(),
            ServiceError::Internal { .. } => self.metrics.internal_error(),
            ServiceError::MethodNotAllowed => {}
        }
        tracing::warn!(
            request_id = %request_id,
            error = err.code(),
            status = %err.status(),
            "run request rejected"
        );
        err.into_response()
    }

    fn finalize(&self, request_id: &str, response: &mut Response) {
        let headers = response.headers_mut();
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("POST, OPTIONS"),
        );
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(
            HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        );
        if let Ok(value) = HeaderValue::from_str(request_id) {
            headers.insert(HeaderName::from_static("x-request-id"), value);
        }
    }
}

fn policy_from(config: &ServiceConfig) -> SlidingWindowPolicy {
    SlidingWindowPolicy {
        window: std::time::Duration::from_secs(config.rate_limit.window_seconds),
        max_requests: config.rate_limit.max_requests,
    }
}

fn body_read_error(request_id: &str, err: axum::Error) -> ServiceError {
    let over_limit = std::error::Error::source(&err)
        .is_some_and(|source| source.is::<LengthLimitError>());
    if over_limit {
        return ServiceError::InvalidInput("Request body too large".to_string());
    }
    tracing::warn!(request_id = %request_id, error = %err, "failed to read request body");
    ServiceError::InvalidInput("Failed to read request body".to_string())
}

// An empty body reads as `{}` so it fails on the missing code, not on syntax.
fn parse_body(body: &Bytes) -> ServiceResult<RunRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(RunRequest::default());
    }
    serde_json::from_slice(body).map_err(|err| {
        tracing::debug!(error = %err, "request body is not valid JSON");
        ServiceError::InvalidInput("Invalid JSON in request body".to_string())
    })
}

pub fn router(service: Arc<RunCodeService>, route: &str) -> Router {
    let mut app = Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(metrics))
        .route(route, any(run_code));
    if route != NETLIFY_ROUTE {
        app = app.route(NETLIFY_ROUTE, any(run_code));
    }
    app.with_state(service)
}

async fn run_code(
    State(service): State<Arc<RunCodeService>>,
    request: Request<Body>,
) -> Response {
    let peer_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    service.handle_http(request, peer_ip).await
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

async fn metrics(State(service): State<Arc<RunCodeService>>) -> (StatusCode, String) {
    (StatusCode::OK, service.metrics().render_prometheus())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::{
        models::{ExecutionRequest, ExecutionStatus},
        ratelimit::RateLimitDecision,
        sandbox::{ExecutionOutcome, ExecutionReport},
    };

    const ROUTE: &str = "/api/run-code";

    #[derive(Default)]
    struct RecordingSandbox {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl SandboxBackend for RecordingSandbox {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn execute(&self, request: &ExecutionRequest) -> anyhow::Result<ExecutionReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("workspace root is read-only");
            }
            let failed = request.code.contains("exit(1)");
            Ok(ExecutionReport {
                result: ExecutionResult {
                    status: if failed { ExecutionStatus::Error } else { ExecutionStatus::Success },
                    stdout: format!("ran {}\n", request.language),
                    stderr: String::new(),
                    execution_time: 3,
                    error: failed.then(|| "Process exited with code 1".to_string()),
                },
                outcome: ExecutionOutcome::Exited {
                    code: if failed { 1 } else { 0 },
                },
            })
        }
    }

    struct StuckSandbox;

    #[async_trait]
    impl SandboxBackend for StuckSandbox {
        fn name(&self) -> &'static str {
            "stuck"
        }

        async fn execute(&self, _request: &ExecutionRequest) -> anyhow::Result<ExecutionReport> {
            std::future::pending().await
        }
    }

    struct BrokenBackend;

    #[async_trait]
    impl RateLimitBackend for BrokenBackend {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn check(
            &self,
            _key: &str,
            _policy: &SlidingWindowPolicy,
            _request_id: &str,
        ) -> anyhow::Result<RateLimitDecision> {
            anyhow::bail!("connection refused")
        }
    }

    fn config(pairs: &[(&str, &str)]) -> ServiceConfig {
        let pairs: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServiceConfig::from_lookup(|key| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        })
        .unwrap()
    }

    fn memory_limiter(cfg: &ServiceConfig) -> Option<RateLimiter> {
        Some(RateLimiter::new(
            Arc::new(InMemoryRateLimitBackend::new()),
            policy_from(cfg),
        ))
    }

    fn app_with(
        cfg: &ServiceConfig,
        sandbox: Arc<RecordingSandbox>,
        limiter: Option<RateLimiter>,
    ) -> Router {
        router(Arc::new(RunCodeService::new(cfg, sandbox, limiter)), ROUTE)
    }

    fn app(sandbox: Arc<RecordingSandbox>) -> Router {
        let cfg = config(&[]);
        let limiter = memory_limiter(&cfg);
        app_with(&cfg, sandbox, limiter)
    }

    fn post(body: Value, client: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(ROUTE)
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", client)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Response, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let (parts, body) = response.into_parts();
        let bytes = to_bytes(body, usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, Response::from_parts(parts, Body::empty()), value)
    }

    fn assert_cors(response: &Response) {
        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "POST, OPTIONS");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type");
    }

    #[tokio::test]
    async fn executes_valid_request() {
        let sandbox = Arc::new(RecordingSandbox::default());
        let app = app(sandbox.clone());

        let (status, response, body) = send(
            &app,
            post(json!({"code": "print('hi')", "language": "python", "input": ""}), "1.1.1.1"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_cors(&response);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(
            body,
            json!({
                "status": "success",
                "stdout": "ran python\n",
                "stderr": "",
                "executionTime": 3,
                "error": null,
            })
        );
        assert_eq!(sandbox.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_user_code_is_still_http_ok() {
        let app = app(Arc::new(RecordingSandbox::default()));
        let (status, _, body) = send(
            &app,
            post(json!({"code": "sys.exit(1)", "language": "python"}), "1.1.1.1"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "error");
        assert_eq!(body["error"], "Process exited with code 1");
    }

    #[tokio::test]
    async fn preflight_short_circuits_without_consuming_quota() {
        let sandbox = Arc::new(RecordingSandbox::default());
        let app = app(sandbox.clone());

        for _ in 0..15 {
            let request = Request::builder()
                .method(Method::OPTIONS)
                .uri(ROUTE)
                .header("x-forwarded-for", "2.2.2.2")
                .body(Body::empty())
                .unwrap();
            let (status, response, body) = send(&app, request).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, Value::Null);
            assert_cors(&response);
        }

        for _ in 0..10 {
            let (status, _, _) = send(
                &app,
                post(json!({"code": "1", "language": "python"}), "2.2.2.2"),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }
        assert_eq!(sandbox.calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn other_methods_are_rejected() {
        let app = app(Arc::new(RecordingSandbox::default()));
        let request = Request::builder()
            .method(Method::GET)
            .uri(ROUTE)
            .body(Body::empty())
            .unwrap();
        let (status, response, body) = send(&app, request).await;

        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body, json!({"error": "Method not allowed"}));
        assert_cors(&response);
    }

    #[tokio::test]
    async fn bad_requests_never_reach_the_sandbox() {
        let sandbox = Arc::new(RecordingSandbox::default());
        let app = app(sandbox.clone());

        let malformed = Request::builder()
            .method(Method::POST)
            .uri(ROUTE)
            .body(Body::from("{\"code\": "))
            .unwrap();
        let (status, _, body) = send(&app, malformed).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid JSON in request body");

        let empty = Request::builder()
            .method(Method::POST)
            .uri(ROUTE)
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&app, empty).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Code is required and must be a string");

        let oversized = "a".repeat(50 * 1024 + 1);
        let (status, _, body) = send(
            &app,
            post(json!({"code": oversized, "language": "javascript"}), "3.3.3.3"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Code size exceeds maximum limit of 51200 characters");

        let (status, _, body) = send(
            &app,
            post(json!({"code": "const fs = require('fs')", "language": "javascript"}), "3.3.3.3"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Code contains potentially dangerous operations");

        let (status, _, _) = send(
            &app,
            post(json!({"code": "puts 1", "language": "ruby"}), "3.3.3.3"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert_eq!(sandbox.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let cfg = config(&[("MAX_BODY_BYTES", "64")]);
        let sandbox = Arc::new(RecordingSandbox::default());
        let app = app_with(&cfg, sandbox.clone(), None);

        let (status, _, body) = send(
            &app,
            post(json!({"code": "x".repeat(100), "language": "python"}), "4.4.4.4"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Request body too large");
        assert_eq!(sandbox.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn body_transport_errors_are_not_reported_as_oversized() {
        let sandbox = Arc::new(RecordingSandbox::default());
        let app = app(sandbox.clone());
        let chunks = vec![
            Ok(Bytes::from_static(b"{\"code\": ")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "peer reset")),
        ];
        let request = Request::builder()
            .method(Method::POST)
            .uri(ROUTE)
            .body(Body::from_stream(futures_util::stream::iter(chunks)))
            .unwrap();

        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Failed to read request body");
        assert_eq!(sandbox.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn abandoned_request_releases_in_flight_slot() {
        let cfg = config(&[]);
        let service = Arc::new(RunCodeService::new(&cfg, Arc::new(StuckSandbox), None));
        let request = post(json!({"code": "print(1)", "language": "python"}), "11.0.0.1");

        let handled = service.handle_http(request, None);
        let abandoned = tokio::time::timeout(std::time::Duration::from_millis(50), handled).await;
        assert!(abandoned.is_err());

        let rendered = service.metrics().render_prometheus();
        assert!(rendered.contains("run_code_executions_in_flight 0\n"));
    }

    #[tokio::test]
    async fn eleventh_request_from_a_client_is_limited() {
        let sandbox = Arc::new(RecordingSandbox::default());
        let app = app(sandbox.clone());
        let valid = json!({"code": "print(1)", "language": "python"});

        for _ in 0..10 {
            let (status, _, _) = send(&app, post(valid.clone(), "5.5.5.5")).await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, response, body) = send(&app, post(valid.clone(), "5.5.5.5")).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"], "Rate limit exceeded. Please try again later.");
        assert!(body["retryAfter"].as_u64().unwrap() > 0);
        assert_cors(&response);

        let (status, _, _) = send(&app, post(valid, "6.6.6.6")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(sandbox.calls.load(Ordering::SeqCst), 11);
    }

    #[tokio::test]
    async fn sandbox_faults_are_internal_errors() {
        let sandbox = Arc::new(RecordingSandbox {
            fail: true,
            ..Default::default()
        });
        let valid = json!({"code": "print(1)", "language": "python"});

        let app = app(sandbox.clone());
        let (status, _, body) = send(&app, post(valid.clone(), "7.7.7.7")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            json!({"error": "Internal server error", "message": "Something went wrong"})
        );

        let dev = config(&[("APP_ENV", "development")]);
        let app = app_with(&dev, sandbox, None);
        let (_, _, body) = send(&app, post(valid, "7.7.7.7")).await;
        assert_eq!(body["message"], "workspace root is read-only");
    }

    #[tokio::test]
    async fn limiter_outage_respects_fail_policy() {
        let valid = json!({"code": "print(1)", "language": "python"});
        let broken = || {
            Some(RateLimiter::new(
                Arc::new(BrokenBackend),
                SlidingWindowPolicy::default(),
            ))
        };

        let closed = config(&[]);
        let app = app_with(&closed, Arc::new(RecordingSandbox::default()), broken());
        let (status, _, _) = send(&app, post(valid.clone(), "8.8.8.8")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let open = config(&[("RATE_LIMIT_FAIL_OPEN", "true")]);
        let app = app_with(&open, Arc::new(RecordingSandbox::default()), broken());
        let (status, _, _) = send(&app, post(valid, "8.8.8.8")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn netlify_path_and_metrics_are_served() {
        let app = app(Arc::new(RecordingSandbox::default()));
        let mut request = post(json!({"code": "print(1)", "language": "python"}), "9.9.9.9");
        *request.uri_mut() = NETLIFY_ROUTE.parse().unwrap();
        let (status, _, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);

        let response = app
            .clone()
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let text = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(text.to_vec()).unwrap();
        assert!(text.contains("run_code_requests_total 1\n"));
        assert!(text.contains("run_code_executions_total{outcome=\"success\"} 1\n"));
    }

    #[tokio::test]
    async fn real_sandbox_reports_missing_runtime_inside_payload() {
        let root = tempfile::tempdir().unwrap();
        let root_path = root.path().display().to_string();
        let cfg = config(&[
            ("WORKSPACE_ROOT", root_path.as_str()),
            ("PYTHON_BIN", "no-such-python"),
            ("MAX_EXECUTION_TIME_MS", "5000"),
        ]);
        let service = RunCodeService::from_config(&cfg).await.unwrap();
        assert_eq!(service.describe(), "sandbox=process rate_limit=memory");
        let app = router(Arc::new(service), ROUTE);

        let (status, _, body) = send(
            &app,
            post(json!({"code": "print(1)", "language": "python"}), "10.0.0.1"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "error");
        assert!(body["error"].as_str().unwrap().starts_with("Failed to start process"));
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }
}
