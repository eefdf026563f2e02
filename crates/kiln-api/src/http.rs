use std::{sync::Arc, time::Instant};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Request, State, rejection::BytesRejection},
    http::{HeaderValue, Method, Uri, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use kiln_core::SessionToken;
use kiln_model::{ENV_PATH, EnvDeleteRequest, EnvUpdateRequestPayload};
use serde::de::DeserializeOwned;
use serde_json::from_slice;
use tracing::{debug, warn};

use crate::{error::ApiError, handler::ApiHandler};

/// HTTP API service builder.
pub struct HttpApi<H> {
    handler: Arc<H>,
    token: Arc<SessionToken>,
    debug: bool,
}

impl<H> HttpApi<H>
where
    H: ApiHandler,
{
    /// Create new HTTP API with the given handler, guarded by `token`.
    pub fn new(handler: Arc<H>, token: SessionToken) -> Self {
        Self {
            handler,
            token: Arc::new(token),
            debug: false,
        }
    }

    /// Log one line per request at debug level.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Build axum router with mounted endpoints.
    ///
    /// Routes:
    /// - GET /api/current-job/v0/env - Read the job environment
    /// - PATCH /api/current-job/v0/env - Set variables
    /// - DELETE /api/current-job/v0/env - Remove variables
    ///
    /// Authentication wraps every route and the fallbacks, so an unauthenticated caller gets 403 whatever it asks for, before any body is read.
    ///
    /// axum answers HEAD with the GET handler unless HEAD has its own route.
    pub fn router(self) -> Router {
        let env = get(get_env::<H>)
            .head(unsupported_method)
            .patch(update_env::<H>)
            .delete(delete_env::<H>)
            .fallback(unsupported_method);

        let router = Router::new()
            .route(ENV_PATH, env)
            .fallback(not_found)
            .with_state(self.handler)
            .layer(middleware::from_fn_with_state(self.token, require_bearer))
            .layer(middleware::map_response(json_content_type));

        if self.debug {
            router.layer(middleware::from_fn(log_request))
        } else {
            router
        }
    }
}

// ============================================================================
// Middleware
// ============================================================================

async fn require_bearer(
    State(token): State<Arc<SessionToken>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let authorized = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| token.verify_bearer(v));

    if !authorized {
        warn!(
            target: "kiln.api",
            method = %req.method(),
            path = %req.uri().path(),
            "rejected request with invalid credentials"
        );
        return Err(ApiError::Unauthorized);
    }
    Ok(next.run(req).await)
}

async fn json_content_type(mut res: Response) -> Response {
    res.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    res
}

async fn log_request(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let started = Instant::now();

    let res = next.run(req).await;

    debug!(
        target: "kiln.api",
        %method,
        %path,
        status = res.status().as_u16(),
        elapsed_us = started.elapsed().as_micros() as u64,
        "job api request"
    );
    res
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/current-job/v0/env
async fn get_env<H>(State(handler): State<Arc<H>>) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let response = handler.get_env().await?;
    Ok(Json(response))
}

/// PATCH /api/current-job/v0/env
async fn update_env<H>(
    State(handler): State<Arc<H>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let req: EnvUpdateRequestPayload = decode(body)?;
    let response = handler.update_env(req).await?;
    Ok(Json(response))
}

/// DELETE /api/current-job/v0/env
async fn delete_env<H>(
    State(handler): State<Arc<H>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let req: EnvDeleteRequest = decode(body)?;
    let response = handler.delete_env(req).await?;
    Ok(Json(response))
}

async fn unsupported_method(method: Method) -> ApiError {
    ApiError::UnsupportedMethod(method.to_string())
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(uri.path().to_owned())
}

/// Decode a JSON body; any failure, including one while buffering it, is the caller's fault.
fn decode<T: DeserializeOwned>(body: Result<Bytes, BytesRejection>) -> Result<T, ApiError> {
    let body = body.map_err(|e| ApiError::MalformedBody(e.body_text()))?;
    from_slice(&body).map_err(|e| ApiError::MalformedBody(e.to_string()))
}
