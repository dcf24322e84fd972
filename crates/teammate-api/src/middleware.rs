use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::state::AppState;

pub const SECRET_HEADER: &str = "X-Telegram-Bot-Api-Secret-Token";

/// Rejects webhook calls that do not carry the configured secret token.
pub async fn require_webhook_secret(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = state.webhook_secret.as_deref() else {
        return Ok(next.run(req).await);
    };

    let provided = req
        .headers()
        .get(SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if provided != expected {
        warn!("Webhook call with wrong secret token rejected");
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use axum::{Router, body::Body, middleware, routing::post};
    use tower::ServiceExt;

    use super::*;
    use crate::state::test_support;

    fn app(secret: Option<&str>) -> Router {
        let state = test_support::state(secret);
        Router::new()
            .route("/webhook", post(|| async { StatusCode::OK }))
            .layer(middleware::from_fn_with_state(state.clone(), require_webhook_secret))
            .with_state(state)
    }

    fn request(token: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().method("POST").uri("/webhook");
        if let Some(token) = token {
            builder = builder.header(SECRET_HEADER, token);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn accepts_matching_secret() {
        let response = app(Some("s3cret")).oneshot(request(Some("s3cret"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn rejects_missing_or_wrong_secret() {
        let response = app(Some("s3cret")).oneshot(request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app(Some("s3cret")).oneshot(request(Some("guess"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn open_when_no_secret_configured() {
        let response = app(None).oneshot(request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
