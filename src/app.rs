use std::net::SocketAddr;
use axum::{middleware, Router, routing::get};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use crate::config::Environment;
use crate::error::expose_error_details;
use crate::state::AppState;
use crate::{auth, bookings, reviews, tours, users};

pub fn build_app(state: AppState) -> Router {
    let environment = state.config.environment;
    let api = Router::new()
        .nest("/api/v1",
              Router::new()
                  .merge(auth::router())
                  .merge(users::router())
                  .merge(tours::router())
                  .merge(reviews::router())
                  .merge(bookings::router())
                  .route("/health", get(|| async { "ok" }))
        )
        .with_state(state);

    error_rendering(api, environment)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

/// Unexpected errors keep their generic body outside development.
fn error_rendering(router: Router, environment: Environment) -> Router {
    if environment.is_development() {
        router.layer(middleware::map_response(expose_error_details))
    } else {
        router
    }
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
        .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use crate::error::AppError;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        build_app(AppState::fake())
    }

    async fn body_json(resp: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_with_token(uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn health_is_public() {
        let resp = app()
            .oneshot(Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn protected_route_without_token_is_401() {
        let resp = app()
            .oneshot(Request::builder().uri("/api/v1/users/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(resp).await;
        assert_eq!(body["status"], "fail");
        assert_eq!(
            body["message"],
            "You are not logged in! Please log in to get access."
        );
    }

    #[tokio::test]
    async fn signup_then_me_with_bearer_and_cookie() {
        let app = app();
        let resp = app
            .clone()
            .oneshot(post_json(
                "/api/v1/users/signup",
                json!({
                    "name": "Leo Gillespie",
                    "email": "leo@example.com",
                    "password": "pass1234",
                    "passwordConfirm": "pass1234",
                    "role": "admin"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let cookie = resp.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
        assert!(cookie.contains("HttpOnly"));
        let body = body_json(resp).await;
        assert_eq!(body["data"]["user"]["role"], "user");
        assert!(body["data"]["user"].get("passwordHash").is_none());
        let token = body["token"].as_str().unwrap().to_string();

        let resp = app
            .clone()
            .oneshot(get_with_token("/api/v1/users/me", &token))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["data"]["user"]["email"], "leo@example.com");

        let jwt_pair = cookie.split(';').next().unwrap().to_string();
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/users/me")
                    .header(header::COOKIE, jwt_pair)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn wrong_role_is_forbidden() {
        let app = app();
        let resp = app
            .clone()
            .oneshot(post_json(
                "/api/v1/users/signup",
                json!({
                    "name": "Plain User",
                    "email": "plain@example.com",
                    "password": "pass1234",
                    "passwordConfirm": "pass1234"
                }),
            ))
            .await
            .unwrap();
        let token = body_json(resp).await["token"].as_str().unwrap().to_string();

        for uri in ["/api/v1/tours/monthly-plan/2021", "/api/v1/users", "/api/v1/bookings"] {
            let resp = app.clone().oneshot(get_with_token(uri, &token)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::FORBIDDEN, "{uri}");
        }
    }

    #[tokio::test]
    async fn malformed_id_is_rejected_before_lookup() {
        let resp = app()
            .oneshot(Request::builder().uri("/api/v1/tours/not-a-uuid").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn logout_overwrites_cookie() {
        let resp = app()
            .oneshot(Request::builder().uri("/api/v1/users/logout").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let cookie = resp.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("jwt=loggedout;"));
    }

    #[tokio::test]
    async fn bad_login_is_generic_401() {
        let resp = app()
            .oneshot(post_json(
                "/api/v1/users/login",
                json!({ "email": "ghost@example.com", "password": "whatever1" }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(resp).await["message"], "Incorrect email or password");
    }

    #[tokio::test]
    async fn malformed_body_gets_the_error_envelope() {
        let resp = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/users/login")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{bad"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            resp.headers()[header::CONTENT_TYPE].to_str().unwrap(),
            "application/json"
        );
        let body = body_json(resp).await;
        assert_eq!(body["status"], "fail");
        assert!(body["message"]
            .as_str()
            .unwrap()
            .starts_with("Invalid input data."));
    }

    fn failing_router(environment: Environment) -> Router {
        let router = Router::new().route(
            "/boom",
            get(|| async { Err::<&'static str, _>(AppError::Internal(anyhow::anyhow!("pool exhausted"))) }),
        );
        error_rendering(router, environment)
    }

    async fn boom(environment: Environment) -> Value {
        let resp = failing_router(environment)
            .oneshot(Request::builder().uri("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        body_json(resp).await
    }

    #[tokio::test]
    async fn production_hides_unexpected_errors() {
        let body = boom(Environment::Production).await;
        assert_eq!(body["message"], "Something went very wrong!");
        assert!(body.get("stack").is_none());
    }

    #[tokio::test]
    async fn development_shows_unexpected_errors() {
        let body = boom(Environment::Development).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "pool exhausted");
        assert!(body.get("stack").is_some());
    }
}
