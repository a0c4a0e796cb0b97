use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};

use crate::{
    auth::{
        dto::{CredentialsRequest, MeResponse, PublicUser, SignupParams, TokenResponse},
        extract::{ValidJson, ValidQuery},
        jwt::{AdminUser, AuthUser},
        services::SignupKind,
    },
    error::AuthError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/user/signup", post(signup))
        .route("/authenticate", post(authenticate))
        .route("/me", get(me))
}

pub fn welcome_routes() -> Router<AppState> {
    Router::new()
        .route("/user", get(|| async { "Welcome to the website !" }))
        .route("/user/userLogin", get(user_login))
        .route("/user/adminLogin", get(admin_login))
}

#[instrument(skip(state, params, payload))]
pub async fn signup(
    State(state): State<AppState>,
    ValidQuery(params): ValidQuery<SignupParams>,
    ValidJson(payload): ValidJson<CredentialsRequest>,
) -> Result<(StatusCode, Json<PublicUser>), AuthError> {
    let kind = match params.secret.as_deref() {
        Some(secret) => SignupKind::Admin { secret },
        None => SignupKind::User,
    };
    let user = state
        .auth
        .signup(&payload.email, &payload.password, kind)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(user.into())))
}

#[instrument(skip(state, payload))]
pub async fn authenticate(
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<CredentialsRequest>,
) -> Result<Json<TokenResponse>, AuthError> {
    let issued = state
        .auth
        .authenticate(&payload.email, &payload.password)
        .await?;
    Ok(Json(TokenResponse {
        token: issued.token,
        token_type: "Bearer",
        expires_at: issued.expires_at,
    }))
}

#[instrument(skip_all)]
pub async fn me(AuthUser(claims): AuthUser) -> Json<MeResponse> {
    Json(MeResponse {
        email: claims.sub,
        role: claims.role,
    })
}

async fn user_login(AuthUser(claims): AuthUser) -> &'static str {
    info!(email = %claims.sub, "user welcome");
    "Welcome User!"
}

async fn admin_login(AdminUser(claims): AdminUser) -> &'static str {
    info!(email = %claims.sub, "admin welcome");
    "Welcome Admin !"
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request},
        response::Response,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::{app::build_app, state::AppState};

    use super::*;

    async fn send(app: &Router, req: Request<Body>) -> Response {
        app.clone().oneshot(req).await.expect("router never fails")
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

    async fn body_json(res: Response) -> Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn body_text(res: Response) -> String {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn token_for(app: &Router, email: &str, password: &str) -> String {
        let res = send(
            app,
            post_json("/authenticate", json!({ "email": email, "password": password })),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
        body_json(res).await["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn signup_authenticate_me_flow() {
        let app = build_app(AppState::fake());
        let creds = json!({ "email": "alice@example.com", "password": "hunter2hunter2" });

        let res = send(&app, post_json("/signup", creds.clone())).await;
        assert_eq!(res.status(), StatusCode::ACCEPTED);
        let user = body_json(res).await;
        assert_eq!(user["email"], "alice@example.com");
        assert_eq!(user["role"], "user");
        assert!(user.get("password_hash").is_none());
        assert!(user.get("password").is_none());

        let res = send(&app, post_json("/authenticate", creds)).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["token_type"], "Bearer");
        let token = body["token"].as_str().unwrap();

        let res = send(&app, get_with_token("/me", token)).await;
        assert_eq!(res.status(), StatusCode::OK);
        let me = body_json(res).await;
        assert_eq!(me["email"], "alice@example.com");
        assert_eq!(me["role"], "user");
    }

    #[tokio::test]
    async fn duplicate_signup_is_conflict() {
        let app = build_app(AppState::fake());
        let creds = json!({ "email": "bob@example.com", "password": "password123" });
        assert_eq!(send(&app, post_json("/signup", creds.clone())).await.status(), StatusCode::ACCEPTED);
        let res = send(&app, post_json("/signup", creds)).await;
        assert_eq!(res.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(res).await["error"], "Email already registered");
    }

    #[tokio::test]
    async fn bad_credentials_look_the_same() {
        let app = build_app(AppState::fake());
        send(
            &app,
            post_json("/signup", json!({ "email": "carol@example.com", "password": "password123" })),
        )
        .await;

        let wrong = send(
            &app,
            post_json("/authenticate", json!({ "email": "carol@example.com", "password": "nope-nope" })),
        )
        .await;
        let unknown = send(
            &app,
            post_json("/authenticate", json!({ "email": "ghost@example.com", "password": "password123" })),
        )
        .await;

        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(wrong).await, body_json(unknown).await);
    }

    #[tokio::test]
    async fn invalid_email_is_bad_request() {
        let app = build_app(AppState::fake());
        let res = send(
            &app,
            post_json("/signup", json!({ "email": "nope", "password": "password123" })),
        )
        .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_body_is_json_bad_request() {
        let app = build_app(AppState::fake());

        let res = send(&app, post_json("/signup", json!({ "email": "a@example.com" }))).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            res.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let body = body_json(res).await;
        assert!(body["error"].as_str().unwrap().contains("password"));

        let res = send(&app, post_json("/authenticate", json!({ "password": "password123" }))).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(res).await["error"].as_str().unwrap().contains("email"));

        let res = send(
            &app,
            Request::builder()
                .method("POST")
                .uri("/authenticate")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn admin_signup_checks_secret() {
        let app = build_app(AppState::fake());
        let creds = json!({ "email": "root@example.com", "password": "admin-password" });

        let res = send(&app, post_json("/signup?secret=wrong", creds.clone())).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        let res = send(&app, post_json("/authenticate", creds.clone())).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = send(&app, post_json("/user/signup?secretKey=let-me-in", creds.clone())).await;
        assert_eq!(res.status(), StatusCode::ACCEPTED);
        assert_eq!(body_json(res).await["role"], "admin");
    }

    #[tokio::test]
    async fn welcome_routes_respect_roles() {
        let app = build_app(AppState::fake());
        send(
            &app,
            post_json("/signup", json!({ "email": "u@example.com", "password": "password123" })),
        )
        .await;
        send(
            &app,
            post_json(
                "/signup?secret=let-me-in",
                json!({ "email": "a@example.com", "password": "password123" }),
            ),
        )
        .await;
        let user_token = token_for(&app, "u@example.com", "password123").await;
        let admin_token = token_for(&app, "a@example.com", "password123").await;

        let res = send(&app, Request::get("/user").body(Body::empty()).unwrap()).await;
        assert_eq!(body_text(res).await, "Welcome to the website !");

        let res = send(&app, get_with_token("/user/userLogin", &user_token)).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_text(res).await, "Welcome User!");

        let res = send(&app, get_with_token("/user/adminLogin", &user_token)).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let res = send(&app, get_with_token("/user/adminLogin", &admin_token)).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_text(res).await, "Welcome Admin !");
    }

    #[tokio::test]
    async fn protected_routes_need_a_valid_token() {
        let app = build_app(AppState::fake());

        let res = send(&app, Request::get("/me").body(Body::empty()).unwrap()).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = send(&app, get_with_token("/me", "garbage")).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(res).await["error"], "Invalid or expired token");
    }
}
