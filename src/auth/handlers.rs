use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::{
    cookie::{Cookie, CookieJar, SameSite},
    WithRejection,
};
use bytes::Bytes;
use tracing::{instrument, warn};

use crate::{
    auth::{
        claims::TokenKind,
        dto::{
            ApiResponse, ChangePasswordRequest, LoginRequest, LoginResponse, PublicUser,
            RefreshRequest, RegisterInput, TokenPair,
        },
        error::{AuthError, AuthResult},
        extractors::{AuthUser, ACCESS_COOKIE, REFRESH_COOKIE},
    },
    media::UploadItem,
    state::AppState,
};

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/users/register",
            post(register).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/users/login", post(login))
        .route("/users/logout", post(logout))
        .route("/users/refresh-token", post(refresh))
        .route("/users/change-password", post(change_password))
        .route("/users/current-user", get(current_user))
}

fn base_cookie(state: &AppState, name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(state.config.cookie_secure)
        .same_site(SameSite::Strict)
        .path("/")
        .build()
}

fn token_cookie(
    state: &AppState,
    name: &'static str,
    value: String,
    kind: TokenKind,
) -> Cookie<'static> {
    let max_age = time::Duration::seconds(state.tokens.ttl(kind).as_secs() as i64);
    let mut cookie = base_cookie(state, name, value);
    cookie.set_max_age(max_age);
    cookie
}

fn with_token_cookies(state: &AppState, jar: CookieJar, tokens: &TokenPair) -> CookieJar {
    jar.add(token_cookie(
        state,
        ACCESS_COOKIE,
        tokens.access_token.clone(),
        TokenKind::Access,
    ))
    .add(token_cookie(
        state,
        REFRESH_COOKIE,
        tokens.refresh_token.clone(),
        TokenKind::Refresh,
    ))
}

fn bad_multipart(e: axum::extract::multipart::MultipartError) -> AuthError {
    warn!(error = %e, "invalid multipart body");
    AuthError::validation("Invalid multipart body")
}

async fn read_register_form(mut mp: Multipart) -> AuthResult<RegisterInput> {
    let mut input = RegisterInput::default();
    while let Some(field) = mp.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "avatar" | "coverImage" => {
                let content_type = field
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| "application/octet-stream".into());
                let body: Bytes = field.bytes().await.map_err(bad_multipart)?;
                if body.is_empty() {
                    continue;
                }
                let item = Some(UploadItem { body, content_type });
                if name == "avatar" {
                    input.avatar = item;
                } else {
                    input.cover_image = item;
                }
            }
            "fullName" => input.full_name = field.text().await.map_err(bad_multipart)?,
            "email" => input.email = field.text().await.map_err(bad_multipart)?,
            "username" => input.username = field.text().await.map_err(bad_multipart)?,
            "password" => input.password = field.text().await.map_err(bad_multipart)?,
            _ => {}
        }
    }
    Ok(input)
}

#[instrument(skip(state, mp))]
pub async fn register(
    State(state): State<AppState>,
    mp: Multipart,
) -> AuthResult<(StatusCode, Json<ApiResponse<PublicUser>>)> {
    let input = read_register_form(mp).await?;
    let user = state.auth.register(input).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(
            StatusCode::CREATED,
            user,
            "User registered successfully",
        )),
    ))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    WithRejection(Json(payload), _): WithRejection<Json<LoginRequest>, AuthError>,
) -> AuthResult<(CookieJar, Json<ApiResponse<LoginResponse>>)> {
    let identifier = payload
        .identifier()
        .ok_or_else(|| AuthError::validation("Username or email is required"))?;
    let (user, tokens) = state.auth.login(identifier, &payload.password).await?;

    let jar = with_token_cookies(&state, jar, &tokens);
    Ok((
        jar,
        Json(ApiResponse::ok(
            StatusCode::OK,
            LoginResponse { user, tokens },
            "User logged in successfully",
        )),
    ))
}

#[instrument(skip(state, jar))]
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    jar: CookieJar,
) -> AuthResult<(CookieJar, Json<ApiResponse<()>>)> {
    state.auth.logout(user_id).await?;
    let jar = jar
        .remove(base_cookie(&state, ACCESS_COOKIE, String::new()))
        .remove(base_cookie(&state, REFRESH_COOKIE, String::new()));
    Ok((jar, Json(ApiResponse::ok(StatusCode::OK, (), "User logged out"))))
}

#[instrument(skip(state, jar, body))]
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Option<Json<RefreshRequest>>,
) -> AuthResult<(CookieJar, Json<ApiResponse<TokenPair>>)> {
    let presented = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
        .or_else(|| body.and_then(|Json(b)| b.refresh_token));

    let tokens = state.auth.refresh(presented.as_deref()).await?;
    let jar = with_token_cookies(&state, jar, &tokens);
    Ok((
        jar,
        Json(ApiResponse::ok(StatusCode::OK, tokens, "Access token refreshed")),
    ))
}

#[instrument(skip(state, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    WithRejection(Json(payload), _): WithRejection<Json<ChangePasswordRequest>, AuthError>,
) -> AuthResult<Json<ApiResponse<()>>> {
    state
        .auth
        .change_password(user_id, &payload.old_password, &payload.new_password)
        .await?;
    Ok(Json(ApiResponse::ok(
        StatusCode::OK,
        (),
        "Password changed successfully",
    )))
}

#[instrument(skip(state))]
pub async fn current_user(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AuthResult<Json<ApiResponse<PublicUser>>> {
    let user = state.auth.current_user(user_id).await?;
    Ok(Json(ApiResponse::ok(
        StatusCode::OK,
        user,
        "Current user fetched successfully",
    )))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Request, Response, StatusCode},
    };
    use bytes::Bytes;
    use tower::ServiceExt;

    use crate::{app::build_app, auth::dto::RegisterInput, media::UploadItem, state::AppState};

    async fn registered_state() -> AppState {
        let state = AppState::fake();
        state
            .auth
            .register(RegisterInput {
                full_name: "Jane Doe".into(),
                email: "jane@x.com".into(),
                username: "janedoe".into(),
                password: "Secret123!".into(),
                avatar: Some(UploadItem {
                    body: Bytes::from_static(b"img"),
                    content_type: "image/png".into(),
                }),
                cover_image: None,
            })
            .await
            .unwrap();
        state
    }

    fn json_post(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn set_cookies(res: &Response<Body>) -> Vec<String> {
        res.headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    async fn body_json(res: Response<Body>) -> serde_json::Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn login_sets_hardened_cookies_and_hides_secrets() {
        let app = build_app(registered_state().await);
        let res = app
            .oneshot(json_post(
                "/api/v1/users/login",
                serde_json::json!({ "username": "janedoe", "password": "Secret123!" }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let cookies = set_cookies(&res);
        assert_eq!(cookies.len(), 2);
        for c in &cookies {
            assert!(c.contains("HttpOnly"));
            assert!(c.contains("Secure"));
            assert!(c.contains("SameSite=Strict"));
        }
        assert!(cookies.iter().any(|c| c.starts_with("accessToken=")));
        assert!(cookies.iter().any(|c| c.starts_with("refreshToken=")));

        let v = body_json(res).await;
        assert_eq!(v["success"], true);
        assert!(v["data"]["accessToken"].is_string());
        assert!(v["data"]["user"].get("passwordHash").is_none());
        assert!(v["data"]["user"].get("refreshToken").is_none());
    }

    #[tokio::test]
    async fn wrong_password_is_401_unknown_user_is_404() {
        let app = build_app(registered_state().await);
        let res = app
            .clone()
            .oneshot(json_post(
                "/api/v1/users/login",
                serde_json::json!({ "email": "jane@x.com", "password": "nope" }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = app
            .oneshot(json_post(
                "/api/v1/users/login",
                serde_json::json!({ "username": "ghost", "password": "nope" }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn incomplete_login_body_is_validation_error() {
        let app = build_app(registered_state().await);
        let res = app
            .clone()
            .oneshot(json_post(
                "/api/v1/users/login",
                serde_json::json!({ "username": "janedoe" }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let v = body_json(res).await;
        assert_eq!(v["success"], false);
        assert_eq!(v["statusCode"], 400);
        assert_eq!(v["message"], "Invalid request body");

        let res = app
            .oneshot(
                Request::post("/api/v1/users/login")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["success"], false);
    }

    #[tokio::test]
    async fn change_password_rejects_incomplete_body() {
        let state = registered_state().await;
        let app = build_app(state.clone());
        let (_, tokens) = state.auth.login("janedoe", "Secret123!").await.unwrap();

        let mut req = json_post(
            "/api/v1/users/change-password",
            serde_json::json!({ "oldPassword": "Secret123!" }),
        );
        req.headers_mut().insert(
            header::AUTHORIZATION,
            format!("Bearer {}", tokens.access_token).parse().unwrap(),
        );
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["statusCode"], 400);
    }

    #[tokio::test]
    async fn refresh_via_cookie_then_logout_revokes() {
        let state = registered_state().await;
        let app = build_app(state.clone());
        let (_, tokens) = state.auth.login("janedoe", "Secret123!").await.unwrap();

        let res = app
            .clone()
            .oneshot(
                Request::post("/api/v1/users/refresh-token")
                    .header(header::COOKIE, format!("refreshToken={}", tokens.refresh_token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let v = body_json(res).await;
        let rotated = v["data"]["refreshToken"].as_str().unwrap().to_string();
        let access = v["data"]["accessToken"].as_str().unwrap().to_string();

        // replaying the old token through the body is caught
        let res = app
            .clone()
            .oneshot(json_post(
                "/api/v1/users/refresh-token",
                serde_json::json!({ "refreshToken": tokens.refresh_token }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = app
            .clone()
            .oneshot(
                Request::post("/api/v1/users/logout")
                    .header(header::AUTHORIZATION, format!("Bearer {access}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let cleared = set_cookies(&res);
        assert_eq!(cleared.len(), 2);
        for c in &cleared {
            assert!(c.contains("HttpOnly"));
            assert!(c.contains("Secure"));
            assert!(c.contains("SameSite=Strict"));
            assert!(c.contains("Max-Age=0"));
        }

        let res = app
            .oneshot(json_post(
                "/api/v1/users/refresh-token",
                serde_json::json!({ "refreshToken": rotated }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn protected_routes_require_access_token() {
        let state = registered_state().await;
        let app = build_app(state.clone());

        let res = app
            .clone()
            .oneshot(
                Request::get("/api/v1/users/current-user")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let (_, tokens) = state.auth.login("janedoe", "Secret123!").await.unwrap();

        // a refresh token is not an access token
        let res = app
            .clone()
            .oneshot(
                Request::get("/api/v1/users/current-user")
                    .header(header::AUTHORIZATION, format!("Bearer {}", tokens.refresh_token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = app
            .oneshot(
                Request::get("/api/v1/users/current-user")
                    .header(header::COOKIE, format!("accessToken={}", tokens.access_token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let v = body_json(res).await;
        assert_eq!(v["data"]["username"], "janedoe");
    }

    #[tokio::test]
    async fn register_via_multipart() {
        let app = build_app(AppState::fake());
        let boundary = "XBOUNDARY";
        let mut body = String::new();
        for (name, value) in [
            ("fullName", "John Roe"),
            ("email", "john@x.com"),
            ("username", "JohnRoe"),
            ("password", "Secret123!"),
        ] {
            body.push_str(&format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        body.push_str(&format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"avatar\"; filename=\"a.png\"\r\n\
             Content-Type: image/png\r\n\r\nPNGDATA\r\n--{boundary}--\r\n"
        ));

        let res = app
            .oneshot(
                Request::post("/api/v1/users/register")
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={boundary}"),
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let v = body_json(res).await;
        assert_eq!(v["data"]["username"], "johnroe");
        assert!(v["data"]["avatarUrl"].as_str().unwrap().ends_with(".png"));
        assert!(v["data"].get("password").is_none());
    }
}
