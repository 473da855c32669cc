use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{
    AppState,
    utils::{error_codes, error_to_api_response, verify_token},
};

/// 认证中间件：校验 Bearer Token 并把 Claims 注入请求扩展
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get("Authorization")
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "));

    let token = match token {
        Some(token) => token,
        None => {
            return (
                StatusCode::UNAUTHORIZED,
                error_to_api_response::<()>(error_codes::AUTH_FAILED, "缺少认证令牌".to_string()),
            )
                .into_response();
        }
    };

    match verify_token(token, &state.config) {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(e) => {
            tracing::debug!("Token verification failed: {}", e);
            (
                StatusCode::UNAUTHORIZED,
                error_to_api_response::<()>(error_codes::AUTH_FAILED, "令牌无效或已过期".to_string()),
            )
                .into_response()
        }
    }
}
