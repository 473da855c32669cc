use axum::Json;
use chrono::Utc;
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::routes::ApiResponse;

/// 令牌由授权流程的协作方签发，本服务只做校验
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // 用户ID
    pub exp: i64,    // 过期时间
    pub iat: i64,    // 签发时间
}

pub fn verify_token(token: &str, config: &Config) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

/// 当前Unix时间戳（秒）
pub fn now_ts() -> i64 {
    Utc::now().timestamp()
}

// 修改所有 handler 返回类型为 Json<ApiResponse<T>>
pub fn success_to_api_response<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code: 0,
        msg: "success".into(),
        resp_data: Some(data),
    })
}

pub fn error_to_api_response<T>(code: i32, msg: String) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code,
        msg,
        resp_data: None,
    })
}

pub mod error_codes {
    pub const SUCCESS: i32 = 0;
    pub const VALIDATION_ERROR: i32 = 1000;
    pub const AUTH_FAILED: i32 = 1002;
    pub const NOT_FOUND: i32 = 1004;
    pub const INTERNAL_ERROR: i32 = 5000;
}
