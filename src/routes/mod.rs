use serde::{Deserialize, Serialize};

pub mod health;
pub mod presence;

/// 统一的API响应包装
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub msg: String,
    pub resp_data: Option<T>,
}
