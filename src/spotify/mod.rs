// Spotify 音乐服务客户端
// 速率限制与令牌过期的处理策略由调用方（presence::fetcher）决定，
// 这里只负责把 HTTP 状态映射为明确的错误分类。

use std::fmt;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::Config;

const SPOTIFY_API_BASE_URL: &str = "https://api.spotify.com/v1";
const SPOTIFY_ACCOUNTS_BASE_URL: &str = "https://accounts.spotify.com";

/// Spotify API 错误分类
#[derive(Debug)]
pub enum SpotifyApiError {
    /// 429：调用方不确认消息，等待队列重新投递
    RateLimited { retry_after_secs: Option<u64> },
    /// 401：令牌可能已过期，调用方最多刷新重试一次
    Unauthorized,
    /// 其余上游错误：记录后丢弃，不重试
    Api { status: u16, message: String },
    /// 网络层失败（含超时）
    Request(reqwest::Error),
}

impl fmt::Display for SpotifyApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpotifyApiError::RateLimited { retry_after_secs } => {
                write!(f, "rate limited, retry after {:?}s", retry_after_secs)
            }
            SpotifyApiError::Unauthorized => write!(f, "unauthorized, token may be expired"),
            SpotifyApiError::Api { status, message } => {
                write!(f, "api error {}: {}", status, message)
            }
            SpotifyApiError::Request(e) => write!(f, "request failed: {}", e),
        }
    }
}

impl From<reqwest::Error> for SpotifyApiError {
    fn from(e: reqwest::Error) -> Self {
        SpotifyApiError::Request(e)
    }
}

/// 当前播放状态（已解包的响应）
#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackState {
    pub is_playing: bool,
    pub progress_ms: Option<i64>,
    pub item: Option<PlaybackItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackItem {
    pub id: Option<String>,
    pub name: Option<String>,
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub artists: Vec<PlaybackArtist>,
    pub album: Option<PlaybackAlbum>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackArtist {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackAlbum {
    pub name: Option<String>,
    #[serde(default)]
    pub images: Vec<PlaybackImage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackImage {
    pub url: String,
}

/// 刷新令牌的结果
#[derive(Debug, Clone)]
pub struct RefreshedToken {
    pub access_token: String,
    pub expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

/// 播放状态提供方契约
#[async_trait]
pub trait PlaybackProvider: Send + Sync {
    /// 查询当前播放，无活跃播放时返回 None（上游 204）
    async fn currently_playing(
        &self,
        access_token: &str,
    ) -> Result<Option<PlaybackState>, SpotifyApiError>;

    /// 用 refresh token 换取新的 access token
    async fn refresh_token(&self, refresh_token: &str)
    -> Result<RefreshedToken, SpotifyApiError>;
}

/// Spotify HTTP 客户端
pub struct SpotifyClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
}

impl SpotifyClient {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        // 供应方调用必须有界超时，避免卡住整个工作池
        let http = reqwest::Client::builder()
            .timeout(config.provider_timeout())
            .build()?;

        Ok(Self {
            http,
            client_id: config.spotify_client_id.clone(),
            client_secret: config.spotify_client_secret.clone(),
        })
    }

    async fn classify_error(response: reqwest::Response) -> SpotifyApiError {
        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after_secs = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return SpotifyApiError::RateLimited { retry_after_secs };
        }

        if status.as_u16() == 401 {
            return SpotifyApiError::Unauthorized;
        }

        let message = response.text().await.unwrap_or_default();
        SpotifyApiError::Api {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl PlaybackProvider for SpotifyClient {
    async fn currently_playing(
        &self,
        access_token: &str,
    ) -> Result<Option<PlaybackState>, SpotifyApiError> {
        let url = format!("{}/me/player/currently-playing", SPOTIFY_API_BASE_URL);

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await?;

        // 204 表示当前没有播放
        if response.status().as_u16() == 204 {
            return Ok(None);
        }

        if !response.status().is_success() {
            return Err(Self::classify_error(response).await);
        }

        let playback: PlaybackState = response.json().await?;
        Ok(Some(playback))
    }

    async fn refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<RefreshedToken, SpotifyApiError> {
        let url = format!("{}/api/token", SPOTIFY_ACCOUNTS_BASE_URL);

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let response = self.http.post(&url).form(&params).send().await?;

        if !response.status().is_success() {
            return Err(Self::classify_error(response).await);
        }

        let token: TokenResponse = response.json().await?;
        Ok(RefreshedToken {
            access_token: token.access_token,
            expires_in: token.expires_in,
        })
    }
}
