use crate::{
    config::PowerBiConfig,
    constants::{http, powerbi},
    error::{PbiError, Result},
};
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// 服务主体凭据
#[derive(Clone)]
pub struct ServicePrincipal {
    pub client_id: String,
    pub client_secret: String,
    pub tenant_id: String,
    pub authority_url: String,
    pub resource: String,
}

impl fmt::Debug for ServicePrincipal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServicePrincipal")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("tenant_id", &self.tenant_id)
            .field("authority_url", &self.authority_url)
            .field("resource", &self.resource)
            .finish()
    }
}

impl ServicePrincipal {
    pub fn from_config(config: &PowerBiConfig) -> Result<Self> {
        for (name, value) in [
            ("client_id", &config.client_id),
            ("client_secret", &config.client_secret),
            ("tenant_id", &config.tenant_id),
        ] {
            if value.trim().is_empty() {
                return Err(PbiError::validation(format!(
                    "缺少 Power BI 凭据: {name}"
                )));
            }
        }

        Ok(Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            tenant_id: config.tenant_id.clone(),
            authority_url: config.authority_url.trim_end_matches('/').to_string(),
            resource: config.resource.clone(),
        })
    }

    /// 令牌端点
    pub fn token_url(&self) -> String {
        format!("{}/{}/oauth2/token", self.authority_url, self.tenant_id)
    }
}

/// 缓存的访问令牌
#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(powerbi::TOKEN_EXPIRY_MARGIN_SECS) > now
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<Value>,
}

/// v1 令牌端点以字符串返回 expires_in，v2 以数字返回
fn parse_expires_in(value: Option<&Value>) -> i64 {
    value
        .and_then(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        })
        .unwrap_or(powerbi::DEFAULT_TOKEN_LIFETIME_SECS)
}

/// 认证客户端包装器
/// 自动获取并缓存 Bearer 令牌，令牌过期或收到 401 时重新获取
#[derive(Debug, Clone)]
pub struct AuthenticatedClient {
    client: Client,
    principal: Arc<ServicePrincipal>,
    token: Arc<RwLock<Option<CachedToken>>>,
}

impl AuthenticatedClient {
    /// 创建新的认证客户端
    pub fn new(principal: ServicePrincipal, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .user_agent(http::USER_AGENT)
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            principal: Arc::new(principal),
            token: Arc::new(RwLock::new(None)),
        })
    }

    /// 获取访问令牌（优先使用缓存）
    pub async fn get_token(&self) -> Result<String> {
        if let Some(token) = self.token.read().await.as_ref() {
            if token.is_valid_at(Utc::now()) {
                return Ok(token.access_token.clone());
            }
        }

        let mut guard = self.token.write().await;
        // 其他任务可能已经刷新过
        if let Some(token) = guard.as_ref() {
            if token.is_valid_at(Utc::now()) {
                return Ok(token.access_token.clone());
            }
        }

        let fresh = self.fetch_token().await?;
        let access_token = fresh.access_token.clone();
        *guard = Some(fresh);
        Ok(access_token)
    }

    /// 丢弃缓存的令牌
    pub async fn invalidate_token(&self) {
        *self.token.write().await = None;
    }

    /// 使用 client_credentials 向认证服务申请令牌
    async fn fetch_token(&self) -> Result<CachedToken> {
        info!("正在获取 Power BI 访问令牌...");

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.principal.client_id.as_str()),
            ("client_secret", self.principal.client_secret.as_str()),
            ("resource", self.principal.resource.as_str()),
        ];

        let response = self
            .client
            .post(self.principal.token_url())
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            error!("获取访问令牌失败: {} - {}", status, text);
            return Err(PbiError::auth(format!("获取访问令牌失败: {status} - {text}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| PbiError::auth(format!("令牌响应格式无效: {e}")))?;
        let lifetime = parse_expires_in(token.expires_in.as_ref());

        info!("访问令牌获取成功，有效期 {} 秒", lifetime);
        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: Utc::now() + Duration::seconds(lifetime),
        })
    }

    /// 发送请求并处理认证失败
    ///
    /// `build` 会在重试时再次调用，以便重新构造请求体（例如 multipart 表单）。
    pub async fn send<F>(&self, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let token = self.get_token().await?;
        let response = build(&self.client).bearer_auth(&token).send().await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        warn!("API请求认证失败 (401)，刷新令牌后重试...");
        self.invalidate_token().await;
        let token = self.get_token().await?;
        let retry_response = build(&self.client).bearer_auth(&token).send().await?;
        Ok(retry_response)
    }

    /// 检查响应状态码，将厂商错误转换为类型化错误
    pub async fn ensure_success(response: Response, context: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        debug!("{} 失败: {} - {}", context, status, body);

        // 401（刷新令牌后仍失败）和 403 同样保留厂商状态码
        Err(match status {
            StatusCode::NOT_FOUND => PbiError::not_found(format!("{context}: {body}")),
            _ => PbiError::api(status.as_u16(), format!("{context}: {body}")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> PowerBiConfig {
        PowerBiConfig {
            client_id: "client".into(),
            client_secret: "top-secret".into(),
            tenant_id: "tenant-1".into(),
            api_base_url: powerbi::DEFAULT_API_BASE_URL.into(),
            authority_url: "https://login.example.test/".into(),
            resource: powerbi::DEFAULT_RESOURCE.into(),
        }
    }

    #[test]
    fn test_service_principal_from_config() {
        let principal = ServicePrincipal::from_config(&config()).unwrap();
        assert_eq!(
            principal.token_url(),
            "https://login.example.test/tenant-1/oauth2/token"
        );

        let debug = format!("{principal:?}");
        assert!(!debug.contains("top-secret"));

        let mut missing = config();
        missing.client_secret = " ".into();
        assert!(matches!(
            ServicePrincipal::from_config(&missing),
            Err(PbiError::Validation(_))
        ));
    }

    #[test]
    fn test_cached_token_expiry_margin() {
        let now = Utc::now();
        let token = CachedToken {
            access_token: "t".into(),
            expires_at: now + Duration::seconds(120),
        };
        assert!(token.is_valid_at(now));
        assert!(!token.is_valid_at(now + Duration::seconds(61)));
    }

    #[test]
    fn test_parse_expires_in() {
        assert_eq!(parse_expires_in(Some(&json!("3599"))), 3599);
        assert_eq!(parse_expires_in(Some(&json!(1800))), 1800);
        assert_eq!(
            parse_expires_in(None),
            powerbi::DEFAULT_TOKEN_LIFETIME_SECS
        );
        assert_eq!(
            parse_expires_in(Some(&json!("soon"))),
            powerbi::DEFAULT_TOKEN_LIFETIME_SECS
        );
    }

    #[tokio::test]
    async fn test_invalidate_clears_cache() {
        let client =
            AuthenticatedClient::new(ServicePrincipal::from_config(&config()).unwrap(), 5).unwrap();
        *client.token.write().await = Some(CachedToken {
            access_token: "cached".into(),
            expires_at: Utc::now() + Duration::hours(1),
        });

        assert_eq!(client.get_token().await.unwrap(), "cached");
        client.invalidate_token().await;
        assert!(client.token.read().await.is_none());
    }
}
