//! 认证相关代码：HS256 紧凑令牌、密码摘要、请求声明提取
//! Authentication: compact HS256 tokens, salted password digests and the `Claims` extractor.

use std::future::{ready, Ready};

use actix_web::{dev::Payload, http::header, web, FromRequest, HttpRequest};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::app_bootstrap::AppState;
use crate::error::{AppError, AppResult};
use crate::modules::base::scope::ROLE_ADMIN;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

/// 每个请求携带的身份声明 / Identity carried by every authenticated request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub uid: i64,
    pub role: String,
    /// 基地名称 / base names the caller may act on
    pub bases: Vec<String>,
    /// 过期时间（unix 秒）
    pub exp: i64,
}

impl Claims {
    /// AUTH_BYPASS 注入的管理员身份
    pub fn bypass_admin() -> Self {
        Self {
            uid: 0,
            role: ROLE_ADMIN.to_string(),
            bases: Vec::new(),
            exp: i64::MAX,
        }
    }
}

/// 令牌签发与校验 / Token signer and verifier
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
    ttl: Duration,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("ttl_hours", &self.ttl.num_hours())
            .finish_non_exhaustive()
    }
}

impl TokenSigner {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            ttl: Duration::hours(ttl_hours),
        }
    }

    fn mac(&self) -> AppResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| AppError::internal(format!("签名密钥无效: {}", e)))
    }

    /// 为用户签发令牌，返回 (token, claims)
    pub fn issue(&self, uid: i64, role: &str, bases: Vec<String>) -> AppResult<(String, Claims)> {
        let claims = Claims {
            uid,
            role: role.to_string(),
            bases,
            exp: (Utc::now() + self.ttl).timestamp(),
        };
        Ok((self.sign(&claims)?, claims))
    }

    pub fn sign(&self, claims: &Claims) -> AppResult<String> {
        let payload = serde_json::to_vec(claims)
            .map_err(|e| AppError::internal(format!("序列化声明失败: {}", e)))?;
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(TOKEN_HEADER),
            URL_SAFE_NO_PAD.encode(payload)
        );
        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{}.{}", signing_input, signature))
    }

    /// 校验签名与有效期 / Check signature and expiry
    pub fn verify(&self, token: &str) -> AppResult<Claims> {
        let invalid = || AppError::unauthorized("令牌无效 / invalid token");
        let (signing_input, signature) = token.trim().rsplit_once('.').ok_or_else(invalid)?;
        let (_, payload) = signing_input.split_once('.').ok_or_else(invalid)?;

        let signature = URL_SAFE_NO_PAD.decode(signature).map_err(|_| invalid())?;
        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        mac.verify_slice(&signature).map_err(|_| invalid())?;

        let payload = URL_SAFE_NO_PAD.decode(payload).map_err(|_| invalid())?;
        let claims: Claims = serde_json::from_slice(&payload).map_err(|_| invalid())?;
        if claims.exp < Utc::now().timestamp() {
            return Err(AppError::unauthorized("令牌已过期 / token expired"));
        }
        Ok(claims)
    }
}

/// bcrypt 密码摘要（自带盐） / bcrypt digest with an embedded salt
pub fn hash_password(password: &str) -> AppResult<String> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|e| AppError::internal(format!("密码摘要失败: {}", e)))
}

/// 摘要格式不合法时按校验失败处理 / a malformed stored digest never verifies
pub fn verify_password(password: &str, stored: &str) -> bool {
    bcrypt::verify(password, stored).unwrap_or(false)
}

fn bearer(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn extract_claims(req: &HttpRequest) -> AppResult<Claims> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(|| AppError::internal("应用状态未注册"))?;
    if state.auth_bypass {
        return Ok(Claims::bypass_admin());
    }
    let token = bearer(req).ok_or_else(|| AppError::unauthorized("缺少令牌 / missing bearer token"))?;
    state.signer.verify(token)
}

impl FromRequest for Claims {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(extract_claims(req))
    }
}
