use crate::error::S3Error;
use async_trait::async_trait;
use http::HeaderMap;
use std::env;
use std::fmt::{Debug, Formatter};

#[derive(Debug, Clone)]
pub struct AccessKeyId(pub String);

impl AsRef<str> for AccessKeyId {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl AccessKeyId {
    pub fn new(access_key_id: String) -> Self {
        Self(access_key_id)
    }
}

#[derive(Clone)]
pub struct AccessKeySecret(pub String);

impl Debug for AccessKeySecret {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccessKeySecret(<hidden>)")
    }
}

impl AsRef<str> for AccessKeySecret {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl AccessKeySecret {
    pub fn new(access_key_secret: String) -> Self {
        Self(access_key_secret)
    }
}

/// One set of signing inputs. `pre_auth_headers` are sent with every request
/// and take part in the SigV4 canonicalization, which is how header-based
/// auth schemes (e.g. STS session tokens) ride along.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_key_id: AccessKeyId,
    pub access_key_secret: AccessKeySecret,
    pub pre_auth_headers: HeaderMap,
}

impl Credentials {
    pub fn new<S>(key: S, secret: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            access_key_id: AccessKeyId(key.into()),
            access_key_secret: AccessKeySecret(secret.into()),
            pre_auth_headers: HeaderMap::new(),
        }
    }

    pub fn with_pre_auth_headers(mut self, headers: HeaderMap) -> Self {
        self.pre_auth_headers = headers;
        self
    }

    pub fn try_from_env() -> Result<Self, S3Error> {
        let access_key_id = env::var("S3_ACCESS_KEY_ID")?;
        let access_key_secret = env::var("S3_ACCESS_KEY_SECRET")?;

        Ok(Self {
            access_key_id: AccessKeyId(access_key_id),
            access_key_secret: AccessKeySecret(access_key_secret),
            pre_auth_headers: HeaderMap::new(),
        })
    }
}

/// Supplies credentials for each request, so implementations can rotate
/// keys underneath open connections. Called concurrently from every
/// in-flight request.
#[async_trait]
pub trait ProvideCredentials: Send + Sync {
    async fn credentials(&self) -> Result<Credentials, S3Error>;
}

/// Fixed access key / secret pair.
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    credentials: Credentials,
}

impl StaticCredentials {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    pub fn try_from_env() -> Result<Self, S3Error> {
        Ok(Self {
            credentials: Credentials::try_from_env()?,
        })
    }
}

#[async_trait]
impl ProvideCredentials for StaticCredentials {
    async fn credentials(&self) -> Result<Credentials, S3Error> {
        Ok(self.credentials.clone())
    }
}
