use thiserror::Error;

#[derive(Error, Debug)]
pub enum S3Error {
    /// Network, TLS or DNS failure on the way to S3.
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),
    /// Any non-2xx answer from S3, with the response body.
    #[error("S3 returned HTTP {0} with content '{1}'")]
    Remote(u16, String),

    #[error("{0} does not exist")]
    NotFound(String),
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("{0} is not a directory")]
    NotADirectory(String),
    #[error("{0} is not a file")]
    NotAFile(String),
    #[error("too many incomplete part uploads to S3")]
    BackpressureExceeded,
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
    #[error("operation was cancelled")]
    Cancelled,

    #[error("env var missing: {0}")]
    EnvVarMissing(#[from] std::env::VarError),
    #[error("header to string: {0}")]
    HeaderToStr(#[from] http::header::ToStrError),
    #[error("sha2 invalid length: {0}")]
    HmacInvalidLength(#[from] sha2::digest::InvalidLength),
    #[error("invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),
    #[error("invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),
    #[error("tokio task join: {0}")]
    Join(tokio::task::JoinError),
    #[error("serde xml: {0}")]
    SerdeXml(#[from] quick_xml::de::DeError),
    #[error("time format error: {0}")]
    TimeFormat(#[from] time::error::Format),
    #[error("time parse error: {0}")]
    TimeParse(#[from] time::error::Parse),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(&'static str),
    #[error("url parse: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl From<tokio::task::JoinError> for S3Error {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            Self::Cancelled
        } else {
            Self::Join(err)
        }
    }
}
