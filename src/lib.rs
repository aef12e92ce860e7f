#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

use base64::engine::general_purpose;
use base64::Engine;
use std::env;

/// The path-IO facade, your main entrypoint
pub use crate::fs::{OpenFile, S3PathIo};
/// Bucket descriptor and the signing request layer beneath the facade
pub use crate::client::{Bucket, S3Client};
/// S3 credentials and the per-request supplier seam
pub use crate::credentials::{
    AccessKeyId, AccessKeySecret, Credentials, ProvideCredentials, StaticCredentials,
};
/// Specialized S3 error type which wraps errors from different sources
pub use crate::error::S3Error;
/// Per-path fair read/write locking
pub use crate::lock::{PathLock, PathLockGuard};
/// Bucket paths and their stat sidecars
pub use crate::path::S3Path;
pub use crate::read::ObjectReader;
pub use crate::types::{HeadObjectResult, ListKey, ListPrefix, Stat};
pub use crate::write::ObjectWriter;

mod client;
mod command;
mod constants;
mod credentials;
mod error;
mod fs;
mod list;
mod lock;
mod path;
pub mod prelude;
mod read;
mod signature;
mod types;
mod write;

/// S3 Region Wrapper
#[derive(Debug, Clone)]
pub struct Region(pub String);

impl Region {
    pub fn new<S>(region: S) -> Self
    where
        S: Into<String>,
    {
        Self(region.into())
    }

    pub fn try_from_env() -> Result<Self, S3Error> {
        Ok(Self(env::var("S3_REGION")?))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

fn md5_base64(s: &[u8]) -> String {
    general_purpose::STANDARD.encode(md5::compute(s).as_ref())
}
