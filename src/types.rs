use crate::constants::{DIR_MODE, MODE_TYPE_MASK, REG_MODE};
use serde::Deserialize;
use std::str::FromStr;

/// POSIX-shaped metadata attached to paths surfaced by listings and stat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub size: u64,
    pub mtime: i64,
    pub ctime: i64,
    pub nlink: u32,
    pub mode: u32,
}

impl Stat {
    pub fn regular(size: u64, mtime: i64) -> Self {
        Self {
            size,
            mtime,
            ctime: mtime,
            nlink: 1,
            mode: REG_MODE,
        }
    }

    /// Directory stats carry zeroed timestamps: S3 has no directory mtime.
    pub fn directory() -> Self {
        Self {
            size: 0,
            mtime: 0,
            ctime: 0,
            nlink: 1,
            mode: DIR_MODE,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.mode & MODE_TYPE_MASK == DIR_MODE & MODE_TYPE_MASK
    }

    pub fn is_file(&self) -> bool {
        self.mode & MODE_TYPE_MASK == REG_MODE & MODE_TYPE_MASK
    }
}

/// One object from a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListKey {
    pub key: String,
    pub size: u64,
    pub last_modified: i64,
}

/// One CommonPrefixes entry, trailing '/' stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListPrefix {
    pub prefix: String,
}

#[derive(Deserialize, Debug, Clone)]
pub(crate) struct Object {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "LastModified")]
    pub last_modified: String,
    #[serde(rename = "Size")]
    pub size: u64,
}

#[derive(Deserialize, Debug, Clone)]
pub(crate) struct CommonPrefix {
    #[serde(rename = "Prefix")]
    pub prefix: String,
}

#[derive(Deserialize, Debug, Clone)]
pub(crate) struct ListBucketResult {
    #[serde(rename = "Contents", default)]
    pub contents: Vec<Object>,
    #[serde(rename = "CommonPrefixes", default)]
    pub common_prefixes: Vec<CommonPrefix>,
    #[serde(rename = "NextContinuationToken", default)]
    pub next_continuation_token: Option<String>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct InitiateMultipartUploadResponse {
    #[serde(rename = "UploadId")]
    pub upload_id: String,
}

/// The subset of HEAD response headers this system cares about.
#[derive(Debug, Default, Clone)]
pub struct HeadObjectResult {
    pub content_length: Option<u64>,
    pub e_tag: Option<String>,
    pub last_modified: Option<String>,
}

trait GetAndConvertHeaders {
    fn get_and_convert<T: FromStr>(&self, header: &str) -> Option<T>;
    fn get_string(&self, header: &str) -> Option<String>;
}

impl GetAndConvertHeaders for http::header::HeaderMap {
    fn get_and_convert<T: FromStr>(&self, header: &str) -> Option<T> {
        self.get(header)?.to_str().ok()?.parse::<T>().ok()
    }
    fn get_string(&self, header: &str) -> Option<String> {
        Some(self.get(header)?.to_str().ok()?.to_owned())
    }
}

impl From<&http::HeaderMap> for HeadObjectResult {
    fn from(headers: &http::HeaderMap) -> Self {
        HeadObjectResult {
            content_length: headers.get_and_convert("Content-Length"),
            e_tag: headers.get_string("ETag"),
            last_modified: headers.get_string("Last-Modified"),
        }
    }
}
