use crate::command::{Command, CompleteMultipartUploadData, Part};
use crate::credentials::ProvideCredentials;
use crate::error::S3Error;
use crate::types::{HeadObjectResult, InitiateMultipartUploadResponse};
use crate::{md5_base64, signature, Region};
use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Response;
use std::convert::Infallible;
use std::env;
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::debug;
use url::Url;

/// Descriptor of the backing bucket. `host` is the endpoint the requests
/// go to; keys are addressed path-style as `/{name}/{key}`.
#[derive(Debug, Clone)]
pub struct Bucket {
    pub host: Url,
    pub name: String,
    pub region: Region,
    pub verify_certs: bool,
}

impl Bucket {
    pub fn new(host: Url, name: String, region: Region, verify_certs: bool) -> Self {
        Self {
            host,
            name,
            region,
            verify_certs,
        }
    }

    pub fn try_from_env() -> Result<Self, S3Error> {
        let host_env = env::var("S3_URL")?;
        let host = host_env.parse::<Url>()?;

        let name = env::var("S3_BUCKET")?;
        let region = Region::try_from_env()?;
        let verify_certs = env::var("S3_DANGER_ALLOW_INSECURE").as_deref() != Ok("true");

        Ok(Self {
            host,
            name,
            region,
            verify_certs,
        })
    }

    fn host_domain(&self) -> String {
        match self.host.domain() {
            None => {
                // in this case, we have an IP as part of the domain
                let host_str = self
                    .host
                    .host_str()
                    .expect("host_str to exist when domain does not");
                if let Some(port) = self.host.port() {
                    format!("{}:{}", host_str, port)
                } else {
                    host_str.to_string()
                }
            }
            Some(domain) => {
                if let Some(port) = self.host.port() {
                    format!("{}:{}", domain, port)
                } else {
                    domain.to_string()
                }
            }
        }
    }
}

/// Thin request layer over an injected HTTP session: URL assembly, header
/// signing, dispatch. Everything above it speaks [`Command`]s.
#[derive(Clone)]
pub struct S3Client {
    http: reqwest::Client,
    bucket: Bucket,
    credentials: Arc<dyn ProvideCredentials>,
}

impl S3Client {
    /// Wraps an HTTP session owned by the embedding process. The session
    /// must allow concurrent requests; `reqwest::Client` does.
    pub fn new(
        http: reqwest::Client,
        bucket: Bucket,
        credentials: Arc<dyn ProvideCredentials>,
    ) -> Self {
        Self {
            http,
            bucket,
            credentials,
        }
    }

    /// Builds its own HTTP session, honouring `bucket.verify_certs`.
    pub fn with_default_client(
        bucket: Bucket,
        credentials: Arc<dyn ProvideCredentials>,
    ) -> Result<Self, S3Error> {
        let mut builder = reqwest::Client::builder()
            .brotli(true)
            .connect_timeout(Duration::from_secs(10))
            .tcp_keepalive(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(600))
            .use_rustls_tls();
        if !bucket.verify_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder.build()?;
        Ok(Self::new(http, bucket, credentials))
    }

    pub fn bucket(&self) -> &Bucket {
        &self.bucket
    }

    /// Issues a command and fails on any non-2xx status, surfacing the
    /// response body in the error.
    pub(crate) async fn send_request(
        &self,
        command: Command<'_>,
        path: &str,
    ) -> Result<Response, S3Error> {
        let res = self.send_request_raw(command, path).await?;
        if res.status().is_success() {
            Ok(res)
        } else {
            Err(S3Error::Remote(res.status().as_u16(), res.text().await?))
        }
    }

    /// Issues a command and hands the response back unchecked. Existence
    /// probes need to see the 404 themselves.
    pub(crate) async fn send_request_raw(
        &self,
        command: Command<'_>,
        path: &str,
    ) -> Result<Response, S3Error> {
        let url = self.build_url(&command, path)?;
        let headers = self.build_headers(&command, &url).await?;
        debug!("{} {}", command.http_method(), url);

        let builder = self
            .http
            .request(command.http_method(), url)
            .headers(headers);

        let res = match command {
            Command::PutObject { content } => builder.body(content.to_vec()),
            Command::UploadPart { chunks, .. } => {
                let body_stream = futures_util::stream::iter(
                    chunks.into_iter().map(Ok::<Bytes, Infallible>),
                );
                builder.body(reqwest::Body::wrap_stream(body_stream))
            }
            Command::CompleteMultipartUpload { ref data, .. } => builder.body(data.to_string()),
            _ => builder.body(Vec::default()),
        }
        .send()
        .await?;

        Ok(res)
    }

    /// `send_request` with the body buffered; for the small-payload callers
    /// (listings, control-plane calls).
    pub(crate) async fn send_request_full(
        &self,
        command: Command<'_>,
        path: &str,
    ) -> Result<Bytes, S3Error> {
        let res = self.send_request(command, path).await?;
        Ok(res.bytes().await?)
    }

    /// HEAD on `path`; `None` when S3 answers 404.
    pub(crate) async fn head(&self, path: &str) -> Result<Option<HeadObjectResult>, S3Error> {
        let res = self.send_request_raw(Command::HeadObject, path).await?;
        let status = res.status();
        if status.is_success() {
            Ok(Some(HeadObjectResult::from(res.headers())))
        } else if status.as_u16() == 404 {
            Ok(None)
        } else {
            // HEAD responses have no body to quote
            Err(S3Error::Remote(status.as_u16(), String::new()))
        }
    }

    pub(crate) async fn put_empty_object(&self, path: &str) -> Result<(), S3Error> {
        self.send_request(Command::PutObject { content: b"" }, path)
            .await?;
        Ok(())
    }

    pub(crate) async fn delete_object(&self, path: &str) -> Result<(), S3Error> {
        self.send_request(Command::DeleteObject, path).await?;
        Ok(())
    }

    pub(crate) async fn initiate_multipart_upload(&self, path: &str) -> Result<String, S3Error> {
        let res = self
            .send_request(Command::InitiateMultipartUpload, path)
            .await?;
        let parsed: InitiateMultipartUploadResponse = quick_xml::de::from_str(&res.text().await?)?;
        Ok(parsed.upload_id)
    }

    pub(crate) async fn upload_part(
        &self,
        path: &str,
        upload_id: &str,
        part_number: u32,
        part_length: usize,
        chunks: Vec<Bytes>,
        sha256: String,
    ) -> Result<(u32, String), S3Error> {
        let res = self
            .send_request(
                Command::UploadPart {
                    part_number,
                    upload_id,
                    part_length,
                    chunks,
                    sha256,
                },
                path,
            )
            .await?;
        let etag = res
            .headers()
            .get("ETag")
            .ok_or(S3Error::UnexpectedResponse(
                "missing ETag in part upload response headers",
            ))?
            .to_str()?
            .to_string();
        Ok((part_number, etag))
    }

    pub(crate) async fn complete_multipart_upload(
        &self,
        path: &str,
        upload_id: &str,
        parts: Vec<Part>,
    ) -> Result<(), S3Error> {
        let data = CompleteMultipartUploadData { parts };
        self.send_request(Command::CompleteMultipartUpload { upload_id, data }, path)
            .await?;
        Ok(())
    }

    pub(crate) async fn abort_multipart_upload(
        &self,
        path: &str,
        upload_id: &str,
    ) -> Result<(), S3Error> {
        self.send_request(Command::AbortMultipartUpload { upload_id }, path)
            .await?;
        Ok(())
    }

    async fn build_headers(
        &self,
        command: &Command<'_>,
        url: &Url,
    ) -> Result<HeaderMap, S3Error> {
        let cmd_hash = command.sha256();
        let now = OffsetDateTime::now_utc();

        let mut api_headers = HeaderMap::with_capacity(8);
        match command {
            Command::PutObject { content } => {
                api_headers.insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("application/octet-stream"),
                );
                api_headers.insert(
                    HeaderName::from_static("content-md5"),
                    HeaderValue::try_from(md5_base64(content))?,
                );
            }
            Command::InitiateMultipartUpload => {
                api_headers.insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("application/octet-stream"),
                );
            }
            Command::CompleteMultipartUpload { .. } => {
                api_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/xml"));
            }
            Command::UploadPart { part_length, .. } => {
                // the body is streamed, so reqwest cannot size it itself
                api_headers.insert(
                    CONTENT_LENGTH,
                    HeaderValue::try_from(part_length.to_string())?,
                );
            }
            Command::GetObject => {
                api_headers.insert(ACCEPT, HeaderValue::from_static("application/octet-stream"));
            }
            Command::HeadObject
            | Command::DeleteObject
            | Command::ListObjectsV2 { .. }
            | Command::AbortMultipartUpload { .. } => {}
        }

        let creds = self.credentials.credentials().await?;
        signature::sig_v4_headers(
            &creds,
            &self.bucket.region,
            &self.bucket.host_domain(),
            &command.http_method(),
            url,
            api_headers,
            &cmd_hash,
            &now,
        )
    }

    fn build_url(&self, command: &Command, path: &str) -> Result<Url, S3Error> {
        let mut url = format!(
            "{}://{}/{}",
            self.bucket.host.scheme(),
            self.bucket.host_domain(),
            self.bucket.name,
        );

        let path = path.strip_prefix('/').unwrap_or(path);
        url.push('/');
        url.push_str(&signature::uri_encode(path, false));

        match command {
            Command::InitiateMultipartUpload => url.push_str("?uploads"),
            Command::AbortMultipartUpload { upload_id }
            | Command::CompleteMultipartUpload { upload_id, .. } => {
                write!(url, "?uploadId={}", upload_id).expect("write! to succeed");
            }
            Command::UploadPart {
                part_number,
                upload_id,
                ..
            } => {
                write!(url, "?partNumber={}&uploadId={}", part_number, upload_id)
                    .expect("write! to succeed");
            }
            _ => {}
        }

        let mut url = Url::parse(&url)?;

        if let Command::ListObjectsV2 {
            prefix,
            delimiter,
            continuation_token,
        } = command
        {
            let mut query_pairs = url.query_pairs_mut();
            query_pairs.append_pair("list-type", "2");
            query_pairs.append_pair("max-keys", &crate::constants::LIST_PAGE_SIZE.to_string());
            match continuation_token {
                // S3 carries prefix and delimiter inside the token, so
                // continuation pages must not resend them.
                Some(token) => {
                    query_pairs.append_pair("continuation-token", token);
                }
                None => {
                    if let Some(d) = delimiter {
                        query_pairs.append_pair("delimiter", d);
                    }
                    query_pairs.append_pair("prefix", prefix);
                }
            }
        }

        Ok(url)
    }
}

impl std::fmt::Debug for S3Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Client")
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{Credentials, StaticCredentials};
    use pretty_assertions::assert_eq;

    fn test_client() -> S3Client {
        let bucket = Bucket::new(
            Url::parse("https://s3.eu-west-2.amazonaws.com").unwrap(),
            "my-bucket".to_string(),
            Region::new("eu-west-2"),
            true,
        );
        let creds = Arc::new(StaticCredentials::new(Credentials::new("id", "secret")));
        S3Client::new(reqwest::Client::new(), bucket, creds)
    }

    #[test]
    fn test_build_url_object() {
        let client = test_client();
        let url = client
            .build_url(&Command::GetObject, "/a dir/file (1).txt")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://s3.eu-west-2.amazonaws.com/my-bucket/a%20dir/file%20%281%29.txt"
        );
    }

    #[test]
    fn test_build_url_multipart() {
        let client = test_client();
        let url = client
            .build_url(&Command::InitiateMultipartUpload, "/a/f")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://s3.eu-west-2.amazonaws.com/my-bucket/a/f?uploads"
        );

        let url = client
            .build_url(
                &Command::UploadPart {
                    part_number: 2,
                    upload_id: "up-1",
                    part_length: 0,
                    chunks: Vec::new(),
                    sha256: String::new(),
                },
                "/a/f",
            )
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://s3.eu-west-2.amazonaws.com/my-bucket/a/f?partNumber=2&uploadId=up-1"
        );
    }

    #[test]
    fn test_build_url_listing_first_and_continuation_pages() {
        let client = test_client();

        let url = client
            .build_url(
                &Command::ListObjectsV2 {
                    prefix: "a/",
                    delimiter: Some("/"),
                    continuation_token: None,
                },
                "/",
            )
            .unwrap();
        let query = url.query().unwrap();
        assert!(query.contains("list-type=2"));
        assert!(query.contains("max-keys=1000"));
        assert!(query.contains("delimiter=%2F"));
        assert!(query.contains("prefix=a%2F"));

        let url = client
            .build_url(
                &Command::ListObjectsV2 {
                    prefix: "a/",
                    delimiter: Some("/"),
                    continuation_token: Some("tok".to_string()),
                },
                "/",
            )
            .unwrap();
        let query = url.query().unwrap();
        assert!(query.contains("continuation-token=tok"));
        assert!(!query.contains("prefix"));
        assert!(!query.contains("delimiter"));
    }

    #[test]
    fn test_host_domain_with_port() {
        let bucket = Bucket::new(
            Url::parse("http://127.0.0.1:9000").unwrap(),
            "b".to_string(),
            Region::new("us-east-1"),
            false,
        );
        assert_eq!(bucket.host_domain(), "127.0.0.1:9000");
    }
}
