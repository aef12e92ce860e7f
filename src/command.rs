use crate::constants::EMPTY_PAYLOAD_SHA;
use bytes::Bytes;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

#[derive(Debug, Serialize)]
pub struct Part {
    #[serde(rename = "PartNumber")]
    pub part_number: u32,
    #[serde(rename = "ETag")]
    pub etag: String,
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Part><PartNumber>{}</PartNumber><ETag>{}</ETag></Part>",
            self.part_number, self.etag
        )
    }
}

/// Body of CompleteMultipartUpload; parts must be listed in ascending
/// part-number order, which is the order they were started in.
#[derive(Debug)]
pub struct CompleteMultipartUploadData {
    pub parts: Vec<Part>,
}

impl fmt::Display for CompleteMultipartUploadData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<CompleteMultipartUpload>")?;
        for part in &self.parts {
            write!(f, "{}", part)?;
        }
        write!(f, "</CompleteMultipartUpload>")
    }
}

impl CompleteMultipartUploadData {
    pub fn len(&self) -> usize {
        self.to_string().len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

#[derive(Debug)]
pub(crate) enum Command<'a> {
    HeadObject,
    GetObject,
    DeleteObject,
    /// Whole-object PUT. Only used for zero-byte directory markers here,
    /// but works for any small body.
    PutObject {
        content: &'a [u8],
    },
    ListObjectsV2 {
        prefix: &'a str,
        delimiter: Option<&'a str>,
        continuation_token: Option<String>,
    },
    InitiateMultipartUpload,
    /// Part PUT with a streamed body. The payload hash is precomputed
    /// incrementally while chunks were accepted, so the buffers are never
    /// re-hashed or concatenated.
    UploadPart {
        part_number: u32,
        upload_id: &'a str,
        part_length: usize,
        chunks: Vec<Bytes>,
        sha256: String,
    },
    CompleteMultipartUpload {
        upload_id: &'a str,
        data: CompleteMultipartUploadData,
    },
    AbortMultipartUpload {
        upload_id: &'a str,
    },
}

impl<'a> Command<'a> {
    pub(crate) fn http_method(&self) -> http::Method {
        match *self {
            Command::GetObject | Command::ListObjectsV2 { .. } => http::Method::GET,
            Command::PutObject { .. } | Command::UploadPart { .. } => http::Method::PUT,
            Command::DeleteObject | Command::AbortMultipartUpload { .. } => http::Method::DELETE,
            Command::InitiateMultipartUpload | Command::CompleteMultipartUpload { .. } => {
                http::Method::POST
            }
            Command::HeadObject => http::Method::HEAD,
        }
    }

    pub(crate) fn content_length(&self) -> usize {
        match &self {
            Command::PutObject { content } => content.len(),
            Command::UploadPart { part_length, .. } => *part_length,
            Command::CompleteMultipartUpload { data, .. } => data.len(),
            _ => 0,
        }
    }

    pub(crate) fn sha256(&self) -> String {
        match &self {
            Command::PutObject { content } => {
                let mut sha = Sha256::default();
                sha.update(content);
                hex::encode(sha.finalize().as_slice())
            }
            Command::UploadPart { sha256, .. } => sha256.clone(),
            Command::CompleteMultipartUpload { data, .. } => {
                let mut sha = Sha256::default();
                sha.update(data.to_string().as_bytes());
                hex::encode(sha.finalize().as_slice())
            }
            _ => EMPTY_PAYLOAD_SHA.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_complete_body_preserves_part_order() {
        let data = CompleteMultipartUploadData {
            parts: (1..=3)
                .map(|n| Part {
                    part_number: n,
                    etag: format!("\"etag-{n}\""),
                })
                .collect(),
        };
        assert_eq!(
            data.to_string(),
            "<CompleteMultipartUpload>\
             <Part><PartNumber>1</PartNumber><ETag>\"etag-1\"</ETag></Part>\
             <Part><PartNumber>2</PartNumber><ETag>\"etag-2\"</ETag></Part>\
             <Part><PartNumber>3</PartNumber><ETag>\"etag-3\"</ETag></Part>\
             </CompleteMultipartUpload>"
        );
        assert_eq!(data.len(), data.to_string().len());
    }

    #[test]
    fn test_payload_hashes() {
        assert_eq!(Command::GetObject.sha256(), EMPTY_PAYLOAD_SHA);
        assert_eq!(
            Command::PutObject { content: b"" }.sha256(),
            EMPTY_PAYLOAD_SHA
        );
        let upload = Command::UploadPart {
            part_number: 1,
            upload_id: "id",
            part_length: 5,
            chunks: vec![Bytes::from_static(b"hello")],
            sha256: "precomputed".to_string(),
        };
        assert_eq!(upload.sha256(), "precomputed");
        assert_eq!(upload.content_length(), 5);
    }
}
