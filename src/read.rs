use crate::client::S3Client;
use crate::command::Command;
use crate::error::S3Error;
use crate::path::S3Path;
use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};

/// A scoped read of one object.
///
/// Opening is free: S3 GETs are atomic, so no lock is taken. A concurrent
/// writer either has not completed its multipart upload yet, in which case
/// this read sees the previous object (or a 404), or has completed it, in
/// which case the read sees the whole new object.
pub struct ObjectReader {
    client: S3Client,
    path: S3Path,
}

impl ObjectReader {
    pub(crate) fn new(client: S3Client, path: S3Path) -> Self {
        Self { client, path }
    }

    pub fn path(&self) -> &S3Path {
        &self.path
    }

    /// Issues the GET and yields the body in `block_size`d chunks; the
    /// final block may be shorter. Non-2xx fails before the first block.
    pub async fn iter_by_block(
        self,
        block_size: usize,
    ) -> Result<impl Stream<Item = Result<Bytes, S3Error>>, S3Error> {
        let res = self
            .client
            .send_request(Command::GetObject, &self.path.object_path())
            .await?;
        Ok(blocks(res.bytes_stream(), block_size))
    }
}

/// Re-chunks an upstream byte stream into fixed-size blocks.
fn blocks<S, E>(upstream: S, block_size: usize) -> impl Stream<Item = Result<Bytes, S3Error>>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    S3Error: From<E>,
{
    let block_size = block_size.max(1);
    let upstream = Box::pin(upstream);
    futures_util::stream::try_unfold(
        (upstream, BytesMut::new(), false),
        move |(mut upstream, mut buf, mut eof)| async move {
            loop {
                if buf.len() >= block_size {
                    let block = buf.split_to(block_size).freeze();
                    return Ok(Some((block, (upstream, buf, eof))));
                }
                if eof {
                    if buf.is_empty() {
                        return Ok(None);
                    }
                    let block = buf.split().freeze();
                    return Ok(Some((block, (upstream, buf, eof))));
                }
                match upstream.next().await {
                    Some(chunk) => buf.extend_from_slice(&chunk?),
                    None => eof = true,
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use pretty_assertions::assert_eq;

    fn upstream(chunks: &[&[u8]]) -> impl Stream<Item = Result<Bytes, S3Error>> + Send + 'static {
        let owned: Vec<Result<Bytes, S3Error>> = chunks
            .iter()
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        stream::iter(owned)
    }

    async fn collect_blocks(
        chunks: &[&[u8]],
        block_size: usize,
    ) -> Vec<Bytes> {
        blocks(upstream(chunks), block_size)
            .map(|item| item.unwrap())
            .collect::<Vec<_>>()
            .await
    }

    #[tokio::test]
    async fn test_rechunks_across_boundaries() {
        let out = collect_blocks(&[b"abc", b"defgh", b"i"], 4).await;
        assert_eq!(out, vec![Bytes::from("abcd"), Bytes::from("efgh"), Bytes::from("i")]);
    }

    #[tokio::test]
    async fn test_exact_multiple_has_no_trailing_block() {
        let out = collect_blocks(&[b"abcd", b"efgh"], 4).await;
        assert_eq!(out, vec![Bytes::from("abcd"), Bytes::from("efgh")]);
    }

    #[tokio::test]
    async fn test_empty_body_yields_nothing() {
        let out = collect_blocks(&[], 4).await;
        assert!(out.is_empty());
        let out = collect_blocks(&[b""], 4).await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_small_blocks() {
        let out = collect_blocks(&[b"abc"], 1).await;
        assert_eq!(out, vec![Bytes::from("a"), Bytes::from("b"), Bytes::from("c")]);
    }

    #[tokio::test]
    async fn test_upstream_error_propagates() {
        let upstream = stream::iter(vec![
            Ok(Bytes::from("abcd")),
            Err(S3Error::Remote(500, "boom".to_string())),
        ]);
        let out: Vec<Result<Bytes, S3Error>> = blocks(upstream, 2).collect().await;
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].as_ref().unwrap(), &Bytes::from("ab"));
        assert_eq!(out[1].as_ref().unwrap(), &Bytes::from("cd"));
        assert!(matches!(out[2], Err(S3Error::Remote(500, _))));
    }
}
