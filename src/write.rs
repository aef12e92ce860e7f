use crate::client::S3Client;
use crate::command::Part;
use crate::constants::{
    ABORT_TIMEOUT, IF_SLOW_SLEEP, MAX_CONCURRENT_UPLOADS_PER_FILE, MIN_PART_BYTES,
};
use crate::error::S3Error;
use crate::fs;
use crate::lock::PathLock;
use crate::path::S3Path;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::mem;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type PartUpload = JoinHandle<Result<(u32, String), S3Error>>;

/// A scoped multipart write to one object.
///
/// Chunks are pushed in with [`write`](Self::write) at whatever rate the
/// producer runs; once the accumulator reaches [`MIN_PART_BYTES`] it is
/// flushed as a concurrently uploading part. Nothing becomes visible in
/// the bucket until [`finish`](Self::finish) completes the upload — a
/// writer that is dropped instead (error, disconnect) leaves the upload id
/// abandoned for the bucket lifecycle policy to reap.
pub struct ObjectWriter {
    client: S3Client,
    lock: PathLock,
    path: S3Path,
    upload_id: String,
    part_uploads: Vec<PartUpload>,
    part_length: usize,
    part_chunks: Vec<Bytes>,
    part_hasher: Sha256,
    settled: bool,
}

impl ObjectWriter {
    pub(crate) async fn open(
        client: S3Client,
        lock: PathLock,
        path: S3Path,
    ) -> Result<Self, S3Error> {
        let upload_id = client
            .initiate_multipart_upload(&path.object_path())
            .await?;
        debug!(%path, %upload_id, "started multipart upload");
        Ok(Self {
            client,
            lock,
            path,
            upload_id,
            part_uploads: Vec::new(),
            part_length: 0,
            part_chunks: Vec::new(),
            part_hasher: Sha256::default(),
            settled: false,
        })
    }

    pub fn path(&self) -> &S3Path {
        &self.path
    }

    /// Accepts the next chunk. If ingress outruns egress to S3, first
    /// sleeps once, then fails with `BackpressureExceeded` rather than
    /// buffering without bound. Egress is normally the faster side, so
    /// this is a safety valve, not steady-state flow control.
    pub async fn write(&mut self, chunk: Bytes) -> Result<(), S3Error> {
        if second_most_recent_pending(&self.part_uploads) {
            tokio::time::sleep(IF_SLOW_SLEEP).await;

            let in_progress = self
                .part_uploads
                .iter()
                .filter(|upload| !upload.is_finished())
                .count();
            if in_progress > MAX_CONCURRENT_UPLOADS_PER_FILE {
                return Err(S3Error::BackpressureExceeded);
            }
        }

        self.part_length += chunk.len();
        self.part_hasher.update(&chunk);
        self.part_chunks.push(chunk);

        if self.part_length >= MIN_PART_BYTES {
            self.start_part_upload();
        }
        Ok(())
    }

    /// Flushes the accumulator as the next part and resets it. Part
    /// numbers count up from 1 in the order parts were started.
    fn start_part_upload(&mut self) {
        let part_number = (self.part_uploads.len() + 1) as u32;
        let part_length = mem::replace(&mut self.part_length, 0);
        let chunks = mem::take(&mut self.part_chunks);
        let sha256 = hex::encode(mem::take(&mut self.part_hasher).finalize());

        let client = self.client.clone();
        let path = self.path.object_path();
        let upload_id = self.upload_id.clone();
        debug!(part_number, part_length, "uploading part");
        self.part_uploads.push(tokio::spawn(async move {
            client
                .upload_part(&path, &upload_id, part_number, part_length, chunks, sha256)
                .await
        }));
    }

    /// Commits the upload. Waits for every in-flight part, then — under
    /// the path's write lock, the only phase that changes visible state —
    /// checks the parent directory and sends the completion with the parts
    /// in submission order.
    #[tracing::instrument(level = "debug", skip_all, fields(path = %self.path))]
    pub async fn finish(mut self) -> Result<(), S3Error> {
        // S3 rejects a completion with zero parts, which is what writing
        // an empty file would otherwise produce
        if self.part_uploads.is_empty() {
            self.write(Bytes::new()).await?;
        }
        if !self.part_chunks.is_empty() {
            self.start_part_upload();
        }

        let parts = match self.collect_parts().await {
            Ok(parts) => parts,
            Err(err) => {
                self.abort_best_effort().await;
                self.settled = true;
                return Err(err);
            }
        };

        let _guard = self.lock.lock(std::slice::from_ref(&self.path), &[]).await;

        let parent = self.path.parent();
        if fs::is_file(&self.client, &parent).await? {
            return Err(S3Error::NotADirectory(parent.to_string()));
        }
        if !fs::is_dir(&self.client, &parent).await? {
            return Err(S3Error::NotFound(parent.to_string()));
        }

        // Overwrites are allowed, so the file itself is not checked

        self.client
            .complete_multipart_upload(&self.path.object_path(), &self.upload_id, parts)
            .await?;
        self.settled = true;
        debug!("multipart upload completed");
        Ok(())
    }

    /// Abandons the upload and tells S3 about it, best effort.
    pub async fn abort(mut self) {
        self.abort_best_effort().await;
        self.settled = true;
    }

    async fn collect_parts(&mut self) -> Result<Vec<Part>, S3Error> {
        let mut parts = Vec::with_capacity(self.part_uploads.len());
        for upload in self.part_uploads.drain(..) {
            let (part_number, etag) = upload.await??;
            parts.push(Part { part_number, etag });
        }
        Ok(parts)
    }

    // Teardown must never hang: the abort is bounded, its failure is only
    // logged, and lifecycle policy remains the cleanup of record.
    async fn abort_best_effort(&self) {
        let object_path = self.path.object_path();
        let abort = self
            .client
            .abort_multipart_upload(&object_path, &self.upload_id);
        match tokio::time::timeout(ABORT_TIMEOUT, abort).await {
            Ok(Ok(())) => debug!(upload_id = %self.upload_id, "aborted multipart upload"),
            Ok(Err(err)) => {
                warn!(upload_id = %self.upload_id, "failed to abort multipart upload: {}", err)
            }
            Err(_) => warn!(upload_id = %self.upload_id, "abort of multipart upload timed out"),
        }
    }
}

impl Drop for ObjectWriter {
    fn drop(&mut self) {
        if !self.settled {
            warn!(
                path = %self.path,
                upload_id = %self.upload_id,
                "write session dropped before finish; abandoning multipart upload"
            );
        }
    }
}

/// The backpressure trigger: more than two parts started and the
/// second-most-recent has still not finished.
fn second_most_recent_pending(uploads: &[PartUpload]) -> bool {
    uploads.len() > 2 && !uploads[uploads.len() - 2].is_finished()
}
