use crate::client::S3Client;
use crate::constants::HTTP_DATE;
use crate::error::S3Error;
use crate::list;
use crate::lock::PathLock;
use crate::path::S3Path;
use crate::read::ObjectReader;
use crate::types::{ListKey, Stat};
use crate::write::ObjectWriter;
use futures_util::{Stream, StreamExt};
use time::PrimitiveDateTime;
use tracing::debug;

/// The filesystem surface an FTP-style frontend drives: POSIX-ish
/// operations over bucket objects, with directories emulated as zero-byte
/// `key/` markers.
#[derive(Clone)]
pub struct S3PathIo {
    client: S3Client,
    lock: PathLock,
}

/// What `open` hands back, depending on mode.
pub enum OpenFile {
    Read(ObjectReader),
    Write(ObjectWriter),
}

impl S3PathIo {
    pub fn new(client: S3Client) -> Self {
        Self {
            client,
            lock: PathLock::new(),
        }
    }

    pub fn client(&self) -> &S3Client {
        &self.client
    }

    pub async fn exists(&self, path: &S3Path) -> Result<bool, S3Error> {
        exists(&self.client, path).await
    }

    pub async fn is_dir(&self, path: &S3Path) -> Result<bool, S3Error> {
        is_dir(&self.client, path).await
    }

    pub async fn is_file(&self, path: &S3Path) -> Result<bool, S3Error> {
        is_file(&self.client, path).await
    }

    pub async fn mkdir(&self, path: &S3Path) -> Result<(), S3Error> {
        let _guard = self.lock.lock(std::slice::from_ref(path), &[]).await;

        if exists(&self.client, path).await? {
            return Err(S3Error::AlreadyExists(path.to_string()));
        }
        debug!(%path, "mkdir");
        self.client.put_empty_object(&path.dir_object_path()).await
    }

    pub async fn rmdir(&self, path: &S3Path) -> Result<(), S3Error> {
        let _guard = self.lock.lock(std::slice::from_ref(path), &[]).await;

        if is_file(&self.client, path).await? {
            return Err(S3Error::NotADirectory(path.to_string()));
        }
        if !is_dir(&self.client, path).await? {
            return Err(S3Error::NotFound(path.to_string()));
        }

        let mut keys = list::list_descendant_keys(&self.client, &path.dir_key()).await?;
        sort_for_deletion(&mut keys);
        debug!(%path, keys = keys.len(), "rmdir");
        for key in keys {
            self.client.delete_object(&format!("/{}", key.key)).await?;
        }
        Ok(())
    }

    pub async fn unlink(&self, path: &S3Path) -> Result<(), S3Error> {
        let _guard = self.lock.lock(std::slice::from_ref(path), &[]).await;

        if is_dir(&self.client, path).await? {
            return Err(S3Error::NotAFile(path.to_string()));
        }
        if !is_file(&self.client, path).await? {
            return Err(S3Error::NotFound(path.to_string()));
        }
        debug!(%path, "unlink");
        self.client.delete_object(&path.object_path()).await
    }

    /// The immediate children of `path`, stats attached.
    ///
    /// Deliberately lock-free: a long-running delete of a large tree must
    /// not stall directory enumeration, so a listing may observe a
    /// mid-mutation snapshot.
    pub fn list(&self, path: &S3Path) -> impl Stream<Item = Result<S3Path, S3Error>> {
        let client = self.client.clone();
        let prefix = path.dir_key();
        futures_util::stream::once(async move {
            list::list_immediate_child_paths(&client, &prefix).await
        })
        .map(|page| {
            let items: Vec<Result<S3Path, S3Error>> = match page {
                Ok(children) => children.into_iter().map(Ok).collect(),
                Err(err) => vec![Err(err)],
            };
            futures_util::stream::iter(items)
        })
        .flatten()
    }

    /// Paths produced by listings and opens carry their stat already; for
    /// anything else the object (and then the directory marker) is HEADed.
    pub async fn stat(&self, path: &S3Path) -> Result<Stat, S3Error> {
        if let Some(stat) = path.stat() {
            return Ok(*stat);
        }
        if path.is_root() {
            return Ok(Stat::directory());
        }
        if let Some(head) = self.client.head(&path.object_path()).await? {
            let mtime = match head.last_modified.as_deref() {
                Some(raw) => parse_http_date(raw)?,
                None => 0,
            };
            return Ok(Stat::regular(head.content_length.unwrap_or(0), mtime));
        }
        if self.client.head(&path.dir_object_path()).await?.is_some() {
            return Ok(Stat::directory());
        }
        Err(S3Error::NotFound(path.to_string()))
    }

    pub async fn open(&self, path: &S3Path, mode: &str) -> Result<OpenFile, S3Error> {
        match mode {
            "rb" => Ok(OpenFile::Read(self.open_read(path))),
            "wb" => Ok(OpenFile::Write(self.open_write(path).await?)),
            _ => Err(S3Error::Unsupported("open mode")),
        }
    }

    pub fn open_read(&self, path: &S3Path) -> ObjectReader {
        ObjectReader::new(self.client.clone(), path.clone())
    }

    pub async fn open_write(&self, path: &S3Path) -> Result<ObjectWriter, S3Error> {
        ObjectWriter::open(self.client.clone(), self.lock.clone(), path.clone()).await
    }

    pub async fn rename(&self, _source: &S3Path, _destination: &S3Path) -> Result<(), S3Error> {
        Err(S3Error::Unsupported("rename"))
    }
}

pub(crate) async fn exists(client: &S3Client, path: &S3Path) -> Result<bool, S3Error> {
    Ok(is_file(client, path).await? || is_dir(client, path).await?)
}

pub(crate) async fn is_dir(client: &S3Client, path: &S3Path) -> Result<bool, S3Error> {
    if let Some(stat) = path.stat() {
        return Ok(stat.is_dir());
    }
    if path.is_root() {
        return Ok(true);
    }
    Ok(client.head(&path.dir_object_path()).await?.is_some())
}

pub(crate) async fn is_file(client: &S3Client, path: &S3Path) -> Result<bool, S3Error> {
    if let Some(stat) = path.stat() {
        return Ok(stat.is_file());
    }
    if path.is_root() {
        return Ok(false);
    }
    Ok(client.head(&path.object_path()).await?.is_some())
}

/// Orders descendant keys so children are deleted before their parents:
/// deepest first, then longest, then reverse-lexicographic. S3 accepts any
/// order, but this keeps the visible tree consistent if a deletion fails
/// part way.
fn sort_for_deletion(keys: &mut [ListKey]) {
    fn rank(key: &str) -> (usize, usize, &str) {
        (key.matches('/').count(), key.len(), key)
    }
    keys.sort_by(|a, b| rank(&b.key).cmp(&rank(&a.key)));
}

fn parse_http_date(raw: &str) -> Result<i64, S3Error> {
    Ok(PrimitiveDateTime::parse(raw, HTTP_DATE)?
        .assume_utc()
        .unix_timestamp())
}
