use crate::constants::DIR_SUFFIX;
use crate::types::Stat;
use std::fmt;
use std::hash::{Hash, Hasher};

/// An absolute POSIX-style path inside the bucket, normalized to its S3 key
/// form. The root is `"."` and maps to the empty key.
///
/// A path may carry a [`Stat`] sidecar when it was produced by a listing or
/// an open; the facade uses the sidecar to avoid re-HEADing objects it has
/// already seen. The sidecar never takes part in equality, ordering or
/// hashing.
#[derive(Debug, Clone)]
pub struct S3Path {
    key: String,
    stat: Option<Stat>,
}

impl S3Path {
    pub fn new<S: AsRef<str>>(path: S) -> Self {
        let key = path
            .as_ref()
            .split(DIR_SUFFIX)
            .filter(|c| !c.is_empty() && *c != ".")
            .collect::<Vec<_>>()
            .join("/");
        Self { key, stat: None }
    }

    pub fn root() -> Self {
        Self {
            key: String::new(),
            stat: None,
        }
    }

    pub fn is_root(&self) -> bool {
        self.key.is_empty()
    }

    /// The S3 object key, without a leading slash. Empty for the root.
    pub fn as_key(&self) -> &str {
        &self.key
    }

    /// The key of this path's directory marker, used as a listing prefix.
    /// The root lists the whole bucket, so its prefix is empty.
    pub fn dir_key(&self) -> String {
        if self.is_root() {
            String::new()
        } else {
            format!("{}{}", self.key, DIR_SUFFIX)
        }
    }

    /// The request path for the object itself: `/{key}`.
    pub fn object_path(&self) -> String {
        format!("/{}", self.key)
    }

    /// The request path for the directory marker: `/{key}/`.
    pub fn dir_object_path(&self) -> String {
        format!("/{}{}", self.key, DIR_SUFFIX)
    }

    pub fn file_name(&self) -> &str {
        self.key.rsplit(DIR_SUFFIX).next().unwrap_or("")
    }

    pub fn parent(&self) -> S3Path {
        match self.key.rfind(DIR_SUFFIX) {
            Some(idx) => Self {
                key: self.key[..idx].to_string(),
                stat: None,
            },
            None => Self::root(),
        }
    }

    /// All strict ancestors, nearest first, ending with the root. Empty for
    /// the root itself.
    pub fn ancestors(&self) -> Vec<S3Path> {
        let mut out = Vec::new();
        let mut current = self.clone();
        while !current.is_root() {
            current = current.parent();
            out.push(current.clone());
        }
        out
    }

    /// Number of components; the root is 0. Doubles as the number of
    /// ancestors, which is what the lock acquisition order sorts by.
    pub fn depth(&self) -> usize {
        if self.is_root() {
            0
        } else {
            self.key.matches(DIR_SUFFIX).count() + 1
        }
    }

    pub fn join<S: AsRef<str>>(&self, name: S) -> S3Path {
        if self.is_root() {
            Self::new(name)
        } else {
            Self::new(format!("{}/{}", self.key, name.as_ref()))
        }
    }

    pub fn stat(&self) -> Option<&Stat> {
        self.stat.as_ref()
    }

    pub fn with_stat(mut self, stat: Stat) -> Self {
        self.stat = Some(stat);
        self
    }
}

impl fmt::Display for S3Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, ".")
        } else {
            write!(f, "{}", self.key)
        }
    }
}

impl PartialEq for S3Path {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for S3Path {}

impl Hash for S3Path {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for S3Path {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for S3Path {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key.cmp(&other.key)
    }
}

impl From<&str> for S3Path {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}
