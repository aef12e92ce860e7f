pub use crate::client::{Bucket, S3Client};
pub use crate::credentials::{
    AccessKeyId, AccessKeySecret, Credentials, ProvideCredentials, StaticCredentials,
};
pub use crate::error::S3Error;
pub use crate::fs::{OpenFile, S3PathIo};
pub use crate::path::S3Path;
pub use crate::types::Stat;
