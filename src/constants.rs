pub const LONG_DATE_TIME: &[time::format_description::BorrowedFormatItem<'static>] =
    time::macros::format_description!("[year][month][day]T[hour][minute][second]Z");
pub const SHORT_DATE: &[time::format_description::BorrowedFormatItem<'static>] =
    time::macros::format_description!("[year][month][day]");
pub const EMPTY_PAYLOAD_SHA: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// `LastModified` as it appears in ListObjectsV2 bodies.
pub const LIST_TIMESTAMP: &[time::format_description::BorrowedFormatItem<'static>] =
    time::macros::format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]Z"
    );
pub const LIST_TIMESTAMP_NO_SUBSEC: &[time::format_description::BorrowedFormatItem<'static>] =
    time::macros::format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z");

/// `Last-Modified` response header (IMF-fixdate).
pub const HTTP_DATE: &[time::format_description::BorrowedFormatItem<'static>] =
    time::macros::format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );

// Parts must be between 5 MiB and 5 GiB; the accumulator is flushed into a
// part upload once it reaches this size.
pub const MIN_PART_BYTES: usize = 25 * 1024 * 1024;

/// How long a write sleeps when part uploads have not kept up with ingress.
pub const IF_SLOW_SLEEP: std::time::Duration = std::time::Duration::from_secs(1);

/// How many unfinished part uploads a single open file may have.
pub const MAX_CONCURRENT_UPLOADS_PER_FILE: usize = 3;

pub const LIST_PAGE_SIZE: usize = 1000;

/// Upper bound on the best-effort AbortMultipartUpload during teardown.
pub const ABORT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

// The S3 console uses '/' both as the folder separator for navigation and
// as the suffix of the zero-byte object it creates for a folder; directory
// markers here follow the same convention.
pub const DIR_SUFFIX: char = '/';

pub const REG_MODE: u32 = 0o100666; // S_IFREG | 0o666
pub const DIR_MODE: u32 = 0o040777; // S_IFDIR | 0o777
pub const MODE_TYPE_MASK: u32 = 0o170000; // S_IFMT
