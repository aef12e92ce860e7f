use crate::client::S3Client;
use crate::command::Command;
use crate::constants::{LIST_TIMESTAMP, LIST_TIMESTAMP_NO_SUBSEC};
use crate::error::S3Error;
use crate::path::S3Path;
use crate::types::{ListBucketResult, ListKey, ListPrefix, Stat};
use time::PrimitiveDateTime;

/// Drives paginated ListObjectsV2 under `key_prefix`. The first page sends
/// `prefix` and `delimiter`; continuation pages send only the token.
pub(crate) async fn list_keys(
    client: &S3Client,
    key_prefix: &str,
    delimiter: Option<&str>,
) -> Result<(Vec<ListKey>, Vec<ListPrefix>), S3Error> {
    let mut keys = Vec::new();
    let mut prefixes = Vec::new();
    let mut continuation_token = None;

    loop {
        let body = client
            .send_request_full(
                Command::ListObjectsV2 {
                    prefix: key_prefix,
                    delimiter,
                    continuation_token,
                },
                "/",
            )
            .await?;
        let (next_token, page_keys, page_prefixes) = parse_list_page(&body)?;
        keys.extend(page_keys);
        prefixes.extend(page_prefixes);

        match next_token {
            Some(token) => continuation_token = Some(token),
            None => break,
        }
    }

    Ok((keys, prefixes))
}

/// The immediate children of a directory, as stat-carrying paths. The
/// directory's own zero-byte marker (and any other key ending in '/') is
/// not a child; prefixes become directories with zeroed timestamps, since
/// S3 has nothing resembling a directory mtime.
pub(crate) async fn list_immediate_child_paths(
    client: &S3Client,
    key_prefix: &str,
) -> Result<Vec<S3Path>, S3Error> {
    let (keys, prefixes) = list_keys(client, key_prefix, Some("/")).await?;
    Ok(child_paths(keys, prefixes))
}

/// Every key under `key_prefix`, markers included; recursive, no delimiter.
pub(crate) async fn list_descendant_keys(
    client: &S3Client,
    key_prefix: &str,
) -> Result<Vec<ListKey>, S3Error> {
    let (keys, _) = list_keys(client, key_prefix, None).await?;
    Ok(keys)
}

fn child_paths(keys: Vec<ListKey>, prefixes: Vec<ListPrefix>) -> Vec<S3Path> {
    keys.into_iter()
        .filter(|list_key| !list_key.key.ends_with('/'))
        .map(|list_key| {
            let stat = Stat::regular(list_key.size, list_key.last_modified);
            S3Path::new(&list_key.key).with_stat(stat)
        })
        .chain(
            prefixes
                .into_iter()
                .map(|list_prefix| S3Path::new(&list_prefix.prefix).with_stat(Stat::directory())),
        )
        .collect()
}

fn parse_list_page(
    body: &[u8],
) -> Result<(Option<String>, Vec<ListKey>, Vec<ListPrefix>), S3Error> {
    let page: ListBucketResult = quick_xml::de::from_reader(body)?;

    let mut keys = Vec::with_capacity(page.contents.len());
    for object in page.contents {
        let last_modified = parse_list_timestamp(&object.last_modified)?;
        keys.push(ListKey {
            key: object.key,
            size: object.size,
            last_modified,
        });
    }

    let prefixes = page
        .common_prefixes
        .into_iter()
        .map(|p| ListPrefix {
            prefix: p.prefix.trim_end_matches('/').to_string(),
        })
        .collect();

    Ok((page.next_continuation_token, keys, prefixes))
}

fn parse_list_timestamp(raw: &str) -> Result<i64, S3Error> {
    let parsed = PrimitiveDateTime::parse(raw, LIST_TIMESTAMP)
        .or_else(|_| PrimitiveDateTime::parse(raw, LIST_TIMESTAMP_NO_SUBSEC))?;
    Ok(parsed.assume_utc().unix_timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{DIR_MODE, REG_MODE};
    use pretty_assertions::assert_eq;

    const PAGE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
    <Name>my-bucket</Name>
    <Prefix>a/</Prefix>
    <KeyCount>3</KeyCount>
    <MaxKeys>1000</MaxKeys>
    <Delimiter>/</Delimiter>
    <IsTruncated>true</IsTruncated>
    <NextContinuationToken>token-1</NextContinuationToken>
    <Contents>
        <Key>a/</Key>
        <LastModified>2009-10-12T17:50:30.000Z</LastModified>
        <ETag>&quot;fba9dede5f27731c9771645a39863328&quot;</ETag>
        <Size>0</Size>
        <StorageClass>STANDARD</StorageClass>
    </Contents>
    <Contents>
        <Key>a/file.txt</Key>
        <LastModified>2009-10-12T17:50:30.000Z</LastModified>
        <ETag>&quot;9c8af9a76df052144598c115ef33b45c&quot;</ETag>
        <Size>434234</Size>
        <StorageClass>STANDARD</StorageClass>
    </Contents>
    <CommonPrefixes>
        <Prefix>a/photos/</Prefix>
    </CommonPrefixes>
</ListBucketResult>"#;

    #[test]
    fn test_parse_list_page() {
        let (token, keys, prefixes) = parse_list_page(PAGE.as_bytes()).unwrap();
        assert_eq!(token.as_deref(), Some("token-1"));
        assert_eq!(
            keys,
            vec![
                ListKey {
                    key: "a/".to_string(),
                    size: 0,
                    last_modified: 1_255_369_830,
                },
                ListKey {
                    key: "a/file.txt".to_string(),
                    size: 434_234,
                    last_modified: 1_255_369_830,
                },
            ]
        );
        assert_eq!(
            prefixes,
            vec![ListPrefix {
                prefix: "a/photos".to_string()
            }]
        );
    }

    #[test]
    fn test_parse_list_page_without_token() {
        let page = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
    <Name>my-bucket</Name>
    <IsTruncated>false</IsTruncated>
</ListBucketResult>"#;
        let (token, keys, prefixes) = parse_list_page(page.as_bytes()).unwrap();
        assert_eq!(token, None);
        assert!(keys.is_empty());
        assert!(prefixes.is_empty());
    }

    #[test]
    fn test_timestamp_formats() {
        assert_eq!(
            parse_list_timestamp("1970-01-01T00:00:00.000Z").unwrap(),
            0
        );
        assert_eq!(
            parse_list_timestamp("2009-10-12T17:50:30.000Z").unwrap(),
            1_255_369_830
        );
        // some S3-compatible stores omit the subsecond part
        assert_eq!(
            parse_list_timestamp("2009-10-12T17:50:30Z").unwrap(),
            1_255_369_830
        );
        assert!(parse_list_timestamp("not-a-date").is_err());
    }

    #[test]
    fn test_child_paths_filters_markers() {
        let keys = vec![
            ListKey {
                key: "a/".to_string(),
                size: 0,
                last_modified: 10,
            },
            ListKey {
                key: "a/file.txt".to_string(),
                size: 7,
                last_modified: 20,
            },
        ];
        let prefixes = vec![ListPrefix {
            prefix: "a/photos".to_string(),
        }];

        let children = child_paths(keys, prefixes);
        assert_eq!(children.len(), 2);

        assert_eq!(children[0], S3Path::new("a/file.txt"));
        let file_stat = children[0].stat().unwrap();
        assert_eq!(file_stat.mode, REG_MODE);
        assert_eq!(file_stat.size, 7);
        assert_eq!(file_stat.mtime, 20);

        assert_eq!(children[1], S3Path::new("a/photos"));
        let dir_stat = children[1].stat().unwrap();
        assert_eq!(dir_stat.mode, DIR_MODE);
        assert_eq!(dir_stat.mtime, 0);
    }
}
