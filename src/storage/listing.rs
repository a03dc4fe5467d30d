//! `ListBucketResult` XML parsing.

use quick_xml::events::Event;
use quick_xml::Reader;

use super::{ListPage, ObjectEntry, StorageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Key,
    Size,
    LastModified,
    IsTruncated,
    NextMarker,
}

#[derive(Default)]
struct PendingEntry {
    key: Option<String>,
    size: u64,
    last_modified: Option<String>,
}

/// Parse one ListObjects (v1) response body.
///
/// Only `Contents`, `IsTruncated` and `NextMarker` are read; owner, storage
/// class and echoed request parameters are ignored.
pub fn parse_list_bucket_result(xml: &[u8]) -> Result<ListPage, StorageError> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);

    let mut buf: Vec<u8> = Vec::new();
    let mut page = ListPage::default();
    let mut saw_root = false;
    let mut entry: Option<PendingEntry> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"ListBucketResult" => saw_root = true,
                b"Contents" => entry = Some(PendingEntry::default()),
                b"Key" if entry.is_some() => field = Some(Field::Key),
                b"Size" if entry.is_some() => field = Some(Field::Size),
                b"LastModified" if entry.is_some() => field = Some(Field::LastModified),
                b"IsTruncated" if entry.is_none() => field = Some(Field::IsTruncated),
                b"NextMarker" if entry.is_none() => field = Some(Field::NextMarker),
                _ => field = None,
            },
            Ok(Event::Text(e)) => {
                let Some(current) = field else {
                    buf.clear();
                    continue;
                };
                let text = e
                    .unescape()
                    .map_err(|e| StorageError::Xml(e.to_string()))?
                    .into_owned();
                match (current, entry.as_mut()) {
                    (Field::Key, Some(pending)) => pending.key = Some(text),
                    (Field::Size, Some(pending)) => {
                        pending.size = text
                            .parse()
                            .map_err(|_| StorageError::Xml(format!("invalid object size: {text}")))?;
                    }
                    (Field::LastModified, Some(pending)) => pending.last_modified = Some(text),
                    (Field::IsTruncated, _) => page.is_truncated = text.eq_ignore_ascii_case("true"),
                    (Field::NextMarker, _) => page.next_marker = Some(text),
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                field = None;
                if e.local_name().as_ref() == b"Contents" {
                    let pending = entry.take().unwrap_or_default();
                    let Some(key) = pending.key else {
                        return Err(StorageError::Xml("Contents element without Key".into()));
                    };
                    page.objects.push(ObjectEntry {
                        key,
                        size: pending.size,
                        last_modified: pending.last_modified,
                    });
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(StorageError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    if !saw_root {
        return Err(StorageError::Xml("missing ListBucketResult element".into()));
    }

    // Some servers omit NextMarker on truncated pages without a delimiter.
    if page.is_truncated && page.next_marker.is_none() {
        page.next_marker = page.objects.last().map(|o| o.key.clone());
    }

    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRUNCATED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult>
  <Name>portfolio</Name>
  <Prefix>gallery/</Prefix>
  <Marker></Marker>
  <MaxKeys>2</MaxKeys>
  <Delimiter></Delimiter>
  <IsTruncated>true</IsTruncated>
  <NextMarker>gallery/tokyo/a.webp</NextMarker>
  <Contents>
    <Key>gallery/tokyo/album.yaml</Key>
    <LastModified>2024-04-01T10:00:00.000Z</LastModified>
    <ETag>"5B3C1A2E053D763E1B002CC607C5A0FE"</ETag>
    <Type>Normal</Type>
    <Size>120</Size>
    <StorageClass>Standard</StorageClass>
    <Owner><ID>1</ID><DisplayName>1</DisplayName></Owner>
  </Contents>
  <Contents>
    <Key>gallery/tokyo/a.webp</Key>
    <LastModified>2024-04-01T10:00:01.000Z</LastModified>
    <Size>345678</Size>
  </Contents>
</ListBucketResult>"#;

    #[test]
    fn test_parse_truncated_page() {
        let page = parse_list_bucket_result(TRUNCATED.as_bytes()).unwrap();
        assert!(page.is_truncated);
        assert_eq!(page.next_marker.as_deref(), Some("gallery/tokyo/a.webp"));
        assert_eq!(page.objects.len(), 2);
        assert_eq!(page.objects[0].key, "gallery/tokyo/album.yaml");
        assert_eq!(page.objects[0].size, 120);
        assert_eq!(
            page.objects[1].last_modified.as_deref(),
            Some("2024-04-01T10:00:01.000Z")
        );
    }

    #[test]
    fn test_parse_last_page() {
        let xml = r#"<ListBucketResult>
            <Prefix>gallery/</Prefix>
            <IsTruncated>false</IsTruncated>
            <Contents><Key>gallery/kyoto/b&amp;w.webp</Key><Size>1</Size></Contents>
        </ListBucketResult>"#;
        let page = parse_list_bucket_result(xml.as_bytes()).unwrap();
        assert!(!page.is_truncated);
        assert!(page.next_marker.is_none());
        assert_eq!(page.objects[0].key, "gallery/kyoto/b&w.webp");
    }

    #[test]
    fn test_truncated_without_next_marker_uses_last_key() {
        let xml = r#"<ListBucketResult>
            <IsTruncated>true</IsTruncated>
            <Contents><Key>gallery/a/1.webp</Key><Size>1</Size></Contents>
            <Contents><Key>gallery/a/2.webp</Key><Size>1</Size></Contents>
        </ListBucketResult>"#;
        let page = parse_list_bucket_result(xml.as_bytes()).unwrap();
        assert_eq!(page.next_marker.as_deref(), Some("gallery/a/2.webp"));
    }

    #[test]
    fn test_empty_listing() {
        let xml = "<ListBucketResult><IsTruncated>false</IsTruncated></ListBucketResult>";
        let page = parse_list_bucket_result(xml.as_bytes()).unwrap();
        assert!(page.objects.is_empty());
    }

    #[test]
    fn test_rejects_error_document() {
        let xml = "<Error><Code>AccessDenied</Code><Message>denied</Message></Error>";
        assert!(matches!(
            parse_list_bucket_result(xml.as_bytes()),
            Err(StorageError::Xml(_))
        ));
    }

    #[test]
    fn test_rejects_invalid_size() {
        let xml = "<ListBucketResult><Contents><Key>k</Key><Size>big</Size></Contents></ListBucketResult>";
        assert!(parse_list_bucket_result(xml.as_bytes()).is_err());
    }
}
