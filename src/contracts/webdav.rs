//! WebDAV primitives against the PanDav endpoint: PROPFIND-based discovery,
//! existence checks ahead of writes, and the raw HTTP verbs (MKCOL, PUT,
//! DELETE) that don't have first-class `reqwest` methods.

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use reqwest::StatusCode;

use crate::error::{BridgeError, Result};

use super::{EntryKind, NormalizedEntry};

#[async_trait]
pub trait WebDavClient: Send + Sync {
    /// Whether a resource exists at `path`. Best-effort: a transient network
    /// error surfaces as an error rather than a false `false`. Callers that
    /// need both existence and metadata call `exists` then `stat`; the pair
    /// is not atomic against a concurrent mutation on the same path.
    async fn exists(&self, path: &str) -> Result<bool>;

    /// PROPFIND depth-1 metadata for a single resource.
    async fn stat(&self, path: &str) -> Result<NormalizedEntry>;

    /// MKCOL a collection at `path`; idempotent if it already exists.
    async fn mkdir(&self, path: &str) -> Result<()>;

    /// PUT a streamed body at `path`.
    async fn put_stream(&self, path: &str, size: u64, body: reqwest::Body) -> Result<()>;

    /// DELETE the resource at `path`.
    async fn delete(&self, path: &str) -> Result<()>;
}

pub struct WebDavHttpClient {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl WebDavHttpClient {
    pub fn new(base_url: String, username: String, password: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(BridgeError::Http)?;
        Ok(Self {
            client,
            base_url,
            username,
            password,
        })
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:propfind xmlns:D="DAV:">
  <D:prop>
    <D:displayname/>
    <D:getcontentlength/>
    <D:resourcetype/>
    <D:getlastmodified/>
  </D:prop>
</D:propfind>"#;

#[async_trait]
impl WebDavClient for WebDavHttpClient {
    async fn exists(&self, path: &str) -> Result<bool> {
        let resp = self
            .client
            .request(reqwest::Method::from_bytes(b"PROPFIND").unwrap(), self.url_for(path))
            .basic_auth(&self.username, Some(&self.password))
            .header("Depth", "0")
            .body(PROPFIND_BODY)
            .send()
            .await
            .map_err(BridgeError::Http)?;

        match resp.status() {
            StatusCode::MULTI_STATUS | StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            other => Err(BridgeError::RemoteLogical(format!("PROPFIND {path}: {other}"))),
        }
    }

    async fn stat(&self, path: &str) -> Result<NormalizedEntry> {
        let resp = self
            .client
            .request(reqwest::Method::from_bytes(b"PROPFIND").unwrap(), self.url_for(path))
            .basic_auth(&self.username, Some(&self.password))
            .header("Depth", "0")
            .body(PROPFIND_BODY)
            .send()
            .await
            .map_err(BridgeError::Http)?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(BridgeError::NotFound(path.to_string()));
        }
        if !resp.status().is_success() {
            return Err(BridgeError::RemoteLogical(format!(
                "PROPFIND {path}: {}",
                resp.status()
            )));
        }

        let body = resp.text().await.map_err(BridgeError::Http)?;
        parse_propfind_entry(path, &body)
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        let resp = self
            .client
            .request(reqwest::Method::from_bytes(b"MKCOL").unwrap(), self.url_for(path))
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(BridgeError::Http)?;

        match resp.status() {
            StatusCode::CREATED => Ok(()),
            // already exists
            StatusCode::METHOD_NOT_ALLOWED => Ok(()),
            other => Err(BridgeError::RemoteLogical(format!("MKCOL {path}: {other}"))),
        }
    }

    async fn put_stream(&self, path: &str, size: u64, body: reqwest::Body) -> Result<()> {
        let resp = self
            .client
            .put(self.url_for(path))
            .basic_auth(&self.username, Some(&self.password))
            .header("Content-Length", size.to_string())
            .body(body)
            .send()
            .await
            .map_err(BridgeError::Http)?;

        if !resp.status().is_success() {
            return Err(BridgeError::RemoteLogical(format!("PUT {path}: {}", resp.status())));
        }
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let resp = self
            .client
            .delete(self.url_for(path))
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(BridgeError::Http)?;

        if !resp.status().is_success() && resp.status() != StatusCode::NOT_FOUND {
            return Err(BridgeError::RemoteLogical(format!("DELETE {path}: {}", resp.status())));
        }
        Ok(())
    }
}

/// Extract the fields we need out of a single-resource PROPFIND response
/// (Depth: 0, so exactly one `<D:response>`). `resourcetype` only marks a
/// collection when the current open tag is `resourcetype` itself, so a
/// `<D:collection/>` belonging to some other element can't misclassify the
/// target.
fn parse_propfind_entry(path: &str, body: &str) -> Result<NormalizedEntry> {
    let name = path.rsplit('/').next().unwrap_or(path).to_string();

    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut is_dir = false;
    let mut size: u64 = 0;
    let mut last_modified = None;
    let mut current = String::new();
    let mut in_resourcetype = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => {
                let tag = local_name(e.name().as_ref());
                in_resourcetype = tag == "resourcetype";
                current = tag.to_string();
            }
            Ok(Event::Empty(e)) => {
                let tag = local_name(e.name().as_ref());
                if in_resourcetype && tag == "collection" {
                    is_dir = true;
                }
            }
            Ok(Event::End(e)) => {
                if local_name(e.name().as_ref()) == "resourcetype" {
                    in_resourcetype = false;
                }
                current.clear();
            }
            Ok(Event::Text(t)) => {
                let text = t.unescape().map(|s| s.into_owned()).unwrap_or_default();
                match current.as_str() {
                    "getcontentlength" => size = text.parse().unwrap_or(0),
                    "getlastmodified" => {
                        last_modified = chrono::DateTime::parse_from_rfc2822(&text)
                            .ok()
                            .map(|dt| dt.with_timezone(&chrono::Utc));
                    }
                    _ => {}
                }
            }
            Ok(_) => {}
            Err(e) => return Err(BridgeError::RemoteLogical(format!("PROPFIND parse error for {path}: {e}"))),
        }
        buf.clear();
    }

    Ok(NormalizedEntry {
        id: path.to_string(),
        name,
        size,
        kind: if is_dir { EntryKind::Directory } else { EntryKind::File },
        creator: None,
        last_modified,
    })
}

fn local_name(qname: &[u8]) -> &str {
    std::str::from_utf8(qname).ok().and_then(|n| n.rsplit(':').next()).unwrap_or("")
}

/// Stand-in used when a session has no PanDav credentials: every call
/// fails with a permission error, which the `/pandav/*` routes turn into
/// a 403.
pub struct NoWebDavClient;

#[async_trait]
impl WebDavClient for NoWebDavClient {
    async fn exists(&self, _path: &str) -> Result<bool> {
        Err(BridgeError::Permission("WebDAV credentials not configured".into()))
    }
    async fn stat(&self, _path: &str) -> Result<NormalizedEntry> {
        Err(BridgeError::Permission("WebDAV credentials not configured".into()))
    }
    async fn mkdir(&self, _path: &str) -> Result<()> {
        Err(BridgeError::Permission("WebDAV credentials not configured".into()))
    }
    async fn put_stream(&self, _path: &str, _size: u64, _body: reqwest::Body) -> Result<()> {
        Err(BridgeError::Permission("WebDAV credentials not configured".into()))
    }
    async fn delete(&self, _path: &str) -> Result<()> {
        Err(BridgeError::Permission("WebDAV credentials not configured".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_directory_entry() {
        let body = r#"<D:response><D:propstat><D:prop>
            <D:resourcetype><D:collection/></D:resourcetype>
        </D:prop></D:propstat></D:response>"#;
        let entry = parse_propfind_entry("/foo/bar", body).unwrap();
        assert_eq!(entry.kind, EntryKind::Directory);
        assert_eq!(entry.name, "bar");
    }

    #[test]
    fn parses_file_entry_with_size() {
        let body = "<D:prop><D:getcontentlength>42</D:getcontentlength></D:prop>";
        let entry = parse_propfind_entry("/a/b.txt", body).unwrap();
        assert_eq!(entry.kind, EntryKind::File);
        assert_eq!(entry.size, 42);
    }

    #[test]
    fn empty_resourcetype_is_not_a_collection() {
        let body = r#"<D:response><D:propstat><D:prop>
            <D:getcontentlength>7</D:getcontentlength>
            <D:resourcetype/>
        </D:prop></D:propstat></D:response>"#;
        let entry = parse_propfind_entry("/a/b.txt", body).unwrap();
        assert_eq!(entry.kind, EntryKind::File);
        assert_eq!(entry.size, 7);
    }

    #[test]
    fn collection_tag_outside_resourcetype_does_not_misclassify() {
        // A stray `<D:collection>`-like text elsewhere in the body (e.g. inside
        // a displayname) must not be enough to mark the target as a directory;
        // only one actually nested under `resourcetype` counts.
        let body = r#"<D:response><D:propstat><D:prop>
            <D:displayname>not-a-collection</D:displayname>
            <D:getcontentlength>3</D:getcontentlength>
            <D:resourcetype/>
        </D:prop></D:propstat></D:response>"#;
        let entry = parse_propfind_entry("/a/b.txt", body).unwrap();
        assert_eq!(entry.kind, EntryKind::File);
    }
}
