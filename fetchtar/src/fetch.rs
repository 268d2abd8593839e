// SPDX-FileCopyrightText: 2026 fetchtar contributors
// SPDX-License-Identifier: MIT

//! The fetch collaborator.
//!
//! The pipeline never talks to a transport directly. It asks a [`Fetch`]
//! implementation for a [`Response`], whose body either arrives as a stream
//! of chunks or as one buffer once complete.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::io;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;
use tracing::debug;

/// Chunk size for streamed file bodies (64 KiB).
const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Name used when neither the response nor the locator suggests one.
const FALLBACK_NAME: &str = "download";

/// Status line and headers of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMeta {
    pub url: String,
    pub ok: bool,
    pub status: u16,
    /// Header names are stored lowercase.
    pub headers: BTreeMap<String, String>,
    /// Declared body length; `None` when absent or zero.
    pub content_length: Option<u64>,
}

impl ResponseMeta {
    pub fn new(url: impl Into<String>, status: u16) -> Self {
        Self {
            url: url.into(),
            ok: (200..300).contains(&status),
            status,
            headers: BTreeMap::new(),
            content_length: None,
        }
    }

    /// Add a header, keeping `content_length` in sync with `Content-Length`.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        let name = name.to_ascii_lowercase();
        let value = value.into();
        if name == "content-length" {
            self.content_length = value.trim().parse::<u64>().ok().filter(|len| *len > 0);
        }
        self.headers.insert(name, value);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// File name from `Content-Disposition`, else the last path segment of
    /// the locator.
    pub fn suggested_file_name(&self) -> String {
        self.header("content-disposition")
            .and_then(disposition_file_name)
            .or_else(|| last_segment(&self.url))
            .unwrap_or_else(|| FALLBACK_NAME.to_string())
    }
}

fn disposition_file_name(value: &str) -> Option<String> {
    value.split(';').find_map(|param| {
        let (key, raw) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("filename") {
            return None;
        }
        let name = raw.trim().trim_matches('"');
        (!name.is_empty()).then(|| name.to_string())
    })
}

fn last_segment(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// Response body, delivered incrementally or whole.
pub enum Body {
    Stream(BoxStream<'static, io::Result<Bytes>>),
    Whole(BoxFuture<'static, io::Result<Bytes>>),
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream(_) => f.write_str("Body::Stream"),
            Self::Whole(_) => f.write_str("Body::Whole"),
        }
    }
}

#[derive(Debug)]
pub struct Response {
    pub meta: ResponseMeta,
    pub body: Body,
}

impl Response {
    pub fn stream(meta: ResponseMeta, stream: BoxStream<'static, io::Result<Bytes>>) -> Self {
        Self {
            meta,
            body: Body::Stream(stream),
        }
    }

    pub fn whole(meta: ResponseMeta, body: BoxFuture<'static, io::Result<Bytes>>) -> Self {
        Self {
            meta,
            body: Body::Whole(body),
        }
    }
}

/// Source of responses for entry locators.
pub trait Fetch: Send + Sync {
    /// Fetch `url`.
    ///
    /// Transport failures are errors; a response with `ok == false` is a
    /// successful fetch of an unsuccessful resource.
    fn fetch(&self, url: &str) -> impl Future<Output = io::Result<Response>> + Send;
}

/// How [`FileFetcher`] delivers bodies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BodyMode {
    #[default]
    Stream,
    Whole,
}

/// Serves `file://` locators and plain paths from the local filesystem.
#[derive(Debug, Clone)]
pub struct FileFetcher {
    mode: BodyMode,
    chunk_size: usize,
}

impl Default for FileFetcher {
    fn default() -> Self {
        Self {
            mode: BodyMode::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl FileFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: BodyMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

impl Fetch for FileFetcher {
    async fn fetch(&self, url: &str) -> io::Result<Response> {
        let path = url.strip_prefix("file://").unwrap_or(url);
        let mut file = match tokio::fs::File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("{path} not found");
                let body = futures::future::ready(Ok(Bytes::new())).boxed();
                return Ok(Response::whole(ResponseMeta::new(url, 404), body));
            }
            Err(e) => return Err(e),
        };
        let len = file.metadata().await?.len();
        let meta = ResponseMeta::new(url, 200).with_header("Content-Length", len.to_string());

        Ok(match self.mode {
            BodyMode::Stream => {
                Response::stream(meta, ReaderStream::with_capacity(file, self.chunk_size).boxed())
            }
            BodyMode::Whole => {
                let body = async move {
                    let mut content = Vec::with_capacity(len as usize);
                    file.read_to_end(&mut content).await?;
                    Ok(Bytes::from(content))
                };
                Response::whole(meta, body.boxed())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::quoted("attachment; filename=\"report.pdf\"", "report.pdf")]
    #[case::bare("attachment; filename=data.csv", "data.csv")]
    #[case::spaced("inline ; FileName = \"a b.txt\"", "a b.txt")]
    fn test_name_from_disposition(#[case] header: &str, #[case] expected: &str) {
        let meta = ResponseMeta::new("https://host/ignored", 200)
            .with_header("Content-Disposition", header);
        assert_eq!(meta.suggested_file_name(), expected);
    }

    #[rstest]
    #[case::path("https://host/dir/file.bin?x=1#top", "file.bin")]
    #[case::file_url("file:///srv/a.txt", "a.txt")]
    #[case::trailing_slash("https://host/dir/", "download")]
    fn test_name_from_url(#[case] url: &str, #[case] expected: &str) {
        assert_eq!(ResponseMeta::new(url, 200).suggested_file_name(), expected);
    }

    #[test]
    fn test_content_length() {
        let meta = ResponseMeta::new("x", 200).with_header("content-length", "12");
        assert_eq!(meta.content_length, Some(12));
        assert_eq!(meta.header("Content-Length"), Some("12"));

        let zero = ResponseMeta::new("x", 200).with_header("Content-Length", "0");
        assert_eq!(zero.content_length, None);
        assert!(!ResponseMeta::new("x", 500).ok);
    }

    #[tokio::test]
    async fn test_file_fetcher_modes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"hello world").unwrap();
        let url = format!("file://{}", path.display());

        let streamed = FileFetcher::new().with_chunk_size(4).fetch(&url).await.unwrap();
        assert_eq!(streamed.meta.content_length, Some(11));
        let Body::Stream(stream) = streamed.body else {
            panic!("expected a stream");
        };
        let chunks: Vec<Bytes> = stream.map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks.concat(), b"hello world");
        assert!(chunks.len() >= 3);

        let whole = FileFetcher::new()
            .with_mode(BodyMode::Whole)
            .fetch(path.to_str().unwrap())
            .await
            .unwrap();
        let Body::Whole(body) = whole.body else {
            panic!("expected a whole body");
        };
        assert_eq!(body.await.unwrap(), Bytes::from_static(b"hello world"));
    }

    #[tokio::test]
    async fn test_file_fetcher_missing() {
        let response = FileFetcher::new()
            .fetch("file:///definitely/not/here")
            .await
            .unwrap();
        assert!(!response.meta.ok);
        assert_eq!(response.meta.status, 404);
    }
}
