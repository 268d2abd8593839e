// SPDX-FileCopyrightText: 2026 fetchtar contributors
// SPDX-License-Identifier: MIT

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

use crate::fetch::ResponseMeta;

/// Computes an entry name from the response it names.
pub type NameFn = Arc<dyn Fn(&ResponseMeta) -> BoxFuture<'static, String> + Send + Sync>;

/// How an entry's file name is obtained.
#[derive(Clone)]
pub enum EntryName {
    /// Known up front
    Fixed(String),
    /// Resolved by a future, awaited once the resource has been fetched
    Deferred(Shared<BoxFuture<'static, String>>),
    /// Derived from the response metadata, e.g. `Content-Disposition`
    FromResponse(NameFn),
}

impl EntryName {
    pub async fn resolve(&self, meta: &ResponseMeta) -> String {
        match self {
            Self::Fixed(name) => name.clone(),
            Self::Deferred(name) => name.clone().await,
            Self::FromResponse(name_fn) => name_fn(meta).await,
        }
    }
}

impl fmt::Debug for EntryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(name) => f.debug_tuple("Fixed").field(name).finish(),
            Self::Deferred(_) => f.write_str("Deferred"),
            Self::FromResponse(_) => f.write_str("FromResponse"),
        }
    }
}

impl From<String> for EntryName {
    fn from(name: String) -> Self {
        Self::Fixed(name)
    }
}

impl From<&str> for EntryName {
    fn from(name: &str) -> Self {
        Self::Fixed(name.to_string())
    }
}

/// One file of the archive: where to fetch it from and what to call it.
#[derive(Debug, Clone)]
pub struct Entry {
    pub name: EntryName,
    pub source: String,
}

impl Entry {
    pub fn new(name: impl Into<EntryName>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }

    /// Entry whose name is produced by `name` once it has been fetched.
    pub fn deferred<N>(name: N, source: impl Into<String>) -> Self
    where
        N: Future<Output = String> + Send + 'static,
    {
        Self::new(EntryName::Deferred(name.boxed().shared()), source)
    }

    /// Entry named by `name_fn` from the response metadata.
    pub fn from_response<N>(name_fn: N, source: impl Into<String>) -> Self
    where
        N: Fn(&ResponseMeta) -> BoxFuture<'static, String> + Send + Sync + 'static,
    {
        Self::new(EntryName::FromResponse(Arc::new(name_fn)), source)
    }

    /// Entry named by [`ResponseMeta::suggested_file_name`].
    pub fn suggested(source: impl Into<String>) -> Self {
        Self::from_response(
            |meta: &ResponseMeta| futures::future::ready(meta.suggested_file_name()).boxed(),
            source,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_variants() {
        let meta = ResponseMeta::new("https://host/x/report.pdf", 200);

        let fixed = Entry::new("a.txt", "src");
        assert_eq!(fixed.name.resolve(&meta).await, "a.txt");

        let deferred = Entry::deferred(async { "later.txt".to_string() }, "src");
        assert_eq!(deferred.name.resolve(&meta).await, "later.txt");
        // a shared future can be resolved again through a clone
        assert_eq!(deferred.clone().name.resolve(&meta).await, "later.txt");

        let from_status = Entry::from_response(
            |meta: &ResponseMeta| {
                let name = format!("status-{}", meta.status);
                async move { name }.boxed()
            },
            "src",
        );
        assert_eq!(from_status.name.resolve(&meta).await, "status-200");

        assert_eq!(
            Entry::suggested("src").name.resolve(&meta).await,
            "report.pdf"
        );
    }
}
