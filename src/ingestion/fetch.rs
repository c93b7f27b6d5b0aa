//! Fetching and caching of URL sources.
//!
//! URL ingestion is usually re-run many times while tuning chunking
//! parameters; the cache keeps one downloaded copy per URL on disk so
//! repeated runs stay off the network.

use std::path::{Path, PathBuf};

use reqwest::Client;
use tokio::fs;
use url::Url;

use crate::types::PipelineError;

/// Filesystem-backed cache of downloaded documents, keyed by URL.
#[derive(Clone, Debug)]
pub struct SourceCache {
    root: PathBuf,
}

impl SourceCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic cache file for a URL: host and path segments
    /// sanitized into one flat file name.
    pub fn cache_path(&self, url: &Url) -> PathBuf {
        let mut components = Vec::new();
        if let Some(host) = url.host_str() {
            components.push(sanitize_component(host));
        }
        components.extend(
            url.path()
                .split('/')
                .filter(|segment| !segment.is_empty())
                .map(sanitize_component),
        );
        if components.is_empty() {
            components.push("index".to_string());
        }

        let mut file_name = components.join("_");
        if let Some(query) = url.query() {
            file_name.push('_');
            file_name.push_str(&sanitize_component(query));
        }
        if Path::new(&file_name).extension().is_none() {
            file_name.push_str(".html");
        }

        self.root.join(file_name)
    }
}

/// A fetched document plus where it came from.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub url: Url,
    pub content: String,
    pub bytes: usize,
    pub from_cache: bool,
}

/// Fetches `url`, preferring the cache when one is supplied. Downloads
/// are written back to the cache before returning.
pub async fn fetch_url(
    client: &Client,
    url: &Url,
    cache: Option<&SourceCache>,
) -> Result<FetchOutcome, PipelineError> {
    if let Some(cache) = cache {
        let cache_path = cache.cache_path(url);
        if cache_path.exists() {
            let content = fs::read_to_string(&cache_path).await?;
            return Ok(FetchOutcome {
                url: url.clone(),
                bytes: content.len(),
                content,
                from_cache: true,
            });
        }

        let content = download(client, url).await?;
        if let Some(parent) = cache_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&cache_path, &content).await?;
        return Ok(FetchOutcome {
            url: url.clone(),
            bytes: content.len(),
            content,
            from_cache: false,
        });
    }

    let content = download(client, url).await?;
    Ok(FetchOutcome {
        url: url.clone(),
        bytes: content.len(),
        content,
        from_cache: false,
    })
}

async fn download(client: &Client, url: &Url) -> Result<String, PipelineError> {
    let response = client.get(url.clone()).send().await?.error_for_status()?;
    Ok(response.text().await?)
}

fn sanitize_component(input: &str) -> String {
    input
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use tempfile::tempdir;

    #[test]
    fn cache_path_includes_host_and_sanitizes() {
        let cache = SourceCache::new("tmp");
        let url = Url::parse("https://example.com/docs/intro?lang=en").unwrap();
        let path = cache.cache_path(&url);
        assert!(path.ends_with("example.com_docs_intro_lang_en.html"));
    }

    #[tokio::test]
    async fn fetch_downloads_then_reuses_cache() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/page");
            then.status(200).body("<html>content</html>");
        });

        let dir = tempdir().unwrap();
        let cache = SourceCache::new(dir.path());
        let client = Client::new();
        let url = Url::parse(&server.url("/page")).unwrap();

        let first = fetch_url(&client, &url, Some(&cache)).await.unwrap();
        assert!(!first.from_cache);
        assert_eq!(first.content, "<html>content</html>");

        let second = fetch_url(&client, &url, Some(&cache)).await.unwrap();
        assert!(second.from_cache);
        assert_eq!(second.content, first.content);

        mock.assert_hits(1);
    }

    #[tokio::test]
    async fn http_errors_propagate() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/missing");
            then.status(404);
        });

        let client = Client::new();
        let url = Url::parse(&server.url("/missing")).unwrap();
        let err = fetch_url(&client, &url, None).await.unwrap_err();
        assert!(matches!(err, PipelineError::Http(_)));
    }
}
