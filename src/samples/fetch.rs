// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Turning a source reference into bytes.
//!
//! Refs are routed the way a browser page would fetch them: `blob:` refs come
//! from the in-process registry, file paths from disk, same-origin URLs
//! directly and cross-origin URLs through the origin's proxy endpoint.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use reqwest::Url;
use tracing::{debug, info};

use super::error::LoadError;
use crate::config;

const BLOB_SCHEME: &str = "blob:";

/// Where a source reference resolves to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolvedSource {
    Blob(String),
    File(PathBuf),
    /// An HTTP(S) URL to GET. Cross-origin refs have already been rewritten
    /// to go through the proxy.
    Http(Url),
}

/// Resolves `source_ref` against the loader configuration.
pub fn resolve_source(
    source_ref: &str,
    loader: &config::Loader,
) -> Result<ResolvedSource, LoadError> {
    let invalid = || LoadError::InvalidSource(source_ref.to_string());
    let trimmed = source_ref.trim();
    if trimmed.is_empty() {
        return Err(invalid());
    }

    if trimmed.starts_with(BLOB_SCHEME) {
        return Ok(ResolvedSource::Blob(trimmed.to_string()));
    }

    if trimmed.starts_with("file://") {
        let url = Url::parse(trimmed).map_err(|_| invalid())?;
        let path = url.to_file_path().map_err(|_| invalid())?;
        return Ok(ResolvedSource::File(path));
    }

    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        let url = Url::parse(trimmed).map_err(|_| invalid())?;
        let origin = Url::parse(loader.origin()).map_err(|_| invalid())?;
        if url.origin() == origin.origin() {
            return Ok(ResolvedSource::Http(url));
        }
        let mut proxied =
            Url::parse(&format!("{}{}", loader.origin(), loader.proxy())).map_err(|_| invalid())?;
        proxied.query_pairs_mut().append_pair("url", trimmed);
        return Ok(ResolvedSource::Http(proxied));
    }

    // Root-relative refs belong to the origin. A bare absolute filesystem
    // path that exists on disk wins over that reading.
    if trimmed.starts_with('/') && !std::path::Path::new(trimmed).exists() {
        let url = Url::parse(&format!("{}{}", loader.origin(), trimmed)).map_err(|_| invalid())?;
        return Ok(ResolvedSource::Http(url));
    }

    Ok(ResolvedSource::File(PathBuf::from(trimmed)))
}

/// In-process stand-in for object URLs: uploaded or recorded bytes that can
/// be loaded by reference.
#[derive(Default)]
pub struct BlobRegistry {
    next_id: AtomicU64,
    blobs: Mutex<HashMap<String, Arc<[u8]>>>,
}

impl BlobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `bytes` and returns a `blob:` ref for them.
    pub fn register(&self, bytes: Arc<[u8]>) -> String {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let source_ref = format!("{}padsampler/{}", BLOB_SCHEME, id);
        self.blobs.lock().insert(source_ref.clone(), bytes);
        source_ref
    }

    pub fn get(&self, source_ref: &str) -> Option<Arc<[u8]>> {
        self.blobs.lock().get(source_ref).cloned()
    }

}

/// Fetches raw bytes for source refs.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    loader: config::Loader,
    blobs: Arc<BlobRegistry>,
}

impl Fetcher {
    pub fn new(loader: config::Loader) -> Result<Self, LoadError> {
        let timeout = loader
            .timeout()
            .map_err(|e| LoadError::InvalidSource(e.to_string()))?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            loader,
            blobs: Arc::new(BlobRegistry::new()),
        })
    }

    pub fn blobs(&self) -> &Arc<BlobRegistry> {
        &self.blobs
    }

    pub fn resolve(&self, source_ref: &str) -> Result<ResolvedSource, LoadError> {
        resolve_source(source_ref, &self.loader)
    }

    /// Reads every byte behind `source_ref`.
    pub async fn fetch(&self, source_ref: &str) -> Result<Vec<u8>, LoadError> {
        match self.resolve(source_ref)? {
            ResolvedSource::Blob(id) => {
                debug!(source_ref, "Reading blob");
                self.blobs
                    .get(&id)
                    .map(|bytes| bytes.to_vec())
                    .ok_or(LoadError::UnknownBlob(id))
            }
            ResolvedSource::File(path) => {
                debug!(path = ?path, "Reading file");
                tokio::fs::read(&path).await.map_err(|source| LoadError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
            ResolvedSource::Http(url) => {
                info!(source_ref, url = %url, "Fetching");
                let response = self.client.get(url.clone()).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(LoadError::Status {
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                }
                Ok(response.bytes().await?.to_vec())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::serve_once;

    fn loader() -> config::Loader {
        config::Loader::new("http://pads.test", "/api/proxy")
    }

    #[test]
    fn test_blob_ref() {
        assert_eq!(
            resolve_source("blob:padsampler/3", &loader()).unwrap(),
            ResolvedSource::Blob("blob:padsampler/3".to_string())
        );
    }

    #[test]
    fn test_same_origin_is_direct() {
        let resolved = resolve_source("http://pads.test/sounds/kick.wav", &loader()).unwrap();
        assert_eq!(
            resolved,
            ResolvedSource::Http(Url::parse("http://pads.test/sounds/kick.wav").unwrap())
        );
    }

    #[test]
    fn test_cross_origin_goes_through_proxy() {
        let resolved =
            resolve_source("https://cdn.example.com/a b.wav?x=1&y=2", &loader()).unwrap();
        let ResolvedSource::Http(url) = resolved else {
            panic!("expected http");
        };
        assert_eq!(url.host_str(), Some("pads.test"));
        assert_eq!(url.path(), "/api/proxy");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![(
                "url".to_string(),
                "https://cdn.example.com/a b.wav?x=1&y=2".to_string()
            )]
        );
    }

    #[test]
    fn test_root_relative_resolves_against_origin() {
        let resolved = resolve_source("/uploads/snare-does-not-exist.wav", &loader()).unwrap();
        assert_eq!(
            resolved,
            ResolvedSource::Http(
                Url::parse("http://pads.test/uploads/snare-does-not-exist.wav").unwrap()
            )
        );
    }

    #[test]
    fn test_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hat.wav");
        std::fs::write(&path, b"x").unwrap();
        let as_str = path.to_str().unwrap();
        assert_eq!(
            resolve_source(as_str, &loader()).unwrap(),
            ResolvedSource::File(path.clone())
        );
        let url = Url::from_file_path(&path).unwrap();
        assert_eq!(
            resolve_source(url.as_str(), &loader()).unwrap(),
            ResolvedSource::File(path)
        );
        assert_eq!(
            resolve_source("relative/clap.wav", &loader()).unwrap(),
            ResolvedSource::File(PathBuf::from("relative/clap.wav"))
        );
    }

    #[test]
    fn test_empty_ref_rejected() {
        assert!(matches!(
            resolve_source("  ", &loader()),
            Err(LoadError::InvalidSource(_))
        ));
    }

    #[test]
    fn test_blob_registry() {
        let registry = BlobRegistry::new();
        let a = registry.register(Arc::from(vec![1u8, 2, 3]));
        let b = registry.register(Arc::from(vec![4u8]));
        assert_ne!(a, b);
        assert_eq!(registry.get(&a).as_deref(), Some(&[1u8, 2, 3][..]));
        assert_eq!(registry.get(&b).as_deref(), Some(&[4u8][..]));
        assert!(registry.get("blob:padsampler/99").is_none());
    }

    #[tokio::test]
    async fn test_fetch_file_and_blob() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bytes.bin");
        std::fs::write(&path, b"abc").unwrap();
        let fetcher = Fetcher::new(loader()).unwrap();
        assert_eq!(fetcher.fetch(path.to_str().unwrap()).await.unwrap(), b"abc");

        let blob = fetcher.blobs().register(Arc::from(b"xyz".to_vec()));
        assert_eq!(fetcher.fetch(&blob).await.unwrap(), b"xyz");

        assert!(matches!(
            fetcher.fetch("blob:padsampler/999").await,
            Err(LoadError::UnknownBlob(_))
        ));
        let missing = Url::from_file_path(dir.path().join("missing.wav")).unwrap();
        assert!(matches!(
            fetcher.fetch(missing.as_str()).await,
            Err(LoadError::Io { .. })
        ));
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let (origin, server) = serve_once(404, b"not found").await;
        let fetcher = Fetcher::new(config::Loader::new(&origin, "/api/proxy")).unwrap();
        let result = fetcher.fetch(&format!("{}/sounds/missing.wav", origin)).await;
        assert!(matches!(
            result,
            Err(LoadError::Status { status: 404, .. })
        ));
        assert_eq!(
            server.await.unwrap(),
            "GET /sounds/missing.wav HTTP/1.1"
        );
    }

    #[tokio::test]
    async fn test_cross_origin_fetch_goes_through_proxy() {
        let (origin, server) = serve_once(200, b"RIFF").await;
        let fetcher = Fetcher::new(config::Loader::new(&origin, "/api/proxy")).unwrap();
        let bytes = fetcher
            .fetch("https://cdn.example.com/kits/kick.wav")
            .await
            .unwrap();
        assert_eq!(bytes, b"RIFF");
        assert_eq!(
            server.await.unwrap(),
            "GET /api/proxy?url=https%3A%2F%2Fcdn.example.com%2Fkits%2Fkick.wav HTTP/1.1"
        );
    }
}
