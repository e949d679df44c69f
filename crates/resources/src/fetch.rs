use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use reqwest::blocking::Client;
use reqwest::Url;
use tracing::debug;

/// Source of raw resource bytes, addressed by a path relative to some base.
pub trait Fetch: Send + Sync {
    fn fetch(&self, path: &str) -> Result<Vec<u8>>;

    fn describe(&self) -> String;
}

#[derive(Debug, Clone)]
pub struct FsFetcher {
    root: PathBuf,
}

impl FsFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Fetch for FsFetcher {
    fn fetch(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.root.join(path.trim_start_matches('/'));
        debug!(path = %full.display(), "reading resource from disk");
        fs::read(&full).with_context(|| format!("failed to read {}", full.display()))
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: Client,
    base: Url,
}

impl HttpFetcher {
    pub fn new(base: &str) -> Result<Self> {
        let mut base =
            Url::parse(base).with_context(|| format!("invalid resource base url '{base}'"))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = Client::builder().build()?;
        Ok(Self { http, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn resolve(&self, path: &str) -> Result<Url> {
        self.base
            .join(path.trim_start_matches('/'))
            .with_context(|| format!("joining resource url for '{path}'"))
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, path: &str) -> Result<Vec<u8>> {
        let url = self.resolve(path)?;
        debug!(%url, "downloading resource");
        let response = self
            .http
            .get(url.clone())
            .send()
            .with_context(|| format!("requesting {url}"))?;
        let status = response.status();
        if !status.is_success() {
            bail!(
                "{} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("unknown status")
            );
        }
        let bytes = response
            .bytes()
            .map_err(|err| anyhow!("reading body of {url}: {err}"))?;
        Ok(bytes.to_vec())
    }

    fn describe(&self) -> String {
        self.base.to_string()
    }
}

/// Picks a fetcher for a resource base: `http://` and `https://` bases are
/// downloaded, anything else is treated as a directory.
pub fn fetcher_for_base(input: &str) -> Result<Arc<dyn Fetch>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        bail!("resource base must not be empty");
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return Ok(Arc::new(HttpFetcher::new(trimmed)?));
    }
    Ok(Arc::new(FsFetcher::new(trimmed)))
}
