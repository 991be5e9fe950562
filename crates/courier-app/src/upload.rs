//! Upload backends.
//!
//! Both backends lay files out as
//! `<destination>/<file created YYYY-MM-DD>/<section>/<file name>` and
//! overwrite an existing copy, so a repeated upload after a crash converges on
//! the same result.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use courier_config::UploadConfig;
use courier_core::{Destination, UploadProgress, UploadReceipt, UploadRequest, Uploader};
use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Client, Url};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

const COPY_CHUNK: usize = 64 * 1024;
const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// Build the backend selected in configuration.
///
/// # Errors
///
/// Returns [`AppError::HttpClient`] when the HTTP client cannot be built and
/// [`AppError::InvalidConfig`] when the endpoint is not a usable base URL.
pub fn build_uploader(config: &UploadConfig) -> AppResult<Arc<dyn Uploader>> {
    match config {
        UploadConfig::Directory { root } => Ok(Arc::new(DirectoryUploader::new(root.clone()))),
        UploadConfig::Http { endpoint, token } => Ok(Arc::new(HttpUploader::new(
            endpoint,
            token.clone(),
        )?)),
    }
}

/// File creation time, falling back to the modification time.
///
/// # Errors
///
/// Returns an error when metadata cannot be read.
pub async fn file_created(path: &Path) -> Result<DateTime<Local>> {
    let metadata = fs::metadata(path)
        .await
        .with_context(|| format!("failed to stat {}", path.display()))?;
    let stamp: SystemTime = metadata
        .created()
        .or_else(|_| metadata.modified())
        .with_context(|| format!("no timestamps for {}", path.display()))?;
    Ok(DateTime::<Local>::from(stamp))
}

/// Path segment safe to use as a single folder or object name.
fn segment(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|c| if matches!(c, '/' | '\\') || c.is_control() { '_' } else { c })
        .collect();
    match cleaned.trim() {
        "" | "." | ".." => "_".to_string(),
        trimmed => trimmed.to_string(),
    }
}

/// The four layout segments for one upload.
fn layout_segments(
    destination: &Destination,
    created: &DateTime<Local>,
    file_name: &str,
) -> [String; 4] {
    [
        segment(destination.destination_id()),
        created.format("%Y-%m-%d").to_string(),
        segment(destination.section_label()),
        segment(file_name),
    ]
}

fn file_name_of(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("upload path {} has no file name", path.display()))
}

/// Mirrors files into a directory tree, such as a synced or mounted share.
#[derive(Debug, Clone)]
pub struct DirectoryUploader {
    root: PathBuf,
}

impl DirectoryUploader {
    /// Backend writing under `root`.
    #[must_use]
    pub const fn new(root: PathBuf) -> Self {
        Self { root }
    }

    async fn copy_with_progress(source: &Path, staging: &Path) -> Result<u64> {
        let mut reader = File::open(source)
            .await
            .with_context(|| format!("failed to open {}", source.display()))?;
        let bytes_total = reader.metadata().await?.len();
        let mut writer = File::create(staging)
            .await
            .with_context(|| format!("failed to create {}", staging.display()))?;

        let mut buffer = vec![0_u8; COPY_CHUNK];
        let mut progress = UploadProgress {
            bytes_sent: 0,
            bytes_total,
        };
        loop {
            let read = reader.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            writer.write_all(&buffer[..read]).await?;
            progress.bytes_sent += u64::try_from(read)?;
            debug!(
                file = %source.display(),
                bytes_sent = progress.bytes_sent,
                bytes_total = progress.bytes_total,
                percent = progress.percent_complete(),
                "upload progress"
            );
        }
        writer.flush().await?;
        writer.sync_all().await?;
        Ok(progress.bytes_sent)
    }
}

#[async_trait]
impl Uploader for DirectoryUploader {
    async fn upload(&self, request: UploadRequest<'_>) -> Result<UploadReceipt> {
        let file_name = file_name_of(request.path)?;
        let created = file_created(request.path).await?;
        let [destination, date, section, name] =
            layout_segments(request.destination, &created, &file_name);

        let target_dir = self.root.join(destination).join(date).join(section);
        fs::create_dir_all(&target_dir)
            .await
            .with_context(|| format!("failed to create {}", target_dir.display()))?;
        let target = target_dir.join(&name);
        let staging = target_dir.join(format!(".{name}.{}.partial", Uuid::new_v4()));

        let copied = match Self::copy_with_progress(request.path, &staging).await {
            Ok(bytes) => bytes,
            Err(err) => {
                let _ = fs::remove_file(&staging).await;
                return Err(err);
            }
        };
        if let Err(err) = fs::rename(&staging, &target).await {
            let _ = fs::remove_file(&staging).await;
            return Err(err).with_context(|| format!("failed to finalise {}", target.display()));
        }

        Ok(UploadReceipt {
            location: target.display().to_string(),
            bytes: copied,
        })
    }

    async fn check(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("upload root {} is not writable", self.root.display()))?;
        let metadata = fs::metadata(&self.root).await?;
        if !metadata.is_dir() {
            bail!("upload root {} is not a directory", self.root.display());
        }
        info!(root = %self.root.display(), "directory upload backend ready");
        Ok(())
    }
}

/// `PUT`s files to `<endpoint>/<destination>/<date>/<section>/<name>`.
#[derive(Debug, Clone)]
pub struct HttpUploader {
    client: Client,
    endpoint: Url,
    token: Option<String>,
}

impl HttpUploader {
    /// Backend targeting `endpoint`, optionally authenticating with a bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::InvalidConfig`] for an unusable endpoint and
    /// [`AppError::HttpClient`] when the client cannot be built.
    pub fn new(endpoint: &str, token: Option<String>) -> AppResult<Self> {
        let endpoint = Url::parse(endpoint).map_err(|_| AppError::InvalidConfig {
            field: "upload.endpoint",
            reason: "unparseable",
            value: Some(endpoint.to_string()),
        })?;
        if endpoint.cannot_be_a_base() {
            return Err(AppError::InvalidConfig {
                field: "upload.endpoint",
                reason: "not_a_base_url",
                value: Some(endpoint.to_string()),
            });
        }
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|source| AppError::HttpClient { source })?;
        Ok(Self {
            client,
            endpoint,
            token,
        })
    }

    fn object_url(&self, segments: &[String; 4]) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow!("endpoint cannot carry a path"))?
            .pop_if_empty()
            .extend(segments.iter().map(String::as_str));
        Ok(url)
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn upload(&self, request: UploadRequest<'_>) -> Result<UploadReceipt> {
        let file_name = file_name_of(request.path)?;
        let created = file_created(request.path).await?;
        let segments = layout_segments(request.destination, &created, &file_name);
        let url = self.object_url(&segments)?;
        let body = fs::read(request.path)
            .await
            .with_context(|| format!("failed to read {}", request.path.display()))?;
        let bytes = u64::try_from(body.len())?;

        let mut builder = self
            .client
            .put(url.clone())
            .header("x-file-created", created.to_rfc3339());
        if let Ok(value) = HeaderValue::from_str(&file_name) {
            builder = builder.header("x-user-input-filename", value);
        }
        if let Some(token) = &self.token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let response = builder
            .body(body)
            .send()
            .await
            .with_context(|| format!("upload to {url} failed"))?;
        let status = response.status();
        if !status.is_success() {
            bail!("upload to {url} returned status {}", status.as_u16());
        }
        debug!(url = %url, bytes, "upload accepted");
        Ok(UploadReceipt {
            location: url.to_string(),
            bytes,
        })
    }

    async fn check(&self) -> Result<()> {
        let response = self
            .client
            .get(self.endpoint.clone())
            .send()
            .await
            .with_context(|| format!("upload endpoint {} unreachable", self.endpoint))?;
        if response.status().is_server_error() {
            bail!(
                "upload endpoint {} returned status {}",
                self.endpoint,
                response.status().as_u16()
            );
        }
        info!(endpoint = %self.endpoint, "http upload backend ready");
        Ok(())
    }
}
