//! # Storage Abstraction Module
//!
//! Unified access to the places datasets come from and subsets go to: the local
//! filesystem, Amazon S3 and plain HTTP(S) data nodes. The backend is picked from
//! the path pattern.
//!
//! ## Path Patterns
//!
//! - **S3 paths**: `s3://bucket-name/path/to/file.nc`
//! - **HTTP paths**: `https://data-node/thredds/fileServer/.../file.nc` (read-only)
//! - **Local paths**: `/absolute/path/to/file.nc` or `relative/path/to/file.nc`
//!
//! NetCDF can only be opened from a local path, so remote objects are first
//! [`materialize`]d into a temporary file that lives as long as the returned
//! [`LocalCopy`].

use aws_config::BehaviorVersion;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::GetObjectOutput;
use aws_sdk_s3::primitives::ByteStream;
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use reqwest::Client as HttpClient;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("S3 download failed: {0}")]
    S3GetObject(#[from] SdkError<aws_sdk_s3::operation::get_object::GetObjectError>),

    #[error("S3 upload failed: {0}")]
    S3PutObject(#[from] SdkError<aws_sdk_s3::operation::put_object::PutObjectError>),

    #[error("S3 lookup failed: {0}")]
    S3HeadObject(#[from] SdkError<aws_sdk_s3::operation::head_object::HeadObjectError>),

    #[error("S3 body stream error: {0}")]
    ByteStream(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} while fetching {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Invalid S3 path format: {0}")]
    InvalidS3Path(String),

    #[error("Path not found: {0}")]
    PathNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Backend is read-only: {0}")]
    ReadOnly(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Byte-level access to one kind of location.
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync {
    async fn read(&self, path: &str) -> StorageResult<Vec<u8>>;

    /// Creates or replaces the object at `path`
    async fn write(&self, path: &str, data: &[u8]) -> StorageResult<()>;

    async fn exists(&self, path: &str) -> StorageResult<bool>;

    /// Copies the object at `path` into the local file `dest`.
    ///
    /// The default reads everything into memory; backends that can stream override it.
    async fn download_to(&self, path: &str, dest: &Path) -> StorageResult<()> {
        let data = self.read(path).await?;
        fs::write(dest, data).await?;
        Ok(())
    }
}

/// Maps a filesystem error on `path` to the matching storage error.
fn io_error(path: &str, e: std::io::Error) -> StorageError {
    match e.kind() {
        std::io::ErrorKind::NotFound => StorageError::PathNotFound(path.to_string()),
        std::io::ErrorKind::PermissionDenied => StorageError::PermissionDenied(path.to_string()),
        _ => StorageError::Io(e),
    }
}

/// Local filesystem backend.
#[derive(Debug, Clone)]
pub struct LocalStorage;

#[async_trait::async_trait]
impl StorageBackend for LocalStorage {
    async fn read(&self, path: &str) -> StorageResult<Vec<u8>> {
        fs::read(path).await.map_err(|e| io_error(path, e))
    }

    async fn write(&self, path: &str, data: &[u8]) -> StorageResult<()> {
        if let Some(parent) = Path::new(path).parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, data).await.map_err(|e| io_error(path, e))
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        Ok(fs::try_exists(path).await?)
    }

    async fn download_to(&self, path: &str, dest: &Path) -> StorageResult<()> {
        fs::copy(path, dest).await.map_err(|e| io_error(path, e))?;
        Ok(())
    }
}

/// Amazon S3 backend, used for mirrored inputs and for `s3://` output directories.
///
/// Credentials come from the usual AWS environment variables or config files.
#[derive(Debug, Clone)]
pub struct S3Storage {
    client: S3Client,
}

impl S3Storage {
    pub async fn new() -> StorageResult<Self> {
        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        Ok(S3Storage {
            client: S3Client::new(&config),
        })
    }

    /// Splits `s3://bucket/key` into bucket and key.
    fn parse_s3_path(s3_path: &str) -> StorageResult<(String, String)> {
        let invalid =
            || StorageError::InvalidS3Path(format!("expected s3://bucket/key, got {}", s3_path));
        let (bucket, key) = s3_path
            .strip_prefix("s3://")
            .and_then(|rest| rest.split_once('/'))
            .ok_or_else(invalid)?;
        if bucket.is_empty() || key.is_empty() {
            return Err(invalid());
        }
        Ok((bucket.to_string(), key.to_string()))
    }

    async fn get(&self, path: &str) -> StorageResult<GetObjectOutput> {
        let (bucket, key) = Self::parse_s3_path(path)?;
        self.client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match &e {
                SdkError::ServiceError(service_err) if service_err.err().is_no_such_key() => {
                    StorageError::PathNotFound(path.to_string())
                }
                _ => StorageError::S3GetObject(e),
            })
    }
}

#[async_trait::async_trait]
impl StorageBackend for S3Storage {
    async fn read(&self, path: &str) -> StorageResult<Vec<u8>> {
        let object = self.get(path).await?;
        let data = object
            .body
            .collect()
            .await
            .map_err(|e| StorageError::ByteStream(e.to_string()))?;
        Ok(data.into_bytes().to_vec())
    }

    async fn write(&self, path: &str, data: &[u8]) -> StorageResult<()> {
        let (bucket, key) = Self::parse_s3_path(path)?;
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await?;
        debug!("Put {} bytes to {}", data.len(), path);
        Ok(())
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        let (bucket, key) = Self::parse_s3_path(path)?;
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError(service_err)) if service_err.err().is_not_found() => {
                Ok(false)
            }
            Err(e) => Err(StorageError::S3HeadObject(e)),
        }
    }

    async fn download_to(&self, path: &str, dest: &Path) -> StorageResult<()> {
        let object = self.get(path).await?;
        let mut reader = object.body.into_async_read();
        let mut file = fs::File::create(dest).await?;
        let copied = tokio::io::copy(&mut reader, &mut file).await?;
        file.flush().await?;
        debug!("Copied {} bytes from {} to {}", copied, path, dest.display());
        Ok(())
    }
}

/// Read-only HTTP(S) backend used to fetch files from ESGF data nodes.
#[derive(Debug, Clone)]
pub struct HttpStorage {
    client: HttpClient,
    show_progress: bool,
}

impl HttpStorage {
    pub fn new(show_progress: bool) -> StorageResult<Self> {
        let client = HttpClient::builder()
            .connect_timeout(Duration::from_secs(30))
            .tcp_nodelay(true)
            .build()?;
        Ok(HttpStorage {
            client,
            show_progress,
        })
    }

    async fn get(&self, url: &str) -> StorageResult<reqwest::Response> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::PathNotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(StorageError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    fn progress_bar(&self, total: Option<u64>) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        match total {
            Some(len) => {
                let bar = ProgressBar::new(len);
                if let Ok(style) = ProgressStyle::with_template(
                    "  downloading [{bar:40}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
                ) {
                    bar.set_style(style.progress_chars("=> "));
                }
                bar
            }
            None => ProgressBar::new_spinner(),
        }
    }
}

#[async_trait::async_trait]
impl StorageBackend for HttpStorage {
    async fn read(&self, path: &str) -> StorageResult<Vec<u8>> {
        let response = self.get(path).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn write(&self, path: &str, _data: &[u8]) -> StorageResult<()> {
        Err(StorageError::ReadOnly(path.to_string()))
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        let response = self.client.head(path).send().await?;
        Ok(response.status().is_success())
    }

    async fn download_to(&self, path: &str, dest: &Path) -> StorageResult<()> {
        let mut response = self.get(path).await?;
        let bar = self.progress_bar(response.content_length());
        let mut file = fs::File::create(dest).await?;

        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            bar.inc(chunk.len() as u64);
        }
        file.flush().await?;
        bar.finish_and_clear();

        debug!("Downloaded {} to {}", path, dest.display());
        Ok(())
    }
}

/// Backend chosen for a path by [`StorageFactory`].
#[derive(Debug)]
pub enum Storage {
    Local(LocalStorage),
    S3(S3Storage),
    Http(HttpStorage),
}

#[async_trait::async_trait]
impl StorageBackend for Storage {
    async fn read(&self, path: &str) -> StorageResult<Vec<u8>> {
        match self {
            Storage::Local(storage) => storage.read(path).await,
            Storage::S3(storage) => storage.read(path).await,
            Storage::Http(storage) => storage.read(path).await,
        }
    }

    async fn write(&self, path: &str, data: &[u8]) -> StorageResult<()> {
        match self {
            Storage::Local(storage) => storage.write(path, data).await,
            Storage::S3(storage) => storage.write(path, data).await,
            Storage::Http(storage) => storage.write(path, data).await,
        }
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        match self {
            Storage::Local(storage) => storage.exists(path).await,
            Storage::S3(storage) => storage.exists(path).await,
            Storage::Http(storage) => storage.exists(path).await,
        }
    }

    async fn download_to(&self, path: &str, dest: &Path) -> StorageResult<()> {
        match self {
            Storage::Local(storage) => storage.download_to(path, dest).await,
            Storage::S3(storage) => storage.download_to(path, dest).await,
            Storage::Http(storage) => storage.download_to(path, dest).await,
        }
    }
}

/// Picks the backend from the path prefix.
pub struct StorageFactory;

impl StorageFactory {
    pub async fn from_path(path: &str) -> StorageResult<Storage> {
        Self::from_path_with_progress(path, false).await
    }

    /// Like [`StorageFactory::from_path`], with a download progress bar for HTTP paths.
    pub async fn from_path_with_progress(
        path: &str,
        show_progress: bool,
    ) -> StorageResult<Storage> {
        if Self::is_s3_path(path) {
            Ok(Storage::S3(S3Storage::new().await?))
        } else if Self::is_http_path(path) {
            Ok(Storage::Http(HttpStorage::new(show_progress)?))
        } else {
            Ok(Storage::Local(LocalStorage))
        }
    }

    pub fn is_s3_path(path: &str) -> bool {
        path.starts_with("s3://")
    }

    pub fn is_http_path(path: &str) -> bool {
        path.starts_with("http://") || path.starts_with("https://")
    }

    pub fn is_local_path(path: &str) -> bool {
        !Self::is_s3_path(path) && !Self::is_http_path(path)
    }
}

/// A dataset reachable through a local path.
///
/// Holds the temporary file for remote objects; the path stays valid until drop.
#[derive(Debug)]
pub struct LocalCopy {
    path: PathBuf,
    _temp: Option<tempfile::TempPath>,
}

impl LocalCopy {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_temporary(&self) -> bool {
        self._temp.is_some()
    }
}

/// Makes `handle` openable by NetCDF, downloading remote objects to a temp file.
pub async fn materialize(handle: &str, show_progress: bool) -> StorageResult<LocalCopy> {
    if StorageFactory::is_local_path(handle) {
        if !fs::try_exists(handle).await? {
            return Err(StorageError::PathNotFound(handle.to_string()));
        }
        return Ok(LocalCopy {
            path: PathBuf::from(handle),
            _temp: None,
        });
    }

    let storage = StorageFactory::from_path_with_progress(handle, show_progress).await?;
    let temp = tempfile::Builder::new()
        .prefix("cmip6-subset-")
        .suffix(".nc")
        .tempfile()?
        .into_temp_path();

    debug!("Fetching {} into {}", handle, temp.display());
    storage.download_to(handle, &temp).await?;

    Ok(LocalCopy {
        path: temp.to_path_buf(),
        _temp: Some(temp),
    })
}

/// Local copies shared by the years of a sweep.
///
/// Each handle is materialized at most once, even when several years ask for it
/// concurrently; the copies live as long as the cache.
#[derive(Debug, Default)]
pub struct SourceCache {
    show_progress: bool,
    copies: Mutex<HashMap<String, Arc<OnceCell<Arc<LocalCopy>>>>>,
    fetches: AtomicUsize,
}

impl SourceCache {
    pub fn new(show_progress: bool) -> Self {
        SourceCache {
            show_progress,
            ..Default::default()
        }
    }

    /// Returns the local copy of `handle`, materializing it on first use.
    pub async fn get(&self, handle: &str) -> StorageResult<Arc<LocalCopy>> {
        let cell = {
            let mut copies = self.copies.lock().unwrap_or_else(PoisonError::into_inner);
            copies.entry(handle.to_string()).or_default().clone()
        };
        let copy = cell
            .get_or_try_init(|| async {
                self.fetches.fetch_add(1, Ordering::Relaxed);
                materialize(handle, self.show_progress).await.map(Arc::new)
            })
            .await?;
        Ok(copy.clone())
    }

    /// Number of handles materialized so far.
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}
