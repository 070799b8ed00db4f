//! Audio payload resolution for `audio` actions.

use std::{
    path::{Component, Path, PathBuf},
    time::Duration,
};

use {
    reqwest::{Url, header::CONTENT_TYPE},
    tracing::debug,
    wapanel_channels::MediaPayload,
};

use crate::actions::AudioSource;

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("media file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("media path escapes its base directory: {path}")]
    Traversal { path: String },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported media url: {url}")]
    InvalidUrl { url: String },

    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Turns an [`AudioSource`] into bytes ready for the transport.
///
/// Files are accepted as absolute paths or relative to the media directory.
/// Relative paths may not leave that directory, and no path may contain `..`.
pub struct MediaResolver {
    media_dir: PathBuf,
    client: reqwest::Client,
}

impl MediaResolver {
    pub fn new(media_dir: impl Into<PathBuf>, fetch_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .build()
            .unwrap_or_default();
        Self {
            media_dir: media_dir.into(),
            client,
        }
    }

    pub fn media_dir(&self) -> &Path {
        &self.media_dir
    }

    pub async fn resolve(&self, source: &AudioSource) -> Result<MediaPayload, MediaError> {
        match source {
            AudioSource::File(file) => self.resolve_file(file).await,
            AudioSource::Url(url) => self.fetch(url).await,
        }
    }

    /// Locate a file reference on disk without reading it.
    pub async fn locate(&self, file: &str) -> Result<PathBuf, MediaError> {
        let requested = Path::new(file);
        if requested
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(MediaError::Traversal {
                path: file.to_string(),
            });
        }

        if requested.is_absolute() {
            return match tokio::fs::metadata(requested).await {
                Ok(meta) if meta.is_file() => Ok(requested.to_path_buf()),
                _ => Err(MediaError::NotFound {
                    path: requested.to_path_buf(),
                }),
            };
        }

        let joined = self.media_dir.join(requested);
        let not_found = || MediaError::NotFound {
            path: joined.clone(),
        };
        let base = tokio::fs::canonicalize(&self.media_dir)
            .await
            .map_err(|_| not_found())?;
        let resolved = tokio::fs::canonicalize(&joined)
            .await
            .map_err(|_| not_found())?;
        if !resolved.starts_with(&base) {
            return Err(MediaError::Traversal {
                path: file.to_string(),
            });
        }
        if !tokio::fs::metadata(&resolved)
            .await
            .is_ok_and(|m| m.is_file())
        {
            return Err(not_found());
        }
        Ok(resolved)
    }

    async fn resolve_file(&self, file: &str) -> Result<MediaPayload, MediaError> {
        let path = self.locate(file).await?;
        let data = tokio::fs::read(&path)
            .await
            .map_err(|source| MediaError::Io {
                path: path.clone(),
                source,
            })?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        debug!(path = %path.display(), bytes = data.len(), "resolved audio file");
        Ok(MediaPayload {
            mime_type: mime_for_name(&filename).to_string(),
            filename,
            data,
        })
    }

    async fn fetch(&self, raw: &str) -> Result<MediaPayload, MediaError> {
        let url = Url::parse(raw)
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .ok_or_else(|| MediaError::InvalidUrl {
                url: raw.to_string(),
            })?;
        let fetch_err = |source| MediaError::Fetch {
            url: raw.to_string(),
            source,
        };

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(fetch_err)?;

        let filename = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|s| !s.is_empty())
            .unwrap_or("audio")
            .to_string();
        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| !v.is_empty() && v != "application/octet-stream")
            .unwrap_or_else(|| mime_for_name(&filename).to_string());
        let data = response.bytes().await.map_err(fetch_err)?.to_vec();

        debug!(url = raw, bytes = data.len(), %mime_type, "fetched audio");
        Ok(MediaPayload {
            mime_type,
            filename,
            data,
        })
    }
}

/// MIME type guessed from a file name's extension.
pub fn mime_for_name(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("ogg" | "oga" | "opus") => "audio/ogg",
        Some("mp3") => "audio/mpeg",
        Some("m4a" | "mp4") => "audio/mp4",
        Some("aac") => "audio/aac",
        Some("wav") => "audio/wav",
        Some("amr") => "audio/amr",
        Some("webm") => "audio/webm",
        _ => "application/octet-stream",
    }
}
