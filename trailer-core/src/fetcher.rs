use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use reqwest::Client;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

use crate::manifest::SegmentList;
use crate::report::{percent, ProgressReporter};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
}

pub type FetchResult<T> = Result<T, FetchError>;

/// One remote resource and the local file its bytes go to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub source: Url,
    pub destination: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentDownload {
    pub path: PathBuf,
    pub segments: usize,
    pub bytes: u64,
}

/// Sequential HTTP(S) retrieval. `file://` URLs are read from disk.
#[derive(Clone)]
pub struct SegmentFetcher {
    client: Client,
    reporter: Arc<dyn ProgressReporter>,
}

impl std::fmt::Debug for SegmentFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentFetcher").finish_non_exhaustive()
    }
}

impl SegmentFetcher {
    pub fn new(client: Client, reporter: Arc<dyn ProgressReporter>) -> Self {
        Self { client, reporter }
    }

    pub async fn fetch_text(&self, url: &Url) -> FetchResult<String> {
        if url.scheme() == "file" {
            let path = local_path(url)?;
            return fs::read_to_string(&path)
                .await
                .map_err(|source| FetchError::Io { path, source });
        }
        let response = self.get(url).await?;
        response.text().await.map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })
    }

    /// Writes the init segment and then every segment of `list`, in order, into
    /// `destination`. Each segment is fully appended before the next request.
    /// On error the partial file is left where it is.
    pub async fn fetch_segments(
        &self,
        playlist_url: &Url,
        list: &SegmentList,
        destination: &Path,
        stage: &str,
    ) -> FetchResult<SegmentDownload> {
        let jobs = list
            .uris()
            .map(|uri| {
                Ok(DownloadJob {
                    source: resolve(playlist_url, uri)?,
                    destination: destination.to_path_buf(),
                })
            })
            .collect::<FetchResult<Vec<_>>>()?;

        let mut file = create_file(destination).await?;
        let total = jobs.len() as u64;
        let mut bytes = 0u64;
        for (index, job) in jobs.iter().enumerate() {
            debug!(url = %job.source, index, "fetching segment");
            match self.append(job, &mut file).await {
                Ok(written) => bytes += written,
                Err(err) => {
                    // partial output is kept, so make what was written visible
                    let _ = file.flush().await;
                    return Err(err);
                }
            }
            if let Some(pct) = percent(index as u64 + 1, total) {
                self.reporter.report(stage, pct);
            }
        }
        file.flush().await.map_err(|source| FetchError::Io {
            path: destination.to_path_buf(),
            source,
        })?;
        info!(path = %destination.display(), segments = jobs.len(), bytes, "segments assembled");
        Ok(SegmentDownload {
            path: destination.to_path_buf(),
            segments: jobs.len(),
            bytes,
        })
    }

    /// Streams a single whole-file resource to `job.destination`.
    pub async fn download_file(&self, job: &DownloadJob) -> FetchResult<u64> {
        let mut file = create_file(&job.destination).await?;
        let bytes = self.append(job, &mut file).await?;
        file.flush().await.map_err(|source| FetchError::Io {
            path: job.destination.clone(),
            source,
        })?;
        info!(url = %job.source, path = %job.destination.display(), bytes, "file downloaded");
        Ok(bytes)
    }

    async fn append(&self, job: &DownloadJob, file: &mut fs::File) -> FetchResult<u64> {
        let io_error = |source: std::io::Error| FetchError::Io {
            path: job.destination.clone(),
            source,
        };
        if job.source.scheme() == "file" {
            let path = local_path(&job.source)?;
            let data = fs::read(&path)
                .await
                .map_err(|source| FetchError::Io { path, source })?;
            file.write_all(&data).await.map_err(io_error)?;
            return Ok(data.len() as u64);
        }

        let response = self.get(&job.source).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let data = chunk.map_err(|source| FetchError::Request {
                url: job.source.to_string(),
                source,
            })?;
            file.write_all(&data).await.map_err(io_error)?;
            written += data.len() as u64;
        }
        Ok(written)
    }

    async fn get(&self, url: &Url) -> FetchResult<reqwest::Response> {
        self.client
            .get(url.clone())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })
    }
}

/// Joins `reference` against the directory of `base`. Absolute references
/// are returned unchanged.
pub fn resolve(base: &Url, reference: &str) -> FetchResult<Url> {
    base.join(reference).map_err(|err| FetchError::InvalidUrl {
        url: reference.to_string(),
        reason: err.to_string(),
    })
}

pub fn parse_url(raw: &str) -> FetchResult<Url> {
    Url::parse(raw).map_err(|err| FetchError::InvalidUrl {
        url: raw.to_string(),
        reason: err.to_string(),
    })
}

fn local_path(url: &Url) -> FetchResult<PathBuf> {
    url.to_file_path().map_err(|_| FetchError::InvalidUrl {
        url: url.to_string(),
        reason: "not a local file path".into(),
    })
}

async fn create_file(path: &Path) -> FetchResult<fs::File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|source| FetchError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
    }
    fs::File::create(path).await.map_err(|source| FetchError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_segments_resolve_against_playlist_directory() {
        let base = Url::parse("https://cdn.example.com/trailers/t1/video/playlist.m3u8?token=abc")
            .unwrap();
        assert_eq!(
            resolve(&base, "seg-1.m4s").unwrap().as_str(),
            "https://cdn.example.com/trailers/t1/video/seg-1.m4s"
        );
        assert_eq!(
            resolve(&base, "../audio/init.mp4").unwrap().as_str(),
            "https://cdn.example.com/trailers/t1/audio/init.mp4"
        );
        assert_eq!(
            resolve(&base, "https://other.example.com/x.m4s")
                .unwrap()
                .as_str(),
            "https://other.example.com/x.m4s"
        );
    }

    #[test]
    fn garbage_url_is_rejected() {
        assert!(matches!(
            parse_url("not a url"),
            Err(FetchError::InvalidUrl { .. })
        ));
    }
}
