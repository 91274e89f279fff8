//! HTTP object transfer against the coordinator's `/remote` store. Objects are
//! streamed chunk by chunk in both directions; nothing is buffered whole and
//! nothing is retried here.

use crate::runtime::hooks::{TransferDirection, TransferObserver};
use crate::sealing::SectorNaming;
use crate::task::SectorId;
use crate::transfer::layout::{remote_object_path, SectorCategory, StorageLayout};
use futures::future::BoxFuture;
use futures::StreamExt;
use hyper::body::HttpBody;
use hyper::client::HttpConnector;
use hyper::header::CONTENT_LENGTH;
use hyper::{Body, Client, Method, Request, StatusCode, Uri};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

#[derive(Debug)]
pub enum TransferError {
    InvalidUri {
        uri: String,
        reason: String,
    },
    Connection {
        method: &'static str,
        uri: String,
        source: hyper::Error,
    },
    Status {
        method: &'static str,
        uri: String,
        status: StatusCode,
    },
    Body {
        uri: String,
        source: hyper::Error,
    },
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::InvalidUri { uri, reason } => {
                write!(f, "invalid object uri {uri}: {reason}")
            }
            TransferError::Connection { method, uri, .. } => {
                write!(f, "{method} {uri} failed")
            }
            TransferError::Status {
                method,
                uri,
                status,
            } => write!(f, "{method} {uri} returned {status}"),
            TransferError::Body { uri, .. } => write!(f, "reading response body from {uri} failed"),
            TransferError::Io { path, .. } => write!(f, "local i/o on {} failed", path.display()),
        }
    }
}

impl std::error::Error for TransferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransferError::Connection { source, .. } | TransferError::Body { source, .. } => {
                Some(source)
            }
            TransferError::Io { source, .. } => Some(source),
            TransferError::InvalidUri { .. } | TransferError::Status { .. } => None,
        }
    }
}

/// Moves a single named object between local disk and the coordinator.
///
/// Both operations resolve to the number of bytes moved.
pub trait ObjectTransfer: Send + Sync {
    /// Downloads `{category}/{sector_name}` and overwrites the local copy.
    fn fetch(
        &self,
        category: SectorCategory,
        sector_id: SectorId,
    ) -> BoxFuture<'_, Result<u64, TransferError>>;

    /// Uploads the local `{category}/{sector_name}` object.
    fn push(
        &self,
        category: SectorCategory,
        sector_id: SectorId,
    ) -> BoxFuture<'_, Result<u64, TransferError>>;
}

#[derive(Clone)]
pub struct HttpObjectTransfer {
    client: Client<HttpConnector>,
    endpoint: Arc<String>,
    layout: StorageLayout,
    naming: SectorNaming,
    observer: Option<Arc<dyn TransferObserver>>,
}

impl fmt::Debug for HttpObjectTransfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpObjectTransfer")
            .field("endpoint", &self.endpoint)
            .field("layout", &self.layout)
            .field("naming", &self.naming)
            .finish_non_exhaustive()
    }
}

impl ObjectTransfer for HttpObjectTransfer {
    fn fetch(
        &self,
        category: SectorCategory,
        sector_id: SectorId,
    ) -> BoxFuture<'_, Result<u64, TransferError>> {
        Box::pin(self.fetch_object(category, sector_id))
    }

    fn push(
        &self,
        category: SectorCategory,
        sector_id: SectorId,
    ) -> BoxFuture<'_, Result<u64, TransferError>> {
        Box::pin(self.push_object(category, sector_id))
    }
}

impl HttpObjectTransfer {
    pub fn new(endpoint: impl Into<String>, layout: StorageLayout, naming: SectorNaming) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_owned();
        Self {
            client: Client::new(),
            endpoint: Arc::new(endpoint),
            layout,
            naming,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn TransferObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn object_uri(&self, category: SectorCategory, sector_name: &str) -> Result<Uri, TransferError> {
        let raw = format!("{}/{}", self.endpoint, remote_object_path(category, sector_name));
        raw.parse::<Uri>().map_err(|err| TransferError::InvalidUri {
            uri: raw.clone(),
            reason: err.to_string(),
        })
    }

    async fn fetch_object(
        &self,
        category: SectorCategory,
        sector_id: SectorId,
    ) -> Result<u64, TransferError> {
        let sector_name = self.naming.sector_name(sector_id);
        let uri = self.object_uri(category, &sector_name)?;
        let uri_text = uri.to_string();
        let local_path = self.layout.object_path(category, &sector_name);
        let object = remote_object_path(category, &sector_name);

        let response = self
            .client
            .get(uri)
            .await
            .map_err(|source| TransferError::Connection {
                method: "GET",
                uri: uri_text.clone(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(TransferError::Status {
                method: "GET",
                uri: uri_text,
                status: response.status(),
            });
        }

        let total = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok());

        // The body lands in a sibling `.part` file and replaces the local copy
        // only once it has been received in full.
        let part_path = partial_path(&local_path);
        let file = File::create(&part_path)
            .await
            .map_err(|source| TransferError::Io {
                path: part_path.clone(),
                source,
            })?;

        if let Some(observer) = &self.observer {
            observer.on_start(TransferDirection::Fetch, &object, total);
        }

        let written = match self
            .stream_body(response.into_body(), file, &part_path, &uri_text, &object)
            .await
        {
            Ok(written) => written,
            Err(err) => {
                if let Err(cleanup) = tokio::fs::remove_file(&part_path).await {
                    tracing::warn!(
                        path = %part_path.display(),
                        error = %cleanup,
                        "failed to remove partial download"
                    );
                }
                return Err(err);
            }
        };

        tokio::fs::rename(&part_path, &local_path)
            .await
            .map_err(|source| TransferError::Io {
                path: local_path.clone(),
                source,
            })?;

        if let Some(observer) = &self.observer {
            observer.on_finish(&object, written);
        }

        tracing::debug!(
            category = %category,
            sector_id,
            bytes = written,
            path = %local_path.display(),
            "fetched object"
        );
        Ok(written)
    }

    async fn stream_body(
        &self,
        mut body: Body,
        mut file: File,
        path: &Path,
        uri_text: &str,
        object: &str,
    ) -> Result<u64, TransferError> {
        let io_err = |source| TransferError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut written = 0u64;
        while let Some(chunk) = body.data().await {
            let chunk = chunk.map_err(|source| TransferError::Body {
                uri: uri_text.to_owned(),
                source,
            })?;
            file.write_all(&chunk).await.map_err(io_err)?;
            written = written.saturating_add(chunk.len() as u64);
            if let Some(observer) = &self.observer {
                observer.on_progress(object, written);
            }
        }
        file.flush().await.map_err(io_err)?;
        Ok(written)
    }

    async fn push_object(
        &self,
        category: SectorCategory,
        sector_id: SectorId,
    ) -> Result<u64, TransferError> {
        let sector_name = self.naming.sector_name(sector_id);
        let uri = self.object_uri(category, &sector_name)?;
        let uri_text = uri.to_string();
        let local_path = self.layout.object_path(category, &sector_name);
        let object = remote_object_path(category, &sector_name);

        let io_err = |source| TransferError::Io {
            path: local_path.clone(),
            source,
        };
        let file = File::open(&local_path).await.map_err(io_err)?;
        let length = file.metadata().await.map_err(io_err)?.len();

        if let Some(observer) = &self.observer {
            observer.on_start(TransferDirection::Push, &object, Some(length));
        }

        let sent = Arc::new(AtomicU64::new(0));
        let stream = {
            let sent = sent.clone();
            let observer = self.observer.clone();
            let object = object.clone();
            ReaderStream::new(file).inspect(move |chunk| {
                if let Ok(chunk) = chunk {
                    let total = sent.fetch_add(chunk.len() as u64, Ordering::Relaxed)
                        + chunk.len() as u64;
                    if let Some(observer) = &observer {
                        observer.on_progress(&object, total);
                    }
                }
            })
        };

        let request = Request::builder()
            .method(Method::PUT)
            .uri(uri)
            .header(CONTENT_LENGTH, length)
            .body(Body::wrap_stream(stream))
            .map_err(|err| TransferError::InvalidUri {
                uri: uri_text.clone(),
                reason: err.to_string(),
            })?;

        let response =
            self.client
                .request(request)
                .await
                .map_err(|source| TransferError::Connection {
                    method: "PUT",
                    uri: uri_text.clone(),
                    source,
                })?;

        if !response.status().is_success() {
            return Err(TransferError::Status {
                method: "PUT",
                uri: uri_text,
                status: response.status(),
            });
        }

        let pushed = sent.load(Ordering::Relaxed);
        if let Some(observer) = &self.observer {
            observer.on_finish(&object, pushed);
        }

        tracing::debug!(
            category = %category,
            sector_id,
            bytes = pushed,
            "pushed object"
        );
        Ok(pushed)
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}
