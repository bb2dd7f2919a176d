//! Module `file_ops`
//!
//! Moves file bytes between the server root and an open data stream. Both
//! directions run on their own task and report through the data-connection
//! signal; an abort or a forced close resolving that signal first stops the
//! copy.
//!
//! Uploads are written to a temporary file and renamed on completion, so a
//! broken upload never leaves a truncated file under the final name.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{error, info, warn};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinHandle;

use crate::error::TransferError;
use crate::transfer::data_channel::{BoxedDataStream, DataConnection};
use crate::transfer::job::RetrieveSource;
use crate::transfer::results::TransferOutcome;

const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024; // 100MB
const BUFFER_SIZE: usize = 8192;

/// A file under the server root, pushed to the peer on RETR.
#[derive(Debug, Clone)]
pub struct LocalFile {
    path: PathBuf,
}

impl LocalFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RetrieveSource for LocalFile {
    fn start_retrieve(&self, data: &Arc<DataConnection>) -> Result<(), TransferError> {
        if !self.path.is_file() {
            return Err(TransferError::NoSuchFile(self.path.display().to_string()));
        }
        let data = Arc::clone(data);
        let path = self.path.clone();
        tokio::spawn(async move {
            let signal = data.data_signal();
            let Some(stream) = data.take_stream().await else {
                error!("No data connection to send {}", path.display());
                signal.try_resolve(TransferOutcome::Failed);
                return;
            };
            let outcome = tokio::select! {
                outcome = send_file(stream, &path) => outcome,
                external = signal.wait_resolved() => {
                    warn!("Sending {} stopped: {:?}", path.display(), external);
                    return;
                }
            };
            signal.try_resolve(outcome);
        });
        Ok(())
    }
}

async fn send_file(mut stream: BoxedDataStream, path: &Path) -> TransferOutcome {
    info!("Starting file download: {}", path.display());
    let mut file = match File::open(path).await {
        Ok(file) => file,
        Err(e) => {
            error!("Failed to open file {}: {}", path.display(), e);
            return TransferOutcome::FileUnavailable;
        }
    };

    let sent = match tokio::io::copy(&mut file, &mut stream).await {
        Ok(sent) => sent,
        Err(e) => {
            error!("Sending {} failed: {}", path.display(), e);
            return TransferOutcome::Failed;
        }
    };
    if let Err(e) = stream.shutdown().await {
        warn!("Closing data stream after {} failed: {}", path.display(), e);
        return TransferOutcome::Failed;
    }
    info!(
        "File download completed successfully: {} ({} bytes)",
        path.display(),
        sent
    );
    TransferOutcome::Success
}

/// Receives an upload into `path` on a dedicated task. The returned handle
/// yields the outcome that was also reported through the data signal.
pub fn receive_file(data: Arc<DataConnection>, path: PathBuf) -> JoinHandle<TransferOutcome> {
    tokio::spawn(async move {
        let signal = data.data_signal();
        let Some(stream) = data.take_stream().await else {
            error!("No data connection to receive {}", path.display());
            signal.try_resolve(TransferOutcome::Failed);
            return TransferOutcome::Failed;
        };
        let temp = temp_path(&path);
        let outcome = tokio::select! {
            outcome = store_file(stream, &temp, &path) => outcome,
            external = signal.wait_resolved() => {
                warn!("Receiving {} stopped: {:?}", path.display(), external);
                let _ = fs::remove_file(&temp).await;
                return external.unwrap_or(TransferOutcome::Aborted);
            }
        };
        if signal.try_resolve(outcome) {
            return outcome;
        }

        // the transfer already ended another way; its outcome stands
        let external = signal.peek().unwrap_or(TransferOutcome::Aborted);
        warn!(
            "Upload of {} finished after the transfer ended ({:?}), discarding it",
            path.display(),
            external
        );
        if outcome.is_success() {
            let _ = fs::remove_file(&path).await;
        }
        external
    })
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

async fn store_file(mut stream: BoxedDataStream, temp: &Path, target: &Path) -> TransferOutcome {
    info!(
        "Starting file upload: {} -> {}",
        temp.display(),
        target.display()
    );
    let mut file = match File::create(temp).await {
        Ok(file) => file,
        Err(e) => {
            error!("Failed to create temporary file {}: {}", temp.display(), e);
            return TransferOutcome::Failed;
        }
    };

    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut received = 0u64;
    loop {
        let n = match stream.read(&mut buffer).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                error!("Read failure on data connection: {}", e);
                let _ = fs::remove_file(temp).await;
                return TransferOutcome::Failed;
            }
        };
        received += n as u64;
        if received > MAX_FILE_SIZE {
            error!(
                "File size limit exceeded: {} bytes > {} bytes",
                received, MAX_FILE_SIZE
            );
            let _ = fs::remove_file(temp).await;
            return TransferOutcome::Failed;
        }
        if let Err(e) = file.write_all(&buffer[..n]).await {
            error!("Failed to write to temporary file {}: {}", temp.display(), e);
            let _ = fs::remove_file(temp).await;
            return TransferOutcome::Failed;
        }
    }

    if let Err(e) = file.flush().await {
        error!("Failed to flush temporary file {}: {}", temp.display(), e);
        let _ = fs::remove_file(temp).await;
        return TransferOutcome::Failed;
    }
    drop(file);

    match fs::rename(temp, target).await {
        Ok(()) => {
            info!(
                "File upload completed successfully: {} ({} bytes)",
                target.display(),
                received
            );
            TransferOutcome::Success
        }
        Err(e) => {
            error!(
                "Failed to rename {} to {}: {}",
                temp.display(),
                target.display(),
                e
            );
            let _ = fs::remove_file(temp).await;
            TransferOutcome::Failed
        }
    }
}
