//! The multipart upload coordinator.
//!
//! [`MultipartUploader`] turns one inbound byte stream into a committed
//! remote object with an all-or-nothing outcome:
//!
//! - a producer task reads the stream sequentially and emits fixed-size
//!   parts (the final part may be shorter), numbered 1, 2, 3, … in read
//!   order, into a bounded queue so it never buffers ahead of the workers;
//! - a fixed pool of workers pulls parts from the queue and uploads them
//!   concurrently; completions may arrive in any order;
//! - the first fatal error anywhere cancels a shared token, all siblings
//!   stop promptly, and exactly one abort is issued for the session;
//! - on clean completion the collected `(part_number, etag)` results are
//!   sorted ascending into the manifest and exactly one complete call is
//!   issued.
//!
//! The session state machine is monotonic: `Initiated → PartsInFlight →
//! {Completing → Completed} | {Aborting → Aborted}`, with `Failed` reserved
//! for a rejected commit. Terminal states are never re-entered.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use cosgate_model::error::ProxyError;
use cosgate_model::request::StreamingBlob;
use cosgate_model::types::CompletedPart;

use crate::store::{CompletedUpload, ObjectStore, PutOptions};

/// Lifecycle states of one coordinator-owned upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UploadState {
    Initiated,
    PartsInFlight,
    Completing,
    Completed,
    Aborting,
    Aborted,
    Failed,
}

impl UploadState {
    /// Legal forward edges of the session state machine.
    fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Initiated, Self::PartsInFlight)
                | (Self::PartsInFlight, Self::Completing | Self::Aborting)
                | (Self::Completing, Self::Completed | Self::Failed)
                | (Self::Aborting, Self::Aborted)
        )
    }
}

/// One upload session, owned exclusively by a single coordinator invocation.
#[derive(Debug)]
struct UploadSession {
    upload_id: String,
    key: String,
    state: UploadState,
}

impl UploadSession {
    fn new(key: impl Into<String>, upload_id: impl Into<String>) -> Self {
        Self {
            upload_id: upload_id.into(),
            key: key.into(),
            state: UploadState::Initiated,
        }
    }

    /// Advance the state machine. Transitions are monotonic; an illegal edge
    /// is a coordinator bug.
    fn transition(&mut self, next: UploadState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal upload state transition: {:?} -> {next:?}",
            self.state,
        );
        debug!(
            upload_id = %self.upload_id,
            from = ?self.state,
            to = ?next,
            "upload session state change"
        );
        self.state = next;
    }
}

/// One part emitted by the stream splitter.
#[derive(Debug)]
struct Part {
    part_number: i32,
    data: Bytes,
}

/// Coordinates bounded-concurrency multipart uploads.
#[derive(Debug, Clone)]
pub struct MultipartUploader {
    part_size: usize,
    concurrency: usize,
}

/// Outcome of one pipeline task: the producer reports how many parts it
/// emitted, workers report nothing.
type TaskOutcome = Result<Option<usize>, ProxyError>;

impl MultipartUploader {
    /// Create an uploader with the given part size (bytes) and worker count.
    /// Both are clamped to at least 1.
    #[must_use]
    pub fn new(part_size: u64, concurrency: usize) -> Self {
        Self {
            part_size: usize::try_from(part_size.max(1)).unwrap_or(usize::MAX),
            concurrency: concurrency.max(1),
        }
    }

    /// Upload one inbound stream as a multipart object.
    ///
    /// On success exactly one complete call has been issued, with the
    /// manifest sorted ascending by part number. On any part or read failure
    /// exactly one abort call has been attempted and the original error is
    /// returned; an abort failure is logged, never surfaced.
    ///
    /// # Errors
    ///
    /// Returns the initiation error verbatim (no session exists yet), the
    /// first fatal pipeline error (after aborting), or the completion error.
    pub async fn upload(
        &self,
        store: Arc<dyn ObjectStore>,
        key: &str,
        opts: PutOptions,
        body: StreamingBlob,
    ) -> Result<CompletedUpload, ProxyError> {
        // Initiate: a failure here is reported immediately, no session state
        // exists to clean up.
        let upload_id = store.initiate_multipart_upload(key, opts).await?;
        let mut session = UploadSession::new(key, upload_id);
        info!(
            key,
            upload_id = %session.upload_id,
            part_size = self.part_size,
            workers = self.concurrency,
            "initiated multipart upload"
        );

        session.transition(UploadState::PartsInFlight);
        let cancel = CancellationToken::new();
        let (parts_tx, parts_rx) = mpsc::channel::<Part>(self.concurrency);
        let parts_rx = Arc::new(Mutex::new(parts_rx));
        let (results_tx, mut results_rx) = mpsc::unbounded_channel::<CompletedPart>();

        let mut tasks: JoinSet<TaskOutcome> = JoinSet::new();

        tasks.spawn(produce_parts(
            body,
            self.part_size,
            parts_tx,
            cancel.clone(),
        ));

        for _ in 0..self.concurrency {
            tasks.spawn(upload_parts(
                Arc::clone(&store),
                session.key.clone(),
                session.upload_id.clone(),
                Arc::clone(&parts_rx),
                results_tx.clone(),
                cancel.clone(),
            ));
        }
        // Workers hold the only senders now; the drain below ends when the
        // last worker exits.
        drop(results_tx);

        // Wait for the full pipeline to drain before deciding the outcome.
        let mut first_error: Option<ProxyError> = None;
        let mut produced: usize = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(Some(count))) => produced = count,
                Ok(Ok(None)) => {}
                Ok(Err(err)) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
                Err(join_err) => {
                    cancel.cancel();
                    if first_error.is_none() {
                        first_error = Some(ProxyError::transport(join_err));
                    }
                }
            }
        }

        let mut results = Vec::with_capacity(produced);
        while let Some(part) = results_rx.recv().await {
            results.push(part);
        }

        if let Some(err) = first_error {
            warn!(
                upload_id = %session.upload_id,
                error = %err,
                "multipart upload failed, aborting session"
            );
            abort_session(store.as_ref(), &mut session).await;
            return Err(err);
        }

        let manifest = build_manifest(results, produced)?;

        session.transition(UploadState::Completing);
        let completed = match store
            .complete_multipart_upload(&session.key, &session.upload_id, &manifest)
            .await
        {
            Ok(completed) => completed,
            Err(err) => {
                session.transition(UploadState::Failed);
                return Err(err);
            }
        };
        session.transition(UploadState::Completed);

        info!(
            key = %session.key,
            upload_id = %session.upload_id,
            parts = manifest.len(),
            "completed multipart upload"
        );
        Ok(completed)
    }
}

/// Read the inbound stream and emit fixed-size parts into the bounded queue.
///
/// Returns the number of parts emitted. Stops silently (without an error)
/// when the cancellation token fires or the queue closes; a stream read
/// error cancels the token and is returned as the fatal cause.
async fn produce_parts(
    body: StreamingBlob,
    part_size: usize,
    parts_tx: mpsc::Sender<Part>,
    cancel: CancellationToken,
) -> TaskOutcome {
    let mut stream = body.stream;
    let mut buf = BytesMut::with_capacity(part_size);
    let mut next_number: i32 = 1;

    loop {
        let chunk = tokio::select! {
            () = cancel.cancelled() => return Ok(Some(usize::try_from(next_number - 1).unwrap_or(0))),
            chunk = stream.next() => chunk,
        };

        match chunk {
            Some(Ok(data)) => {
                buf.extend_from_slice(&data);
                while buf.len() >= part_size {
                    let data = buf.split_to(part_size).freeze();
                    if !send_part(&parts_tx, &cancel, &mut next_number, data).await {
                        return Ok(Some(usize::try_from(next_number - 1).unwrap_or(0)));
                    }
                }
            }
            Some(Err(err)) => {
                // A read failure is fatal for the whole session.
                cancel.cancel();
                return Err(err.into());
            }
            None => break,
        }
    }

    // Clean end of stream: flush the final (possibly short) part.
    if !buf.is_empty() {
        let data = buf.freeze();
        send_part(&parts_tx, &cancel, &mut next_number, data).await;
    }

    Ok(Some(usize::try_from(next_number - 1).unwrap_or(0)))
}

/// Send one part into the queue, observing cancellation. Returns `false`
/// when the pipeline is shutting down and production should stop.
async fn send_part(
    parts_tx: &mpsc::Sender<Part>,
    cancel: &CancellationToken,
    next_number: &mut i32,
    data: Bytes,
) -> bool {
    let part = Part {
        part_number: *next_number,
        data,
    };
    tokio::select! {
        () = cancel.cancelled() => false,
        sent = parts_tx.send(part) => {
            if sent.is_ok() {
                *next_number += 1;
                true
            } else {
                false
            }
        }
    }
}

/// One worker: pull parts from the shared queue and upload them until the
/// queue drains, the token fires, or an upload fails (which cancels the
/// token and reports the error as the fatal cause).
async fn upload_parts(
    store: Arc<dyn ObjectStore>,
    key: String,
    upload_id: String,
    parts_rx: Arc<Mutex<mpsc::Receiver<Part>>>,
    results_tx: mpsc::UnboundedSender<CompletedPart>,
    cancel: CancellationToken,
) -> TaskOutcome {
    loop {
        let part = {
            let mut rx = parts_rx.lock().await;
            tokio::select! {
                () = cancel.cancelled() => return Ok(None),
                part = rx.recv() => part,
            }
        };
        let Some(part) = part else {
            return Ok(None);
        };

        debug!(part_number = part.part_number, len = part.data.len(), "uploading part");
        let body = StreamingBlob::from_bytes(part.data);
        let result = tokio::select! {
            () = cancel.cancelled() => return Ok(None),
            result = store.upload_part(&key, &upload_id, part.part_number, body) => result,
        };

        match result {
            Ok(e_tag) => {
                // The drain side outlives every worker; a send failure only
                // means the pipeline is already being torn down.
                let _ = results_tx.send(CompletedPart::new(part.part_number, e_tag));
            }
            Err(err) => {
                error!(part_number = part.part_number, error = %err, "part upload failed");
                cancel.cancel();
                return Err(err);
            }
        }
    }
}

/// Build the completion manifest from the collected results.
///
/// Sorts ascending by part number and verifies the invariant: exactly one
/// entry per produced part, no gaps, no duplicates. A violation means the
/// pipeline accounting is broken and the commit must not happen.
fn build_manifest(
    mut results: Vec<CompletedPart>,
    produced: usize,
) -> Result<Vec<CompletedPart>, ProxyError> {
    results.sort_unstable_by_key(|part| part.part_number);

    if results.len() != produced {
        return Err(ProxyError::transport(std::io::Error::other(format!(
            "multipart accounting mismatch: {} parts produced, {} acknowledged",
            produced,
            results.len()
        ))));
    }
    for (index, part) in results.iter().enumerate() {
        let expected = i32::try_from(index + 1).unwrap_or(i32::MAX);
        if part.part_number != expected {
            return Err(ProxyError::transport(std::io::Error::other(format!(
                "multipart manifest gap: expected part {expected}, found {}",
                part.part_number
            ))));
        }
    }

    Ok(results)
}

/// Issue the single abort for a failed session. An abort failure is logged
/// and swallowed so the original cause stays visible to the caller.
async fn abort_session(store: &dyn ObjectStore, session: &mut UploadSession) {
    session.transition(UploadState::Aborting);
    if let Err(abort_err) = store
        .abort_multipart_upload(&session.key, &session.upload_id)
        .await
    {
        error!(
            upload_id = %session.upload_id,
            error = %abort_err,
            "failed to abort multipart upload"
        );
    }
    session.transition(UploadState::Aborted);
}
