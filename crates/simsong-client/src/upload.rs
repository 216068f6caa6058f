//! Per-phase bounds for a single upload.
//!
//! reqwest only bounds the connect phase on its own. The body is streamed
//! from the staged file in chunks, and every chunk handed to the connection
//! counts as write progress. A watchdog races the request and fails it when
//! a phase goes quiet for longer than its bound:
//!
//! - connecting: no body chunk requested within connect + write
//! - uploading: no further chunk requested within `write_timeout`
//! - awaiting response: no response head within `read_timeout` of the last chunk
//!
//! Reads of the response body are bounded chunk by chunk in the client.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::stream::{self, Stream};
use tokio::io::AsyncReadExt;
use tokio::time::Instant;

use crate::error::PredictError;

/// Bytes read from the staged file per body chunk.
pub const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy)]
enum Phase {
    Connecting { since: Instant },
    Uploading { last_chunk: Instant },
    AwaitingResponse { since: Instant },
}

/// Timeouts applied by [`UploadProgress::watchdog`].
#[derive(Debug, Clone, Copy)]
pub struct PhaseBounds {
    pub connect: Duration,
    pub write: Duration,
    pub read: Duration,
}

/// Shared progress marker between the body stream and the watchdog.
#[derive(Debug)]
pub struct UploadProgress {
    phase: Mutex<Phase>,
    bounds: PhaseBounds,
}

impl UploadProgress {
    pub fn new(bounds: PhaseBounds) -> Arc<Self> {
        Arc::new(Self {
            phase: Mutex::new(Phase::Connecting {
                since: Instant::now(),
            }),
            bounds,
        })
    }

    fn phase(&self) -> Phase {
        match self.phase.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn set_phase(&self, phase: Phase) {
        match self.phase.lock() {
            Ok(mut guard) => *guard = phase,
            Err(poisoned) => *poisoned.into_inner() = phase,
        }
    }

    /// A chunk was requested by the connection.
    fn chunk_sent(&self) {
        self.set_phase(Phase::Uploading {
            last_chunk: Instant::now(),
        });
    }

    /// The last chunk was handed over; the response is now awaited.
    fn body_sent(&self) {
        self.set_phase(Phase::AwaitingResponse {
            since: Instant::now(),
        });
    }

    fn deadline(&self, phase: Phase) -> Instant {
        match phase {
            Phase::Connecting { since } => since + self.bounds.connect + self.bounds.write,
            Phase::Uploading { last_chunk } => last_chunk + self.bounds.write,
            Phase::AwaitingResponse { since } => since + self.bounds.read,
        }
    }

    /// Resolves with a timeout error once the current phase overruns its bound.
    ///
    /// Never resolves while progress keeps being made; race it against the
    /// request and drop it when the request finishes.
    pub async fn watchdog(&self) -> PredictError {
        loop {
            let phase = self.phase();
            let deadline = self.deadline(phase);
            tokio::time::sleep_until(deadline).await;

            let current = self.phase();
            if self.deadline(current) <= Instant::now() {
                return self.timeout_error(current);
            }
        }
    }

    fn timeout_error(&self, phase: Phase) -> PredictError {
        let msg = match phase {
            Phase::Connecting { .. } => format!(
                "upload did not start within {:?}",
                self.bounds.connect + self.bounds.write
            ),
            Phase::Uploading { .. } => {
                format!("upload stalled for more than {:?}", self.bounds.write)
            }
            Phase::AwaitingResponse { .. } => {
                format!("no response within {:?}", self.bounds.read)
            }
        };
        PredictError::Timeout(msg)
    }
}

/// Stream `len` bytes of `file` in chunks, reporting progress as it goes.
pub fn body_stream(
    file: tokio::fs::File,
    len: u64,
    progress: Arc<UploadProgress>,
) -> impl Stream<Item = std::io::Result<Vec<u8>>> + Send + 'static {
    stream::try_unfold(
        (file, 0u64, progress),
        move |(mut file, sent, progress)| async move {
            if sent >= len {
                progress.body_sent();
                return Ok::<_, std::io::Error>(None);
            }

            progress.chunk_sent();

            let want = CHUNK_SIZE.min((len - sent) as usize);
            let mut buf = vec![0u8; want];
            let n = file.read(&mut buf).await?;
            if n == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "staging file shorter than expected",
                ));
            }
            buf.truncate(n);

            let sent = sent + n as u64;
            if sent >= len {
                progress.body_sent();
            }

            Ok(Some((buf, (file, sent, progress))))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn bounds(ms: u64) -> PhaseBounds {
        PhaseBounds {
            connect: Duration::from_millis(ms),
            write: Duration::from_millis(ms),
            read: Duration::from_millis(ms),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_fires_when_upload_stalls() {
        let progress = UploadProgress::new(bounds(100));
        progress.chunk_sent();

        let err = progress.watchdog().await;
        assert!(matches!(err, PredictError::Timeout(ref msg) if msg.contains("stalled")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_waits_while_progressing() {
        let progress = UploadProgress::new(bounds(100));
        progress.chunk_sent();

        let ticker = {
            let progress = Arc::clone(&progress);
            async move {
                for _ in 0..10 {
                    tokio::time::sleep(Duration::from_millis(60)).await;
                    progress.chunk_sent();
                }
            }
        };

        tokio::select! {
            _ = ticker => {}
            err = progress.watchdog() => panic!("fired during steady upload: {}", err),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_read_phase() {
        let progress = UploadProgress::new(bounds(100));
        progress.body_sent();

        let started = Instant::now();
        let err = progress.watchdog().await;
        assert!(matches!(err, PredictError::Timeout(ref msg) if msg.contains("no response")));
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_body_stream_yields_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.jpg");
        let data: Vec<u8> = (0..(CHUNK_SIZE * 2 + 17)).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let progress = UploadProgress::new(bounds(1000));
        let file = tokio::fs::File::open(&path).await.unwrap();
        let chunks: Vec<Vec<u8>> = body_stream(file, data.len() as u64, Arc::clone(&progress))
            .map(|c| c.unwrap())
            .collect()
            .await;

        assert!(chunks.len() >= 3);
        assert_eq!(chunks.concat(), data);
        assert!(matches!(progress.phase(), Phase::AwaitingResponse { .. }));
    }
}
