//! Command exchanger
//!
//! `CommandExchanger` wraps an open `Transport` (which only moves bytes) and
//! adds request/response semantics: framing, firmware turnaround delay, the
//! single re-read after an empty reply, and one-at-a-time access.
//!
//! ```text
//! [BleTransport / simulated link]   ← implements Transport (raw I/O)
//!                |
//!        [CommandExchanger]          ← framing, delay, empty-read retry
//!                |
//!   [ConnectionManager / ButtonSynchronizer]
//! ```
//!
//! One exchanger is built per session and dies with it. Cancelling the
//! session's `SessionToken` fails every in-flight and queued exchange.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex, MutexGuard};
use tracing::{debug, trace, warn};

use crate::codec::{decode, encode, Frame};
use crate::command::{DeckRequest, DeckResponse};
use crate::error::ExchangeError;
use crate::protocol::{cmd, timing};
use crate::types::Endpoint;
use crate::Transport;

/// Delays applied around each exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeTiming {
    /// Wait between the write and the first read
    pub processing_delay: Duration,
    /// Wait before the single re-read after an empty read
    pub retry_delay: Duration,
}

impl Default for ExchangeTiming {
    fn default() -> Self {
        Self {
            processing_delay: Duration::from_millis(timing::PROCESSING_DELAY_MS),
            retry_delay: Duration::from_millis(timing::EMPTY_READ_RETRY_DELAY_MS),
        }
    }
}

// ============================================================================
// SessionToken
// ============================================================================

/// Cancellation flag shared by everything belonging to one session
#[derive(Debug, Clone)]
pub struct SessionToken {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for SessionToken {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Cancel the session. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the session is cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Run `fut` unless the session is cancelled first
    pub async fn run<F: Future>(&self, fut: F) -> Option<F::Output> {
        if self.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => None,
            out = fut => Some(out),
        }
    }

    /// Cancellable sleep. Returns `false` if cancelled.
    pub async fn sleep(&self, duration: Duration) -> bool {
        self.run(tokio::time::sleep(duration)).await.is_some()
    }
}

// ============================================================================
// CommandExchanger
// ============================================================================

/// Session-scoped command channel bound to one link and its command endpoint
pub struct CommandExchanger {
    link: Arc<dyn Transport>,
    endpoint: Endpoint,
    timing: ExchangeTiming,
    token: SessionToken,
    /// Serializes write/read cycles. The device has no transaction id, so two
    /// interleaved requests would read each other's replies.
    lane: Mutex<()>,
}

impl CommandExchanger {
    pub fn new(
        link: Arc<dyn Transport>,
        endpoint: Endpoint,
        timing: ExchangeTiming,
        token: SessionToken,
    ) -> Self {
        Self {
            link,
            endpoint,
            timing,
            token,
            lane: Mutex::new(()),
        }
    }

    /// Access the wrapped link.
    pub fn link(&self) -> &Arc<dyn Transport> {
        &self.link
    }

    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    pub fn timing(&self) -> ExchangeTiming {
        self.timing
    }

    /// Wait for exclusive use of the command channel.
    ///
    /// Hold the returned lane across several exchanges to keep other callers
    /// queued behind a multi-step operation.
    pub async fn lane(&self) -> Result<ExchangeLane<'_>, ExchangeError> {
        let guard = self
            .token
            .run(self.lane.lock())
            .await
            .ok_or(ExchangeError::Cancelled)?;
        Ok(ExchangeLane {
            exchanger: self,
            _guard: guard,
        })
    }

    /// Take the command channel only if it is idle.
    pub fn try_lane(&self) -> Result<ExchangeLane<'_>, ExchangeError> {
        if self.token.is_cancelled() {
            return Err(ExchangeError::Cancelled);
        }
        let guard = self.lane.try_lock().map_err(|_| ExchangeError::Busy)?;
        Ok(ExchangeLane {
            exchanger: self,
            _guard: guard,
        })
    }

    /// Queue for the lane and run one exchange.
    pub async fn execute(&self, command: u8, payload: &[u8]) -> Result<Frame, ExchangeError> {
        self.lane().await?.execute(command, payload).await
    }

    // ---- Exchange cycle ----

    async fn exchange_once(&self, command: u8, request: &[u8]) -> Result<Frame, ExchangeError> {
        trace!("TX {} {:02X?}", cmd::name(command), request);
        self.link.write(&self.endpoint, request).await?;
        tokio::time::sleep(self.timing.processing_delay).await;

        let reply = self.link.read(&self.endpoint).await?;
        if !reply.is_empty() {
            trace!("RX {:02X?}", reply);
            return decode(&reply).map_err(|source| {
                warn!("Garbled reply to {}: {}", cmd::name(command), source);
                ExchangeError::Protocol { command, source }
            });
        }

        debug!("Empty reply to {}, retrying read", cmd::name(command));
        tokio::time::sleep(self.timing.retry_delay).await;

        let reply = self.link.read(&self.endpoint).await?;
        trace!("RX (retry) {:02X?}", reply);
        decode(&reply).map_err(|e| {
            debug!("Retry read for {} failed: {}", cmd::name(command), e);
            ExchangeError::NoResponse { command }
        })
    }
}

// ============================================================================
// ExchangeLane
// ============================================================================

/// Exclusive access to a session's command channel
pub struct ExchangeLane<'a> {
    exchanger: &'a CommandExchanger,
    _guard: MutexGuard<'a, ()>,
}

impl ExchangeLane<'_> {
    pub fn exchanger(&self) -> &CommandExchanger {
        self.exchanger
    }

    /// Encode, write, wait, read and decode one frame.
    ///
    /// Returns the raw reply; the error code is not inspected.
    pub async fn execute(&mut self, command: u8, payload: &[u8]) -> Result<Frame, ExchangeError> {
        let request = encode(command, payload)?;
        let exchanger = self.exchanger;
        exchanger
            .token
            .run(exchanger.exchange_once(command, &request))
            .await
            .unwrap_or(Err(ExchangeError::Cancelled))
    }

    /// Send a typed request and require a NONE error code
    pub async fn request<Q: DeckRequest + ?Sized>(&mut self, req: &Q) -> Result<Frame, ExchangeError> {
        let command = req.command();
        let frame = self.execute(command, &req.payload()).await?;
        check_reply(command, frame)
    }

    /// Send a typed request and parse its payload
    pub async fn query<Q, R>(&mut self, req: &Q) -> Result<R, ExchangeError>
    where
        Q: DeckRequest + ?Sized,
        R: DeckResponse,
    {
        let frame = self.request(req).await?;
        R::parse(frame.payload()).map_err(|e| ExchangeError::Malformed {
            command: req.command(),
            reason: e.to_string(),
        })
    }

    /// Write raw bytes to another endpoint of the same link in bounded chunks.
    ///
    /// Returns the number of writes performed.
    pub async fn write_chunked(
        &mut self,
        endpoint: &Endpoint,
        data: &[u8],
        chunk_size: usize,
        delay: Duration,
    ) -> Result<usize, ExchangeError> {
        let exchanger = self.exchanger;
        let mut writes = 0;
        for (i, chunk) in data.chunks(chunk_size.max(1)).enumerate() {
            if i > 0 && !exchanger.token.sleep(delay).await {
                return Err(ExchangeError::Cancelled);
            }
            exchanger
                .token
                .run(exchanger.link.write(endpoint, chunk))
                .await
                .ok_or(ExchangeError::Cancelled)??;
            writes += 1;
        }
        debug!("Wrote {} bytes in {} chunk(s)", data.len(), writes);
        Ok(writes)
    }

    /// Cancellable pause while keeping the lane
    pub async fn pause(&mut self, duration: Duration) -> Result<(), ExchangeError> {
        if self.exchanger.token.sleep(duration).await {
            Ok(())
        } else {
            Err(ExchangeError::Cancelled)
        }
    }
}

fn check_reply(command: u8, frame: Frame) -> Result<Frame, ExchangeError> {
    let code = frame.error_code();
    if !code.is_ok() {
        return Err(ExchangeError::Device { command, code });
    }
    if frame.command != command {
        return Err(ExchangeError::UnexpectedCommand {
            expected: command,
            got: frame.command,
        });
    }
    Ok(frame)
}
