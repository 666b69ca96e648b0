//! Scripted wire transport for exercising the session driver.

use std::collections::VecDeque;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use tickd_core::session::{StreamKind, StreamTransport, TransportFrame};
use tickd_core::TickdError;
use tickd_types::{SubscriptionId, SymbolSubscription};

/// Test-side handle feeding frames into a [`ScriptedTransport`].
pub struct TransportScript {
    frame_tx: mpsc::UnboundedSender<Result<TransportFrame, TickdError>>,
    open_results: std::sync::Arc<StdMutex<VecDeque<Result<(), TickdError>>>>,
}

impl TransportScript {
    /// Queue a frame for the driver to receive.
    pub fn push_frame(&self, frame: TransportFrame) {
        let _ = self.frame_tx.send(Ok(frame));
    }

    /// Queue a receive error (drives the reconnect path).
    pub fn push_error(&self, error: TickdError) {
        let _ = self.frame_tx.send(Err(error));
    }

    /// Script the outcome of the next `open` calls, in order. When the
    /// queue is empty, `open` succeeds.
    pub fn script_open(&self, results: Vec<Result<(), TickdError>>) {
        let mut guard = self.open_results.lock().expect("mutex poisoned");
        guard.extend(results);
    }
}

/// Transport whose behavior is fully scripted by a [`TransportScript`].
pub struct ScriptedTransport {
    frames: Mutex<mpsc::UnboundedReceiver<Result<TransportFrame, TickdError>>>,
    open_results: std::sync::Arc<StdMutex<VecDeque<Result<(), TickdError>>>>,
    opens: AtomicU32,
    pings: AtomicU32,
    next_id: AtomicI64,
    subscribe_log: StdMutex<Vec<String>>,
}

impl ScriptedTransport {
    /// Build a transport plus its controlling script handle.
    #[must_use]
    pub fn new() -> (std::sync::Arc<Self>, TransportScript) {
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let open_results = std::sync::Arc::new(StdMutex::new(VecDeque::new()));
        let transport = std::sync::Arc::new(Self {
            frames: Mutex::new(frame_rx),
            open_results: std::sync::Arc::clone(&open_results),
            opens: AtomicU32::new(0),
            pings: AtomicU32::new(0),
            next_id: AtomicI64::new(100),
            subscribe_log: StdMutex::new(Vec::new()),
        });
        (
            transport,
            TransportScript {
                frame_tx,
                open_results,
            },
        )
    }

    /// Number of times `open` was called.
    #[must_use]
    pub fn open_count(&self) -> u32 {
        self.opens.load(Ordering::Acquire)
    }

    /// Number of pings sent.
    #[must_use]
    pub fn ping_count(&self) -> u32 {
        self.pings.load(Ordering::Acquire)
    }

    /// Symbols subscribed on the wire, in call order.
    #[must_use]
    pub fn subscribe_log(&self) -> Vec<String> {
        self.subscribe_log.lock().expect("mutex poisoned").clone()
    }
}

#[async_trait]
impl StreamTransport for ScriptedTransport {
    async fn open(&self) -> Result<(), TickdError> {
        self.opens.fetch_add(1, Ordering::AcqRel);
        let scripted = self
            .open_results
            .lock()
            .expect("mutex poisoned")
            .pop_front();
        scripted.unwrap_or(Ok(()))
    }

    async fn recv(&self) -> Result<TransportFrame, TickdError> {
        let mut frames = self.frames.lock().await;
        match frames.recv().await {
            Some(frame) => frame,
            None => Ok(TransportFrame::Closed),
        }
    }

    async fn ping(&self) -> Result<(), TickdError> {
        self.pings.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn subscribe(
        &self,
        sub: &SymbolSubscription,
        stream: StreamKind,
    ) -> Result<SubscriptionId, TickdError> {
        let id = self.next_id.fetch_add(1, Ordering::AcqRel);
        self.subscribe_log
            .lock()
            .expect("mutex poisoned")
            .push(format!("{:?} {}", stream, sub.canonical()));
        Ok(id)
    }

    async fn unsubscribe(&self, _id: SubscriptionId) -> Result<(), TickdError> {
        Ok(())
    }

    async fn close(&self) {}
}
