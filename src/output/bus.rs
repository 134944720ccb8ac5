//! Event bus: many producers, one render task

use super::formatter::Renderer;
use super::{Event, EventSink};
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

enum Message {
    Event(Event),
    Flush(oneshot::Sender<()>),
}

/// Serializes events from concurrent producers onto one renderer.
///
/// Sending never blocks the producer. Events emitted after [`Bus::close`]
/// are dropped.
pub struct Bus {
    tx: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Bus {
    /// Spawn the render task. Must be called within a tokio runtime.
    pub fn new(mut renderer: Box<dyn Renderer>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        let handle = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match message {
                    Message::Event(event) => renderer.render(&event),
                    Message::Flush(ack) => {
                        renderer.flush();
                        let _ = ack.send(());
                    }
                }
            }
            renderer.flush();
        });

        Self {
            tx: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
        }
    }

    fn send(&self, message: Message) -> bool {
        match self.tx.lock() {
            Ok(guard) => guard.as_ref().map(|tx| tx.send(message).is_ok()).unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Render everything queued so far, then stop the render task
    pub async fn close(&self) {
        let tx = self.tx.lock().ok().and_then(|mut guard| guard.take());
        drop(tx);

        let handle = self.handle.lock().ok().and_then(|mut guard| guard.take());
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

#[async_trait]
impl EventSink for Bus {
    fn emit(&self, event: Event) {
        self.send(Message::Event(event));
    }

    /// Wait until every event emitted before this call has been rendered
    async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.send(Message::Flush(ack_tx)) {
            let _ = ack_rx.await;
        }
    }
}
