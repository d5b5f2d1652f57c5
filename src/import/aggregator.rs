//! Collects diagnostics from a synchronous producer while it runs.
//!
//! The producer gets a [`MessageSink`] backed by a queue of capacity 1, so
//! it is suspended whenever the consumer has not caught up yet. A single
//! consumer task drains the queue and hands the collected messages back over
//! a oneshot once the producer dropped its sink. The caller only reads the
//! messages after that hand-over.

use anyhow::Context;
use tokio::sync::{mpsc, oneshot};

use crate::models::{Locale, Message};

const QUEUE_CAPACITY: usize = 1;

/// Producer side of the diagnostic queue.
///
/// Sending blocks the current thread while the queue is full, so a sink must
/// only be used from blocking code (see [`aggregate`]).
#[derive(Debug)]
pub struct MessageSink {
    tx: mpsc::Sender<Message>,
}

impl MessageSink {
    pub fn send(&self, message: Message) {
        if self.tx.blocking_send(message).is_err() {
            tracing::warn!("Message collector is gone, dropping diagnostic");
        }
    }
}

/// Runs `producer` on the blocking pool and returns its result together with
/// the rendered, deduplicated messages it emitted.
///
/// Messages sent before a producer panic are still returned.
pub async fn aggregate<T, F>(locale: Locale, producer: F) -> (anyhow::Result<T>, Vec<String>)
where
    F: FnOnce(&MessageSink) -> T + Send + 'static,
    T: Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<Message>(QUEUE_CAPACITY);
    let (done_tx, done_rx) = oneshot::channel::<Vec<Message>>();

    tokio::spawn(async move {
        let mut received = Vec::new();
        while let Some(message) = rx.recv().await {
            received.push(message);
        }
        let _ = done_tx.send(received);
    });

    let produced = tokio::task::spawn_blocking(move || {
        let sink = MessageSink { tx };
        producer(&sink)
    })
    .await;

    // Wait for the consumer even when the producer panicked; its sink is
    // dropped either way, so the queue is closed.
    let received = match done_rx.await {
        Ok(received) => received,
        Err(_) => return (Err(anyhow::anyhow!("message collector stopped early")), Vec::new()),
    };

    (
        produced.context("import producer panicked"),
        render_unique(&received, locale),
    )
}

/// Renders messages for `locale`, dropping empty texts and later duplicates.
pub fn render_unique(messages: &[Message], locale: Locale) -> Vec<String> {
    let mut rendered: Vec<String> = Vec::with_capacity(messages.len());
    for message in messages {
        let text = message.render(locale);
        if !text.is_empty() && !rendered.contains(&text) {
            rendered.push(text);
        }
    }
    rendered
}
