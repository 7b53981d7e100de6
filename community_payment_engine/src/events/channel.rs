//! Stateless pub-sub event delivery.
//!
//! Producers push events into a bounded channel; a single [`EventHandler`] drains it and runs the registered async
//! handler for each event on its own task. Handlers only see the event, never the engine's state.
//!
//! The handler loop ends once every [`EventProducer`] has been dropped, and then waits for in-flight handler tasks to
//! finish before returning.
use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::{sync::mpsc, task::JoinSet};

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    listener: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, listener) = mpsc::channel(buffer_size);
        Self { listener, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    pub async fn start_handler(mut self) {
        debug!("📬️ Starting event handler");
        // Only subscribers keep the channel open from here on
        drop(self.sender);
        let mut jobs = JoinSet::new();
        while let Some(ev) = self.listener.recv().await {
            trace!("📬️ Handling event");
            let handler = Arc::clone(&self.handler);
            jobs.spawn(async move { (handler)(ev).await });
            // Reap whatever has already finished so the set does not grow without bound
            while let Some(done) = jobs.try_join_next() {
                log_join_result(done);
            }
        }
        debug!("📬️ All producers are gone. Waiting for {} in-flight handlers", jobs.len());
        while let Some(done) = jobs.join_next().await {
            log_join_result(done);
        }
        debug!("📬️ Event handler has shut down");
    }
}

fn log_join_result(result: Result<(), tokio::task::JoinError>) {
    match result {
        Ok(()) => trace!("📬️ Event handled"),
        Err(e) => warn!("📬️ An event handler task failed: {e}"),
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    /// Publishing never fails the caller. A closed channel is logged and the event is dropped.
    pub async fn publish_event(&self, event: E) {
        if let Err(e) = self.sender.send(event).await {
            error!("📬️ Failed to send event: {e}");
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicI64, Ordering};

    use super::*;

    #[tokio::test]
    async fn every_event_reaches_the_handler() {
        let _ = env_logger::try_init();
        let total = Arc::new(AtomicI64::new(0));
        let seen = total.clone();
        let handler: Handler<i64> = Arc::new(move |cents| {
            let total = total.clone();
            Box::pin(async move {
                tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
                total.fetch_add(cents, Ordering::SeqCst);
            })
        });
        let event_handler = EventHandler::new(2, handler);
        let credits = event_handler.subscribe();
        let debits = event_handler.subscribe();
        tokio::spawn(async move {
            for cents in [100, 250, 5] {
                credits.publish_event(cents).await;
            }
        });
        tokio::spawn(async move {
            for cents in [-60, -40] {
                debits.publish_event(cents).await;
            }
        });
        event_handler.start_handler().await;
        assert_eq!(seen.load(Ordering::SeqCst), 255);
    }
}
