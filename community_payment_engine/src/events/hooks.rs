use std::{future::Future, pin::Pin, sync::Arc};

use log::*;

use crate::events::{BalanceChangedEvent, EventHandler, EventProducer, Handler, PaymentSucceededEvent};

/// The publishing side of the hooks. APIs hold a clone and publish to every producer in the list.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub payment_succeeded_producer: Vec<EventProducer<PaymentSucceededEvent>>,
    pub balance_changed_producer: Vec<EventProducer<BalanceChangedEvent>>,
}

impl EventProducers {
    pub async fn publish_payment_succeeded(&self, event: PaymentSucceededEvent) {
        for producer in &self.payment_succeeded_producer {
            trace!("📬️ Publishing payment succeeded event for order [{}]", event.order.order_no);
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_balance_changed(&self, event: BalanceChangedEvent) {
        for producer in &self.balance_changed_producer {
            trace!("📬️ Publishing balance changed event for user #{}", event.user_id);
            producer.publish_event(event.clone()).await;
        }
    }
}

pub struct EventHandlers {
    pub on_payment_succeeded: Option<EventHandler<PaymentSucceededEvent>>,
    pub on_balance_changed: Option<EventHandler<BalanceChangedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_payment_succeeded = hooks.on_payment_succeeded.map(|f| EventHandler::new(buffer_size, f));
        let on_balance_changed = hooks.on_balance_changed.map(|f| EventHandler::new(buffer_size, f));
        Self { on_payment_succeeded, on_balance_changed }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_payment_succeeded {
            result.payment_succeeded_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_balance_changed {
            result.balance_changed_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_payment_succeeded {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_balance_changed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_payment_succeeded: Option<Handler<PaymentSucceededEvent>>,
    pub on_balance_changed: Option<Handler<BalanceChangedEvent>>,
}

impl EventHooks {
    pub fn on_payment_succeeded<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PaymentSucceededEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_payment_succeeded = Some(Arc::new(f));
        self
    }

    pub fn on_balance_changed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(BalanceChangedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_balance_changed = Some(Arc::new(f));
        self
    }
}
