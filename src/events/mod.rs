use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::order::OrderStatus;

/// Domain events emitted by the services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderPlaced {
        order_id: Uuid,
        unique_id: String,
        total_amount: Decimal,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
        source: StatusSource,
    },
    OrderCancelled(Uuid),
    StockRestored {
        order_id: Uuid,
        book_id: Uuid,
        quantity: i32,
    },
    LowStock {
        book_id: Uuid,
        title: String,
        stock_quantity: i32,
    },
    ShipmentCreated {
        order_id: Uuid,
        tracking_number: String,
    },
    UserRegistered(Uuid),
}

/// Who moved an order to a new status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusSource {
    Admin,
    Customer,
    CarrierWebhook,
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is closed
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "event dropped");
        }
    }
}

/// Consumes events until every sender is dropped
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderPlaced {
                order_id,
                unique_id,
                total_amount,
            } => info!(%order_id, %unique_id, %total_amount, "order placed"),
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
                source,
            } => info!(%order_id, %old_status, %new_status, ?source, "order status changed"),
            Event::OrderCancelled(order_id) => info!(%order_id, "order cancelled"),
            Event::StockRestored {
                order_id,
                book_id,
                quantity,
            } => info!(%order_id, %book_id, quantity, "stock restored"),
            Event::LowStock {
                book_id,
                title,
                stock_quantity,
            } => warn!(%book_id, %title, stock_quantity, "book stock is low"),
            Event::ShipmentCreated {
                order_id,
                tracking_number,
            } => info!(%order_id, %tracking_number, "shipment created"),
            Event::UserRegistered(user_id) => info!(%user_id, "user registered"),
        }
    }

    info!("Event channel closed; event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_or_log_survives_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        sender.send_or_log(Event::OrderCancelled(Uuid::new_v4())).await;
        assert!(sender.send(Event::UserRegistered(Uuid::new_v4())).await.is_err());
    }

    #[tokio::test]
    async fn processing_loop_drains_until_senders_drop() {
        let (tx, rx) = mpsc::channel(4);
        let handle = tokio::spawn(process_events(rx));
        let sender = EventSender::new(tx);
        sender
            .send(Event::ShipmentCreated {
                order_id: Uuid::new_v4(),
                tracking_number: "yal-123".into(),
            })
            .await
            .unwrap();
        drop(sender);
        handle.await.unwrap();
    }
}
