use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Events emitted after a state change commits. Delivery is fire-and-forget:
/// a send failure never rolls back the transition that produced the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Order events
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },

    // Cancellation workflow events
    CancellationRequested(Uuid),
    CancellationApproved(Uuid),
    CancellationRejected(Uuid),

    // Paperwork events
    PaperworkCreated {
        order_id: Uuid,
        paperwork_id: Uuid,
    },
    PaperworkFinalized(Uuid),
    PaperworkApproved(Uuid),
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
}

/// Consumes events and logs them. Downstream integrations (notifications,
/// webhooks) hang off this loop in the surrounding platform.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderCreated(order_id) => {
                info!(%order_id, "order created");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, %old_status, %new_status, "order status changed");
            }
            Event::CancellationRequested(order_id) => {
                info!(%order_id, "cancellation requested");
            }
            Event::CancellationApproved(order_id) => {
                info!(%order_id, "cancellation approved");
            }
            Event::CancellationRejected(order_id) => {
                info!(%order_id, "cancellation rejected");
            }
            Event::PaperworkCreated {
                order_id,
                paperwork_id,
            } => {
                info!(%order_id, %paperwork_id, "paperwork created");
            }
            Event::PaperworkFinalized(paperwork_id) => {
                info!(%paperwork_id, "paperwork finalized");
            }
            Event::PaperworkApproved(paperwork_id) => {
                info!(%paperwork_id, "paperwork approved");
            }
        }
        debug!(?event, "event processed");
    }

    info!("Event processing loop stopped");
}
