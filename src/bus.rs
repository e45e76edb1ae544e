use crate::events::Event;
use crate::feed::traits::Ingest;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: Event) -> Result<usize, broadcast::error::SendError<Event>> {
        self.tx.send(event)
    }
}

impl Ingest for EventBus {
    fn ingest(&self, event: Event) {
        // No subscriber means the engine is between runs; dropping is fine.
        self.publish(event).ok();
    }
}
