//! Unit tests for the EventBus - the ingestion fan-in channel.

#[cfg(test)]
mod bus_tests {
    use crate::bus::EventBus;
    use crate::events::{ChatEvent, Event, TradeEvent, TradeKind};
    use crate::feed::traits::Ingest;
    use chrono::Utc;

    #[tokio::test]
    async fn test_eventbus_publish_subscribe() {
        let bus = EventBus::new(100);
        let mut rx = bus.subscribe();

        let trade = TradeEvent::new(TradeKind::Buy, 1.5, "whale", Utc::now()).unwrap();
        assert!(bus.publish(Event::Trade(trade)).is_ok());

        match rx.recv().await {
            Ok(Event::Trade(t)) => {
                assert_eq!(t.kind, TradeKind::Buy);
                assert_eq!(t.quantity, 1.5);
                assert_eq!(t.actor, "whale");
            }
            other => panic!("Expected trade event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_eventbus_multiple_subscribers() {
        let bus = EventBus::new(100);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        let chat = ChatEvent::new("degen42", "gm", Utc::now(), 100).unwrap();
        bus.publish(Event::Chat(chat)).unwrap();

        assert!(matches!(rx1.recv().await, Ok(Event::Chat(_))));
        assert!(matches!(rx2.recv().await, Ok(Event::Chat(_))));
    }

    #[tokio::test]
    async fn test_ingest_without_subscribers_does_not_panic() {
        let bus = EventBus::new(4);
        for _ in 0..10 {
            bus.ingest(Event::Tick);
        }
    }

    #[tokio::test]
    async fn test_ingest_delivers_in_order() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.ingest(Event::Tick);
        bus.ingest(Event::Chat(ChatEvent::new("a", "first", Utc::now(), 100).unwrap()));

        assert!(matches!(rx.recv().await, Ok(Event::Tick)));
        match rx.recv().await {
            Ok(Event::Chat(c)) => assert_eq!(c.text, "first"),
            other => panic!("Expected chat event, got {:?}", other),
        }
    }
}
