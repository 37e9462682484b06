use std::sync::Arc;
use parking_lot::Mutex;
use ahash::AHashMap;

/// System-wide event bus
pub struct EventBus {
    handlers: Arc<Mutex<AHashMap<std::any::TypeId, Vec<Box<dyn EventHandler>>>>>,
}

/// Event trait that all events must implement
pub trait Event: Send + Sync + 'static {
    fn as_any(&self) -> &dyn std::any::Any;
}

/// Handler trait for event handlers
pub trait EventHandler: Send + Sync {
    fn handle(&mut self, event: &dyn Event);
}

/// Explorer events
pub mod events {
    use super::Event;
    use crate::state::TabKind;

    /// A drill transition happened
    #[derive(Debug, Clone)]
    pub struct DrillChanged {
        pub depth: usize,
        pub breadcrumb: String,
    }

    /// A tab finished loading
    #[derive(Debug, Clone)]
    pub struct TabLoaded {
        pub tab: TabKind,
        pub rows: usize,
        pub total_count: Option<u64>,
    }

    /// A tab failed to load
    #[derive(Debug, Clone)]
    pub struct TabFailed {
        pub tab: TabKind,
        pub error: String,
    }

    /// The top-level table received a page
    #[derive(Debug, Clone)]
    pub struct BrowserLoaded {
        pub rows: usize,
        pub total_count: u64,
        pub page: usize,
    }

    /// The top-level table failed to load
    #[derive(Debug, Clone)]
    pub struct BrowserFailed {
        pub error: String,
    }

    // Implement Event trait for all event types
    macro_rules! impl_event {
        ($($t:ty),*) => {
            $(
                impl Event for $t {
                    fn as_any(&self) -> &dyn std::any::Any {
                        self
                    }
                }
            )*
        }
    }

    impl_event!(
        DrillChanged,
        TabLoaded,
        TabFailed,
        BrowserLoaded,
        BrowserFailed
    );
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Mutex::new(AHashMap::new())),
        }
    }

    /// Subscribe to events of a specific type
    pub fn subscribe<E: Event>(&self, handler: Box<dyn EventHandler>) {
        let type_id = std::any::TypeId::of::<E>();
        let mut handlers = self.handlers.lock();
        handlers.entry(type_id).or_default().push(handler);
    }

    /// Publish an event
    pub fn publish<E: Event>(&self, event: E) {
        let type_id = std::any::TypeId::of::<E>();
        let mut handlers = self.handlers.lock();

        if let Some(event_handlers) = handlers.get_mut(&type_id) {
            for handler in event_handlers.iter_mut() {
                handler.handle(&event);
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper struct for creating event handlers from closures
pub struct ClosureEventHandler<F> {
    handler: F,
}

impl<F> EventHandler for ClosureEventHandler<F>
where
    F: FnMut(&dyn Event) + Send + Sync,
{
    fn handle(&mut self, event: &dyn Event) {
        (self.handler)(event);
    }
}

/// Create an event handler from a closure
pub fn handler_from_fn<F>(f: F) -> Box<dyn EventHandler>
where
    F: FnMut(&dyn Event) + Send + Sync + 'static,
{
    Box::new(ClosureEventHandler { handler: f })
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::events::{TabFailed, TabLoaded};
    use crate::state::TabKind;

    #[test]
    fn test_handlers_only_receive_their_event_type() {
        let bus = EventBus::new();
        let failures = Arc::new(Mutex::new(Vec::new()));
        let sink = failures.clone();

        bus.subscribe::<TabFailed>(handler_from_fn(move |event| {
            if let Some(failed) = event.as_any().downcast_ref::<TabFailed>() {
                sink.lock().push(failed.tab);
            }
        }));

        bus.publish(TabLoaded { tab: TabKind::Contracts, rows: 3, total_count: Some(3) });
        bus.publish(TabFailed { tab: TabKind::Contracts, error: "boom".into() });

        assert_eq!(*failures.lock(), vec![TabKind::Contracts]);
    }
}
