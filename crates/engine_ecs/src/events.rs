//! Lifecycle notifications.
//!
//! The world announces structural changes on an [`EventBus`]. The core never
//! consumes its own events; they exist for collaborators such as loggers,
//! networking or editors.

use engine_component::{ComponentFlag, ComponentInstance, ComponentShape, Entity};

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// An id was allocated; it is not live yet.
    EntityCreated(Entity),
    EntityAdded(Entity),
    /// Removal of the entity was requested.
    EntityRemoving(Entity),
    EntityRemoved(Entity),
    ComponentRegistered {
        name: String,
        shape: ComponentShape,
        flag: ComponentFlag,
    },
    /// A detached instance was built by `create_component`.
    ComponentCreated {
        name: String,
        fields: engine_component::Fields,
    },
    ComponentAdded {
        name: String,
        instance: ComponentInstance,
    },
    ComponentRemoved {
        name: String,
        instance: ComponentInstance,
    },
    SystemRegistered {
        name: String,
        types: Vec<String>,
    },
    Update {
        delta: f64,
        tick: u64,
    },
    Start,
}

impl Event {
    /// The wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Event::EntityCreated(_) => "entity-created",
            Event::EntityAdded(_) => "entity-added",
            Event::EntityRemoving(_) => "entity-removed::before",
            Event::EntityRemoved(_) => "entity-removed",
            Event::ComponentRegistered { .. } => "component-registered",
            Event::ComponentCreated { .. } => "component-created",
            Event::ComponentAdded { .. } => "component-added",
            Event::ComponentRemoved { .. } => "component-removed",
            Event::SystemRegistered { .. } => "system-registered",
            Event::Update { .. } => "update",
            Event::Start => "start",
        }
    }
}

/// Receives world events.
pub trait EventSink {
    fn on_event(&mut self, event: &Event);
}

impl<F> EventSink for F
where
    F: FnMut(&Event),
{
    fn on_event(&mut self, event: &Event) {
        self(event)
    }
}

#[derive(Default)]
pub struct EventBus {
    sinks: Vec<Box<dyn EventSink>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, sink: impl EventSink + 'static) {
        self.sinks.push(Box::new(sink));
    }

    /// Deliver `event` to every sink, in subscription order.
    ///
    /// Events are built lazily so an unobserved world pays nothing for
    /// cloning payloads.
    pub fn emit_with(&mut self, event: impl FnOnce() -> Event) {
        if self.sinks.is_empty() {
            return;
        }
        let event = event();
        for sink in &mut self.sinks {
            sink.on_event(&event);
        }
    }

    pub fn emit(&mut self, event: Event) {
        self.emit_with(|| event);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn test_sinks_receive_in_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();
        let a = seen.clone();
        bus.subscribe(move |e: &Event| a.borrow_mut().push(format!("a:{}", e.name())));
        let b = seen.clone();
        bus.subscribe(move |e: &Event| b.borrow_mut().push(format!("b:{}", e.name())));

        bus.emit(Event::EntityRemoving(Entity(1)));
        assert_eq!(
            *seen.borrow(),
            vec!["a:entity-removed::before", "b:entity-removed::before"]
        );
    }

    #[test]
    fn test_emit_with_skips_construction_without_sinks() {
        let mut bus = EventBus::new();
        bus.emit_with(|| panic!("built an event nobody listens to"));
        assert!(bus.is_empty());
    }

    #[test]
    fn test_update_event_name() {
        let event = Event::Update {
            delta: 0.05,
            tick: 3,
        };
        assert_eq!(event.name(), "update");
    }
}
