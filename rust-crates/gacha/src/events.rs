use crate::{
    submodel::SubmodelKind,
    sync::RequestHandle,
};
use serde_json::Value;
use std::fmt;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// `change:<attribute>`, scoped to a record when raised by a collection
    ChangeAttribute {
        record: Option<String>,
        attribute: String,
        value: Value,
    },
    Change {
        record: Option<String>,
    },
    Add {
        record: String,
    },
    Remove {
        record: String,
    },
    Reset,
    Request(RequestHandle),
    Sync,
    Error {
        message: String,
    },
}

impl EventKind {
    pub fn name(&self) -> String {
        match self {
            EventKind::ChangeAttribute { attribute, .. } => format!("change:{attribute}"),
            EventKind::Change { .. } => "change".to_string(),
            EventKind::Add { .. } => "add".to_string(),
            EventKind::Remove { .. } => "remove".to_string(),
            EventKind::Reset => "reset".to_string(),
            EventKind::Request(_) => "request".to_string(),
            EventKind::Sync => "sync".to_string(),
            EventKind::Error { .. } => "error".to_string(),
        }
    }

    pub fn is_attribute_change(&self, name: &str) -> bool {
        matches!(self, EventKind::ChangeAttribute { attribute, .. } if attribute == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Gacha,
    Submodel(SubmodelKind),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GachaEvent {
    pub origin: Origin,
    pub kind: EventKind,
}

impl GachaEvent {
    pub fn name(&self) -> String {
        self.kind.name()
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Gacha => write!(f, "gacha"),
            Origin::Submodel(kind) => write!(f, "gacha.{kind}"),
        }
    }
}

impl fmt::Display for GachaEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.origin, self.name())
    }
}

/// Events raised by a model that have not been picked up by its owner yet.
#[derive(Debug, Clone, Default)]
pub struct Emitter {
    pending: Vec<EventKind>,
}

impl Emitter {
    pub fn emit(&mut self, event: EventKind) {
        self.pending.push(event);
    }

    pub fn take(&mut self) -> Vec<EventKind> {
        std::mem::take(&mut self.pending)
    }
}

/// The single event stream of one aggregate instance.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    sender: broadcast::Sender<GachaEvent>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GachaEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, origin: Origin, kind: EventKind) {
        // no subscribers is not an error
        let _ = self.sender.send(GachaEvent { origin, kind });
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn publish__reaches_every_subscriber_in_order() {
        // given
        let dispatcher = Dispatcher::new();
        let mut first = dispatcher.subscribe();
        let mut second = dispatcher.subscribe();

        // when
        dispatcher.publish(Origin::Gacha, EventKind::Reset);
        dispatcher.publish(
            Origin::Submodel(SubmodelKind::Payouts),
            EventKind::Add {
                record: "agent".to_string(),
            },
        );

        // then
        for receiver in [&mut first, &mut second] {
            assert_eq!(receiver.try_recv().unwrap().name(), "reset");
            let bubbled = receiver.try_recv().unwrap();
            assert_eq!(bubbled.origin, Origin::Submodel(SubmodelKind::Payouts));
            assert_eq!(bubbled.name(), "add");
        }
    }

    #[test]
    fn name__formats_attribute_changes_with_the_attribute() {
        let event = EventKind::ChangeAttribute {
            record: None,
            attribute: "extra".to_string(),
            value: Value::Null,
        };

        assert_eq!(event.name(), "change:extra");
        assert!(event.is_attribute_change("extra"));
        assert!(!event.is_attribute_change("price"));
    }

    #[test]
    fn display__names_the_origin_and_the_event() {
        let bubbled = GachaEvent {
            origin: Origin::Submodel(SubmodelKind::Payouts),
            kind: EventKind::Reset,
        };
        let own = GachaEvent {
            origin: Origin::Gacha,
            kind: EventKind::Sync,
        };

        assert_eq!(bubbled.to_string(), "gacha.payouts reset");
        assert_eq!(own.to_string(), "gacha sync");
    }
}
