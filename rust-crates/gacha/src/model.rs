use crate::{
    events::{
        Emitter,
        EventKind,
    },
    sync::{
        SyncAdapter,
        SyncError,
        SyncIntent,
        SyncOptions,
        SyncResource,
        Transport,
    },
};
use serde_json::{
    Map,
    Value,
};

pub type Attributes = Map<String, Value>;

/// Keyed attribute store that records a change event for every attribute
/// whose value actually changes.
#[derive(Debug, Clone, Default)]
pub struct Model {
    url: String,
    attributes: Attributes,
    events: Emitter,
}

impl Model {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            attributes: Attributes::new(),
            events: Emitter::default(),
        }
    }

    pub fn with_attributes(url: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            url: url.into(),
            attributes,
            events: Emitter::default(),
        }
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Integer attribute, accepting numeric strings as well.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            Value::Number(number) => number
                .as_i64()
                .or_else(|| number.as_f64().map(|float| float.trunc() as i64)),
            Value::String(raw) => raw.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) -> bool {
        let key = key.into();
        if !self.write(key, value) {
            return false;
        }
        self.events.emit(EventKind::Change { record: None });
        true
    }

    /// Merges `attributes` into the model.
    pub fn set_many(&mut self, attributes: Attributes) -> bool {
        let mut changed = false;
        for (key, value) in attributes {
            changed |= self.write(key, value);
        }
        if changed {
            self.events.emit(EventKind::Change { record: None });
        }
        changed
    }

    /// Makes `attributes` the complete attribute set; keys missing from it are
    /// removed and reported as changed to `null`.
    pub fn replace(&mut self, attributes: Attributes) -> bool {
        if self.attributes == attributes {
            return false;
        }
        let removed: Vec<String> = self
            .attributes
            .keys()
            .filter(|key| !attributes.contains_key(*key))
            .cloned()
            .collect();
        for key in removed {
            self.attributes.remove(&key);
            self.events.emit(EventKind::ChangeAttribute {
                record: None,
                attribute: key,
                value: Value::Null,
            });
        }
        for (key, value) in attributes {
            self.write(key, value);
        }
        self.events.emit(EventKind::Change { record: None });
        true
    }

    pub fn unset(&mut self, key: &str) -> bool {
        if self.attributes.remove(key).is_none() {
            return false;
        }
        self.events.emit(EventKind::ChangeAttribute {
            record: None,
            attribute: key.to_string(),
            value: Value::Null,
        });
        self.events.emit(EventKind::Change { record: None });
        true
    }

    pub fn take_events(&mut self) -> Vec<EventKind> {
        self.events.take()
    }

    pub async fn fetch<T: Transport>(
        &mut self,
        sync: &SyncAdapter<T>,
        options: &SyncOptions,
    ) -> Result<(), SyncError> {
        let attributes: Attributes = sync.sync(SyncIntent::Read, self, options).await?;
        self.set_many(attributes);
        Ok(())
    }

    fn write(&mut self, key: String, value: Value) -> bool {
        if self.attributes.get(&key) == Some(&value) {
            return false;
        }
        self.events.emit(EventKind::ChangeAttribute {
            record: None,
            attribute: key.clone(),
            value: value.clone(),
        });
        self.attributes.insert(key, value);
        true
    }
}

impl SyncResource for Model {
    fn url(&self) -> String {
        self.url.clone()
    }

    fn emit(&mut self, event: EventKind) {
        self.events.emit(event);
    }
}
