use crate::{
    events::EventKind,
    model::{
        Attributes,
        Model,
    },
    submodel::{
        NotecardError,
        Submodel,
        SubmodelKind,
    },
    sync::{
        SyncAdapter,
        SyncError,
        SyncOptions,
        Transport,
    },
};
use serde_json::Value;

/// Monetary configuration of the machine. Only readable with the admin key.
#[derive(Debug, Clone)]
pub struct MachineConfig {
    model: Model,
}

impl MachineConfig {
    pub fn new() -> Self {
        Self {
            model: Model::new("config"),
        }
    }

    pub fn attributes(&self) -> &Attributes {
        self.model.attributes()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.model.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) -> bool {
        self.model.set(key, value)
    }

    pub async fn fetch<T: Transport>(
        &mut self,
        sync: &SyncAdapter<T>,
        options: &SyncOptions,
    ) -> Result<(), SyncError> {
        self.model.fetch(sync, options).await
    }
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl Submodel for MachineConfig {
    fn kind(&self) -> SubmodelKind {
        SubmodelKind::Config
    }

    fn to_live_json(&self) -> Value {
        Value::Object(self.model.attributes().clone())
    }

    fn to_notecard_json(&self) -> Option<Value> {
        Some(self.to_live_json())
    }

    fn from_notecard_json(&mut self, section: &Value) -> Result<(), NotecardError> {
        let attributes: Attributes = serde_json::from_value(section.clone())
            .map_err(|source| NotecardError::Malformed {
                section: "config",
                source,
            })?;
        self.model.set_many(attributes);
        Ok(())
    }

    fn take_events(&mut self) -> Vec<EventKind> {
        self.model.take_events()
    }
}
