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

pub const EXTRA: &str = "extra";
pub const PRICE: &str = "price";
pub const OWNER_KEY: &str = "ownerKey";
pub const OWNER_USER_NAME: &str = "ownerUserName";
pub const OWNER_DISPLAY_NAME: &str = "ownerDisplayName";
pub const SCRIPT_NAME: &str = "scriptName";
pub const PAYOUT_COUNT: &str = "payoutCount";
pub const ITEM_COUNT: &str = "itemCount";
pub const INVENTORY_COUNT: &str = "inventoryCount";

/// Price field of the flat extra model.
pub const BUTTON_PRICE: &str = "btn_price";

// Reported by the machine on every read; never written back.
const RUNTIME_FIELDS: [&str; 7] = [
    OWNER_KEY,
    OWNER_USER_NAME,
    OWNER_DISPLAY_NAME,
    SCRIPT_NAME,
    PAYOUT_COUNT,
    ITEM_COUNT,
    INVENTORY_COUNT,
];

/// Identity of the machine: owner, script, price, record counts and the
/// nested `extra` blob.
#[derive(Debug, Clone)]
pub struct Info {
    model: Model,
}

impl Info {
    pub fn new() -> Self {
        Self {
            model: Model::new("info"),
        }
    }

    pub fn with_attributes(attributes: Attributes) -> Self {
        Self {
            model: Model::with_attributes("info", attributes),
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

    /// The nested blob, or an empty set when it is missing or not an object.
    pub fn extra(&self) -> Attributes {
        match self.model.get(EXTRA) {
            Some(Value::Object(extra)) => extra.clone(),
            _ => Attributes::new(),
        }
    }

    pub fn owner_key(&self) -> Option<&str> {
        self.model.get_str(OWNER_KEY)
    }

    pub fn owner_user_name(&self) -> Option<&str> {
        self.model.get_str(OWNER_USER_NAME)
    }

    pub fn owner_display_name(&self) -> Option<&str> {
        self.model.get_str(OWNER_DISPLAY_NAME)
    }

    pub fn script_name(&self) -> Option<&str> {
        self.model.get_str(SCRIPT_NAME)
    }

    pub fn price(&self) -> i64 {
        self.model.get_i64(PRICE).unwrap_or(0)
    }

    /// Non-negative record count published under `attribute`.
    pub fn count(&self, attribute: &str) -> Option<usize> {
        self.model
            .get_i64(attribute)
            .and_then(|count| usize::try_from(count).ok())
    }

    pub async fn fetch<T: Transport>(
        &mut self,
        sync: &SyncAdapter<T>,
        options: &SyncOptions,
    ) -> Result<(), SyncError> {
        self.model.fetch(sync, options).await
    }
}

impl Default for Info {
    fn default() -> Self {
        Self::new()
    }
}

impl Submodel for Info {
    fn kind(&self) -> SubmodelKind {
        SubmodelKind::Info
    }

    fn to_live_json(&self) -> Value {
        Value::Object(self.model.attributes().clone())
    }

    fn to_notecard_json(&self) -> Option<Value> {
        let persisted = self
            .model
            .attributes()
            .iter()
            .filter(|(key, _)| !RUNTIME_FIELDS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Some(Value::Object(persisted))
    }

    fn from_notecard_json(&mut self, section: &Value) -> Result<(), NotecardError> {
        let attributes: Attributes = serde_json::from_value(section.clone())
            .map_err(|source| NotecardError::Malformed {
                section: "info",
                source,
            })?;
        self.model.set_many(attributes);
        Ok(())
    }

    fn take_events(&mut self) -> Vec<EventKind> {
        self.model.take_events()
    }
}

/// Flat mirror of `info.extra`; edited field by field.
#[derive(Debug, Clone)]
pub struct InfoExtra {
    model: Model,
}

impl InfoExtra {
    pub fn new() -> Self {
        Self {
            model: Model::new("info_extra"),
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

    pub fn replace(&mut self, attributes: Attributes) -> bool {
        self.model.replace(attributes)
    }

    pub fn button_price(&self) -> Option<i64> {
        self.model.get_i64(BUTTON_PRICE)
    }

    pub async fn fetch<T: Transport>(
        &mut self,
        sync: &SyncAdapter<T>,
        options: &SyncOptions,
    ) -> Result<(), SyncError> {
        self.model.fetch(sync, options).await
    }
}

impl Default for InfoExtra {
    fn default() -> Self {
        Self::new()
    }
}

impl Submodel for InfoExtra {
    fn kind(&self) -> SubmodelKind {
        SubmodelKind::InfoExtra
    }

    fn to_live_json(&self) -> Value {
        Value::Object(self.model.attributes().clone())
    }

    fn take_events(&mut self) -> Vec<EventKind> {
        self.model.take_events()
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use serde_json::json;

    fn info(value: Value) -> Info {
        Info::with_attributes(serde_json::from_value(value).unwrap())
    }

    #[test]
    fn to_notecard_json__leaves_out_runtime_fields() {
        let info = info(json!({
            "ownerKey": "k",
            "scriptName": "gacha",
            "itemCount": 3,
            "price": 25,
            "extra": { "btn_price": 25 }
        }));

        assert_eq!(
            info.to_notecard_json(),
            Some(json!({ "price": 25, "extra": { "btn_price": 25 } }))
        );
        assert_eq!(info.to_live_json()["ownerKey"], json!("k"));
    }

    #[test]
    fn count__rejects_negative_and_missing_values() {
        let info = info(json!({ "itemCount": 4, "payoutCount": -1 }));

        assert_eq!(info.count(ITEM_COUNT), Some(4));
        assert_eq!(info.count(PAYOUT_COUNT), None);
        assert_eq!(info.count(INVENTORY_COUNT), None);
    }

    #[test]
    fn extra__non_object_reads_as_empty() {
        let info = info(json!({ "extra": "oops" }));

        assert!(info.extra().is_empty());
    }

    #[test]
    fn from_notecard_json__rejects_non_objects() {
        let mut info = Info::new();

        let err = info.from_notecard_json(&json!([1, 2])).unwrap_err();

        assert!(matches!(err, NotecardError::Malformed { section: "info", .. }));
    }
}
