use crate::{
    collection::{
        Collection,
        Record,
    },
    events::EventKind,
    inventory::Inventory,
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
use serde::{
    Deserialize,
    Serialize,
};
use serde_json::Value;

pub const DEFAULT_RARITY: f64 = 1.0;
/// `limit` value meaning the item never sells out.
pub const UNLIMITED: i64 = -1;

fn default_rarity() -> f64 {
    DEFAULT_RARITY
}

fn unlimited() -> i64 {
    UNLIMITED
}

/// One prize in the catalog, keyed by the inventory item it hands out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub inventory: String,
    #[serde(default = "default_rarity")]
    pub rarity: f64,
    #[serde(default = "unlimited")]
    pub limit: i64,
    #[serde(default)]
    pub bought: u64,
}

impl Item {
    pub fn new(inventory: impl Into<String>) -> Self {
        Self {
            inventory: inventory.into(),
            rarity: DEFAULT_RARITY,
            limit: UNLIMITED,
            bought: 0,
        }
    }

    pub fn is_sold_out(&self) -> bool {
        self.limit != UNLIMITED && self.bought >= self.limit.max(0) as u64
    }
}

impl Record for Item {
    fn id(&self) -> String {
        self.inventory.clone()
    }
}

#[derive(Debug, Clone)]
pub struct Items {
    catalog: Collection<Item>,
}

impl Items {
    pub fn new() -> Self {
        Self {
            catalog: Collection::new("items"),
        }
    }

    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.catalog.iter()
    }

    pub fn get(&self, inventory: &str) -> Option<&Item> {
        self.catalog.get(inventory)
    }

    pub fn add(&mut self, item: Item) -> bool {
        self.catalog.add(item)
    }

    pub fn remove(&mut self, inventory: &str) -> Option<Item> {
        self.catalog.remove(inventory)
    }

    pub fn modify(&mut self, inventory: &str, edit: impl FnOnce(&mut Item)) -> bool {
        self.catalog.modify(inventory, edit)
    }

    /// Adds a default entry for every inventory item the catalog does not
    /// know yet, skipping the machine's own script. Returns how many were
    /// added.
    pub fn populate(&mut self, inventory: &Inventory, script_name: Option<&str>) -> usize {
        let mut added = 0;
        for entry in inventory.iter() {
            if Some(entry.name.as_str()) == script_name {
                continue;
            }
            if self.catalog.add(Item::new(entry.name.clone())) {
                added += 1;
            }
        }
        if added > 0 {
            tracing::debug!("added {added} catalog entries from inventory");
        }
        added
    }

    pub async fn fetch<T, F>(
        &mut self,
        sync: &SyncAdapter<T>,
        options: &SyncOptions,
        expected: Option<usize>,
        on_progress: F,
    ) -> Result<(), SyncError>
    where
        T: Transport,
        F: FnMut(usize),
    {
        self.catalog.fetch(sync, options, expected, on_progress).await
    }
}

impl Default for Items {
    fn default() -> Self {
        Self::new()
    }
}

impl Submodel for Items {
    fn kind(&self) -> SubmodelKind {
        SubmodelKind::Items
    }

    fn to_live_json(&self) -> Value {
        self.catalog.to_json()
    }

    fn to_notecard_json(&self) -> Option<Value> {
        Some(self.catalog.to_json())
    }

    fn from_notecard_json(&mut self, section: &Value) -> Result<(), NotecardError> {
        let items: Vec<Item> = serde_json::from_value(section.clone()).map_err(|source| {
            NotecardError::Malformed {
                section: "items",
                source,
            }
        })?;
        self.catalog.reset(items);
        Ok(())
    }

    fn take_events(&mut self) -> Vec<EventKind> {
        self.catalog.take_events()
    }
}
