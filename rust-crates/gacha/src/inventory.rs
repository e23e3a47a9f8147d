use crate::{
    collection::{
        Collection,
        Record,
    },
    events::EventKind,
    submodel::{
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

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: i64,
    #[serde(default)]
    pub creator: String,
}

impl InventoryEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: 0,
            creator: String::new(),
        }
    }
}

impl Record for InventoryEntry {
    fn id(&self) -> String {
        self.name.clone()
    }
}

/// Contents of the machine's inventory. Read-only, never persisted.
#[derive(Debug, Clone)]
pub struct Inventory {
    entries: Collection<InventoryEntry>,
}

impl Inventory {
    pub fn new() -> Self {
        Self {
            entries: Collection::new("invs"),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InventoryEntry> {
        self.entries.iter()
    }

    pub fn get(&self, name: &str) -> Option<&InventoryEntry> {
        self.entries.get(name)
    }

    pub fn add(&mut self, entry: InventoryEntry) -> bool {
        self.entries.add(entry)
    }

    pub fn reset(&mut self, entries: Vec<InventoryEntry>) {
        self.entries.reset(entries)
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
        self.entries.fetch(sync, options, expected, on_progress).await
    }
}

impl Default for Inventory {
    fn default() -> Self {
        Self::new()
    }
}

impl Submodel for Inventory {
    fn kind(&self) -> SubmodelKind {
        SubmodelKind::Invs
    }

    fn to_live_json(&self) -> Value {
        self.entries.to_json()
    }

    fn take_events(&mut self) -> Vec<EventKind> {
        self.entries.take_events()
    }
}
