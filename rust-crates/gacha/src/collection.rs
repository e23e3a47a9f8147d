use crate::{
    events::{
        Emitter,
        EventKind,
    },
    model::Attributes,
    sync::{
        Method,
        SyncAdapter,
        SyncError,
        SyncIntent,
        SyncOptions,
        SyncResource,
        Transport,
    },
};
use itertools::Itertools;
use serde::{
    Serialize,
    de::DeserializeOwned,
};
use serde_json::Value;

pub trait Record: Clone + Serialize + DeserializeOwned {
    /// Key used by `get`, `remove` and `modify`. Must stay stable for the
    /// lifetime of the record.
    fn id(&self) -> String;
}

/// Ordered list of records, unique by id.
#[derive(Debug, Clone)]
pub struct Collection<R> {
    url: String,
    records: Vec<R>,
    events: Emitter,
}

impl<R: Record> Collection<R> {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            records: Vec::new(),
            events: Emitter::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &R> {
        self.records.iter()
    }

    pub fn get(&self, id: &str) -> Option<&R> {
        self.records.iter().find(|record| record.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Appends `record` unless one with the same id is already present.
    pub fn add(&mut self, record: R) -> bool {
        let id = record.id();
        if self.contains(&id) {
            return false;
        }
        self.records.push(record);
        self.events.emit(EventKind::Add { record: id });
        true
    }

    pub fn remove(&mut self, id: &str) -> Option<R> {
        let index = self.records.iter().position(|record| record.id() == id)?;
        let removed = self.records.remove(index);
        self.events.emit(EventKind::Remove {
            record: id.to_string(),
        });
        Some(removed)
    }

    /// Replaces every record at once. Later duplicates of an id are dropped.
    pub fn reset(&mut self, records: Vec<R>) {
        self.records = records.into_iter().unique_by(Record::id).collect();
        self.events.emit(EventKind::Reset);
    }

    /// Edits one record in place and reports each field that changed.
    pub fn modify(&mut self, id: &str, edit: impl FnOnce(&mut R)) -> bool {
        let Some(record) = self.records.iter_mut().find(|record| record.id() == id)
        else {
            return false;
        };
        let before = fields(record);
        edit(record);
        let after = fields(record);
        if before == after {
            return false;
        }
        let changed_keys = before
            .keys()
            .chain(after.keys())
            .unique()
            .filter(|key| before.get(*key) != after.get(*key))
            .cloned()
            .collect::<Vec<_>>();
        for attribute in changed_keys {
            let value = after.get(&attribute).cloned().unwrap_or(Value::Null);
            self.events.emit(EventKind::ChangeAttribute {
                record: Some(id.to_string()),
                attribute,
                value,
            });
        }
        self.events.emit(EventKind::Change {
            record: Some(id.to_string()),
        });
        true
    }

    pub fn to_json(&self) -> Value {
        Value::Array(
            self.records
                .iter()
                .map(|record| Value::Object(fields(record)))
                .collect(),
        )
    }

    pub fn take_events(&mut self) -> Vec<EventKind> {
        self.events.take()
    }

    /// Loads the collection from the endpoint.
    ///
    /// With a known `expected` count the records are requested one at a time
    /// (`<url>/<index>`) and `on_progress` sees the running record count after
    /// each one; otherwise the whole list comes back in a single response.
    pub async fn fetch<T, F>(
        &mut self,
        sync: &SyncAdapter<T>,
        options: &SyncOptions,
        expected: Option<usize>,
        mut on_progress: F,
    ) -> Result<(), SyncError>
    where
        T: Transport,
        F: FnMut(usize),
    {
        match expected {
            Some(expected) => {
                self.reset(Vec::new());
                for index in 0..expected {
                    let mut cursor = RecordCursor {
                        collection: self,
                        index,
                    };
                    let record: R = sync.sync(SyncIntent::Read, &mut cursor, options).await?;
                    self.add(record);
                    on_progress(self.len());
                }
            }
            None => {
                let records: Vec<R> = sync.sync(SyncIntent::Read, self, options).await?;
                self.reset(records);
                on_progress(self.len());
            }
        }
        Ok(())
    }
}

impl<R: Record> SyncResource for Collection<R> {
    fn url(&self) -> String {
        self.url.clone()
    }

    fn to_post_json(&self, _: &SyncOptions, _: SyncIntent, _: Method) -> Value {
        self.to_json()
    }

    fn emit(&mut self, event: EventKind) {
        self.events.emit(event);
    }
}

/// One record slot of a collection, addressed by index during a paged fetch.
struct RecordCursor<'a, R> {
    collection: &'a mut Collection<R>,
    index: usize,
}

impl<R> SyncResource for RecordCursor<'_, R> {
    fn url(&self) -> String {
        format!("{}/{}", self.collection.url, self.index)
    }

    fn emit(&mut self, event: EventKind) {
        self.collection.events.emit(event);
    }
}

fn fields<R: Serialize>(record: &R) -> Attributes {
    match serde_json::to_value(record) {
        Ok(Value::Object(fields)) => fields,
        _ => Attributes::new(),
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        session::Session,
        sync::testing::FakeTransport,
    };
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Row {
        key: String,
        count: i64,
    }

    impl Record for Row {
        fn id(&self) -> String {
            self.key.clone()
        }
    }

    fn row(key: &str, count: i64) -> Row {
        Row {
            key: key.to_string(),
            count,
        }
    }

    fn event_names(collection: &mut Collection<Row>) -> Vec<String> {
        collection.take_events().iter().map(EventKind::name).collect()
    }

    #[test]
    fn add__ignores_duplicate_ids() {
        let mut rows = Collection::new("rows");

        assert!(rows.add(row("a", 1)));
        assert!(!rows.add(row("a", 2)));

        assert_eq!(rows.len(), 1);
        assert_eq!(rows.get("a"), Some(&row("a", 1)));
        assert_eq!(event_names(&mut rows), vec!["add"]);
    }

    #[test]
    fn modify__reports_changed_fields_scoped_to_the_record() {
        // given
        let mut rows = Collection::new("rows");
        rows.add(row("a", 1));
        rows.take_events();

        // when
        let changed = rows.modify("a", |row| row.count = 4);

        // then
        assert!(changed);
        let events = rows.take_events();
        assert_eq!(
            events[0],
            EventKind::ChangeAttribute {
                record: Some("a".to_string()),
                attribute: "count".to_string(),
                value: json!(4),
            }
        );
        assert_eq!(events[1].name(), "change");
    }

    #[test]
    fn modify__same_value_is_silent() {
        let mut rows = Collection::new("rows");
        rows.add(row("a", 1));
        rows.take_events();

        assert!(!rows.modify("a", |row| row.count = 1));
        assert!(!rows.modify("missing", |row| row.count = 1));
        assert!(rows.take_events().is_empty());
    }

    #[tokio::test]
    async fn fetch__pages_records_and_reports_running_count() {
        // given
        let transport = FakeTransport::new();
        let doc = "http://machine.test/";
        transport.respond(Method::Get, &format!("{doc}get/rows/0"), json!({ "key": "a", "count": 1 }));
        transport.respond(Method::Get, &format!("{doc}get/rows/1"), json!({ "key": "b", "count": 2 }));
        let sync = SyncAdapter::new(transport.clone(), Session::new(doc).unwrap());
        let mut rows: Collection<Row> = Collection::new("rows");
        let mut seen = Vec::new();

        // when
        rows.fetch(&sync, &SyncOptions::new(), Some(2), |count| seen.push(count))
            .await
            .unwrap();

        // then
        assert_eq!(seen, vec![1, 2]);
        assert_eq!(rows.iter().cloned().collect::<Vec<_>>(), vec![row("a", 1), row("b", 2)]);
        assert_eq!(
            transport.requested_urls(),
            vec![format!("{doc}get/rows/0"), format!("{doc}get/rows/1")]
        );
    }

    #[tokio::test]
    async fn fetch__without_expected_count_reads_whole_list() {
        let transport = FakeTransport::new();
        let doc = "http://machine.test/";
        transport.respond(
            Method::Get,
            &format!("{doc}get/rows"),
            json!([{ "key": "a", "count": 1 }, { "key": "a", "count": 9 }]),
        );
        let sync = SyncAdapter::new(transport, Session::new(doc).unwrap());
        let mut rows: Collection<Row> = Collection::new("rows");

        rows.fetch(&sync, &SyncOptions::new(), None, |_| {}).await.unwrap();

        assert_eq!(rows.iter().cloned().collect::<Vec<_>>(), vec![row("a", 1)]);
    }

    #[tokio::test]
    async fn fetch__stops_at_first_failed_record() {
        // given
        let transport = FakeTransport::new();
        let doc = "http://machine.test/";
        transport.respond(Method::Get, &format!("{doc}get/rows/0"), json!({ "key": "a", "count": 1 }));
        let sync = SyncAdapter::new(transport.clone(), Session::new(doc).unwrap());
        let mut rows: Collection<Row> = Collection::new("rows");

        // when
        let result = rows.fetch(&sync, &SyncOptions::new(), Some(3), |_| {}).await;

        // then
        assert!(matches!(result, Err(SyncError::NullResponse { .. })));
        assert_eq!(rows.len(), 1);
        assert_eq!(transport.requests().len(), 2);
        assert!(event_names(&mut rows).contains(&"error".to_string()));
    }
}
