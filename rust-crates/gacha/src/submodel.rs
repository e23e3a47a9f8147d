use crate::events::EventKind;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmodelKind {
    Info,
    InfoExtra,
    Config,
    Payouts,
    Items,
    Invs,
}

impl SubmodelKind {
    pub const ALL: [SubmodelKind; 6] = [
        SubmodelKind::Info,
        SubmodelKind::InfoExtra,
        SubmodelKind::Config,
        SubmodelKind::Payouts,
        SubmodelKind::Items,
        SubmodelKind::Invs,
    ];

    /// Attribute name of the slot on the aggregate.
    pub fn name(self) -> &'static str {
        match self {
            SubmodelKind::Info => "info",
            SubmodelKind::InfoExtra => "info_extra",
            SubmodelKind::Config => "config",
            SubmodelKind::Payouts => "payouts",
            SubmodelKind::Items => "items",
            SubmodelKind::Invs => "invs",
        }
    }

    pub fn progress_attribute(self) -> String {
        format!("{}ProgressPercentage", self.name())
    }
}

impl fmt::Display for SubmodelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Error)]
pub enum NotecardError {
    #[error("notecard section '{section}' is malformed: {source}")]
    Malformed {
        section: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("notecard must be a JSON object")]
    NotAnObject,
}

/// What the aggregate needs from every sub-resource slot, independent of
/// how the slot is fetched.
pub trait Submodel {
    fn kind(&self) -> SubmodelKind;

    fn to_live_json(&self) -> Value;

    /// `None` when the sub-resource has no persisted (notecard) shape.
    fn to_notecard_json(&self) -> Option<Value> {
        None
    }

    /// Loads a notecard section. Sub-resources without a notecard shape
    /// ignore it.
    fn from_notecard_json(&mut self, _section: &Value) -> Result<(), NotecardError> {
        Ok(())
    }

    fn take_events(&mut self) -> Vec<EventKind>;
}
