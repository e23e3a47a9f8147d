use crate::{
    collection::{
        Collection,
        Record,
    },
    events::EventKind,
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
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutLine {
    pub agent_key: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub amount: i64,
}

impl PayoutLine {
    pub fn new(agent_key: impl Into<String>, amount: i64) -> Self {
        Self {
            agent_key: agent_key.into(),
            display_name: String::new(),
            user_name: String::new(),
            amount,
        }
    }

    /// Negative amounts are allowed in the ledger but flagged.
    pub fn has_error(&self) -> bool {
        self.amount < 0
    }
}

impl Record for PayoutLine {
    fn id(&self) -> String {
        self.agent_key.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotecardPayout {
    agent_key: String,
    amount: i64,
}

/// What an editor may do with one ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowCapabilities {
    pub is_owner_row: bool,
    pub amount_editable: bool,
    pub removable: bool,
    pub show_admin_fields: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("'{raw}' is not a whole number")]
    NotANumber { raw: String },
    #[error("payout amounts cannot be negative (got {amount})")]
    NegativeAmount { amount: i64 },
    #[error("the owner's payout is derived from the price and cannot be edited")]
    OwnerLineLocked,
    #[error("no payout line for agent {agent_key}")]
    UnknownAgent { agent_key: String },
}

/// Payout splits. The owner's line is never set directly: it always holds
/// whatever is left of the price after every other line.
#[derive(Debug, Clone)]
pub struct PayoutLedger {
    lines: Collection<PayoutLine>,
}

impl PayoutLedger {
    pub fn new() -> Self {
        Self {
            lines: Collection::new("payouts"),
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PayoutLine> {
        self.lines.iter()
    }

    pub fn get(&self, agent_key: &str) -> Option<&PayoutLine> {
        self.lines.get(agent_key)
    }

    pub fn add(&mut self, line: PayoutLine) -> bool {
        self.lines.add(line)
    }

    pub fn remove(&mut self, agent_key: &str) -> Option<PayoutLine> {
        self.lines.remove(agent_key)
    }

    pub fn reset(&mut self, lines: Vec<PayoutLine>) {
        self.lines.reset(lines)
    }

    pub fn set_amount(&mut self, agent_key: &str, amount: i64) -> bool {
        self.lines.modify(agent_key, |line| line.amount = amount)
    }

    /// Sum of every line, saturating at the bounds of `i64`.
    pub fn total(&self) -> i64 {
        sum_saturating(self.lines.iter())
    }

    /// Sets the owner's line to the price minus every other line. No owner
    /// line, no change.
    pub fn recalculate_owner(&mut self, owner_key: &str, price: i64) -> bool {
        if !self.lines.contains(owner_key) {
            return false;
        }
        let others = sum_saturating(self.lines.iter().filter(|line| line.agent_key != owner_key));
        self.set_amount(owner_key, price.saturating_sub(others))
    }

    pub fn is_valid(&self) -> bool {
        self.lines.iter().all(|line| !line.has_error())
    }

    pub fn row_capabilities(
        &self,
        agent_key: &str,
        owner_key: Option<&str>,
        is_admin: bool,
    ) -> RowCapabilities {
        let is_owner_row = owner_key == Some(agent_key);
        RowCapabilities {
            is_owner_row,
            amount_editable: !is_owner_row,
            removable: !is_owner_row,
            show_admin_fields: is_admin,
        }
    }

    /// Applies an amount typed by the editor. Input that is not a number or
    /// is negative leaves the line untouched.
    pub fn set_amount_input(
        &mut self,
        agent_key: &str,
        raw: &str,
        owner_key: Option<&str>,
    ) -> Result<i64, LedgerError> {
        if owner_key == Some(agent_key) {
            return Err(LedgerError::OwnerLineLocked);
        }
        if !self.lines.contains(agent_key) {
            return Err(LedgerError::UnknownAgent {
                agent_key: agent_key.to_string(),
            });
        }
        let amount = parse_leading_integer(raw).ok_or_else(|| LedgerError::NotANumber {
            raw: raw.to_string(),
        })?;
        if amount < 0 {
            return Err(LedgerError::NegativeAmount { amount });
        }
        self.set_amount(agent_key, amount);
        Ok(amount)
    }

    pub fn delete_row(
        &mut self,
        agent_key: &str,
        owner_key: Option<&str>,
    ) -> Result<PayoutLine, LedgerError> {
        if owner_key == Some(agent_key) {
            return Err(LedgerError::OwnerLineLocked);
        }
        self.lines
            .remove(agent_key)
            .ok_or_else(|| LedgerError::UnknownAgent {
                agent_key: agent_key.to_string(),
            })
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
        self.lines.fetch(sync, options, expected, on_progress).await
    }
}

impl Default for PayoutLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl Submodel for PayoutLedger {
    fn kind(&self) -> SubmodelKind {
        SubmodelKind::Payouts
    }

    fn to_live_json(&self) -> Value {
        self.lines.to_json()
    }

    fn to_notecard_json(&self) -> Option<Value> {
        let persisted = self
            .lines
            .iter()
            .map(|line| NotecardPayout {
                agent_key: line.agent_key.clone(),
                amount: line.amount,
            })
            .collect::<Vec<_>>();
        serde_json::to_value(persisted).ok()
    }

    /// Names are display-only; they survive for agents already in the ledger.
    fn from_notecard_json(&mut self, section: &Value) -> Result<(), NotecardError> {
        let persisted: Vec<NotecardPayout> = serde_json::from_value(section.clone())
            .map_err(|source| NotecardError::Malformed {
                section: "payouts",
                source,
            })?;
        let lines = persisted
            .into_iter()
            .map(|entry| match self.lines.get(&entry.agent_key) {
                Some(known) => PayoutLine {
                    amount: entry.amount,
                    ..known.clone()
                },
                None => PayoutLine::new(entry.agent_key, entry.amount),
            })
            .collect();
        self.lines.reset(lines);
        Ok(())
    }

    fn take_events(&mut self) -> Vec<EventKind> {
        self.lines.take_events()
    }
}

fn sum_saturating<'a>(lines: impl Iterator<Item = &'a PayoutLine>) -> i64 {
    lines.fold(0i64, |total, line| total.saturating_add(line.amount))
}

/// Leading optional sign and digits, ignoring surrounding whitespace and any
/// trailing text ("12 L$" reads as 12).
fn parse_leading_integer(raw: &str) -> Option<i64> {
    let trimmed = raw.trim_start();
    let sign_len = usize::from(trimmed.starts_with(['-', '+']));
    let digits = trimmed[sign_len..]
        .chars()
        .take_while(char::is_ascii_digit)
        .count();
    if digits == 0 {
        return None;
    }
    trimmed[..sign_len + digits].parse().ok()
}
