use crate::{
    events::{
        Dispatcher,
        EventKind,
        Origin,
    },
    registry::Registry,
    submodel::SubmodelKind,
};
use serde_json::{
    Value,
    json,
};

pub const PROGRESS_PERCENTAGE: &str = "progressPercentage";
pub const OVERRIDE_PROGRESS: &str = "overrideProgress";

/// Per-entry and total fetch progress of one aggregate. Every change is
/// published on the aggregate's event stream as it happens, and the total is
/// recomputed after every change.
#[derive(Debug, Clone)]
pub struct ProgressBoard {
    entries: Vec<(SubmodelKind, f64, f64)>,
    override_progress: Option<f64>,
    total: f64,
    dispatcher: Dispatcher,
}

impl ProgressBoard {
    pub fn new(registry: &Registry, dispatcher: Dispatcher) -> Self {
        Self {
            entries: registry
                .iter()
                .map(|descriptor| (descriptor.kind, descriptor.weight, 0.0))
                .collect(),
            override_progress: None,
            total: 0.0,
            dispatcher,
        }
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn entry(&self, kind: SubmodelKind) -> Option<f64> {
        self.entries
            .iter()
            .find(|(entry, _, _)| *entry == kind)
            .map(|(_, _, percentage)| *percentage)
    }

    pub fn entries(&self) -> impl Iterator<Item = (SubmodelKind, f64)> + '_ {
        self.entries
            .iter()
            .map(|(kind, _, percentage)| (*kind, *percentage))
    }

    pub fn override_progress(&self) -> Option<f64> {
        self.override_progress
    }

    pub fn set_entry(&mut self, kind: SubmodelKind, percentage: f64) {
        let percentage = percentage.clamp(0.0, 100.0);
        let Some(entry) = self.entries.iter_mut().find(|(entry, _, _)| *entry == kind)
        else {
            return;
        };
        if entry.2 == percentage {
            return;
        }
        entry.2 = percentage;
        self.publish(kind.progress_attribute(), json!(percentage));
        self.update();
    }

    /// `Some` pins the total to the given value until cleared with `None`.
    pub fn set_override(&mut self, value: Option<f64>) {
        if self.override_progress == value {
            return;
        }
        self.override_progress = value;
        self.publish(OVERRIDE_PROGRESS.to_string(), json!(value));
        self.update();
    }

    /// Zeroes every entry and the total ahead of a fetch.
    pub fn reset(&mut self) {
        let zeroed: Vec<SubmodelKind> = self
            .entries
            .iter_mut()
            .filter(|(_, _, percentage)| *percentage != 0.0)
            .map(|entry| {
                entry.2 = 0.0;
                entry.0
            })
            .collect();
        for kind in zeroed {
            self.publish(kind.progress_attribute(), json!(0.0));
        }
        self.set_total(0.0);
        self.update();
    }

    pub fn complete(&mut self) {
        self.set_total(100.0);
        self.update();
    }

    pub fn update(&mut self) {
        let total = self.override_progress.unwrap_or_else(|| self.weighted());
        self.set_total(total);
    }

    fn weighted(&self) -> f64 {
        let total_weight: f64 = self.entries.iter().map(|(_, weight, _)| weight).sum();
        if total_weight > 0.0 {
            let done: f64 = self
                .entries
                .iter()
                .map(|(_, weight, percentage)| percentage / 100.0 * weight)
                .sum();
            return done / total_weight * 100.0;
        }
        if self.entries.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.entries.iter().map(|(_, _, percentage)| percentage).sum();
        sum / self.entries.len() as f64
    }

    fn set_total(&mut self, total: f64) {
        if self.total == total {
            return;
        }
        self.total = total;
        self.publish(PROGRESS_PERCENTAGE.to_string(), json!(total));
    }

    fn publish(&self, attribute: String, value: Value) {
        self.dispatcher.publish(
            Origin::Gacha,
            EventKind::ChangeAttribute {
                record: None,
                attribute,
                value,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::registry::SubmodelDescriptor;
    use proptest::prelude::*;

    fn board(weights: &[(SubmodelKind, f64)]) -> ProgressBoard {
        let registry = Registry::new(
            weights
                .iter()
                .map(|(kind, weight)| SubmodelDescriptor::new(*kind, *weight))
                .collect(),
        )
        .unwrap();
        ProgressBoard::new(&registry, Dispatcher::new())
    }

    #[test]
    fn update__normalizes_weights_that_do_not_sum_to_a_hundred() {
        // given
        let mut board = board(&[
            (SubmodelKind::Info, 10.0),
            (SubmodelKind::Config, 10.0),
            (SubmodelKind::Items, 30.0),
        ]);

        // when
        board.set_entry(SubmodelKind::Info, 100.0);
        board.set_entry(SubmodelKind::Config, 100.0);

        // then
        assert_eq!(board.total(), 40.0);
        board.set_entry(SubmodelKind::Items, 100.0);
        assert_eq!(board.total(), 100.0);
    }

    #[test]
    fn set_override__wins_until_cleared() {
        let mut board = board(&[(SubmodelKind::Info, 10.0)]);
        board.set_entry(SubmodelKind::Info, 50.0);

        board.set_override(Some(12.5));
        assert_eq!(board.total(), 12.5);
        board.set_entry(SubmodelKind::Info, 100.0);
        assert_eq!(board.total(), 12.5);

        board.set_override(None);
        assert_eq!(board.total(), 100.0);
    }

    #[test]
    fn set_entry__publishes_entry_and_total_changes() {
        // given
        let mut board = board(&[(SubmodelKind::Items, 30.0)]);
        let mut events = board.dispatcher.subscribe();

        // when
        board.set_entry(SubmodelKind::Items, 250.0);

        // then
        let first = events.try_recv().unwrap();
        let second = events.try_recv().unwrap();
        assert_eq!(first.name(), "change:itemsProgressPercentage");
        assert_eq!(second.name(), "change:progressPercentage");
        assert_eq!(board.entry(SubmodelKind::Items), Some(100.0));
    }

    #[test]
    fn update__zero_total_weight_averages_entries() {
        let mut board = board(&[(SubmodelKind::InfoExtra, 0.0), (SubmodelKind::Info, 0.0)]);

        board.set_entry(SubmodelKind::Info, 100.0);

        assert_eq!(board.total(), 50.0);
    }

    proptest! {
        #[test]
        fn update__every_entry_complete_means_exactly_one_hundred(
            weights in proptest::collection::vec(0.0f64..500.0, 1..6),
        ) {
            let kinds = SubmodelKind::ALL;
            let pairs: Vec<(SubmodelKind, f64)> =
                kinds.iter().copied().zip(weights.iter().copied()).collect();
            let mut board = board(&pairs);

            for (kind, _) in &pairs {
                board.set_entry(*kind, 100.0);
            }

            prop_assert_eq!(board.total(), 100.0);
        }
    }
}
