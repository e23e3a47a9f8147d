use crate::{
    info::{
        INVENTORY_COUNT,
        ITEM_COUNT,
        Info,
        PAYOUT_COUNT,
    },
    submodel::SubmodelKind,
};
use thiserror::Error;

/// Turns mid-fetch record counts into an entry percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressReporter {
    /// `fetched / (expected + 1)`, where `expected` is published by info
    /// under `count_attribute`. The extra slot is filled by completion.
    RecordCount { count_attribute: &'static str },
}

impl ProgressReporter {
    pub fn expected(&self, info: &Info) -> Option<usize> {
        match self {
            ProgressReporter::RecordCount { count_attribute } => info.count(count_attribute),
        }
    }

    pub fn percentage(&self, fetched: usize, expected: usize) -> f64 {
        match self {
            ProgressReporter::RecordCount { .. } => {
                fetched as f64 / (expected as f64 + 1.0) * 100.0
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubmodelDescriptor {
    pub kind: SubmodelKind,
    /// Share of the aggregate progress, relative to the sum of all weights.
    pub weight: f64,
    pub admin_only: bool,
    pub fetch_enabled: bool,
    pub progress: Option<ProgressReporter>,
}

impl SubmodelDescriptor {
    pub const fn new(kind: SubmodelKind, weight: f64) -> Self {
        Self {
            kind,
            weight,
            admin_only: false,
            fetch_enabled: true,
            progress: None,
        }
    }

    pub const fn admin_only(mut self) -> Self {
        self.admin_only = true;
        self
    }

    pub const fn without_fetch(mut self) -> Self {
        self.fetch_enabled = false;
        self
    }

    pub const fn counting(mut self, count_attribute: &'static str) -> Self {
        self.progress = Some(ProgressReporter::RecordCount { count_attribute });
        self
    }
}

pub const STANDARD_DESCRIPTORS: [SubmodelDescriptor; 6] = [
    SubmodelDescriptor::new(SubmodelKind::Info, 10.0),
    SubmodelDescriptor::new(SubmodelKind::InfoExtra, 0.0).without_fetch(),
    SubmodelDescriptor::new(SubmodelKind::Config, 10.0).admin_only(),
    SubmodelDescriptor::new(SubmodelKind::Payouts, 20.0)
        .admin_only()
        .counting(PAYOUT_COUNT),
    SubmodelDescriptor::new(SubmodelKind::Items, 30.0).counting(ITEM_COUNT),
    SubmodelDescriptor::new(SubmodelKind::Invs, 30.0)
        .admin_only()
        .counting(INVENTORY_COUNT),
];

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("sub-resource '{kind}' is registered more than once")]
    Duplicate { kind: SubmodelKind },
    #[error("sub-resource '{kind}' has invalid weight {weight}")]
    InvalidWeight { kind: SubmodelKind, weight: f64 },
}

/// Sub-resources of an aggregate, in fetch order.
#[derive(Debug, Clone, PartialEq)]
pub struct Registry {
    descriptors: Vec<SubmodelDescriptor>,
}

impl Registry {
    pub fn new(descriptors: Vec<SubmodelDescriptor>) -> Result<Self, RegistryError> {
        for (index, descriptor) in descriptors.iter().enumerate() {
            if !descriptor.weight.is_finite() || descriptor.weight < 0.0 {
                return Err(RegistryError::InvalidWeight {
                    kind: descriptor.kind,
                    weight: descriptor.weight,
                });
            }
            if descriptors[..index]
                .iter()
                .any(|earlier| earlier.kind == descriptor.kind)
            {
                return Err(RegistryError::Duplicate {
                    kind: descriptor.kind,
                });
            }
        }
        Ok(Self { descriptors })
    }

    pub fn standard() -> Self {
        Self {
            descriptors: STANDARD_DESCRIPTORS.to_vec(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &SubmodelDescriptor> {
        self.descriptors.iter()
    }

    pub fn kinds(&self) -> impl Iterator<Item = SubmodelKind> + '_ {
        self.descriptors.iter().map(|descriptor| descriptor.kind)
    }

    pub fn get(&self, kind: SubmodelKind) -> Option<&SubmodelDescriptor> {
        self.descriptors
            .iter()
            .find(|descriptor| descriptor.kind == kind)
    }

    pub fn contains(&self, kind: SubmodelKind) -> bool {
        self.get(kind).is_some()
    }

    pub fn total_weight(&self) -> f64 {
        self.descriptors
            .iter()
            .map(|descriptor| descriptor.weight)
            .sum()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::standard()
    }
}
