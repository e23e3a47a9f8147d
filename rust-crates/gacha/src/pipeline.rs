use crate::{
    registry::{
        Registry,
        SubmodelDescriptor,
    },
    submodel::SubmodelKind,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    Running {
        at: SubmodelKind,
    },
    /// A sub-fetch failed; entries after `at` were never attempted.
    Stalled {
        at: SubmodelKind,
    },
    Complete,
}

/// Decides which registered sub-resources a fetch may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessGate {
    load_admin: bool,
    admin_key_held: bool,
}

impl AccessGate {
    pub fn new(load_admin: bool, admin_key_held: bool) -> Self {
        Self {
            load_admin,
            admin_key_held,
        }
    }

    pub fn skips(&self, descriptor: &SubmodelDescriptor) -> bool {
        (!self.load_admin && descriptor.admin_only)
            || (!self.admin_key_held && descriptor.admin_only)
            || !descriptor.fetch_enabled
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    Skip(SubmodelDescriptor),
    Fetch(SubmodelDescriptor),
    Complete,
}

/// Registration-ordered walk over the registry. The caller only asks for the
/// next step once the previous fetch has succeeded.
#[derive(Debug, Clone)]
pub struct FetchPipeline {
    queue: Vec<SubmodelDescriptor>,
    cursor: usize,
    gate: AccessGate,
}

impl FetchPipeline {
    pub fn new(registry: &Registry, gate: AccessGate) -> Self {
        Self {
            queue: registry.iter().copied().collect(),
            cursor: 0,
            gate,
        }
    }

    pub fn next_step(&mut self) -> Step {
        let Some(descriptor) = self.queue.get(self.cursor).copied() else {
            return Step::Complete;
        };
        self.cursor += 1;
        if self.gate.skips(&descriptor) {
            Step::Skip(descriptor)
        } else {
            Step::Fetch(descriptor)
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }
}
