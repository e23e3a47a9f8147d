use crate::{
    events::{
        Dispatcher,
        EventKind,
        GachaEvent,
        Origin,
    },
    info::{
        BUTTON_PRICE,
        EXTRA,
        Info,
        InfoExtra,
    },
    inventory::Inventory,
    items::Items,
    machine_config::MachineConfig,
    payouts::{
        LedgerError,
        PayoutLedger,
        PayoutLine,
        RowCapabilities,
    },
    pipeline::{
        AccessGate,
        FetchPipeline,
        PipelineState,
        Step,
    },
    progress::{
        OVERRIDE_PROGRESS,
        PROGRESS_PERCENTAGE,
        ProgressBoard,
    },
    registry::{
        Registry,
        SubmodelDescriptor,
    },
    submodel::{
        NotecardError,
        Submodel,
        SubmodelKind,
    },
    sync::{
        ReqwestTransport,
        SyncAdapter,
        RequestObserver,
        SyncError,
        SyncOptions,
        Transport,
    },
};
use serde_json::{
    Map,
    Value,
    json,
};
use tokio::sync::broadcast;


pub const IS_VALID: &str = "isValid";

const AMOUNT: &str = "amount";
const MAX_PROPAGATION_ROUNDS: usize = 32;

/// One slot per sub-resource. Slots always exist; the registry decides which
/// of them are fetched, tracked and serialized.
#[derive(Debug, Clone, Default)]
pub struct Submodels {
    pub info: Info,
    pub info_extra: InfoExtra,
    pub config: MachineConfig,
    pub payouts: PayoutLedger,
    pub items: Items,
    pub invs: Inventory,
}

impl Submodels {
    pub fn get(&self, kind: SubmodelKind) -> &dyn Submodel {
        match kind {
            SubmodelKind::Info => &self.info,
            SubmodelKind::InfoExtra => &self.info_extra,
            SubmodelKind::Config => &self.config,
            SubmodelKind::Payouts => &self.payouts,
            SubmodelKind::Items => &self.items,
            SubmodelKind::Invs => &self.invs,
        }
    }

    pub fn get_mut(&mut self, kind: SubmodelKind) -> &mut dyn Submodel {
        match kind {
            SubmodelKind::Info => &mut self.info,
            SubmodelKind::InfoExtra => &mut self.info_extra,
            SubmodelKind::Config => &mut self.config,
            SubmodelKind::Payouts => &mut self.payouts,
            SubmodelKind::Items => &mut self.items,
            SubmodelKind::Invs => &mut self.invs,
        }
    }
}

/// A replacement for one slot, see [`Gacha::replace_submodel`].
#[derive(Debug, Clone)]
pub enum SubmodelInstance {
    Info(Info),
    InfoExtra(InfoExtra),
    Config(MachineConfig),
    Payouts(PayoutLedger),
    Items(Items),
    Invs(Inventory),
}

impl SubmodelInstance {
    pub fn kind(&self) -> SubmodelKind {
        match self {
            SubmodelInstance::Info(_) => SubmodelKind::Info,
            SubmodelInstance::InfoExtra(_) => SubmodelKind::InfoExtra,
            SubmodelInstance::Config(_) => SubmodelKind::Config,
            SubmodelInstance::Payouts(_) => SubmodelKind::Payouts,
            SubmodelInstance::Items(_) => SubmodelKind::Items,
            SubmodelInstance::Invs(_) => SubmodelKind::Invs,
        }
    }
}

/// The configuration record of one gacha machine, assembled from its
/// sub-resources.
///
/// Sub-resources are edited through [`Gacha::edit`]; once the edit returns,
/// their events are re-published on the aggregate's stream and the
/// cross-model rules run:
///
/// - `info.extra` and `info_extra` are kept identical,
/// - the owner's payout line is recomputed when the price or any other line
///   changes,
/// - the total progress follows the per-entry progress.
pub struct Gacha<T = ReqwestTransport> {
    registry: Registry,
    sync: SyncAdapter<T>,
    submodels: Submodels,
    progress: ProgressBoard,
    dispatcher: Dispatcher,
    is_valid: bool,
    last_fetched_snapshot: Option<Value>,
    state: PipelineState,
}

impl<T: Transport> Gacha<T> {
    pub fn new(sync: SyncAdapter<T>) -> Self {
        Self::with_registry(sync, Registry::standard())
    }

    pub fn with_registry(sync: SyncAdapter<T>, registry: Registry) -> Self {
        let dispatcher = Dispatcher::new();
        let progress = ProgressBoard::new(&registry, dispatcher.clone());
        Self {
            registry,
            sync,
            submodels: Submodels::default(),
            progress,
            dispatcher,
            is_valid: false,
            last_fetched_snapshot: None,
            state: PipelineState::Idle,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GachaEvent> {
        self.dispatcher.subscribe()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn sync(&self) -> &SyncAdapter<T> {
        &self.sync
    }

    pub fn submodels(&self) -> &Submodels {
        &self.submodels
    }

    pub fn info(&self) -> &Info {
        &self.submodels.info
    }

    pub fn info_extra(&self) -> &InfoExtra {
        &self.submodels.info_extra
    }

    pub fn config(&self) -> &MachineConfig {
        &self.submodels.config
    }

    pub fn payouts(&self) -> &PayoutLedger {
        &self.submodels.payouts
    }

    pub fn items(&self) -> &Items {
        &self.submodels.items
    }

    pub fn invs(&self) -> &Inventory {
        &self.submodels.invs
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    pub fn progress_percentage(&self) -> f64 {
        self.progress.total()
    }

    pub fn entry_progress(&self, kind: SubmodelKind) -> Option<f64> {
        self.progress.entry(kind)
    }

    pub fn override_progress(&self) -> Option<f64> {
        self.progress.override_progress()
    }

    pub fn set_override_progress(&mut self, value: Option<f64>) {
        self.progress.set_override(value);
    }

    pub fn update_progress(&mut self) {
        self.progress.update();
    }

    pub fn pipeline_state(&self) -> PipelineState {
        self.state
    }

    pub fn last_fetched_snapshot(&self) -> Option<&Value> {
        self.last_fetched_snapshot.as_ref()
    }

    /// Runs `edit` against the sub-resources, then propagates what changed.
    pub fn edit<R>(&mut self, edit: impl FnOnce(&mut Submodels) -> R) -> R {
        let result = edit(&mut self.submodels);
        self.propagate();
        result
    }

    /// Publishes pending sub-resource events and applies the cross-model
    /// rules until nothing changes any more.
    pub fn propagate(&mut self) {
        for _ in 0..MAX_PROPAGATION_ROUNDS {
            let drained: Vec<(SubmodelKind, EventKind)> = SubmodelKind::ALL
                .into_iter()
                .flat_map(|kind| {
                    self.submodels
                        .get_mut(kind)
                        .take_events()
                        .into_iter()
                        .map(move |event| (kind, event))
                })
                .collect();
            if drained.is_empty() {
                return;
            }
            for (kind, event) in &drained {
                self.dispatcher
                    .publish(Origin::Submodel(*kind), event.clone());
            }
            for (kind, event) in &drained {
                self.react(*kind, event);
            }
        }
        tracing::warn!(
            "sub-resource changes still pending after {MAX_PROPAGATION_ROUNDS} rounds"
        );
    }

    fn react(&mut self, origin: SubmodelKind, event: &EventKind) {
        match origin {
            SubmodelKind::Info if event.is_attribute_change(EXTRA) => {
                self.mirror_info_into_extra();
            }
            SubmodelKind::InfoExtra => {
                if event.is_attribute_change(BUTTON_PRICE) {
                    self.recalculate_owner_amount();
                }
                if matches!(event, EventKind::Change { .. }) {
                    self.mirror_extra_into_info();
                }
            }
            SubmodelKind::Payouts => match event {
                EventKind::Add { .. } | EventKind::Remove { .. } | EventKind::Reset => {
                    self.recalculate_owner_amount();
                }
                event if event.is_attribute_change(AMOUNT) => {
                    self.recalculate_owner_amount();
                }
                _ => {}
            },
            _ => {}
        }
    }

    fn mirror_info_into_extra(&mut self) -> bool {
        let extra = self.submodels.info.extra();
        if self.submodels.info_extra.attributes() == &extra {
            return false;
        }
        self.submodels.info_extra.replace(extra)
    }

    fn mirror_extra_into_info(&mut self) -> bool {
        let extra = self.submodels.info_extra.attributes().clone();
        if self.submodels.info.extra() == extra {
            return false;
        }
        self.submodels.info.set(EXTRA, Value::Object(extra))
    }

    /// Price used for the owner's remainder: the button price, falling back
    /// to the info price while no button price is known.
    pub fn price(&self) -> i64 {
        self.submodels
            .info_extra
            .button_price()
            .unwrap_or_else(|| self.submodels.info.price())
    }

    /// Recomputes the owner's line from scratch. Does nothing without an
    /// owner key or an owner line.
    pub fn recalculate_owner_amount(&mut self) -> bool {
        let price = self.price();
        let Some(owner_key) = self.submodels.info.owner_key() else {
            return false;
        };
        self.submodels.payouts.recalculate_owner(owner_key, price)
    }

    /// Walks the registry in order, fetching every entry the session and
    /// `options` allow, then runs the completion step.
    ///
    /// A failed entry stalls the walk: later entries keep their progress and
    /// the error is returned.
    pub async fn fetch(&mut self, options: SyncOptions) -> Result<(), SyncError> {
        self.progress.reset();
        let gate = AccessGate::new(options.load_admin, self.sync.session().has_admin_key());
        let mut pipeline = FetchPipeline::new(&self.registry, gate);
        loop {
            match pipeline.next_step() {
                Step::Skip(descriptor) => {
                    tracing::debug!("skipping {}", descriptor.kind);
                    self.progress.set_entry(descriptor.kind, 100.0);
                }
                Step::Fetch(descriptor) => {
                    let kind = descriptor.kind;
                    self.state = PipelineState::Running { at: kind };
                    let fetched = self.fetch_entry(&descriptor, &options).await;
                    self.propagate();
                    if let Err(error) = fetched {
                        tracing::warn!("fetch stalled at {kind}: {error}");
                        self.state = PipelineState::Stalled { at: kind };
                        return Err(error);
                    }
                    tracing::info!("fetched {kind}");
                    self.progress.set_entry(kind, 100.0);
                }
                Step::Complete => break,
            }
        }
        self.complete_fetch();
        Ok(())
    }

    async fn fetch_entry(
        &mut self,
        descriptor: &SubmodelDescriptor,
        options: &SyncOptions,
    ) -> Result<(), SyncError> {
        let kind = descriptor.kind;
        let options = &options.clone().observed_by(RequestObserver::new(
            self.dispatcher.clone(),
            Origin::Submodel(kind),
        ));
        let reporter = descriptor.progress;
        let expected = reporter.and_then(|reporter| reporter.expected(&self.submodels.info));
        let progress = &mut self.progress;
        let on_progress = move |fetched: usize| {
            if let (Some(reporter), Some(expected)) = (reporter, expected) {
                progress.set_entry(kind, reporter.percentage(fetched, expected));
            }
        };
        let sync = &self.sync;
        let submodels = &mut self.submodels;
        match kind {
            SubmodelKind::Info => submodels.info.fetch(sync, options).await,
            SubmodelKind::InfoExtra => submodels.info_extra.fetch(sync, options).await,
            SubmodelKind::Config => submodels.config.fetch(sync, options).await,
            SubmodelKind::Payouts => {
                submodels
                    .payouts
                    .fetch(sync, options, expected, on_progress)
                    .await
            }
            SubmodelKind::Items => {
                submodels
                    .items
                    .fetch(sync, options, expected, on_progress)
                    .await
            }
            SubmodelKind::Invs => {
                submodels
                    .invs
                    .fetch(sync, options, expected, on_progress)
                    .await
            }
        }
    }

    // The snapshot is taken before items are populated and the owner line is
    // added, so both show up as unsaved changes.
    fn complete_fetch(&mut self) {
        self.progress.complete();
        self.last_fetched_snapshot = Some(self.to_notecard_json());
        self.populate_items();
        if self.registry.contains(SubmodelKind::Payouts) && self.submodels.payouts.is_empty()
        {
            self.add_owner_line();
        }
        self.propagate();
        self.validate();
        self.state = PipelineState::Complete;
        tracing::info!("fetch complete");
    }

    fn populate_items(&mut self) -> usize {
        if !(self.registry.contains(SubmodelKind::Items)
            && self.registry.contains(SubmodelKind::Invs))
        {
            return 0;
        }
        let Submodels {
            info, items, invs, ..
        } = &mut self.submodels;
        items.populate(invs, info.script_name())
    }

    fn add_owner_line(&mut self) -> bool {
        let info = &self.submodels.info;
        let Some(owner_key) = info.owner_key() else {
            tracing::debug!("no owner key, leaving the payout ledger empty");
            return false;
        };
        let line = PayoutLine {
            agent_key: owner_key.to_string(),
            display_name: info.owner_display_name().unwrap_or_default().to_string(),
            user_name: info.owner_user_name().unwrap_or_default().to_string(),
            amount: info.price(),
        };
        self.submodels.payouts.add(line)
    }

    /// Valid once the ledger holds an owner line and no line is negative.
    pub fn validate(&mut self) -> bool {
        let has_owner_line = self
            .submodels
            .info
            .owner_key()
            .is_some_and(|owner_key| self.submodels.payouts.get(owner_key).is_some());
        let is_valid = has_owner_line && self.submodels.payouts.is_valid();
        if self.is_valid != is_valid {
            self.is_valid = is_valid;
            self.publish_change(IS_VALID, json!(is_valid));
        }
        is_valid
    }

    /// Every aggregate attribute, with each registered sub-resource in its
    /// live shape.
    pub fn to_live_json(&self) -> Value {
        let mut view = Map::new();
        view.insert(IS_VALID.to_string(), json!(self.is_valid));
        view.insert(
            PROGRESS_PERCENTAGE.to_string(),
            json!(self.progress.total()),
        );
        view.insert(
            OVERRIDE_PROGRESS.to_string(),
            json!(self.progress.override_progress()),
        );
        for (kind, percentage) in self.progress.entries() {
            view.insert(kind.progress_attribute(), json!(percentage));
        }
        for kind in self.registry.kinds() {
            view.insert(
                kind.name().to_string(),
                self.submodels.get(kind).to_live_json(),
            );
        }
        Value::Object(view)
    }

    /// Only the sub-resources that have a persisted shape.
    pub fn to_notecard_json(&self) -> Value {
        let view = self
            .registry
            .kinds()
            .filter_map(|kind| {
                self.submodels
                    .get(kind)
                    .to_notecard_json()
                    .map(|section| (kind.name().to_string(), section))
            })
            .collect();
        Value::Object(view)
    }

    /// `true` until the first fetch completes.
    pub fn has_changed_since_fetch(&self) -> bool {
        self.last_fetched_snapshot.as_ref() != Some(&self.to_notecard_json())
    }

    /// Loads a notecard view back into the sub-resources, then fills the
    /// catalog from the inventory.
    pub fn from_notecard_json(&mut self, notecard: &Value) -> Result<(), NotecardError> {
        let Value::Object(sections) = notecard else {
            return Err(NotecardError::NotAnObject);
        };
        let loaded = self.load_sections(sections);
        self.populate_items();
        self.propagate();
        loaded
    }

    fn load_sections(&mut self, sections: &Map<String, Value>) -> Result<(), NotecardError> {
        for (name, section) in sections {
            let Some(kind) = self.registry.kinds().find(|kind| kind.name() == name.as_str()) else {
                tracing::debug!("ignoring notecard section {name}");
                continue;
            };
            self.submodels.get_mut(kind).from_notecard_json(section)?;
        }
        Ok(())
    }

    /// Swaps one slot and brings the other slots in line with the new
    /// instance.
    pub fn replace_submodel(&mut self, instance: SubmodelInstance) {
        let kind = instance.kind();
        match instance {
            SubmodelInstance::Info(info) => self.submodels.info = info,
            SubmodelInstance::InfoExtra(info_extra) => self.submodels.info_extra = info_extra,
            SubmodelInstance::Config(config) => self.submodels.config = config,
            SubmodelInstance::Payouts(payouts) => self.submodels.payouts = payouts,
            SubmodelInstance::Items(items) => self.submodels.items = items,
            SubmodelInstance::Invs(invs) => self.submodels.invs = invs,
        }
        self.publish_change(kind.name(), self.submodels.get(kind).to_live_json());
        match kind {
            SubmodelKind::Info => {
                self.mirror_info_into_extra();
            }
            SubmodelKind::InfoExtra => {
                self.mirror_extra_into_info();
            }
            _ => {}
        }
        self.recalculate_owner_amount();
        self.propagate();
    }

    pub fn payout_row_capabilities(&self, agent_key: &str) -> RowCapabilities {
        self.submodels.payouts.row_capabilities(
            agent_key,
            self.submodels.info.owner_key(),
            self.sync.session().has_admin_key(),
        )
    }

    pub fn set_payout_amount_input(
        &mut self,
        agent_key: &str,
        raw: &str,
    ) -> Result<i64, LedgerError> {
        let Submodels { info, payouts, .. } = &mut self.submodels;
        let amount = payouts.set_amount_input(agent_key, raw, info.owner_key());
        self.propagate();
        amount
    }

    pub fn delete_payout_row(&mut self, agent_key: &str) -> Result<PayoutLine, LedgerError> {
        let Submodels { info, payouts, .. } = &mut self.submodels;
        let removed = payouts.delete_row(agent_key, info.owner_key());
        self.propagate();
        removed
    }

    fn publish_change(&self, attribute: &str, value: Value) {
        self.dispatcher.publish(
            Origin::Gacha,
            EventKind::ChangeAttribute {
                record: None,
                attribute: attribute.to_string(),
                value,
            },
        );
    }
}
