use std::sync::Arc;

use indexmap::IndexMap;
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use tracing::{info, warn};

use crate::{
    event::EventMetaData,
    labels::{check_event_count, GlobalLabel, LabelRegistry},
    params::{
        EventDependency, GlobalParamSet, GlobalParamVector, PayloadHandle, ReleasedObject,
        ReleasedPayload,
    },
    store::PayloadStore,
    utils::enums::{CorrectionMode, TimelineState},
    TimelineError, TimelineResult, UniqueId,
};

/// Payload blocks built from a finalized [`TimeTable`].
pub mod payloads;
/// The [`TimeTable`] of change flags and continuous payload indices.
pub mod table;
/// Forward scans over the columns of a finalized [`TimeTable`].
pub mod traversal;

pub use payloads::{
    get_payload_by_continuous_index, time_ids_table_to_payloads_table, IntraIoVPayload,
    IntraIoVPayloads, PayloadIovBlock, PayloadIovBlockRow, PayloadsTable,
};
pub use table::{
    finalize_time_table, get_continuous_index_by_time_id, make_initial_time_table, TimeTable,
};
pub use traversal::{go_to_next_change_in_run, go_to_next_change_run_wise};

fn handle_address(handle: &PayloadHandle) -> usize {
    Arc::as_ptr(handle) as usize
}

fn copy_payload(handle: &PayloadHandle) -> Box<dyn GlobalParamSet> {
    dyn_clone::clone_box(&**handle.read())
}

/// The payloads of every time-dependent global parameter over a list of events.
///
/// A [`GlobalParamTimeLine`] owns one [`TimeTable`] and the [`PayloadsTable`] built from it.
/// Their shape is fixed at construction. Afterwards only the contents of the payloads change,
/// either by loading them from a [`PayloadStore`] or by applying corrections to single
/// parameters. Finally [`GlobalParamTimeLine::release_objects`] hands out one object per block
/// for storage, after which the timeline refuses any further use.
#[derive(Debug)]
pub struct GlobalParamTimeLine {
    time_table: TimeTable,
    payloads_table: PayloadsTable,
    state: TimelineState,
    corrected: bool,
}

impl GlobalParamTimeLine {
    /// Build the timeline over `events` for every payload with a time-dependent parameter in
    /// `registry`, constructing payloads from the templates in `vector`.
    ///
    /// `events` must be strictly increasing, usually the list returned by
    /// [`setup_timedep_global_labels`](crate::setup_timedep_global_labels) for the same
    /// `registry`, and may hold at most [`TIME_RANGE`](crate::labels::TIME_RANGE) events.
    pub fn new(
        events: &[EventMetaData],
        registry: &LabelRegistry,
        vector: &GlobalParamVector,
    ) -> TimelineResult<Self> {
        if events.is_empty() {
            return Err(TimelineError::EmptyEventHeader);
        }
        check_event_count(events)?;
        let mut time_table =
            make_initial_time_table(events.to_vec(), &registry.uid_time_dependence())?;
        finalize_time_table(&mut time_table);
        let payloads_table = time_ids_table_to_payloads_table(&time_table, vector)?;
        let timeline = Self {
            time_table,
            payloads_table,
            state: TimelineState::Built,
            corrected: false,
        };
        info!(
            columns = timeline.time_table.n_columns(),
            rows = timeline.time_table.n_rows(),
            blocks = timeline.n_blocks(),
            "built global parameter timeline"
        );
        Ok(timeline)
    }
    /// The finalized table of continuous payload indices.
    pub fn time_table(&self) -> &TimeTable {
        &self.time_table
    }
    /// The payload blocks of every row.
    pub fn payloads_table(&self) -> &PayloadsTable {
        &self.payloads_table
    }
    /// The current lifecycle state.
    pub fn state(&self) -> TimelineState {
        self.state
    }
    /// The total number of blocks over all rows.
    pub fn n_blocks(&self) -> usize {
        self.payloads_table.values().map(Vec::len).sum()
    }

    fn check_not_released(&self) -> TimelineResult<()> {
        if self.state == TimelineState::Released {
            return Err(TimelineError::Released);
        }
        Ok(())
    }

    // Every handle once, with the unique id and the first event at which it applies.
    fn distinct_payloads(&self) -> Vec<(UniqueId, EventMetaData, PayloadHandle)> {
        let mut distinct = IndexMap::new();
        for (uid, row) in &self.payloads_table {
            for entry in row.iter().flat_map(|block| &block.payloads) {
                distinct
                    .entry(handle_address(&entry.handle))
                    .or_insert_with(|| (*uid, entry.event, Arc::clone(&entry.handle)));
            }
        }
        distinct.into_values().collect()
    }

    /// Load every payload from `store` with the value valid at the first event at which it
    /// applies.
    ///
    /// Calling this again reloads every payload and discards any applied corrections. If any load
    /// fails, one of the failures is returned and the timeline falls back to
    /// [`TimelineState::Built`], since the other payloads may already have been overwritten.
    pub fn load_from_db<S: PayloadStore + ?Sized>(&mut self, store: &S) -> TimelineResult<()> {
        self.check_not_released()?;
        if self.corrected {
            warn!("reloading payloads discards previously applied corrections");
        }
        let payloads = self.distinct_payloads();
        let load = |payload: &(UniqueId, EventMetaData, PayloadHandle)| -> TimelineResult<()> {
            let (uid, since, handle) = payload;
            let loaded = store.load(*uid, since)?;
            if loaded.unique_id() != *uid {
                return Err(TimelineError::PayloadMismatch {
                    expected: *uid,
                    found: loaded.unique_id(),
                });
            }
            *handle.write() = loaded;
            Ok(())
        };
        #[cfg(feature = "rayon")]
        let result: TimelineResult<()> = payloads.par_iter().try_for_each(load);
        #[cfg(not(feature = "rayon"))]
        let result: TimelineResult<()> = payloads.iter().try_for_each(load);
        if let Err(error) = result {
            self.state = TimelineState::Built;
            return Err(error);
        }
        self.state = TimelineState::Loaded;
        self.corrected = false;
        info!(payloads = payloads.len(), "loaded payloads");
        Ok(())
    }

    /// Apply `correction` to the parameter behind `label` in every payload of its period of
    /// validity.
    ///
    /// The period starts at column `label.time_id` and is looked up in `registry`, so it may
    /// cover several blocks and several distinct payloads. Each distinct payload is corrected
    /// once, no matter how many blocks share it.
    pub fn update_global_param(
        &mut self,
        registry: &LabelRegistry,
        label: GlobalLabel,
        correction: f64,
        mode: CorrectionMode,
    ) -> TimelineResult<()> {
        self.check_not_released()?;
        let period = registry.validity_period(label, self.time_table.n_columns())?;
        let uid = label.unique_id;
        let mut touched = IndexMap::new();
        for timeid in period {
            let index = get_continuous_index_by_time_id(&self.time_table, uid, timeid)?;
            let (_, handle) = get_payload_by_continuous_index(&self.payloads_table, uid, index)?;
            touched.entry(handle_address(&handle)).or_insert(handle);
        }
        for handle in touched.values() {
            let mut payload = handle.write();
            match mode {
                CorrectionMode::Add => {
                    payload.update_global_param(correction, label.element, label.param)
                }
                CorrectionMode::Reset => {
                    payload.set_global_param(correction, label.element, label.param)
                }
            }
        }
        self.corrected = true;
        Ok(())
    }

    /// The current value of the parameter behind `label` at column `label.time_id`.
    pub fn global_param(&self, label: GlobalLabel) -> TimelineResult<f64> {
        self.check_not_released()?;
        let uid = label.unique_id;
        let index = get_continuous_index_by_time_id(&self.time_table, uid, label.time_id)?;
        let (_, handle) = get_payload_by_continuous_index(&self.payloads_table, uid, index)?;
        let value = handle.read().global_param(label.element, label.param);
        Ok(value)
    }

    /// Hand out one object per block, in row and column order, for storage.
    ///
    /// A block whose payload changes within its run yields an [`EventDependency`] with a copy of
    /// each payload, keyed by the event number at which it starts to apply. Every other block
    /// yields a copy of its single payload. The timeline cannot be used afterwards.
    pub fn release_objects(&mut self) -> TimelineResult<Vec<ReleasedObject>> {
        self.check_not_released()?;
        let mut released = Vec::with_capacity(self.n_blocks());
        for row in self.payloads_table.values() {
            for block in row {
                let payload = match block.payloads.as_slice() {
                    [single] => ReleasedPayload::Single(copy_payload(&single.handle)),
                    [first, rest @ ..] => {
                        let mut dependency = EventDependency::new(copy_payload(&first.handle));
                        for entry in rest {
                            dependency.add(entry.event.event, copy_payload(&entry.handle));
                        }
                        ReleasedPayload::EventDependent(dependency)
                    }
                    [] => continue,
                };
                released.push(ReleasedObject {
                    iov: block.iov,
                    since: block.since(),
                    payload,
                });
            }
        }
        self.state = TimelineState::Released;
        info!(objects = released.len(), "released payloads");
        Ok(released)
    }
}
