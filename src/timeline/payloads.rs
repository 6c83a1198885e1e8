use std::{collections::BTreeMap, sync::Arc};

use tracing::debug;

use crate::{
    event::EventMetaData,
    iov::IntervalOfValidity,
    params::{GlobalParamVector, PayloadHandle},
    TimelineError, TimelineResult, UniqueId,
};

use super::{table::TimeTable, traversal::go_to_next_change_run_wise};

/// One payload of a block, valid from `event` up to the next entry of the block.
#[derive(Clone, Debug)]
pub struct IntraIoVPayload {
    /// The first column at which this payload applies.
    pub event: EventMetaData,
    /// The continuous index of the payload.
    pub continuous_index: usize,
    /// The payload itself, shared by every entry with the same continuous index.
    pub handle: PayloadHandle,
}

/// The payloads of one block, ordered by event and by strictly increasing continuous index.
pub type IntraIoVPayloads = Vec<IntraIoVPayload>;

/// A span of whole runs over which a payload is stored as one object.
///
/// Either the block covers consecutive runs which all hold the same single continuous index, or
/// it covers one run within which the index changes. In the latter case every change is an entry
/// of `payloads`, and the block is stored as an event-dependent payload.
#[derive(Clone, Debug)]
pub struct PayloadIovBlock {
    /// The runs covered by the block.
    pub iov: IntervalOfValidity,
    /// The payloads valid within the block, never empty.
    pub payloads: IntraIoVPayloads,
}

impl PayloadIovBlock {
    /// The first column of the block.
    pub fn since(&self) -> EventMetaData {
        self.payloads[0].event
    }
    /// Check whether the payload changes within the block.
    pub fn is_event_dependent(&self) -> bool {
        self.payloads.len() > 1
    }
    /// The continuous index valid at the end of the block.
    pub fn last_index(&self) -> usize {
        self.payloads
            .last()
            .map_or(0, |payload| payload.continuous_index)
    }
    /// The entry holding continuous index `index`, if any.
    pub fn entry(&self, index: usize) -> Option<&IntraIoVPayload> {
        self.payloads
            .iter()
            .find(|payload| payload.continuous_index == index)
    }
}

/// The blocks of one payload, in column order.
pub type PayloadIovBlockRow = Vec<PayloadIovBlock>;

/// The blocks of every time-dependent payload, by unique id.
pub type PayloadsTable = BTreeMap<UniqueId, PayloadIovBlockRow>;

// The entries of the run starting at column `timeid`, one per continuous index, the last event
// of the run, and the first column after it.
fn scan_run(
    table: &TimeTable,
    uid: UniqueId,
    mut timeid: usize,
    handles: &[PayloadHandle],
) -> TimelineResult<(IntraIoVPayloads, EventMetaData, usize)> {
    let row = table.row(uid)?;
    let run = table.run(timeid)?;
    let mut entries = IntraIoVPayloads::new();
    loop {
        let event = table.event(timeid)?;
        let continuous_index = row[timeid];
        let handle = handles
            .get(continuous_index)
            .ok_or(TimelineError::ContinuousIndexNotFound {
                uid,
                index: continuous_index,
            })?;
        entries.push(IntraIoVPayload {
            event,
            continuous_index,
            handle: Arc::clone(handle),
        });
        let last = go_to_next_change_run_wise(table, uid, &mut timeid)?;
        timeid += 1;
        if timeid >= row.len() || table.run(timeid)? != run {
            return Ok((entries, last, timeid));
        }
    }
}

/// Expand a finalized [`TimeTable`] into payload blocks.
///
/// One payload is constructed from `vector` per continuous index of each row, and every entry
/// holding that index shares its handle. The templates in `vector` are cloned, never loaded.
pub fn time_ids_table_to_payloads_table(
    table: &TimeTable,
    vector: &GlobalParamVector,
) -> TimelineResult<PayloadsTable> {
    if table.n_columns() == 0 {
        return Err(TimelineError::EmptyEventHeader);
    }
    debug_assert!(table.is_finalized());
    let mut payloads = PayloadsTable::new();
    for (uid, row) in table.rows() {
        let n_indices = row.last().map_or(0, |last| last + 1);
        let handles = (0..n_indices)
            .map(|_| vector.construct(uid))
            .collect::<TimelineResult<Vec<_>>>()?;
        let mut blocks = PayloadIovBlockRow::new();
        let mut timeid = 0;
        while timeid < row.len() {
            let (entries, last, next) = scan_run(table, uid, timeid, &handles)?;
            let continues = entries.len() == 1
                && blocks.last().map_or(false, |previous| {
                    !previous.is_event_dependent()
                        && previous.last_index() == entries[0].continuous_index
                });
            if let Some(previous) = blocks.last_mut().filter(|_| continues) {
                previous.iov.experiment_high = last.experiment;
                previous.iov.run_high = last.run;
            } else {
                let iov = IntervalOfValidity::from_events(&entries[0].event, &last);
                blocks.push(PayloadIovBlock {
                    iov,
                    payloads: entries,
                });
            }
            timeid = next;
        }
        debug!(
            uid,
            blocks = blocks.len(),
            payloads = handles.len(),
            "built payload blocks"
        );
        payloads.insert(uid, blocks);
    }
    Ok(payloads)
}

/// The first column and the handle of the payload with continuous index `index` of `uid`.
pub fn get_payload_by_continuous_index(
    payloads: &PayloadsTable,
    uid: UniqueId,
    index: usize,
) -> TimelineResult<(EventMetaData, PayloadHandle)> {
    let row = payloads
        .get(&uid)
        .ok_or(TimelineError::UnknownUniqueId { uid })?;
    let position = row.partition_point(|block| block.last_index() < index);
    row.get(position)
        .and_then(|block| block.entry(index))
        .map(|entry| (entry.event, Arc::clone(&entry.handle)))
        .ok_or(TimelineError::ContinuousIndexNotFound { uid, index })
}
