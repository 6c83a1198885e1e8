use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::{
    event::{EventMetaData, RunId},
    TimelineError, TimelineResult, UniqueId,
};

/// A table with one column per [`EventMetaData`] and one row per time-dependent payload.
///
/// Freshly built by [`make_initial_time_table`], a row holds `1` at every column where the
/// payload may start a new value and `0` where it carries over. After
/// [`finalize_time_table`], a row holds the continuous payload index valid at each column
/// instead.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TimeTable {
    events: Vec<EventMetaData>,
    runs: Vec<RunId>,
    data: BTreeMap<UniqueId, Vec<usize>>,
    finalized: bool,
}

impl TimeTable {
    /// The column header: one event per column, strictly increasing.
    pub fn events(&self) -> &[EventMetaData] {
        &self.events
    }
    /// The run of each column.
    pub fn runs(&self) -> &[RunId] {
        &self.runs
    }
    /// The number of columns.
    pub fn n_columns(&self) -> usize {
        self.events.len()
    }
    /// The number of rows.
    pub fn n_rows(&self) -> usize {
        self.data.len()
    }
    /// Check whether the rows hold continuous indices rather than change flags.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }
    /// The unique ids of all rows, in increasing order.
    pub fn unique_ids(&self) -> impl Iterator<Item = UniqueId> + '_ {
        self.data.keys().copied()
    }
    /// All rows, in increasing order of unique id.
    pub fn rows(&self) -> impl Iterator<Item = (UniqueId, &[usize])> + '_ {
        self.data.iter().map(|(uid, row)| (*uid, row.as_slice()))
    }
    /// The row of a payload.
    pub fn row(&self, uid: UniqueId) -> TimelineResult<&[usize]> {
        self.data
            .get(&uid)
            .map(Vec::as_slice)
            .ok_or(TimelineError::UnknownUniqueId { uid })
    }
    /// The event of a column.
    pub fn event(&self, timeid: usize) -> TimelineResult<EventMetaData> {
        self.events
            .get(timeid)
            .copied()
            .ok_or(TimelineError::TimeIdOutOfRange {
                timeid,
                columns: self.events.len(),
            })
    }
    /// The run of a column.
    pub fn run(&self, timeid: usize) -> TimelineResult<RunId> {
        self.runs
            .get(timeid)
            .copied()
            .ok_or(TimelineError::TimeIdOutOfRange {
                timeid,
                columns: self.runs.len(),
            })
    }
}

/// Build the initial time table over `events` with a row for every payload in
/// `time_dependence`, flagging the columns at which that payload may change.
///
/// `events` must be strictly increasing. Column 0 of every row is always flagged.
pub fn make_initial_time_table(
    events: Vec<EventMetaData>,
    time_dependence: &BTreeMap<UniqueId, BTreeSet<usize>>,
) -> TimelineResult<TimeTable> {
    if let Some(pair) = events.windows(2).find(|pair| pair[0] >= pair[1]) {
        return Err(TimelineError::UnorderedEvents {
            previous: pair[0],
            next: pair[1],
        });
    }
    let columns = events.len();
    let mut data = BTreeMap::new();
    for (uid, changes) in time_dependence {
        let mut row = vec![0; columns];
        for &timeid in changes {
            let cell = row
                .get_mut(timeid)
                .ok_or(TimelineError::TimeIdOutOfRange { timeid, columns })?;
            *cell = 1;
        }
        if let Some(first) = row.first_mut() {
            *first = 1;
        }
        data.insert(*uid, row);
    }
    let runs = events.iter().map(EventMetaData::run_id).collect();
    debug!(columns, rows = data.len(), "built initial time table");
    Ok(TimeTable {
        events,
        runs,
        data,
        finalized: false,
    })
}

/// Replace the change flags of every row with continuous payload indices, in place.
///
/// Each row starts at index 0 and the index increases by one at every flagged column after the
/// first. Finalizing an already finalized table does nothing.
pub fn finalize_time_table(table: &mut TimeTable) {
    if table.finalized {
        return;
    }
    for row in table.data.values_mut() {
        let mut index = 0;
        for (timeid, cell) in row.iter_mut().enumerate() {
            if timeid > 0 && *cell != 0 {
                index += 1;
            }
            *cell = index;
        }
    }
    table.finalized = true;
    debug!(rows = table.data.len(), "finalized time table");
}

/// The continuous payload index of payload `uid` at column `timeid` of a finalized table.
pub fn get_continuous_index_by_time_id(
    table: &TimeTable,
    uid: UniqueId,
    timeid: usize,
) -> TimelineResult<usize> {
    debug_assert!(table.is_finalized());
    table
        .row(uid)?
        .get(timeid)
        .copied()
        .ok_or(TimelineError::TimeIdOutOfRange {
            timeid,
            columns: table.n_columns(),
        })
}
