use crate::{event::EventMetaData, TimelineError, TimelineResult, UniqueId};

use super::table::TimeTable;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Stride {
    ToBoundary,
    SingleStep,
}

/// Step `timeid` forward while the next column belongs to the same run and holds the same
/// continuous index as the starting column.
fn advance(
    table: &TimeTable,
    uid: UniqueId,
    timeid: &mut usize,
    stride: Stride,
) -> TimelineResult<EventMetaData> {
    debug_assert!(table.is_finalized());
    let row = table.row(uid)?;
    let runs = table.runs();
    if *timeid >= row.len() {
        return Err(TimelineError::TimeIdOutOfRange {
            timeid: *timeid,
            columns: row.len(),
        });
    }
    let start = *timeid;
    while *timeid + 1 < row.len() {
        let next = *timeid + 1;
        if runs[next] != runs[start] || row[next] != row[start] {
            break;
        }
        *timeid = next;
        if stride == Stride::SingleStep {
            break;
        }
    }
    table.event(*timeid)
}

/// Move `timeid` to the last column of its run at which payload `uid` still holds the same
/// continuous index, and return the event of that column.
///
/// The scan never leaves the run of the starting column. If the column after `timeid` already
/// belongs to another run or holds another index (or `timeid` is the last column), `timeid` is
/// left unchanged.
pub fn go_to_next_change_run_wise(
    table: &TimeTable,
    uid: UniqueId,
    timeid: &mut usize,
) -> TimelineResult<EventMetaData> {
    advance(table, uid, timeid, Stride::ToBoundary)
}

/// Move `timeid` one column forward if that column belongs to the same run and holds the same
/// continuous index of payload `uid`, and return the event of the column `timeid` ends at.
///
/// Repeated calls enumerate the intra-run entries of one payload block. At the last of them,
/// `timeid` is left unchanged.
pub fn go_to_next_change_in_run(
    table: &TimeTable,
    uid: UniqueId,
    timeid: &mut usize,
) -> TimelineResult<EventMetaData> {
    advance(table, uid, timeid, Stride::SingleStep)
}
