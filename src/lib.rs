//! # alignment-timeline
//!
//! Time-dependent global parameters for detector alignment and calibration.
//!
//! A calibration declares, per global parameter, the points in time at which its value may
//! change. From that schedule this crate builds a [`TimeTable`](crate::timeline::TimeTable)
//! (one row per payload [`UniqueId`], one column per [`EventMetaData`]), compresses it into
//! continuous payload indices, and expands it into a
//! [`PayloadsTable`](crate::timeline::PayloadsTable) of payload objects indexed by
//! [`IntervalOfValidity`]. The [`GlobalParamTimeLine`] ties these together: it loads the
//! nominal payloads from a [`PayloadStore`], absorbs corrections from a fit, and finally
//! releases the payloads for storage.
//!
//! ```
//! use alignment_timeline::{
//!     setup_timedep_global_labels, AlignmentConstants, CorrectionMode, EventMetaData,
//!     GlobalLabel, GlobalParamTimeLine, GlobalParamVector, LabelRegistry, TimedepConfig,
//! };
//!
//! let label = GlobalLabel::construct(7, 1, 2);
//! let mut registry = LabelRegistry::default();
//! let events = setup_timedep_global_labels(
//!     &mut registry,
//!     vec![EventMetaData::new(0, 0, 0)],
//!     &[TimedepConfig::new(vec![label.label().unwrap()], vec![EventMetaData::new(0, 2, 0)])],
//! )
//! .unwrap();
//!
//! let mut vector = GlobalParamVector::default();
//! vector.add_param_set(AlignmentConstants::new(7));
//!
//! let mut timeline = GlobalParamTimeLine::new(&events, &registry, &vector).unwrap();
//! timeline
//!     .update_global_param(&registry, label, 0.5, CorrectionMode::Add)
//!     .unwrap();
//! let released = timeline.release_objects().unwrap();
//! assert_eq!(released.len(), 2);
//! ```
#![warn(clippy::perf, clippy::style)]

use thiserror::Error;

/// Event and run coordinates which order every column of a timeline.
pub mod event;
/// Run-granular [`IntervalOfValidity`] ranges.
pub mod iov;
/// Global parameter labels, their time dependence, and the setup of time-dependent labels.
pub mod labels;
/// The payload objects which hold global parameters, and the vector of templates which
/// constructs them.
pub mod params;
/// Backing stores which payloads are loaded from.
pub mod store;
/// Time tables, payload tables, and the [`GlobalParamTimeLine`] built from them.
pub mod timeline;
/// Utility enums
pub mod utils;

pub use crate::event::{EventMetaData, RunId};
pub use crate::iov::IntervalOfValidity;
pub use crate::labels::{setup_timedep_global_labels, GlobalLabel, LabelRegistry, TimedepConfig};
pub use crate::params::{
    AlignmentConstants, EventDependency, GlobalParamSet, GlobalParamVector, PayloadHandle,
    ReleasedObject, ReleasedPayload,
};
pub use crate::store::{MemoryStore, PayloadStore};
pub use crate::timeline::GlobalParamTimeLine;
pub use crate::utils::enums::{CorrectionMode, TimelineState};

/// Identifier of one payload type (one detector-constants object slot).
pub type UniqueId = u32;

pub type TimelineResult<T> = Result<T, TimelineError>;

/// The error type used by all `alignment-timeline` methods
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimelineError {
    /// A time table was requested over an empty list of events.
    #[error("Cannot build a timeline without any events!")]
    EmptyEventHeader,
    /// The events which form the columns of a time table are not strictly increasing.
    #[error("Events must be strictly increasing, but {previous} is followed by {next}!")]
    UnorderedEvents {
        /// The earlier column
        previous: EventMetaData,
        /// The column which does not come after it
        next: EventMetaData,
    },
    /// A payload with this unique id is not known to the collection which was asked for it.
    #[error("No payload registered for unique id {uid}!")]
    UnknownUniqueId {
        /// The unique id which failed lookup
        uid: UniqueId,
    },
    /// A label whose time dependence was never registered was used as if it were time dependent.
    #[error("No time dependence registered for global label {label}!")]
    UnknownTimeDependence {
        /// The label which failed lookup
        label: GlobalLabel,
    },
    /// A label whose fields do not fit into the packed integer form.
    #[error("Global label {label} cannot be packed into an integer label!")]
    LabelOutOfRange {
        /// The label which failed to pack
        label: GlobalLabel,
    },
    /// More columns than a packed label can address by time id.
    #[error("A timeline over {columns} events exceeds the limit of {limit} columns!")]
    TooManyColumns {
        /// The number of requested columns
        columns: usize,
        /// The largest supported number of columns
        limit: usize,
    },
    /// A time id (column index) outside of the table.
    #[error("Time id {timeid} is outside of the time table ({columns} columns)!")]
    TimeIdOutOfRange {
        /// The requested column
        timeid: usize,
        /// The number of columns in the table
        columns: usize,
    },
    /// A continuous payload index beyond the last one present for a unique id.
    #[error("No payload with continuous index {index} for unique id {uid}!")]
    ContinuousIndexNotFound {
        /// The unique id of the row
        uid: UniqueId,
        /// The requested continuous index
        index: usize,
    },
    /// A backing store has no payload valid at the requested event.
    #[error("No payload for unique id {uid} valid at {event}!")]
    PayloadNotFound {
        /// The unique id of the payload
        uid: UniqueId,
        /// The event at which the payload was requested
        event: EventMetaData,
    },
    /// A backing store returned a payload with a different unique id than requested.
    #[error("Requested payload with unique id {expected} but received {found}!")]
    PayloadMismatch {
        /// The requested unique id
        expected: UniqueId,
        /// The unique id of the returned payload
        found: UniqueId,
    },
    /// The payloads of a timeline were already released to the caller.
    #[error("The payloads of this timeline have already been released!")]
    Released,
    /// An error which occurs when the user tries to parse an invalid string of text, typically
    /// into an enum variant.
    #[error("Failed to parse string: \"{name}\" does not correspond to a valid \"{object}\"!")]
    ParseError {
        /// The string which was parsed
        name: String,
        /// The name of the object it failed to parse into
        object: String,
    },
}
