use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Display,
    ops::RangeInclusive,
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{event::EventMetaData, TimelineError, TimelineResult, UniqueId};

/// Number of distinct parameter ids per element which fit into a packed label.
pub const PARAM_RANGE: u64 = 100;
/// Number of distinct element ids per payload which fit into a packed label.
pub const ELEMENT_RANGE: u64 = 1_000_000;
/// Number of distinct time ids which fit into a packed label. This is also the largest number of
/// columns a timeline may have.
pub const TIME_RANGE: u64 = 10_000;

/// The identity of one scalar global parameter: a parameter of an element of a payload, valid
/// from a given column (time id) of the timeline onwards.
///
/// Labels are handed to the fit as single integers (see [`GlobalLabel::label`]), packed as
/// `((uid * TIME_RANGE + time_id) * ELEMENT_RANGE + element) * PARAM_RANGE + param`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GlobalLabel {
    /// The payload this parameter belongs to.
    pub unique_id: UniqueId,
    /// The element (e.g. a sensor or wire) within the payload.
    pub element: u32,
    /// The parameter id within the element.
    pub param: u32,
    /// The column at which this label's period of validity begins.
    pub time_id: usize,
}

impl GlobalLabel {
    /// A label for a parameter, valid from the start of the timeline.
    pub fn construct(unique_id: UniqueId, element: u32, param: u32) -> Self {
        Self {
            unique_id,
            element,
            param,
            time_id: 0,
        }
    }
    /// The same parameter, but for the period of validity starting at `time_id`.
    pub fn with_time_id(self, time_id: usize) -> Self {
        Self { time_id, ..self }
    }
    /// The same parameter, independent of time.
    pub fn parameter(&self) -> Self {
        self.with_time_id(0)
    }
    /// Unpack a label produced by [`GlobalLabel::label`].
    ///
    /// Every `u64` decodes to some label, and every field of the result is in range.
    pub fn from_label(label: u64) -> Self {
        let param = label % PARAM_RANGE;
        let rest = label / PARAM_RANGE;
        let element = rest % ELEMENT_RANGE;
        let rest = rest / ELEMENT_RANGE;
        let time_id = rest % TIME_RANGE;
        // at most u64::MAX / 10^12, which fits a u32
        let unique_id = rest / TIME_RANGE;
        Self {
            unique_id: unique_id as UniqueId,
            element: element as u32,
            param: param as u32,
            time_id: time_id as usize,
        }
    }
    /// The packed integer form of this label.
    ///
    /// Fails with [`TimelineError::LabelOutOfRange`] if `element`, `param` or `time_id` exceed
    /// their ranges or the packed value does not fit into a `u64`.
    pub fn label(&self) -> TimelineResult<u64> {
        let out_of_range = || TimelineError::LabelOutOfRange { label: *self };
        let time_id = u64::try_from(self.time_id).map_err(|_| out_of_range())?;
        if u64::from(self.element) >= ELEMENT_RANGE
            || u64::from(self.param) >= PARAM_RANGE
            || time_id >= TIME_RANGE
        {
            return Err(out_of_range());
        }
        u64::from(self.unique_id)
            .checked_mul(TIME_RANGE)
            .and_then(|packed| packed.checked_add(time_id))
            .and_then(|packed| packed.checked_mul(ELEMENT_RANGE))
            .and_then(|packed| packed.checked_add(u64::from(self.element)))
            .and_then(|packed| packed.checked_mul(PARAM_RANGE))
            .and_then(|packed| packed.checked_add(u64::from(self.param)))
            .ok_or_else(out_of_range)
    }
}

impl Display for GlobalLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(uid: {}, element: {}, param: {}, time id: {})",
            self.unique_id, self.element, self.param, self.time_id
        )
    }
}

impl From<u64> for GlobalLabel {
    fn from(label: u64) -> Self {
        Self::from_label(label)
    }
}

fn check_columns(columns: usize) -> TimelineResult<()> {
    let limit = TIME_RANGE as usize;
    if columns > limit {
        return Err(TimelineError::TooManyColumns { columns, limit });
    }
    Ok(())
}

/// The declared time dependence of global parameters.
///
/// For every time-dependent parameter this holds the set of columns (indices into the event list
/// returned by [`setup_timedep_global_labels`]) at which its value may change. Column 0 is always
/// the start of a period, whether declared or not.
#[derive(Clone, Debug, Default)]
pub struct LabelRegistry {
    time_dependence: BTreeMap<GlobalLabel, BTreeSet<usize>>,
}

impl LabelRegistry {
    /// Declare that the parameter behind `label` may change at each of the given columns.
    /// Repeated declarations for the same parameter accumulate.
    pub fn set_time_dependence<I>(&mut self, label: GlobalLabel, columns: I)
    where
        I: IntoIterator<Item = usize>,
    {
        self.time_dependence
            .entry(label.parameter())
            .or_default()
            .extend(columns);
    }
    /// The declared change columns of the parameter behind `label`, if it is time dependent.
    pub fn time_dependence(&self, label: GlobalLabel) -> Option<&BTreeSet<usize>> {
        self.time_dependence.get(&label.parameter())
    }
    /// Check whether the parameter behind `label` has any declared time dependence.
    pub fn is_time_dependent(&self, label: GlobalLabel) -> bool {
        self.time_dependence(label).is_some()
    }
    /// Iterate over the (time-independent) labels of all time-dependent parameters.
    pub fn labels(&self) -> impl Iterator<Item = GlobalLabel> + '_ {
        self.time_dependence.keys().copied()
    }
    /// The union of declared change columns of all parameters of each payload.
    pub fn uid_time_dependence(&self) -> BTreeMap<UniqueId, BTreeSet<usize>> {
        let mut map: BTreeMap<UniqueId, BTreeSet<usize>> = BTreeMap::new();
        for (label, columns) in &self.time_dependence {
            map.entry(label.unique_id)
                .or_default()
                .extend(columns.iter().copied());
        }
        map
    }
    /// The columns covered by the period of validity which contains `label.time_id`, in a table
    /// with `columns` columns.
    pub fn validity_period(
        &self,
        label: GlobalLabel,
        columns: usize,
    ) -> TimelineResult<RangeInclusive<usize>> {
        let changes = self
            .time_dependence(label)
            .ok_or(TimelineError::UnknownTimeDependence {
                label: label.parameter(),
            })?;
        if label.time_id >= columns {
            return Err(TimelineError::TimeIdOutOfRange {
                timeid: label.time_id,
                columns,
            });
        }
        let start = changes
            .range(..=label.time_id)
            .next_back()
            .copied()
            .unwrap_or(0);
        let end = changes
            .range(label.time_id + 1..)
            .next()
            .map(|next| next - 1)
            .unwrap_or(columns - 1)
            .min(columns - 1);
        Ok(start..=end)
    }
    /// The last column of the period of validity which contains `label.time_id`.
    pub fn validity_end(&self, label: GlobalLabel, columns: usize) -> TimelineResult<usize> {
        Ok(*self.validity_period(label, columns)?.end())
    }
    /// The label of a parameter for the period of validity containing `column`. Parameters
    /// without time dependence always get time id 0.
    pub fn label_at(
        &self,
        unique_id: UniqueId,
        element: u32,
        param: u32,
        column: usize,
    ) -> GlobalLabel {
        let label = GlobalLabel::construct(unique_id, element, param);
        let start = self
            .time_dependence(label)
            .and_then(|changes| changes.range(..=column).next_back().copied())
            .unwrap_or(0);
        label.with_time_id(start)
    }
}

/// One entry of a time-dependence configuration: the parameters in `labels` may change their
/// value at each of the events in `changes`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimedepConfig {
    /// Packed labels of the parameters (see [`GlobalLabel::label`]).
    pub labels: Vec<u64>,
    /// Events at which these parameters may change.
    pub changes: Vec<EventMetaData>,
}

impl TimedepConfig {
    /// Create a new [`TimedepConfig`] entry.
    pub fn new(labels: Vec<u64>, changes: Vec<EventMetaData>) -> Self {
        Self { labels, changes }
    }
}

/// Register the time dependence declared in `config` and return the finest-granularity list of
/// events needed to represent it.
///
/// The returned events are the sorted union of `events`, every declared change, and the first
/// event (event 0) of every run referenced by any of them. Each label of each configuration
/// entry is registered with the columns of its declared changes in the returned list. Fails
/// with [`TimelineError::TooManyColumns`] if the union has more than [`TIME_RANGE`] events, in
/// which case nothing is registered.
pub fn setup_timedep_global_labels(
    registry: &mut LabelRegistry,
    events: Vec<EventMetaData>,
    config: &[TimedepConfig],
) -> TimelineResult<Vec<EventMetaData>> {
    let mut all: BTreeSet<EventMetaData> = events.into_iter().collect();
    for entry in config {
        all.extend(entry.changes.iter().copied());
    }
    let run_starts: Vec<EventMetaData> = all.iter().map(|event| event.run_start()).collect();
    all.extend(run_starts);
    let events: Vec<EventMetaData> = all.into_iter().collect();
    check_columns(events.len())?;

    for entry in config {
        let columns: BTreeSet<usize> = entry
            .changes
            .iter()
            .map(|change| events.partition_point(|event| event < change))
            .collect();
        for label in &entry.labels {
            registry.set_time_dependence(GlobalLabel::from_label(*label), columns.iter().copied());
        }
    }
    debug!(
        events = events.len(),
        entries = config.len(),
        "registered time-dependent global labels"
    );
    Ok(events)
}

/// Fail with [`TimelineError::TooManyColumns`] if a timeline over `events` could not label
/// every column.
pub(crate) fn check_event_count(events: &[EventMetaData]) -> TimelineResult<()> {
    check_columns(events.len())
}
