use std::{collections::BTreeMap, fmt::Debug, sync::Arc};

use dyn_clone::DynClone;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{
    event::EventMetaData, iov::IntervalOfValidity, labels::GlobalLabel, TimelineError,
    TimelineResult, UniqueId,
};

/// A payload object (a set of detector constants) which exposes its contents as global
/// parameters addressed by (element, param).
///
/// Implementors must be [`Clone`] so that unloaded templates can be turned into fresh payloads
/// and so that payloads can be handed out on release without giving up the timeline's own copy.
pub trait GlobalParamSet: DynClone + Debug + Send + Sync {
    /// The unique id of this payload type.
    fn unique_id(&self) -> UniqueId;
    /// The current value of a parameter. Parameters which were never set read as `0.0`.
    fn global_param(&self, element: u32, param: u32) -> f64;
    /// Overwrite the value of a parameter.
    fn set_global_param(&mut self, value: f64, element: u32, param: u32);
    /// Add a correction to the current value of a parameter.
    fn update_global_param(&mut self, correction: f64, element: u32, param: u32) {
        let value = self.global_param(element, param);
        self.set_global_param(value + correction, element, param);
    }
    /// All (element, param) pairs this payload currently holds.
    fn list_global_params(&self) -> Vec<(u32, u32)>;
}

dyn_clone::clone_trait_object!(GlobalParamSet);

/// A shared handle to a payload object. Every table cell which refers to the same payload holds a
/// clone of the same handle, so a mutation through one of them is seen by all of them.
pub type PayloadHandle = Arc<RwLock<Box<dyn GlobalParamSet>>>;

/// Wrap a payload object in a new [`PayloadHandle`].
pub fn new_handle(payload: Box<dyn GlobalParamSet>) -> PayloadHandle {
    Arc::new(RwLock::new(payload))
}

/// A general-purpose payload: a table of `f64` constants keyed by (element, param).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignmentConstants {
    unique_id: UniqueId,
    values: BTreeMap<(u32, u32), f64>,
}

impl AlignmentConstants {
    /// An empty payload with the given unique id.
    pub fn new(unique_id: UniqueId) -> Self {
        Self {
            unique_id,
            values: BTreeMap::new(),
        }
    }
    /// Builder-style setter for a single parameter.
    pub fn with(mut self, element: u32, param: u32, value: f64) -> Self {
        self.values.insert((element, param), value);
        self
    }
}

impl GlobalParamSet for AlignmentConstants {
    fn unique_id(&self) -> UniqueId {
        self.unique_id
    }
    fn global_param(&self, element: u32, param: u32) -> f64 {
        self.values.get(&(element, param)).copied().unwrap_or(0.0)
    }
    fn set_global_param(&mut self, value: f64, element: u32, param: u32) {
        self.values.insert((element, param), value);
    }
    fn list_global_params(&self) -> Vec<(u32, u32)> {
        self.values.keys().copied().collect()
    }
}

/// The collection of payload types taking part in a calibration.
///
/// Each entry is an unloaded template. The [`GlobalParamTimeLine`](crate::GlobalParamTimeLine)
/// asks for a fresh payload per period of validity via [`GlobalParamVector::construct`], so the
/// templates themselves are never loaded or shared.
#[derive(Clone, Debug, Default)]
pub struct GlobalParamVector {
    templates: IndexMap<UniqueId, Box<dyn GlobalParamSet>>,
}

impl GlobalParamVector {
    /// Add a payload template. A template with the same unique id is replaced.
    pub fn add_param_set<T: GlobalParamSet + 'static>(&mut self, template: T) -> &mut Self {
        self.templates
            .insert(template.unique_id(), Box::new(template));
        self
    }
    /// Check whether a template for `uid` is present.
    pub fn contains(&self, uid: UniqueId) -> bool {
        self.templates.contains_key(&uid)
    }
    /// The unique ids of all templates, in insertion order.
    pub fn unique_ids(&self) -> impl Iterator<Item = UniqueId> + '_ {
        self.templates.keys().copied()
    }
    /// The number of templates.
    pub fn len(&self) -> usize {
        self.templates.len()
    }
    /// Check whether there are no templates.
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
    /// Construct a new payload for `uid` from its template.
    pub fn construct(&self, uid: UniqueId) -> TimelineResult<PayloadHandle> {
        let template = self
            .templates
            .get(&uid)
            .ok_or(TimelineError::UnknownUniqueId { uid })?;
        Ok(new_handle(dyn_clone::clone_box(&**template)))
    }
    /// Time-independent labels of every parameter held by the templates.
    pub fn list_global_params(&self) -> Vec<GlobalLabel> {
        self.templates
            .iter()
            .flat_map(|(uid, template)| {
                template
                    .list_global_params()
                    .into_iter()
                    .map(move |(element, param)| GlobalLabel::construct(*uid, element, param))
            })
            .collect()
    }
}

/// A payload which changes within a run: a sequence of payloads, each valid from an event
/// number onwards.
#[derive(Clone, Debug)]
pub struct EventDependency {
    entries: Vec<(u32, Box<dyn GlobalParamSet>)>,
}

impl EventDependency {
    /// Start with a payload valid from the first event of the run.
    pub fn new(first: Box<dyn GlobalParamSet>) -> Self {
        Self {
            entries: vec![(0, first)],
        }
    }
    /// Add a payload which is valid from event number `event` onwards.
    pub fn add(&mut self, event: u32, payload: Box<dyn GlobalParamSet>) {
        let position = self.entries.partition_point(|(start, _)| *start <= event);
        self.entries.insert(position, (event, payload));
    }
    /// The payload valid for event number `event`.
    pub fn object_at(&self, event: u32) -> &(dyn GlobalParamSet + 'static) {
        let position = self.entries.partition_point(|(start, _)| *start <= event);
        &*self.entries[position.saturating_sub(1)].1
    }
    /// The event numbers at which a new payload takes over.
    pub fn event_numbers(&self) -> Vec<u32> {
        self.entries.iter().map(|(event, _)| *event).collect()
    }
    /// The number of payloads.
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    /// Always `false`, as an [`EventDependency`] starts with a payload.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A payload handed out by
/// [`release_objects`](crate::GlobalParamTimeLine::release_objects).
#[derive(Clone, Debug)]
pub enum ReleasedPayload {
    /// A payload valid throughout its interval of validity.
    Single(Box<dyn GlobalParamSet>),
    /// A payload which changes within the run.
    EventDependent(EventDependency),
}

impl ReleasedPayload {
    /// The unique id of the released payload.
    pub fn unique_id(&self) -> UniqueId {
        self.object_at(0).unique_id()
    }
    /// The payload valid for event number `event`.
    pub fn object_at(&self, event: u32) -> &(dyn GlobalParamSet + 'static) {
        match self {
            ReleasedPayload::Single(payload) => &**payload,
            ReleasedPayload::EventDependent(dependency) => dependency.object_at(event),
        }
    }
}

/// One released payload together with where it is valid.
#[derive(Clone, Debug)]
pub struct ReleasedObject {
    /// The runs over which the payload is valid.
    pub iov: IntervalOfValidity,
    /// The first event at which the payload is valid.
    pub since: EventMetaData,
    /// The payload itself.
    pub payload: ReleasedPayload,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn alignment_constants_update_and_set() {
        let mut constants = AlignmentConstants::new(3).with(1, 2, 0.25);
        assert_eq!(constants.unique_id(), 3);
        assert_relative_eq!(constants.global_param(1, 2), 0.25);
        assert_relative_eq!(constants.global_param(7, 7), 0.0);
        constants.update_global_param(0.5, 1, 2);
        assert_relative_eq!(constants.global_param(1, 2), 0.75);
        constants.set_global_param(-1.0, 1, 2);
        assert_relative_eq!(constants.global_param(1, 2), -1.0);
        constants.update_global_param(0.1, 4, 1);
        assert_eq!(constants.list_global_params(), vec![(1, 2), (4, 1)]);
    }

    #[test]
    fn vector_constructs_independent_payloads() {
        let mut vector = GlobalParamVector::default();
        vector
            .add_param_set(AlignmentConstants::new(1).with(0, 1, 1.0))
            .add_param_set(AlignmentConstants::new(2));
        assert_eq!(vector.len(), 2);
        assert_eq!(vector.unique_ids().collect::<Vec<_>>(), vec![1, 2]);

        let a = vector.construct(1).unwrap();
        let b = vector.construct(1).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        a.write().update_global_param(1.0, 0, 1);
        assert_relative_eq!(a.read().global_param(0, 1), 2.0);
        assert_relative_eq!(b.read().global_param(0, 1), 1.0);

        assert_eq!(
            vector.construct(9).err(),
            Some(TimelineError::UnknownUniqueId { uid: 9 })
        );
        assert_eq!(
            vector.list_global_params(),
            vec![GlobalLabel::construct(1, 0, 1)]
        );
    }

    #[test]
    fn event_dependency_lookup() {
        let mut dependency =
            EventDependency::new(Box::new(AlignmentConstants::new(1).with(0, 0, 1.0)));
        dependency.add(1000, Box::new(AlignmentConstants::new(1).with(0, 0, 3.0)));
        dependency.add(500, Box::new(AlignmentConstants::new(1).with(0, 0, 2.0)));
        assert_eq!(dependency.event_numbers(), vec![0, 500, 1000]);
        assert_relative_eq!(dependency.object_at(0).global_param(0, 0), 1.0);
        assert_relative_eq!(dependency.object_at(499).global_param(0, 0), 1.0);
        assert_relative_eq!(dependency.object_at(500).global_param(0, 0), 2.0);
        assert_relative_eq!(dependency.object_at(1200).global_param(0, 0), 3.0);

        let released = ReleasedPayload::EventDependent(dependency);
        assert_eq!(released.unique_id(), 1);
        assert_relative_eq!(released.object_at(750).global_param(0, 0), 2.0);
    }
}
