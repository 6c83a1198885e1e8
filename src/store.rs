use std::collections::BTreeMap;

use tracing::debug;

use crate::{
    event::EventMetaData,
    iov::IntervalOfValidity,
    params::{GlobalParamSet, ReleasedObject, ReleasedPayload},
    TimelineError, TimelineResult, UniqueId,
};

/// A source of payload contents, usually a conditions database.
///
/// Loading may involve a round trip to a remote service, so callers should expect it to be slow.
pub trait PayloadStore: Send + Sync {
    /// Fetch the payload with unique id `uid` valid at `event`.
    fn load(&self, uid: UniqueId, event: &EventMetaData) -> TimelineResult<Box<dyn GlobalParamSet>>;
}

/// An in-process [`PayloadStore`].
///
/// Payloads are stored per unique id with their interval of validity and the first event from
/// which they apply. Among the stored payloads whose interval contains an event and which already
/// apply at it, the one with the latest starting event wins, and among equals the most recently
/// stored one, as with a database which layers newer payloads over older ones. Event-dependent
/// payloads are resolved by event number.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    payloads: BTreeMap<UniqueId, Vec<StoredPayload>>,
}

#[derive(Clone, Debug)]
struct StoredPayload {
    iov: IntervalOfValidity,
    since: EventMetaData,
    payload: ReleasedPayload,
}

impl MemoryStore {
    /// Store a payload valid over the whole runs of `iov`.
    pub fn store<T: GlobalParamSet + 'static>(&mut self, iov: IntervalOfValidity, payload: T) {
        self.store_payload(iov, ReleasedPayload::Single(Box::new(payload)));
    }
    /// Store a single or event-dependent payload valid over the whole runs of `iov`.
    pub fn store_payload(&mut self, iov: IntervalOfValidity, payload: ReleasedPayload) {
        let since = EventMetaData::new(0, iov.run_low, iov.experiment_low);
        self.store_since(iov, since, payload);
    }
    fn store_since(
        &mut self,
        iov: IntervalOfValidity,
        since: EventMetaData,
        payload: ReleasedPayload,
    ) {
        self.payloads
            .entry(payload.unique_id())
            .or_default()
            .push(StoredPayload {
                iov,
                since,
                payload,
            });
    }
    /// Store every object released by a timeline.
    pub fn store_released<I>(&mut self, objects: I)
    where
        I: IntoIterator<Item = ReleasedObject>,
    {
        let mut count = 0usize;
        for object in objects {
            self.store_since(object.iov, object.since, object.payload);
            count += 1;
        }
        debug!(count, "stored released payloads");
    }
    /// The number of stored payloads over all unique ids.
    pub fn len(&self) -> usize {
        self.payloads.values().map(Vec::len).sum()
    }
    /// Check whether nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PayloadStore for MemoryStore {
    fn load(
        &self,
        uid: UniqueId,
        event: &EventMetaData,
    ) -> TimelineResult<Box<dyn GlobalParamSet>> {
        self.payloads
            .get(&uid)
            .and_then(|entries| {
                entries
                    .iter()
                    .enumerate()
                    .filter(|(_, stored)| stored.iov.contains(event) && stored.since <= *event)
                    .max_by_key(|(position, stored)| (stored.since, *position))
            })
            .map(|(_, stored)| dyn_clone::clone_box(stored.payload.object_at(event.event)))
            .ok_or(TimelineError::PayloadNotFound { uid, event: *event })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{AlignmentConstants, EventDependency};
    use approx::assert_relative_eq;

    #[test]
    fn newest_payload_wins() {
        let mut store = MemoryStore::default();
        store.store(
            IntervalOfValidity::new(0, 0, 0, 10),
            AlignmentConstants::new(1).with(0, 0, 1.0),
        );
        store.store(
            IntervalOfValidity::new(0, 5, 0, 6),
            AlignmentConstants::new(1).with(0, 0, 2.0),
        );
        assert_eq!(store.len(), 2);
        let early = store.load(1, &EventMetaData::new(0, 2, 0)).unwrap();
        let late = store.load(1, &EventMetaData::new(0, 5, 0)).unwrap();
        assert_relative_eq!(early.global_param(0, 0), 1.0);
        assert_relative_eq!(late.global_param(0, 0), 2.0);
    }

    #[test]
    fn missing_payloads() {
        let mut store = MemoryStore::default();
        assert!(store.is_empty());
        store.store(IntervalOfValidity::new(0, 0, 0, 1), AlignmentConstants::new(1));
        assert_eq!(
            store.load(1, &EventMetaData::new(0, 2, 0)).err(),
            Some(TimelineError::PayloadNotFound {
                uid: 1,
                event: EventMetaData::new(0, 2, 0)
            })
        );
        assert!(store.load(2, &EventMetaData::new(0, 0, 0)).is_err());
    }

    #[test]
    fn released_payloads_split_runs() {
        let mut store = MemoryStore::default();
        store.store_released(vec![
            ReleasedObject {
                iov: IntervalOfValidity::new(0, 0, 0, 0),
                since: EventMetaData::new(0, 0, 0),
                payload: ReleasedPayload::Single(Box::new(
                    AlignmentConstants::new(2).with(0, 1, 1.0),
                )),
            },
            ReleasedObject {
                iov: IntervalOfValidity::new(0, 0, 0, 0),
                since: EventMetaData::new(200, 0, 0),
                payload: ReleasedPayload::Single(Box::new(
                    AlignmentConstants::new(2).with(0, 1, 2.0),
                )),
            },
        ]);
        let early = store.load(2, &EventMetaData::new(199, 0, 0)).unwrap();
        let late = store.load(2, &EventMetaData::new(200, 0, 0)).unwrap();
        assert_relative_eq!(early.global_param(0, 1), 1.0);
        assert_relative_eq!(late.global_param(0, 1), 2.0);
    }

    #[test]
    fn event_dependent_payloads() {
        let mut dependency =
            EventDependency::new(Box::new(AlignmentConstants::new(4).with(1, 1, 1.0)));
        dependency.add(100, Box::new(AlignmentConstants::new(4).with(1, 1, 5.0)));
        let mut store = MemoryStore::default();
        store.store_payload(
            IntervalOfValidity::new(0, 3, 0, 3),
            ReleasedPayload::EventDependent(dependency),
        );
        let before = store.load(4, &EventMetaData::new(99, 3, 0)).unwrap();
        let after = store.load(4, &EventMetaData::new(100, 3, 0)).unwrap();
        assert_relative_eq!(before.global_param(1, 1), 1.0);
        assert_relative_eq!(after.global_param(1, 1), 5.0);
    }
}
