use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// A point in time as recorded by the data acquisition: an event number within a run within an
/// experiment.
///
/// The ordering is lexicographic in (experiment, run, event), which follows from the order in
/// which the fields are declared. Construct it with [`EventMetaData::new`], whose arguments follow
/// the usual (event, run, experiment) convention.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventMetaData {
    /// The experiment number.
    pub experiment: u32,
    /// The run number within the experiment.
    pub run: u32,
    /// The event number within the run.
    pub event: u32,
}

impl EventMetaData {
    /// Create a new [`EventMetaData`] from an event, run and experiment number.
    pub fn new(event: u32, run: u32, experiment: u32) -> Self {
        Self {
            experiment,
            run,
            event,
        }
    }
    /// The first event of the run this event belongs to.
    pub fn run_start(&self) -> Self {
        Self {
            event: 0,
            ..*self
        }
    }
    /// The run (and experiment) this event belongs to.
    pub fn run_id(&self) -> RunId {
        RunId {
            experiment: self.experiment,
            run: self.run,
        }
    }
}

impl Display for EventMetaData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(event: {}, run: {}, exp: {})",
            self.event, self.run, self.experiment
        )
    }
}

/// A run within an experiment, ordered by experiment first.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId {
    /// The experiment number.
    pub experiment: u32,
    /// The run number within the experiment.
    pub run: u32,
}

impl RunId {
    /// Create a new [`RunId`] from a run and experiment number.
    pub fn new(run: u32, experiment: u32) -> Self {
        Self { experiment, run }
    }
}

impl Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(run: {}, exp: {})", self.run, self.experiment)
    }
}

impl From<EventMetaData> for RunId {
    fn from(event: EventMetaData) -> Self {
        event.run_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_experiment_run_event() {
        let a = EventMetaData::new(999, 0, 0);
        let b = EventMetaData::new(0, 1, 0);
        let c = EventMetaData::new(0, 0, 1);
        assert!(a < b);
        assert!(b < c);
        assert!(EventMetaData::new(111, 0, 0) > EventMetaData::new(0, 0, 0));

        let mut events = vec![c, a, b, EventMetaData::new(0, 3, 0)];
        events.sort();
        assert_eq!(events, vec![a, b, EventMetaData::new(0, 3, 0), c]);
    }

    #[test]
    fn run_projection() {
        let event = EventMetaData::new(42, 7, 3);
        assert_eq!(event.run_id(), RunId::new(7, 3));
        assert_eq!(event.run_start(), EventMetaData::new(0, 7, 3));
        assert!(RunId::new(100, 0) < RunId::new(0, 1));
    }

    #[test]
    fn displays() {
        assert_eq!(
            format!("{}", EventMetaData::new(1, 2, 3)),
            "(event: 1, run: 2, exp: 3)"
        );
        assert_eq!(format!("{}", RunId::new(2, 3)), "(run: 2, exp: 3)");
    }
}
