use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::event::{EventMetaData, RunId};

/// An inclusive range of runs over which a payload is valid.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntervalOfValidity {
    /// Experiment of the first valid run.
    pub experiment_low: u32,
    /// First valid run.
    pub run_low: u32,
    /// Experiment of the last valid run.
    pub experiment_high: u32,
    /// Last valid run.
    pub run_high: u32,
}

impl IntervalOfValidity {
    /// Create a new [`IntervalOfValidity`] from its first and last (experiment, run).
    pub fn new(experiment_low: u32, run_low: u32, experiment_high: u32, run_high: u32) -> Self {
        Self {
            experiment_low,
            run_low,
            experiment_high,
            run_high,
        }
    }
    /// The interval covering the whole runs of `first` through `last`.
    pub fn from_events(first: &EventMetaData, last: &EventMetaData) -> Self {
        Self::new(first.experiment, first.run, last.experiment, last.run)
    }
    /// The first run in the interval.
    pub fn first_run(&self) -> RunId {
        RunId::new(self.run_low, self.experiment_low)
    }
    /// The last run in the interval.
    pub fn last_run(&self) -> RunId {
        RunId::new(self.run_high, self.experiment_high)
    }
    /// Check whether the run of `event` lies within this interval.
    pub fn contains(&self, event: &EventMetaData) -> bool {
        let run = event.run_id();
        self.first_run() <= run && run <= self.last_run()
    }
}

impl Display for IntervalOfValidity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.experiment_low, self.run_low, self.experiment_high, self.run_high
        )
    }
}
