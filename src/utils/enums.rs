use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::TimelineError;

/// How a correction is applied to a global parameter.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorrectionMode {
    /// Add the correction to the current value.
    #[default]
    Add,
    /// Overwrite the current value with the correction (used for uncertainties and other
    /// auxiliary values rather than nominal constants).
    Reset,
}
impl Display for CorrectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CorrectionMode::Add => write!(f, "add"),
            CorrectionMode::Reset => write!(f, "reset"),
        }
    }
}
impl FromStr for CorrectionMode {
    type Err = TimelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "add" | "update" | "+" => Ok(Self::Add),
            "reset" | "set" | "=" => Ok(Self::Reset),
            _ => Err(TimelineError::ParseError {
                name: s.to_string(),
                object: "CorrectionMode".to_string(),
            }),
        }
    }
}
impl From<bool> for CorrectionMode {
    fn from(reset: bool) -> Self {
        if reset {
            Self::Reset
        } else {
            Self::Add
        }
    }
}

/// The lifecycle of a [`GlobalParamTimeLine`](crate::GlobalParamTimeLine).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimelineState {
    /// Payloads exist but hold their template values.
    Built,
    /// Payloads were loaded from a store (corrections may have been applied since).
    Loaded,
    /// Payloads were handed out for storage.
    Released,
}
impl Display for TimelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimelineState::Built => write!(f, "Built"),
            TimelineState::Loaded => write!(f, "Loaded"),
            TimelineState::Released => write!(f, "Released"),
        }
    }
}
impl FromStr for TimelineState {
    type Err = TimelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "built" => Ok(Self::Built),
            "loaded" => Ok(Self::Loaded),
            "released" => Ok(Self::Released),
            _ => Err(TimelineError::ParseError {
                name: s.to_string(),
                object: "TimelineState".to_string(),
            }),
        }
    }
}
