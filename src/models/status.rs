use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Lifecycle position of a vote. Transitions only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    Init,
    Staged,
    Open,
    Close,
    Public,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Init,
        Stage::Staged,
        Stage::Open,
        Stage::Close,
        Stage::Public,
    ];

    /// Single-letter storage code.
    pub fn code(self) -> &'static str {
        match self {
            Stage::Init => "I",
            Stage::Staged => "S",
            Stage::Open => "O",
            Stage::Close => "C",
            Stage::Public => "P",
        }
    }

    pub fn from_code(code: &str) -> Result<Self> {
        match code {
            "I" => Ok(Stage::Init),
            "S" => Ok(Stage::Staged),
            "O" => Ok(Stage::Open),
            "C" => Ok(Stage::Close),
            "P" => Ok(Stage::Public),
            other => Err(Error::validation("stage", format!("unknown stage code {other:?}"))),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::Init => "Init",
            Stage::Staged => "Staged",
            Stage::Open => "Open",
            Stage::Close => "Close",
            Stage::Public => "Results public",
        }
    }

    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Init => Some(Stage::Staged),
            Stage::Staged => Some(Stage::Open),
            Stage::Open => Some(Stage::Close),
            Stage::Close => Some(Stage::Public),
            Stage::Public => None,
        }
    }
}

/// Stage plus the scheduled transition times of a vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub stage: Stage,
    pub open_time: Option<DateTime<Utc>>,
    pub close_time: Option<DateTime<Utc>>,
    pub public_time: Option<DateTime<Utc>>,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            stage: Stage::Init,
            open_time: None,
            close_time: None,
            public_time: None,
        }
    }
}

impl Status {
    /// Move to the immediately following stage.
    pub fn transition_to(&mut self, target: Stage) -> Result<()> {
        if self.stage.next() != Some(target) {
            return Err(Error::InvalidState(format!(
                "cannot move from {} to {}",
                self.stage.label(),
                target.label()
            )));
        }
        self.stage = target;
        Ok(())
    }

    pub fn advance(&mut self) -> Result<Stage> {
        let next = self.stage.next().ok_or_else(|| {
            Error::InvalidState(format!("{} is the final stage", self.stage.label()))
        })?;
        self.transition_to(next)?;
        Ok(next)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.stage.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for stage in Stage::ALL {
            assert_eq!(Stage::from_code(stage.code()).unwrap(), stage);
        }
        assert!(Stage::from_code("X").is_err());
    }

    #[test]
    fn advances_through_every_stage_in_order() {
        let mut status = Status::default();
        let mut seen = vec![status.stage];
        while let Ok(stage) = status.advance() {
            seen.push(stage);
        }
        assert_eq!(seen, Stage::ALL.to_vec());
        assert!(matches!(status.advance(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn rejects_backward_and_skipping_transitions() {
        let mut status = Status::default();
        status.transition_to(Stage::Staged).unwrap();
        assert!(status.transition_to(Stage::Init).is_err());
        assert!(status.transition_to(Stage::Staged).is_err());
        assert!(status.transition_to(Stage::Close).is_err());
        assert_eq!(status.stage, Stage::Staged);
        assert_eq!(status.to_string(), "S");
    }
}
