mod status;

pub use status::{Stage, Status};

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::permissions::Identity;

/// A single ballot definition belonging to a voting system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub id: String,
    pub system_id: String,
    pub name: String,
    pub machine_name: String,
    pub description: String,
    pub creator_id: String,
    /// Eligibility filter, resolved elsewhere.
    pub filter_id: Option<String>,
    pub min_votes: u32,
    pub max_votes: u32,
    pub status: Status,
}

impl Vote {
    pub fn new(
        system_id: String,
        name: String,
        machine_name: String,
        description: String,
        creator_id: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            system_id,
            name,
            machine_name,
            description,
            creator_id,
            filter_id: None,
            min_votes: 0,
            max_votes: 0,
            status: Status::default(),
        }
    }

    /// Whether `identity` administers the system this vote belongs to.
    pub fn can_edit(&self, identity: &impl Identity) -> bool {
        identity.is_admin_for(&self.system_id)
    }

    /// Structural edits to the option set are only allowed before staging.
    pub fn can_be_modified(&self) -> bool {
        self.status.stage == Stage::Init
    }

    /// Lower the selection bounds so neither exceeds `count`. Never raises them.
    /// Returns true if anything changed.
    pub(crate) fn clamp_bounds(&mut self, count: u32) -> bool {
        let mut changed = false;
        if self.min_votes > count {
            self.min_votes = count;
            changed = true;
        }
        if self.max_votes > count {
            self.max_votes = count;
            changed = true;
        }
        changed
    }
}

impl fmt::Display for Vote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.machine_name, self.name)
    }
}

/// One selectable choice within a vote, ranked by `number`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteOption {
    pub id: String,
    pub vote_id: String,
    pub number: i64,
    pub name: String,
    pub description: String,
    pub picture_url: String,
    pub personal_link: String,
    pub link_name: String,
    /// Tally accumulator. Renumbering must leave it untouched.
    pub count: i64,
}

impl VoteOption {
    /// A fresh option at `number` with the default display name.
    pub fn new(vote_id: &str, number: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            vote_id: vote_id.to_string(),
            number,
            name: format!("Option #{}", number + 1),
            description: String::new(),
            picture_url: String::new(),
            personal_link: String::new(),
            link_name: String::new(),
            count: 0,
        }
    }

    pub fn can_edit(&self, identity: &impl Identity, vote: &Vote) -> bool {
        self.vote_id == vote.id && vote.can_edit(identity)
    }
}

impl fmt::Display for VoteOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.number, self.name)
    }
}

/// Marks that `user_id` has cast a ballot in `vote_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveVote {
    pub vote_id: String,
    pub user_id: String,
}

impl fmt::Display for ActiveVote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} voted for {}", self.user_id, self.vote_id)
    }
}

/// Turnout snapshot for a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassiveVote {
    pub num_voters: u32,
    pub num_eligible: u32,
}

impl fmt::Display for PassiveVote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} voted", self.num_voters, self.num_eligible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Admin(&'static str);

    impl Identity for Admin {
        fn is_admin_for(&self, system_id: &str) -> bool {
            self.0 == system_id
        }
    }

    fn sample_vote() -> Vote {
        Vote::new(
            "sys".into(),
            "Board election".into(),
            "board".into(),
            String::new(),
            "alice".into(),
        )
    }

    #[test]
    fn new_option_gets_one_based_display_name() {
        let option = VoteOption::new("v", 3);
        assert_eq!(option.name, "Option #4");
        assert_eq!(option.count, 0);
        assert_eq!(option.to_string(), "[3] Option #4");
    }

    #[test]
    fn clamp_only_lowers() {
        let mut vote = sample_vote();
        vote.min_votes = 2;
        vote.max_votes = 3;
        assert!(vote.clamp_bounds(2));
        assert_eq!((vote.min_votes, vote.max_votes), (2, 2));
        assert!(!vote.clamp_bounds(10));
        assert_eq!((vote.min_votes, vote.max_votes), (2, 2));
    }

    #[test]
    fn edit_rights_follow_the_system() {
        let vote = sample_vote();
        let option = VoteOption::new(&vote.id, 0);
        assert!(vote.can_edit(&Admin("sys")));
        assert!(!vote.can_edit(&Admin("other")));
        assert!(option.can_edit(&Admin("sys"), &vote));

        let foreign = VoteOption::new("elsewhere", 0);
        assert!(!foreign.can_edit(&Admin("sys"), &vote));
    }

    #[test]
    fn display_renderings() {
        let vote = sample_vote();
        assert_eq!(vote.to_string(), "[board] Board election");
        let turnout = PassiveVote {
            num_voters: 3,
            num_eligible: 10,
        };
        assert_eq!(turnout.to_string(), "3 of 10 voted");
        let ballot = ActiveVote {
            vote_id: "v1".into(),
            user_id: "bob".into(),
        };
        assert_eq!(ballot.to_string(), "bob voted for v1");
    }
}
