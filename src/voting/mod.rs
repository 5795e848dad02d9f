mod ordering;

use log::{info, warn};

use crate::db::{Store, UnitOfWork};
use crate::error::{Error, Result};
use crate::models::{ActiveVote, PassiveVote, Stage, Vote, VoteOption};
use crate::permissions::Identity;
use crate::validation::NameValidator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// Towards rank 0.
    Down,
    /// Towards the highest rank.
    Up,
}

/// A vote and the operations that keep its option set consistent.
///
/// Every mutating operation runs in its own unit of work: it reloads the vote,
/// applies the change, and commits, or leaves the store untouched on error.
/// The cached [`Vote`] is refreshed after each successful commit.
pub struct VoteAggregate<'s, S: Store> {
    store: &'s S,
    vote: Vote,
}

impl<'s, S: Store> VoteAggregate<'s, S> {
    /// Persist a new vote in the INIT stage with no options.
    pub async fn create(
        store: &'s S,
        vote: Vote,
        validator: &impl NameValidator,
    ) -> Result<Self> {
        validator.check("machine_name", &vote.machine_name)?;
        if vote.status.stage != Stage::Init {
            return Err(Error::InvalidState(
                "new votes must start in the Init stage".to_string(),
            ));
        }
        check_bounds(vote.min_votes, vote.max_votes, 0)?;

        let mut unit = store.begin().await?;
        unit.insert_vote(&vote).await?;
        unit.commit().await?;

        info!("Created vote {} ({})", vote.id, vote);
        Ok(Self { store, vote })
    }

    pub async fn load(store: &'s S, vote_id: &str) -> Result<Self> {
        let mut unit = store.begin().await?;
        let vote = unit.fetch_vote(vote_id).await?;
        Ok(Self { store, vote })
    }

    pub fn vote(&self) -> &Vote {
        &self.vote
    }

    pub fn can_edit(&self, identity: &impl Identity) -> bool {
        self.vote.can_edit(identity)
    }

    /// Whether the cached vote was still in INIT when this aggregate last read
    /// or wrote it. Another aggregate may have advanced the stage since; use
    /// [`VoteAggregate::is_modifiable`] for the stored answer. Structural
    /// operations always check the stored stage themselves.
    pub fn can_be_modified(&self) -> bool {
        self.vote.can_be_modified()
    }

    /// Reload the vote and report whether it can still be modified.
    pub async fn is_modifiable(&mut self) -> Result<bool> {
        let mut unit = self.store.begin().await?;
        self.vote = unit.fetch_vote(&self.vote.id).await?;
        Ok(self.vote.can_be_modified())
    }

    /// Current options, ordered by rank.
    pub async fn options(&self) -> Result<Vec<VoteOption>> {
        let mut unit = self.store.begin().await?;
        unit.options_for_vote(&self.vote.id).await
    }

    /// Restore a dense `0..n` numbering. Allowed in any stage; a second call
    /// writes nothing.
    pub async fn renumber_options(&mut self) -> Result<()> {
        let mut unit = self.store.begin().await?;
        let vote = unit.fetch_vote(&self.vote.id).await?;
        let (_, changed) = ordering::renumber(&mut unit, &vote.id).await?;
        unit.commit().await?;

        if changed > 0 {
            info!("Renumbered {} option(s) of vote {}", changed, vote.id);
        }
        self.vote = vote;
        Ok(())
    }

    /// Append a new option after the current last one.
    pub async fn add_option(&mut self) -> Result<VoteOption> {
        let mut unit = self.store.begin().await?;
        let vote = unit.fetch_vote(&self.vote.id).await?;
        ensure_modifiable(&vote)?;

        let (options, _) = ordering::renumber(&mut unit, &vote.id).await?;
        let option = VoteOption::new(&vote.id, options.len() as i64);
        unit.save_option(&option).await?;
        unit.commit().await?;

        info!("Added option {} to vote {}", option, vote.id);
        self.vote = vote;
        Ok(option)
    }

    /// Remove `option`, lower the selection bounds if they now exceed the
    /// option count, and close the gap in the numbering.
    pub async fn delete_option(&mut self, option: &VoteOption) -> Result<()> {
        let mut unit = self.store.begin().await?;
        let mut vote = unit.fetch_vote(&self.vote.id).await?;
        ensure_modifiable(&vote)?;
        ensure_member(&mut unit, &vote, option).await?;

        unit.delete_option(&option.id).await?;

        let count = unit.count_options(&vote.id).await?;
        if vote.clamp_bounds(count) {
            info!(
                "Clamped bounds of vote {} to {}..={}",
                vote.id, vote.min_votes, vote.max_votes
            );
        }
        unit.save_vote(&vote).await?;

        ordering::renumber(&mut unit, &vote.id).await?;
        unit.commit().await?;

        info!("Deleted option {} from vote {}", option.id, vote.id);
        self.vote = vote;
        Ok(())
    }

    /// Swap `option` with the option ranked directly below it. No-op at rank 0.
    pub async fn move_down_option(&mut self, option: &VoteOption) -> Result<()> {
        self.move_option(option, Direction::Down).await
    }

    /// Swap `option` with the option ranked directly above it. No-op at the top.
    pub async fn move_up_option(&mut self, option: &VoteOption) -> Result<()> {
        self.move_option(option, Direction::Up).await
    }

    async fn move_option(&mut self, option: &VoteOption, direction: Direction) -> Result<()> {
        let mut unit = self.store.begin().await?;
        let vote = unit.fetch_vote(&self.vote.id).await?;
        ensure_modifiable(&vote)?;
        ensure_member(&mut unit, &vote, option).await?;

        let (options, _) = ordering::renumber(&mut unit, &vote.id).await?;
        // The caller's copy may predate the renumbering.
        let current = options
            .iter()
            .find(|o| o.id == option.id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("option {}", option.id)))?;
        let last = options.len() as i64 - 1;

        let neighbour_number = match direction {
            Direction::Down if current.number == 0 => None,
            Direction::Down => Some(current.number - 1),
            Direction::Up if current.number == last => None,
            Direction::Up => Some(current.number + 1),
        };

        if let Some(number) = neighbour_number {
            let neighbour = unit.option_at(&vote.id, number).await?;
            ordering::swap(&mut unit, current.clone(), neighbour).await?;
            info!(
                "Moved option {} of vote {} from {} to {}",
                current.id, vote.id, current.number, number
            );
        }
        unit.commit().await?;

        self.vote = vote;
        Ok(())
    }

    /// Validate and store a new machine name.
    pub async fn set_machine_name(
        &mut self,
        machine_name: &str,
        validator: &impl NameValidator,
    ) -> Result<()> {
        validator.check("machine_name", machine_name)?;

        let mut unit = self.store.begin().await?;
        let mut vote = unit.fetch_vote(&self.vote.id).await?;
        vote.machine_name = machine_name.to_string();
        unit.save_vote(&vote).await?;
        unit.commit().await?;

        self.vote = vote;
        Ok(())
    }

    /// Set how many options a ballot may select.
    pub async fn set_vote_bounds(&mut self, min_votes: u32, max_votes: u32) -> Result<()> {
        let mut unit = self.store.begin().await?;
        let mut vote = unit.fetch_vote(&self.vote.id).await?;
        ensure_modifiable(&vote)?;
        let count = unit.count_options(&vote.id).await?;
        check_bounds(min_votes, max_votes, count)?;

        vote.min_votes = min_votes;
        vote.max_votes = max_votes;
        unit.save_vote(&vote).await?;
        unit.commit().await?;

        self.vote = vote;
        Ok(())
    }

    /// Move the vote to its next stage. Driven by the external scheduler.
    pub async fn advance_stage(&mut self) -> Result<Stage> {
        let mut unit = self.store.begin().await?;
        let mut vote = unit.fetch_vote(&self.vote.id).await?;
        let stage = vote.status.advance()?;
        unit.save_vote(&vote).await?;
        unit.commit().await?;

        info!("Vote {} is now {}", vote.id, stage.label());
        self.vote = vote;
        Ok(stage)
    }

    /// Record that `user_id` has cast a ballot. Only possible while open.
    pub async fn record_ballot(&self, user_id: &str) -> Result<()> {
        let mut unit = self.store.begin().await?;
        let vote = unit.fetch_vote(&self.vote.id).await?;
        if vote.status.stage != Stage::Open {
            return Err(Error::InvalidState(format!(
                "vote {} is not open ({})",
                vote.id,
                vote.status.stage.label()
            )));
        }
        unit.insert_active_vote(&ActiveVote {
            vote_id: vote.id.clone(),
            user_id: user_id.to_string(),
        })
        .await?;
        unit.commit().await
    }

    pub async fn has_voted(&self, user_id: &str) -> Result<bool> {
        let mut unit = self.store.begin().await?;
        unit.has_voted(&self.vote.id, user_id).await
    }

    pub async fn record_turnout(&self, num_voters: u32, num_eligible: u32) -> Result<()> {
        if num_voters > num_eligible {
            return Err(Error::validation(
                "num_voters",
                format!("{num_voters} voters exceed {num_eligible} eligible"),
            ));
        }
        let mut unit = self.store.begin().await?;
        unit.fetch_vote(&self.vote.id).await?;
        unit.save_passive_vote(
            &self.vote.id,
            &PassiveVote {
                num_voters,
                num_eligible,
            },
        )
        .await?;
        unit.commit().await
    }

    pub async fn turnout(&self) -> Result<Option<PassiveVote>> {
        let mut unit = self.store.begin().await?;
        unit.passive_vote(&self.vote.id).await
    }
}

fn ensure_modifiable(vote: &Vote) -> Result<()> {
    if vote.can_be_modified() {
        Ok(())
    } else {
        warn!(
            "Rejected structural change to vote {} in stage {}",
            vote.id,
            vote.status.stage.label()
        );
        Err(Error::InvalidState(format!(
            "vote {} can no longer be modified ({})",
            vote.id,
            vote.status.stage.label()
        )))
    }
}

async fn ensure_member<U: UnitOfWork>(unit: &mut U, vote: &Vote, option: &VoteOption) -> Result<()> {
    let options = unit.options_for_vote(&vote.id).await?;
    if options.iter().any(|o| o.id == option.id) {
        Ok(())
    } else {
        warn!("Option {} does not belong to vote {}", option.id, vote.id);
        Err(Error::InvalidArgument(format!(
            "option {} does not belong to vote {}",
            option.id, vote.id
        )))
    }
}

fn check_bounds(min_votes: u32, max_votes: u32, count: u32) -> Result<()> {
    if min_votes > max_votes {
        return Err(Error::validation(
            "min_votes",
            format!("{min_votes} is greater than max_votes {max_votes}"),
        ));
    }
    if max_votes > count {
        return Err(Error::validation(
            "max_votes",
            format!("{max_votes} exceeds the {count} available option(s)"),
        ));
    }
    Ok(())
}
