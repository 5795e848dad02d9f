mod memory;
mod sqlite;

pub use memory::{MemoryStore, MemoryUnit};
pub use sqlite::{Database, SqliteUnit};

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ActiveVote, PassiveVote, Vote, VoteOption};

/// A source of units of work. Each unit is an isolated transaction.
#[async_trait]
pub trait Store: Send + Sync {
    type Unit: UnitOfWork;

    async fn begin(&self) -> Result<Self::Unit>;
}

/// One transaction against the store.
///
/// Writes become visible to other units only after [`UnitOfWork::commit`].
/// Dropping a unit without committing discards everything it wrote.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Fetch a vote together with its status. Fails with `NotFound`.
    async fn fetch_vote(&mut self, vote_id: &str) -> Result<Vote>;

    /// Insert a new vote and its status. `(system_id, machine_name)` must be unique.
    async fn insert_vote(&mut self, vote: &Vote) -> Result<()>;

    /// Update an existing vote's fields and status.
    async fn save_vote(&mut self, vote: &Vote) -> Result<()>;

    /// All votes, optionally restricted to one system.
    async fn list_votes(&mut self, system_id: Option<&str>) -> Result<Vec<Vote>>;

    /// Options of a vote ordered by `number` ascending.
    async fn options_for_vote(&mut self, vote_id: &str) -> Result<Vec<VoteOption>>;

    async fn count_options(&mut self, vote_id: &str) -> Result<u32>;

    /// The option ranked `number` within a vote. Fails with `NotFound`.
    async fn option_at(&mut self, vote_id: &str, number: i64) -> Result<VoteOption>;

    /// Insert or update an option. `(vote_id, number)` must be unique.
    async fn save_option(&mut self, option: &VoteOption) -> Result<()>;

    async fn delete_option(&mut self, option_id: &str) -> Result<()>;

    /// Record a cast ballot. A second record for the same user is a `Conflict`.
    async fn insert_active_vote(&mut self, ballot: &ActiveVote) -> Result<()>;

    async fn has_voted(&mut self, vote_id: &str, user_id: &str) -> Result<bool>;

    async fn save_passive_vote(&mut self, vote_id: &str, turnout: &PassiveVote) -> Result<()>;

    async fn passive_vote(&mut self, vote_id: &str) -> Result<Option<PassiveVote>>;

    async fn commit(self) -> Result<()>;
}
