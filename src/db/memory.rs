use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{Store, UnitOfWork};
use crate::error::{Error, Result};
use crate::models::{ActiveVote, PassiveVote, Vote, VoteOption};

#[derive(Debug, Default, Clone)]
struct Tables {
    votes: HashMap<String, Vote>,
    options: HashMap<String, VoteOption>,
    active_votes: HashSet<(String, String)>,
    passive_votes: HashMap<String, PassiveVote>,
}

/// Process-local store with the same constraints as the SQLite schema.
///
/// A unit of work holds the store's lock until it is committed or dropped,
/// so units never interleave.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of row writes committed so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Unit = MemoryUnit;

    async fn begin(&self) -> Result<MemoryUnit> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let work = guard.clone();
        Ok(MemoryUnit {
            guard,
            work,
            writes: 0,
            counter: Arc::clone(&self.writes),
        })
    }
}

pub struct MemoryUnit {
    guard: OwnedMutexGuard<Tables>,
    work: Tables,
    writes: usize,
    counter: Arc<AtomicUsize>,
}

impl MemoryUnit {
    fn check_machine_name(&self, vote: &Vote) -> Result<()> {
        let taken = self.work.votes.values().any(|other| {
            other.id != vote.id
                && other.system_id == vote.system_id
                && other.machine_name == vote.machine_name
        });
        if taken {
            return Err(Error::Conflict(format!(
                "machine name {:?} already used in system {}",
                vote.machine_name, vote.system_id
            )));
        }
        Ok(())
    }

    fn require_vote(&self, vote_id: &str) -> Result<()> {
        if self.work.votes.contains_key(vote_id) {
            Ok(())
        } else {
            Err(Error::NotFound(format!("vote {vote_id}")))
        }
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnit {
    async fn fetch_vote(&mut self, vote_id: &str) -> Result<Vote> {
        self.work
            .votes
            .get(vote_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("vote {vote_id}")))
    }

    async fn insert_vote(&mut self, vote: &Vote) -> Result<()> {
        if self.work.votes.contains_key(&vote.id) {
            return Err(Error::Conflict(format!("vote {} already exists", vote.id)));
        }
        self.check_machine_name(vote)?;
        self.work.votes.insert(vote.id.clone(), vote.clone());
        self.writes += 1;
        Ok(())
    }

    async fn save_vote(&mut self, vote: &Vote) -> Result<()> {
        self.require_vote(&vote.id)?;
        self.check_machine_name(vote)?;
        self.work.votes.insert(vote.id.clone(), vote.clone());
        self.writes += 1;
        Ok(())
    }

    async fn list_votes(&mut self, system_id: Option<&str>) -> Result<Vec<Vote>> {
        let mut votes: Vec<Vote> = self
            .work
            .votes
            .values()
            .filter(|vote| system_id.is_none_or(|system| vote.system_id == system))
            .cloned()
            .collect();
        votes.sort_by(|a, b| {
            (&a.system_id, &a.machine_name).cmp(&(&b.system_id, &b.machine_name))
        });
        Ok(votes)
    }

    async fn options_for_vote(&mut self, vote_id: &str) -> Result<Vec<VoteOption>> {
        let mut options: Vec<VoteOption> = self
            .work
            .options
            .values()
            .filter(|option| option.vote_id == vote_id)
            .cloned()
            .collect();
        options.sort_by_key(|option| option.number);
        Ok(options)
    }

    async fn count_options(&mut self, vote_id: &str) -> Result<u32> {
        let count = self
            .work
            .options
            .values()
            .filter(|option| option.vote_id == vote_id)
            .count();
        Ok(count as u32)
    }

    async fn option_at(&mut self, vote_id: &str, number: i64) -> Result<VoteOption> {
        self.work
            .options
            .values()
            .find(|option| option.vote_id == vote_id && option.number == number)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("option {number} of vote {vote_id}")))
    }

    async fn save_option(&mut self, option: &VoteOption) -> Result<()> {
        self.require_vote(&option.vote_id)?;
        let clash = self.work.options.values().any(|other| {
            other.id != option.id
                && other.vote_id == option.vote_id
                && other.number == option.number
        });
        if clash {
            return Err(Error::Conflict(format!(
                "option number {} already used in vote {}",
                option.number, option.vote_id
            )));
        }
        self.work.options.insert(option.id.clone(), option.clone());
        self.writes += 1;
        Ok(())
    }

    async fn delete_option(&mut self, option_id: &str) -> Result<()> {
        self.work
            .options
            .remove(option_id)
            .ok_or_else(|| Error::NotFound(format!("option {option_id}")))?;
        self.writes += 1;
        Ok(())
    }

    async fn insert_active_vote(&mut self, ballot: &ActiveVote) -> Result<()> {
        self.require_vote(&ballot.vote_id)?;
        let key = (ballot.vote_id.clone(), ballot.user_id.clone());
        if !self.work.active_votes.insert(key) {
            return Err(Error::Conflict(format!(
                "{} already voted in {}",
                ballot.user_id, ballot.vote_id
            )));
        }
        self.writes += 1;
        Ok(())
    }

    async fn has_voted(&mut self, vote_id: &str, user_id: &str) -> Result<bool> {
        Ok(self
            .work
            .active_votes
            .contains(&(vote_id.to_string(), user_id.to_string())))
    }

    async fn save_passive_vote(&mut self, vote_id: &str, turnout: &PassiveVote) -> Result<()> {
        self.require_vote(vote_id)?;
        self.work.passive_votes.insert(vote_id.to_string(), *turnout);
        self.writes += 1;
        Ok(())
    }

    async fn passive_vote(&mut self, vote_id: &str) -> Result<Option<PassiveVote>> {
        Ok(self.work.passive_votes.get(vote_id).copied())
    }

    async fn commit(self) -> Result<()> {
        let MemoryUnit {
            mut guard,
            work,
            writes,
            counter,
        } = self;
        *guard = work;
        counter.fetch_add(writes, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote(machine_name: &str) -> Vote {
        Vote::new(
            "sys".into(),
            "Test".into(),
            machine_name.into(),
            String::new(),
            "creator".into(),
        )
    }

    #[tokio::test]
    async fn dropped_unit_rolls_back() {
        let store = MemoryStore::new();
        let v = vote("first");
        {
            let mut unit = store.begin().await.unwrap();
            unit.insert_vote(&v).await.unwrap();
        }
        let mut unit = store.begin().await.unwrap();
        assert!(matches!(unit.fetch_vote(&v.id).await, Err(Error::NotFound(_))));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn committed_writes_are_visible() {
        let store = MemoryStore::new();
        let v = vote("first");
        let mut unit = store.begin().await.unwrap();
        unit.insert_vote(&v).await.unwrap();
        unit.save_option(&VoteOption::new(&v.id, 0)).await.unwrap();
        unit.commit().await.unwrap();

        let mut unit = store.begin().await.unwrap();
        assert_eq!(unit.fetch_vote(&v.id).await.unwrap(), v);
        assert_eq!(unit.count_options(&v.id).await.unwrap(), 1);
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn enforces_unique_keys() {
        let store = MemoryStore::new();
        let v = vote("same");
        let mut unit = store.begin().await.unwrap();
        unit.insert_vote(&v).await.unwrap();
        assert!(matches!(
            unit.insert_vote(&vote("same")).await,
            Err(Error::Conflict(_))
        ));

        unit.save_option(&VoteOption::new(&v.id, 0)).await.unwrap();
        assert!(matches!(
            unit.save_option(&VoteOption::new(&v.id, 0)).await,
            Err(Error::Conflict(_))
        ));
        assert!(matches!(
            unit.save_option(&VoteOption::new("missing", 0)).await,
            Err(Error::NotFound(_))
        ));
    }
}
