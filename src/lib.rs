//! Option ordering and mutation engine for online ballots.
//!
//! A [`voting::VoteAggregate`] keeps a vote's options densely numbered
//! `0..n` across additions, deletions and reordering, and keeps the vote's
//! selection bounds within the surviving option count. Storage is reached only
//! through the [`db::Store`] seam.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod permissions;
pub mod validation;
pub mod voting;

pub use error::{Error, Result};
