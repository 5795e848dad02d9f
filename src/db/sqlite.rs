use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use sqlx::{
    Row, Sqlite, Transaction,
    migrate::MigrateDatabase,
    sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow},
};

use super::{Store, UnitOfWork};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{ActiveVote, PassiveVote, Stage, Status, Vote, VoteOption};

const VOTE_COLUMNS: &str = r#"
    v.id, v.system_id, v.name, v.machine_name, v.description, v.creator_id, v.filter_id,
    v.min_votes, v.max_votes, s.stage, s.open_time, s.close_time, s.public_time
"#;

const OPTION_COLUMNS: &str =
    "id, vote_id, number, name, description, picture_url, personal_link, link_name, count";

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn connect(config: &Config) -> Result<Self> {
        let db_url = &config.database_url;

        // Create database if it doesn't exist
        if !Sqlite::database_exists(db_url).await.unwrap_or(false) {
            info!("Creating database at {}", db_url);
            Sqlite::create_database(db_url).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect(db_url)
            .await?;

        Self::init_schema(&pool).await?;

        Ok(Self { pool })
    }

    async fn init_schema(pool: &SqlitePool) -> Result<()> {
        debug!("Ensuring database schema exists");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS votes (
                id TEXT PRIMARY KEY,
                system_id TEXT NOT NULL,
                name TEXT NOT NULL,
                machine_name TEXT NOT NULL,
                description TEXT NOT NULL,
                creator_id TEXT NOT NULL,
                filter_id TEXT,
                min_votes INTEGER NOT NULL,
                max_votes INTEGER NOT NULL,
                UNIQUE (system_id, machine_name)
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS statuses (
                vote_id TEXT PRIMARY KEY,
                stage TEXT NOT NULL DEFAULT 'I',
                open_time TEXT,
                close_time TEXT,
                public_time TEXT,
                FOREIGN KEY (vote_id) REFERENCES votes(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vote_options (
                id TEXT PRIMARY KEY,
                vote_id TEXT NOT NULL,
                number INTEGER NOT NULL,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                picture_url TEXT NOT NULL DEFAULT '',
                personal_link TEXT NOT NULL DEFAULT '',
                link_name TEXT NOT NULL DEFAULT '',
                count INTEGER NOT NULL DEFAULT 0,
                UNIQUE (vote_id, number),
                FOREIGN KEY (vote_id) REFERENCES votes(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS active_votes (
                vote_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                PRIMARY KEY (vote_id, user_id),
                FOREIGN KEY (vote_id) REFERENCES votes(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS passive_votes (
                vote_id TEXT PRIMARY KEY,
                num_voters INTEGER NOT NULL,
                num_eligible INTEGER NOT NULL,
                FOREIGN KEY (vote_id) REFERENCES votes(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl Store for Database {
    type Unit = SqliteUnit;

    /// Units take the write lock up front. A deferred transaction that reads
    /// before writing cannot wait for a concurrent writer and fails with
    /// `SQLITE_BUSY` instead.
    async fn begin(&self) -> Result<SqliteUnit> {
        Ok(SqliteUnit {
            tx: self.pool.begin_with("BEGIN IMMEDIATE").await?,
        })
    }
}

/// A unit of work backed by one SQLite transaction.
pub struct SqliteUnit {
    tx: Transaction<'static, Sqlite>,
}

fn parse_time(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| Error::Storage(sqlx::Error::Decode(Box::new(e))))
    })
    .transpose()
}

fn vote_from_row(row: &SqliteRow) -> Result<Vote> {
    let stage: String = row.try_get("stage")?;
    Ok(Vote {
        id: row.try_get("id")?,
        system_id: row.try_get("system_id")?,
        name: row.try_get("name")?,
        machine_name: row.try_get("machine_name")?,
        description: row.try_get("description")?,
        creator_id: row.try_get("creator_id")?,
        filter_id: row.try_get("filter_id")?,
        min_votes: row.try_get("min_votes")?,
        max_votes: row.try_get("max_votes")?,
        status: Status {
            stage: Stage::from_code(&stage)?,
            open_time: parse_time(row.try_get("open_time")?)?,
            close_time: parse_time(row.try_get("close_time")?)?,
            public_time: parse_time(row.try_get("public_time")?)?,
        },
    })
}

fn option_from_row(row: &SqliteRow) -> Result<VoteOption> {
    Ok(VoteOption {
        id: row.try_get("id")?,
        vote_id: row.try_get("vote_id")?,
        number: row.try_get("number")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        picture_url: row.try_get("picture_url")?,
        personal_link: row.try_get("personal_link")?,
        link_name: row.try_get("link_name")?,
        count: row.try_get("count")?,
    })
}

#[async_trait]
impl UnitOfWork for SqliteUnit {
    async fn fetch_vote(&mut self, vote_id: &str) -> Result<Vote> {
        let row = sqlx::query(&format!(
            "SELECT {VOTE_COLUMNS} FROM votes v JOIN statuses s ON s.vote_id = v.id WHERE v.id = ?"
        ))
        .bind(vote_id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| Error::NotFound(format!("vote {vote_id}")))?;

        vote_from_row(&row)
    }

    async fn insert_vote(&mut self, vote: &Vote) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO votes (id, system_id, name, machine_name, description, creator_id, filter_id, min_votes, max_votes)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&vote.id)
        .bind(&vote.system_id)
        .bind(&vote.name)
        .bind(&vote.machine_name)
        .bind(&vote.description)
        .bind(&vote.creator_id)
        .bind(&vote.filter_id)
        .bind(vote.min_votes)
        .bind(vote.max_votes)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| Error::from_write(e, "vote"))?;

        sqlx::query(
            r#"
            INSERT INTO statuses (vote_id, stage, open_time, close_time, public_time)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&vote.id)
        .bind(vote.status.stage.code())
        .bind(vote.status.open_time.map(|dt| dt.to_rfc3339()))
        .bind(vote.status.close_time.map(|dt| dt.to_rfc3339()))
        .bind(vote.status.public_time.map(|dt| dt.to_rfc3339()))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| Error::from_write(e, "status"))?;

        Ok(())
    }

    async fn save_vote(&mut self, vote: &Vote) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE votes
            SET system_id = ?, name = ?, machine_name = ?, description = ?, creator_id = ?,
                filter_id = ?, min_votes = ?, max_votes = ?
            WHERE id = ?
            "#,
        )
        .bind(&vote.system_id)
        .bind(&vote.name)
        .bind(&vote.machine_name)
        .bind(&vote.description)
        .bind(&vote.creator_id)
        .bind(&vote.filter_id)
        .bind(vote.min_votes)
        .bind(vote.max_votes)
        .bind(&vote.id)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| Error::from_write(e, "vote"))?;

        if updated.rows_affected() == 0 {
            return Err(Error::NotFound(format!("vote {}", vote.id)));
        }

        sqlx::query(
            r#"
            UPDATE statuses
            SET stage = ?, open_time = ?, close_time = ?, public_time = ?
            WHERE vote_id = ?
            "#,
        )
        .bind(vote.status.stage.code())
        .bind(vote.status.open_time.map(|dt| dt.to_rfc3339()))
        .bind(vote.status.close_time.map(|dt| dt.to_rfc3339()))
        .bind(vote.status.public_time.map(|dt| dt.to_rfc3339()))
        .bind(&vote.id)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn list_votes(&mut self, system_id: Option<&str>) -> Result<Vec<Vote>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {VOTE_COLUMNS}
            FROM votes v JOIN statuses s ON s.vote_id = v.id
            WHERE ? IS NULL OR v.system_id = ?
            ORDER BY v.system_id, v.machine_name
            "#
        ))
        .bind(system_id)
        .bind(system_id)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter().map(vote_from_row).collect()
    }

    async fn options_for_vote(&mut self, vote_id: &str) -> Result<Vec<VoteOption>> {
        let rows = sqlx::query(&format!(
            "SELECT {OPTION_COLUMNS} FROM vote_options WHERE vote_id = ? ORDER BY number"
        ))
        .bind(vote_id)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter().map(option_from_row).collect()
    }

    async fn count_options(&mut self, vote_id: &str) -> Result<u32> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM vote_options WHERE vote_id = ?")
            .bind(vote_id)
            .fetch_one(&mut *self.tx)
            .await?
            .try_get("n")?;
        Ok(count as u32)
    }

    async fn option_at(&mut self, vote_id: &str, number: i64) -> Result<VoteOption> {
        let row = sqlx::query(&format!(
            "SELECT {OPTION_COLUMNS} FROM vote_options WHERE vote_id = ? AND number = ?"
        ))
        .bind(vote_id)
        .bind(number)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| Error::NotFound(format!("option {number} of vote {vote_id}")))?;

        option_from_row(&row)
    }

    async fn save_option(&mut self, option: &VoteOption) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO vote_options (id, vote_id, number, name, description, picture_url, personal_link, link_name, count)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                number = excluded.number,
                name = excluded.name,
                description = excluded.description,
                picture_url = excluded.picture_url,
                personal_link = excluded.personal_link,
                link_name = excluded.link_name,
                count = excluded.count
            "#,
        )
        .bind(&option.id)
        .bind(&option.vote_id)
        .bind(option.number)
        .bind(&option.name)
        .bind(&option.description)
        .bind(&option.picture_url)
        .bind(&option.personal_link)
        .bind(&option.link_name)
        .bind(option.count)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| Error::from_write(e, "option"))?;

        Ok(())
    }

    async fn delete_option(&mut self, option_id: &str) -> Result<()> {
        let deleted = sqlx::query("DELETE FROM vote_options WHERE id = ?")
            .bind(option_id)
            .execute(&mut *self.tx)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(Error::NotFound(format!("option {option_id}")));
        }
        Ok(())
    }

    async fn insert_active_vote(&mut self, ballot: &ActiveVote) -> Result<()> {
        sqlx::query("INSERT INTO active_votes (vote_id, user_id) VALUES (?, ?)")
            .bind(&ballot.vote_id)
            .bind(&ballot.user_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| Error::from_write(e, "ballot"))?;
        Ok(())
    }

    async fn has_voted(&mut self, vote_id: &str, user_id: &str) -> Result<bool> {
        let found = sqlx::query("SELECT 1 FROM active_votes WHERE vote_id = ? AND user_id = ?")
            .bind(vote_id)
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await?
            .is_some();
        Ok(found)
    }

    async fn save_passive_vote(&mut self, vote_id: &str, turnout: &PassiveVote) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO passive_votes (vote_id, num_voters, num_eligible)
            VALUES (?, ?, ?)
            ON CONFLICT(vote_id) DO UPDATE SET
                num_voters = excluded.num_voters,
                num_eligible = excluded.num_eligible
            "#,
        )
        .bind(vote_id)
        .bind(turnout.num_voters)
        .bind(turnout.num_eligible)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn passive_vote(&mut self, vote_id: &str) -> Result<Option<PassiveVote>> {
        let row = sqlx::query(
            "SELECT num_voters, num_eligible FROM passive_votes WHERE vote_id = ?",
        )
        .bind(vote_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(|row| -> Result<PassiveVote> {
            Ok(PassiveVote {
                num_voters: row.try_get("num_voters")?,
                num_eligible: row.try_get("num_eligible")?,
            })
        })
        .transpose()
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
