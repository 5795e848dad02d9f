use log::error;
use serde_json::json;
use std::env;
use std::io::{self, Write};
use trusty_ballot::config::Config;
use trusty_ballot::db::{Database, Store, UnitOfWork};
use trusty_ballot::voting::VoteAggregate;

const USAGE: &str = "usage: vote-admin <list [system-id] | show <vote-id> | normalize <vote-id>>";

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(2);
        }
    };

    let database = match Database::connect(&config).await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let args: Vec<String> = env::args().skip(1).collect();
    if let Err(e) = run(&database, &args, &mut io::stdout().lock()).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(
    database: &Database,
    args: &[String],
    out: &mut impl Write,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    match args.first().map(String::as_str) {
        Some("list") => {
            let mut unit = database.begin().await?;
            let votes = unit.list_votes(args.get(1).map(String::as_str)).await?;
            for vote in votes {
                writeln!(out, "{}\t{}\t{}", vote.id, vote.status.stage.label(), vote)?;
            }
        }
        Some("show") => {
            let vote_id = args.get(1).ok_or(USAGE)?;
            let vote = VoteAggregate::load(database, vote_id).await?;
            let options = vote.options().await?;
            let turnout = vote.turnout().await?;
            let report = json!({
                "vote": vote.vote(),
                "options": options,
                "turnout": turnout,
            });
            writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
        }
        Some("normalize") => {
            let vote_id = args.get(1).ok_or(USAGE)?;
            let mut vote = VoteAggregate::load(database, vote_id).await?;
            vote.renumber_options().await?;
            let count = vote.options().await?.len();
            writeln!(out, "Options of {} are numbered 0..{}", vote.vote(), count)?;
        }
        _ => return Err(USAGE.into()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use trusty_ballot::models::{Vote, VoteOption};

    async fn memory_db() -> Database {
        let config = Config {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 1,
        };
        Database::connect(&config).await.unwrap()
    }

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn normalize_reports_the_new_numbering() {
        let db = memory_db().await;
        let vote = Vote::new(
            "sys".into(),
            "Board election".into(),
            "board".into(),
            "desc".into(),
            "creator".into(),
        );
        let mut unit = db.begin().await.unwrap();
        unit.insert_vote(&vote).await.unwrap();
        for number in [7, 3] {
            unit.save_option(&VoteOption::new(&vote.id, number)).await.unwrap();
        }
        unit.commit().await.unwrap();

        let mut out = Vec::new();
        run(&db, &args(&["normalize", vote.id.as_str()]), &mut out)
            .await
            .unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Options of [board] Board election are numbered 0..2\n"
        );
        let mut unit = db.begin().await.unwrap();
        let numbers: Vec<i64> = unit
            .options_for_vote(&vote.id)
            .await
            .unwrap()
            .iter()
            .map(|o| o.number)
            .collect();
        assert_eq!(numbers, vec![0, 1]);
    }

    #[tokio::test]
    async fn unknown_command_prints_usage() {
        let db = memory_db().await;
        let mut out = Vec::new();
        let err = run(&db, &args(&["frobnicate"]), &mut out)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), USAGE);
        assert!(out.is_empty());
    }
}
