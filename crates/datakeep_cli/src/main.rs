//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `datakeep_core` linkage.
//! - Stage, commit and query a few records against an in-memory SQLite store.
//!
//! Usage: `datakeep_cli [config.json]`. When the config names a `log_dir`,
//! file logging is enabled before anything else runs.

use datakeep_core::db::open_db_in_memory;
use datakeep_core::{
    init_logging, DataKeepConfig, Entity, OrderDirection, RecordId, Repository, RuleQuery,
    Specification, SqliteStore,
};
use log::info;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::process::ExitCode;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Task {
    record_id: RecordId,
    title: String,
    priority: i64,
    done: bool,
}

impl Entity for Task {
    fn record_id(&self) -> RecordId {
        self.record_id
    }

    fn set_record_id(&mut self, id: RecordId) {
        self.record_id = id;
    }
}

fn task(title: &str, priority: i64, done: bool) -> Task {
    Task {
        record_id: 0,
        title: title.to_string(),
        priority,
        done,
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("datakeep_cli error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => DataKeepConfig::load(path)?,
        None => DataKeepConfig::default(),
    };
    if config.logging.log_dir.is_some() {
        init_logging(&config.logging)?;
    }
    println!("datakeep_core version={}", datakeep_core::core_version());

    let conn = open_db_in_memory()?;
    let store = SqliteStore::<Task>::try_new(&conn, "tasks")?
        .with_options(config.store.clone())
        .with_rule(
            "open_tasks",
            RuleQuery::Many(
                "SELECT record_id, payload FROM records
                 WHERE collection = 'tasks' AND json_extract(payload, '$.done') = 0
                 ORDER BY record_id ASC;"
                    .to_string(),
            ),
        );
    let mut repo = Repository::new(store);

    repo.add_entities(vec![
        task("write release notes", 2, false).into(),
        task("tag version", 1, true).into(),
        task("announce", 3, false).into(),
    ])?;
    let counts = repo.save_changes()?;
    info!(
        "event=cli_seed module=cli status=ok added={} instance={}",
        counts.additions,
        repo.instance_id()
    );

    let by_priority = Specification::lambda(|t: &Task| !t.done)
        .order_by(|t: &Task| t.priority, OrderDirection::Descending);
    for record in repo.find_all_matching(&by_priority)? {
        println!("open {}", serde_json::to_string(&record.snapshot())?);
    }

    if let Some(outcome) = repo.execute(&Specification::business_rule(
        "open_tasks",
        Vec::<i64>::new(),
    ))? {
        println!("rule open_tasks count={}", outcome.into_vec().len());
    }
    Ok(())
}
