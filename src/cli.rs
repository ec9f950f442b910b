//! CLI definition and dispatch.

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::error::CoachError;
use crate::domain::orchestrator::{Actor, Role};

#[derive(Parser, Debug)]
#[command(name = "mtmcoach", about = "MTM task verification engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Verify a user's tasks against their trade history
    Verify {
        #[arg(short, long)]
        config: PathBuf,
        /// Target user
        #[arg(long)]
        user: i64,
        /// Verify every task of this model
        #[arg(long)]
        model: Option<i64>,
        /// Verify a single task
        #[arg(long)]
        task: Option<i64>,
        /// Evaluate only, write nothing
        #[arg(long)]
        preview: bool,
        /// Acting user; defaults to the target user
        #[arg(long)]
        actor: Option<i64>,
        #[arg(long, default_value = "member")]
        role: String,
        /// Evaluation date (YYYY-MM-DD); defaults to today
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// Re-verify every active or completed enrollment in a model (admin)
    RecalcAll {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        model: i64,
        /// Acting user; the engine rejects non-admin callers
        #[arg(long)]
        actor: i64,
        #[arg(long, default_value = "member")]
        role: String,
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// List the tasks of a model
    ListTasks {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        model: i64,
    },
    /// Create the database schema
    InitDb {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Start the web server
    Serve {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Verify {
            config,
            user,
            model,
            task,
            preview,
            actor,
            role,
            as_of,
        } => run_verify(&config, user, model, task, preview, actor, &role, as_of),
        Command::RecalcAll {
            config,
            model,
            actor,
            role,
            as_of,
        } => run_recalc_all(&config, model, actor, &role, as_of),
        Command::ListTasks { config, model } => run_list_tasks(&config, model),
        Command::InitDb { config } => run_init_db(&config),
        Command::Serve { config } => run_serve(&config),
    }
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = CoachError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn parse_role(role: &str) -> Result<Role, ExitCode> {
    match role {
        "member" => Ok(Role::Member),
        "admin" => Ok(Role::Admin),
        other => {
            eprintln!("error: unknown role '{other}' (expected member or admin)");
            Err(ExitCode::from(2))
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_verify(
    config_path: &PathBuf,
    user: i64,
    model: Option<i64>,
    task: Option<i64>,
    preview: bool,
    actor: Option<i64>,
    role: &str,
    as_of: Option<NaiveDate>,
) -> ExitCode {
    #[cfg(feature = "sqlite")]
    {
        use crate::adapters::sqlite_adapter::SqliteAdapter;
        use crate::domain::orchestrator::{Mode, Orchestrator, Scope};
        use crate::ports::config_port::ConfigPort;

        let scope = match (model, task) {
            (Some(model_id), None) => Scope::Model(model_id),
            (None, Some(task_id)) => Scope::Task(task_id),
            _ => {
                eprintln!("error: provide exactly one of --model or --task");
                return ExitCode::from(2);
            }
        };

        let role = match parse_role(role) {
            Ok(r) => r,
            Err(code) => return code,
        };

        eprintln!("Loading config from {}", config_path.display());
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(code) => return code,
        };

        let adapter = match SqliteAdapter::from_config(&config) {
            Ok(a) => a,
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::from(&e);
            }
        };

        let chunk_size = config.get_int("engine", "chunk_size", 100).max(1) as usize;
        let engine = Orchestrator::new(&adapter, &adapter, &adapter).with_chunk_size(chunk_size);
        let caller = Actor {
            user_id: actor.unwrap_or(user),
            role,
        };
        let mode = if preview { Mode::Preview } else { Mode::Run };
        let as_of = as_of.unwrap_or_else(|| Utc::now().date_naive());

        match engine.verify(&caller, user, scope, mode, as_of) {
            Ok(report) => {
                for result in &report.results {
                    let verdict = if result.passed { "PASS" } else { "FAIL" };
                    println!(
                        "{verdict}  task {} [{}] {} ({}/{} trades matched)",
                        result.task_id,
                        result.level.as_str(),
                        result.title,
                        result.matched_count,
                        result.required_count
                    );
                    if let Some(diagnostic) = &result.diagnostic {
                        println!("      rule error: {diagnostic}");
                    }
                }
                println!("{}", report.summary());
                if let Some(reason) = &report.save_error {
                    eprintln!("warning: results were not saved: {reason}");
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: {e}");
                ExitCode::from(&e)
            }
        }
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = (
            config_path, user, model, task, preview, actor, role, as_of,
        );
        eprintln!("error: sqlite feature is required for verify");
        ExitCode::from(1)
    }
}

fn run_recalc_all(
    config_path: &PathBuf,
    model: i64,
    actor: i64,
    role: &str,
    as_of: Option<NaiveDate>,
) -> ExitCode {
    #[cfg(feature = "sqlite")]
    {
        use crate::adapters::sqlite_adapter::SqliteAdapter;
        use crate::domain::orchestrator::{Orchestrator, UserOutcome};
        use crate::ports::config_port::ConfigPort;

        let role = match parse_role(role) {
            Ok(r) => r,
            Err(code) => return code,
        };

        eprintln!("Loading config from {}", config_path.display());
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(code) => return code,
        };

        let adapter = match SqliteAdapter::from_config(&config) {
            Ok(a) => a,
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::from(&e);
            }
        };

        let chunk_size = config.get_int("engine", "chunk_size", 100).max(1) as usize;
        let engine = Orchestrator::new(&adapter, &adapter, &adapter).with_chunk_size(chunk_size);
        let caller = Actor {
            user_id: actor,
            role,
        };
        let as_of = as_of.unwrap_or_else(|| Utc::now().date_naive());

        match engine.recalc_all(&caller, model, as_of) {
            Ok(batch) => {
                let mut failures = 0usize;
                for outcome in &batch.users {
                    match outcome {
                        UserOutcome::Verified(report) => {
                            println!("user {}: {}", report.user_id, report.summary());
                        }
                        UserOutcome::Failed { user_id, reason } => {
                            failures += 1;
                            println!("user {user_id}: FAILED ({reason})");
                        }
                    }
                }
                println!(
                    "model {}: {} users processed, {} failed{}",
                    batch.model_id,
                    batch.users.len(),
                    failures,
                    if batch.dry_run {
                        " [dry run, nothing saved]"
                    } else {
                        ""
                    }
                );
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: {e}");
                ExitCode::from(&e)
            }
        }
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = (config_path, model, actor, role, as_of);
        eprintln!("error: sqlite feature is required for recalc-all");
        ExitCode::from(1)
    }
}

fn run_list_tasks(config_path: &PathBuf, model: i64) -> ExitCode {
    #[cfg(feature = "sqlite")]
    {
        use crate::adapters::sqlite_adapter::SqliteAdapter;
        use crate::ports::catalog_port::CatalogPort;

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(code) => return code,
        };

        let adapter = match SqliteAdapter::from_config(&config) {
            Ok(a) => a,
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::from(&e);
            }
        };

        match adapter.list_tasks(model) {
            Ok(tasks) => {
                for task in tasks {
                    println!("{}  [{}] {}", task.id, task.level.as_str(), task.title);
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: {e}");
                ExitCode::from(&e)
            }
        }
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = (config_path, model);
        eprintln!("error: sqlite feature is required for list-tasks");
        ExitCode::from(1)
    }
}

fn run_init_db(config_path: &PathBuf) -> ExitCode {
    #[cfg(feature = "sqlite")]
    {
        use crate::adapters::sqlite_adapter::SqliteAdapter;

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(code) => return code,
        };

        let adapter = match SqliteAdapter::from_config(&config) {
            Ok(a) => a,
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::from(&e);
            }
        };

        let result = adapter
            .initialize_schema()
            .and_then(|()| adapter.initialize_progress_schema());
        match result {
            Ok(()) => {
                eprintln!("Schema initialized");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: {e}");
                ExitCode::from(&e)
            }
        }
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = config_path;
        eprintln!("error: sqlite feature is required for init-db");
        ExitCode::from(1)
    }
}

fn run_serve(config_path: &PathBuf) -> ExitCode {
    #[cfg(feature = "web")]
    {
        use crate::adapters::sqlite_adapter::SqliteAdapter;
        use crate::adapters::web::{build_router, AppState};
        use crate::ports::config_port::ConfigPort;
        use std::net::SocketAddr;
        use std::sync::Arc;

        eprintln!("Loading config from {}", config_path.display());
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(code) => return code,
        };

        let adapter = match SqliteAdapter::from_config(&config) {
            Ok(a) => Arc::new(a),
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::from(&e);
            }
        };

        let addr: SocketAddr = config
            .get_string("web", "listen")
            .unwrap_or_else(|| "127.0.0.1:3000".to_string())
            .parse()
            .unwrap_or_else(|_| "127.0.0.1:3000".parse().unwrap());

        let chunk_size = config.get_int("engine", "chunk_size", 100).max(1) as usize;

        eprintln!("Starting web server on {addr}");

        let state = AppState {
            catalog: adapter.clone(),
            ledger: adapter.clone(),
            progress: adapter,
            chunk_size,
        };
        let router = build_router(state);

        tokio::runtime::Runtime::new()
            .unwrap()
            .block_on(async {
                let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
                axum::serve(listener, router).await.unwrap();
            });

        ExitCode::SUCCESS
    }

    #[cfg(not(feature = "web"))]
    {
        let _ = config_path;
        eprintln!("error: web feature is required for serve");
        ExitCode::from(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recalc_all_role_defaults_to_member() {
        let cli = Cli::try_parse_from([
            "mtmcoach",
            "recalc-all",
            "--config",
            "coach.ini",
            "--model",
            "1",
            "--actor",
            "99",
        ])
        .unwrap();
        match cli.command {
            Command::RecalcAll { role, .. } => assert_eq!(role, "member"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn recalc_all_accepts_an_admin_role() {
        let cli = Cli::try_parse_from([
            "mtmcoach",
            "recalc-all",
            "--config",
            "coach.ini",
            "--model",
            "1",
            "--actor",
            "99",
            "--role",
            "admin",
        ])
        .unwrap();
        match cli.command {
            Command::RecalcAll { role, .. } => assert_eq!(role, "admin"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parse_role_rejects_unknown_labels() {
        assert!(parse_role("member").is_ok());
        assert!(parse_role("admin").is_ok());
        assert!(parse_role("owner").is_err());
    }
}
