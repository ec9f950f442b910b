//! SQLite storage adapter for the task catalog, trade ledger and progress
//! records.
//!
//! Progress storage is optional: a database provisioned with only the
//! catalog and ledger tables still serves evaluations, and the engine
//! degrades to dry-run. [`SqliteAdapter::is_provisioned`] probes for the
//! progress tables on each call rather than caching a flag.

use crate::domain::error::CoachError;
use crate::domain::progress::{Enrollment, EnrollmentStatus, ProgressStatus, TaskProgress};
use crate::domain::task::{Task, TaskLevel};
use crate::domain::trade::Trade;
use crate::ports::catalog_port::CatalogPort;
use crate::ports::config_port::ConfigPort;
use crate::ports::ledger_port::LedgerPort;
use crate::ports::progress_port::ProgressPort;
use chrono::{DateTime, NaiveDate, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Row};

const DATE_FMT: &str = "%Y-%m-%d";

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

fn pool_err(e: r2d2::Error) -> CoachError {
    CoachError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> CoachError {
    CoachError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn parse_date(value: &str, index: usize) -> Result<NaiveDate, rusqlite::Error> {
    NaiveDate::parse_from_str(value, DATE_FMT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_timestamp(value: &str, index: usize) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                index,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, CoachError> {
        let db_path =
            config
                .get_string("database", "path")
                .ok_or_else(|| CoachError::ConfigMissing {
                    section: "database".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("database", "pool_size", 4) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_err)?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, CoachError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_err)?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>, CoachError> {
        self.pool.get().map_err(pool_err)
    }

    /// Create the catalog and ledger tables.
    pub fn initialize_schema(&self) -> Result<(), CoachError> {
        let conn = self.conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS models (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY,
                model_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                level TEXT NOT NULL DEFAULT 'moderate',
                display_order INTEGER NOT NULL DEFAULT 0,
                rules_json TEXT NOT NULL DEFAULT '{}',
                advanced_json TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_model ON tasks(model_id);
            CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                symbol TEXT NOT NULL,
                entry_price REAL NOT NULL,
                stop_loss REAL,
                target_price REAL,
                exit_price REAL,
                outcome TEXT NOT NULL DEFAULT '',
                entry_date TEXT NOT NULL,
                exit_date TEXT,
                position_percent REAL,
                analysis_link TEXT,
                deleted INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_trades_user ON trades(user_id);",
        )
        .map_err(query_err)?;

        Ok(())
    }

    /// Create the progress tables. Kept separate from [`initialize_schema`]
    /// so a catalog-only deployment is representable.
    pub fn initialize_progress_schema(&self) -> Result<(), CoachError> {
        let conn = self.conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS task_progress (
                user_id INTEGER NOT NULL,
                task_id INTEGER NOT NULL,
                status TEXT NOT NULL,
                evidence_count INTEGER NOT NULL DEFAULT 0,
                last_checked_at TEXT NOT NULL,
                details TEXT NOT NULL DEFAULT '',
                PRIMARY KEY (user_id, task_id)
            );
            CREATE TABLE IF NOT EXISTS enrollments (
                user_id INTEGER NOT NULL,
                model_id INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                progress_pct INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (user_id, model_id)
            );
            CREATE INDEX IF NOT EXISTS idx_enrollments_model ON enrollments(model_id, status);",
        )
        .map_err(query_err)?;

        Ok(())
    }

    pub fn insert_model(&self, id: i64, name: &str) -> Result<(), CoachError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO models (id, name) VALUES (?1, ?2)",
            params![id, name],
        )
        .map_err(query_err)?;
        Ok(())
    }

    pub fn insert_task(&self, task: &Task) -> Result<(), CoachError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO tasks
                (id, model_id, title, level, display_order, rules_json, advanced_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                task.id,
                task.model_id,
                task.title,
                task.level.as_str(),
                task.display_order,
                task.rules_json,
                task.advanced_json
            ],
        )
        .map_err(query_err)?;
        Ok(())
    }

    pub fn insert_trades(&self, trades: &[Trade]) -> Result<(), CoachError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        for trade in trades {
            tx.execute(
                "INSERT OR REPLACE INTO trades
                    (id, user_id, symbol, entry_price, stop_loss, target_price, exit_price,
                     outcome, entry_date, exit_date, position_percent, analysis_link, deleted)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 0)",
                params![
                    trade.id,
                    trade.user_id,
                    trade.symbol,
                    trade.entry_price,
                    trade.stop_loss,
                    trade.target_price,
                    trade.exit_price,
                    trade.outcome,
                    trade.entry_date.format(DATE_FMT).to_string(),
                    trade.exit_date.map(|d| d.format(DATE_FMT).to_string()),
                    trade.position_percent,
                    trade.analysis_link
                ],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        Ok(())
    }

    pub fn soft_delete_trade(&self, trade_id: i64) -> Result<(), CoachError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE trades SET deleted = 1 WHERE id = ?1",
            params![trade_id],
        )
        .map_err(query_err)?;
        Ok(())
    }

    pub fn upsert_enrollment(&self, enrollment: &Enrollment) -> Result<(), CoachError> {
        let conn = self.conn()?;
        upsert_enrollment_on(&conn, enrollment).map_err(query_err)
    }

    pub fn get_progress(
        &self,
        user_id: i64,
        task_id: i64,
    ) -> Result<Option<TaskProgress>, CoachError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT user_id, task_id, status, evidence_count, last_checked_at, details
             FROM task_progress WHERE user_id = ?1 AND task_id = ?2",
            params![user_id, task_id],
            progress_from_row,
        )
        .optional()
        .map_err(query_err)
    }

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |_| Ok(()),
        )
        .optional()
        .map(|found| found.is_some())
        .unwrap_or(false)
    }
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let level: String = row.get(3)?;
    Ok(Task {
        id: row.get(0)?,
        model_id: row.get(1)?,
        title: row.get(2)?,
        level: TaskLevel::parse(&level),
        display_order: row.get(4)?,
        rules_json: row.get(5)?,
        advanced_json: row.get(6)?,
    })
}

fn trade_from_row(row: &Row<'_>) -> rusqlite::Result<Trade> {
    let entry_date: String = row.get(8)?;
    let exit_date: Option<String> = row.get(9)?;
    Ok(Trade {
        id: row.get(0)?,
        user_id: row.get(1)?,
        symbol: row.get(2)?,
        entry_price: row.get(3)?,
        stop_loss: row.get(4)?,
        target_price: row.get(5)?,
        exit_price: row.get(6)?,
        outcome: row.get(7)?,
        entry_date: parse_date(&entry_date, 8)?,
        exit_date: exit_date.as_deref().map(|d| parse_date(d, 9)).transpose()?,
        position_percent: row.get(10)?,
        analysis_link: row.get(11)?,
    })
}

fn progress_from_row(row: &Row<'_>) -> rusqlite::Result<TaskProgress> {
    let status: String = row.get(2)?;
    let checked: String = row.get(4)?;
    Ok(TaskProgress {
        user_id: row.get(0)?,
        task_id: row.get(1)?,
        status: ProgressStatus::parse(&status),
        evidence_count: row.get::<_, i64>(3)? as u32,
        last_checked_at: parse_timestamp(&checked, 4)?,
        details: row.get(5)?,
    })
}

fn enrollment_from_row(row: &Row<'_>) -> rusqlite::Result<Enrollment> {
    let status: String = row.get(2)?;
    let status = EnrollmentStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown enrollment status: {status}").into(),
        )
    })?;
    Ok(Enrollment {
        user_id: row.get(0)?,
        model_id: row.get(1)?,
        status,
        progress_pct: row.get::<_, i64>(3)?.clamp(0, 100) as u8,
    })
}

fn upsert_enrollment_on(conn: &Connection, enrollment: &Enrollment) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO enrollments (user_id, model_id, status, progress_pct)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_id, model_id)
         DO UPDATE SET status = excluded.status, progress_pct = excluded.progress_pct",
        params![
            enrollment.user_id,
            enrollment.model_id,
            enrollment.status.as_str(),
            enrollment.progress_pct as i64
        ],
    )?;
    Ok(())
}

impl CatalogPort for SqliteAdapter {
    fn model_exists(&self, model_id: i64) -> Result<bool, CoachError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT 1 FROM models WHERE id = ?1",
            params![model_id],
            |_| Ok(()),
        )
        .optional()
        .map(|found| found.is_some())
        .map_err(query_err)
    }

    fn get_task(&self, task_id: i64) -> Result<Option<Task>, CoachError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, model_id, title, level, display_order, rules_json, advanced_json
             FROM tasks WHERE id = ?1",
            params![task_id],
            task_from_row,
        )
        .optional()
        .map_err(query_err)
    }

    fn list_tasks(&self, model_id: i64) -> Result<Vec<Task>, CoachError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, model_id, title, level, display_order, rules_json, advanced_json
                 FROM tasks WHERE model_id = ?1 ORDER BY display_order, id",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(params![model_id], task_from_row)
            .map_err(query_err)?;

        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row.map_err(query_err)?);
        }
        Ok(tasks)
    }
}

impl LedgerPort for SqliteAdapter {
    fn trades_for_user(&self, user_id: i64) -> Result<Vec<Trade>, CoachError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, symbol, entry_price, stop_loss, target_price, exit_price,
                        outcome, entry_date, exit_date, position_percent, analysis_link
                 FROM trades WHERE user_id = ?1 AND deleted = 0 ORDER BY entry_date, id",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(params![user_id], trade_from_row)
            .map_err(query_err)?;

        let mut trades = Vec::new();
        for row in rows {
            trades.push(row.map_err(query_err)?);
        }
        Ok(trades)
    }
}

impl ProgressPort for SqliteAdapter {
    fn is_provisioned(&self) -> bool {
        match self.conn() {
            Ok(conn) => {
                Self::table_exists(&conn, "task_progress")
                    && Self::table_exists(&conn, "enrollments")
            }
            Err(_) => false,
        }
    }

    fn progress_for(&self, user_id: i64, model_id: i64) -> Result<Vec<TaskProgress>, CoachError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT p.user_id, p.task_id, p.status, p.evidence_count,
                        p.last_checked_at, p.details
                 FROM task_progress p
                 JOIN tasks t ON t.id = p.task_id
                 WHERE p.user_id = ?1 AND t.model_id = ?2",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(params![user_id, model_id], progress_from_row)
            .map_err(query_err)?;

        let mut progress = Vec::new();
        for row in rows {
            progress.push(row.map_err(query_err)?);
        }
        Ok(progress)
    }

    fn get_enrollment(
        &self,
        user_id: i64,
        model_id: i64,
    ) -> Result<Option<Enrollment>, CoachError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT user_id, model_id, status, progress_pct
             FROM enrollments WHERE user_id = ?1 AND model_id = ?2",
            params![user_id, model_id],
            enrollment_from_row,
        )
        .optional()
        .map_err(query_err)
    }

    fn active_enrollments(
        &self,
        model_id: i64,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Enrollment>, CoachError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT user_id, model_id, status, progress_pct
                 FROM enrollments
                 WHERE model_id = ?1 AND status IN ('active', 'completed')
                 ORDER BY user_id
                 LIMIT ?2 OFFSET ?3",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(
                params![model_id, limit as i64, offset as i64],
                enrollment_from_row,
            )
            .map_err(query_err)?;

        let mut enrollments = Vec::new();
        for row in rows {
            enrollments.push(row.map_err(query_err)?);
        }
        Ok(enrollments)
    }

    fn save_user_outcome(
        &self,
        rows: &[TaskProgress],
        enrollment: Option<&Enrollment>,
    ) -> Result<(), CoachError> {
        if !self.is_provisioned() {
            return Err(CoachError::StorageUnavailable {
                reason: "progress tables are not provisioned".into(),
            });
        }

        let persist_err = |e: rusqlite::Error| CoachError::Persistence {
            reason: e.to_string(),
        };

        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(persist_err)?;

        for row in rows {
            tx.execute(
                "INSERT INTO task_progress
                    (user_id, task_id, status, evidence_count, last_checked_at, details)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(user_id, task_id)
                 DO UPDATE SET status = excluded.status,
                               evidence_count = excluded.evidence_count,
                               last_checked_at = excluded.last_checked_at,
                               details = excluded.details",
                params![
                    row.user_id,
                    row.task_id,
                    row.status.as_str(),
                    row.evidence_count as i64,
                    row.last_checked_at.to_rfc3339(),
                    row.details
                ],
            )
            .map_err(persist_err)?;
        }

        if let Some(enrollment) = enrollment {
            upsert_enrollment_on(&tx, enrollment).map_err(persist_err)?;
        }

        tx.commit().map_err(persist_err)
    }
}
