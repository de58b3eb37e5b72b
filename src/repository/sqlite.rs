//! SQLite implementation of the repository traits.
//!
//! Persistent storage that survives service restarts. Transitions run
//! inside rusqlite transactions so the precondition check and the write
//! (including the declined-reason insert/delete) see one consistent
//! snapshot, which is what makes concurrent conflicting transitions
//! serialize correctly.
//!
//! # Schema versioning
//!
//! A `schema_version` table tracks the schema. To change the schema,
//! increment `CURRENT_SCHEMA_VERSION` and add a step in `run_migrations`;
//! migrations run sequentially from the stored version to the target.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use super::{
    CommentOutcome, HelpDeskRepository, NewHelpRequest, RepositoryError, RequestFilter,
    TransitionOutcome,
};
use crate::auth::{AuthRepository, TokenRecord, UserRecord};
use crate::lifecycle::state::{
    ActorId, Comment, CommentId, DeclinedReason, HelpRequest, Priority, RequestId, Status,
};

/// Current schema version. Increment when making schema changes and add
/// corresponding migration logic in `run_migrations`.
const CURRENT_SCHEMA_VERSION: i64 = 1;

/// SQLite-backed repository.
///
/// Synchronous rusqlite operations run under `tokio::task::spawn_blocking`
/// so they never block the async runtime.
pub struct SqliteRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    /// Open (or create) the database at `path` and bring the schema up to
    /// date.
    ///
    /// The database is configured with `journal_mode = WAL` for crash
    /// safety under concurrent access, `busy_timeout = 5000ms`, and
    /// `foreign_keys = ON` so request deletion cascades to reasons and
    /// comments at the storage layer.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let path_ref = path.as_ref();
        let path_str = path_ref.to_string_lossy();

        if path_str != ":memory:" && !path_str.is_empty() {
            if let Some(parent) = path_ref.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        RepositoryError::storage(
                            "create database directory",
                            format!("{}: {}", parent.display(), e),
                        )
                    })?;
                }
            }
        }

        let conn = Connection::open(path_ref)
            .map_err(|e| RepositoryError::storage("open database", e.to_string()))?;

        // WAL can be silently refused on filesystems without shared-memory
        // support; verify what SQLite actually selected. In-memory
        // databases report "memory", which is fine for tests.
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| RepositoryError::storage("set journal_mode", e.to_string()))?;
        let is_in_memory = path_str == ":memory:";
        let journal_mode_ok = journal_mode.eq_ignore_ascii_case("wal")
            || (is_in_memory && journal_mode.eq_ignore_ascii_case("memory"));
        if !journal_mode_ok {
            return Err(RepositoryError::storage(
                "configure journal_mode",
                format!("WAL mode unavailable, SQLite selected '{journal_mode}'"),
            ));
        }

        conn.execute_batch(
            r#"
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;
            PRAGMA foreign_keys = ON;
            "#,
        )
        .map_err(|e| RepositoryError::storage("configure pragmas", e.to_string()))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| RepositoryError::storage("create schema_version table", e.to_string()))?;

        let current_version: i64 = conn
            .query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RepositoryError::storage("get schema version", e.to_string()))?
            .unwrap_or(0);

        Self::run_migrations(&conn, current_version)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create a new in-memory SQLite repository (for testing).
    pub fn new_in_memory() -> Result<Self, RepositoryError> {
        Self::new(":memory:")
    }

    fn run_migrations(conn: &Connection, from_version: i64) -> Result<(), RepositoryError> {
        if from_version > CURRENT_SCHEMA_VERSION {
            return Err(RepositoryError::storage(
                "schema version",
                format!(
                    "database schema version {from_version} is newer than supported \
                     version {CURRENT_SCHEMA_VERSION}; upgrade the application"
                ),
            ));
        }
        if from_version == CURRENT_SCHEMA_VERSION {
            return Ok(());
        }

        if from_version < 1 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS help_requests (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    subject TEXT NOT NULL,
                    text TEXT NOT NULL,
                    requester INTEGER NOT NULL,
                    priority TEXT NOT NULL,
                    status TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS declined_reasons (
                    request_id INTEGER PRIMARY KEY
                        REFERENCES help_requests(id) ON DELETE CASCADE,
                    comment TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS comments (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    request_id INTEGER NOT NULL
                        REFERENCES help_requests(id) ON DELETE CASCADE,
                    author INTEGER NOT NULL,
                    message TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    username TEXT NOT NULL UNIQUE,
                    password_digest TEXT NOT NULL,
                    is_admin INTEGER NOT NULL DEFAULT 0
                );

                CREATE TABLE IF NOT EXISTS tokens (
                    key TEXT PRIMARY KEY,
                    user_id INTEGER NOT NULL
                        REFERENCES users(id) ON DELETE CASCADE,
                    last_seen TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_requests_status
                    ON help_requests(status);
                CREATE INDEX IF NOT EXISTS idx_requests_requester
                    ON help_requests(requester);
                CREATE INDEX IF NOT EXISTS idx_comments_request
                    ON comments(request_id, id);
                "#,
            )
            .map_err(|e| RepositoryError::storage("migration v1", e.to_string()))?;
        }

        conn.execute(
            "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?1)",
            params![CURRENT_SCHEMA_VERSION],
        )
        .map_err(|e| RepositoryError::storage("update schema version", e.to_string()))?;

        Ok(())
    }
}

// =============================================================================
// Row conversion helpers
// =============================================================================

const REQUEST_COLUMNS: &str =
    "id, subject, text, requester, priority, status, created_at, updated_at";

type RequestRow = (i64, String, String, i64, String, String, String, String);

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| RepositoryError::corruption("timestamp"))
}

fn request_from_row(row: RequestRow) -> Result<HelpRequest, RepositoryError> {
    let (id, subject, text, requester, priority, status, created_at, updated_at) = row;
    Ok(HelpRequest {
        id: RequestId(id),
        subject,
        text,
        requester: ActorId(requester),
        priority: priority
            .parse::<Priority>()
            .map_err(|_| RepositoryError::corruption("priority"))?,
        status: status
            .parse::<Status>()
            .map_err(|_| RepositoryError::corruption("status"))?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn get_request_row(
    tx: &Transaction<'_>,
    id: RequestId,
    operation: &'static str,
) -> Result<Option<RequestRow>, RepositoryError> {
    tx.query_row(
        &format!("SELECT {REQUEST_COLUMNS} FROM help_requests WHERE id = ?1"),
        params![id.0],
        |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
            ))
        },
    )
    .optional()
    .map_err(|e| RepositoryError::storage(operation, e.to_string()))
}

/// Shared shape of the transition methods: open a transaction, read the
/// status, apply `write` if the precondition holds, commit.
fn run_transition<F>(
    conn: &Arc<Mutex<Connection>>,
    id: RequestId,
    from: Vec<Status>,
    operation: &'static str,
    write: F,
) -> Result<TransitionOutcome, RepositoryError>
where
    F: FnOnce(&Transaction<'_>, &HelpRequest) -> Result<HelpRequest, RepositoryError>,
{
    let mut conn = conn.lock().unwrap();
    let tx = conn
        .transaction()
        .map_err(|e| RepositoryError::storage(operation, e.to_string()))?;

    let Some(row) = get_request_row(&tx, id, operation)? else {
        return Ok(TransitionOutcome::NotFound);
    };
    let request = request_from_row(row)?;

    if !from.contains(&request.status) {
        return Ok(TransitionOutcome::PreconditionFailed {
            current: request.status,
        });
    }

    let updated = write(&tx, &request)?;
    tx.commit()
        .map_err(|e| RepositoryError::storage(operation, e.to_string()))?;
    Ok(TransitionOutcome::Applied(updated))
}

fn set_status(
    tx: &Transaction<'_>,
    request: &HelpRequest,
    to: Status,
    operation: &'static str,
) -> Result<HelpRequest, RepositoryError> {
    let now = Utc::now();
    tx.execute(
        "UPDATE help_requests SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![to.as_str(), now.to_rfc3339(), request.id.0],
    )
    .map_err(|e| RepositoryError::storage(operation, e.to_string()))?;
    let mut updated = request.clone();
    updated.status = to;
    updated.updated_at = now;
    Ok(updated)
}

#[async_trait]
impl HelpDeskRepository for SqliteRepository {
    async fn create_request(&self, new: NewHelpRequest) -> Result<HelpRequest, RepositoryError> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let now = Utc::now();
            conn.execute(
                "INSERT INTO help_requests
                     (subject, text, requester, priority, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    new.subject,
                    new.text,
                    new.requester.0,
                    new.priority.as_str(),
                    Status::Active.as_str(),
                    now.to_rfc3339(),
                    now.to_rfc3339(),
                ],
            )
            .map_err(|e| RepositoryError::storage("create request", e.to_string()))?;

            Ok(HelpRequest {
                id: RequestId(conn.last_insert_rowid()),
                subject: new.subject,
                text: new.text,
                requester: new.requester,
                priority: new.priority,
                status: Status::Active,
                created_at: now,
                updated_at: now,
            })
        })
        .await
        .map_err(|e| RepositoryError::storage("create request", e.to_string()))?
    }

    async fn get_request(&self, id: RequestId) -> Result<Option<HelpRequest>, RepositoryError> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let row: Option<RequestRow> = conn
                .query_row(
                    &format!("SELECT {REQUEST_COLUMNS} FROM help_requests WHERE id = ?1"),
                    params![id.0],
                    |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                            row.get(6)?,
                            row.get(7)?,
                        ))
                    },
                )
                .optional()
                .map_err(|e| RepositoryError::storage("get request", e.to_string()))?;

            row.map(request_from_row).transpose()
        })
        .await
        .map_err(|e| RepositoryError::storage("get request", e.to_string()))?
    }

    async fn list_requests(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<HelpRequest>, RepositoryError> {
        let conn = self.conn.clone();
        let filter = filter.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();

            let mut sql = format!("SELECT {REQUEST_COLUMNS} FROM help_requests WHERE 1 = 1");
            let mut args: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
            if let Some(status) = filter.status {
                sql.push_str(&format!(" AND status = ?{}", args.len() + 1));
                args.push(Box::new(status.as_str()));
            }
            if let Some(priority) = filter.priority {
                sql.push_str(&format!(" AND priority = ?{}", args.len() + 1));
                args.push(Box::new(priority.as_str()));
            }
            if let Some(requester) = filter.requester {
                sql.push_str(&format!(" AND requester = ?{}", args.len() + 1));
                args.push(Box::new(requester.0));
            }
            sql.push_str(" ORDER BY id");

            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| RepositoryError::storage("list requests", e.to_string()))?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())), |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                    ))
                })
                .map_err(|e| RepositoryError::storage("list requests", e.to_string()))?;

            let mut requests = Vec::new();
            for row in rows {
                let row: RequestRow =
                    row.map_err(|e| RepositoryError::storage("list requests", e.to_string()))?;
                requests.push(request_from_row(row)?);
            }
            Ok(requests)
        })
        .await
        .map_err(|e| RepositoryError::storage("list requests", e.to_string()))?
    }

    async fn update_details(
        &self,
        id: RequestId,
        text: String,
        priority: Priority,
    ) -> Result<Option<HelpRequest>, RepositoryError> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().unwrap();
            let tx = conn
                .transaction()
                .map_err(|e| RepositoryError::storage("update details", e.to_string()))?;

            let Some(row) = get_request_row(&tx, id, "update details")? else {
                return Ok(None);
            };
            let mut request = request_from_row(row)?;

            let now = Utc::now();
            tx.execute(
                "UPDATE help_requests SET text = ?1, priority = ?2, updated_at = ?3
                 WHERE id = ?4",
                params![text, priority.as_str(), now.to_rfc3339(), id.0],
            )
            .map_err(|e| RepositoryError::storage("update details", e.to_string()))?;
            tx.commit()
                .map_err(|e| RepositoryError::storage("update details", e.to_string()))?;

            request.text = text;
            request.priority = priority;
            request.updated_at = now;
            Ok(Some(request))
        })
        .await
        .map_err(|e| RepositoryError::storage("update details", e.to_string()))?
    }

    async fn delete_request(&self, id: RequestId) -> Result<bool, RepositoryError> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            // ON DELETE CASCADE removes the reason and comments.
            let deleted = conn
                .execute("DELETE FROM help_requests WHERE id = ?1", params![id.0])
                .map_err(|e| RepositoryError::storage("delete request", e.to_string()))?;
            Ok(deleted > 0)
        })
        .await
        .map_err(|e| RepositoryError::storage("delete request", e.to_string()))?
    }

    async fn transition_status(
        &self,
        id: RequestId,
        from: &[Status],
        to: Status,
    ) -> Result<TransitionOutcome, RepositoryError> {
        let conn = self.conn.clone();
        let from = from.to_vec();

        tokio::task::spawn_blocking(move || {
            run_transition(&conn, id, from, "transition status", |tx, request| {
                set_status(tx, request, to, "transition status")
            })
        })
        .await
        .map_err(|e| RepositoryError::storage("transition status", e.to_string()))?
    }

    async fn decline_request(
        &self,
        id: RequestId,
        from: &[Status],
        comment: &str,
    ) -> Result<TransitionOutcome, RepositoryError> {
        let conn = self.conn.clone();
        let from = from.to_vec();
        let comment = comment.to_string();

        tokio::task::spawn_blocking(move || {
            run_transition(&conn, id, from, "decline request", move |tx, request| {
                let existing: Option<i64> = tx
                    .query_row(
                        "SELECT request_id FROM declined_reasons WHERE request_id = ?1",
                        params![id.0],
                        |row| row.get(0),
                    )
                    .optional()
                    .map_err(|e| RepositoryError::storage("decline request", e.to_string()))?;
                if existing.is_some() {
                    return Err(RepositoryError::integrity(format!(
                        "request {id} already has a declined reason while in status {}",
                        request.status
                    )));
                }

                tx.execute(
                    "INSERT INTO declined_reasons (request_id, comment) VALUES (?1, ?2)",
                    params![id.0, comment],
                )
                .map_err(|e| RepositoryError::storage("decline request", e.to_string()))?;

                set_status(tx, request, Status::Declined, "decline request")
            })
        })
        .await
        .map_err(|e| RepositoryError::storage("decline request", e.to_string()))?
    }

    async fn restore_request(
        &self,
        id: RequestId,
        from: &[Status],
    ) -> Result<TransitionOutcome, RepositoryError> {
        let conn = self.conn.clone();
        let from = from.to_vec();

        tokio::task::spawn_blocking(move || {
            run_transition(&conn, id, from, "restore request", move |tx, request| {
                let deleted = tx
                    .execute(
                        "DELETE FROM declined_reasons WHERE request_id = ?1",
                        params![id.0],
                    )
                    .map_err(|e| RepositoryError::storage("restore request", e.to_string()))?;
                if deleted == 0 {
                    return Err(RepositoryError::integrity(format!(
                        "request {id} is declined but has no declined reason"
                    )));
                }

                set_status(tx, request, Status::ForRestoration, "restore request")
            })
        })
        .await
        .map_err(|e| RepositoryError::storage("restore request", e.to_string()))?
    }

    async fn declined_reason(
        &self,
        id: RequestId,
    ) -> Result<Option<DeclinedReason>, RepositoryError> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.query_row(
                "SELECT comment FROM declined_reasons WHERE request_id = ?1",
                params![id.0],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(|e| RepositoryError::storage("get declined reason", e.to_string()))
            .map(|comment| comment.map(|comment| DeclinedReason { request: id, comment }))
        })
        .await
        .map_err(|e| RepositoryError::storage("get declined reason", e.to_string()))?
    }

    async fn append_comment(
        &self,
        id: RequestId,
        author: ActorId,
        message: String,
    ) -> Result<CommentOutcome, RepositoryError> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().unwrap();
            let tx = conn
                .transaction()
                .map_err(|e| RepositoryError::storage("append comment", e.to_string()))?;

            let Some(row) = get_request_row(&tx, id, "append comment")? else {
                return Ok(CommentOutcome::NotFound);
            };
            let request = request_from_row(row)?;
            if !request.status.accepts_comments() {
                return Ok(CommentOutcome::NotOpen {
                    current: request.status,
                });
            }

            let now = Utc::now();
            tx.execute(
                "INSERT INTO comments (request_id, author, message, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id.0, author.0, message, now.to_rfc3339()],
            )
            .map_err(|e| RepositoryError::storage("append comment", e.to_string()))?;
            let comment_id = tx.last_insert_rowid();
            tx.commit()
                .map_err(|e| RepositoryError::storage("append comment", e.to_string()))?;

            Ok(CommentOutcome::Appended(Comment {
                id: CommentId(comment_id),
                request: id,
                author,
                message,
                created_at: now,
            }))
        })
        .await
        .map_err(|e| RepositoryError::storage("append comment", e.to_string()))?
    }

    async fn list_comments(&self, id: RequestId) -> Result<Vec<Comment>, RepositoryError> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let mut stmt = conn
                .prepare(
                    "SELECT id, author, message, created_at FROM comments
                     WHERE request_id = ?1 ORDER BY id",
                )
                .map_err(|e| RepositoryError::storage("list comments", e.to_string()))?;
            let rows = stmt
                .query_map(params![id.0], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })
                .map_err(|e| RepositoryError::storage("list comments", e.to_string()))?;

            let mut comments = Vec::new();
            for row in rows {
                let (comment_id, author, message, created_at) =
                    row.map_err(|e| RepositoryError::storage("list comments", e.to_string()))?;
                comments.push(Comment {
                    id: CommentId(comment_id),
                    request: id,
                    author: ActorId(author),
                    message,
                    created_at: parse_timestamp(&created_at)?,
                });
            }
            Ok(comments)
        })
        .await
        .map_err(|e| RepositoryError::storage("list comments", e.to_string()))?
    }
}

#[async_trait]
impl AuthRepository for SqliteRepository {
    async fn create_user(
        &self,
        username: &str,
        password_digest: &str,
        is_admin: bool,
    ) -> Result<Option<UserRecord>, RepositoryError> {
        let conn = self.conn.clone();
        let username = username.to_string();
        let password_digest = password_digest.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO users (username, password_digest, is_admin)
                 VALUES (?1, ?2, ?3)",
                params![username, password_digest, is_admin as i64],
            );
            match inserted {
                Ok(0) => Ok(None),
                Ok(_) => Ok(Some(UserRecord {
                    id: ActorId(conn.last_insert_rowid()),
                    username,
                    password_digest,
                    is_admin,
                })),
                Err(e) => Err(RepositoryError::storage("create user", e.to_string())),
            }
        })
        .await
        .map_err(|e| RepositoryError::storage("create user", e.to_string()))?
    }

    async fn find_user_by_name(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, RepositoryError> {
        let conn = self.conn.clone();
        let username = username.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.query_row(
                "SELECT id, username, password_digest, is_admin FROM users
                 WHERE username = ?1",
                params![username],
                |row| {
                    Ok(UserRecord {
                        id: ActorId(row.get(0)?),
                        username: row.get(1)?,
                        password_digest: row.get(2)?,
                        is_admin: row.get::<_, i64>(3)? != 0,
                    })
                },
            )
            .optional()
            .map_err(|e| RepositoryError::storage("find user", e.to_string()))
        })
        .await
        .map_err(|e| RepositoryError::storage("find user", e.to_string()))?
    }

    async fn insert_token(
        &self,
        key: &str,
        user: ActorId,
        last_seen: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let conn = self.conn.clone();
        let key = key.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute(
                "INSERT OR REPLACE INTO tokens (key, user_id, last_seen)
                 VALUES (?1, ?2, ?3)",
                params![key, user.0, last_seen.to_rfc3339()],
            )
            .map_err(|e| RepositoryError::storage("insert token", e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| RepositoryError::storage("insert token", e.to_string()))?
    }

    async fn token_with_user(
        &self,
        key: &str,
    ) -> Result<Option<(TokenRecord, UserRecord)>, RepositoryError> {
        let conn = self.conn.clone();
        let key = key.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let row: Option<(String, i64, String, String, String, i64)> = conn
                .query_row(
                    "SELECT t.key, t.user_id, t.last_seen,
                            u.username, u.password_digest, u.is_admin
                     FROM tokens t JOIN users u ON u.id = t.user_id
                     WHERE t.key = ?1",
                    params![key],
                    |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                        ))
                    },
                )
                .optional()
                .map_err(|e| RepositoryError::storage("get token", e.to_string()))?;

            let Some((key, user_id, last_seen, username, password_digest, is_admin)) = row
            else {
                return Ok(None);
            };

            Ok(Some((
                TokenRecord {
                    key,
                    user: ActorId(user_id),
                    last_seen: parse_timestamp(&last_seen)?,
                },
                UserRecord {
                    id: ActorId(user_id),
                    username,
                    password_digest,
                    is_admin: is_admin != 0,
                },
            )))
        })
        .await
        .map_err(|e| RepositoryError::storage("get token", e.to_string()))?
    }

    async fn touch_token(
        &self,
        key: &str,
        last_seen: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let conn = self.conn.clone();
        let key = key.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute(
                "UPDATE tokens SET last_seen = ?1 WHERE key = ?2",
                params![last_seen.to_rfc3339(), key],
            )
            .map_err(|e| RepositoryError::storage("touch token", e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| RepositoryError::storage("touch token", e.to_string()))?
    }

    async fn delete_token(&self, key: &str) -> Result<bool, RepositoryError> {
        let conn = self.conn.clone();
        let key = key.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let deleted = conn
                .execute("DELETE FROM tokens WHERE key = ?1", params![key])
                .map_err(|e| RepositoryError::storage("delete token", e.to_string()))?;
            Ok(deleted > 0)
        })
        .await
        .map_err(|e| RepositoryError::storage("delete token", e.to_string()))?
    }
}
