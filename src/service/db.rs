use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use taskboard_core::{DecodeDiagnostics, DocumentCodec, List, TracingDiagnostics};

use super::models::*;
use crate::errors::TaskboardError;

/// Codec used by the store. Diagnostics are shared so callers can observe repairs.
pub type SharedCodec = DocumentCodec<Arc<dyn DecodeDiagnostics>>;

/// Shared handle to the board store, held in `AppState`.
///
/// A handler's load and its save are two separate `call`s. Two requests
/// editing the same board can interleave between them, and the later save
/// replaces the whole tree.
#[derive(Clone)]
pub struct DbHandle {
    store: Arc<Mutex<BoardDb>>,
}

impl DbHandle {
    pub fn new(db: BoardDb) -> Self {
        Self {
            store: Arc::new(Mutex::new(db)),
        }
    }

    /// Run `f` against the store on tokio's blocking pool.
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&BoardDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(&*lock_store(&store)?))
            .await
            .context("Board store task panicked")?
    }

    /// Borrow the store from synchronous code, such as setup checks in tests.
    pub fn lock_sync(&self) -> Result<MutexGuard<'_, BoardDb>> {
        lock_store(&self.store)
    }
}

fn lock_store(store: &Mutex<BoardDb>) -> Result<MutexGuard<'_, BoardDb>> {
    store
        .lock()
        .map_err(|_| anyhow::anyhow!("Board store lock poisoned"))
}

pub struct BoardDb {
    conn: Connection,
    codec: SharedCodec,
}

impl BoardDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database at {}", path.display()))?;
        Self::from_connection(conn)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let diagnostics: Arc<dyn DecodeDiagnostics> = Arc::new(TracingDiagnostics);
        let db = Self {
            conn,
            codec: DocumentCodec::with_diagnostics(diagnostics),
        };
        db.init()?;
        Ok(db)
    }

    /// Report document repairs somewhere other than the log.
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DecodeDiagnostics>) -> Self {
        self.codec = DocumentCodec::with_diagnostics(diagnostics);
        self
    }

    pub fn codec(&self) -> &SharedCodec {
        &self.codec
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    email TEXT NOT NULL UNIQUE,
                    boards_title TEXT NOT NULL DEFAULT 'My Boards',
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS boards (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    description TEXT,
                    custom_title TEXT,
                    position INTEGER NOT NULL DEFAULT 0,
                    lists TEXT NOT NULL DEFAULT '[]',
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_boards_user ON boards(user_id, position);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Users ─────────────────────────────────────────────────────────

    pub fn create_user(&self, name: &str, email: &str) -> Result<User> {
        if self.find_user_by_email(email)?.is_some() {
            return Err(TaskboardError::EmailTaken {
                email: email.to_string(),
            }
            .into());
        }
        let now = timestamp();
        self.conn
            .execute(
                "INSERT INTO users (name, email, boards_title, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![name, email, DEFAULT_BOARDS_TITLE, now],
            )
            .context("Failed to insert user")?;
        let id = self.conn.last_insert_rowid();
        self.get_user(id)?.context("User not found after insert")
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        self.conn
            .query_row(
                "SELECT id, name, email, boards_title, created_at, updated_at FROM users WHERE id = ?1",
                params![id],
                user_from_row,
            )
            .optional()
            .context("Failed to query user")
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.conn
            .query_row(
                "SELECT id, name, email, boards_title, created_at, updated_at FROM users WHERE email = ?1",
                params![email],
                user_from_row,
            )
            .optional()
            .context("Failed to query user by email")
    }

    pub fn update_user(&self, id: i64, changes: &UserChanges) -> Result<Option<User>> {
        if self.get_user(id)?.is_none() {
            return Ok(None);
        }
        if let Some(email) = &changes.email
            && let Some(existing) = self.find_user_by_email(email)?
            && existing.id != id
        {
            return Err(TaskboardError::EmailTaken {
                email: email.clone(),
            }
            .into());
        }

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let now = timestamp();
        if let Some(name) = &changes.name {
            tx.execute(
                "UPDATE users SET name = ?1, updated_at = ?2 WHERE id = ?3",
                params![name, now, id],
            )
            .context("Failed to update user name")?;
        }
        if let Some(email) = &changes.email {
            tx.execute(
                "UPDATE users SET email = ?1, updated_at = ?2 WHERE id = ?3",
                params![email, now, id],
            )
            .context("Failed to update user email")?;
        }
        if let Some(title) = &changes.boards_title {
            tx.execute(
                "UPDATE users SET boards_title = ?1, updated_at = ?2 WHERE id = ?3",
                params![title, now, id],
            )
            .context("Failed to update boards title")?;
        }
        tx.commit().context("Failed to commit user update")?;
        self.get_user(id)
    }

    /// Return the user with `email`, creating it when absent.
    pub fn ensure_user(&self, name: &str, email: &str) -> Result<User> {
        match self.find_user_by_email(email)? {
            Some(user) => Ok(user),
            None => self.create_user(name, email),
        }
    }

    // ── Boards ────────────────────────────────────────────────────────

    pub fn create_board(&self, user_id: i64, board: &NewBoard) -> Result<Board> {
        let lists = self.codec.encode_value(board.lists.as_ref());
        let now = timestamp();
        self.conn
            .execute(
                "INSERT INTO boards (user_id, name, description, custom_title, position, lists, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    user_id,
                    board.name,
                    board.description,
                    board.custom_title,
                    board.position,
                    lists,
                    now
                ],
            )
            .context("Failed to insert board")?;
        let id = self.conn.last_insert_rowid();
        self.get_board(id, user_id)?
            .context("Board not found after insert")
    }

    /// All boards owned by `user_id`, ordered by position.
    pub fn list_boards(&self, user_id: i64) -> Result<Vec<Board>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, user_id, name, description, custom_title, position, lists, created_at, updated_at
                 FROM boards WHERE user_id = ?1 ORDER BY position, id",
            )
            .context("Failed to prepare list_boards")?;
        let rows = stmt
            .query_map(params![user_id], BoardRow::from_row)
            .context("Failed to query boards")?;
        let mut boards = Vec::new();
        for row in rows {
            let r = row.context("Failed to read board row")?;
            boards.push(r.into_board(&self.codec));
        }
        Ok(boards)
    }

    /// Fetch a board only if `user_id` owns it.
    pub fn get_board(&self, id: i64, user_id: i64) -> Result<Option<Board>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, user_id, name, description, custom_title, position, lists, created_at, updated_at
                 FROM boards WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
                BoardRow::from_row,
            )
            .optional()
            .context("Failed to query board")?;
        Ok(row.map(|r| r.into_board(&self.codec)))
    }

    pub fn update_board(
        &self,
        id: i64,
        user_id: i64,
        changes: &BoardChanges,
    ) -> Result<Option<Board>> {
        if !self.owns_board(id, user_id)? {
            return Ok(None);
        }

        // unchecked_transaction is sound here: DbHandle's Mutex serializes access.
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let now = timestamp();
        if let Some(name) = &changes.name {
            tx.execute(
                "UPDATE boards SET name = ?1, updated_at = ?2 WHERE id = ?3",
                params![name, now, id],
            )
            .context("Failed to update board name")?;
        }
        if let Some(description) = &changes.description {
            tx.execute(
                "UPDATE boards SET description = ?1, updated_at = ?2 WHERE id = ?3",
                params![description, now, id],
            )
            .context("Failed to update board description")?;
        }
        if let Some(custom_title) = &changes.custom_title {
            tx.execute(
                "UPDATE boards SET custom_title = ?1, updated_at = ?2 WHERE id = ?3",
                params![custom_title, now, id],
            )
            .context("Failed to update board title")?;
        }
        if let Some(position) = changes.position {
            tx.execute(
                "UPDATE boards SET position = ?1, updated_at = ?2 WHERE id = ?3",
                params![position, now, id],
            )
            .context("Failed to update board position")?;
        }
        if let Some(lists) = &changes.lists {
            let encoded = self.codec.encode_value(Some(lists));
            tx.execute(
                "UPDATE boards SET lists = ?1, updated_at = ?2 WHERE id = ?3",
                params![encoded, now, id],
            )
            .context("Failed to update board lists")?;
        }
        tx.commit().context("Failed to commit board update")?;
        self.get_board(id, user_id)
    }

    /// Replace the stored tree. Returns `None` if the board is gone.
    pub fn save_lists(&self, id: i64, user_id: i64, lists: &[List]) -> Result<Option<Board>> {
        let encoded = self.codec.encode(lists);
        let count = self
            .conn
            .execute(
                "UPDATE boards SET lists = ?1, updated_at = ?2 WHERE id = ?3 AND user_id = ?4",
                params![encoded, timestamp(), id, user_id],
            )
            .context("Failed to save board lists")?;
        if count == 0 {
            return Ok(None);
        }
        self.get_board(id, user_id)
    }

    pub fn delete_board(&self, id: i64, user_id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute(
                "DELETE FROM boards WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )
            .context("Failed to delete board")?;
        Ok(count > 0)
    }

    fn owns_board(&self, id: i64, user_id: i64) -> Result<bool> {
        self.conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM boards WHERE id = ?1 AND user_id = ?2)",
                params![id, user_id],
                |row| row.get(0),
            )
            .context("Failed to check board ownership")
    }
}

/// ISO-8601 UTC with millisecond precision.
fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        boards_title: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

/// Raw board row. `lists` stays as stored text until decoded.
struct BoardRow {
    id: i64,
    user_id: i64,
    name: String,
    description: Option<String>,
    custom_title: Option<String>,
    position: i64,
    lists: Option<String>,
    created_at: String,
    updated_at: String,
}

impl BoardRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            custom_title: row.get(4)?,
            position: row.get(5)?,
            lists: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_board(self, codec: &SharedCodec) -> Board {
        Board {
            lists: codec.decode(self.lists.as_deref()),
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            description: self.description,
            custom_title: self.custom_title,
            position: self.position,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use taskboard_core::DocumentDefect;

    #[derive(Default)]
    struct Recorder(Mutex<usize>);

    impl DecodeDiagnostics for Recorder {
        fn document_repaired(&self, _defect: &DocumentDefect) {
            *self.0.lock().unwrap() += 1;
        }
    }

    fn db_with_user() -> Result<(BoardDb, User)> {
        let db = BoardDb::new_in_memory()?;
        let user = db.create_user("Test User", "test@example.com")?;
        Ok((db, user))
    }

    fn named(name: &str) -> NewBoard {
        NewBoard {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_database_and_run_migrations() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let table_count: i32 = db.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('users', 'boards')",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(table_count, 2);
        Ok(())
    }

    #[test]
    fn test_create_user_defaults_boards_title() -> Result<()> {
        let (db, user) = db_with_user()?;
        assert!(user.id > 0);
        assert_eq!(user.boards_title, "My Boards");
        assert!(user.created_at.ends_with('Z'));
        assert_eq!(db.get_user(user.id)?, Some(user));
        Ok(())
    }

    #[test]
    fn test_duplicate_email_is_rejected() -> Result<()> {
        let (db, _) = db_with_user()?;
        let err = db.create_user("Other", "test@example.com").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TaskboardError>(),
            Some(TaskboardError::EmailTaken { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_update_user_fields() -> Result<()> {
        let (db, user) = db_with_user()?;
        let changes = UserChanges {
            boards_title: Some("Team Boards".into()),
            ..Default::default()
        };
        let updated = db.update_user(user.id, &changes)?.expect("user exists");
        assert_eq!(updated.boards_title, "Team Boards");
        assert_eq!(updated.name, "Test User");
        assert!(db.update_user(999, &changes)?.is_none());
        Ok(())
    }

    #[test]
    fn test_update_user_email_collision() -> Result<()> {
        let (db, user) = db_with_user()?;
        db.create_user("Other", "other@example.com")?;
        let changes = UserChanges {
            email: Some("other@example.com".into()),
            ..Default::default()
        };
        assert!(db.update_user(user.id, &changes).is_err());
        // Re-submitting one's own email is fine.
        let same = UserChanges {
            email: Some("test@example.com".into()),
            ..Default::default()
        };
        assert!(db.update_user(user.id, &same)?.is_some());
        Ok(())
    }

    #[test]
    fn test_ensure_user_is_idempotent() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let first = db.ensure_user("Test User", "test@example.com")?;
        let second = db.ensure_user("Test User", "test@example.com")?;
        assert_eq!(first.id, second.id);
        Ok(())
    }

    #[test]
    fn test_create_board_starts_with_empty_lists() -> Result<()> {
        let (db, user) = db_with_user()?;
        let board = db.create_board(user.id, &named("Work"))?;
        assert_eq!(board.name, "Work");
        assert_eq!(board.position, 0);
        assert!(board.lists.is_empty());
        let stored: String = db.conn.query_row(
            "SELECT lists FROM boards WHERE id = ?1",
            params![board.id],
            |row| row.get(0),
        )?;
        assert_eq!(stored, "[]");
        Ok(())
    }

    #[test]
    fn test_create_board_with_invalid_lists_stores_empty_array() -> Result<()> {
        let (db, user) = db_with_user()?;
        let new = NewBoard {
            lists: Some(json!({"not": "an array"})),
            ..named("Broken")
        };
        let board = db.create_board(user.id, &new)?;
        assert!(board.lists.is_empty());
        Ok(())
    }

    #[test]
    fn test_list_boards_orders_by_position_and_scopes_by_owner() -> Result<()> {
        let (db, user) = db_with_user()?;
        let other = db.create_user("Other", "other@example.com")?;
        db.create_board(user.id, &NewBoard { position: 2, ..named("C") })?;
        db.create_board(user.id, &NewBoard { position: 0, ..named("A") })?;
        db.create_board(user.id, &NewBoard { position: 1, ..named("B") })?;
        db.create_board(other.id, &named("Theirs"))?;

        let names: Vec<String> = db.list_boards(user.id)?.into_iter().map(|b| b.name).collect();
        assert_eq!(names, ["A", "B", "C"]);
        Ok(())
    }

    #[test]
    fn test_get_board_requires_owner() -> Result<()> {
        let (db, user) = db_with_user()?;
        let other = db.create_user("Other", "other@example.com")?;
        let board = db.create_board(user.id, &named("Private"))?;
        assert!(db.get_board(board.id, other.id)?.is_none());
        assert!(db.get_board(board.id, user.id)?.is_some());
        Ok(())
    }

    #[test]
    fn test_update_board_partial_changes() -> Result<()> {
        let (db, user) = db_with_user()?;
        let board = db.create_board(
            user.id,
            &NewBoard {
                description: Some("old".into()),
                ..named("Work")
            },
        )?;

        let changes = BoardChanges {
            position: Some(5),
            description: Some(None),
            ..Default::default()
        };
        let updated = db.update_board(board.id, user.id, &changes)?.expect("exists");
        assert_eq!(updated.name, "Work");
        assert_eq!(updated.position, 5);
        assert_eq!(updated.description, None);
        Ok(())
    }

    #[test]
    fn test_update_board_replaces_lists_through_codec() -> Result<()> {
        let (db, user) = db_with_user()?;
        let board = db.create_board(user.id, &named("Work"))?;
        let changes = BoardChanges {
            lists: Some(json!([{"id": "l1", "title": "Todo", "tasks": []}])),
            ..Default::default()
        };
        let updated = db.update_board(board.id, user.id, &changes)?.expect("exists");
        assert_eq!(updated.lists, vec![List::new("l1", "Todo")]);
        Ok(())
    }

    #[test]
    fn test_update_missing_board_returns_none() -> Result<()> {
        let (db, user) = db_with_user()?;
        let changes = BoardChanges {
            name: Some("x".into()),
            ..Default::default()
        };
        assert!(db.update_board(42, user.id, &changes)?.is_none());
        Ok(())
    }

    #[test]
    fn test_save_lists_round_trip() -> Result<()> {
        let (db, user) = db_with_user()?;
        let board = db.create_board(user.id, &named("Work"))?;
        let lists = vec![List::new("l1", "Todo"), List::new("l2", "Done")];
        let saved = db.save_lists(board.id, user.id, &lists)?.expect("exists");
        assert_eq!(saved.lists, lists);
        assert!(db.save_lists(board.id + 1, user.id, &lists)?.is_none());
        Ok(())
    }

    #[test]
    fn test_corrupted_lists_column_reads_as_empty_and_is_reported() -> Result<()> {
        let recorder = Arc::new(Recorder::default());
        let db = BoardDb::new_in_memory()?.with_diagnostics(recorder.clone());
        let user = db.create_user("Test User", "test@example.com")?;
        let board = db.create_board(user.id, &named("Work"))?;
        db.conn.execute(
            "UPDATE boards SET lists = 'invalid-json' WHERE id = ?1",
            params![board.id],
        )?;

        let fetched = db.get_board(board.id, user.id)?.expect("exists");
        assert!(fetched.lists.is_empty());
        assert_eq!(*recorder.0.lock().unwrap(), 1);
        Ok(())
    }

    #[test]
    fn test_delete_board_and_cascade() -> Result<()> {
        let (db, user) = db_with_user()?;
        let board = db.create_board(user.id, &named("Work"))?;
        assert!(db.delete_board(board.id, user.id)?);
        assert!(!db.delete_board(board.id, user.id)?);

        let again = db.create_board(user.id, &named("Again"))?;
        db.conn.execute("DELETE FROM users WHERE id = ?1", params![user.id])?;
        let remaining: i64 = db.conn.query_row(
            "SELECT COUNT(*) FROM boards WHERE id = ?1",
            params![again.id],
            |row| row.get(0),
        )?;
        assert_eq!(remaining, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_db_handle_runs_closures() -> Result<()> {
        let handle = DbHandle::new(BoardDb::new_in_memory()?);
        let user = handle
            .call(|db| db.create_user("Async", "async@example.com"))
            .await?;
        let fetched = handle.call(move |db| db.get_user(user.id)).await?;
        assert_eq!(fetched.map(|u| u.email), Some("async@example.com".into()));
        Ok(())
    }
}
