use std::path::Path;

use chrono::NaiveDateTime;
use rusqlite::{params, params_from_iter, Connection, Row};
use serde::Serialize;

use crate::error::{Error, Result};

const SELECT_COLUMNS: &str = "id, file, question, answer, revisitin, created_at, updated_at";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Flashcard {
    pub id: i64,
    pub file: String,
    pub question: String,
    pub answer: String,
    /// Days until the card is due again. `<= 0` means due now.
    pub revisit_in: i64,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

/// Insert payload; the store assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewFlashcard {
    pub file: String,
    pub question: String,
    pub answer: String,
    pub revisit_in: i64,
}

pub struct StoreStats {
    pub total: usize,
    pub due: usize,
    pub files: usize,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the database file and make sure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::StoreError(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::with_connection(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        Ok(Store { conn })
    }

    // ── Mutations ──

    pub fn insert(&self, card: &NewFlashcard) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO flashcards (file, question, answer, revisitin) VALUES (?1, ?2, ?3, ?4)",
            params![card.file, card.question, card.answer, card.revisit_in],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Touch only the scheduling field.
    pub fn update(&self, id: i64, revisit_in: i64) -> Result<()> {
        let n = self.conn.execute(
            "UPDATE flashcards SET revisitin = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
            params![revisit_in, id],
        )?;
        expect_one(n, id)
    }

    pub fn update_full(&self, card: &Flashcard) -> Result<()> {
        let n = self.conn.execute(
            "UPDATE flashcards
             SET file = ?1, question = ?2, answer = ?3, revisitin = ?4,
                 updated_at = CURRENT_TIMESTAMP
             WHERE id = ?5",
            params![card.file, card.question, card.answer, card.revisit_in, card.id],
        )?;
        expect_one(n, card.id)
    }

    pub fn delete(&self, id: i64) -> Result<()> {
        let n = self
            .conn
            .execute("DELETE FROM flashcards WHERE id = ?1", params![id])?;
        expect_one(n, id)
    }

    /// Make every card due again. Returns the number of rows touched.
    pub fn reset_all(&self) -> Result<usize> {
        let n = self.conn.execute(
            "UPDATE flashcards SET revisitin = 0, updated_at = CURRENT_TIMESTAMP",
            [],
        )?;
        Ok(n)
    }

    // ── Queries ──

    pub fn is_processed(&self, file: &str) -> Result<bool> {
        let found: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM flashcards WHERE file = ?1)",
            params![file],
            |r| r.get(0),
        )?;
        Ok(found)
    }

    pub fn get(&self, id: i64) -> Result<Option<Flashcard>> {
        let sql = format!("SELECT {} FROM flashcards WHERE id = ?1", SELECT_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![id], row_to_flashcard)?;
        let card = rows.next().transpose()?;
        Ok(card)
    }

    pub fn query_all(&self) -> Result<Vec<Flashcard>> {
        self.fetch(
            &format!(
                "SELECT {} FROM flashcards ORDER BY revisitin ASC, id ASC",
                SELECT_COLUMNS
            ),
            Vec::new(),
        )
    }

    /// Due cards in id order. The order fixes the review queue.
    pub fn query_due(&self) -> Result<Vec<Flashcard>> {
        self.fetch(
            &format!(
                "SELECT {} FROM flashcards WHERE revisitin <= 0 ORDER BY id ASC",
                SELECT_COLUMNS
            ),
            Vec::new(),
        )
    }

    /// Due cards restricted to `files`. An empty set selects nothing.
    pub fn query_due_for_files(&self, files: &[String]) -> Result<Vec<Flashcard>> {
        if files.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = (1..=files.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM flashcards
             WHERE revisitin <= 0 AND file IN ({})
             ORDER BY id ASC",
            SELECT_COLUMNS, placeholders
        );
        self.fetch(&sql, files.to_vec())
    }

    pub fn list_distinct_files(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT file FROM flashcards ORDER BY file ASC")?;
        let rows = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(rows)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let total: usize =
            self.conn
                .query_row("SELECT COUNT(*) FROM flashcards", [], |r| r.get(0))?;
        let due: usize = self.conn.query_row(
            "SELECT COUNT(*) FROM flashcards WHERE revisitin <= 0",
            [],
            |r| r.get(0),
        )?;
        let files: usize = self.conn.query_row(
            "SELECT COUNT(DISTINCT file) FROM flashcards",
            [],
            |r| r.get(0),
        )?;
        Ok(StoreStats { total, due, files })
    }

    fn fetch(&self, sql: &str, args: Vec<String>) -> Result<Vec<Flashcard>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), row_to_flashcard)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS flashcards (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            file       TEXT NOT NULL,
            question   TEXT NOT NULL,
            answer     TEXT NOT NULL,
            revisitin  INTEGER DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
        CREATE INDEX IF NOT EXISTS idx_flashcards_revisitin ON flashcards(revisitin);
        CREATE INDEX IF NOT EXISTS idx_flashcards_file ON flashcards(file);
        CREATE INDEX IF NOT EXISTS idx_flashcards_file_revisitin ON flashcards(file, revisitin);
        ",
    )?;
    Ok(())
}

fn row_to_flashcard(row: &Row<'_>) -> rusqlite::Result<Flashcard> {
    Ok(Flashcard {
        id: row.get(0)?,
        file: row.get(1)?,
        question: row.get(2)?,
        answer: row.get(3)?,
        revisit_in: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn expect_one(changed: usize, id: i64) -> Result<()> {
    if changed == 0 {
        Err(Error::StoreError(format!("flashcard {} not found", id)))
    } else {
        Ok(())
    }
}

// ── Tests ──
