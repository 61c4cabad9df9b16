//! Conversation history for follow-up questions.
//!
//! Turns are stored per session id in SQLite. The orchestrator only ever
//! receives a rendered snapshot of the last few turns; it never writes here.

use chrono::{DateTime, Utc};
use lexrag_core::{AppError, AppResult};
use rusqlite::types::Type;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub session_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub turns: u32,
    pub last_active: DateTime<Utc>,
}

pub struct SessionStore {
    conn: Mutex<Connection>,
}

impl SessionStore {
    pub fn open(db_path: &Path) -> AppResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)
            .map_err(|e| AppError::Storage(format!("Failed to open session store: {}", e)))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Storage(format!("Failed to open session store: {}", e)))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> AppResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS turns (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_turns_session ON turns(session_id);
            "#,
        )
        .map_err(|e| AppError::Storage(format!("Failed to create session tables: {}", e)))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Storage("Session store lock poisoned".to_string()))
    }

    pub fn append(&self, session_id: &str, role: Role, content: &str) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO turns (session_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![session_id, role.as_str(), content, Utc::now().to_rfc3339()],
        )
        .map_err(|e| AppError::Storage(format!("Failed to append turn: {}", e)))?;
        Ok(())
    }

    /// The last `n` turns of a session, oldest first.
    pub fn recent(&self, session_id: &str, n: usize) -> AppResult<Vec<Turn>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT session_id, role, content, created_at FROM turns
                 WHERE session_id = ?1 ORDER BY seq DESC LIMIT ?2",
            )
            .map_err(|e| AppError::Storage(e.to_string()))?;

        let mut turns = stmt
            .query_map(params![session_id, n.min(i64::MAX as usize) as i64], |row| {
                let role: String = row.get(1)?;
                let created: String = row.get(3)?;
                Ok(Turn {
                    session_id: row.get(0)?,
                    role: if role == "assistant" {
                        Role::Assistant
                    } else {
                        Role::User
                    },
                    content: row.get(2)?,
                    created_at: DateTime::parse_from_rfc3339(&created)
                        .map(|d| d.with_timezone(&Utc))
                        .map_err(|e| {
                            rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e))
                        })?,
                })
            })
            .map_err(|e| AppError::Storage(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::Storage(format!("Failed to read turns: {}", e)))?;

        turns.reverse();
        Ok(turns)
    }

    /// Every turn of a session, oldest first.
    pub fn messages(&self, session_id: &str) -> AppResult<Vec<Turn>> {
        self.recent(session_id, usize::MAX)
    }

    pub fn list(&self) -> AppResult<Vec<SessionSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT session_id, COUNT(*), MAX(created_at) FROM turns
                 GROUP BY session_id ORDER BY MAX(created_at) DESC",
            )
            .map_err(|e| AppError::Storage(e.to_string()))?;

        let sessions = stmt
            .query_map([], |row| {
                let last: String = row.get(2)?;
                Ok(SessionSummary {
                    id: row.get(0)?,
                    turns: row.get::<_, i64>(1)? as u32,
                    last_active: DateTime::parse_from_rfc3339(&last)
                        .map(|d| d.with_timezone(&Utc))
                        .map_err(|e| {
                            rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e))
                        })?,
                })
            })
            .map_err(|e| AppError::Storage(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::Storage(format!("Failed to list sessions: {}", e)))?;

        Ok(sessions)
    }

    /// Forget a session. Returns the number of turns removed.
    pub fn reset(&self, session_id: &str) -> AppResult<usize> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM turns WHERE session_id = ?1", params![session_id])
            .map_err(|e| AppError::Storage(format!("Failed to reset session: {}", e)))
    }

    /// Render the last `n` turns as a transcript for the prompt, if any.
    pub fn conversation_context(&self, session_id: &str, n: usize) -> AppResult<Option<String>> {
        if n == 0 {
            return Ok(None);
        }
        let turns = self.recent(session_id, n)?;
        if turns.is_empty() {
            return Ok(None);
        }

        Ok(Some(
            turns
                .iter()
                .map(|t| format!("{}: {}", t.role.label(), t.content.trim()))
                .collect::<Vec<_>>()
                .join("\n"),
        ))
    }
}
