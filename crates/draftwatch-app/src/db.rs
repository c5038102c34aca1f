// SQLite persistence for observed picks and watcher progress.

use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use draftwatch_core::draft::pick::{DraftId, DraftSlot, Pick, PlayerId, RosterId};
use draftwatch_core::draft::snapshot::DraftStatus;

/// Picks seen per draft, plus a small key-value store. Picks persisted
/// here let a restarted watcher resume instead of replaying history.
pub struct Database {
    conn: Mutex<Connection>,
}

/// Last progress recorded for a draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftProgress {
    pub status: DraftStatus,
    pub picks_made: u32,
    pub updated_at: DateTime<Utc>,
}

impl Database {
    /// Open (or create) the database at `path`. `":memory:"` gives an
    /// ephemeral database.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS draft_picks (
                draft_id    TEXT NOT NULL,
                pick_number INTEGER NOT NULL,
                round       INTEGER NOT NULL,
                roster_slot INTEGER NOT NULL,
                drafted_by  INTEGER NOT NULL,
                player_id   TEXT NOT NULL,
                timestamp   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (draft_id, pick_number)
            );

            CREATE TABLE IF NOT EXISTS draft_state (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record picks for `draft_id` in one transaction. Already-recorded
    /// pick numbers are left untouched. Returns the number of rows added.
    pub fn record_picks(&self, draft_id: &DraftId, picks: &[Pick]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;
        let mut added = 0;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR IGNORE INTO draft_picks
                        (draft_id, pick_number, round, roster_slot, drafted_by, player_id)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .context("failed to prepare record_picks")?;
            for pick in picks {
                added += stmt
                    .execute(params![
                        draft_id.as_str(),
                        pick.pick_number,
                        pick.round,
                        pick.roster_slot.0,
                        pick.drafted_by.0,
                        pick.player_id.as_str(),
                    ])
                    .with_context(|| format!("failed to record pick {}", pick.pick_number))?;
            }
        }
        tx.commit().context("failed to commit picks")?;
        Ok(added)
    }

    /// Picks recorded for `draft_id`, ordered by pick number.
    pub fn load_picks(&self, draft_id: &DraftId) -> Result<Vec<Pick>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT pick_number, round, roster_slot, drafted_by, player_id
                 FROM draft_picks WHERE draft_id = ?1 ORDER BY pick_number",
            )
            .context("failed to prepare load_picks query")?;

        let picks = stmt
            .query_map(params![draft_id.as_str()], |row| {
                Ok(Pick {
                    pick_number: row.get(0)?,
                    round: row.get(1)?,
                    roster_slot: DraftSlot(row.get(2)?),
                    drafted_by: RosterId(row.get(3)?),
                    player_id: PlayerId::new(row.get::<_, String>(4)?),
                })
            })
            .context("failed to query draft picks")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map draft pick rows")?;

        Ok(picks)
    }

    pub fn pick_count(&self, draft_id: &DraftId) -> Result<usize> {
        let conn = self.conn();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM draft_picks WHERE draft_id = ?1",
                params![draft_id.as_str()],
                |row| row.get(0),
            )
            .context("failed to count draft picks")?;
        Ok(count as usize)
    }

    /// Drop everything recorded for `draft_id`.
    pub fn clear_draft(&self, draft_id: &DraftId) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;
        tx.execute(
            "DELETE FROM draft_picks WHERE draft_id = ?1",
            params![draft_id.as_str()],
        )
        .context("failed to delete draft picks")?;
        tx.execute(
            "DELETE FROM draft_state WHERE key = ?1",
            params![progress_key(draft_id)],
        )
        .context("failed to delete draft state")?;
        tx.commit().context("failed to commit clear_draft")?;
        Ok(())
    }

    /// Persist a JSON value under `key`, replacing any previous value.
    pub fn save_state(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let conn = self.conn();
        let json_str = serde_json::to_string(value).context("failed to serialize state value")?;
        conn.execute(
            "INSERT OR REPLACE INTO draft_state (key, value) VALUES (?1, ?2)",
            params![key, json_str],
        )
        .context("failed to save state")?;
        Ok(())
    }

    pub fn load_state(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT value FROM draft_state WHERE key = ?1")
            .context("failed to prepare load_state query")?;

        let mut rows = stmt
            .query_map(params![key], |row| row.get::<_, String>(0))
            .context("failed to query draft state")?;

        match rows.next() {
            Some(row_result) => {
                let json_str = row_result.context("failed to read state row")?;
                let value = serde_json::from_str(&json_str)
                    .context("failed to deserialize state value")?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub fn save_progress(&self, draft_id: &DraftId, status: DraftStatus, picks_made: u32) -> Result<()> {
        let progress = DraftProgress {
            status,
            picks_made,
            updated_at: Utc::now(),
        };
        let value = serde_json::to_value(&progress).context("failed to serialize progress")?;
        self.save_state(&progress_key(draft_id), &value)
    }

    pub fn load_progress(&self, draft_id: &DraftId) -> Result<Option<DraftProgress>> {
        match self.load_state(&progress_key(draft_id))? {
            Some(value) => {
                let progress =
                    serde_json::from_value(value).context("failed to decode stored progress")?;
                Ok(Some(progress))
            }
            None => Ok(None),
        }
    }
}

fn progress_key(draft_id: &DraftId) -> String {
    format!("progress:{draft_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open(":memory:").expect("in-memory database should open")
    }

    fn draft() -> DraftId {
        DraftId::new("1049960376242456576")
    }

    fn sample_pick(pick_number: u32) -> Pick {
        Pick {
            pick_number,
            round: 1,
            roster_slot: DraftSlot(pick_number),
            drafted_by: RosterId(100 + pick_number),
            player_id: PlayerId::new(format!("p{pick_number}")),
        }
    }

    #[test]
    fn open_creates_tables() {
        let db = test_db();
        let conn = db.conn();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(tables, vec!["draft_picks", "draft_state"]);
    }

    #[test]
    fn record_and_load_picks_in_order() {
        let db = test_db();
        let picks = vec![sample_pick(1), sample_pick(2), sample_pick(3)];
        assert_eq!(db.record_picks(&draft(), &picks[1..]).unwrap(), 2);
        assert_eq!(db.record_picks(&draft(), &picks[..1]).unwrap(), 1);

        assert_eq!(db.load_picks(&draft()).unwrap(), picks);
        assert_eq!(db.pick_count(&draft()).unwrap(), 3);
    }

    #[test]
    fn record_picks_ignores_duplicates() {
        let db = test_db();
        db.record_picks(&draft(), &[sample_pick(1)]).unwrap();
        assert_eq!(db.record_picks(&draft(), &[sample_pick(1), sample_pick(2)]).unwrap(), 1);
        assert_eq!(db.pick_count(&draft()).unwrap(), 2);
    }

    #[test]
    fn picks_scoped_to_draft_id() {
        let db = test_db();
        let other = DraftId::new("other");
        db.record_picks(&draft(), &[sample_pick(1)]).unwrap();
        db.record_picks(&other, &[sample_pick(1), sample_pick(2)]).unwrap();

        assert_eq!(db.load_picks(&draft()).unwrap().len(), 1);
        assert_eq!(db.load_picks(&other).unwrap().len(), 2);
        assert!(db.load_picks(&DraftId::new("none")).unwrap().is_empty());
    }

    #[test]
    fn record_picks_generates_timestamp() {
        let db = test_db();
        db.record_picks(&draft(), &[sample_pick(1)]).unwrap();
        let ts: String = db
            .conn()
            .query_row("SELECT timestamp FROM draft_picks WHERE pick_number = 1", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert!(ts.contains('T'));
    }

    #[test]
    fn state_round_trip_and_overwrite() {
        let db = test_db();
        assert!(db.load_state("k").unwrap().is_none());
        db.save_state("k", &serde_json::json!({"a": 1})).unwrap();
        db.save_state("k", &serde_json::json!({"a": 2})).unwrap();
        assert_eq!(db.load_state("k").unwrap(), Some(serde_json::json!({"a": 2})));
    }

    #[test]
    fn progress_round_trip() {
        let db = test_db();
        assert!(db.load_progress(&draft()).unwrap().is_none());
        db.save_progress(&draft(), DraftStatus::Drafting, 14).unwrap();

        let progress = db.load_progress(&draft()).unwrap().unwrap();
        assert_eq!(progress.status, DraftStatus::Drafting);
        assert_eq!(progress.picks_made, 14);
    }

    #[test]
    fn clear_draft_only_touches_one_draft() {
        let db = test_db();
        let other = DraftId::new("other");
        db.record_picks(&draft(), &[sample_pick(1)]).unwrap();
        db.record_picks(&other, &[sample_pick(1)]).unwrap();
        db.save_progress(&draft(), DraftStatus::Drafting, 1).unwrap();

        db.clear_draft(&draft()).unwrap();
        assert_eq!(db.pick_count(&draft()).unwrap(), 0);
        assert!(db.load_progress(&draft()).unwrap().is_none());
        assert_eq!(db.pick_count(&other).unwrap(), 1);
    }
}
