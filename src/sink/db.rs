use std::path::Path;

use rusqlite::Connection;
use tracing::debug;

use crate::error::Result;
use crate::records::{AlbumBasicRow, AlbumDetailRow, TrackRow};

/// Batch outcome: rows written vs duplicate keys skipped.
#[derive(Debug, Default)]
pub struct InsertOutcome {
    pub inserted: usize,
    pub skipped: usize,
}

pub struct StoreStats {
    pub album_basic: usize,
    pub album_detail: usize,
    pub album_track: usize,
    pub trial_tracks: usize,
}

/// SQLite store for the album crawl. Schema creation is idempotent and a
/// duplicate primary key on insert is counted and logged, never raised.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Store> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let store = Store { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS album_basic (
                album_id       INTEGER PRIMARY KEY,
                album_paid     BOOLEAN NOT NULL,
                album_finished INTEGER NOT NULL,
                album_vip_type INTEGER NOT NULL,
                category       TEXT NOT NULL,
                subcategory    TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS album_detail (
                album_id             INTEGER PRIMARY KEY,
                album_title          TEXT NOT NULL,
                album_subtitle       TEXT,
                album_info           TEXT,
                album_tags           TEXT,
                album_cover          TEXT,
                album_score          REAL,
                album_score_10       REAL,
                album_create         TEXT NOT NULL,
                album_tracks         INTEGER NOT NULL,
                album_plays          INTEGER NOT NULL,
                album_comments       INTEGER,
                album_subscribes     INTEGER NOT NULL,
                album_paid_type      INTEGER NOT NULL,
                album_price          REAL,
                album_price_single   REAL,
                author_id            INTEGER NOT NULL,
                author_name          TEXT NOT NULL,
                author_gender        INTEGER NOT NULL,
                author_level         INTEGER NOT NULL,
                author_vip           BOOLEAN NOT NULL,
                author_signature     TEXT,
                author_desc          TEXT,
                author_headimg       TEXT NOT NULL,
                author_following     INTEGER NOT NULL,
                author_followers     INTEGER NOT NULL,
                author_albums        INTEGER NOT NULL,
                author_tracks        INTEGER NOT NULL,
                author_verified      INTEGER NOT NULL,
                author_verified_type INTEGER NOT NULL,
                author_verified_desc TEXT
            );

            CREATE TABLE IF NOT EXISTS album_track (
                track_id       INTEGER PRIMARY KEY,
                album_id       INTEGER NOT NULL,
                track_name     TEXT NOT NULL,
                track_duration INTEGER NOT NULL,
                track_plays    INTEGER NOT NULL,
                track_likes    INTEGER NOT NULL,
                track_comments INTEGER NOT NULL,
                track_create   TEXT NOT NULL,
                track_audio    TEXT NOT NULL DEFAULT ''
            );
            CREATE INDEX IF NOT EXISTS idx_track_album ON album_track(album_id);
            ",
        )?;
        Ok(())
    }

    pub fn insert_album_basic(&self, rows: &[AlbumBasicRow]) -> Result<InsertOutcome> {
        let tx = self.conn.unchecked_transaction()?;
        let mut outcome = InsertOutcome::default();
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO album_basic
                 (album_id, album_paid, album_finished, album_vip_type, category, subcategory)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for r in rows {
                let changed = stmt.execute(rusqlite::params![
                    r.album_id,
                    r.paid,
                    r.finished,
                    r.vip_type,
                    r.category,
                    r.subcategory,
                ])?;
                if changed == 0 {
                    debug!(album_id = r.album_id, "duplicate album, skipped");
                    outcome.skipped += 1;
                } else {
                    outcome.inserted += 1;
                }
            }
        }
        tx.commit()?;
        Ok(outcome)
    }

    pub fn insert_album_details(&self, rows: &[AlbumDetailRow]) -> Result<InsertOutcome> {
        let tx = self.conn.unchecked_transaction()?;
        let mut outcome = InsertOutcome::default();
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO album_detail
                 (album_id, album_title, album_subtitle, album_info, album_tags, album_cover,
                  album_score, album_score_10, album_create, album_tracks, album_plays,
                  album_comments, album_subscribes, album_paid_type, album_price,
                  album_price_single, author_id, author_name, author_gender, author_level,
                  author_vip, author_signature, author_desc, author_headimg, author_following,
                  author_followers, author_albums, author_tracks, author_verified,
                  author_verified_type, author_verified_desc)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,
                         ?20,?21,?22,?23,?24,?25,?26,?27,?28,?29,?30,?31)",
            )?;
            for r in rows {
                let changed = stmt.execute(rusqlite::params![
                    r.album_id,
                    r.title,
                    r.subtitle,
                    r.info,
                    r.tags,
                    r.cover,
                    r.score,
                    r.score_10,
                    r.created,
                    r.tracks,
                    r.plays,
                    r.comments,
                    r.subscribes,
                    r.paid_type,
                    r.price,
                    r.price_single,
                    r.author_id,
                    r.author_name,
                    r.author_gender,
                    r.author_level,
                    r.author_vip,
                    r.author_signature,
                    r.author_desc,
                    r.author_headimg,
                    r.author_following,
                    r.author_followers,
                    r.author_albums,
                    r.author_tracks,
                    r.author_verified,
                    r.author_verified_type,
                    r.author_verified_desc,
                ])?;
                if changed == 0 {
                    debug!(album_id = r.album_id, "duplicate album detail, skipped");
                    outcome.skipped += 1;
                } else {
                    outcome.inserted += 1;
                }
            }
        }
        tx.commit()?;
        Ok(outcome)
    }

    pub fn insert_tracks(&self, rows: &[TrackRow]) -> Result<InsertOutcome> {
        let tx = self.conn.unchecked_transaction()?;
        let mut outcome = InsertOutcome::default();
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO album_track
                 (track_id, album_id, track_name, track_duration, track_plays,
                  track_likes, track_comments, track_create, track_audio)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for r in rows {
                let changed = stmt.execute(rusqlite::params![
                    r.track_id,
                    r.album_id,
                    r.name,
                    r.duration,
                    r.plays,
                    r.likes,
                    r.comments,
                    r.created,
                    r.audio,
                ])?;
                if changed == 0 {
                    debug!(track_id = r.track_id, "duplicate track, skipped");
                    outcome.skipped += 1;
                } else {
                    outcome.inserted += 1;
                }
            }
        }
        tx.commit()?;
        Ok(outcome)
    }

    /// Album ids already collected by the listing crawl.
    pub fn album_ids(&self) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT album_id FROM album_basic ORDER BY album_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Tracks with a usable trial audio URL, for the downloader.
    pub fn trial_tracks(&self) -> Result<Vec<(i64, i64, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT album_id, track_id, track_audio FROM album_track
             WHERE track_audio != '' ORDER BY album_id, track_id",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let count = |sql: &str| -> Result<usize> {
            Ok(self.conn.query_row(sql, [], |r| r.get(0))?)
        };
        Ok(StoreStats {
            album_basic: count("SELECT COUNT(*) FROM album_basic")?,
            album_detail: count("SELECT COUNT(*) FROM album_detail")?,
            album_track: count("SELECT COUNT(*) FROM album_track")?,
            trial_tracks: count("SELECT COUNT(*) FROM album_track WHERE track_audio != ''")?,
        })
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn basic(album_id: i64) -> AlbumBasicRow {
        AlbumBasicRow {
            album_id,
            paid: false,
            finished: 2,
            vip_type: 0,
            category: "有声书".into(),
            subcategory: "文学".into(),
        }
    }

    fn track(track_id: i64, audio: &str) -> TrackRow {
        TrackRow {
            album_id: 1,
            track_id,
            name: "t".into(),
            duration: 60,
            plays: 1,
            likes: 0,
            comments: 0,
            created: "2022-10-17 00:00:00".into(),
            audio: audio.into(),
        }
    }

    fn open_temp() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("test.sqlite")).unwrap();
        (dir, store)
    }

    #[test]
    fn schema_creation_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sqlite");
        Store::open(&path).unwrap();
        Store::open(&path).unwrap();
    }

    #[test]
    fn duplicate_key_is_skipped_not_raised() {
        let (_dir, store) = open_temp();
        let first = store.insert_album_basic(&[basic(1), basic(2)]).unwrap();
        assert_eq!(first.inserted, 2);
        assert_eq!(first.skipped, 0);

        // Re-inserting the same keys changes nothing and raises nothing.
        let second = store.insert_album_basic(&[basic(1), basic(2), basic(3)]).unwrap();
        assert_eq!(second.inserted, 1);
        assert_eq!(second.skipped, 2);
        assert_eq!(store.stats().unwrap().album_basic, 3);
    }

    #[test]
    fn album_ids_round_trip() {
        let (_dir, store) = open_temp();
        store.insert_album_basic(&[basic(5), basic(3)]).unwrap();
        assert_eq!(store.album_ids().unwrap(), vec![3, 5]);
    }

    #[test]
    fn trial_tracks_excludes_paid_only() {
        let (_dir, store) = open_temp();
        store
            .insert_tracks(&[track(10, "https://cdn.example.com/a.m4a"), track(11, "")])
            .unwrap();
        let trials = store.trial_tracks().unwrap();
        assert_eq!(trials.len(), 1);
        assert_eq!(trials[0].1, 10);
        assert_eq!(store.stats().unwrap().album_track, 2);
    }
}
