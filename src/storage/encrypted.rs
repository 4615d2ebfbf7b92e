//! SQLite-backed store for assessments and the alert log. Recipient addresses are
//! AES-GCM encrypted at rest; key derived from a device-bound secret.

use super::EventSink;
use crate::alert::{AlertOutcome, AlertRequest, AttemptRecord};
use crate::error::{AgentError, Result};
use crate::risk::{RiskAssessment, RiskLevel};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use rand::RngCore;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

fn derive_key(seed: &[u8]) -> [u8; KEY_LEN] {
    use ring::digest;
    let mut out = [0u8; KEY_LEN];
    let h = digest::digest(&digest::SHA256, seed);
    out[..h.as_ref().len().min(KEY_LEN)].copy_from_slice(h.as_ref());
    out
}

fn encrypt(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<String> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| AgentError::Crypto(e.to_string()))?;
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt((&nonce).into(), plaintext)
        .map_err(|_| AgentError::Crypto("encryption failed".into()))?;
    let mut out = nonce.to_vec();
    out.extend(ciphertext);
    Ok(BASE64.encode(&out))
}

fn decrypt(key: &[u8; KEY_LEN], encoded: &str) -> Result<Vec<u8>> {
    let raw = BASE64
        .decode(encoded)
        .map_err(|e| AgentError::Crypto(e.to_string()))?;
    if raw.len() < NONCE_LEN {
        return Err(AgentError::Crypto("payload too short".into()));
    }
    let (nonce, ct) = raw.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| AgentError::Crypto(e.to_string()))?;
    cipher
        .decrypt(nonce.into(), ct)
        .map_err(|_| AgentError::Crypto("decryption failed (wrong secret?)".into()))
}

fn ts_from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn level_from_column(s: &str) -> RiskLevel {
    s.parse().unwrap_or(RiskLevel::Low)
}

/// A persisted assessment row
#[derive(Debug, Clone, PartialEq)]
pub struct StoredAssessment {
    pub mine_id: String,
    pub probability: f64,
    pub level: RiskLevel,
    pub computed_at: DateTime<Utc>,
    pub reading_ts: DateTime<Utc>,
}

/// A persisted alert-log row with the recipient decrypted
#[derive(Debug, Clone, PartialEq)]
pub struct AlertLogEntry {
    pub id: String,
    pub ts: DateTime<Utc>,
    pub mine_id: String,
    pub level: RiskLevel,
    pub probability: f64,
    pub recipient_email: String,
    pub delivered: bool,
    pub suppressed: bool,
    pub channel_used: Option<String>,
    pub attempts: Vec<AttemptRecord>,
}

pub struct SecureStore {
    conn: Mutex<Connection>,
    key: [u8; KEY_LEN],
}

impl SecureStore {
    /// Open or create DB at path. Key is derived from `secret` (in production: device-bound).
    pub fn open(path: &Path, secret: &[u8]) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS assessments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                mine_id TEXT NOT NULL,
                probability REAL NOT NULL,
                level TEXT NOT NULL,
                computed_at INTEGER NOT NULL,
                reading_ts INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_assessments_mine ON assessments(mine_id, computed_at);
            CREATE TABLE IF NOT EXISTS alert_log (
                id TEXT PRIMARY KEY,
                ts INTEGER NOT NULL,
                mine_id TEXT NOT NULL,
                level TEXT NOT NULL,
                probability REAL NOT NULL,
                recipient_enc TEXT NOT NULL,
                delivered INTEGER NOT NULL,
                suppressed INTEGER NOT NULL,
                channel TEXT,
                attempts_json TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_alert_log_ts ON alert_log(ts);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            key: derive_key(secret),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert_assessment(&self, a: &RiskAssessment) -> Result<()> {
        self.conn().execute(
            "INSERT INTO assessments (mine_id, probability, level, computed_at, reading_ts) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                a.mine_id,
                a.probability,
                a.level.as_str(),
                a.computed_at.timestamp_millis(),
                a.reading_ts.timestamp_millis()
            ],
        )?;
        Ok(())
    }

    /// Insert an alert-log row (recipient stored encrypted). Returns the row id.
    pub fn insert_alert(
        &self,
        request: &AlertRequest,
        outcome: &AlertOutcome,
        ts: DateTime<Utc>,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let recipient_enc = encrypt(&self.key, request.recipient_email.as_bytes())?;
        let attempts_json = serde_json::to_string(&outcome.attempts)?;
        self.conn().execute(
            "INSERT INTO alert_log (id, ts, mine_id, level, probability, recipient_enc, delivered, suppressed, channel, attempts_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                id,
                ts.timestamp_millis(),
                request.mine_id,
                request.level.as_str(),
                request.probability,
                recipient_enc,
                outcome.delivered,
                outcome.suppressed,
                outcome.channel_used,
                attempts_json
            ],
        )?;
        Ok(id)
    }

    /// Most recent assessments for a mine, newest first
    pub fn recent_assessments(&self, mine_id: &str, limit: usize) -> Result<Vec<StoredAssessment>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT mine_id, probability, level, computed_at, reading_ts FROM assessments
             WHERE mine_id = ?1 ORDER BY computed_at DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![mine_id, limit as i64], |row| {
            let level: String = row.get(2)?;
            Ok(StoredAssessment {
                mine_id: row.get(0)?,
                probability: row.get(1)?,
                level: level_from_column(&level),
                computed_at: ts_from_millis(row.get(3)?),
                reading_ts: ts_from_millis(row.get(4)?),
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Most recent alert-log rows, newest first, recipients decrypted
    pub fn alert_log(&self, limit: usize) -> Result<Vec<AlertLogEntry>> {
        let raw = {
            let conn = self.conn();
            let mut stmt = conn.prepare(
                "SELECT id, ts, mine_id, level, probability, recipient_enc, delivered, suppressed, channel, attempts_json
                 FROM alert_log ORDER BY ts DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, bool>(6)?,
                    row.get::<_, bool>(7)?,
                    row.get::<_, Option<String>>(8)?,
                    row.get::<_, String>(9)?,
                ))
            })?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };

        let mut out = Vec::with_capacity(raw.len());
        for (id, ts, mine_id, level, probability, enc, delivered, suppressed, channel, attempts) in raw {
            let recipient = decrypt(&self.key, &enc)?;
            out.push(AlertLogEntry {
                id,
                ts: ts_from_millis(ts),
                mine_id,
                level: level_from_column(&level),
                probability,
                recipient_email: String::from_utf8(recipient).unwrap_or_default(),
                delivered,
                suppressed,
                channel_used: channel,
                attempts: serde_json::from_str(&attempts)?,
            });
        }
        Ok(out)
    }

    /// Retention: delete assessments and alert rows older than `ts`
    pub fn prune_before(&self, ts: DateTime<Utc>) -> Result<u64> {
        let ms = ts.timestamp_millis();
        let conn = self.conn();
        let a = conn.execute("DELETE FROM assessments WHERE computed_at < ?1", params![ms])?;
        let b = conn.execute("DELETE FROM alert_log WHERE ts < ?1", params![ms])?;
        Ok((a + b) as u64)
    }
}

impl EventSink for SecureStore {
    fn record_assessment(&self, assessment: &RiskAssessment) -> Result<()> {
        self.insert_assessment(assessment)
    }

    fn record_alert(&self, request: &AlertRequest, outcome: &AlertOutcome) -> Result<()> {
        self.insert_alert(request, outcome, Utc::now()).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RiskConfig;
    use crate::features::{Feature, SensorReading};
    use crate::risk::RiskEngine;
    use chrono::TimeZone;

    fn request() -> AlertRequest {
        AlertRequest {
            mine_id: "M1".into(),
            mine_name: "North Pit".into(),
            location: String::new(),
            recipient_email: "pit-boss@example.com".into(),
            probability: 0.66,
            level: RiskLevel::High,
            drivers: Vec::new(),
            stale_reading: false,
        }
    }

    #[test]
    fn recipient_is_not_stored_in_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let store = SecureStore::open(&dir.path().join("s.db"), b"secret").unwrap();
        store
            .insert_alert(&request(), &AlertOutcome::default(), Utc::now())
            .unwrap();
        let enc: String = store
            .conn()
            .query_row("SELECT recipient_enc FROM alert_log", [], |r| r.get(0))
            .unwrap();
        assert!(!enc.contains("pit-boss"));
        let log = store.alert_log(10).unwrap();
        assert_eq!(log[0].recipient_email, "pit-boss@example.com");
        assert!(!log[0].delivered);
    }

    #[test]
    fn wrong_secret_cannot_read_alert_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.db");
        SecureStore::open(&path, b"right")
            .unwrap()
            .insert_alert(&request(), &AlertOutcome::default(), Utc::now())
            .unwrap();
        let other = SecureStore::open(&path, b"wrong").unwrap();
        assert!(matches!(other.alert_log(10), Err(AgentError::Crypto(_))));
    }

    #[test]
    fn assessments_listed_newest_first_and_pruned() {
        let dir = tempfile::tempdir().unwrap();
        let store = SecureStore::open(&dir.path().join("s.db"), b"secret").unwrap();
        let engine = RiskEngine::new(RiskConfig::default());
        let reading = SensorReading::zeroed("M1", Utc::now()).with(Feature::Displacement, 20.0);
        let old = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let new = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        store.insert_assessment(&engine.assess_at(&reading, old)).unwrap();
        store.insert_assessment(&engine.assess_at(&reading, new)).unwrap();

        let rows = store.recent_assessments("M1", 10).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].computed_at, new);
        assert!((rows[0].probability - 0.25).abs() < 1e-12);
        assert_eq!(rows[0].level, RiskLevel::Low);

        let removed = store
            .prune_before(Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap())
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.recent_assessments("M1", 10).unwrap().len(), 1);
    }
}
