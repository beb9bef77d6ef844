//! Persistência local em SQLite.
//!
//! Tabelas: `devices`, `detections`, `alerts`, `link_connections`.
//! Uma conexão só, atrás de um mutex; o loop de leitura do display
//! também escreve aqui (heartbeat).

use parking_lot::Mutex;
#[cfg(test)]
use rusqlite::OptionalExtension;
use rusqlite::{Connection, params};
use sentinel_core::relay::{AlertRef, DetectionStore, DeviceRef, PersistenceError, UserRef};
use sentinel_core::{AttackType, FeatureVector, Severity, Verdict};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Erro SQLite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Erro JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<StoreError> for PersistenceError {
    fn from(e: StoreError) -> Self {
        PersistenceError::new(e)
    }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS devices (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    device_id TEXT UNIQUE NOT NULL,
    device_name TEXT,
    ip_address TEXT,
    status TEXT DEFAULT 'Normal',
    is_connected INTEGER DEFAULT 0,
    sbytes INTEGER DEFAULT 0,
    dbytes INTEGER DEFAULT 0,
    rate REAL DEFAULT 0,
    dinpkt INTEGER DEFAULT 0,
    tcprtt REAL DEFAULT 0,
    synack REAL DEFAULT 0,
    ackdat REAL DEFAULT 0,
    smean REAL DEFAULT 0,
    dmean REAL DEFAULT 0,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    last_seen TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS detections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    device_id INTEGER NOT NULL,
    attack_type TEXT NOT NULL,
    confidence REAL NOT NULL,
    severity TEXT NOT NULL,
    indicators TEXT NOT NULL,
    risk_score INTEGER NOT NULL,
    timestamp TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (device_id) REFERENCES devices(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS alerts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    device_id INTEGER NOT NULL,
    attack_type TEXT NOT NULL,
    severity TEXT NOT NULL,
    email_sent INTEGER DEFAULT 0,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    sent_at TIMESTAMP,
    FOREIGN KEY (device_id) REFERENCES devices(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS link_connections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    port TEXT UNIQUE NOT NULL,
    device_id INTEGER,
    connection_status TEXT DEFAULT 'disconnected',
    last_heartbeat TIMESTAMP,
    connected_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (device_id) REFERENCES devices(id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_device_user ON devices(user_id);
CREATE INDEX IF NOT EXISTS idx_detection_device ON detections(device_id);
CREATE INDEX IF NOT EXISTS idx_detection_timestamp ON detections(timestamp);
CREATE INDEX IF NOT EXISTS idx_alert_device ON alerts(device_id);
CREATE INDEX IF NOT EXISTS idx_alert_user ON alerts(user_id);
"#;

/// Linha de `devices`.
#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    pub id: DeviceRef,
    pub user_id: UserRef,
    pub device_id: String,
    pub device_name: String,
    pub ip_address: String,
    pub status: String,
    pub is_connected: bool,
}

/// Linha de `detections`.
#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionRecord {
    pub id: i64,
    pub attack_type: String,
    pub confidence: f64,
    pub severity: String,
    pub indicators: Vec<String>,
    pub risk_score: u8,
}

/// Linha de `alerts`.
#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRecord {
    pub id: AlertRef,
    pub user_id: UserRef,
    pub device_id: DeviceRef,
    pub attack_type: String,
    pub severity: String,
    pub email_sent: bool,
}

/// Linha de `link_connections`.
#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub struct LinkRecord {
    pub port: String,
    pub device_id: Option<DeviceRef>,
    pub connection_status: String,
    pub last_heartbeat: Option<String>,
}

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Abre (ou cria) o banco e aplica o schema.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(30))?;

        if path != ":memory:" {
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            debug!("SQLite journal_mode = {mode}");
        }
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let store = Store {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        info!("Banco aberto em {path}");
        Ok(store)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::open(":memory:")
    }

    fn migrate(&self) -> Result<(), StoreError> {
        self.conn.lock().execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Cria o dispositivo ou atualiza nome, IP e features pelo id externo.
    pub fn upsert_device(
        &self,
        user: UserRef,
        external_id: &str,
        device_name: &str,
        ip_address: &str,
        features: &FeatureVector,
    ) -> Result<DeviceRef, StoreError> {
        let conn = self.conn.lock();
        let id = conn.query_row(
            r#"
            INSERT INTO devices
                (user_id, device_id, device_name, ip_address, sbytes, dbytes, rate,
                 dinpkt, tcprtt, synack, ackdat, smean, dmean)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(device_id) DO UPDATE SET
                user_id = excluded.user_id,
                device_name = excluded.device_name,
                ip_address = excluded.ip_address,
                sbytes = excluded.sbytes,
                dbytes = excluded.dbytes,
                rate = excluded.rate,
                dinpkt = excluded.dinpkt,
                tcprtt = excluded.tcprtt,
                synack = excluded.synack,
                ackdat = excluded.ackdat,
                smean = excluded.smean,
                dmean = excluded.dmean,
                last_seen = CURRENT_TIMESTAMP
            RETURNING id
            "#,
            params![
                user,
                external_id,
                device_name,
                ip_address,
                features.sbytes,
                features.dbytes,
                features.rate,
                features.dinpkt,
                features.tcprtt,
                features.synack,
                features.ackdat,
                features.smean,
                features.dmean,
            ],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    #[cfg(test)]
    pub fn device(&self, device: DeviceRef) -> Result<Option<DeviceRecord>, StoreError> {
        let conn = self.conn.lock();
        let record = conn
            .query_row(
                "SELECT id, user_id, device_id, device_name, ip_address, status, is_connected
                 FROM devices WHERE id = ?1",
                params![device],
                |row| {
                    Ok(DeviceRecord {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        device_id: row.get(2)?,
                        device_name: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                        ip_address: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                        status: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                        is_connected: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Detecções mais recentes primeiro.
    #[cfg(test)]
    pub fn recent_detections(
        &self,
        device: DeviceRef,
        limit: usize,
    ) -> Result<Vec<DetectionRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, attack_type, confidence, severity, indicators, risk_score
             FROM detections WHERE device_id = ?1
             ORDER BY timestamp DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![device, limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, u8>(5)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, attack_type, confidence, severity, indicators, risk_score) = row?;
            records.push(DetectionRecord {
                id,
                attack_type,
                confidence,
                severity,
                indicators: serde_json::from_str(&indicators)?,
                risk_score,
            });
        }
        Ok(records)
    }

    #[cfg(test)]
    pub fn alert(&self, alert: AlertRef) -> Result<Option<AlertRecord>, StoreError> {
        let conn = self.conn.lock();
        let record = conn
            .query_row(
                "SELECT id, user_id, device_id, attack_type, severity, email_sent
                 FROM alerts WHERE id = ?1",
                params![alert],
                |row| {
                    Ok(AlertRecord {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        device_id: row.get(2)?,
                        attack_type: row.get(3)?,
                        severity: row.get(4)?,
                        email_sent: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Alertas ainda não notificados, mais antigos primeiro.
    pub fn pending_alerts(&self) -> Result<Vec<AlertRef>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id FROM alerts WHERE email_sent = 0 ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<AlertRef>, _>>()?;
        Ok(ids)
    }

    // ──────────────────────────────────────────
    // Link com o display
    // ──────────────────────────────────────────

    /// Registra (ou substitui) a conexão de uma porta como "connected".
    pub fn register_link(&self, port: &str, device: Option<DeviceRef>) -> Result<(), StoreError> {
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO link_connections
                (port, device_id, connection_status, last_heartbeat)
             VALUES (?1, ?2, 'connected', CURRENT_TIMESTAMP)",
            params![port, device],
        )?;
        Ok(())
    }

    pub fn update_link_heartbeat(&self, port: &str) -> Result<(), StoreError> {
        self.conn.lock().execute(
            "UPDATE link_connections SET last_heartbeat = CURRENT_TIMESTAMP WHERE port = ?1",
            params![port],
        )?;
        Ok(())
    }

    pub fn mark_link_disconnected(&self, port: &str) -> Result<(), StoreError> {
        self.conn.lock().execute(
            "UPDATE link_connections SET connection_status = 'disconnected' WHERE port = ?1",
            params![port],
        )?;
        Ok(())
    }

    #[cfg(test)]
    pub fn link(&self, port: &str) -> Result<Option<LinkRecord>, StoreError> {
        let conn = self.conn.lock();
        let record = conn
            .query_row(
                "SELECT port, device_id, connection_status, last_heartbeat
                 FROM link_connections WHERE port = ?1",
                params![port],
                |row| {
                    Ok(LinkRecord {
                        port: row.get(0)?,
                        device_id: row.get(1)?,
                        connection_status: row.get(2)?,
                        last_heartbeat: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    fn insert_detection(&self, device: DeviceRef, verdict: &Verdict) -> Result<i64, StoreError> {
        let indicators = serde_json::to_string(verdict.indicators())?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO detections
                (device_id, attack_type, confidence, severity, indicators, risk_score)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                device,
                verdict.attack_type().as_str(),
                verdict.confidence(),
                verdict.severity().as_str(),
                indicators,
                verdict.risk_score(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

impl DetectionStore for Store {
    fn record_detection(&self, device: DeviceRef, verdict: &Verdict) -> Result<i64, PersistenceError> {
        Ok(self.insert_detection(device, verdict)?)
    }

    fn update_device_status(
        &self,
        device: DeviceRef,
        status: AttackType,
        connected: bool,
    ) -> Result<(), PersistenceError> {
        self.conn
            .lock()
            .execute(
                "UPDATE devices SET status = ?1, is_connected = ?2, last_seen = CURRENT_TIMESTAMP
                 WHERE id = ?3",
                params![status.as_str(), connected, device],
            )
            .map_err(StoreError::from)?;
        Ok(())
    }

    fn record_alert(
        &self,
        user: UserRef,
        device: DeviceRef,
        attack: AttackType,
        severity: Severity,
    ) -> Result<AlertRef, PersistenceError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO alerts (user_id, device_id, attack_type, severity, email_sent)
             VALUES (?1, ?2, ?3, ?4, 0)",
            params![user, device, attack.as_str(), severity.as_str()],
        )
        .map_err(StoreError::from)?;
        Ok(conn.last_insert_rowid())
    }

    fn mark_alert_sent(&self, alert: AlertRef) -> Result<(), PersistenceError> {
        self.conn
            .lock()
            .execute(
                "UPDATE alerts SET email_sent = 1, sent_at = CURRENT_TIMESTAMP WHERE id = ?1",
                params![alert],
            )
            .map_err(StoreError::from)?;
        Ok(())
    }
}
