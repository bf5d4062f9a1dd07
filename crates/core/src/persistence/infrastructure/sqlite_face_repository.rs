use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

use crate::persistence::domain::face_repository::{FaceRepository, StoreError};
use crate::persistence::domain::records::{
    DetectionRecord, FaceRecord, Observation, UpdateOutcome,
};
use crate::shared::bounding_box::BoundingBox;
use crate::shared::clock::{format_timestamp, parse_timestamp};
use crate::shared::face_id::FaceId;
use crate::shared::face_image::FaceImage;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS faces (
        face_id TEXT PRIMARY KEY,
        first_seen TEXT NOT NULL,
        last_seen TEXT NOT NULL,
        best_image BLOB NOT NULL,
        best_image_width INTEGER NOT NULL,
        best_image_height INTEGER NOT NULL,
        best_image_channels INTEGER NOT NULL,
        best_confidence REAL NOT NULL
    );
    CREATE TABLE IF NOT EXISTS detections (
        detection_id INTEGER PRIMARY KEY AUTOINCREMENT,
        face_id TEXT NOT NULL REFERENCES faces (face_id),
        timestamp TEXT NOT NULL,
        image BLOB NOT NULL,
        image_width INTEGER NOT NULL,
        image_height INTEGER NOT NULL,
        image_channels INTEGER NOT NULL,
        confidence REAL NOT NULL,
        x REAL NOT NULL,
        y REAL NOT NULL,
        width REAL NOT NULL,
        height REAL NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_detections_face ON detections (face_id, detection_id);
";

const FACE_COLUMNS: &str = "face_id, first_seen, last_seen, best_image, best_image_width, \
     best_image_height, best_image_channels, best_confidence";

const DETECTION_COLUMNS: &str = "detection_id, face_id, timestamp, image, image_width, \
     image_height, image_channels, confidence, x, y, width, height";

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Backend(Box::new(err))
    }
}

/// SQLite-backed [`FaceRepository`].
///
/// Writes run in `IMMEDIATE` transactions, so the write lock is held from
/// the first statement: another connection can never observe a face row
/// without its detection row, or interleave with the best-image
/// comparison.
pub struct SqliteFaceRepository {
    conn: Connection,
}

impl SqliteFaceRepository {
    /// Opens (or creates) the database at `path`, keeping existing rows.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Drops every face and detection and recreates empty tables.
    pub fn reset(&mut self) -> Result<(), StoreError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute_batch("DROP TABLE IF EXISTS detections; DROP TABLE IF EXISTS faces;")?;
        tx.execute_batch(SCHEMA)?;
        tx.commit()?;
        log::info!("Face database reset");
        Ok(())
    }

    fn write_transaction(&mut self) -> Result<Transaction<'_>, StoreError> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }
}

impl FaceRepository for SqliteFaceRepository {
    fn create_identity(&mut self, observation: &Observation<'_>) -> Result<(), StoreError> {
        let tx = self.write_transaction()?;
        let image = observation.image;
        let inserted = tx.execute(
            &format!("INSERT INTO faces ({FACE_COLUMNS}) VALUES (?1, ?2, ?2, ?3, ?4, ?5, ?6, ?7)"),
            params![
                observation.face_id.to_string(),
                format_timestamp(&observation.timestamp),
                image.data(),
                image.width(),
                image.height(),
                image.channels(),
                observation.confidence,
            ],
        );
        match inserted {
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                return Err(StoreError::DuplicateFace(observation.face_id));
            }
            other => {
                other?;
            }
        }
        insert_detection(&tx, observation)?;
        tx.commit()?;
        Ok(())
    }

    fn update_identity(
        &mut self,
        observation: &Observation<'_>,
    ) -> Result<UpdateOutcome, StoreError> {
        let tx = self.write_transaction()?;
        let face_id = observation.face_id.to_string();

        let touched = tx.execute(
            "UPDATE faces SET last_seen = ?1 WHERE face_id = ?2",
            params![format_timestamp(&observation.timestamp), face_id],
        )?;
        if touched == 0 {
            return Err(StoreError::UnknownFace(observation.face_id));
        }

        let image = observation.image;
        let replaced = tx.execute(
            "UPDATE faces SET best_image = ?1, best_image_width = ?2, best_image_height = ?3,
                 best_image_channels = ?4, best_confidence = ?5
             WHERE face_id = ?6 AND ?5 > best_confidence",
            params![
                image.data(),
                image.width(),
                image.height(),
                image.channels(),
                observation.confidence,
                face_id,
            ],
        )?;

        insert_detection(&tx, observation)?;
        tx.commit()?;
        Ok(UpdateOutcome {
            best_replaced: replaced > 0,
        })
    }

    fn face(&self, face_id: &FaceId) -> Result<Option<FaceRecord>, StoreError> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {FACE_COLUMNS} FROM faces WHERE face_id = ?1"),
                params![face_id.to_string()],
                FaceRow::read,
            )
            .optional()?;
        row.map(FaceRow::into_record).transpose()
    }

    fn faces(&self) -> Result<Vec<FaceRecord>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {FACE_COLUMNS} FROM faces ORDER BY first_seen, rowid"
        ))?;
        let rows = stmt.query_map([], FaceRow::read)?;
        let faces = rows
            .map(|row| row.map_err(StoreError::from).and_then(FaceRow::into_record))
            .collect();
        faces
    }

    fn detections(&self, face_id: &FaceId) -> Result<Vec<DetectionRecord>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DETECTION_COLUMNS} FROM detections WHERE face_id = ?1 ORDER BY detection_id"
        ))?;
        let rows = stmt.query_map(params![face_id.to_string()], DetectionRow::read)?;
        let detections = rows
            .map(|row| row.map_err(StoreError::from).and_then(DetectionRow::into_record))
            .collect();
        detections
    }
}

fn insert_detection(tx: &Transaction<'_>, observation: &Observation<'_>) -> Result<(), StoreError> {
    let image = observation.image;
    let bbox = observation.bbox;
    tx.execute(
        "INSERT INTO detections (face_id, timestamp, image, image_width, image_height,
             image_channels, confidence, x, y, width, height)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            observation.face_id.to_string(),
            format_timestamp(&observation.timestamp),
            image.data(),
            image.width(),
            image.height(),
            image.channels(),
            observation.confidence,
            bbox.x,
            bbox.y,
            bbox.width,
            bbox.height,
        ],
    )?;
    Ok(())
}

/// Raw column values; decoding into domain types happens outside the
/// rusqlite row callback so decode failures surface as [`StoreError`].
struct FaceRow {
    face_id: String,
    first_seen: String,
    last_seen: String,
    image: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    best_confidence: f64,
}

impl FaceRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            face_id: row.get(0)?,
            first_seen: row.get(1)?,
            last_seen: row.get(2)?,
            image: row.get(3)?,
            width: row.get(4)?,
            height: row.get(5)?,
            channels: row.get(6)?,
            best_confidence: row.get(7)?,
        })
    }

    fn into_record(self) -> Result<FaceRecord, StoreError> {
        Ok(FaceRecord {
            face_id: decode_face_id(&self.face_id)?,
            first_seen: decode_timestamp(&self.first_seen)?,
            last_seen: decode_timestamp(&self.last_seen)?,
            best_image: decode_image(self.image, self.width, self.height, self.channels)?,
            best_confidence: self.best_confidence,
        })
    }
}

struct DetectionRow {
    detection_id: i64,
    face_id: String,
    timestamp: String,
    image: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    confidence: f64,
    bbox: [f64; 4],
}

impl DetectionRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            detection_id: row.get(0)?,
            face_id: row.get(1)?,
            timestamp: row.get(2)?,
            image: row.get(3)?,
            width: row.get(4)?,
            height: row.get(5)?,
            channels: row.get(6)?,
            confidence: row.get(7)?,
            bbox: [row.get(8)?, row.get(9)?, row.get(10)?, row.get(11)?],
        })
    }

    fn into_record(self) -> Result<DetectionRecord, StoreError> {
        Ok(DetectionRecord {
            detection_id: self.detection_id,
            face_id: decode_face_id(&self.face_id)?,
            timestamp: decode_timestamp(&self.timestamp)?,
            image: decode_image(self.image, self.width, self.height, self.channels)?,
            confidence: self.confidence,
            bbox: BoundingBox::from(self.bbox),
        })
    }
}

fn decode_face_id(text: &str) -> Result<FaceId, StoreError> {
    text.parse()
        .map_err(|_| StoreError::Corrupt(format!("invalid face id '{text}'")))
}

fn decode_timestamp(text: &str) -> Result<chrono::DateTime<chrono::Utc>, StoreError> {
    parse_timestamp(text).ok_or_else(|| StoreError::Corrupt(format!("invalid timestamp '{text}'")))
}

fn decode_image(data: Vec<u8>, width: u32, height: u32, channels: u8) -> Result<FaceImage, StoreError> {
    let len = data.len();
    FaceImage::new(data, width, height, channels).ok_or_else(|| {
        StoreError::Corrupt(format!(
            "image of {len} bytes does not match {width}x{height}x{channels}"
        ))
    })
}
