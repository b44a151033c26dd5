//! Photo index: one row per stored photo, keyed by visitor id.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};

#[derive(Debug, Clone)]
pub struct PhotoRow {
    pub visitor_id: String,
    pub filename: String,
    pub file_path: String,
    pub content_hash: String,
    pub file_size: u64,
    pub metadata: Option<String>,
    pub created_at: String,
}

impl PhotoRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            visitor_id: row.get("visitor_id")?,
            filename: row.get("filename")?,
            file_path: row.get("file_path")?,
            content_hash: row.get("content_hash")?,
            file_size: row.get("file_size")?,
            metadata: row.get("metadata")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Records a stored photo.
pub fn insert(db: &Database, photo: &PhotoRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO visitor_photos
                 (visitor_id, filename, file_path, content_hash, file_size, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                photo.visitor_id,
                photo.filename,
                photo.file_path,
                photo.content_hash,
                photo.file_size,
                photo.metadata,
                photo.created_at,
            ],
        )?;
        Ok(())
    })
}

/// All photo records for a visitor, oldest first.
pub fn for_visitor(db: &Database, visitor_id: &str) -> Result<Vec<PhotoRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn
            .prepare("SELECT * FROM visitor_photos WHERE visitor_id = ?1 ORDER BY id ASC")?;
        let rows: Vec<PhotoRow> = stmt
            .query_map(params![visitor_id], PhotoRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Finds a photo record by content hash (duplicate detection).
pub fn find_by_hash(db: &Database, content_hash: &str) -> Result<Option<PhotoRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM visitor_photos WHERE content_hash = ?1 LIMIT 1",
                params![content_hash],
                PhotoRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Deletes all photo records for a visitor, returning the removed rows so
/// the caller can unlink the files.
pub fn delete_for_visitor(db: &Database, visitor_id: &str) -> Result<Vec<PhotoRow>, DatabaseError> {
    let rows = for_visitor(db, visitor_id)?;
    db.with_conn(|conn| {
        conn.execute(
            "DELETE FROM visitor_photos WHERE visitor_id = ?1",
            params![visitor_id],
        )?;
        Ok(())
    })?;
    Ok(rows)
}

/// Totals across the photo index: (visitors, photos, bytes).
pub fn totals(db: &Database) -> Result<(u64, u64, u64), DatabaseError> {
    db.with_conn(|conn| {
        let row = conn.query_row(
            "SELECT COUNT(DISTINCT visitor_id), COUNT(*), COALESCE(SUM(file_size), 0)
             FROM visitor_photos",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )?;
        Ok(row)
    })
}
