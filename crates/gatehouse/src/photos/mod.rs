//! Photo asset storage: permanent, hashed visitor photographs plus the
//! short-lived copies handed to the automation agent.
//!
//! Permanent assets are normalized on the way in (re-encoded JPEG, bounded
//! dimensions), content-hashed with SHA-256 and indexed in the
//! `visitor_photos` table with a JSON sidecar next to the bytes. Ephemeral
//! copies live in the scratch directory and are deleted after a single
//! automation run regardless of outcome.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use base64::Engine as _;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::db::photo_repo::{self, PhotoRow};
use crate::db::Database;
use crate::error::{GatehouseError, StorageError};

/// Permanent photos are bounded to this edge length; larger images are
/// downscaled preserving aspect ratio.
const MAX_DIMENSION: u32 = 1024;

/// Prefix for ephemeral automation copies in the scratch directory.
const EPHEMERAL_PREFIX: &str = "automation_";

/// Identity metadata stored in the sidecar and the photo index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhotoMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub document: String,
    #[serde(default)]
    pub phone: String,
}

/// Health of one stored asset as reported by `verify_integrity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    Valid,
    Corrupted,
    Missing,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssetHealth {
    pub filename: String,
    pub status: AssetStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub visitor_id: String,
    pub total: usize,
    pub valid: usize,
    pub corrupted: usize,
    pub missing: usize,
    pub details: Vec<AssetHealth>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhotoStats {
    pub visitors: u64,
    pub photos: u64,
    pub total_bytes: u64,
    pub scratch_files: usize,
}

pub struct PhotoStore {
    photo_dir: PathBuf,
    scratch_dir: PathBuf,
    db: Database,
}

impl PhotoStore {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(
        photo_dir: P,
        scratch_dir: Q,
        db: Database,
    ) -> Result<Self, StorageError> {
        let photo_dir = photo_dir.as_ref().to_path_buf();
        let scratch_dir = scratch_dir.as_ref().to_path_buf();
        for dir in [&photo_dir, &scratch_dir] {
            std::fs::create_dir_all(dir).map_err(|e| StorageError::CreateDirectory {
                path: dir.clone(),
                source: e,
            })?;
        }
        Ok(Self {
            photo_dir,
            scratch_dir,
            db,
        })
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Derives a visitor id from normalized identity fields plus a
    /// timestamp: reproducible enough for de-duplication, while the
    /// timestamp disambiguates same-named visitors registered over time.
    pub fn generate_id(name: &str, document: &str, phone: Option<&str>) -> String {
        let name_clean = normalize(name);
        let document_clean = normalize(document);

        let mut hash_input = format!("{}_{}", name_clean, document_clean);
        if let Some(phone) = phone {
            hash_input.push('_');
            hash_input.push_str(&normalize(phone));
        }

        let digest = hex_digest(hash_input.as_bytes());
        let timestamp = chrono::Utc::now().timestamp();

        let name_prefix: String = name_clean.chars().take(8).collect();
        format!(
            "visitor_{}_{}_{}",
            name_prefix,
            &digest[..8],
            timestamp
        )
    }

    /// Decodes, normalizes and persists a photo, recording it in the index.
    pub fn store(
        &self,
        visitor_id: &str,
        encoded: &str,
        metadata: &PhotoMetadata,
    ) -> Result<PhotoRow, GatehouseError> {
        let raw = decode_base64(encoded)?;
        let normalized = normalize_image(&raw)?;
        let content_hash = hex_digest(&normalized);

        let timestamp = chrono::Utc::now().timestamp();
        let filename = format!("{}_photo_{}.jpg", visitor_id, timestamp);
        let file_path = self.photo_dir.join(&filename);

        std::fs::write(&file_path, &normalized).map_err(|e| StorageError::WriteFile {
            path: file_path.clone(),
            source: e,
        })?;

        let row = PhotoRow {
            visitor_id: visitor_id.to_string(),
            filename: filename.clone(),
            file_path: file_path.display().to_string(),
            content_hash: content_hash.clone(),
            file_size: normalized.len() as u64,
            metadata: serde_json::to_string(metadata).ok(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        // Sidecar before the index row; a photo without an index row is
        // recoverable, the reverse is not.
        let sidecar_path = file_path.with_extension("json");
        let sidecar = serde_json::json!({
            "visitor_id": visitor_id,
            "filename": filename,
            "content_hash": content_hash,
            "file_size": normalized.len(),
            "created_at": row.created_at,
            "metadata": metadata,
        });
        std::fs::write(
            &sidecar_path,
            serde_json::to_vec_pretty(&sidecar).unwrap_or_default(),
        )
        .map_err(|e| StorageError::WriteFile {
            path: sidecar_path,
            source: e,
        })?;

        photo_repo::insert(&self.db, &row)?;

        log::info!(
            "Stored photo {} for {} ({} bytes, hash {})",
            row.filename,
            visitor_id,
            row.file_size,
            &content_hash[..16]
        );

        Ok(row)
    }

    /// Writes a short-lived copy for one automation run. The caller owns
    /// cleanup via `cleanup` after use.
    pub fn ephemeral_copy_for_automation(
        &self,
        visitor_id: &str,
        encoded: &str,
    ) -> Result<PathBuf, StorageError> {
        let raw = decode_base64(encoded)?;
        // Uuid rather than a timestamp: two runs for the same visitor can
        // land within the same second.
        let path = self.scratch_dir.join(format!(
            "{}{}_{}.jpg",
            EPHEMERAL_PREFIX,
            visitor_id,
            uuid::Uuid::new_v4().simple()
        ));

        std::fs::write(&path, &raw).map_err(|e| StorageError::WriteFile {
            path: path.clone(),
            source: e,
        })?;

        log::debug!("Ephemeral photo copy created at {}", path.display());
        Ok(path)
    }

    /// Best-effort removal of an ephemeral copy. Never fatal.
    pub fn cleanup(path: &Path) -> bool {
        match std::fs::remove_file(path) {
            Ok(()) => {
                log::debug!("Removed ephemeral copy {}", path.display());
                true
            }
            Err(e) => {
                log::warn!("Failed to remove ephemeral copy {}: {}", path.display(), e);
                false
            }
        }
    }

    /// Recomputes the hash of every stored file for a visitor and compares
    /// it to the recorded hash.
    pub fn verify_integrity(&self, visitor_id: &str) -> Result<IntegrityReport, GatehouseError> {
        let rows = photo_repo::for_visitor(&self.db, visitor_id)?;
        let mut report = IntegrityReport {
            visitor_id: visitor_id.to_string(),
            total: rows.len(),
            valid: 0,
            corrupted: 0,
            missing: 0,
            details: Vec::with_capacity(rows.len()),
        };

        for row in rows {
            let path = Path::new(&row.file_path);
            let status = match std::fs::read(path) {
                Err(_) => AssetStatus::Missing,
                Ok(bytes) if hex_digest(&bytes) == row.content_hash => AssetStatus::Valid,
                Ok(_) => AssetStatus::Corrupted,
            };
            match status {
                AssetStatus::Valid => report.valid += 1,
                AssetStatus::Corrupted => report.corrupted += 1,
                AssetStatus::Missing => report.missing += 1,
            }
            report.details.push(AssetHealth {
                filename: row.filename,
                status,
            });
        }

        Ok(report)
    }

    /// All photo records for a visitor.
    pub fn photos_for(&self, visitor_id: &str) -> Result<Vec<PhotoRow>, GatehouseError> {
        Ok(photo_repo::for_visitor(&self.db, visitor_id)?)
    }

    /// Duplicate detection by content hash.
    pub fn find_by_hash(&self, content_hash: &str) -> Result<Option<PhotoRow>, GatehouseError> {
        Ok(photo_repo::find_by_hash(&self.db, content_hash)?)
    }

    /// Removes a visitor's photos: index rows, bytes and sidecars.
    pub fn delete_for_visitor(&self, visitor_id: &str) -> Result<usize, GatehouseError> {
        let removed = photo_repo::delete_for_visitor(&self.db, visitor_id)?;
        for row in &removed {
            let path = PathBuf::from(&row.file_path);
            if let Err(e) = std::fs::remove_file(&path) {
                log::warn!("Failed to remove photo file {}: {}", path.display(), e);
            }
            let _ = std::fs::remove_file(path.with_extension("json"));
        }
        Ok(removed.len())
    }

    /// Removes scratch copies older than `max_age`. Returns the count.
    pub fn purge_stale(&self, max_age: Duration) -> usize {
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let entries = match std::fs::read_dir(&self.scratch_dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Scratch purge skipped: {}", e);
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.filter_map(|e| e.ok()) {
            let name = entry.file_name();
            if !name.to_string_lossy().starts_with(EPHEMERAL_PREFIX) {
                continue;
            }
            let stale = entry
                .metadata()
                .and_then(|m| m.modified())
                .map(|modified| modified < cutoff)
                .unwrap_or(false);
            if stale && std::fs::remove_file(entry.path()).is_ok() {
                removed += 1;
            }
        }

        if removed > 0 {
            log::info!("Purged {} stale scratch photo(s)", removed);
        }
        removed
    }

    pub fn statistics(&self) -> Result<PhotoStats, GatehouseError> {
        let (visitors, photos, total_bytes) = photo_repo::totals(&self.db)?;
        let scratch_files = std::fs::read_dir(&self.scratch_dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_name().to_string_lossy().starts_with(EPHEMERAL_PREFIX))
                    .count()
            })
            .unwrap_or(0);

        Ok(PhotoStats {
            visitors,
            photos,
            total_bytes,
            scratch_files,
        })
    }
}

/// Lowercase, alphanumeric-only rendition of an identity field.
fn normalize(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Strips an optional data-URL prefix and base64-decodes.
fn decode_base64(encoded: &str) -> Result<Vec<u8>, StorageError> {
    let payload = match encoded.split_once(',') {
        Some((prefix, rest)) if prefix.contains("base64") => rest,
        _ => encoded,
    };
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| StorageError::DecodePhoto(e.to_string()))
}

/// Re-encodes to JPEG, downscaling so neither edge exceeds `MAX_DIMENSION`.
fn normalize_image(raw: &[u8]) -> Result<Vec<u8>, StorageError> {
    let img = image::load_from_memory(raw)
        .map_err(|e| StorageError::ProcessImage(e.to_string()))?;

    let img = if img.width() > MAX_DIMENSION || img.height() > MAX_DIMENSION {
        img.thumbnail(MAX_DIMENSION, MAX_DIMENSION)
    } else {
        img
    };

    let mut out = Cursor::new(Vec::new());
    img.to_rgb8()
        .write_to(&mut out, ImageFormat::Jpeg)
        .map_err(|e| StorageError::ProcessImage(e.to_string()))?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, PhotoStore) {
        let tmp = TempDir::new().unwrap();
        let db = Database::open_in_memory().unwrap();
        let store = PhotoStore::new(
            tmp.path().join("photos"),
            tmp.path().join("temp"),
            db,
        )
        .unwrap();
        (tmp, store)
    }

    /// 4x4 red PNG encoded in memory.
    fn sample_photo_base64() -> String {
        let img = image::RgbImage::from_pixel(4, 4, image::Rgb([200, 30, 30]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        base64::engine::general_purpose::STANDARD.encode(out.into_inner())
    }

    fn sample_metadata() -> PhotoMetadata {
        PhotoMetadata {
            name: "João Silva Santos".to_string(),
            document: "123.456.789-01".to_string(),
            phone: "(11) 99999-9999".to_string(),
        }
    }

    #[test]
    fn test_generate_id_shape() {
        let id = PhotoStore::generate_id("João Silva Santos", "123.456.789-01", Some("11999999999"));
        assert!(id.starts_with("visitor_joãosilv"), "unexpected id: {}", id);
        assert_eq!(id.split('_').count(), 4);
    }

    #[test]
    fn test_generate_id_distinguishes_documents() {
        let a = PhotoStore::generate_id("Ana Souza", "111", None);
        let b = PhotoStore::generate_id("Ana Souza", "222", None);
        // Same name, different document: the digest segment must differ.
        assert_ne!(a.split('_').nth(2), b.split('_').nth(2));
    }

    #[test]
    fn test_store_round_trip_hash_is_stable() {
        let (_tmp, store) = test_store();
        let encoded = sample_photo_base64();

        let row = store.store("v1", &encoded, &sample_metadata()).unwrap();

        let bytes = std::fs::read(&row.file_path).unwrap();
        assert_eq!(hex_digest(&bytes), row.content_hash);

        // Index row and sidecar both present.
        assert_eq!(store.photos_for("v1").unwrap().len(), 1);
        assert!(PathBuf::from(&row.file_path).with_extension("json").exists());
    }

    #[test]
    fn test_store_accepts_data_url_prefix() {
        let (_tmp, store) = test_store();
        let encoded = format!("data:image/png;base64,{}", sample_photo_base64());
        let row = store.store("v1", &encoded, &sample_metadata()).unwrap();
        assert!(row.file_size > 0);
    }

    #[test]
    fn test_store_rejects_garbage() {
        let (_tmp, store) = test_store();
        let err = store.store("v1", "not base64 at all!!", &sample_metadata());
        assert!(err.is_err());
    }

    #[test]
    fn test_store_bounds_large_images() {
        let (_tmp, store) = test_store();
        let img = image::RgbImage::from_pixel(2000, 500, image::Rgb([10, 10, 10]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        let encoded = base64::engine::general_purpose::STANDARD.encode(out.into_inner());

        let row = store.store("v1", &encoded, &sample_metadata()).unwrap();
        let stored = image::open(&row.file_path).unwrap();
        assert!(stored.width() <= MAX_DIMENSION);
        assert!(stored.height() <= MAX_DIMENSION);
    }

    #[test]
    fn test_ephemeral_copy_lifecycle() {
        let (_tmp, store) = test_store();
        let path = store
            .ephemeral_copy_for_automation("v1", &sample_photo_base64())
            .unwrap();
        assert!(path.exists());
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(EPHEMERAL_PREFIX));

        assert!(PhotoStore::cleanup(&path));
        assert!(!path.exists());
        // Second cleanup is a no-op, not a failure path.
        assert!(!PhotoStore::cleanup(&path));
    }

    #[test]
    fn test_verify_integrity_flags_corruption_and_missing() {
        let (_tmp, store) = test_store();
        let encoded = sample_photo_base64();

        let good = store.store("v1", &encoded, &sample_metadata()).unwrap();
        let corrupt = store.store("v1", &encoded, &sample_metadata()).unwrap();
        let gone = store.store("v1", &encoded, &sample_metadata()).unwrap();

        std::fs::write(&corrupt.file_path, b"tampered").unwrap();
        std::fs::remove_file(&gone.file_path).unwrap();

        let report = store.verify_integrity("v1").unwrap();
        assert_eq!(report.total, 3);
        assert_eq!(report.valid, 1);
        assert_eq!(report.corrupted, 1);
        assert_eq!(report.missing, 1);

        let health: Vec<_> = report
            .details
            .iter()
            .map(|d| (d.filename.as_str(), d.status.clone()))
            .collect();
        assert!(health.contains(&(good.filename.as_str(), AssetStatus::Valid)));
    }

    #[test]
    fn test_find_by_hash_detects_duplicates() {
        let (_tmp, store) = test_store();
        let encoded = sample_photo_base64();
        let row = store.store("v1", &encoded, &sample_metadata()).unwrap();

        let dup = store.find_by_hash(&row.content_hash).unwrap();
        assert!(dup.is_some());
        assert_eq!(dup.unwrap().visitor_id, "v1");
    }

    #[test]
    fn test_purge_stale_only_removes_old_ephemeral_files() {
        let (_tmp, store) = test_store();
        let old = store
            .ephemeral_copy_for_automation("old", &sample_photo_base64())
            .unwrap();
        let unrelated = store.scratch_dir().join("payload.json");
        std::fs::write(&unrelated, b"{}").unwrap();

        // Zero max-age: every ephemeral file is stale.
        std::thread::sleep(Duration::from_millis(50));
        let removed = store.purge_stale(Duration::ZERO);
        assert_eq!(removed, 1);
        assert!(!old.exists());
        assert!(unrelated.exists());
    }

    #[test]
    fn test_statistics() {
        let (_tmp, store) = test_store();
        let encoded = sample_photo_base64();
        store.store("v1", &encoded, &sample_metadata()).unwrap();
        store.store("v2", &encoded, &sample_metadata()).unwrap();
        store
            .ephemeral_copy_for_automation("v1", &encoded)
            .unwrap();

        let stats = store.statistics().unwrap();
        assert_eq!(stats.visitors, 2);
        assert_eq!(stats.photos, 2);
        assert!(stats.total_bytes > 0);
        assert_eq!(stats.scratch_files, 1);
    }

    #[test]
    fn test_delete_for_visitor_removes_files_and_rows() {
        let (_tmp, store) = test_store();
        let encoded = sample_photo_base64();
        let row = store.store("v1", &encoded, &sample_metadata()).unwrap();

        let removed = store.delete_for_visitor("v1").unwrap();
        assert_eq!(removed, 1);
        assert!(!Path::new(&row.file_path).exists());
        assert!(store.photos_for("v1").unwrap().is_empty());
    }
}
