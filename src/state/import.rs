/// Folder import into the photo catalog
///
/// Walks a folder tree, picks out photos by extension and records each one
/// with its creation timestamp. The timestamp comes from EXIF
/// `DateTimeOriginal` (or `DateTime`) and falls back to the file system
/// when the file carries no usable EXIF date.

use chrono::{DateTime, FixedOffset, Local, NaiveDate, TimeZone, Utc};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::library::{ImportOutcome, Library};
use crate::error::Result;

/// Supported photo extensions: common codecs plus RAW formats, whose
/// embedded JPEG previews are used for thumbnails
pub const PHOTO_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "tif", "tiff", "webp", "bmp", "gif", "nef", "dng", "cr2", "cr3", "arw",
    "raf", "orf", "rw2", "pef", "srw", "erf", "kdc", "dcr", "mos", "raw", "rwl",
];

/// Result of a folder import operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportResult {
    pub imported_count: usize,
    /// Previously deleted rows brought back by this import
    pub restored_count: usize,
    pub skipped_count: usize,
}

/// Import every photo under `folder_path` into the catalog at `db_path`.
/// Runs on the blocking pool so the runtime stays responsive.
pub async fn import_folder_async(folder_path: PathBuf, db_path: PathBuf) -> Result<ImportResult> {
    tokio::task::spawn_blocking(move || {
        // rusqlite::Connection is not Sync, so the blocking task opens its own
        let library = Library::open(&db_path)?;
        import_folder(&library, &folder_path)
    })
    .await?
}

pub fn import_folder(library: &Library, folder_path: &Path) -> Result<ImportResult> {
    let mut result = ImportResult::default();

    log::info!("Scanning folder: {}", folder_path.display());

    for entry in WalkDir::new(folder_path)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();

        if !path.is_file() || !is_supported_photo(path) {
            continue;
        }

        let path_str = path.to_string_lossy().to_string();
        let filename = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        let Some(created_at) = creation_timestamp(path) else {
            log::warn!("No creation date for {}, skipping", filename);
            result.skipped_count += 1;
            continue;
        };

        match library.import_asset(&path_str, &filename, created_at)? {
            ImportOutcome::Inserted(_) => {
                result.imported_count += 1;
                if result.imported_count % 100 == 0 {
                    log::info!("Imported {} files...", result.imported_count);
                }
            }
            ImportOutcome::Restored(_) => result.restored_count += 1,
            ImportOutcome::Duplicate => result.skipped_count += 1,
        }
    }

    log::info!(
        "Import complete: {} new, {} restored, {} skipped",
        result.imported_count,
        result.restored_count,
        result.skipped_count
    );

    Ok(result)
}

pub fn is_supported_photo(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| PHOTO_EXTENSIONS.contains(&ext.as_str()))
}

/// Best-known creation time of a photo file
pub fn creation_timestamp(path: &Path) -> Option<DateTime<Utc>> {
    exif_timestamp(path).or_else(|| filesystem_timestamp(path))
}

fn exif_timestamp(path: &Path) -> Option<DateTime<Utc>> {
    let file = File::open(path).ok()?;
    let exif = exif::Reader::new()
        .read_from_container(&mut BufReader::new(file))
        .ok()?;

    let (field, offset_tag) = exif
        .get_field(exif::Tag::DateTimeOriginal, exif::In::PRIMARY)
        .map(|f| (f, exif::Tag::OffsetTimeOriginal))
        .or_else(|| {
            exif.get_field(exif::Tag::DateTime, exif::In::PRIMARY)
                .map(|f| (f, exif::Tag::OffsetTime))
        })?;

    let mut stamp = match field.value {
        exif::Value::Ascii(ref parts) => exif::DateTime::from_ascii(parts.first()?).ok()?,
        _ => return None,
    };

    if let Some(offset_field) = exif.get_field(offset_tag, exif::In::PRIMARY) {
        if let exif::Value::Ascii(ref parts) = offset_field.value {
            if let Some(bytes) = parts.first() {
                let _ = stamp.parse_offset(bytes);
            }
        }
    }

    exif_to_utc(&stamp)
}

/// EXIF dates carry no zone unless an offset tag is present; zoneless
/// values are camera wall-clock time and are read in the local zone
fn exif_to_utc(stamp: &exif::DateTime) -> Option<DateTime<Utc>> {
    let naive = NaiveDate::from_ymd_opt(
        i32::from(stamp.year),
        u32::from(stamp.month),
        u32::from(stamp.day),
    )?
    .and_hms_nano_opt(
        u32::from(stamp.hour),
        u32::from(stamp.minute),
        u32::from(stamp.second),
        stamp.nanosecond.unwrap_or(0),
    )?;

    match stamp.offset {
        Some(minutes) => FixedOffset::east_opt(i32::from(minutes) * 60)?
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc)),
        // Ambiguous wall-clock times (DST fall-back) take the earlier instant
        None => Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc)),
    }
}

fn filesystem_timestamp(path: &Path) -> Option<DateTime<Utc>> {
    let metadata = std::fs::metadata(path).ok()?;
    metadata
        .created()
        .or_else(|_| metadata.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}
