use anyhow::{anyhow, Context};
use rusqlite::{Connection, OpenFlags};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::db::DB_FILE_NAME;

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/coursetrack.sqlite3";
pub const BUNDLE_FORMAT_V1: &str = "coursetrack-workspace-v1";
const LEGACY_FORMAT: &str = "legacy-sqlite3";
const SQLITE_HEADER: &[u8] = b"SQLite format 3\0";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub db_sha256: String,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
}

pub fn export_workspace_bundle(
    workspace_path: &Path,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let db_path = workspace_path.join(DB_FILE_NAME);
    let db_bytes = std::fs::read(&db_path)
        .with_context(|| format!("workspace database not found: {}", db_path.to_string_lossy()))?;
    let db_sha256 = format!("{:x}", Sha256::digest(&db_bytes));

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let out_file = File::create(out_path).with_context(|| {
        format!("failed to create output file {}", out_path.to_string_lossy())
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest = json!({
        "format": BUNDLE_FORMAT_V1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": chrono::Utc::now().to_rfc3339(),
        "dbEntry": DB_ENTRY,
        "dbSha256": db_sha256,
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(serde_json::to_string_pretty(&manifest)?.as_bytes())
        .context("failed to write manifest entry")?;

    zip.start_file(DB_ENTRY, opts)
        .context("failed to start database entry")?;
    zip.write_all(&db_bytes)
        .context("failed to write database entry")?;

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: 2,
        db_sha256,
    })
}

/// Replaces the workspace database with the one in `in_path`.
///
/// The caller must drop its open connection first and reopen afterwards.
pub fn import_workspace_bundle(
    in_path: &Path,
    workspace_path: &Path,
) -> anyhow::Result<ImportSummary> {
    std::fs::create_dir_all(workspace_path).with_context(|| {
        format!("failed to create workspace {}", workspace_path.to_string_lossy())
    })?;

    if !is_zip_file(in_path)? {
        let db_bytes = std::fs::read(in_path).with_context(|| {
            format!("failed to read sqlite backup {}", in_path.to_string_lossy())
        })?;
        install_database(workspace_path, &db_bytes)?;
        return Ok(ImportSummary {
            bundle_format_detected: LEGACY_FORMAT.to_string(),
        });
    }

    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }
    let expected_sha = manifest
        .get("dbSha256")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("manifest.json missing dbSha256"))?
        .to_ascii_lowercase();

    let mut db_bytes = Vec::new();
    archive
        .by_name(DB_ENTRY)
        .context("bundle missing db/coursetrack.sqlite3")?
        .read_to_end(&mut db_bytes)
        .context("failed to extract database entry")?;
    let actual_sha = format!("{:x}", Sha256::digest(&db_bytes));
    if actual_sha != expected_sha {
        return Err(anyhow!(
            "database checksum mismatch: manifest {}, bundle {}",
            expected_sha,
            actual_sha
        ));
    }

    install_database(workspace_path, &db_bytes)?;

    Ok(ImportSummary {
        bundle_format_detected: BUNDLE_FORMAT_V1.to_string(),
    })
}

/// Writes `db_bytes` beside the workspace database, checks that it is an intact
/// SQLite file, then renames it over the live one. Nothing is replaced on failure.
fn install_database(workspace_path: &Path, db_bytes: &[u8]) -> anyhow::Result<()> {
    if !db_bytes.starts_with(SQLITE_HEADER) {
        return Err(anyhow!("not a SQLite database"));
    }
    let dst = workspace_path.join(DB_FILE_NAME);
    let tmp_dst = workspace_path.join(format!("{}.importing", DB_FILE_NAME));
    {
        let mut out = File::create(&tmp_dst).with_context(|| {
            format!("failed to create temp database {}", tmp_dst.to_string_lossy())
        })?;
        out.write_all(db_bytes)
            .context("failed to write extracted database")?;
        out.flush().context("failed to flush extracted database")?;
    }
    if let Err(e) = check_integrity(&tmp_dst) {
        let _ = std::fs::remove_file(&tmp_dst);
        return Err(e);
    }
    std::fs::rename(&tmp_dst, &dst).with_context(|| {
        format!("failed to move extracted database to {}", dst.to_string_lossy())
    })?;
    Ok(())
}

fn check_integrity(path: &Path) -> anyhow::Result<()> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .context("failed to open imported database")?;
    let verdict: String = conn
        .query_row("PRAGMA integrity_check", [], |r| r.get(0))
        .context("imported database failed integrity check")?;
    if verdict != "ok" {
        return Err(anyhow!("imported database failed integrity check: {}", verdict));
    }
    Ok(())
}

fn is_zip_file(path: &Path) -> anyhow::Result<bool> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut sig = [0u8; 4];
    let read = f.read(&mut sig).context("failed to read file signature")?;
    Ok(read == 4 && sig == [0x50, 0x4B, 0x03, 0x04])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> std::path::PathBuf {
        let p = std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&p).expect("create temp dir");
        p
    }

    fn seed_db(path: &Path, marker: &str) -> Vec<u8> {
        {
            let conn = Connection::open(path).expect("open seed db");
            conn.execute_batch("CREATE TABLE marker(v TEXT)").expect("schema");
            conn.execute("INSERT INTO marker(v) VALUES(?)", [marker])
                .expect("insert");
        }
        std::fs::read(path).expect("read seed db")
    }

    #[test]
    fn tampered_bundle_is_rejected() {
        let src = temp_dir("coursetrack-backup-src");
        let dst = temp_dir("coursetrack-backup-dst");
        let original = seed_db(&src.join(DB_FILE_NAME), "original");
        let bundle = src.join("out.zip");
        let summary = export_workspace_bundle(&src, &bundle).expect("export");
        assert_eq!(summary.entry_count, 2);

        // Rebuild the bundle with the original manifest but different database bytes.
        let mut manifest = String::new();
        {
            let mut archive = ZipArchive::new(File::open(&bundle).expect("open")).expect("zip");
            archive
                .by_name(MANIFEST_ENTRY)
                .expect("manifest")
                .read_to_string(&mut manifest)
                .expect("read");
        }
        let forged = src.join("forged.zip");
        {
            let mut zip = ZipWriter::new(File::create(&forged).expect("create"));
            let opts = FileOptions::default();
            zip.start_file(MANIFEST_ENTRY, opts).expect("start");
            zip.write_all(manifest.as_bytes()).expect("write");
            zip.start_file(DB_ENTRY, opts).expect("start");
            zip.write_all(b"swapped bytes").expect("write");
            zip.finish().expect("finish");
        }

        let e = import_workspace_bundle(&forged, &dst).unwrap_err();
        assert!(e.to_string().contains("checksum mismatch"), "{}", e);
        assert!(!dst.join(DB_FILE_NAME).exists());

        let ok = import_workspace_bundle(&bundle, &dst).expect("import");
        assert_eq!(ok.bundle_format_detected, BUNDLE_FORMAT_V1);
        assert_eq!(std::fs::read(dst.join(DB_FILE_NAME)).expect("read"), original);

        let _ = std::fs::remove_dir_all(src);
        let _ = std::fs::remove_dir_all(dst);
    }

    #[test]
    fn bare_file_import_requires_an_intact_sqlite_database() {
        let dir = temp_dir("coursetrack-backup-legacy");
        let workspace = dir.join("ws");
        std::fs::create_dir_all(&workspace).expect("workspace");
        let live = seed_db(&workspace.join(DB_FILE_NAME), "live");

        let notes = dir.join("notes.txt");
        std::fs::write(&notes, b"just some notes, not a database").expect("write notes");
        assert!(import_workspace_bundle(&notes, &workspace).is_err());

        // Right header, garbage body.
        let mut torn = b"SQLite format 3\0".to_vec();
        torn.extend(std::iter::repeat(0xAB).take(4096));
        let torn_path = dir.join("torn.sqlite3");
        std::fs::write(&torn_path, &torn).expect("write torn");
        assert!(import_workspace_bundle(&torn_path, &workspace).is_err());

        assert_eq!(std::fs::read(workspace.join(DB_FILE_NAME)).expect("read"), live);
        assert!(!workspace
            .join(format!("{}.importing", DB_FILE_NAME))
            .exists());

        let replacement = seed_db(&dir.join("backup.sqlite3"), "restored");
        let summary =
            import_workspace_bundle(&dir.join("backup.sqlite3"), &workspace).expect("import");
        assert_eq!(summary.bundle_format_detected, LEGACY_FORMAT);
        assert_eq!(
            std::fs::read(workspace.join(DB_FILE_NAME)).expect("read"),
            replacement
        );

        let _ = std::fs::remove_dir_all(dir);
    }
}
