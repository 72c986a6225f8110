//! Worker documents and folders. Files live under
//! `<data dir>/documents/<worker id>/`; the database keeps the metadata.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use crate::config::Config;
use crate::db::{Database, Repository};
use crate::models::Document;

/// Copies `source` into the worker's document directory and records it.
pub fn add(
    db: &Database,
    config: &Config,
    actor: &str,
    worker_id: i64,
    folder_id: Option<i64>,
    source: &Path,
    name: Option<&str>,
) -> Result<Document> {
    if db.get_worker(worker_id)?.is_none() {
        return Err(anyhow!("Worker #{} not found", worker_id));
    }
    if let Some(folder_id) = folder_id {
        check_folder(db, worker_id, folder_id)?;
    }

    let file_name = source
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("{} is not a file", source.display()))?;
    let name = name.map(str::trim).filter(|n| !n.is_empty()).unwrap_or(file_name);

    let dir = config.documents_dir(worker_id);
    std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let dest = dir.join(format!("{}_{}", uuid::Uuid::new_v4(), file_name));
    std::fs::copy(source, &dest)
        .with_context(|| format!("Failed to copy {} into document storage", source.display()))?;

    let id = db.add_document(worker_id, folder_id, name, &dest.to_string_lossy())?;
    db.log_audit(actor, "document.add", Some(&format!("{} for worker #{}", name, worker_id)))?;
    tracing::info!(document_id = id, worker_id, path = %dest.display(), "document stored");

    db.get_document(id)?
        .ok_or_else(|| anyhow!("Document #{} vanished after insert", id))
}

/// Moves a document into `folder_id`, or to the root with `None`.
pub fn move_to(db: &Database, document_id: i64, folder_id: Option<i64>) -> Result<()> {
    let document = db
        .get_document(document_id)?
        .ok_or_else(|| anyhow!("Document #{} not found", document_id))?;
    if let Some(folder_id) = folder_id {
        check_folder(db, document.worker_id, folder_id)?;
    }
    db.move_document(document_id, folder_id)
}

/// Removes the record and its stored file. A file that is already gone is
/// only logged.
pub fn delete(db: &Database, actor: &str, document_id: i64) -> Result<Document> {
    let document = db
        .get_document(document_id)?
        .ok_or_else(|| anyhow!("Document #{} not found", document_id))?;
    db.delete_document(document_id)?;

    let path = PathBuf::from(&document.storage_path);
    if let Err(e) = std::fs::remove_file(&path) {
        tracing::warn!(path = %path.display(), "Could not remove stored file: {}", e);
    }
    db.log_audit(
        actor,
        "document.delete",
        Some(&format!("{} of worker #{}", document.name, document.worker_id)),
    )?;
    Ok(document)
}

pub fn create_folder(db: &Database, actor: &str, worker_id: i64, name: &str) -> Result<i64> {
    let name = name.trim();
    if name.is_empty() {
        return Err(anyhow!("Folder name cannot be empty"));
    }
    if db.get_worker(worker_id)?.is_none() {
        return Err(anyhow!("Worker #{} not found", worker_id));
    }
    let id = db.create_folder(worker_id, name)?;
    db.log_audit(actor, "folder.create", Some(&format!("{} for worker #{}", name, worker_id)))?;
    Ok(id)
}

/// Deletes a folder; its documents move to the root. Returns how many moved.
pub fn delete_folder(db: &mut Database, actor: &str, worker_id: i64, folder_id: i64) -> Result<usize> {
    let moved = db
        .delete_folder(worker_id, folder_id)?
        .ok_or_else(|| anyhow!("Folder #{} not found for worker #{}", folder_id, worker_id))?;
    db.log_audit(
        actor,
        "folder.delete",
        Some(&format!("folder #{} of worker #{}, {} documents to root", folder_id, worker_id, moved)),
    )?;
    Ok(moved)
}

fn check_folder(db: &Database, worker_id: i64, folder_id: i64) -> Result<()> {
    match db.get_folder(folder_id)? {
        Some(folder) if folder.worker_id == worker_id => Ok(()),
        _ => Err(anyhow!("Folder #{} not found for worker #{}", folder_id, worker_id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::new_worker;
    use crate::models::WorkerStatus;

    fn setup() -> (tempfile::TempDir, Config, Database, i64) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default_for(dir.path().join("data"));
        let db = Database::open_in_memory().unwrap();
        let worker = db.create_worker(&new_worker("d@example.com"), WorkerStatus::Active).unwrap();
        (dir, config, db, worker)
    }

    fn source_file(dir: &tempfile::TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, b"scan").unwrap();
        path
    }

    #[test]
    fn test_add_copies_file() {
        let (dir, config, db, worker) = setup();
        let source = source_file(&dir, "card.pdf");

        let doc = add(&db, &config, "office", worker, None, &source, Some("ID card")).unwrap();
        assert_eq!(doc.name, "ID card");
        assert!(doc.folder_id.is_none());

        let stored = PathBuf::from(&doc.storage_path);
        assert!(stored.starts_with(config.documents_dir(worker)));
        assert_eq!(std::fs::read(stored).unwrap(), b"scan");
        assert!(source.exists());
    }

    #[test]
    fn test_add_rejects_foreign_folder() {
        let (dir, config, db, worker) = setup();
        let other = db.create_worker(&new_worker("o@example.com"), WorkerStatus::Active).unwrap();
        let folder = create_folder(&db, "office", other, "Other").unwrap();
        let source = source_file(&dir, "card.pdf");

        assert!(add(&db, &config, "office", worker, Some(folder), &source, None).is_err());
        assert!(db.list_documents(worker).unwrap().is_empty());
    }

    #[test]
    fn test_move_and_delete_folder() {
        let (dir, config, mut db, worker) = setup();
        let folder = create_folder(&db, "office", worker, "Permits").unwrap();
        let a = add(&db, &config, "office", worker, None, &source_file(&dir, "a.pdf"), None).unwrap();
        let b = add(&db, &config, "office", worker, None, &source_file(&dir, "b.pdf"), None).unwrap();

        move_to(&db, a.id, Some(folder)).unwrap();
        move_to(&db, b.id, Some(folder)).unwrap();
        assert!(db.list_documents(worker).unwrap().iter().all(|d| d.folder_id == Some(folder)));

        assert_eq!(delete_folder(&mut db, "office", worker, folder).unwrap(), 2);
        assert!(db.list_documents(worker).unwrap().iter().all(|d| d.folder_id.is_none()));
        assert!(delete_folder(&mut db, "office", worker, folder).is_err());
    }

    #[test]
    fn test_delete_removes_file() {
        let (dir, config, db, worker) = setup();
        let doc = add(&db, &config, "office", worker, None, &source_file(&dir, "a.pdf"), None).unwrap();

        delete(&db, "office", doc.id).unwrap();
        assert!(!PathBuf::from(&doc.storage_path).exists());
        assert!(db.get_document(doc.id).unwrap().is_none());
        assert!(delete(&db, "office", doc.id).is_err());
    }

    #[test]
    fn test_create_folder_requires_name() {
        let (_dir, _config, db, worker) = setup();
        assert!(create_folder(&db, "office", worker, "  ").is_err());
    }
}
