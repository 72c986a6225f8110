//! HR approval workflow: approving, rejecting and adding workers.

use anyhow::{anyhow, Result};

use crate::auth;
use crate::config::Config;
use crate::db::Repository;
use crate::email::Mailer;
use crate::models::{NewWorker, Worker, WorkerStatus};

#[derive(Debug)]
pub struct Approval {
    pub worker: Worker,
    pub email_sent: bool,
}

/// Activates a pending worker and mails them a fresh one-time password.
///
/// The approval is stored before the e-mail goes out; a mail failure is
/// reported through `email_sent` and does not undo it.
pub fn approve(repo: &dyn Repository, mailer: &dyn Mailer, actor: &str, worker_id: i64) -> Result<Approval> {
    let worker = repo
        .get_worker(worker_id)?
        .ok_or_else(|| anyhow!("Worker #{} not found", worker_id))?;
    if worker.status != WorkerStatus::Pending {
        return Err(anyhow!("Worker #{} is already {}", worker_id, worker.status));
    }

    let password = auth::generate_password();
    let hash = auth::hash_password(&password)?;
    repo.set_worker_status(worker_id, WorkerStatus::Active, Some(&hash))?;
    repo.log_audit(actor, "worker.approve", Some(&format!("worker #{} {}", worker_id, worker.email)))?;
    tracing::info!(worker_id, email = %worker.email, "worker approved");

    let email_sent = match mailer.send_password(&worker.email, &worker.name, &password) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(worker_id, "Password e-mail failed: {:#}", e);
            false
        }
    };

    let worker = repo
        .get_worker(worker_id)?
        .ok_or_else(|| anyhow!("Worker #{} vanished during approval", worker_id))?;
    Ok(Approval { worker, email_sent })
}

/// Deletes a pending registration together with its documents, folders
/// and contracts. Stored document files are removed from disk as well.
pub fn reject(repo: &dyn Repository, config: &Config, actor: &str, worker_id: i64) -> Result<Worker> {
    let worker = repo
        .get_worker(worker_id)?
        .ok_or_else(|| anyhow!("Worker #{} not found", worker_id))?;
    if worker.status != WorkerStatus::Pending {
        return Err(anyhow!(
            "Worker #{} is {}; only pending registrations can be rejected",
            worker_id,
            worker.status
        ));
    }

    repo.delete_worker(worker_id)?;

    let dir = config.documents_dir(worker_id);
    match std::fs::remove_dir_all(&dir) {
        Ok(()) => tracing::debug!(worker_id, path = %dir.display(), "stored documents removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %dir.display(), "Could not remove stored documents: {}", e),
    }
    repo.log_audit(actor, "worker.reject", Some(&format!("worker #{} {}", worker_id, worker.email)))?;
    tracing::info!(worker_id, email = %worker.email, "registration rejected");
    Ok(worker)
}

/// Admin-side add: the worker is active at once and gets no password
/// e-mail until one is issued.
pub fn add_active(repo: &dyn Repository, actor: &str, worker: &NewWorker) -> Result<i64> {
    if worker.name.trim().is_empty() || worker.surname.trim().is_empty() || worker.email.trim().is_empty() {
        return Err(anyhow!("Name, surname and e-mail are required"));
    }
    let id = repo.create_worker(worker, WorkerStatus::Active)?;
    repo.log_audit(actor, "worker.add", Some(&format!("worker #{} {}", id, worker.email)))?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::new_worker;
    use crate::db::Database;
    use crate::documents;
    use crate::email::tests::RecordingMailer;

    #[test]
    fn test_approve_pending_worker() {
        let db = Database::open_in_memory().unwrap();
        let id = db.create_worker(&new_worker("janis@example.com"), WorkerStatus::Pending).unwrap();
        let mailer = RecordingMailer::default();

        let approval = approve(&db, &mailer, "office", id).unwrap();

        assert!(approval.email_sent);
        assert_eq!(approval.worker.status, WorkerStatus::Active);

        let sent = mailer.sent.borrow();
        assert_eq!(sent.len(), 1);
        let (email, name, password) = &sent[0];
        assert_eq!(email, "janis@example.com");
        assert_eq!(name, "Jānis");
        assert_eq!(password.len(), 6);
        assert!(password.chars().all(|c| c.is_ascii_digit()));

        assert!(auth::verify_worker(&db, "janis@example.com", password).unwrap());
        assert_eq!(db.list_audit(10).unwrap()[0].action, "worker.approve");
    }

    #[test]
    fn test_approve_twice_fails_without_second_email() {
        let db = Database::open_in_memory().unwrap();
        let id = db.create_worker(&new_worker("a@example.com"), WorkerStatus::Pending).unwrap();
        let mailer = RecordingMailer::default();

        approve(&db, &mailer, "office", id).unwrap();
        assert!(approve(&db, &mailer, "office", id).is_err());
        assert_eq!(mailer.sent.borrow().len(), 1);
    }

    #[test]
    fn test_approval_survives_mail_failure() {
        let db = Database::open_in_memory().unwrap();
        let id = db.create_worker(&new_worker("a@example.com"), WorkerStatus::Pending).unwrap();
        let mailer = RecordingMailer {
            fail: true,
            ..Default::default()
        };

        let approval = approve(&db, &mailer, "office", id).unwrap();
        assert!(!approval.email_sent);
        assert_eq!(db.get_worker(id).unwrap().unwrap().status, WorkerStatus::Active);
    }

    #[test]
    fn test_reject_deletes_pending_only() {
        let db = Database::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default_for(dir.path().to_path_buf());
        let pending = db.create_worker(&new_worker("p@example.com"), WorkerStatus::Pending).unwrap();
        let active = db.create_worker(&new_worker("a@example.com"), WorkerStatus::Active).unwrap();

        reject(&db, &config, "office", pending).unwrap();
        assert!(db.get_worker(pending).unwrap().is_none());

        assert!(reject(&db, &config, "office", active).is_err());
        assert!(db.get_worker(active).unwrap().is_some());
        assert!(reject(&db, &config, "office", 999).is_err());
    }

    #[test]
    fn test_reject_removes_stored_documents() {
        let db = Database::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default_for(dir.path().join("data"));
        let pending = db.create_worker(&new_worker("p@example.com"), WorkerStatus::Pending).unwrap();
        let other = db.create_worker(&new_worker("o@example.com"), WorkerStatus::Pending).unwrap();

        let scan = dir.path().join("id-card.jpg");
        std::fs::write(&scan, b"scan").unwrap();
        let doc = documents::add(&db, &config, "office", pending, None, &scan, None).unwrap();
        let kept = documents::add(&db, &config, "office", other, None, &scan, None).unwrap();

        reject(&db, &config, "office", pending).unwrap();

        assert!(db.get_document(doc.id).unwrap().is_none());
        assert!(!std::path::Path::new(&doc.storage_path).exists());
        assert!(!config.documents_dir(pending).exists());
        assert!(std::path::Path::new(&kept.storage_path).exists());
    }

    #[test]
    fn test_add_active_requires_identity() {
        let db = Database::open_in_memory().unwrap();
        let id = add_active(&db, "office", &new_worker("n@example.com")).unwrap();
        assert_eq!(db.get_worker(id).unwrap().unwrap().status, WorkerStatus::Active);

        let blank = NewWorker::default();
        assert!(add_active(&db, "office", &blank).is_err());
    }
}
