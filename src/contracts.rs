//! Contract lifecycle: generate from a template, batch-sign, delete, export.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{NaiveDate, Utc};

use crate::db::Repository;
use crate::models::{Contract, ContractStatus};
use crate::template::{self, FillDates};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Creates a `pending` contract for `worker_id` from template `template_id`.
pub fn generate(
    repo: &dyn Repository,
    actor: &str,
    worker_id: i64,
    template_id: i64,
    today: NaiveDate,
) -> Result<Contract> {
    let worker = repo
        .get_worker(worker_id)?
        .ok_or_else(|| anyhow!("Worker #{} not found", worker_id))?;
    let template = repo
        .get_template(template_id)?
        .ok_or_else(|| anyhow!("Template #{} not found", template_id))?;

    let document = template::fill(&template.content, &worker, &template.name, None, &FillDates::unsigned(today))
        .with_context(|| format!("Failed to fill template '{}'", template.name))?;

    let contract = Contract {
        id: uuid::Uuid::new_v4().to_string(),
        worker_id,
        template_id,
        content: document.content_base64(),
        name: document.name,
        status: ContractStatus::Pending,
        signature: None,
        created_at: Utc::now().format(TIMESTAMP_FORMAT).to_string(),
        signed_at: None,
    };
    repo.insert_contract(&contract)?;
    repo.log_audit(
        actor,
        "contract.generate",
        Some(&format!("{} for worker #{}", contract.name, worker_id)),
    )?;
    tracing::info!(contract_id = %contract.id, worker_id, template_id, "contract generated");
    Ok(contract)
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NotFound,
    AlreadySigned,
    TemplateMissing,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NotFound => f.write_str("not found"),
            SkipReason::AlreadySigned => f.write_str("already signed"),
            SkipReason::TemplateMissing => f.write_str("template missing"),
        }
    }
}

#[derive(Debug, Default)]
pub struct SignReport {
    pub signed: Vec<String>,
    pub skipped: Vec<(String, SkipReason)>,
}

/// Signs every listed contract of `worker_id` with the same signature image.
///
/// Contracts that cannot be signed are skipped and reported; the batch
/// carries on with the rest. A fill error on one contract aborts the batch,
/// leaving already-signed contracts signed.
pub fn sign(
    repo: &dyn Repository,
    actor: &str,
    worker_id: i64,
    contract_ids: &[String],
    signature_png: &[u8],
    today: NaiveDate,
) -> Result<SignReport> {
    let worker = repo
        .get_worker(worker_id)?
        .ok_or_else(|| anyhow!("Worker #{} not found", worker_id))?;
    let mut contracts = repo.list_contracts(worker_id)?;
    let signature_b64 = BASE64.encode(signature_png);
    let mut report = SignReport::default();

    for id in contract_ids {
        let Some(contract) = contracts.iter_mut().find(|c| &c.id == id) else {
            report.skipped.push((id.clone(), SkipReason::NotFound));
            continue;
        };
        if contract.status == ContractStatus::Signed {
            report.skipped.push((id.clone(), SkipReason::AlreadySigned));
            continue;
        }
        let Some(template) = repo.get_template(contract.template_id)? else {
            tracing::warn!(contract_id = %id, template_id = contract.template_id, "template gone, skipping");
            report.skipped.push((id.clone(), SkipReason::TemplateMissing));
            continue;
        };

        let document = template::fill(
            &template.content,
            &worker,
            &template.name,
            Some(signature_png),
            &FillDates::signed(today),
        )
        .with_context(|| format!("Failed to sign contract {}", id))?;

        contract.name = document.name.clone();
        contract.content = document.content_base64();
        contract.status = ContractStatus::Signed;
        contract.signature = Some(signature_b64.clone());
        contract.signed_at = Some(Utc::now().format(TIMESTAMP_FORMAT).to_string());
        repo.update_contract(contract)?;
        report.signed.push(id.clone());
    }

    if !report.signed.is_empty() {
        repo.log_audit(
            actor,
            "contract.sign",
            Some(&format!("worker #{}: {}", worker_id, report.signed.join(", "))),
        )?;
    }
    tracing::info!(worker_id, signed = report.signed.len(), skipped = report.skipped.len(), "signing finished");
    Ok(report)
}

/// Removes a contract whatever its status. Returns false when the worker
/// has no such contract.
pub fn delete(repo: &dyn Repository, actor: &str, worker_id: i64, contract_id: &str) -> Result<bool> {
    let removed = repo.delete_contract(worker_id, contract_id)?;
    if removed {
        repo.log_audit(actor, "contract.delete", Some(&format!("{} of worker #{}", contract_id, worker_id)))?;
    }
    Ok(removed)
}

pub fn decode_content(contract: &Contract) -> Result<Vec<u8>> {
    BASE64
        .decode(contract.content.as_bytes())
        .with_context(|| format!("Contract {} has corrupt content", contract.id))
}

/// Writes the contract's document to `dest`, or to `dest/<contract name>`
/// when `dest` is a directory.
pub fn export(contract: &Contract, dest: &Path) -> Result<std::path::PathBuf> {
    let path = if dest.is_dir() {
        let file_name = Path::new(&contract.name)
            .file_name()
            .ok_or_else(|| anyhow!("Contract {} has no usable file name", contract.id))?;
        dest.join(file_name)
    } else {
        dest.to_path_buf()
    };
    std::fs::write(&path, decode_content(contract)?)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::new_worker;
    use crate::db::Database;
    use crate::models::{AdminData, WorkerStatus};
    use crate::template::tests::{docx_with_paragraphs, run, signature_png};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    fn setup() -> (Database, i64, i64) {
        let db = Database::open_in_memory().unwrap();
        let worker_id = db.create_worker(&new_worker("c@example.com"), WorkerStatus::Active).unwrap();
        db.update_admin_data(
            worker_id,
            &AdminData {
                hourly_rate: Some("15.50".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        let template = docx_with_paragraphs(&[&run("Worker {name} earns {hourlyRate}"), &run("Signed {signingDate} {%signature}")]);
        let template_id = db.add_template("Employment.docx", &template).unwrap();
        (db, worker_id, template_id)
    }

    #[test]
    fn test_generate_creates_pending_contract() {
        let (db, worker_id, template_id) = setup();
        let contract = generate(&db, "office", worker_id, template_id, today()).unwrap();

        assert_eq!(contract.status, ContractStatus::Pending);
        assert_eq!(contract.name, "Employment_Jānis_Bērziņš.docx");
        assert!(contract.signature.is_none());
        assert_eq!(uuid::Uuid::parse_str(&contract.id).unwrap().get_version_num(), 4);

        let text = template::document_text(&decode_content(&contract).unwrap()).unwrap();
        assert!(text.contains("Worker Jānis earns 15.50"));

        let stored = db.list_contracts(worker_id).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, contract.id);
    }

    #[test]
    fn test_generate_unknown_template_fails() {
        let (db, worker_id, _) = setup();
        assert!(generate(&db, "office", worker_id, 999, today()).is_err());
        assert!(db.list_contracts(worker_id).unwrap().is_empty());
    }

    #[test]
    fn test_sign_batch_and_idempotence() {
        let (db, worker_id, template_id) = setup();
        let a = generate(&db, "office", worker_id, template_id, today()).unwrap();
        let b = generate(&db, "office", worker_id, template_id, today()).unwrap();
        let png = signature_png();

        let ids = vec![a.id.clone(), "missing".to_string(), b.id.clone()];
        let report = sign(&db, "worker", worker_id, &ids, &png, today()).unwrap();
        assert_eq!(report.signed, vec![a.id.clone(), b.id.clone()]);
        assert_eq!(report.skipped, vec![("missing".to_string(), SkipReason::NotFound)]);

        let signed = db.get_contract(&a.id).unwrap().unwrap();
        assert_eq!(signed.status, ContractStatus::Signed);
        assert!(signed.signed_at.is_some());
        assert_eq!(signed.signature.as_deref(), Some(BASE64.encode(&png).as_str()));
        let text = template::document_text(&decode_content(&signed).unwrap()).unwrap();
        assert!(text.contains("Signed 15.03.2024"));

        let again = sign(&db, "worker", worker_id, &[a.id.clone()], &png, today()).unwrap();
        assert!(again.signed.is_empty());
        assert_eq!(again.skipped, vec![(a.id.clone(), SkipReason::AlreadySigned)]);
        let unchanged = db.get_contract(&a.id).unwrap().unwrap();
        assert_eq!(unchanged.content, signed.content);
        assert_eq!(unchanged.signed_at, signed.signed_at);
    }

    #[test]
    fn test_sign_skips_contract_with_missing_template() {
        let (db, worker_id, template_id) = setup();
        let orphan = generate(&db, "office", worker_id, template_id, today()).unwrap();
        let other_template = db.add_template("Rent", &docx_with_paragraphs(&[&run("{name}")])).unwrap();
        let kept = generate(&db, "office", worker_id, other_template, today()).unwrap();
        db.delete_template(template_id).unwrap();

        let ids = vec![orphan.id.clone(), kept.id.clone()];
        let report = sign(&db, "worker", worker_id, &ids, &signature_png(), today()).unwrap();
        assert_eq!(report.signed, vec![kept.id.clone()]);
        assert_eq!(report.skipped, vec![(orphan.id.clone(), SkipReason::TemplateMissing)]);
        assert_eq!(db.get_contract(&orphan.id).unwrap().unwrap().status, ContractStatus::Pending);
    }

    #[test]
    fn test_sign_other_workers_contract_is_not_found() {
        let (db, worker_id, template_id) = setup();
        let other = db.create_worker(&new_worker("o@example.com"), WorkerStatus::Active).unwrap();
        let contract = generate(&db, "office", other, template_id, today()).unwrap();

        let report = sign(&db, "worker", worker_id, &[contract.id.clone()], &signature_png(), today()).unwrap();
        assert_eq!(report.skipped, vec![(contract.id, SkipReason::NotFound)]);
    }

    #[test]
    fn test_delete_signed_contract() {
        let (db, worker_id, template_id) = setup();
        let contract = generate(&db, "office", worker_id, template_id, today()).unwrap();
        sign(&db, "worker", worker_id, &[contract.id.clone()], &signature_png(), today()).unwrap();

        assert!(delete(&db, "office", worker_id, &contract.id).unwrap());
        assert!(!delete(&db, "office", worker_id, &contract.id).unwrap());
        assert!(db.get_contract(&contract.id).unwrap().is_none());
    }

    #[test]
    fn test_export_into_directory() {
        let (db, worker_id, template_id) = setup();
        let contract = generate(&db, "office", worker_id, template_id, today()).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let path = export(&contract, dir.path()).unwrap();
        assert_eq!(path, dir.path().join("Employment_Jānis_Bērziņš.docx"));
        assert_eq!(std::fs::read(path).unwrap(), decode_content(&contract).unwrap());
    }

    #[test]
    fn test_export_keeps_hostile_names_inside_directory() {
        let db = Database::open_in_memory().unwrap();
        let mut worker = new_worker("x@example.com");
        worker.name = "x/../../../escaped".to_string();
        worker.surname = "x".to_string();
        let worker_id = db.create_worker(&worker, WorkerStatus::Active).unwrap();
        let template_id = db.add_template("T", &docx_with_paragraphs(&[&run("{name}")])).unwrap();
        let contract = generate(&db, "office", worker_id, template_id, today()).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("a").join("b");
        std::fs::create_dir_all(&out).unwrap();

        let path = export(&contract, &out).unwrap();
        assert_eq!(path.parent(), Some(out.as_path()));
        assert!(path.canonicalize().unwrap().starts_with(out.canonicalize().unwrap()));
        assert!(!dir.path().join("escaped_x.docx").exists());
    }

    #[test]
    fn test_export_ignores_directories_in_stored_name() {
        let (db, worker_id, template_id) = setup();
        let mut contract = generate(&db, "office", worker_id, template_id, today()).unwrap();
        contract.name = "../outside.docx".to_string();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        std::fs::create_dir(&out).unwrap();

        let path = export(&contract, &out).unwrap();
        assert_eq!(path, out.join("outside.docx"));
    }
}
