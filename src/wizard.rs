//! Six-step worker self-registration.
//!
//! Fields accumulate in memory; nothing is stored until `submit`, which
//! creates exactly one pending worker. Moving forward requires the current
//! step to validate.

use anyhow::{anyhow, Result};
use regex::Regex;
use std::sync::LazyLock;

use crate::db::Repository;
use crate::models::{NewWorker, WorkerStatus};
use crate::ocr::IdScan;

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid regex"));
static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9 ()-]{6,20}$").expect("valid regex"));
static PERSONAL_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{6}-\d{5}$").expect("valid regex"));
static TAX_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{11}$").expect("valid regex"));
static IBAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{2}\d{2}[A-Z0-9]{11,30}$").expect("valid regex"));
static BIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{6}[A-Z0-9]{2}([A-Z0-9]{3})?$").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Personal,
    Contact,
    Qualifications,
    BankExperience,
    Sizes,
    Agreements,
}

impl Step {
    pub const ALL: [Step; 6] = [
        Step::Personal,
        Step::Contact,
        Step::Qualifications,
        Step::BankExperience,
        Step::Sizes,
        Step::Agreements,
    ];

    pub fn index(self) -> usize {
        Self::ALL.iter().position(|s| *s == self).unwrap_or(0)
    }

    pub fn title(self) -> &'static str {
        match self {
            Step::Personal => "Personal details",
            Step::Contact => "Contact",
            Step::Qualifications => "Qualifications",
            Step::BankExperience => "Bank and experience",
            Step::Sizes => "Work clothing sizes",
            Step::Agreements => "Agreements",
        }
    }

    /// `(key, label)` of every field collected on this step.
    pub fn fields(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Step::Personal => &[
                ("name", "First name"),
                ("surname", "Surname"),
                ("nationality", "Nationality"),
                ("personalId", "Personal ID code (NNNNNN-NNNNN, optional)"),
                ("finnishId", "Finnish ID (optional)"),
            ],
            Step::Contact => &[
                ("email", "E-mail"),
                ("phone", "Phone"),
                ("address", "Address"),
                ("emergencyContact", "Emergency contact (optional)"),
            ],
            Step::Qualifications => &[
                ("experienceType", "Trade (e.g. scaffolder)"),
                ("taxNumber", "Tax number (11 digits, optional)"),
            ],
            Step::BankExperience => &[
                ("bankAccount", "IBAN"),
                ("bicCode", "BIC"),
                ("experienceDuration", "Years of experience"),
            ],
            Step::Sizes => &[
                ("jacketSize", "Jacket size"),
                ("pantsSize", "Pants size"),
                ("waistSize", "Waist size"),
                ("bootsSize", "Boots size"),
            ],
            Step::Agreements => &[
                ("acceptTerms", "Accept the terms of employment (yes/no)"),
                ("acceptPrivacy", "Accept the privacy policy (yes/no)"),
            ],
        }
    }

    fn next(self) -> Option<Step> {
        Self::ALL.get(self.index() + 1).copied()
    }

    fn prev(self) -> Option<Step> {
        self.index().checked_sub(1).map(|i| Self::ALL[i])
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} {}", self.index() + 1, Self::ALL.len(), self.title())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self { field, message: message.into() }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Clone)]
pub struct RegistrationWizard {
    step: Step,
    fields: NewWorker,
    accept_terms: bool,
    accept_privacy: bool,
}

impl Default for RegistrationWizard {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistrationWizard {
    pub fn new() -> Self {
        Self {
            step: Step::Personal,
            fields: NewWorker::default(),
            accept_terms: false,
            accept_privacy: false,
        }
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn fields(&self) -> &NewWorker {
        &self.fields
    }

    pub fn is_last_step(&self) -> bool {
        self.step.next().is_none()
    }

    /// Stores a field by its key. Blank values clear optional fields.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        let opt = || (!value.is_empty()).then(|| value.to_string());
        let f = &mut self.fields;
        match key {
            "name" => f.name = value.to_string(),
            "surname" => f.surname = value.to_string(),
            "email" => f.email = value.to_lowercase(),
            "nationality" => f.nationality = opt(),
            "personalId" => f.personal_id = opt(),
            "finnishId" => f.finnish_id = opt(),
            "phone" => f.phone = opt(),
            "address" => f.address = opt(),
            "emergencyContact" => f.emergency_contact = opt(),
            "experienceType" => f.experience_type = opt(),
            "taxNumber" => f.tax_number = opt(),
            "bankAccount" => f.bank_account = opt().map(|v| v.replace(' ', "").to_uppercase()),
            "bicCode" => f.bic_code = opt().map(|v| v.to_uppercase()),
            "experienceDuration" => f.experience_duration = opt(),
            "jacketSize" => f.jacket_size = opt(),
            "pantsSize" => f.pants_size = opt(),
            "waistSize" => f.waist_size = opt(),
            "bootsSize" => f.boots_size = opt(),
            "acceptTerms" => self.accept_terms = parse_yes(value),
            "acceptPrivacy" => self.accept_privacy = parse_yes(value),
            _ => return Err(anyhow!("Unknown registration field '{}'", key)),
        }
        Ok(())
    }

    /// Current value of a field, for pre-filling prompts.
    pub fn get(&self, key: &str) -> Option<String> {
        let f = &self.fields;
        let flag = |b: bool| Some(if b { "yes" } else { "no" }.to_string());
        let non_empty = |s: &String| (!s.is_empty()).then(|| s.clone());
        match key {
            "name" => non_empty(&f.name),
            "surname" => non_empty(&f.surname),
            "email" => non_empty(&f.email),
            "nationality" => f.nationality.clone(),
            "personalId" => f.personal_id.clone(),
            "finnishId" => f.finnish_id.clone(),
            "phone" => f.phone.clone(),
            "address" => f.address.clone(),
            "emergencyContact" => f.emergency_contact.clone(),
            "experienceType" => f.experience_type.clone(),
            "taxNumber" => f.tax_number.clone(),
            "bankAccount" => f.bank_account.clone(),
            "bicCode" => f.bic_code.clone(),
            "experienceDuration" => f.experience_duration.clone(),
            "jacketSize" => f.jacket_size.clone(),
            "pantsSize" => f.pants_size.clone(),
            "waistSize" => f.waist_size.clone(),
            "bootsSize" => f.boots_size.clone(),
            "acceptTerms" => flag(self.accept_terms),
            "acceptPrivacy" => flag(self.accept_privacy),
            _ => None,
        }
    }

    /// Pre-fills identity codes found by an ID scan. Fields the applicant
    /// already typed are left alone. Returns the keys that were filled.
    pub fn apply_id_scan(&mut self, scan: &IdScan) -> Vec<&'static str> {
        let mut filled = Vec::new();
        if let (None, Some(id)) = (&self.fields.personal_id, &scan.personal_id) {
            self.fields.personal_id = Some(id.clone());
            filled.push("personalId");
        }
        if let (None, Some(tax)) = (&self.fields.tax_number, &scan.tax_number) {
            self.fields.tax_number = Some(tax.clone());
            filled.push("taxNumber");
        }
        filled
    }

    pub fn validate(&self) -> Vec<FieldError> {
        self.validate_step(self.step)
    }

    pub fn validate_step(&self, step: Step) -> Vec<FieldError> {
        let f = &self.fields;
        let mut errors = Vec::new();
        let errs = &mut errors;

        match step {
            Step::Personal => {
                require(errs, "name", Some(&f.name));
                require(errs, "surname", Some(&f.surname));
                require(errs, "nationality", f.nationality.as_deref());
                if let Some(id) = &f.personal_id {
                    if !PERSONAL_ID.is_match(id) {
                        errs.push(FieldError::new("personalId", "must look like NNNNNN-NNNNN"));
                    }
                }
            }
            Step::Contact => {
                if require(errs, "email", Some(&f.email)) && !EMAIL.is_match(&f.email) {
                    errs.push(FieldError::new("email", "is not a valid e-mail address"));
                }
                let phone_given = require(errs, "phone", f.phone.as_deref());
                require(errs, "address", f.address.as_deref());
                if let (true, Some(phone)) = (phone_given, &f.phone) {
                    if !PHONE.is_match(phone) {
                        errs.push(FieldError::new("phone", "is not a valid phone number"));
                    }
                }
            }
            Step::Qualifications => {
                require(errs, "experienceType", f.experience_type.as_deref());
                if let Some(tax) = &f.tax_number {
                    if !TAX_NUMBER.is_match(tax) {
                        errs.push(FieldError::new("taxNumber", "must be 11 digits"));
                    }
                }
            }
            Step::BankExperience => {
                if require(errs, "bankAccount", f.bank_account.as_deref())
                    && !f.bank_account.as_deref().is_some_and(|v| IBAN.is_match(v))
                {
                    errs.push(FieldError::new("bankAccount", "is not a valid IBAN"));
                }
                if require(errs, "bicCode", f.bic_code.as_deref()) && !f.bic_code.as_deref().is_some_and(|v| BIC.is_match(v)) {
                    errs.push(FieldError::new("bicCode", "must be 8 or 11 characters"));
                }
                require(errs, "experienceDuration", f.experience_duration.as_deref());
            }
            Step::Sizes => {
                require(errs, "jacketSize", f.jacket_size.as_deref());
                require(errs, "pantsSize", f.pants_size.as_deref());
                require(errs, "waistSize", f.waist_size.as_deref());
                require(errs, "bootsSize", f.boots_size.as_deref());
            }
            Step::Agreements => {
                if !self.accept_terms {
                    errs.push(FieldError::new("acceptTerms", "must be accepted"));
                }
                if !self.accept_privacy {
                    errs.push(FieldError::new("acceptPrivacy", "must be accepted"));
                }
            }
        }
        errors
    }

    /// Advances when the current step validates. On the last step this is
    /// a no-op that still reports validation errors.
    pub fn next(&mut self) -> Result<Step, Vec<FieldError>> {
        let errors = self.validate();
        if !errors.is_empty() {
            return Err(errors);
        }
        if let Some(next) = self.step.next() {
            self.step = next;
        }
        Ok(self.step)
    }

    /// Goes back one step without validating.
    pub fn back(&mut self) -> Step {
        if let Some(prev) = self.step.prev() {
            self.step = prev;
        }
        self.step
    }

    pub fn validate_all(&self) -> Vec<FieldError> {
        Step::ALL.iter().flat_map(|s| self.validate_step(*s)).collect()
    }

    /// Creates the pending worker from everything entered so far.
    pub fn submit(&self, repo: &dyn Repository) -> Result<i64> {
        if self.step != Step::Agreements {
            return Err(anyhow!("Registration can only be submitted from the last step"));
        }
        let errors = self.validate_all();
        if !errors.is_empty() {
            let list: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            return Err(anyhow!("Registration is incomplete: {}", list.join("; ")));
        }

        let id = repo.create_worker(&self.fields, WorkerStatus::Pending)?;
        repo.log_audit(&self.fields.email, "worker.register", Some(&format!("worker #{}", id)))?;
        tracing::info!(worker_id = id, email = %self.fields.email, "registration submitted");
        Ok(id)
    }
}

/// Records a "required" error when `value` is blank.
fn require(errors: &mut Vec<FieldError>, field: &'static str, value: Option<&str>) -> bool {
    if value.map(str::trim).unwrap_or("").is_empty() {
        errors.push(FieldError::new(field, "is required"));
        false
    } else {
        true
    }
}

fn parse_yes(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "y" | "yes" | "true" | "1")
}
