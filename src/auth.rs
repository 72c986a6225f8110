//! Password handling for admin accounts and approved workers.
//!
//! Admin passwords are stored as argon2 hashes, never in a reversible form.

use anyhow::{anyhow, Result};
use rand::Rng;

use crate::db::Database;
use crate::models::Admin;

/// Six-digit one-time password handed to a worker on approval.
pub fn generate_password() -> String {
    let code: u32 = rand::thread_rng().gen_range(100_000..1_000_000);
    code.to_string()
}

pub fn hash_password(password: &str) -> Result<String> {
    use argon2::password_hash::rand_core::OsRng;
    use argon2::password_hash::SaltString;
    use argon2::{Argon2, PasswordHasher};

    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("Failed to hash password: {}", e))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    use argon2::{Argon2, PasswordHash, PasswordVerifier};

    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

pub fn create_admin(db: &Database, username: &str, password: &str) -> Result<i64> {
    if username.trim().is_empty() {
        return Err(anyhow!("Admin username must not be empty"));
    }
    if password.len() < 8 {
        return Err(anyhow!("Admin password must be at least 8 characters"));
    }
    let hash = hash_password(password)?;
    db.create_admin(username.trim(), &hash)
}

/// Returns the admin when the credentials match, `None` otherwise.
pub fn verify_admin(db: &Database, username: &str, password: &str) -> Result<Option<Admin>> {
    let Some(admin) = db.get_admin_by_username(username.trim())? else {
        return Ok(None);
    };
    if verify_password(password, &admin.password_hash) {
        Ok(Some(admin))
    } else {
        Ok(None)
    }
}

/// Checks a worker's e-mail and one-time password. Pending workers have no
/// password yet and never match.
pub fn verify_worker(db: &Database, email: &str, password: &str) -> Result<bool> {
    let Some(worker) = db.find_worker_by_email(email.trim())? else {
        return Ok(false);
    };
    Ok(worker
        .password_hash
        .as_deref()
        .is_some_and(|hash| verify_password(password, hash)))
}
