use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Pending,
    Active,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Pending => "pending",
            WorkerStatus::Active => "active",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(WorkerStatus::Pending),
            "active" => Ok(WorkerStatus::Active),
            _ => Err(anyhow!("Unknown worker status '{}' (expected pending or active)", s)),
        }
    }
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Employment terms filled in by an admin after the worker registers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminData {
    pub project: Option<String>,
    pub hourly_rate: Option<String>,
    pub contract_start: Option<String>,
    pub contract_end: Option<String>,
    pub rent_address: Option<String>,
    pub rent_price: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: i64,
    pub name: String,
    pub surname: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub nationality: Option<String>,
    pub personal_id: Option<String>,
    pub finnish_id: Option<String>,
    pub tax_number: Option<String>,
    pub bank_account: Option<String>,
    pub bic_code: Option<String>,
    pub experience_type: Option<String>,
    pub experience_duration: Option<String>,
    pub jacket_size: Option<String>,
    pub pants_size: Option<String>,
    pub waist_size: Option<String>,
    pub boots_size: Option<String>,
    pub emergency_contact: Option<String>,
    pub status: WorkerStatus,
    pub admin_data: AdminData,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Worker {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.name, self.surname)
    }
}

/// Field set accumulated by the registration wizard or an admin add.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewWorker {
    pub name: String,
    pub surname: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub nationality: Option<String>,
    pub personal_id: Option<String>,
    pub finnish_id: Option<String>,
    pub tax_number: Option<String>,
    pub bank_account: Option<String>,
    pub bic_code: Option<String>,
    pub experience_type: Option<String>,
    pub experience_duration: Option<String>,
    pub jacket_size: Option<String>,
    pub pants_size: Option<String>,
    pub waist_size: Option<String>,
    pub boots_size: Option<String>,
    pub emergency_contact: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractStatus {
    Pending,
    Signed,
}

impl ContractStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractStatus::Pending => "pending",
            ContractStatus::Signed => "signed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ContractStatus::Pending),
            "signed" => Ok(ContractStatus::Signed),
            _ => Err(anyhow!("Unknown contract status '{}'", s)),
        }
    }
}

impl std::fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    pub id: String,
    pub worker_id: i64,
    pub template_id: i64,
    pub name: String,
    pub content: String, // base64 encoded docx
    pub status: ContractStatus,
    pub signature: Option<String>, // base64 encoded image
    pub created_at: String,
    pub signed_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: i64,
    pub name: String,
    #[serde(skip)]
    pub content: Vec<u8>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Folder {
    pub id: i64,
    pub worker_id: i64,
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub worker_id: i64,
    pub folder_id: Option<i64>, // None = root
    pub name: String,
    pub storage_path: String,
    pub uploaded_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: i64,
    pub name: String,
    pub contact: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub client_id: Option<i64>,
    pub client_name: Option<String>, // denormalized for convenience
    pub name: String,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Residence {
    pub id: i64,
    pub address: String,
    pub capacity: Option<i64>,
    pub monthly_rent: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Occupant {
    pub id: i64,
    pub residence_id: i64,
    pub worker_id: i64,
    pub worker_name: String,
    pub check_in: String,
    pub check_out: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: i64,
    pub plate: String,
    pub model: Option<String>,
    pub holder_id: Option<i64>,
    pub holder_name: Option<String>, // denormalized for convenience
    pub inspection_due: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Admin {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: i64,
    pub actor: String,
    pub action: String,
    pub details: Option<String>,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        assert_eq!(WorkerStatus::parse("pending").unwrap(), WorkerStatus::Pending);
        assert_eq!(WorkerStatus::Active.as_str(), "active");
        assert_eq!(ContractStatus::parse("signed").unwrap(), ContractStatus::Signed);
        assert!(ContractStatus::parse("void").is_err());
        assert!(WorkerStatus::parse("ACTIVE").is_err());
    }

    #[test]
    fn test_admin_data_serializes_camel_case() {
        let data = AdminData {
            hourly_rate: Some("15.50".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&data).unwrap();
        assert!(json.contains("\"hourlyRate\":\"15.50\""));
        let back: AdminData = serde_json::from_str(&json).unwrap();
        assert_eq!(back, data);
    }
}
