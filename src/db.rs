use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

use crate::models::{
    Admin, AdminData, AuditLog, Client, Contract, ContractStatus, Document, Folder, NewWorker,
    Occupant, Project, Residence, Template, Vehicle, Worker, WorkerStatus,
};

/// Record store used by the approval and contract workflows.
///
/// `Database` is the SQLite implementation; anything that can persist
/// workers, templates and contracts can stand in for it.
pub trait Repository {
    fn create_worker(&self, worker: &NewWorker, status: WorkerStatus) -> Result<i64>;
    fn get_worker(&self, id: i64) -> Result<Option<Worker>>;
    fn set_worker_status(&self, id: i64, status: WorkerStatus, password_hash: Option<&str>) -> Result<()>;
    fn delete_worker(&self, id: i64) -> Result<bool>;

    fn get_template(&self, id: i64) -> Result<Option<Template>>;

    fn insert_contract(&self, contract: &Contract) -> Result<()>;
    fn list_contracts(&self, worker_id: i64) -> Result<Vec<Contract>>;
    fn update_contract(&self, contract: &Contract) -> Result<()>;
    fn delete_contract(&self, worker_id: i64, contract_id: &str) -> Result<bool>;

    fn log_audit(&self, actor: &str, action: &str, details: Option<&str>) -> Result<()>;
}

pub struct Database {
    conn: Connection,
    path: PathBuf,
}

const WORKER_COLUMNS: &str = "id, name, surname, email, phone, address, nationality, personal_id,
    finnish_id, tax_number, bank_account, bic_code, experience_type, experience_duration,
    jacket_size, pants_size, waist_size, boots_size, emergency_contact, status, admin_data,
    password_hash, created_at, updated_at";

const CONTRACT_COLUMNS: &str =
    "id, worker_id, template_id, name, content, status, signature, created_at, signed_at";

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let db = Self {
            conn,
            path: PathBuf::from(":memory:"),
        };
        db.init()?;
        Ok(db)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS workers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                surname TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                phone TEXT,
                address TEXT,
                nationality TEXT,
                personal_id TEXT,
                finnish_id TEXT,
                tax_number TEXT,
                bank_account TEXT,
                bic_code TEXT,
                experience_type TEXT,
                experience_duration TEXT,
                jacket_size TEXT,
                pants_size TEXT,
                waist_size TEXT,
                boots_size TEXT,
                emergency_contact TEXT,
                status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'active')),
                admin_data TEXT NOT NULL DEFAULT '{}',
                password_hash TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS templates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                content BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS contracts (
                id TEXT PRIMARY KEY,
                worker_id INTEGER NOT NULL REFERENCES workers(id) ON DELETE CASCADE,
                template_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                content TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'signed')),
                signature TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                signed_at TEXT
            );

            CREATE TABLE IF NOT EXISTS folders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                worker_id INTEGER NOT NULL REFERENCES workers(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                worker_id INTEGER NOT NULL REFERENCES workers(id) ON DELETE CASCADE,
                folder_id INTEGER REFERENCES folders(id) ON DELETE SET NULL,
                name TEXT NOT NULL,
                storage_path TEXT NOT NULL,
                uploaded_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS clients (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                contact TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS projects (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                client_id INTEGER REFERENCES clients(id) ON DELETE SET NULL,
                name TEXT NOT NULL,
                address TEXT,
                latitude REAL,
                longitude REAL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS residences (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                address TEXT NOT NULL,
                capacity INTEGER,
                monthly_rent TEXT,
                latitude REAL,
                longitude REAL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS occupants (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                residence_id INTEGER NOT NULL REFERENCES residences(id) ON DELETE CASCADE,
                worker_id INTEGER NOT NULL REFERENCES workers(id) ON DELETE CASCADE,
                check_in TEXT NOT NULL,
                check_out TEXT
            );

            CREATE TABLE IF NOT EXISTS vehicles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                plate TEXT NOT NULL UNIQUE,
                model TEXT,
                holder_id INTEGER REFERENCES workers(id) ON DELETE SET NULL,
                inspection_due TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS admins (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS audit_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                actor TEXT NOT NULL,
                action TEXT NOT NULL,
                details TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_workers_status ON workers(status);
            CREATE INDEX IF NOT EXISTS idx_contracts_worker ON contracts(worker_id);
            CREATE INDEX IF NOT EXISTS idx_documents_worker ON documents(worker_id);
            CREATE INDEX IF NOT EXISTS idx_occupants_residence ON occupants(residence_id);
            "#,
        )?;
        Ok(())
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='workers'",
            [],
            |row| row.get(0),
        )?;
        if tables == 0 {
            return Err(anyhow!("Database not initialized. Run 'crew init' first."));
        }
        Ok(())
    }

    // --- Worker operations ---

    pub fn find_worker_by_email(&self, email: &str) -> Result<Option<Worker>> {
        let sql = format!("SELECT {} FROM workers WHERE LOWER(email) = LOWER(?1)", WORKER_COLUMNS);
        self.conn
            .query_row(&sql, [email], Self::row_to_worker)
            .optional()
            .context("Failed to look up worker")
    }

    pub fn list_workers(&self, status: Option<WorkerStatus>) -> Result<Vec<Worker>> {
        let mut sql = format!("SELECT {} FROM workers", WORKER_COLUMNS);
        if status.is_some() {
            sql.push_str(" WHERE status = ?1");
        }
        sql.push_str(" ORDER BY surname, name");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = if let Some(s) = status {
            stmt.query_map([s.as_str()], Self::row_to_worker)?
        } else {
            stmt.query_map([], Self::row_to_worker)?
        };

        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list workers")
    }

    pub fn update_admin_data(&self, id: i64, data: &AdminData) -> Result<()> {
        let json = serde_json::to_string(data)?;
        let changed = self.conn.execute(
            "UPDATE workers SET admin_data = ?1, updated_at = datetime('now') WHERE id = ?2",
            params![json, id],
        )?;
        if changed == 0 {
            return Err(anyhow!("Worker #{} not found", id));
        }
        Ok(())
    }

    fn row_to_worker(row: &rusqlite::Row) -> rusqlite::Result<Worker> {
        let status: String = row.get(19)?;
        let admin_data: String = row.get(20)?;
        Ok(Worker {
            id: row.get(0)?,
            name: row.get(1)?,
            surname: row.get(2)?,
            email: row.get(3)?,
            phone: row.get(4)?,
            address: row.get(5)?,
            nationality: row.get(6)?,
            personal_id: row.get(7)?,
            finnish_id: row.get(8)?,
            tax_number: row.get(9)?,
            bank_account: row.get(10)?,
            bic_code: row.get(11)?,
            experience_type: row.get(12)?,
            experience_duration: row.get(13)?,
            jacket_size: row.get(14)?,
            pants_size: row.get(15)?,
            waist_size: row.get(16)?,
            boots_size: row.get(17)?,
            emergency_contact: row.get(18)?,
            status: WorkerStatus::parse(&status).map_err(|e| conversion_error(19, e))?,
            admin_data: serde_json::from_str(&admin_data)
                .map_err(|e| conversion_error(20, anyhow!(e)))?,
            password_hash: row.get(21)?,
            created_at: row.get(22)?,
            updated_at: row.get(23)?,
        })
    }

    // --- Template operations ---

    pub fn add_template(&self, name: &str, content: &[u8]) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO templates (name, content) VALUES (?1, ?2)",
            params![name, content],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Templates without their content.
    pub fn list_templates(&self) -> Result<Vec<Template>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, created_at FROM templates ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok(Template {
                id: row.get(0)?,
                name: row.get(1)?,
                content: Vec::new(),
                created_at: row.get(2)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list templates")
    }

    pub fn delete_template(&self, id: i64) -> Result<bool> {
        Ok(self.conn.execute("DELETE FROM templates WHERE id = ?1", [id])? > 0)
    }

    // --- Contract queries outside the lifecycle ---

    pub fn get_contract(&self, id: &str) -> Result<Option<Contract>> {
        let sql = format!("SELECT {} FROM contracts WHERE id = ?1", CONTRACT_COLUMNS);
        self.conn
            .query_row(&sql, [id], Self::row_to_contract)
            .optional()
            .context("Failed to look up contract")
    }

    pub fn list_pending_contracts(&self) -> Result<Vec<Contract>> {
        let sql = format!(
            "SELECT {} FROM contracts WHERE status = 'pending' ORDER BY created_at",
            CONTRACT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], Self::row_to_contract)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list pending contracts")
    }

    fn row_to_contract(row: &rusqlite::Row) -> rusqlite::Result<Contract> {
        let status: String = row.get(5)?;
        Ok(Contract {
            id: row.get(0)?,
            worker_id: row.get(1)?,
            template_id: row.get(2)?,
            name: row.get(3)?,
            content: row.get(4)?,
            status: ContractStatus::parse(&status).map_err(|e| conversion_error(5, e))?,
            signature: row.get(6)?,
            created_at: row.get(7)?,
            signed_at: row.get(8)?,
        })
    }

    // --- Folder and document operations ---

    pub fn create_folder(&self, worker_id: i64, name: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO folders (worker_id, name) VALUES (?1, ?2)",
            params![worker_id, name],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_folder(&self, id: i64) -> Result<Option<Folder>> {
        self.conn
            .query_row(
                "SELECT id, worker_id, name, created_at FROM folders WHERE id = ?1",
                [id],
                Self::row_to_folder,
            )
            .optional()
            .context("Failed to look up folder")
    }

    pub fn list_folders(&self, worker_id: i64) -> Result<Vec<Folder>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, worker_id, name, created_at FROM folders WHERE worker_id = ?1 ORDER BY name",
        )?;
        let rows = stmt.query_map([worker_id], Self::row_to_folder)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list folders")
    }

    /// Deletes a folder after moving its documents to the root.
    /// Returns the number of documents moved, or `None` if the folder does
    /// not exist for this worker.
    pub fn delete_folder(&mut self, worker_id: i64, folder_id: i64) -> Result<Option<usize>> {
        let tx = self.conn.transaction()?;
        let exists: Option<i64> = tx
            .query_row(
                "SELECT id FROM folders WHERE id = ?1 AND worker_id = ?2",
                params![folder_id, worker_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Ok(None);
        }
        let moved = tx.execute(
            "UPDATE documents SET folder_id = NULL WHERE folder_id = ?1",
            [folder_id],
        )?;
        tx.execute("DELETE FROM folders WHERE id = ?1", [folder_id])?;
        tx.commit()?;
        Ok(Some(moved))
    }

    fn row_to_folder(row: &rusqlite::Row) -> rusqlite::Result<Folder> {
        Ok(Folder {
            id: row.get(0)?,
            worker_id: row.get(1)?,
            name: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    pub fn add_document(
        &self,
        worker_id: i64,
        folder_id: Option<i64>,
        name: &str,
        storage_path: &str,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO documents (worker_id, folder_id, name, storage_path) VALUES (?1, ?2, ?3, ?4)",
            params![worker_id, folder_id, name, storage_path],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_document(&self, id: i64) -> Result<Option<Document>> {
        self.conn
            .query_row(
                "SELECT id, worker_id, folder_id, name, storage_path, uploaded_at
                 FROM documents WHERE id = ?1",
                [id],
                Self::row_to_document,
            )
            .optional()
            .context("Failed to look up document")
    }

    pub fn list_documents(&self, worker_id: i64) -> Result<Vec<Document>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, worker_id, folder_id, name, storage_path, uploaded_at
             FROM documents WHERE worker_id = ?1 ORDER BY folder_id, name",
        )?;
        let rows = stmt.query_map([worker_id], Self::row_to_document)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list documents")
    }

    pub fn move_document(&self, id: i64, folder_id: Option<i64>) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE documents SET folder_id = ?1 WHERE id = ?2",
            params![folder_id, id],
        )?;
        if changed == 0 {
            return Err(anyhow!("Document #{} not found", id));
        }
        Ok(())
    }

    pub fn delete_document(&self, id: i64) -> Result<bool> {
        Ok(self.conn.execute("DELETE FROM documents WHERE id = ?1", [id])? > 0)
    }

    fn row_to_document(row: &rusqlite::Row) -> rusqlite::Result<Document> {
        Ok(Document {
            id: row.get(0)?,
            worker_id: row.get(1)?,
            folder_id: row.get(2)?,
            name: row.get(3)?,
            storage_path: row.get(4)?,
            uploaded_at: row.get(5)?,
        })
    }

    // --- Client and project operations ---

    pub fn add_client(&self, name: &str, contact: Option<&str>) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO clients (name, contact) VALUES (?1, ?2)",
            params![name, contact],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_clients(&self) -> Result<Vec<Client>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, contact, created_at FROM clients ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok(Client {
                id: row.get(0)?,
                name: row.get(1)?,
                contact: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list clients")
    }

    pub fn add_project(
        &self,
        client_id: Option<i64>,
        name: &str,
        address: Option<&str>,
        coords: Option<(f64, f64)>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO projects (client_id, name, address, latitude, longitude)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                client_id,
                name,
                address,
                coords.map(|c| c.0),
                coords.map(|c| c.1)
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_project(&self, id: i64) -> Result<Option<Project>> {
        self.conn
            .query_row(
                "SELECT p.id, p.client_id, c.name, p.name, p.address, p.latitude, p.longitude, p.created_at
                 FROM projects p LEFT JOIN clients c ON p.client_id = c.id
                 WHERE p.id = ?1",
                [id],
                Self::row_to_project,
            )
            .optional()
            .context("Failed to look up project")
    }

    pub fn list_projects(&self, client_id: Option<i64>) -> Result<Vec<Project>> {
        let mut sql = String::from(
            "SELECT p.id, p.client_id, c.name, p.name, p.address, p.latitude, p.longitude, p.created_at
             FROM projects p LEFT JOIN clients c ON p.client_id = c.id",
        );
        if client_id.is_some() {
            sql.push_str(" WHERE p.client_id = ?1");
        }
        sql.push_str(" ORDER BY p.name");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = if let Some(id) = client_id {
            stmt.query_map([id], Self::row_to_project)?
        } else {
            stmt.query_map([], Self::row_to_project)?
        };
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list projects")
    }

    fn row_to_project(row: &rusqlite::Row) -> rusqlite::Result<Project> {
        Ok(Project {
            id: row.get(0)?,
            client_id: row.get(1)?,
            client_name: row.get(2)?,
            name: row.get(3)?,
            address: row.get(4)?,
            latitude: row.get(5)?,
            longitude: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    // --- Residence operations ---

    pub fn add_residence(
        &self,
        address: &str,
        capacity: Option<i64>,
        monthly_rent: Option<&str>,
        coords: Option<(f64, f64)>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO residences (address, capacity, monthly_rent, latitude, longitude)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                address,
                capacity,
                monthly_rent,
                coords.map(|c| c.0),
                coords.map(|c| c.1)
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_residence(&self, id: i64) -> Result<Option<Residence>> {
        self.conn
            .query_row(
                "SELECT id, address, capacity, monthly_rent, latitude, longitude, created_at
                 FROM residences WHERE id = ?1",
                [id],
                Self::row_to_residence,
            )
            .optional()
            .context("Failed to look up residence")
    }

    pub fn list_residences(&self) -> Result<Vec<Residence>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, address, capacity, monthly_rent, latitude, longitude, created_at
             FROM residences ORDER BY address",
        )?;
        let rows = stmt.query_map([], Self::row_to_residence)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list residences")
    }

    fn row_to_residence(row: &rusqlite::Row) -> rusqlite::Result<Residence> {
        Ok(Residence {
            id: row.get(0)?,
            address: row.get(1)?,
            capacity: row.get(2)?,
            monthly_rent: row.get(3)?,
            latitude: row.get(4)?,
            longitude: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    pub fn add_occupant(&self, residence_id: i64, worker_id: i64, check_in: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO occupants (residence_id, worker_id, check_in) VALUES (?1, ?2, ?3)",
            params![residence_id, worker_id, check_in],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_occupant(&self, occupant_id: i64) -> Result<Option<Occupant>> {
        self.conn
            .query_row(
                "SELECT o.id, o.residence_id, o.worker_id, w.name || ' ' || w.surname, o.check_in, o.check_out
                 FROM occupants o JOIN workers w ON o.worker_id = w.id
                 WHERE o.id = ?1",
                params![occupant_id],
                Self::row_to_occupant,
            )
            .optional()
            .context("Failed to get occupant")
    }

    pub fn check_out_occupant(&self, occupant_id: i64, check_out: &str) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE occupants SET check_out = ?1 WHERE id = ?2 AND check_out IS NULL",
            params![check_out, occupant_id],
        )?;
        if changed == 0 {
            return Err(anyhow!("No open stay #{} to check out", occupant_id));
        }
        Ok(())
    }

    /// Occupants of a residence; with `on` set, only those staying on that
    /// date (check-in on or before, check-out absent or after).
    pub fn list_occupants(&self, residence_id: i64, on: Option<&str>) -> Result<Vec<Occupant>> {
        let mut sql = String::from(
            "SELECT o.id, o.residence_id, o.worker_id, w.name || ' ' || w.surname, o.check_in, o.check_out
             FROM occupants o JOIN workers w ON o.worker_id = w.id
             WHERE o.residence_id = ?1",
        );
        if on.is_some() {
            sql.push_str(" AND o.check_in <= ?2 AND (o.check_out IS NULL OR o.check_out > ?2)");
        }
        sql.push_str(" ORDER BY o.check_in");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = if let Some(date) = on {
            stmt.query_map(params![residence_id, date], Self::row_to_occupant)?
        } else {
            stmt.query_map(params![residence_id], Self::row_to_occupant)?
        };
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list occupants")
    }

    fn row_to_occupant(row: &rusqlite::Row) -> rusqlite::Result<Occupant> {
        Ok(Occupant {
            id: row.get(0)?,
            residence_id: row.get(1)?,
            worker_id: row.get(2)?,
            worker_name: row.get(3)?,
            check_in: row.get(4)?,
            check_out: row.get(5)?,
        })
    }

    // --- Vehicle operations ---

    pub fn add_vehicle(&self, plate: &str, model: Option<&str>, inspection_due: Option<&str>) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO vehicles (plate, model, inspection_due) VALUES (?1, ?2, ?3)",
            params![plate, model, inspection_due],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_vehicles(&self) -> Result<Vec<Vehicle>> {
        let mut stmt = self.conn.prepare(
            "SELECT v.id, v.plate, v.model, v.holder_id, w.name || ' ' || w.surname,
                    v.inspection_due, v.created_at
             FROM vehicles v LEFT JOIN workers w ON v.holder_id = w.id
             ORDER BY v.plate",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Vehicle {
                id: row.get(0)?,
                plate: row.get(1)?,
                model: row.get(2)?,
                holder_id: row.get(3)?,
                holder_name: row.get(4)?,
                inspection_due: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list vehicles")
    }

    /// Hands the vehicle to `holder_id`, or returns it to the pool with `None`.
    pub fn assign_vehicle(&self, id: i64, holder_id: Option<i64>) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE vehicles SET holder_id = ?1 WHERE id = ?2",
            params![holder_id, id],
        )?;
        if changed == 0 {
            return Err(anyhow!("Vehicle #{} not found", id));
        }
        Ok(())
    }

    pub fn set_inspection_due(&self, id: i64, due: Option<&str>) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE vehicles SET inspection_due = ?1 WHERE id = ?2",
            params![due, id],
        )?;
        if changed == 0 {
            return Err(anyhow!("Vehicle #{} not found", id));
        }
        Ok(())
    }

    // --- Admin accounts ---

    pub fn create_admin(&self, username: &str, password_hash: &str) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO admins (username, password_hash) VALUES (?1, ?2)",
                params![username, password_hash],
            )
            .with_context(|| format!("Failed to create admin '{}'", username))?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_admin_by_username(&self, username: &str) -> Result<Option<Admin>> {
        self.conn
            .query_row(
                "SELECT id, username, password_hash, created_at FROM admins WHERE username = ?1",
                [username],
                |row| {
                    Ok(Admin {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        password_hash: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()
            .context("Failed to look up admin")
    }

    pub fn list_audit(&self, limit: usize) -> Result<Vec<AuditLog>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, actor, action, details, created_at FROM audit_logs
             ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit as i64], |row| {
            Ok(AuditLog {
                id: row.get(0)?,
                actor: row.get(1)?,
                action: row.get(2)?,
                details: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list audit log")
    }
}

impl Repository for Database {
    fn create_worker(&self, worker: &NewWorker, status: WorkerStatus) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO workers (name, surname, email, phone, address, nationality, personal_id,
                    finnish_id, tax_number, bank_account, bic_code, experience_type,
                    experience_duration, jacket_size, pants_size, waist_size, boots_size,
                    emergency_contact, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
                params![
                    worker.name,
                    worker.surname,
                    worker.email,
                    worker.phone,
                    worker.address,
                    worker.nationality,
                    worker.personal_id,
                    worker.finnish_id,
                    worker.tax_number,
                    worker.bank_account,
                    worker.bic_code,
                    worker.experience_type,
                    worker.experience_duration,
                    worker.jacket_size,
                    worker.pants_size,
                    worker.waist_size,
                    worker.boots_size,
                    worker.emergency_contact,
                    status.as_str(),
                ],
            )
            .with_context(|| format!("Failed to create worker {}", worker.email))?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_worker(&self, id: i64) -> Result<Option<Worker>> {
        let sql = format!("SELECT {} FROM workers WHERE id = ?1", WORKER_COLUMNS);
        self.conn
            .query_row(&sql, [id], Self::row_to_worker)
            .optional()
            .context("Failed to look up worker")
    }

    fn set_worker_status(&self, id: i64, status: WorkerStatus, password_hash: Option<&str>) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE workers SET status = ?1, password_hash = COALESCE(?2, password_hash),
                    updated_at = datetime('now')
             WHERE id = ?3",
            params![status.as_str(), password_hash, id],
        )?;
        if changed == 0 {
            return Err(anyhow!("Worker #{} not found", id));
        }
        Ok(())
    }

    fn delete_worker(&self, id: i64) -> Result<bool> {
        Ok(self.conn.execute("DELETE FROM workers WHERE id = ?1", [id])? > 0)
    }

    fn get_template(&self, id: i64) -> Result<Option<Template>> {
        self.conn
            .query_row(
                "SELECT id, name, content, created_at FROM templates WHERE id = ?1",
                [id],
                |row| {
                    Ok(Template {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        content: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()
            .context("Failed to look up template")
    }

    fn insert_contract(&self, contract: &Contract) -> Result<()> {
        self.conn.execute(
            "INSERT INTO contracts (id, worker_id, template_id, name, content, status, signature, created_at, signed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                contract.id,
                contract.worker_id,
                contract.template_id,
                contract.name,
                contract.content,
                contract.status.as_str(),
                contract.signature,
                contract.created_at,
                contract.signed_at,
            ],
        )?;
        Ok(())
    }

    fn list_contracts(&self, worker_id: i64) -> Result<Vec<Contract>> {
        let sql = format!(
            "SELECT {} FROM contracts WHERE worker_id = ?1 ORDER BY created_at",
            CONTRACT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([worker_id], Self::row_to_contract)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list contracts")
    }

    fn update_contract(&self, contract: &Contract) -> Result<()> {
        self.conn.execute(
            "UPDATE contracts SET name = ?1, content = ?2, status = ?3, signature = ?4, signed_at = ?5
             WHERE id = ?6",
            params![
                contract.name,
                contract.content,
                contract.status.as_str(),
                contract.signature,
                contract.signed_at,
                contract.id,
            ],
        )?;
        Ok(())
    }

    fn delete_contract(&self, worker_id: i64, contract_id: &str) -> Result<bool> {
        Ok(self.conn.execute(
            "DELETE FROM contracts WHERE id = ?1 AND worker_id = ?2",
            params![contract_id, worker_id],
        )? > 0)
    }

    fn log_audit(&self, actor: &str, action: &str, details: Option<&str>) -> Result<()> {
        self.conn.execute(
            "INSERT INTO audit_logs (actor, action, details) VALUES (?1, ?2, ?3)",
            params![actor, action, details],
        )?;
        Ok(())
    }
}

fn conversion_error(column: usize, err: anyhow::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, err.into())
}
