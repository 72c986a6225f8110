mod alerts;
mod auth;
mod config;
mod contracts;
mod db;
mod documents;
mod email;
mod geo;
mod models;
mod ocr;
mod sites;
mod template;
mod wizard;
mod workers;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use db::{Database, Repository};
use email::{EmailConfig, Mailer};
use geo::{DistanceSource, Geocoder, NominatimGeocoder, OsrmRouter, RouteService};
use models::{NewWorker, WorkerStatus};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use wizard::RegistrationWizard;

#[derive(Parser)]
#[command(name = "crew")]
#[command(about = "Staffing back office - onboarding, contracts, housing and fleet")]
struct Cli {
    /// Name recorded in the audit log for changes made by this command
    #[arg(long, global = true, default_value = "office")]
    actor: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Workers: registration, approval, terms
    Worker {
        #[command(subcommand)]
        command: WorkerCommands,
    },

    /// Contract templates (.docx with {placeholders})
    Template {
        #[command(subcommand)]
        command: TemplateCommands,
    },

    /// Generate, sign and export contracts
    Contract {
        #[command(subcommand)]
        command: ContractCommands,
    },

    /// Worker documents
    Doc {
        #[command(subcommand)]
        command: DocCommands,
    },

    /// Document folders
    Folder {
        #[command(subcommand)]
        command: FolderCommands,
    },

    /// Client companies
    Client {
        #[command(subcommand)]
        command: ClientCommands,
    },

    /// Work sites
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },

    /// Worker housing
    Residence {
        #[command(subcommand)]
        command: ResidenceCommands,
    },

    /// Company vehicles
    Vehicle {
        #[command(subcommand)]
        command: VehicleCommands,
    },

    /// Address lookup and distances
    Geo {
        #[command(subcommand)]
        command: GeoCommands,
    },

    /// Read identity codes from an ID card image
    Ocr {
        /// Image file (PNG or JPEG)
        image: PathBuf,
    },

    /// Admin accounts
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Show things that need attention
    Alerts {
        /// Keep running and refresh every 5 minutes
        #[arg(long)]
        watch: bool,
    },

    /// Show the newest audit log entries
    Audit {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum WorkerCommands {
    /// Self-registration wizard
    Register {
        /// Photo of an ID card to pre-fill identity codes
        #[arg(long)]
        id_scan: Option<PathBuf>,
    },

    /// Add an active worker directly
    Add {
        name: String,
        surname: String,
        email: String,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        nationality: Option<String>,
    },

    /// List workers
    List {
        /// Filter by status (pending, active)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Show worker details
    Show { id: i64 },

    /// Approve a pending registration and e-mail a password
    Approve { id: i64 },

    /// Reject and delete a pending registration
    Reject { id: i64 },

    /// Check a worker's e-mail and password
    Login { email: String },

    /// Set employment terms used in contracts
    SetTerms {
        id: i64,
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        hourly_rate: Option<String>,
        #[arg(long)]
        contract_start: Option<String>,
        #[arg(long)]
        contract_end: Option<String>,
        #[arg(long)]
        rent_address: Option<String>,
        #[arg(long)]
        rent_price: Option<String>,
    },
}

#[derive(Subcommand)]
enum TemplateCommands {
    /// Upload a .docx template
    Add {
        file: PathBuf,
        /// Display name (defaults to the file name)
        #[arg(short, long)]
        name: Option<String>,
    },
    List,
    Delete { id: i64 },
}

#[derive(Subcommand)]
enum ContractCommands {
    /// Fill a template for a worker
    Generate { worker_id: i64, template_id: i64 },

    /// Sign one or more of a worker's contracts
    Sign {
        worker_id: i64,
        /// Signature image (PNG or JPEG)
        #[arg(short, long)]
        signature: PathBuf,
        /// Contract IDs
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// List a worker's contracts, or all unsigned ones
    List {
        worker_id: Option<i64>,
    },

    /// Print the text of a contract
    Show { id: String },

    /// Save a contract as .docx
    Export {
        id: String,
        /// Output file or directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    Delete { worker_id: i64, id: String },
}

#[derive(Subcommand)]
enum DocCommands {
    /// Store a file for a worker
    Add {
        worker_id: i64,
        file: PathBuf,
        #[arg(short, long)]
        folder: Option<i64>,
        #[arg(short, long)]
        name: Option<String>,
    },
    List { worker_id: i64 },
    /// Move a document into a folder, or to the root without --folder
    Move {
        id: i64,
        #[arg(short, long)]
        folder: Option<i64>,
    },
    Delete { id: i64 },
}

#[derive(Subcommand)]
enum FolderCommands {
    Create { worker_id: i64, name: String },
    /// Delete a folder; its documents move to the root
    Delete { worker_id: i64, id: i64 },
}

#[derive(Subcommand)]
enum ClientCommands {
    Add {
        name: String,
        #[arg(short, long)]
        contact: Option<String>,
    },
    List,
}

#[derive(Subcommand)]
enum ProjectCommands {
    Add {
        name: String,
        #[arg(short, long)]
        client: Option<i64>,
        #[arg(short, long)]
        address: Option<String>,
        /// Skip the address lookup
        #[arg(long)]
        no_geocode: bool,
    },
    List {
        #[arg(short, long)]
        client: Option<i64>,
    },
}

#[derive(Subcommand)]
enum ResidenceCommands {
    Add {
        address: String,
        #[arg(long)]
        capacity: Option<i64>,
        #[arg(long)]
        rent: Option<String>,
        #[arg(long)]
        no_geocode: bool,
    },
    List,
    /// Who lives there, optionally on a given date (YYYY-MM-DD)
    Occupants {
        id: i64,
        #[arg(long)]
        on: Option<String>,
    },
    CheckIn {
        id: i64,
        worker_id: i64,
        /// YYYY-MM-DD, defaults to today
        #[arg(long)]
        date: Option<String>,
    },
    CheckOut {
        occupant_id: i64,
        #[arg(long)]
        date: Option<String>,
    },
    /// Distance to a project site
    Distance {
        id: i64,
        project_id: i64,
        /// Use road distance when the routing service answers
        #[arg(long)]
        road: bool,
    },
}

#[derive(Subcommand)]
enum VehicleCommands {
    Add {
        plate: String,
        #[arg(short, long)]
        model: Option<String>,
        /// Next inspection, YYYY-MM-DD
        #[arg(long)]
        inspection_due: Option<String>,
    },
    List,
    Assign { id: i64, worker_id: i64 },
    Return { id: i64 },
    Inspection { id: i64, due: String },
}

#[derive(Subcommand)]
enum GeoCommands {
    Lookup { address: String },
    Distance {
        from: String,
        to: String,
        #[arg(long)]
        road: bool,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    Add {
        username: String,
        #[arg(long)]
        password: Option<String>,
    },
    Verify { username: String },
}

/// Everything a command handler needs.
struct AppContext {
    db: Database,
    config: Config,
    mailer: Box<dyn Mailer>,
    actor: String,
}

impl AppContext {
    fn geocoder(&self, enabled: bool) -> Option<NominatimGeocoder> {
        if !enabled {
            return None;
        }
        NominatimGeocoder::new(&self.config)
            .map_err(|e| tracing::warn!("Geocoding unavailable: {:#}", e))
            .ok()
    }

    fn router(&self, enabled: bool) -> Option<OsrmRouter> {
        if !enabled {
            return None;
        }
        OsrmRouter::new(&self.config)
            .map_err(|e| tracing::warn!("Routing unavailable: {:#}", e))
            .ok()
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crew=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let db = Database::open(&config.db_path)?;

    if !matches!(cli.command, Commands::Init) {
        db.ensure_initialized()?;
    }

    let mailer = email::create_mailer(EmailConfig::from_config(&config));
    let mut ctx = AppContext {
        db,
        config,
        mailer,
        actor: cli.actor,
    };

    match cli.command {
        Commands::Init => {
            ctx.db.init()?;
            println!("Database initialized at {}", ctx.db.path().display());
        }
        Commands::Worker { command } => handle_worker(&ctx, command)?,
        Commands::Template { command } => handle_template(&ctx, command)?,
        Commands::Contract { command } => handle_contract(&ctx, command)?,
        Commands::Doc { command } => handle_doc(&ctx, command)?,
        Commands::Folder { command } => match command {
            FolderCommands::Create { worker_id, name } => {
                let id = documents::create_folder(&ctx.db, &ctx.actor, worker_id, &name)?;
                println!("Created folder '{}' (ID: {})", name.trim(), id);
            }
            FolderCommands::Delete { worker_id, id } => {
                let moved = documents::delete_folder(&mut ctx.db, &ctx.actor, worker_id, id)?;
                println!("Deleted folder #{}; {} document(s) moved to the root.", id, moved);
            }
        },
        Commands::Client { command } => match command {
            ClientCommands::Add { name, contact } => {
                let id = ctx.db.add_client(&name, contact.as_deref())?;
                ctx.db.log_audit(&ctx.actor, "client.add", Some(&name))?;
                println!("Added client '{}' (ID: {})", name, id);
            }
            ClientCommands::List => {
                let clients = ctx.db.list_clients()?;
                if clients.is_empty() {
                    println!("No clients found.");
                } else {
                    println!("{:<6} {:<30} {:<30}", "ID", "NAME", "CONTACT");
                    println!("{}", "-".repeat(66));
                    for client in clients {
                        println!(
                            "{:<6} {:<30} {:<30}",
                            client.id,
                            truncate(&client.name, 28),
                            truncate(&client.contact.unwrap_or_default(), 28)
                        );
                    }
                }
            }
        },
        Commands::Project { command } => handle_project(&ctx, command)?,
        Commands::Residence { command } => handle_residence(&ctx, command)?,
        Commands::Vehicle { command } => handle_vehicle(&ctx, command)?,
        Commands::Geo { command } => handle_geo(&ctx, command)?,
        Commands::Ocr { image } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("Failed to read {}", image.display()))?;
            let engine = ocr::create_engine(&ctx.config)
                .ok_or_else(|| anyhow!("OCR is not configured; set CREW_OCR_API_KEY"))?;
            let scan = ocr::scan_id(engine.as_ref(), &bytes);
            println!("Personal ID: {}", scan.personal_id.as_deref().unwrap_or("not found"));
            println!("Tax number:  {}", scan.tax_number.as_deref().unwrap_or("not found"));
            if !scan.text.is_empty() {
                println!("\n--- Recognized Text ---\n{}", scan.text.trim());
            }
        }
        Commands::Admin { command } => match command {
            AdminCommands::Add { username, password } => {
                let password = match password {
                    Some(p) => p,
                    None => prompt("Password", None)?,
                };
                let id = auth::create_admin(&ctx.db, &username, &password)?;
                ctx.db.log_audit(&ctx.actor, "admin.add", Some(&username))?;
                println!("Created admin '{}' (ID: {})", username.trim(), id);
            }
            AdminCommands::Verify { username } => {
                let password = prompt("Password", None)?;
                match auth::verify_admin(&ctx.db, &username, &password)? {
                    Some(admin) => println!("Credentials valid for admin #{} '{}'.", admin.id, admin.username),
                    None => return Err(anyhow!("Invalid username or password")),
                }
            }
        },
        Commands::Alerts { watch } => {
            if watch {
                alerts::watch(&ctx.db, alerts::POLL_INTERVAL, |list| {
                    println!("\n[{}]", chrono::Local::now().format("%Y-%m-%d %H:%M"));
                    print_alerts(list);
                    std::ops::ControlFlow::Continue(())
                })?;
            } else {
                let list = alerts::compute(&ctx.db, today())?;
                print_alerts(&list);
            }
        }
        Commands::Audit { limit } => {
            let entries = ctx.db.list_audit(limit)?;
            if entries.is_empty() {
                println!("Audit log is empty.");
            } else {
                println!("{:<20} {:<12} {:<20} {:<40}", "WHEN", "ACTOR", "ACTION", "DETAILS");
                println!("{}", "-".repeat(94));
                for entry in entries {
                    println!(
                        "{:<20} {:<12} {:<20} {:<40}",
                        entry.created_at,
                        truncate(&entry.actor, 10),
                        entry.action,
                        truncate(&entry.details.unwrap_or_default(), 40)
                    );
                }
            }
        }
    }

    Ok(())
}

fn handle_worker(ctx: &AppContext, command: WorkerCommands) -> Result<()> {
    match command {
        WorkerCommands::Register { id_scan } => run_registration(ctx, id_scan)?,

        WorkerCommands::Add {
            name,
            surname,
            email,
            phone,
            address,
            nationality,
        } => {
            let worker = NewWorker {
                name,
                surname,
                email: email.trim().to_lowercase(),
                phone,
                address,
                nationality,
                ..Default::default()
            };
            let id = workers::add_active(&ctx.db, &ctx.actor, &worker)?;
            println!("Added worker #{} ({} {})", id, worker.name, worker.surname);
        }

        WorkerCommands::List { status } => {
            let status = status.as_deref().map(WorkerStatus::parse).transpose()?;
            let list = ctx.db.list_workers(status)?;
            if list.is_empty() {
                println!("No workers found.");
            } else {
                println!("{:<6} {:<8} {:<28} {:<30} {:<16}", "ID", "STATUS", "NAME", "EMAIL", "PROJECT");
                println!("{}", "-".repeat(92));
                for worker in list {
                    println!(
                        "{:<6} {:<8} {:<28} {:<30} {:<16}",
                        worker.id,
                        worker.status,
                        truncate(&worker.full_name(), 26),
                        truncate(&worker.email, 28),
                        truncate(&worker.admin_data.project.clone().unwrap_or_default(), 16)
                    );
                }
            }
        }

        WorkerCommands::Show { id } => match ctx.db.get_worker(id)? {
            Some(worker) => {
                println!("Worker #{}", worker.id);
                println!("Name: {}", worker.full_name());
                println!("Status: {}", worker.status);
                println!("Email: {}", worker.email);
                let optional = [
                    ("Phone", &worker.phone),
                    ("Address", &worker.address),
                    ("Nationality", &worker.nationality),
                    ("Personal ID", &worker.personal_id),
                    ("Finnish ID", &worker.finnish_id),
                    ("Tax number", &worker.tax_number),
                    ("Bank account", &worker.bank_account),
                    ("BIC", &worker.bic_code),
                    ("Trade", &worker.experience_type),
                    ("Experience", &worker.experience_duration),
                    ("Jacket", &worker.jacket_size),
                    ("Pants", &worker.pants_size),
                    ("Waist", &worker.waist_size),
                    ("Boots", &worker.boots_size),
                    ("Emergency contact", &worker.emergency_contact),
                ];
                for (label, value) in optional {
                    if let Some(value) = value {
                        println!("{}: {}", label, value);
                    }
                }

                let terms = &worker.admin_data;
                let terms = [
                    ("Project", &terms.project),
                    ("Hourly rate", &terms.hourly_rate),
                    ("Contract start", &terms.contract_start),
                    ("Contract end", &terms.contract_end),
                    ("Rent address", &terms.rent_address),
                    ("Rent price", &terms.rent_price),
                ];
                if terms.iter().any(|(_, v)| v.is_some()) {
                    println!("\n--- Terms ---");
                    for (label, value) in terms {
                        if let Some(value) = value {
                            println!("{}: {}", label, value);
                        }
                    }
                }
                println!("Registered: {}", worker.created_at);

                let contracts = ctx.db.list_contracts(worker.id)?;
                if !contracts.is_empty() {
                    println!("\nContracts ({}):", contracts.len());
                    for c in contracts {
                        println!("  {} - {} ({})", c.id, c.name, c.status);
                    }
                }
                let docs = ctx.db.list_documents(worker.id)?;
                if !docs.is_empty() {
                    println!("\nDocuments ({}):", docs.len());
                    for d in docs {
                        println!("  #{} - {}", d.id, d.name);
                    }
                }
            }
            None => {
                println!("Worker #{} not found.", id);
            }
        },

        WorkerCommands::Approve { id } => {
            let approval = workers::approve(&ctx.db, ctx.mailer.as_ref(), &ctx.actor, id)?;
            println!("Approved worker #{} ({}).", id, approval.worker.full_name());
            if approval.email_sent {
                println!("Password sent to {}.", approval.worker.email);
            } else {
                println!("Warning: the password e-mail could not be sent; approve stands.");
            }
        }

        WorkerCommands::Reject { id } => {
            let worker = workers::reject(&ctx.db, &ctx.config, &ctx.actor, id)?;
            println!("Rejected and removed registration of {}.", worker.full_name());
        }

        WorkerCommands::Login { email } => {
            let password = prompt("Password", None)?;
            if auth::verify_worker(&ctx.db, &email, &password)? {
                println!("Signed in as {}.", email.trim());
            } else {
                return Err(anyhow!("Invalid e-mail or password"));
            }
        }

        WorkerCommands::SetTerms {
            id,
            project,
            hourly_rate,
            contract_start,
            contract_end,
            rent_address,
            rent_price,
        } => {
            let worker = ctx
                .db
                .get_worker(id)?
                .ok_or_else(|| anyhow!("Worker #{} not found", id))?;
            let mut terms = worker.admin_data;
            let updates = [
                (&mut terms.project, project),
                (&mut terms.hourly_rate, hourly_rate),
                (&mut terms.contract_start, contract_start),
                (&mut terms.contract_end, contract_end),
                (&mut terms.rent_address, rent_address),
                (&mut terms.rent_price, rent_price),
            ];
            for (field, value) in updates {
                if let Some(value) = value {
                    *field = (!value.trim().is_empty()).then(|| value.trim().to_string());
                }
            }
            ctx.db.update_admin_data(id, &terms)?;
            ctx.db.log_audit(&ctx.actor, "worker.terms", Some(&format!("worker #{}", id)))?;
            println!("Updated terms for worker #{}.", id);
        }
    }
    Ok(())
}

fn run_registration(ctx: &AppContext, id_scan: Option<PathBuf>) -> Result<()> {
    let mut wizard = RegistrationWizard::new();

    if let Some(path) = id_scan {
        let image = std::fs::read(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        match ocr::create_engine(&ctx.config) {
            Some(engine) => {
                let scan = ocr::scan_id(engine.as_ref(), &image);
                let filled = wizard.apply_id_scan(&scan);
                if filled.is_empty() {
                    println!("No identity codes recognized; please type them in.");
                } else {
                    println!("Pre-filled from ID scan: {}", filled.join(", "));
                }
            }
            None => println!("OCR is not configured; skipping ID scan."),
        }
    }

    println!("Worker registration. Press Enter to keep a shown value, '<' to go back.");
    loop {
        let step = wizard.step();
        println!("\n== Step {} ==", step);

        let mut went_back = false;
        for (key, label) in step.fields() {
            let answer = prompt(label, wizard.get(key).as_deref())?;
            if answer == "<" {
                wizard.back();
                went_back = true;
                break;
            }
            wizard.set(key, &answer)?;
        }
        if went_back {
            continue;
        }

        if wizard.is_last_step() {
            let errors = wizard.validate_all();
            if errors.is_empty() {
                let id = wizard.submit(&ctx.db)?;
                println!("\nThank you! Registration #{} is waiting for approval.", id);
                return Ok(());
            }
            for e in errors {
                println!("  ! {}", e);
            }
            continue;
        }

        if let Err(errors) = wizard.next() {
            for e in errors {
                println!("  ! {}", e);
            }
        }
    }
}

fn handle_template(ctx: &AppContext, command: TemplateCommands) -> Result<()> {
    match command {
        TemplateCommands::Add { file, name } => {
            let content = std::fs::read(&file)
                .with_context(|| format!("Failed to read template file: {}", file.display()))?;
            template::document_text(&content)
                .with_context(|| format!("{} is not a usable .docx template", file.display()))?;
            let name = match name {
                Some(name) => name,
                None => file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .ok_or_else(|| anyhow!("Cannot derive a name from {}", file.display()))?,
            };
            let id = ctx.db.add_template(&name, &content)?;
            ctx.db.log_audit(&ctx.actor, "template.add", Some(&name))?;
            println!("Added template '{}' (ID: {})", name, id);
        }

        TemplateCommands::List => {
            let templates = ctx.db.list_templates()?;
            if templates.is_empty() {
                println!("No templates found.");
            } else {
                println!("{:<6} {:<40} {:<20}", "ID", "NAME", "ADDED");
                println!("{}", "-".repeat(66));
                for t in templates {
                    println!("{:<6} {:<40} {:<20}", t.id, truncate(&t.name, 38), t.created_at);
                }
            }
        }

        TemplateCommands::Delete { id } => {
            if ctx.db.delete_template(id)? {
                ctx.db.log_audit(&ctx.actor, "template.delete", Some(&format!("template #{}", id)))?;
                println!("Deleted template #{}.", id);
            } else {
                println!("Template #{} not found.", id);
            }
        }
    }
    Ok(())
}

fn handle_contract(ctx: &AppContext, command: ContractCommands) -> Result<()> {
    match command {
        ContractCommands::Generate { worker_id, template_id } => {
            let contract = contracts::generate(&ctx.db, &ctx.actor, worker_id, template_id, today())?;
            println!("Generated {} (ID: {})", contract.name, contract.id);
        }

        ContractCommands::Sign { worker_id, signature, ids } => {
            let image = std::fs::read(&signature)
                .with_context(|| format!("Failed to read signature {}", signature.display()))?;
            let report = contracts::sign(&ctx.db, &ctx.actor, worker_id, &ids, &image, today())?;
            for id in &report.signed {
                println!("Signed {}", id);
            }
            for (id, reason) in &report.skipped {
                println!("Skipped {} ({})", id, reason);
            }
            println!("\n{} signed, {} skipped.", report.signed.len(), report.skipped.len());
        }

        ContractCommands::List { worker_id } => {
            let list = match worker_id {
                Some(id) => ctx.db.list_contracts(id)?,
                None => ctx.db.list_pending_contracts()?,
            };
            if list.is_empty() {
                println!("No contracts found.");
            } else {
                println!("{:<38} {:<8} {:<8} {:<36} {:<20}", "ID", "WORKER", "STATUS", "NAME", "SIGNED");
                println!("{}", "-".repeat(112));
                for c in list {
                    println!(
                        "{:<38} {:<8} {:<8} {:<36} {:<20}",
                        c.id,
                        c.worker_id,
                        c.status,
                        truncate(&c.name, 34),
                        c.signed_at.unwrap_or_else(|| "-".to_string())
                    );
                }
            }
        }

        ContractCommands::Show { id } => {
            let contract = ctx
                .db
                .get_contract(&id)?
                .ok_or_else(|| anyhow!("Contract {} not found", id))?;
            let text = template::document_text(&contracts::decode_content(&contract)?)?;
            println!("{} ({})", contract.name, contract.status);
            println!("\n--- Text ---\n{}", text);
        }

        ContractCommands::Export { id, output } => {
            let contract = ctx
                .db
                .get_contract(&id)?
                .ok_or_else(|| anyhow!("Contract {} not found", id))?;
            let path = contracts::export(&contract, &output)?;
            println!("Contract saved to: {}", path.display());
        }

        ContractCommands::Delete { worker_id, id } => {
            if contracts::delete(&ctx.db, &ctx.actor, worker_id, &id)? {
                println!("Deleted contract {}.", id);
            } else {
                println!("Contract {} not found for worker #{}.", id, worker_id);
            }
        }
    }
    Ok(())
}

fn handle_doc(ctx: &AppContext, command: DocCommands) -> Result<()> {
    match command {
        DocCommands::Add { worker_id, file, folder, name } => {
            let doc = documents::add(&ctx.db, &ctx.config, &ctx.actor, worker_id, folder, &file, name.as_deref())?;
            println!("Stored '{}' (ID: {})", doc.name, doc.id);
        }

        DocCommands::List { worker_id } => {
            let folders = ctx.db.list_folders(worker_id)?;
            let docs = ctx.db.list_documents(worker_id)?;
            if docs.is_empty() && folders.is_empty() {
                println!("No documents found.");
                return Ok(());
            }
            println!("{:<6} {:<20} {:<36} {:<20}", "ID", "FOLDER", "NAME", "UPLOADED");
            println!("{}", "-".repeat(82));
            for d in docs {
                let folder = d
                    .folder_id
                    .and_then(|id| folders.iter().find(|f| f.id == id))
                    .map(|f| f.name.as_str())
                    .unwrap_or("/");
                println!(
                    "{:<6} {:<20} {:<36} {:<20}",
                    d.id,
                    truncate(folder, 18),
                    truncate(&d.name, 34),
                    d.uploaded_at
                );
            }
            if !folders.is_empty() {
                println!("\nFolders:");
                for f in folders {
                    println!("  #{} - {}", f.id, f.name);
                }
            }
        }

        DocCommands::Move { id, folder } => {
            documents::move_to(&ctx.db, id, folder)?;
            match folder {
                Some(folder) => println!("Moved document #{} to folder #{}.", id, folder),
                None => println!("Moved document #{} to the root.", id),
            }
        }

        DocCommands::Delete { id } => {
            let doc = documents::delete(&ctx.db, &ctx.actor, id)?;
            println!("Deleted '{}'.", doc.name);
        }
    }
    Ok(())
}

fn handle_project(ctx: &AppContext, command: ProjectCommands) -> Result<()> {
    match command {
        ProjectCommands::Add { name, client, address, no_geocode } => {
            let geocoder = ctx.geocoder(!no_geocode && address.is_some());
            let id = sites::add_project(
                &ctx.db,
                geocoder.as_ref().map(|g| g as &dyn Geocoder),
                &ctx.actor,
                client,
                &name,
                address.as_deref(),
            )?;
            println!("Added project '{}' (ID: {})", name, id);
        }

        ProjectCommands::List { client } => {
            let projects = ctx.db.list_projects(client)?;
            if projects.is_empty() {
                println!("No projects found.");
            } else {
                println!("{:<6} {:<26} {:<20} {:<30} {:<8}", "ID", "NAME", "CLIENT", "ADDRESS", "LOCATED");
                println!("{}", "-".repeat(94));
                for p in projects {
                    println!(
                        "{:<6} {:<26} {:<20} {:<30} {:<8}",
                        p.id,
                        truncate(&p.name, 24),
                        truncate(&p.client_name.unwrap_or_default(), 18),
                        truncate(&p.address.unwrap_or_default(), 28),
                        if p.latitude.is_some() { "yes" } else { "no" }
                    );
                }
            }
        }
    }
    Ok(())
}

fn handle_residence(ctx: &AppContext, command: ResidenceCommands) -> Result<()> {
    match command {
        ResidenceCommands::Add { address, capacity, rent, no_geocode } => {
            let geocoder = ctx.geocoder(!no_geocode);
            let id = sites::add_residence(
                &ctx.db,
                geocoder.as_ref().map(|g| g as &dyn Geocoder),
                &ctx.actor,
                &address,
                capacity,
                rent.as_deref(),
            )?;
            println!("Added residence '{}' (ID: {})", address, id);
        }

        ResidenceCommands::List => {
            let residences = ctx.db.list_residences()?;
            if residences.is_empty() {
                println!("No residences found.");
            } else {
                let on = today().format("%Y-%m-%d").to_string();
                println!("{:<6} {:<36} {:>8} {:>10}", "ID", "ADDRESS", "BEDS", "RENT");
                println!("{}", "-".repeat(62));
                for r in residences {
                    let occupied = ctx.db.list_occupants(r.id, Some(&on))?.len();
                    let beds = match r.capacity {
                        Some(capacity) => format!("{}/{}", occupied, capacity),
                        None => occupied.to_string(),
                    };
                    println!(
                        "{:<6} {:<36} {:>8} {:>10}",
                        r.id,
                        truncate(&r.address, 34),
                        beds,
                        r.monthly_rent.unwrap_or_default()
                    );
                }
            }
        }

        ResidenceCommands::Occupants { id, on } => {
            let occupants = ctx.db.list_occupants(id, on.as_deref())?;
            if occupants.is_empty() {
                println!("Nobody stays at residence #{}.", id);
            } else {
                println!("{:<6} {:<28} {:<12} {:<12}", "STAY", "WORKER", "CHECK-IN", "CHECK-OUT");
                println!("{}", "-".repeat(60));
                for o in occupants {
                    println!(
                        "{:<6} {:<28} {:<12} {:<12}",
                        o.id,
                        truncate(&o.worker_name, 26),
                        o.check_in,
                        o.check_out.unwrap_or_else(|| "-".to_string())
                    );
                }
            }
        }

        ResidenceCommands::CheckIn { id, worker_id, date } => {
            let date = date_or_today(date)?;
            let stay = sites::check_in(&ctx.db, &ctx.actor, id, worker_id, &date)?;
            println!("Checked in worker #{} on {} (stay #{}).", worker_id, date, stay);
        }

        ResidenceCommands::CheckOut { occupant_id, date } => {
            let date = date_or_today(date)?;
            sites::check_out(&ctx.db, &ctx.actor, occupant_id, &date)?;
            println!("Checked out stay #{} on {}.", occupant_id, date);
        }

        ResidenceCommands::Distance { id, project_id, road } => {
            let router = ctx.router(road);
            let (km, source) = sites::commute_km(
                &ctx.db,
                router.as_ref().map(|r| r as &dyn RouteService),
                id,
                project_id,
            )?;
            print_distance(km, source);
        }
    }
    Ok(())
}

fn handle_vehicle(ctx: &AppContext, command: VehicleCommands) -> Result<()> {
    match command {
        VehicleCommands::Add { plate, model, inspection_due } => {
            let due = inspection_due.map(|d| checked_date(&d)).transpose()?;
            let id = ctx.db.add_vehicle(&plate, model.as_deref(), due.as_deref())?;
            ctx.db.log_audit(&ctx.actor, "vehicle.add", Some(&plate))?;
            println!("Added vehicle {} (ID: {})", plate, id);
        }

        VehicleCommands::List => {
            let vehicles = ctx.db.list_vehicles()?;
            if vehicles.is_empty() {
                println!("No vehicles found.");
            } else {
                println!("{:<6} {:<10} {:<18} {:<26} {:<12}", "ID", "PLATE", "MODEL", "HOLDER", "INSPECTION");
                println!("{}", "-".repeat(76));
                for v in vehicles {
                    println!(
                        "{:<6} {:<10} {:<18} {:<26} {:<12}",
                        v.id,
                        v.plate,
                        truncate(&v.model.unwrap_or_default(), 16),
                        truncate(&v.holder_name.unwrap_or_else(|| "-".to_string()), 24),
                        v.inspection_due.unwrap_or_else(|| "-".to_string())
                    );
                }
            }
        }

        VehicleCommands::Assign { id, worker_id } => {
            sites::assign_vehicle(&ctx.db, &ctx.actor, id, Some(worker_id))?;
            println!("Vehicle #{} handed to worker #{}.", id, worker_id);
        }

        VehicleCommands::Return { id } => {
            sites::assign_vehicle(&ctx.db, &ctx.actor, id, None)?;
            println!("Vehicle #{} returned to the pool.", id);
        }

        VehicleCommands::Inspection { id, due } => {
            let due = checked_date(&due)?;
            ctx.db.set_inspection_due(id, Some(&due))?;
            ctx.db.log_audit(&ctx.actor, "vehicle.inspection", Some(&format!("vehicle #{} due {}", id, due)))?;
            println!("Next inspection of vehicle #{}: {}", id, due);
        }
    }
    Ok(())
}

fn handle_geo(ctx: &AppContext, command: GeoCommands) -> Result<()> {
    let geocoder = NominatimGeocoder::new(&ctx.config)?;
    match command {
        GeoCommands::Lookup { address } => match geocoder.geocode(&address)? {
            Some(found) => {
                println!("{}", found.display);
                println!("{:.6}, {:.6}", found.coordinates.lat, found.coordinates.lon);
            }
            None => println!("No match for '{}'.", address),
        },

        GeoCommands::Distance { from, to, road } => {
            let locate = |address: &str| -> Result<geo::GeocodedAddress> {
                geocoder
                    .geocode(address)?
                    .ok_or_else(|| anyhow!("No match for '{}'", address))
            };
            let a = locate(&from)?;
            let b = locate(&to)?;
            println!("From: {}", a.display);
            println!("To:   {}", b.display);
            let (km, source) = match ctx.router(road) {
                Some(router) => geo::best_distance_km(&router, a.coordinates, b.coordinates),
                None => (geo::haversine_km(a.coordinates, b.coordinates), DistanceSource::GreatCircle),
            };
            print_distance(km, source);
        }
    }
    Ok(())
}

fn print_distance(km: f64, source: DistanceSource) {
    match source {
        DistanceSource::Road => println!("{:.1} km by road", km),
        DistanceSource::GreatCircle => println!("{:.1} km (straight line)", km),
    }
}

fn print_alerts(list: &[alerts::Alert]) {
    if list.is_empty() {
        println!("Nothing needs attention.");
        return;
    }
    for alert in list {
        let when = match alert.days_left {
            Some(d) if d < 0 => format!("{}d late", -d),
            Some(d) => format!("in {}d", d),
            None => String::new(),
        };
        println!("{:<14} {:<10} {}", alert.kind.label(), when, alert.message);
    }
}

fn today() -> chrono::NaiveDate {
    chrono::Local::now().date_naive()
}

fn checked_date(s: &str) -> Result<String> {
    chrono::NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", s))
}

fn date_or_today(date: Option<String>) -> Result<String> {
    match date {
        Some(d) => checked_date(&d),
        None => Ok(today().format("%Y-%m-%d").to_string()),
    }
}

/// Reads one line from stdin. An empty answer keeps `default`.
fn prompt(label: &str, default: Option<&str>) -> Result<String> {
    match default {
        Some(d) => print!("{} [{}]: ", label, d),
        None => print!("{}: ", label),
    }
    std::io::stdout().flush()?;

    let mut line = String::new();
    if std::io::stdin().lock().read_line(&mut line)? == 0 {
        return Err(anyhow!("Input closed"));
    }
    let answer = line.trim();
    if answer.is_empty() {
        return Ok(default.unwrap_or_default().to_string());
    }
    Ok(answer.to_string())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max.saturating_sub(3)).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate("Bērziņš", 10), "Bērziņš");
        assert_eq!(truncate("Brīvības iela 100", 10), "Brīvība...");
    }

    #[test]
    fn test_checked_date() {
        assert_eq!(checked_date(" 2026-03-01 ").unwrap(), "2026-03-01");
        assert!(checked_date("01.03.2026").is_err());
    }

    #[test]
    fn test_cli_parses_sign() {
        let cli = Cli::try_parse_from(["crew", "contract", "sign", "3", "-s", "sig.png", "a", "b"]).unwrap();
        match cli.command {
            Commands::Contract {
                command: ContractCommands::Sign { worker_id, ids, .. },
            } => {
                assert_eq!(worker_id, 3);
                assert_eq!(ids, vec!["a", "b"]);
            }
            _ => panic!("wrong command"),
        }
        assert_eq!(cli.actor, "office");
    }
}
