//! Dashboard alerts: approvals and signatures waiting, contracts running
//! out, vehicle inspections coming due.

use std::ops::ControlFlow;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;

use crate::db::Database;
use crate::models::WorkerStatus;

pub const CONTRACT_END_WINDOW_DAYS: i64 = 14;
pub const INSPECTION_WINDOW_DAYS: i64 = 30;
pub const POLL_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlertKind {
    InspectionDue,
    ContractEnding,
    PendingContract,
    PendingWorker,
}

impl AlertKind {
    pub fn label(self) -> &'static str {
        match self {
            AlertKind::PendingWorker => "approval",
            AlertKind::PendingContract => "signature",
            AlertKind::ContractEnding => "contract end",
            AlertKind::InspectionDue => "inspection",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub kind: AlertKind,
    pub message: String,
    /// Days until the deadline; negative when overdue. None for queue items.
    pub days_left: Option<i64>,
}

/// Accepts ISO dates and the `dd.mm.yyyy` form used on contracts.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%d.%m.%Y"))
        .ok()
}

pub fn compute(db: &Database, today: NaiveDate) -> Result<Vec<Alert>> {
    let mut alerts = Vec::new();

    for worker in db.list_workers(Some(WorkerStatus::Pending))? {
        alerts.push(Alert {
            kind: AlertKind::PendingWorker,
            message: format!("{} ({}) is waiting for approval", worker.full_name(), worker.email),
            days_left: None,
        });
    }

    for contract in db.list_pending_contracts()? {
        alerts.push(Alert {
            kind: AlertKind::PendingContract,
            message: format!("{} is waiting for a signature", contract.name),
            days_left: None,
        });
    }

    for worker in db.list_workers(Some(WorkerStatus::Active))? {
        let Some(end) = worker.admin_data.contract_end.as_deref() else {
            continue;
        };
        let Some(end_date) = parse_date(end) else {
            tracing::debug!(worker_id = worker.id, end, "unreadable contract end date");
            continue;
        };
        let days = (end_date - today).num_days();
        if (0..=CONTRACT_END_WINDOW_DAYS).contains(&days) {
            alerts.push(Alert {
                kind: AlertKind::ContractEnding,
                message: format!("Contract of {} ends on {}", worker.full_name(), end_date),
                days_left: Some(days),
            });
        }
    }

    for vehicle in db.list_vehicles()? {
        let Some(due) = vehicle.inspection_due.as_deref().and_then(parse_date) else {
            continue;
        };
        let days = (due - today).num_days();
        if days <= INSPECTION_WINDOW_DAYS {
            let message = if days < 0 {
                format!("Inspection of {} is overdue since {}", vehicle.plate, due)
            } else {
                format!("Inspection of {} is due on {}", vehicle.plate, due)
            };
            alerts.push(Alert {
                kind: AlertKind::InspectionDue,
                message,
                days_left: Some(days),
            });
        }
    }

    // Deadlines first, soonest on top.
    alerts.sort_by_key(|a| (a.days_left.is_none(), a.days_left, a.kind));
    Ok(alerts)
}

/// Recomputes alerts every `every` until Ctrl-C or until `on_tick` breaks.
/// Runs on a current-thread runtime; the connection never leaves this thread.
pub fn watch<F>(db: &Database, every: Duration, mut on_tick: F) -> Result<()>
where
    F: FnMut(&[Alert]) -> ControlFlow<()>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start the alert poll runtime")?;

    runtime.block_on(async {
        let mut ticker = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let today = chrono::Local::now().date_naive();
                    match compute(db, today) {
                        Ok(alerts) => {
                            if on_tick(&alerts).is_break() {
                                break;
                            }
                        }
                        Err(e) => tracing::warn!("Alert refresh failed: {:#}", e),
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("alert watch stopped");
                    break;
                }
            }
        }
        Ok(())
    })
}
