//! Projects, residences and vehicles: the places and things workers are
//! assigned to.

use anyhow::{anyhow, Result};

use crate::db::{Database, Repository};
use crate::geo::{self, Coordinates, DistanceSource, Geocoder, RouteService};
use crate::models::Occupant;

/// Geocodes `address` when a geocoder is available. Failures and misses
/// are logged and leave the record without coordinates.
pub fn locate(geocoder: Option<&dyn Geocoder>, address: &str) -> Option<(f64, f64)> {
    let geocoder = geocoder?;
    match geocoder.geocode(address) {
        Ok(Some(found)) => {
            tracing::debug!(address, resolved = %found.display, "address geocoded");
            Some((found.coordinates.lat, found.coordinates.lon))
        }
        Ok(None) => {
            tracing::warn!(address, "Address not found, saving without coordinates");
            None
        }
        Err(e) => {
            tracing::warn!(address, "Geocoding failed, saving without coordinates: {:#}", e);
            None
        }
    }
}

pub fn add_project(
    db: &Database,
    geocoder: Option<&dyn Geocoder>,
    actor: &str,
    client_id: Option<i64>,
    name: &str,
    address: Option<&str>,
) -> Result<i64> {
    let coords = address.and_then(|a| locate(geocoder, a));
    let id = db.add_project(client_id, name, address, coords)?;
    db.log_audit(actor, "project.add", Some(name))?;
    Ok(id)
}

pub fn add_residence(
    db: &Database,
    geocoder: Option<&dyn Geocoder>,
    actor: &str,
    address: &str,
    capacity: Option<i64>,
    monthly_rent: Option<&str>,
) -> Result<i64> {
    let coords = locate(geocoder, address);
    let id = db.add_residence(address, capacity, monthly_rent, coords)?;
    db.log_audit(actor, "residence.add", Some(address))?;
    Ok(id)
}

/// Starts an open-ended stay on `date`.
///
/// Every stay still running on or after `date` counts against the
/// residence, including ones that start later. Refused when the worker
/// already has such a stay there, or when the beds would be overbooked at
/// any point from `date` on.
pub fn check_in(db: &Database, actor: &str, residence_id: i64, worker_id: i64, date: &str) -> Result<i64> {
    let residence = db
        .get_residence(residence_id)?
        .ok_or_else(|| anyhow!("Residence #{} not found", residence_id))?;
    let worker = db
        .get_worker(worker_id)?
        .ok_or_else(|| anyhow!("Worker #{} not found", worker_id))?;

    let overlapping: Vec<Occupant> = db
        .list_occupants(residence_id, None)?
        .into_iter()
        .filter(|o| o.check_out.as_deref().is_none_or(|out| out > date))
        .collect();
    if overlapping.iter().any(|o| o.worker_id == worker_id) {
        return Err(anyhow!("{} already stays at {}", worker.full_name(), residence.address));
    }
    if let Some(capacity) = residence.capacity {
        let peak = peak_occupancy(&overlapping, date);
        if peak as i64 >= capacity {
            return Err(anyhow!("{} is full ({} of {} beds taken)", residence.address, peak, capacity));
        }
    }

    let id = db.add_occupant(residence_id, worker_id, date)?;
    db.log_audit(
        actor,
        "residence.check_in",
        Some(&format!("worker #{} at residence #{} from {}", worker_id, residence_id, date)),
    )?;
    Ok(id)
}

/// Most stays running at once from `from` onwards. Occupancy only rises
/// when a stay begins, so checking `from` and each later check-in is enough.
fn peak_occupancy(stays: &[Occupant], from: &str) -> usize {
    let staying_on = |day: &str| {
        stays
            .iter()
            .filter(|o| o.check_in.as_str() <= day && o.check_out.as_deref().is_none_or(|out| out > day))
            .count()
    };
    stays
        .iter()
        .map(|o| o.check_in.as_str())
        .filter(|day| *day > from)
        .chain(std::iter::once(from))
        .map(staying_on)
        .max()
        .unwrap_or(0)
}

/// Ends a stay. The check-out date cannot be before the check-in.
pub fn check_out(db: &Database, actor: &str, occupant_id: i64, date: &str) -> Result<()> {
    let stay = db
        .get_occupant(occupant_id)?
        .ok_or_else(|| anyhow!("Stay #{} not found", occupant_id))?;
    if date < stay.check_in.as_str() {
        return Err(anyhow!(
            "Check-out {} is before the check-in on {}",
            date,
            stay.check_in
        ));
    }
    db.check_out_occupant(occupant_id, date)?;
    db.log_audit(actor, "residence.check_out", Some(&format!("stay #{} until {}", occupant_id, date)))
}

pub fn assign_vehicle(db: &Database, actor: &str, vehicle_id: i64, holder_id: Option<i64>) -> Result<()> {
    if let Some(holder) = holder_id {
        if db.get_worker(holder)?.is_none() {
            return Err(anyhow!("Worker #{} not found", holder));
        }
    }
    db.assign_vehicle(vehicle_id, holder_id)?;
    let details = match holder_id {
        Some(holder) => format!("vehicle #{} to worker #{}", vehicle_id, holder),
        None => format!("vehicle #{} returned", vehicle_id),
    };
    db.log_audit(actor, "vehicle.assign", Some(&details))
}

/// Distance from a residence to a project site. Road distance with a
/// router, great-circle otherwise.
pub fn commute_km(
    db: &Database,
    router: Option<&dyn RouteService>,
    residence_id: i64,
    project_id: i64,
) -> Result<(f64, DistanceSource)> {
    let residence = db
        .get_residence(residence_id)?
        .ok_or_else(|| anyhow!("Residence #{} not found", residence_id))?;
    let project = db
        .get_project(project_id)?
        .ok_or_else(|| anyhow!("Project #{} not found", project_id))?;

    let from = Coordinates::from_pair(residence.latitude, residence.longitude)
        .ok_or_else(|| anyhow!("Residence #{} has no coordinates", residence_id))?;
    let to = Coordinates::from_pair(project.latitude, project.longitude)
        .ok_or_else(|| anyhow!("Project #{} has no coordinates", project_id))?;

    Ok(match router {
        Some(router) => geo::best_distance_km(router, from, to),
        None => (geo::haversine_km(from, to), DistanceSource::GreatCircle),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::new_worker;
    use crate::geo::GeocodedAddress;
    use crate::models::WorkerStatus;

    struct FixedGeocoder(Option<Coordinates>);

    impl Geocoder for FixedGeocoder {
        fn geocode(&self, address: &str) -> Result<Option<GeocodedAddress>> {
            Ok(self.0.map(|coordinates| GeocodedAddress {
                display: address.to_string(),
                coordinates,
            }))
        }
    }

    struct DownGeocoder;

    impl Geocoder for DownGeocoder {
        fn geocode(&self, _address: &str) -> Result<Option<GeocodedAddress>> {
            Err(anyhow!("503"))
        }
    }

    #[test]
    fn test_project_geocoded_opportunistically() {
        let db = Database::open_in_memory().unwrap();
        let vaasa = FixedGeocoder(Some(Coordinates::new(63.0951, 21.6165)));

        let located = add_project(&db, Some(&vaasa), "office", None, "Quay", Some("Satama 2, Vaasa")).unwrap();
        let p = db.get_project(located).unwrap().unwrap();
        assert_eq!((p.latitude, p.longitude), (Some(63.0951), Some(21.6165)));

        let unlocated = add_project(&db, Some(&DownGeocoder), "office", None, "Depot", Some("Somewhere")).unwrap();
        assert!(db.get_project(unlocated).unwrap().unwrap().latitude.is_none());

        let offline = add_project(&db, None, "office", None, "Yard", Some("Somewhere")).unwrap();
        assert!(db.get_project(offline).unwrap().unwrap().latitude.is_none());
    }

    #[test]
    fn test_check_in_respects_capacity() {
        let db = Database::open_in_memory().unwrap();
        let a = db.create_worker(&new_worker("a@example.com"), WorkerStatus::Active).unwrap();
        let b = db.create_worker(&new_worker("b@example.com"), WorkerStatus::Active).unwrap();
        let flat = add_residence(&db, None, "office", "Rantakatu 1", Some(1), Some("450")).unwrap();

        let stay = check_in(&db, "office", flat, a, "2026-01-01").unwrap();
        assert!(check_in(&db, "office", flat, a, "2026-01-05").is_err());
        assert!(check_in(&db, "office", flat, b, "2026-01-05").is_err());

        check_out(&db, "office", stay, "2026-01-10").unwrap();
        assert!(check_in(&db, "office", flat, b, "2026-01-10").is_ok());
    }

    #[test]
    fn test_back_dated_check_in_counts_later_stays() {
        let db = Database::open_in_memory().unwrap();
        let a = db.create_worker(&new_worker("a@example.com"), WorkerStatus::Active).unwrap();
        let b = db.create_worker(&new_worker("b@example.com"), WorkerStatus::Active).unwrap();
        let flat = add_residence(&db, None, "office", "Rantakatu 1", Some(1), None).unwrap();

        check_in(&db, "office", flat, a, "2026-03-01").unwrap();
        // Free on 02-01, but the open stay would run into a's from 03-01.
        assert!(check_in(&db, "office", flat, b, "2026-02-01").is_err());
        assert!(check_in(&db, "office", flat, a, "2026-02-01").is_err());
        assert_eq!(db.list_occupants(flat, None).unwrap().len(), 1);
    }

    #[test]
    fn test_capacity_counts_concurrent_stays_only() {
        let db = Database::open_in_memory().unwrap();
        let a = db.create_worker(&new_worker("a@example.com"), WorkerStatus::Active).unwrap();
        let b = db.create_worker(&new_worker("b@example.com"), WorkerStatus::Active).unwrap();
        let c = db.create_worker(&new_worker("c@example.com"), WorkerStatus::Active).unwrap();
        let flat = add_residence(&db, None, "office", "Rantakatu 1", Some(2), None).unwrap();

        let first = check_in(&db, "office", flat, a, "2026-01-01").unwrap();
        check_out(&db, "office", first, "2026-01-20").unwrap();
        check_in(&db, "office", flat, b, "2026-02-01").unwrap();

        // a's stay and b's never overlap, so one bed is still free from 01-10.
        assert!(check_in(&db, "office", flat, c, "2026-01-10").is_ok());
    }

    #[test]
    fn test_check_out_before_check_in_is_refused() {
        let db = Database::open_in_memory().unwrap();
        let a = db.create_worker(&new_worker("a@example.com"), WorkerStatus::Active).unwrap();
        let flat = add_residence(&db, None, "office", "Rantakatu 1", None, None).unwrap();
        let stay = check_in(&db, "office", flat, a, "2026-03-10").unwrap();

        assert!(check_out(&db, "office", stay, "2026-03-09").is_err());
        assert!(db.get_occupant(stay).unwrap().unwrap().check_out.is_none());
        check_out(&db, "office", stay, "2026-03-10").unwrap();
        assert!(check_out(&db, "office", 999, "2026-03-10").is_err());
    }

    #[test]
    fn test_assign_vehicle_to_unknown_worker() {
        let db = Database::open_in_memory().unwrap();
        let van = db.add_vehicle("ABC-123", None, None).unwrap();
        assert!(assign_vehicle(&db, "office", van, Some(77)).is_err());
        assert!(assign_vehicle(&db, "office", van, None).is_ok());
    }

    #[test]
    fn test_commute_needs_coordinates() {
        let db = Database::open_in_memory().unwrap();
        let riga = FixedGeocoder(Some(Coordinates::new(56.9496, 24.1052)));
        let helsinki = FixedGeocoder(Some(Coordinates::new(60.1699, 24.9384)));
        let home = add_residence(&db, Some(&riga), "office", "Brīvības iela 1, Rīga", None, None).unwrap();
        let site = add_project(&db, Some(&helsinki), "office", None, "Harbour", Some("Helsinki")).unwrap();
        let nowhere = add_project(&db, None, "office", None, "Unknown", None).unwrap();

        let (km, source) = commute_km(&db, None, home, site).unwrap();
        assert_eq!(source, DistanceSource::GreatCircle);
        assert!((355.0..=367.0).contains(&km));

        assert!(commute_km(&db, None, home, nowhere).is_err());
    }
}
