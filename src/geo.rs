use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::config::Config;

pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/search";
pub const DEFAULT_OSRM_URL: &str = "https://router.project-osrm.org";

const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn from_pair(lat: Option<f64>, lon: Option<f64>) -> Option<Self> {
        Some(Self::new(lat?, lon?))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeocodedAddress {
    pub display: String,
    pub coordinates: Coordinates,
}

/// Great-circle distance in kilometres.
pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

// --- Geocoding ---

pub trait Geocoder {
    fn geocode(&self, address: &str) -> Result<Option<GeocodedAddress>>;
}

#[derive(Debug, Default, Deserialize)]
struct NominatimAddress {
    road: Option<String>,
    house_number: Option<String>,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    municipality: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    display_name: String,
    #[serde(default)]
    address: Option<NominatimAddress>,
}

pub struct NominatimGeocoder {
    url: String,
    client: reqwest::blocking::Client,
}

impl NominatimGeocoder {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .context("Failed to build geocoding client")?;
        Ok(Self {
            url: config.nominatim_url.clone(),
            client,
        })
    }
}

impl Geocoder for NominatimGeocoder {
    fn geocode(&self, address: &str) -> Result<Option<GeocodedAddress>> {
        let query = address.trim();
        if query.is_empty() {
            return Ok(None);
        }

        let response = self
            .client
            .get(&self.url)
            .query(&[("q", query), ("format", "json"), ("addressdetails", "1"), ("limit", "1")])
            .send()
            .context("Failed to send request to geocoding service")?;

        if !response.status().is_success() {
            return Err(anyhow!("Geocoding request failed with status {}", response.status()));
        }

        let places: Vec<NominatimPlace> = response
            .json()
            .context("Failed to parse geocoding response")?;

        places.into_iter().next().map(place_to_address).transpose()
    }
}

fn place_to_address(place: NominatimPlace) -> Result<GeocodedAddress> {
    let lat: f64 = place.lat.parse().context("Invalid latitude in geocoding response")?;
    let lon: f64 = place.lon.parse().context("Invalid longitude in geocoding response")?;
    Ok(GeocodedAddress {
        display: display_address(place.address.as_ref(), &place.display_name),
        coordinates: Coordinates::new(lat, lon),
    })
}

/// `"<road> <house number>, <city>"`, dropping whatever is missing. With
/// neither road nor city, the first two parts of the full display name.
fn display_address(address: Option<&NominatimAddress>, display_name: &str) -> String {
    let non_empty = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);

    if let Some(addr) = address {
        let street = match (non_empty(&addr.road), non_empty(&addr.house_number)) {
            (Some(road), Some(number)) => Some(format!("{} {}", road, number)),
            (Some(road), None) => Some(road),
            _ => None,
        };
        let city = non_empty(&addr.city)
            .or_else(|| non_empty(&addr.town))
            .or_else(|| non_empty(&addr.village))
            .or_else(|| non_empty(&addr.municipality));

        match (street, city) {
            (Some(street), Some(city)) => return format!("{}, {}", street, city),
            (Some(street), None) => return street,
            (None, Some(city)) => return city,
            (None, None) => {}
        }
    }

    display_name
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .take(2)
        .collect::<Vec<_>>()
        .join(", ")
}

// --- Routing ---

pub trait RouteService {
    fn road_distance_km(&self, from: Coordinates, to: Coordinates) -> Result<f64>;
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    distance: f64, // metres
}

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

pub struct OsrmRouter {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl OsrmRouter {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .context("Failed to build routing client")?;
        Ok(Self {
            base_url: config.osrm_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

impl RouteService for OsrmRouter {
    fn road_distance_km(&self, from: Coordinates, to: Coordinates) -> Result<f64> {
        let url = format!(
            "{}/route/v1/driving/{},{};{},{}",
            self.base_url, from.lon, from.lat, to.lon, to.lat
        );
        let response = self
            .client
            .get(&url)
            .query(&[("overview", "false")])
            .send()
            .context("Failed to send request to routing service")?;

        if !response.status().is_success() {
            return Err(anyhow!("Routing request failed with status {}", response.status()));
        }

        let parsed: OsrmResponse = response.json().context("Failed to parse routing response")?;
        if parsed.code != "Ok" {
            return Err(anyhow!("Routing service answered {}", parsed.code));
        }
        parsed
            .routes
            .first()
            .map(|r| r.distance / 1000.0)
            .ok_or_else(|| anyhow!("No route found"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DistanceSource {
    Road,
    GreatCircle,
}

/// Road distance when the routing service answers, great-circle otherwise.
pub fn best_distance_km(router: &dyn RouteService, from: Coordinates, to: Coordinates) -> (f64, DistanceSource) {
    match router.road_distance_km(from, to) {
        Ok(km) => (km, DistanceSource::Road),
        Err(e) => {
            tracing::warn!("Road distance unavailable, using great-circle distance: {:#}", e);
            (haversine_km(from, to), DistanceSource::GreatCircle)
        }
    }
}
