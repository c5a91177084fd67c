use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::config::GeoConfig;

/// Road-distance and geocoding lookups backing the route compatibility
/// checker. Implementations are network-backed and fallible; callers treat
/// every failure as "do not share the ride".
pub trait DistanceProvider: Send + Sync {
    /// Road distance in meters between two free-form location strings.
    fn road_distance(&self, origin: &str, destination: &str) -> Result<f64, GeoError>;

    /// Coordinates (lat, lng) for a free-form location string.
    fn geocode(&self, address: &str) -> Result<(f64, f64), GeoError>;
}

#[derive(Debug, thiserror::Error)]
pub enum GeoError {
    #[error("no geocoding result for '{address}'")]
    NoResult { address: String },
    #[error("no route found between '{origin}' and '{destination}'")]
    NoRoute { origin: String, destination: String },
    #[error("provider returned non-positive distance {meters} for '{origin}' -> '{destination}'")]
    InvalidDistance {
        origin: String,
        destination: String,
        meters: f64,
    },
    #[error("distance provider transport error: {0}")]
    Transport(String),
}

/// HTTP adapter for the Google Maps geocoding and directions APIs.
///
/// The request timeout is mandatory: distance lookups run while the engine
/// holds a driver/date lock, so a hung request would stall every assignment
/// for that driver on that date.
#[derive(Debug, Clone)]
pub struct GoogleRoutesClient {
    config: GeoConfig,
    client: reqwest::blocking::Client,
}

impl GoogleRoutesClient {
    pub fn new(config: GeoConfig) -> Result<Self, GeoError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| GeoError::Transport(err.to_string()))?;

        Ok(Self { config, client })
    }
}

impl DistanceProvider for GoogleRoutesClient {
    fn road_distance(&self, origin: &str, destination: &str) -> Result<f64, GeoError> {
        debug!(%origin, %destination, "directions lookup");

        let response = self
            .client
            .get(&self.config.directions_url)
            .query(&[
                ("origin", origin),
                ("destination", destination),
                ("key", self.config.api_key.as_str()),
            ])
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.json::<DirectionsResponse>())
            .map_err(|err| GeoError::Transport(err.to_string()))?;

        if response.status != "OK" {
            return Err(GeoError::NoRoute {
                origin: origin.to_string(),
                destination: destination.to_string(),
            });
        }

        response
            .routes
            .into_iter()
            .next()
            .and_then(|route| route.legs.into_iter().next())
            .map(|leg| leg.distance.value)
            .ok_or_else(|| GeoError::NoRoute {
                origin: origin.to_string(),
                destination: destination.to_string(),
            })
    }

    fn geocode(&self, address: &str) -> Result<(f64, f64), GeoError> {
        debug!(%address, "geocode lookup");

        let response = self
            .client
            .get(&self.config.geocode_url)
            .query(&[("address", address), ("key", self.config.api_key.as_str())])
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.json::<GeocodeResponse>())
            .map_err(|err| GeoError::Transport(err.to_string()))?;

        if response.status != "OK" {
            return Err(GeoError::NoResult {
                address: address.to_string(),
            });
        }

        response
            .results
            .into_iter()
            .next()
            .map(|result| (result.geometry.location.lat, result.geometry.location.lng))
            .ok_or_else(|| GeoError::NoResult {
                address: address.to_string(),
            })
    }
}

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    status: String,
    #[serde(default)]
    routes: Vec<DirectionsRoute>,
}

#[derive(Debug, Deserialize)]
struct DirectionsRoute {
    #[serde(default)]
    legs: Vec<DirectionsLeg>,
}

#[derive(Debug, Deserialize)]
struct DirectionsLeg {
    distance: DirectionsDistance,
}

#[derive(Debug, Deserialize)]
struct DirectionsDistance {
    value: f64,
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    geometry: GeocodeGeometry,
}

#[derive(Debug, Deserialize)]
struct GeocodeGeometry {
    location: GeocodeLocation,
}

#[derive(Debug, Deserialize)]
struct GeocodeLocation {
    lat: f64,
    lng: f64,
}

/// Process-lifetime cache over another provider. Successful lookups are kept
/// forever (no eviction); failures are never cached. Each instance owns its
/// maps, so tests construct an isolated cache per run instead of sharing a
/// static singleton.
pub struct CachingProvider<P> {
    inner: P,
    distances: Mutex<HashMap<(String, String), f64>>,
    coordinates: Mutex<HashMap<String, (f64, f64)>>,
}

impl<P: DistanceProvider> CachingProvider<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            distances: Mutex::new(HashMap::new()),
            coordinates: Mutex::new(HashMap::new()),
        }
    }
}

impl<P: DistanceProvider> DistanceProvider for CachingProvider<P> {
    fn road_distance(&self, origin: &str, destination: &str) -> Result<f64, GeoError> {
        let key = (origin.to_string(), destination.to_string());
        if let Some(meters) = self
            .distances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(*meters);
        }

        let meters = self.inner.road_distance(origin, destination)?;
        self.distances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, meters);
        Ok(meters)
    }

    fn geocode(&self, address: &str) -> Result<(f64, f64), GeoError> {
        if let Some(coords) = self
            .coordinates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
        {
            return Ok(*coords);
        }

        let coords = self.inner.geocode(address)?;
        self.coordinates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(address.to_string(), coords);
        Ok(coords)
    }
}

/// Scripted provider with fixed distance and coordinate tables. Used by the
/// demo command; tests build their own instances.
#[derive(Debug, Default)]
pub struct StaticTableProvider {
    distances: HashMap<(String, String), f64>,
    coordinates: HashMap<String, (f64, f64)>,
}

impl StaticTableProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the distance in both directions.
    pub fn set_distance(&mut self, a: &str, b: &str, meters: f64) {
        self.distances
            .insert((a.to_string(), b.to_string()), meters);
        self.distances
            .insert((b.to_string(), a.to_string()), meters);
    }

    pub fn set_coordinates(&mut self, place: &str, lat: f64, lng: f64) {
        self.coordinates.insert(place.to_string(), (lat, lng));
    }

    /// Removes a distance pair in both directions, leaving a lookup hole.
    pub fn clear_distance(&mut self, a: &str, b: &str) {
        self.distances.remove(&(a.to_string(), b.to_string()));
        self.distances.remove(&(b.to_string(), a.to_string()));
    }
}

impl DistanceProvider for StaticTableProvider {
    fn road_distance(&self, origin: &str, destination: &str) -> Result<f64, GeoError> {
        self.distances
            .get(&(origin.to_string(), destination.to_string()))
            .copied()
            .ok_or_else(|| GeoError::NoRoute {
                origin: origin.to_string(),
                destination: destination.to_string(),
            })
    }

    fn geocode(&self, address: &str) -> Result<(f64, f64), GeoError> {
        self.coordinates
            .get(address)
            .copied()
            .ok_or_else(|| GeoError::NoResult {
                address: address.to_string(),
            })
    }
}
