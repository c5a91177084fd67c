use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::domain::{DriverId, UserId, VendorId};

/// Driver record as exposed by the external directory service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverProfile {
    pub driver_id: DriverId,
    pub driver_name: String,
    pub contact_no: Option<String>,
    pub alt_contact_no: Option<String>,
}

/// Rider record, used only to enrich response views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub user_name: String,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub gender: Option<String>,
}

/// Vendor record, used only to enrich response views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorProfile {
    pub id: VendorId,
    pub vendor_company_name: String,
    pub contact_no: Option<String>,
    pub alternate_mobile_no: Option<String>,
    pub city: Option<String>,
    pub vendor_email: Option<String>,
}

/// Lookup error shared by all directory kinds.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },
    #[error("directory transport error: {0}")]
    Transport(String),
}

pub trait DriverDirectory: Send + Sync {
    fn get_driver(&self, id: DriverId) -> Result<DriverProfile, DirectoryError>;
}

pub trait UserDirectory: Send + Sync {
    fn get_user(&self, id: UserId) -> Result<UserProfile, DirectoryError>;
}

pub trait VendorDirectory: Send + Sync {
    fn get_vendor(&self, id: VendorId) -> Result<VendorProfile, DirectoryError>;
}

/// REST adapter against the upstream directory service
/// (`{base}/vendorDriver/{id}`, `{base}/vendors/{id}`,
/// `{base}/auth/getCarRentalUserById/{id}`).
#[derive(Debug, Clone)]
pub struct HttpDirectoryClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpDirectoryClient {
    pub fn new(base_url: String, timeout_secs: u64) -> Result<Self, DirectoryError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|err| DirectoryError::Transport(err.to_string()))?;

        Ok(Self { base_url, client })
    }

    fn fetch<T>(&self, path: &str, kind: &'static str, id: i64) -> Result<T, DirectoryError>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        debug!(%url, "directory lookup");

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| DirectoryError::Transport(err.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(DirectoryError::NotFound { kind, id });
        }

        response
            .error_for_status()
            .and_then(|resp| resp.json::<T>())
            .map_err(|err| DirectoryError::Transport(err.to_string()))
    }
}

impl DriverDirectory for HttpDirectoryClient {
    fn get_driver(&self, id: DriverId) -> Result<DriverProfile, DirectoryError> {
        self.fetch(&format!("vendorDriver/{id}"), "driver", id.0)
    }
}

impl UserDirectory for HttpDirectoryClient {
    fn get_user(&self, id: UserId) -> Result<UserProfile, DirectoryError> {
        self.fetch(&format!("auth/getCarRentalUserById/{id}"), "user", id.0)
    }
}

impl VendorDirectory for HttpDirectoryClient {
    fn get_vendor(&self, id: VendorId) -> Result<VendorProfile, DirectoryError> {
        self.fetch(&format!("vendors/{id}"), "vendor", id.0)
    }
}

/// Map-backed directory for the demo stack and tests.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    drivers: Mutex<HashMap<DriverId, DriverProfile>>,
    users: Mutex<HashMap<UserId, UserProfile>>,
    vendors: Mutex<HashMap<VendorId, VendorProfile>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_driver(&self, profile: DriverProfile) {
        self.drivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(profile.driver_id, profile);
    }

    pub fn insert_user(&self, profile: UserProfile) {
        self.users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(profile.id, profile);
    }

    pub fn insert_vendor(&self, profile: VendorProfile) {
        self.vendors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(profile.id, profile);
    }
}

impl DriverDirectory for InMemoryDirectory {
    fn get_driver(&self, id: DriverId) -> Result<DriverProfile, DirectoryError> {
        self.drivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(DirectoryError::NotFound {
                kind: "driver",
                id: id.0,
            })
    }
}

impl UserDirectory for InMemoryDirectory {
    fn get_user(&self, id: UserId) -> Result<UserProfile, DirectoryError> {
        self.users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(DirectoryError::NotFound {
                kind: "user",
                id: id.0,
            })
    }
}

impl VendorDirectory for InMemoryDirectory {
    fn get_vendor(&self, id: VendorId) -> Result<VendorProfile, DirectoryError> {
        self.vendors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(DirectoryError::NotFound {
                kind: "vendor",
                id: id.0,
            })
    }
}
