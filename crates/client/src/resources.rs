//! Travel backend endpoints.
//!
//! Read endpoints come with the cache keys the web client has always used,
//! so a store shared with older data keeps serving it.

use serde::Serialize;
use tripsync_core::{Error, RequestSpec};

/// A readable collection or document on the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resource {
    Trips,
    Trip(String),
    TripSummary(String),
    Expenses(String),
    ExpensesSummary(String),
    Itineraries(String),
    Itinerary { trip: String, id: String },
    Participants(String),
    Categories,
    PendingInvitations,
}

impl Resource {
    pub fn path(&self) -> String {
        match self {
            Resource::Trips => "/trips".to_string(),
            Resource::Trip(id) => format!("/trips/{id}"),
            Resource::TripSummary(id) => format!("/trips/{id}/summary"),
            Resource::Expenses(trip) => format!("/trips/{trip}/expenses"),
            Resource::ExpensesSummary(trip) => format!("/trips/{trip}/expenses-summary"),
            Resource::Itineraries(trip) => format!("/trips/{trip}/itineraries"),
            Resource::Itinerary { trip, id } => format!("/trips/{trip}/itineraries/{id}"),
            Resource::Participants(trip) => format!("/trips/{trip}/participants"),
            Resource::Categories => "/categories".to_string(),
            Resource::PendingInvitations => "/pending-invitations".to_string(),
        }
    }

    pub fn cache_key(&self) -> String {
        match self {
            Resource::Trips => "cached-trips".to_string(),
            Resource::Expenses(trip) => format!("cached-expenses-{trip}"),
            Resource::Itineraries(trip) => format!("itineraries-{trip}"),
            Resource::Categories => "categories".to_string(),
            other => tripsync_core::request::derive_cache_key(&other.path()),
        }
    }

    /// GET request for this resource, cached under [`Resource::cache_key`].
    pub fn request(&self) -> RequestSpec {
        RequestSpec::get(self.path()).with_cache_key(self.cache_key())
    }
}

pub fn create_trip<T: Serialize>(trip: &T) -> Result<RequestSpec, Error> {
    RequestSpec::post("/trips").with_json(trip)
}

pub fn update_trip<T: Serialize>(id: &str, trip: &T) -> Result<RequestSpec, Error> {
    RequestSpec::put(format!("/trips/{id}")).with_json(trip)
}

pub fn delete_trip(id: &str) -> RequestSpec {
    RequestSpec::delete(format!("/trips/{id}"))
}

pub fn create_expense<T: Serialize>(trip: &str, expense: &T) -> Result<RequestSpec, Error> {
    RequestSpec::post(format!("/trips/{trip}/expenses")).with_json(expense)
}

pub fn update_expense<T: Serialize>(trip: &str, id: &str, expense: &T) -> Result<RequestSpec, Error> {
    RequestSpec::put(format!("/trips/{trip}/expenses/{id}")).with_json(expense)
}

pub fn delete_expense(trip: &str, id: &str) -> RequestSpec {
    RequestSpec::delete(format!("/trips/{trip}/expenses/{id}"))
}
