//! Travel search providers
//!
//! Flight offers, hotel offers and airport code lookup behind one trait so
//! the agent tools can run against Amadeus or a stand-in.

mod amadeus;
pub mod links;

pub use amadeus::AmadeusClient;

use crate::{ConciergeError, Result};
use async_trait::async_trait;
use serde_json::Value;

/// Flight offer search parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlightQuery {
    pub origin: String,
    pub destination: String,
    pub departure_date: String,
    pub return_date: Option<String>,
    pub adults: u32,
    /// ECONOMY, PREMIUM_ECONOMY, BUSINESS or FIRST
    pub cabin_class: String,
    pub max_results: usize,
}

/// Hotel offer search parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotelQuery {
    pub city_code: String,
    pub check_in_date: String,
    pub check_out_date: String,
    pub adults: u32,
    pub rooms: u32,
    pub max_results: usize,
}

#[async_trait]
pub trait TravelSearch: Send + Sync {
    async fn search_flights(&self, query: &FlightQuery) -> Result<Value>;

    async fn search_hotels(&self, query: &HotelQuery) -> Result<Value>;

    async fn lookup_airport(&self, city_name: &str) -> Result<Value>;
}

/// Used when no search credentials are configured
pub struct UnconfiguredSearch;

impl UnconfiguredSearch {
    fn error() -> ConciergeError {
        ConciergeError::Config(
            "Amadeus API not configured. Set AMADEUS_API_KEY and AMADEUS_API_SECRET \
             (credentials from https://developers.amadeus.com)."
                .to_string(),
        )
    }
}

#[async_trait]
impl TravelSearch for UnconfiguredSearch {
    async fn search_flights(&self, _query: &FlightQuery) -> Result<Value> {
        Err(Self::error())
    }

    async fn search_hotels(&self, _query: &HotelQuery) -> Result<Value> {
        Err(Self::error())
    }

    async fn lookup_airport(&self, _city_name: &str) -> Result<Value> {
        Err(Self::error())
    }
}

/// Amadeus when credentials are present, otherwise a provider that reports
/// the missing configuration on every call.
pub fn from_env() -> std::sync::Arc<dyn TravelSearch> {
    match AmadeusClient::from_env() {
        Some(client) => std::sync::Arc::new(client),
        None => {
            tracing::warn!("AMADEUS_API_KEY/AMADEUS_API_SECRET not set; travel search disabled");
            std::sync::Arc::new(UnconfiguredSearch)
        }
    }
}
