//! Amadeus self-service API client.
//!
//! Authenticates with the client-credentials grant and caches the bearer
//! token until shortly before it expires. Responses are reshaped into the
//! compact JSON handed back to the model.

use super::links::{
    airline_info, flight_search_links, hotel_booking_link, hotel_search_links, FLIGHT_CITATION,
    HOTEL_CITATION,
};
use super::{FlightQuery, HotelQuery, TravelSearch};
use crate::{ConciergeError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

const TEST_BASE_URL: &str = "https://test.api.amadeus.com";
const PRODUCTION_BASE_URL: &str = "https://api.amadeus.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Refresh tokens this long before the advertised expiry
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(30);
/// Hotels from the city listing whose offers are requested
const MAX_HOTEL_IDS: usize = 20;
const MAX_LOCATIONS: usize = 5;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

pub struct AmadeusClient {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    token: Mutex<Option<CachedToken>>,
}

impl AmadeusClient {
    /// Build from `AMADEUS_API_KEY` / `AMADEUS_API_SECRET`. `AMADEUS_HOSTNAME`
    /// set to `production` selects live data; the test environment otherwise.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("AMADEUS_API_KEY").ok().filter(|v| !v.is_empty())?;
        let api_secret = std::env::var("AMADEUS_API_SECRET")
            .ok()
            .filter(|v| !v.is_empty())?;
        let base_url = match std::env::var("AMADEUS_HOSTNAME").as_deref() {
            Ok("production") => PRODUCTION_BASE_URL,
            _ => TEST_BASE_URL,
        };
        Self::new(base_url, api_key, api_secret).ok()
    }

    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ConciergeError::Config(format!("HTTP client: {}", e)))?;
        info!("Amadeus search enabled ({})", base_url);
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.access_token.clone());
            }
        }

        let url = format!("{}/v1/security/oauth2/token", self.base_url);
        let response = self
            .client
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.api_key.as_str()),
                ("client_secret", self.api_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ConciergeError::Search(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ConciergeError::Auth(format!(
                "Amadeus token request failed {status}: {body}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ConciergeError::Auth(format!("malformed token response: {}", e)))?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        debug!("Obtained Amadeus token valid for {:?}", lifetime);

        *cached = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }

    async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<Value> {
        let token = self.access_token().await?;
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(params)
            .send()
            .await
            .map_err(|e| ConciergeError::Search(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Amadeus {} failed: {} {}", path, status, body);
            return Err(ConciergeError::Search(format!(
                "Amadeus API error {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ConciergeError::Search(format!("malformed response from {}: {}", path, e)))
    }
}

#[async_trait]
impl TravelSearch for AmadeusClient {
    async fn search_flights(&self, query: &FlightQuery) -> Result<Value> {
        let mut params = vec![
            ("originLocationCode", query.origin.to_uppercase()),
            ("destinationLocationCode", query.destination.to_uppercase()),
            ("departureDate", query.departure_date.clone()),
            ("adults", query.adults.to_string()),
            ("travelClass", query.cabin_class.clone()),
            ("max", query.max_results.to_string()),
            ("currencyCode", "USD".to_string()),
        ];
        if let Some(ret) = &query.return_date {
            params.push(("returnDate", ret.clone()));
        }

        let response = self.get("/v2/shopping/flight-offers", &params).await?;
        Ok(shape_flight_offers(&response, query))
    }

    async fn search_hotels(&self, query: &HotelQuery) -> Result<Value> {
        let city = query.city_code.to_uppercase();
        let listing = self
            .get(
                "/v1/reference-data/locations/hotels/by-city",
                &[("cityCode", city)],
            )
            .await?;

        let hotel_ids: Vec<&str> = data(&listing)
            .iter()
            .filter_map(|h| h.get("hotelId").and_then(Value::as_str))
            .take(MAX_HOTEL_IDS)
            .collect();
        if hotel_ids.is_empty() {
            return Ok(json!({
                "success": true,
                "count": 0,
                "hotels": [],
                "message": format!("No hotels found in {}", query.city_code),
            }));
        }

        let offers = self
            .get(
                "/v3/shopping/hotel-offers",
                &[
                    ("hotelIds", hotel_ids.join(",")),
                    ("checkInDate", query.check_in_date.clone()),
                    ("checkOutDate", query.check_out_date.clone()),
                    ("adults", query.adults.to_string()),
                    ("roomQuantity", query.rooms.to_string()),
                ],
            )
            .await?;
        Ok(shape_hotel_offers(&offers, query))
    }

    async fn lookup_airport(&self, city_name: &str) -> Result<Value> {
        let response = self
            .get(
                "/v1/reference-data/locations",
                &[
                    ("keyword", city_name.to_string()),
                    ("subType", "AIRPORT,CITY".to_string()),
                ],
            )
            .await?;
        Ok(shape_locations(&response))
    }
}

fn data(response: &Value) -> &[Value] {
    response
        .get("data")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> &'a str {
    value.pointer(pointer).and_then(Value::as_str).unwrap_or("")
}

fn shape_flight_offers(response: &Value, query: &FlightQuery) -> Value {
    let mut flights = Vec::new();

    for offer in data(response) {
        let mut carriers: Vec<String> = Vec::new();
        let mut itineraries = Vec::new();

        for itinerary in offer["itineraries"].as_array().map(Vec::as_slice).unwrap_or(&[]) {
            let mut segments = Vec::new();
            for segment in itinerary["segments"].as_array().map(Vec::as_slice).unwrap_or(&[]) {
                let carrier = str_at(segment, "/carrierCode").to_string();
                let info = airline_info(&carrier);
                if !carriers.contains(&carrier) {
                    carriers.push(carrier.clone());
                }
                segments.push(json!({
                    "departure": {
                        "airport": str_at(segment, "/departure/iataCode"),
                        "time": str_at(segment, "/departure/at"),
                    },
                    "arrival": {
                        "airport": str_at(segment, "/arrival/iataCode"),
                        "time": str_at(segment, "/arrival/at"),
                    },
                    "carrier": carrier,
                    "carrier_name": info.name,
                    "carrier_url": info.url,
                    "flight_number": str_at(segment, "/number"),
                    "duration": str_at(segment, "/duration"),
                }));
            }
            itineraries.push(json!({
                "duration": str_at(itinerary, "/duration"),
                "segments": segments,
            }));
        }

        let airlines: Vec<Value> = carriers
            .iter()
            .map(|c| {
                let info = airline_info(c);
                json!({"name": info.name, "url": info.url})
            })
            .collect();

        flights.push(json!({
            "id": offer["id"].clone(),
            "price": {
                "total": offer["price"]["total"].clone(),
                "currency": offer["price"]["currency"].clone(),
            },
            "itineraries": itineraries,
            "seats_available": offer.get("numberOfBookableSeats").cloned().unwrap_or(json!("N/A")),
            "booking_links": {"airlines": airlines},
        }));
    }

    json!({
        "success": true,
        "count": flights.len(),
        "flights": flights,
        "search_links": flight_search_links(
            &query.origin,
            &query.destination,
            &query.departure_date,
            query.return_date.as_deref(),
        ),
        "citation": FLIGHT_CITATION,
    })
}

fn shape_hotel_offers(response: &Value, query: &HotelQuery) -> Value {
    let hotels: Vec<Value> = data(response)
        .iter()
        .take(query.max_results)
        .filter_map(|entry| {
            let hotel = &entry["hotel"];
            let best = entry["offers"].as_array()?.first()?;
            let name = hotel["name"].as_str().unwrap_or("Unknown");
            let has_cancellation = best
                .pointer("/policies/cancellations")
                .is_some_and(|c| !c.is_null() && c.as_array().map_or(true, |a| !a.is_empty()));

            Some(json!({
                "hotel_id": hotel["hotelId"].clone(),
                "name": name,
                "rating": hotel.get("rating").cloned().unwrap_or(json!("N/A")),
                "address": hotel.get("address").cloned().unwrap_or(json!({})),
                "price": {
                    "total": best.pointer("/price/total").cloned().unwrap_or(json!("N/A")),
                    "currency": best.pointer("/price/currency").cloned().unwrap_or(json!("USD")),
                },
                "room_type": best
                    .pointer("/room/typeEstimated/category")
                    .cloned()
                    .unwrap_or(json!("Standard")),
                "board_type": best.get("boardType").cloned().unwrap_or(json!("ROOM_ONLY")),
                "cancellation": if has_cancellation { "Free cancellation" } else { "Non-refundable" },
                "booking_link": hotel_booking_link(name),
            }))
        })
        .collect();

    json!({
        "success": true,
        "count": hotels.len(),
        "hotels": hotels,
        "search_links": hotel_search_links(
            &query.city_code,
            &query.check_in_date,
            &query.check_out_date,
            query.adults,
        ),
        "citation": HOTEL_CITATION,
    })
}

fn shape_locations(response: &Value) -> Value {
    let locations: Vec<Value> = data(response)
        .iter()
        .take(MAX_LOCATIONS)
        .map(|loc| {
            json!({
                "name": loc["name"].clone(),
                "iata_code": loc["iataCode"].clone(),
                "type": loc["subType"].clone(),
                "city": str_at(loc, "/address/cityName"),
                "country": str_at(loc, "/address/countryName"),
            })
        })
        .collect();

    json!({ "success": true, "locations": locations })
}
