//! Capabilities the model may invoke.
//!
//! Every tool has a name, a JSON-schema for its arguments, and returns a JSON
//! value. Failures are reported as `{"error": ..., "success": false}` so the
//! model can narrate them instead of the turn aborting.

use crate::memory::SharedState;
use crate::search::{FlightQuery, HotelQuery, TravelSearch};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// Results requested per flight or hotel search
const SEARCH_MAX_RESULTS: usize = 5;

/// JSON schema advertised to the model for one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters_schema(&self) -> Value;

    async fn execute(&self, args: Value) -> Value;

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Structured failure returned to the model
pub fn error_output(message: impl Into<String>) -> Value {
    json!({ "error": message.into(), "success": false })
}

fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T, Value> {
    serde_json::from_value(args)
        .map_err(|e| error_output(format!("Invalid arguments for {}: {}", tool, e)))
}

/// Tools registered for a turn, in registration order
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool, replacing any tool with the same name
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|t| t.schema()).collect()
    }

    /// Run a tool by name with JSON-encoded arguments.
    pub async fn dispatch(&self, name: &str, arguments: &str) -> Value {
        let Some(tool) = self.get(name) else {
            return error_output(format!("Unknown tool: {}", name));
        };
        let args = if arguments.trim().is_empty() {
            json!({})
        } else {
            match serde_json::from_str::<Value>(arguments) {
                Ok(v) => v,
                Err(e) => return error_output(format!("Arguments for {} are not JSON: {}", name, e)),
            }
        };
        tool.execute(args).await
    }
}

// ── save_memory_note ────────────────────────────────────────────────

const SAVE_NOTE_DESCRIPTION: &str = r#"Save a candidate memory note into session memory.

Capture HIGH-SIGNAL, reusable information that will help make better travel decisions in this session and in future sessions. Notes are staged and may be consolidated into long-term memory later.

Save a note ONLY if it is:
- Durable: likely to remain true across trips (or explicitly marked as "this trip only")
- Actionable: changes recommendations or constraints for flights/hotels/cars/insurance
- Explicit: stated or clearly confirmed by the user (not inferred)

Do NOT save speculation, instructions for the assistant, or anything sensitive.

text: 1-2 sentences, normalized into a durable statement (avoid "User said...").
keywords: 1-3 short, one-word, lowercase tags.

Never store sensitive PII: passport numbers, payment details, SSNs, full DOB, addresses."#;

#[derive(Debug, Deserialize)]
struct SaveNoteArgs {
    text: String,
    #[serde(default)]
    keywords: Vec<Value>,
}

/// Stages a note in session memory
pub struct SaveMemoryNoteTool {
    state: SharedState,
}

impl SaveMemoryNoteTool {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Tool for SaveMemoryNoteTool {
    fn name(&self) -> &str {
        "save_memory_note"
    }

    fn description(&self) -> &str {
        SAVE_NOTE_DESCRIPTION
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": {"type": "string", "description": "The note, 1-2 sentences"},
                "keywords": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "1-3 lowercase one-word tags"
                }
            },
            "required": ["text", "keywords"]
        })
    }

    async fn execute(&self, args: Value) -> Value {
        let args: SaveNoteArgs = match parse_args(self.name(), args) {
            Ok(a) => a,
            Err(e) => return e,
        };
        // non-string keywords are dropped silently
        let keywords = args.keywords.iter().filter_map(Value::as_str);

        let mut state = self.state.write().await;
        let ok = state.save_note(&args.text, keywords).is_some();
        debug!("save_memory_note: ok={}, session notes={}", ok, state.session_memory.len());
        json!({ "ok": ok })
    }
}

// ── search_flight_offers ────────────────────────────────────────────

fn default_adults() -> u32 {
    1
}

fn default_rooms() -> u32 {
    1
}

fn default_cabin() -> String {
    "ECONOMY".to_string()
}

#[derive(Debug, Deserialize)]
struct FlightArgs {
    origin: String,
    destination: String,
    departure_date: String,
    #[serde(default)]
    return_date: Option<String>,
    #[serde(default = "default_adults")]
    adults: u32,
    #[serde(default = "default_cabin")]
    cabin_class: String,
}

pub struct SearchFlightOffersTool {
    search: Arc<dyn TravelSearch>,
}

impl SearchFlightOffersTool {
    pub fn new(search: Arc<dyn TravelSearch>) -> Self {
        Self { search }
    }
}

#[async_trait]
impl Tool for SearchFlightOffersTool {
    fn name(&self) -> &str {
        "search_flight_offers"
    }

    fn description(&self) -> &str {
        "Search for real-time flight offers. Always use this tool for prices; never make up flight prices. \
         When presenting options include the flight number (carrier code + flight_number), the airline name \
         and carrier_url, departure/arrival times and airports, then the search_links as markdown links and \
         the citation at the end."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "origin": {"type": "string", "description": "Origin airport IATA code, e.g. SFO"},
                "destination": {"type": "string", "description": "Destination airport IATA code, e.g. JFK"},
                "departure_date": {"type": "string", "description": "YYYY-MM-DD"},
                "return_date": {"type": "string", "description": "YYYY-MM-DD for round trips, empty for one-way"},
                "adults": {"type": "integer", "minimum": 1, "default": 1},
                "cabin_class": {
                    "type": "string",
                    "enum": ["ECONOMY", "PREMIUM_ECONOMY", "BUSINESS", "FIRST"],
                    "default": "ECONOMY"
                }
            },
            "required": ["origin", "destination", "departure_date"]
        })
    }

    async fn execute(&self, args: Value) -> Value {
        let args: FlightArgs = match parse_args(self.name(), args) {
            Ok(a) => a,
            Err(e) => return e,
        };
        let query = FlightQuery {
            origin: args.origin,
            destination: args.destination,
            departure_date: args.departure_date,
            return_date: args.return_date.filter(|d| !d.trim().is_empty()),
            adults: args.adults.max(1),
            cabin_class: args.cabin_class,
            max_results: SEARCH_MAX_RESULTS,
        };
        match self.search.search_flights(&query).await {
            Ok(v) => v,
            Err(e) => error_output(e.to_string()),
        }
    }
}

// ── search_hotel_offers ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct HotelArgs {
    city_code: String,
    check_in_date: String,
    check_out_date: String,
    #[serde(default = "default_adults")]
    adults: u32,
    #[serde(default = "default_rooms")]
    rooms: u32,
}

pub struct SearchHotelOffersTool {
    search: Arc<dyn TravelSearch>,
}

impl SearchHotelOffersTool {
    pub fn new(search: Arc<dyn TravelSearch>) -> Self {
        Self { search }
    }
}

#[async_trait]
impl Tool for SearchHotelOffersTool {
    fn name(&self) -> &str {
        "search_hotel_offers"
    }

    fn description(&self) -> &str {
        "Search for real-time hotel offers in a city. Always use this tool for prices; never make up hotel \
         prices. When presenting options include the hotel name and booking_link, then the search_links as \
         markdown links and the citation at the end."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "city_code": {"type": "string", "description": "City IATA code, e.g. PAR, NYC, LON"},
                "check_in_date": {"type": "string", "description": "YYYY-MM-DD"},
                "check_out_date": {"type": "string", "description": "YYYY-MM-DD"},
                "adults": {"type": "integer", "minimum": 1, "default": 1},
                "rooms": {"type": "integer", "minimum": 1, "default": 1}
            },
            "required": ["city_code", "check_in_date", "check_out_date"]
        })
    }

    async fn execute(&self, args: Value) -> Value {
        let args: HotelArgs = match parse_args(self.name(), args) {
            Ok(a) => a,
            Err(e) => return e,
        };
        let query = HotelQuery {
            city_code: args.city_code,
            check_in_date: args.check_in_date,
            check_out_date: args.check_out_date,
            adults: args.adults.max(1),
            rooms: args.rooms.max(1),
            max_results: SEARCH_MAX_RESULTS,
        };
        match self.search.search_hotels(&query).await {
            Ok(v) => v,
            Err(e) => error_output(e.to_string()),
        }
    }
}

// ── lookup_airport_code ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct AirportArgs {
    city_name: String,
}

pub struct LookupAirportCodeTool {
    search: Arc<dyn TravelSearch>,
}

impl LookupAirportCodeTool {
    pub fn new(search: Arc<dyn TravelSearch>) -> Self {
        Self { search }
    }
}

#[async_trait]
impl Tool for LookupAirportCodeTool {
    fn name(&self) -> &str {
        "lookup_airport_code"
    }

    fn description(&self) -> &str {
        "Look up IATA airport and city codes for a city name. Use it when the user names a city but a \
         flight or hotel search needs a code."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "city_name": {"type": "string", "description": "City name, e.g. San Francisco"}
            },
            "required": ["city_name"]
        })
    }

    async fn execute(&self, args: Value) -> Value {
        let args: AirportArgs = match parse_args(self.name(), args) {
            Ok(a) => a,
            Err(e) => return e,
        };
        match self.search.lookup_airport(&args.city_name).await {
            Ok(v) => v,
            Err(e) => error_output(e.to_string()),
        }
    }
}
