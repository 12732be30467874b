//! Booking and comparison links attached to search results.

use reqwest::Url;
use serde_json::{json, Value};

pub const FLIGHT_CITATION: &str =
    "⚠️ Prices and times are ESTIMATES from Amadeus test data - verify on booking sites for actual rates.";
pub const HOTEL_CITATION: &str =
    "⚠️ Prices are ESTIMATES from Amadeus test data - verify on booking sites for actual rates.";

const AIRLINES: &[(&str, &str, &str)] = &[
    ("UA", "United Airlines", "https://www.united.com"),
    ("AA", "American Airlines", "https://www.aa.com"),
    ("DL", "Delta Air Lines", "https://www.delta.com"),
    ("WN", "Southwest Airlines", "https://www.southwest.com"),
    ("B6", "JetBlue", "https://www.jetblue.com"),
    ("AS", "Alaska Airlines", "https://www.alaskaair.com"),
    ("NK", "Spirit Airlines", "https://www.spirit.com"),
    ("F9", "Frontier Airlines", "https://www.flyfrontier.com"),
    ("BA", "British Airways", "https://www.britishairways.com"),
    ("LH", "Lufthansa", "https://www.lufthansa.com"),
    ("AF", "Air France", "https://www.airfrance.com"),
    ("KL", "KLM", "https://www.klm.com"),
    ("EK", "Emirates", "https://www.emirates.com"),
    ("QR", "Qatar Airways", "https://www.qatarairways.com"),
    ("SQ", "Singapore Airlines", "https://www.singaporeair.com"),
    ("CX", "Cathay Pacific", "https://www.cathaypacific.com"),
    ("NH", "ANA", "https://www.ana.co.jp"),
    ("JL", "Japan Airlines", "https://www.jal.co.jp"),
    ("AC", "Air Canada", "https://www.aircanada.com"),
    ("QF", "Qantas", "https://www.qantas.com"),
];

const HOTEL_BRANDS: &[(&str, &str)] = &[
    ("marriott", "https://www.marriott.com"),
    ("hilton", "https://www.hilton.com"),
    ("hyatt", "https://www.hyatt.com"),
    ("ihg", "https://www.ihg.com"),
    ("wyndham", "https://www.wyndham.com"),
    ("bestwestern", "https://www.bestwestern.com"),
    ("accor", "https://www.accor.com"),
    ("radisson", "https://www.radissonhotels.com"),
    ("choice", "https://www.choicehotels.com"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AirlineInfo {
    pub name: String,
    pub url: String,
}

/// Name and website for a carrier code; unknown carriers get a web search.
pub fn airline_info(carrier_code: &str) -> AirlineInfo {
    let code = carrier_code.to_uppercase();
    match AIRLINES.iter().find(|(c, _, _)| *c == code) {
        Some((_, name, url)) => AirlineInfo {
            name: name.to_string(),
            url: url.to_string(),
        },
        None => AirlineInfo {
            name: carrier_code.to_string(),
            url: with_query(
                "https://www.google.com/search",
                &[("q", format!("{} airline booking", carrier_code))],
            ),
        },
    }
}

/// Brand site when the hotel name mentions a known chain, else a web search
pub fn hotel_booking_link(hotel_name: &str) -> String {
    let lower = hotel_name.to_lowercase();
    HOTEL_BRANDS
        .iter()
        .find(|(brand, _)| lower.contains(brand))
        .map(|(_, url)| url.to_string())
        .unwrap_or_else(|| {
            with_query(
                "https://www.google.com/search",
                &[("q", format!("{} book hotel", hotel_name))],
            )
        })
}

pub fn flight_search_links(
    origin: &str,
    destination: &str,
    departure_date: &str,
    return_date: Option<&str>,
) -> Value {
    let mut q = format!("flights from {} to {} on {}", origin, destination, departure_date);
    if let Some(ret) = return_date {
        q.push_str(&format!(" returning {}", ret));
    }
    let google = with_query(
        "https://www.google.com/travel/flights",
        &[("q", q), ("curr", "USD".to_string())],
    );

    let kayak = match return_date {
        Some(ret) => format!(
            "https://www.kayak.com/flights/{}-{}/{}/{}",
            origin, destination, departure_date, ret
        ),
        None => format!(
            "https://www.kayak.com/flights/{}-{}/{}",
            origin, destination, departure_date
        ),
    };

    let mut skyscanner = format!(
        "https://www.skyscanner.com/transport/flights/{}/{}/{}/",
        origin.to_lowercase(),
        destination.to_lowercase(),
        year_month(departure_date)
    );
    if let Some(ret) = return_date {
        skyscanner.push_str(&year_month(ret));
        skyscanner.push('/');
    }

    json!({
        "google_flights": google,
        "kayak": kayak,
        "skyscanner": skyscanner,
    })
}

pub fn hotel_search_links(city: &str, check_in: &str, check_out: &str, adults: u32) -> Value {
    json!({
        "google_hotels": with_query(
            "https://www.google.com/travel/hotels",
            &[
                ("q", format!("hotels in {}", city)),
                ("dates", format!("{}_{}", check_in, check_out)),
            ],
        ),
        "booking_com": with_query(
            "https://www.booking.com/searchresults.html",
            &[
                ("ss", city.to_string()),
                ("checkin", check_in.to_string()),
                ("checkout", check_out.to_string()),
                ("group_adults", adults.to_string()),
            ],
        ),
        "hotels_com": with_query(
            "https://www.hotels.com/search.do",
            &[
                ("q-destination", city.to_string()),
                ("q-check-in", check_in.to_string()),
                ("q-check-out", check_out.to_string()),
            ],
        ),
    })
}

/// `2026-03-14` -> `202603`
fn year_month(date: &str) -> String {
    date.replace('-', "").chars().take(6).collect()
}

fn with_query(base: &str, params: &[(&str, String)]) -> String {
    match Url::parse_with_params(base, params) {
        Ok(url) => url.to_string(),
        Err(_) => base.to_string(),
    }
}
