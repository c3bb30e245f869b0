use rusqlite::Connection;

use crate::db::queries;
use crate::models::{BreakdownItem, Quote, SearchCriteria, SearchFilters, SearchResult, Vehicle};
use crate::services::availability;
use crate::services::pricing::{self, IntervalError};

pub const DEFAULT_IMAGE: &str = "/images/no-car.png";

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error(transparent)]
    Interval(#[from] IntervalError),

    #[error("seats must be a positive number")]
    InvalidSeats,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

fn required<'a>(
    value: &'a Option<String>,
    name: &'static str,
    missing: &mut Vec<&'static str>,
) -> &'a str {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => v,
        _ => {
            missing.push(name);
            ""
        }
    }
}

/// Prices every vehicle that is free for the requested period, in vehicle id order.
pub fn search(conn: &Connection, criteria: &SearchCriteria) -> Result<Vec<SearchResult>, SearchError> {
    let mut missing = vec![];
    let pickup_date = required(&criteria.pickup_date, "pickupDate", &mut missing);
    let dropoff_date = required(&criteria.dropoff_date, "dropoffDate", &mut missing);
    let pickup_time = required(&criteria.pickup_time, "pickupTime", &mut missing);
    let dropoff_time = required(&criteria.dropoff_time, "dropoffTime", &mut missing);
    required(&criteria.pickup_location, "pickupLocation", &mut missing);
    required(&criteria.dropoff_location, "dropoffLocation", &mut missing);
    if !missing.is_empty() {
        return Err(SearchError::MissingFields(missing));
    }

    if matches!(criteria.seats, Some(seats) if seats <= 0) {
        return Err(SearchError::InvalidSeats);
    }

    let (pickup, dropoff) =
        pricing::rental_interval(pickup_date, pickup_time, dropoff_date, dropoff_time)?;

    let filters = SearchFilters {
        seats: criteria.seats,
        category_id: criteria.category_id,
    };
    let vehicles = availability::find_available(conn, &pickup, &dropoff, &filters)?;

    tracing::debug!(
        candidates = vehicles.len(),
        %pickup,
        %dropoff,
        "search candidates loaded"
    );

    let mut results = Vec::with_capacity(vehicles.len());
    for vehicle in vehicles {
        let table = queries::get_pricing_table(conn, &vehicle)?;
        let quote = pricing::price_range(&table, &pickup, &dropoff)?;
        results.push(to_result(vehicle, quote));
    }
    Ok(results)
}

fn to_result(vehicle: Vehicle, quote: Quote) -> SearchResult {
    let image = vehicle
        .image_url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .unwrap_or(DEFAULT_IMAGE)
        .to_string();

    let breakdown = quote
        .breakdown
        .iter()
        .map(|day| BreakdownItem {
            date: day.date.format("%Y-%m-%d").to_string(),
            price: pricing::cents_to_amount(day.price_cents),
            source: day.source.as_str(),
        })
        .collect();

    SearchResult {
        id: vehicle.id,
        make: vehicle.make,
        model: vehicle.model,
        category: vehicle.category,
        seats: vehicle.seats,
        fuel_type: vehicle.fuel_type,
        transmission: vehicle.transmission,
        image,
        price_per_day: pricing::price_per_day(quote.total_cents, quote.days),
        total_price: pricing::cents_to_amount(quote.total_cents),
        days: quote.days,
        discount: 0.0,
        breakdown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{CalendarPrice, VehicleStatus};
    use chrono::NaiveDate;

    fn setup() -> Connection {
        let conn = db::init_db(":memory:").unwrap();
        for id in [2, 1] {
            queries::insert_vehicle(
                &conn,
                &Vehicle {
                    id,
                    make: "Seat".to_string(),
                    model: format!("Ibiza {id}"),
                    seats: 5,
                    fuel_type: "diesel".to_string(),
                    transmission: "manual".to_string(),
                    category_id: None,
                    category: None,
                    image_url: if id == 1 { Some("  ".to_string()) } else { Some("/img/2.jpg".to_string()) },
                    daily_price_cents: 5000,
                    available: true,
                    status: VehicleStatus::Available,
                },
            )
            .unwrap();
        }
        conn
    }

    fn criteria(dropoff_time: &str) -> SearchCriteria {
        SearchCriteria {
            pickup_date: Some("2025-06-01".to_string()),
            dropoff_date: Some("2025-06-03".to_string()),
            pickup_time: Some("10:00".to_string()),
            dropoff_time: Some(dropoff_time.to_string()),
            pickup_location: Some("Airport".to_string()),
            dropoff_location: Some("Airport".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_results_are_ordered_and_priced() {
        let conn = setup();
        let results = search(&conn, &criteria("10:00")).unwrap();
        assert_eq!(results.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(results[0].days, 2);
        assert_eq!(results[0].total_price, 100.0);
        assert_eq!(results[0].price_per_day, 50.0);
        assert_eq!(results[0].image, DEFAULT_IMAGE);
        assert_eq!(results[1].image, "/img/2.jpg");
    }

    #[test]
    fn test_calendar_override_in_breakdown() {
        let conn = setup();
        queries::upsert_calendar_price(
            &conn,
            &CalendarPrice {
                vehicle_id: 1,
                date: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
                price_cents: 8000,
            },
        )
        .unwrap();

        let results = search(&conn, &criteria("10:00")).unwrap();
        let car = &results[0];
        assert_eq!(car.total_price, 130.0);
        assert_eq!(car.price_per_day, 65.0);
        assert_eq!(car.breakdown[0].source, "base");
        assert_eq!(car.breakdown[1].source, "calendar");
        assert_eq!(car.breakdown[1].date, "2025-06-02");
    }

    #[test]
    fn test_missing_fields_are_listed() {
        let conn = setup();
        let mut c = criteria("10:00");
        c.pickup_location = None;
        c.dropoff_time = Some(" ".to_string());
        let err = search(&conn, &c).unwrap_err();
        match err {
            SearchError::MissingFields(fields) => {
                assert_eq!(fields, vec!["dropoffTime", "pickupLocation"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_inverted_interval_is_rejected() {
        let conn = setup();
        let mut c = criteria("10:00");
        c.dropoff_date = Some("2025-06-01".to_string());
        assert!(matches!(
            search(&conn, &c),
            Err(SearchError::Interval(IntervalError::DropoffNotAfterPickup))
        ));
    }
}
