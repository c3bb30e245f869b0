use chrono::NaiveDateTime;
use rusqlite::Connection;

use crate::db::queries;
use crate::models::{SearchFilters, Vehicle, VehicleStatus};

#[derive(Debug, thiserror::Error)]
pub enum AvailabilityError {
    #[error("vehicle {0} not found")]
    UnknownVehicle(i64),

    #[error("vehicle {0} is not available for the requested period")]
    Unavailable(i64),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Vehicles that can be rented for `[pickup, dropoff)`.
pub fn find_available(
    conn: &Connection,
    pickup: &NaiveDateTime,
    dropoff: &NaiveDateTime,
    filters: &SearchFilters,
) -> anyhow::Result<Vec<Vehicle>> {
    queries::find_available_vehicles(conn, pickup, dropoff, filters)
}

/// Whether any active reservation other than the one held by `own_token`
/// overlaps `[pickup, dropoff)` on `vehicle_id`.
pub fn has_conflict(
    conn: &Connection,
    vehicle_id: i64,
    pickup: &NaiveDateTime,
    dropoff: &NaiveDateTime,
    own_token: Option<&str>,
) -> anyhow::Result<bool> {
    let overlapping =
        queries::count_overlapping_reservations(conn, vehicle_id, pickup, dropoff, own_token, None)?;
    Ok(overlapping > 0)
}

/// Re-validates a single vehicle right before taking payment for it. Pending
/// holds from an earlier checkout by `driver_email` do not count, so an
/// abandoned session never locks its own driver out.
pub fn ensure_bookable(
    conn: &Connection,
    vehicle_id: i64,
    pickup: &NaiveDateTime,
    dropoff: &NaiveDateTime,
    driver_email: &str,
) -> Result<Vehicle, AvailabilityError> {
    let vehicle = queries::get_vehicle(conn, vehicle_id)?
        .ok_or(AvailabilityError::UnknownVehicle(vehicle_id))?;

    if !vehicle.available || vehicle.status != VehicleStatus::Available {
        return Err(AvailabilityError::Unavailable(vehicle_id));
    }
    let overlapping = queries::count_overlapping_reservations(
        conn,
        vehicle_id,
        pickup,
        dropoff,
        None,
        Some(driver_email),
    )?;
    if overlapping > 0 {
        return Err(AvailabilityError::Unavailable(vehicle_id));
    }

    Ok(vehicle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{Reservation, ReservationStatus};

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn setup() -> Connection {
        let conn = db::init_db(":memory:").unwrap();
        queries::insert_vehicle(
            &conn,
            &Vehicle {
                id: 7,
                make: "Toyota".to_string(),
                model: "Yaris".to_string(),
                seats: 5,
                fuel_type: "hybrid".to_string(),
                transmission: "automatic".to_string(),
                category_id: None,
                category: None,
                image_url: None,
                daily_price_cents: 4500,
                available: true,
                status: VehicleStatus::Available,
            },
        )
        .unwrap();
        let user = queries::upsert_user(&conn, "held@example.com", None, None).unwrap();
        let now = chrono::Utc::now().naive_utc();
        queries::insert_reservation(
            &conn,
            &Reservation {
                id: "r-1".to_string(),
                user_id: user.id,
                vehicle_id: 7,
                insurance_plan_id: None,
                start_at: dt("2025-06-01 10:00"),
                end_at: dt("2025-06-03 10:00"),
                total_cost_cents: 9000,
                session_token: "sess_held".to_string(),
                status: ReservationStatus::Pending,
                created_at: now,
                updated_at: now,
            },
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_conflict_is_symmetric_and_half_open() {
        let conn = setup();
        // [c, d) = [06-01 10:00, 06-03 10:00)
        let cases = [
            ("2025-06-02 00:00", "2025-06-04 00:00", true),
            ("2025-05-31 00:00", "2025-06-05 00:00", true),
            ("2025-06-01 11:00", "2025-06-01 12:00", true),
            ("2025-06-03 10:00", "2025-06-05 10:00", false),
            ("2025-05-30 10:00", "2025-06-01 10:00", false),
        ];
        for (start, end, expected) in cases {
            assert_eq!(
                has_conflict(&conn, 7, &dt(start), &dt(end), None).unwrap(),
                expected,
                "query [{start}, {end})"
            );
        }
    }

    #[test]
    fn test_own_reservation_is_ignored() {
        let conn = setup();
        let (start, end) = (dt("2025-06-01 10:00"), dt("2025-06-03 10:00"));
        assert!(has_conflict(&conn, 7, &start, &end, None).unwrap());
        assert!(!has_conflict(&conn, 7, &start, &end, Some("sess_held")).unwrap());
    }

    #[test]
    fn test_ensure_bookable() {
        let conn = setup();
        let driver = "new@example.com";
        assert!(matches!(
            ensure_bookable(&conn, 99, &dt("2025-07-01 10:00"), &dt("2025-07-02 10:00"), driver),
            Err(AvailabilityError::UnknownVehicle(99))
        ));
        assert!(matches!(
            ensure_bookable(&conn, 7, &dt("2025-06-02 10:00"), &dt("2025-06-04 10:00"), driver),
            Err(AvailabilityError::Unavailable(7))
        ));
        let vehicle =
            ensure_bookable(&conn, 7, &dt("2025-06-03 10:00"), &dt("2025-06-04 10:00"), driver).unwrap();
        assert_eq!(vehicle.model, "Yaris");
    }

    #[test]
    fn test_driver_is_not_blocked_by_own_pending_hold() {
        let conn = setup();
        let (start, end) = (dt("2025-06-02 10:00"), dt("2025-06-04 10:00"));
        assert!(ensure_bookable(&conn, 7, &start, &end, "held@example.com").is_ok());

        queries::fail_reservation(&conn, "sess_held").unwrap();
        let user = queries::get_user_by_email(&conn, "held@example.com").unwrap().unwrap();
        let now = chrono::Utc::now().naive_utc();
        queries::insert_reservation(
            &conn,
            &Reservation {
                id: "r-2".to_string(),
                user_id: user.id,
                vehicle_id: 7,
                insurance_plan_id: None,
                start_at: dt("2025-06-01 10:00"),
                end_at: dt("2025-06-03 10:00"),
                total_cost_cents: 9000,
                session_token: "sess_paid".to_string(),
                status: ReservationStatus::Confirmed,
                created_at: now,
                updated_at: now,
            },
        )
        .unwrap();
        assert!(matches!(
            ensure_bookable(&conn, 7, &start, &end, "held@example.com"),
            Err(AvailabilityError::Unavailable(7))
        ));
    }
}
