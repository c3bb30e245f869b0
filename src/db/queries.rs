use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{
    CalendarPrice, InsurancePlan, Payment, PaymentStatus, PricingTable, Reservation,
    ReservationStatus, SearchFilters, SpecialPrice, User, Vehicle, VehicleStatus,
};

pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Overlap test against reservations that still hold their vehicle, for a
/// half-open interval bound as `:start` / `:end`. Every availability check
/// goes through this fragment.
const ACTIVE_OVERLAP: &str = "r.status IN ('pending', 'confirmed') AND r.start_at < :end AND r.end_at > :start";

fn fmt_datetime(dt: &NaiveDateTime) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

fn parse_datetime(s: &str) -> anyhow::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .with_context(|| format!("invalid stored timestamp: {s}"))
}

fn parse_date(s: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).with_context(|| format!("invalid stored date: {s}"))
}

fn now_string() -> String {
    fmt_datetime(&Utc::now().naive_utc())
}

// ── Vehicles ──

const VEHICLE_COLUMNS: &str = "v.id, v.make, v.model, v.seats, v.fuel_type, v.transmission, v.category_id, c.name, v.image_url, v.daily_price_cents, v.available, v.status";

fn parse_vehicle_row(row: &rusqlite::Row) -> rusqlite::Result<Vehicle> {
    let status: String = row.get(11)?;
    Ok(Vehicle {
        id: row.get(0)?,
        make: row.get(1)?,
        model: row.get(2)?,
        seats: row.get(3)?,
        fuel_type: row.get(4)?,
        transmission: row.get(5)?,
        category_id: row.get(6)?,
        category: row.get(7)?,
        image_url: row.get(8)?,
        daily_price_cents: row.get(9)?,
        available: row.get::<_, i32>(10)? != 0,
        status: VehicleStatus::parse(&status),
    })
}

/// Offerable vehicles with no active reservation overlapping `[start, end)`,
/// ordered by id.
pub fn find_available_vehicles(
    conn: &Connection,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
    filters: &SearchFilters,
) -> anyhow::Result<Vec<Vehicle>> {
    let sql = format!(
        "SELECT {VEHICLE_COLUMNS}
         FROM vehicles v LEFT JOIN vehicle_categories c ON c.id = v.category_id
         WHERE v.available = 1
           AND v.status = 'AVAILABLE'
           AND (:seats IS NULL OR v.seats >= :seats)
           AND (:category IS NULL OR v.category_id = :category)
           AND NOT EXISTS (
               SELECT 1 FROM reservations r WHERE r.vehicle_id = v.id AND {ACTIVE_OVERLAP}
           )
         ORDER BY v.id ASC"
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        rusqlite::named_params! {
            ":start": fmt_datetime(start),
            ":end": fmt_datetime(end),
            ":seats": filters.seats,
            ":category": filters.category_id,
        },
        parse_vehicle_row,
    )?;

    let mut vehicles = vec![];
    for row in rows {
        vehicles.push(row?);
    }
    Ok(vehicles)
}

pub fn get_vehicle(conn: &Connection, id: i64) -> anyhow::Result<Option<Vehicle>> {
    let sql = format!(
        "SELECT {VEHICLE_COLUMNS}
         FROM vehicles v LEFT JOIN vehicle_categories c ON c.id = v.category_id
         WHERE v.id = ?1"
    );
    Ok(conn.query_row(&sql, params![id], parse_vehicle_row).optional()?)
}

/// Counts active reservations on `vehicle_id` overlapping `[start, end)`,
/// optionally ignoring the reservation held by `exclude_token` and any
/// pending holds placed by `exclude_holder` (a user email).
pub fn count_overlapping_reservations(
    conn: &Connection,
    vehicle_id: i64,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
    exclude_token: Option<&str>,
    exclude_holder: Option<&str>,
) -> anyhow::Result<i64> {
    let sql = format!(
        "SELECT COUNT(*) FROM reservations r
         WHERE r.vehicle_id = :vehicle
           AND (:exclude IS NULL OR r.session_token != :exclude)
           AND NOT (r.status = 'pending'
                    AND r.user_id IN (SELECT u.id FROM users u WHERE u.email = :holder))
           AND {ACTIVE_OVERLAP}"
    );
    let count = conn.query_row(
        &sql,
        rusqlite::named_params! {
            ":vehicle": vehicle_id,
            ":exclude": exclude_token,
            ":holder": exclude_holder,
            ":start": fmt_datetime(start),
            ":end": fmt_datetime(end),
        },
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn insert_category(conn: &Connection, name: &str) -> anyhow::Result<i64> {
    conn.execute("INSERT INTO vehicle_categories (name) VALUES (?1)", params![name])?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_vehicle(conn: &Connection, vehicle: &Vehicle) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO vehicles (id, make, model, seats, fuel_type, transmission, category_id, image_url, daily_price_cents, available, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            vehicle.id,
            vehicle.make,
            vehicle.model,
            vehicle.seats,
            vehicle.fuel_type,
            vehicle.transmission,
            vehicle.category_id,
            vehicle.image_url,
            vehicle.daily_price_cents,
            vehicle.available as i32,
            vehicle.status.as_str(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

// ── Pricing overrides ──

pub fn get_pricing_table(conn: &Connection, vehicle: &Vehicle) -> anyhow::Result<PricingTable> {
    let mut stmt = conn.prepare(
        "SELECT date, price_cents FROM calendar_prices WHERE vehicle_id = ?1 ORDER BY date ASC",
    )?;
    let rows = stmt.query_map(params![vehicle.id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;
    let mut calendar = vec![];
    for row in rows {
        let (date, price_cents) = row?;
        calendar.push(CalendarPrice {
            vehicle_id: vehicle.id,
            date: parse_date(&date)?,
            price_cents,
        });
    }

    // Earliest-starting range wins when operators overlap special periods.
    let mut stmt = conn.prepare(
        "SELECT start_date, end_date, price_cents FROM special_prices
         WHERE vehicle_id = ?1 ORDER BY start_date ASC, id ASC",
    )?;
    let rows = stmt.query_map(params![vehicle.id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
        ))
    })?;
    let mut special = vec![];
    for row in rows {
        let (start, end, price_cents) = row?;
        special.push(SpecialPrice {
            vehicle_id: vehicle.id,
            start_date: parse_date(&start)?,
            end_date: parse_date(&end)?,
            price_cents,
        });
    }

    Ok(PricingTable {
        base_cents: vehicle.daily_price_cents,
        calendar,
        special,
    })
}

pub fn upsert_calendar_price(conn: &Connection, price: &CalendarPrice) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO calendar_prices (vehicle_id, date, price_cents) VALUES (?1, ?2, ?3)
         ON CONFLICT(vehicle_id, date) DO UPDATE SET price_cents = excluded.price_cents",
        params![
            price.vehicle_id,
            price.date.format(DATE_FORMAT).to_string(),
            price.price_cents,
        ],
    )?;
    Ok(())
}

pub fn insert_special_price(conn: &Connection, price: &SpecialPrice) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO special_prices (vehicle_id, start_date, end_date, price_cents) VALUES (?1, ?2, ?3, ?4)",
        params![
            price.vehicle_id,
            price.start_date.format(DATE_FORMAT).to_string(),
            price.end_date.format(DATE_FORMAT).to_string(),
            price.price_cents,
        ],
    )?;
    Ok(())
}

// ── Insurance ──

const INSURANCE_COLUMNS: &str = "id, title, slug, description, daily_price_cents, excess_amount_cents, currency, includes_wind_screen, includes_theft_cover, roadside_assistance, active";

fn parse_insurance_row(row: &rusqlite::Row) -> rusqlite::Result<InsurancePlan> {
    Ok(InsurancePlan {
        id: row.get(0)?,
        title: row.get(1)?,
        slug: row.get(2)?,
        description: row.get(3)?,
        daily_price_cents: row.get(4)?,
        excess_amount_cents: row.get(5)?,
        currency: row.get(6)?,
        includes_wind_screen: row.get::<_, i32>(7)? != 0,
        includes_theft_cover: row.get::<_, i32>(8)? != 0,
        roadside_assistance: row.get::<_, i32>(9)? != 0,
        active: row.get::<_, i32>(10)? != 0,
    })
}

pub fn list_active_insurance_plans(conn: &Connection) -> anyhow::Result<Vec<InsurancePlan>> {
    let sql = format!(
        "SELECT {INSURANCE_COLUMNS} FROM insurance_plans WHERE active = 1 ORDER BY daily_price_cents ASC, id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], parse_insurance_row)?;

    let mut plans = vec![];
    for row in rows {
        plans.push(row?);
    }
    Ok(plans)
}

pub fn get_insurance_plan(conn: &Connection, id: i64) -> anyhow::Result<Option<InsurancePlan>> {
    let sql = format!("SELECT {INSURANCE_COLUMNS} FROM insurance_plans WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], parse_insurance_row).optional()?)
}

pub fn insert_insurance_plan(conn: &Connection, plan: &InsurancePlan) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO insurance_plans (id, title, slug, description, daily_price_cents, excess_amount_cents, currency, includes_wind_screen, includes_theft_cover, roadside_assistance, active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            plan.id,
            plan.title,
            plan.slug,
            plan.description,
            plan.daily_price_cents,
            plan.excess_amount_cents,
            plan.currency,
            plan.includes_wind_screen as i32,
            plan.includes_theft_cover as i32,
            plan.roadside_assistance as i32,
            plan.active as i32,
        ],
    )?;
    Ok(())
}

// ── Users ──

/// Creates the user for `email`, or refreshes name/phone on a returning one.
/// Empty values never overwrite what is already stored.
pub fn upsert_user(
    conn: &Connection,
    email: &str,
    name: Option<&str>,
    phone: Option<&str>,
) -> anyhow::Result<User> {
    let name = name.map(str::trim).filter(|s| !s.is_empty());
    let phone = phone.map(str::trim).filter(|s| !s.is_empty());
    let id = uuid::Uuid::new_v4().to_string();

    conn.execute(
        "INSERT INTO users (id, email, name, phone) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(email) DO UPDATE SET
           name = COALESCE(excluded.name, users.name),
           phone = COALESCE(excluded.phone, users.phone),
           updated_at = datetime('now')",
        params![id, email, name, phone],
    )?;

    get_user_by_email(conn, email)?
        .ok_or_else(|| anyhow::anyhow!("user vanished after upsert: {email}"))
}

pub fn get_user_by_email(conn: &Connection, email: &str) -> anyhow::Result<Option<User>> {
    Ok(conn
        .query_row(
            "SELECT id, email, name, phone FROM users WHERE email = ?1",
            params![email],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    name: row.get(2)?,
                    phone: row.get(3)?,
                })
            },
        )
        .optional()?)
}

// ── Reservations ──

const RESERVATION_COLUMNS: &str = "id, user_id, vehicle_id, insurance_plan_id, start_at, end_at, total_cost_cents, session_token, status, created_at, updated_at";

fn parse_reservation_row(row: &rusqlite::Row) -> anyhow::Result<Reservation> {
    let start_at: String = row.get(4)?;
    let end_at: String = row.get(5)?;
    let status: String = row.get(8)?;
    let created_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;

    Ok(Reservation {
        id: row.get(0)?,
        user_id: row.get(1)?,
        vehicle_id: row.get(2)?,
        insurance_plan_id: row.get(3)?,
        start_at: parse_datetime(&start_at)?,
        end_at: parse_datetime(&end_at)?,
        total_cost_cents: row.get(6)?,
        session_token: row.get(7)?,
        status: ReservationStatus::parse(&status),
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

pub fn get_reservation_by_token(
    conn: &Connection,
    session_token: &str,
) -> anyhow::Result<Option<Reservation>> {
    let sql = format!("SELECT {RESERVATION_COLUMNS} FROM reservations WHERE session_token = ?1");
    let result = conn
        .query_row(&sql, params![session_token], |row| Ok(parse_reservation_row(row)))
        .optional()?;
    result.transpose()
}

/// Inserts `reservation` unless its session token is already taken. Returns
/// whether a row was written; the unique index on the token decides races.
pub fn insert_reservation(conn: &Connection, reservation: &Reservation) -> anyhow::Result<bool> {
    let count = conn.execute(
        "INSERT INTO reservations (id, user_id, vehicle_id, insurance_plan_id, start_at, end_at, total_cost_cents, session_token, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT(session_token) DO NOTHING",
        params![
            reservation.id,
            reservation.user_id,
            reservation.vehicle_id,
            reservation.insurance_plan_id,
            fmt_datetime(&reservation.start_at),
            fmt_datetime(&reservation.end_at),
            reservation.total_cost_cents,
            reservation.session_token,
            reservation.status.as_str(),
            fmt_datetime(&reservation.created_at),
            fmt_datetime(&reservation.updated_at),
        ],
    )?;
    Ok(count > 0)
}

/// Moves a pending (or failed) reservation to confirmed, refreshing the
/// booking details with what was actually paid for.
pub fn confirm_reservation(conn: &Connection, reservation: &Reservation) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE reservations SET
           status = 'confirmed',
           user_id = ?1,
           vehicle_id = ?2,
           insurance_plan_id = ?3,
           start_at = ?4,
           end_at = ?5,
           total_cost_cents = ?6,
           updated_at = ?7
         WHERE session_token = ?8 AND status IN ('pending', 'failed')",
        params![
            reservation.user_id,
            reservation.vehicle_id,
            reservation.insurance_plan_id,
            fmt_datetime(&reservation.start_at),
            fmt_datetime(&reservation.end_at),
            reservation.total_cost_cents,
            now_string(),
            reservation.session_token,
        ],
    )?;
    Ok(count > 0)
}

/// Marks the reservation for `session_token` failed unless it is already
/// confirmed or cancelled. Returns whether a row changed.
pub fn fail_reservation(conn: &Connection, session_token: &str) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE reservations SET status = 'failed', updated_at = ?1
         WHERE session_token = ?2 AND status = 'pending'",
        params![now_string(), session_token],
    )?;
    Ok(count > 0)
}

/// Fails the pending holds `holder_email` still has on `vehicle_id` for an
/// overlapping period, except the one for `keep_token`. Returns how many
/// rows changed.
pub fn release_pending_holds(
    conn: &Connection,
    holder_email: &str,
    vehicle_id: i64,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
    keep_token: &str,
) -> anyhow::Result<usize> {
    let sql = format!(
        "UPDATE reservations SET status = 'failed', updated_at = :now
         WHERE id IN (
             SELECT r.id FROM reservations r JOIN users u ON u.id = r.user_id
             WHERE u.email = :holder
               AND r.vehicle_id = :vehicle
               AND r.session_token != :keep
               AND r.status = 'pending'
               AND {ACTIVE_OVERLAP}
         )"
    );
    let count = conn.execute(
        &sql,
        rusqlite::named_params! {
            ":now": now_string(),
            ":holder": holder_email,
            ":vehicle": vehicle_id,
            ":keep": keep_token,
            ":start": fmt_datetime(start),
            ":end": fmt_datetime(end),
        },
    )?;
    Ok(count)
}

pub fn count_reservations_for_token(conn: &Connection, session_token: &str) -> anyhow::Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM reservations WHERE session_token = ?1",
        params![session_token],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ── Payments ──

/// Records the payment for a reservation; the unique index on
/// `reservation_id` keeps it one-to-one.
pub fn insert_payment(conn: &Connection, payment: &Payment) -> anyhow::Result<bool> {
    let count = conn.execute(
        "INSERT INTO payments (id, reservation_id, amount_cents, status, method, transaction_ref, paid_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(reservation_id) DO NOTHING",
        params![
            payment.id,
            payment.reservation_id,
            payment.amount_cents,
            payment.status.as_str(),
            payment.method,
            payment.transaction_ref,
            payment.paid_at.as_ref().map(fmt_datetime),
        ],
    )?;
    Ok(count > 0)
}

pub fn get_payment_for_reservation(
    conn: &Connection,
    reservation_id: &str,
) -> anyhow::Result<Option<Payment>> {
    let result = conn
        .query_row(
            "SELECT id, reservation_id, amount_cents, status, method, transaction_ref, paid_at
             FROM payments WHERE reservation_id = ?1",
            params![reservation_id],
            |row| {
                let status: String = row.get(3)?;
                let paid_at: Option<String> = row.get(6)?;
                Ok((
                    Payment {
                        id: row.get(0)?,
                        reservation_id: row.get(1)?,
                        amount_cents: row.get(2)?,
                        status: PaymentStatus::parse(&status),
                        method: row.get(4)?,
                        transaction_ref: row.get(5)?,
                        paid_at: None,
                    },
                    paid_at,
                ))
            },
        )
        .optional()?;

    match result {
        Some((mut payment, paid_at)) => {
            payment.paid_at = paid_at.as_deref().map(parse_datetime).transpose()?;
            Ok(Some(payment))
        }
        None => Ok(None),
    }
}

pub fn count_payments(conn: &Connection) -> anyhow::Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM payments", [], |row| row.get(0))?)
}
