pub mod insurance;
pub mod payment;
pub mod pricing;
pub mod reservation;
pub mod search;
pub mod user;
pub mod vehicle;

pub use insurance::InsurancePlan;
pub use payment::{Payment, PaymentStatus};
pub use pricing::{CalendarPrice, DayPrice, PriceSource, PricingTable, Quote, SpecialPrice};
pub use reservation::{Reservation, ReservationStatus};
pub use search::{BreakdownItem, SearchCriteria, SearchFilters, SearchResult};
pub use user::User;
pub use vehicle::{Vehicle, VehicleStatus};
