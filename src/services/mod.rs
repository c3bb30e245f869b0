pub mod availability;
pub mod checkout;
pub mod email;
pub mod notifications;
pub mod payments;
pub mod pricing;
pub mod reconciler;
pub mod search;
