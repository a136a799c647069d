//! # Coordinators
//!
//! Multi-table units of work. Each public call opens one database
//! transaction, runs its steps through the connection-level repository
//! functions, and either commits everything or rolls everything back.
//!
//! - [`CheckoutCoordinator`] - cart to committed sale
//! - [`ReturnsCoordinator`] - invoice to committed return

pub mod checkout;
pub mod returns;

pub use checkout::CheckoutCoordinator;
pub use returns::ReturnsCoordinator;
