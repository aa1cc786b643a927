#![allow(dead_code, unused_imports)]

pub mod entities;
pub mod source;

pub use entities::{Order, User};
pub use repositories::{AccountRepository, OrderRepository, PgOrderRepository, PgUserRepository};
pub use source::{Event, MockError, MockSource, MockTransaction};

/// Route `tracing` output through the test harness; safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}
