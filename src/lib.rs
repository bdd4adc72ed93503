//! ispdesk: back-office core for an internet service provider.
//!
//! Staff sign in through a hosted identity provider, their role comes from a document store,
//! and customer and staff records live behind a REST backend. The crate holds the session
//! resolution, route guarding, the customer and staff screens' flows and their validation; the
//! `cli` module drives them from a terminal.

pub mod backend;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod flows;
pub mod identity;
pub mod model;
pub mod notify;
pub mod validate;

// Test-only printing helper: expands to eprintln! in debug builds and is absent otherwise.
#[cfg(any(test, debug_assertions))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ( eprintln!($($arg)*) );
}

#[cfg(not(any(test, debug_assertions)))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ({
        if false { let _ = format!($($arg)*); }
    });
}
