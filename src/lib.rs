//! Pairs people up for a recurring rotation so that the people grouped
//! together have met as rarely as possible.
//!
//! The engine ([`matching::generate_matching`] and
//! [`ledger::update_history`]) is pure and synchronous. The [`db`] and
//! [`web`] modules wrap it in a small SQLite-backed HTTP service.

pub mod blossom;
pub mod config;
pub mod db;
pub mod error;
pub mod import;
pub mod ledger;
pub mod matching;
pub mod model;
pub mod web;

pub use error::{Error, Result};
pub use ledger::{update_history, Ledger};
pub use matching::generate_matching;
pub use model::{GroupResult, Person, PersonId};
