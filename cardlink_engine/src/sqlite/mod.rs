//! SQLite database module for the Cardlink engine.

mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
