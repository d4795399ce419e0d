//! Core library for keepmenu: the KeePass session, the autotype engine and
//! the password generator shared by the menu frontend.

pub mod autotype;
pub mod database;
pub mod error;
pub mod models;
pub mod password;
pub mod sample;

pub use database::{DatabaseSession, DatabaseSource};
pub use error::OpenError;
pub use models::{CustomField, Entry, Group};
