pub mod db;
pub mod models;
mod tables;

pub use db::{Database, DatabaseError};
pub(crate) use db::{read_account, read_request, write_account, write_request};
pub use tables::*;
