//! SQLite bootstrap and shared queries

pub mod init;
pub mod migrations;
pub mod users;

pub use init::*;
pub use migrations::*;
pub use users::*;
