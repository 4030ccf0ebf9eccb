// Secrets Engine — Store module
//
// The embedded relational half of the engine: a WAL-mode SQLite file holding
// one row per secret, addressed by the blind name hash.

mod db;
mod repository;

pub use db::{Database, DB_FILE_NAME};
pub use repository::{SecretRepository, SecretRow};
