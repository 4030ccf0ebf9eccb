// Secrets Engine — Library root
//
// An embedded secret store: name/value pairs encrypted under a machine-bound
// master key, with a blind HMAC index for lookup and a tamper-evident seal
// over the SQLite database file. No passphrase, no service, no CLI.

pub mod crypto;
pub mod error;
pub mod fsguard;
pub mod identity;
pub mod paths;
pub mod pattern;
pub mod seal;
pub mod store;
pub mod vault;

pub use error::{Error, Result};
pub use vault::{Location, OpenOptions, Vault};
