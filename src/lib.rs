pub mod backup_ledger;
pub mod client;
pub mod contexts;
pub mod credentials;
pub mod data;
pub mod integration;
pub mod registries;
pub mod settings;
