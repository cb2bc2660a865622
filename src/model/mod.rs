//! Core data model types for email records and addresses.

pub mod address;
pub mod record;
