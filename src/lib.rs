//! `mailsift`: query, filter and summarize personal email from the terminal.
//!
//! This crate provides the core library: a query parser that turns loose
//! command-line tokens into a structured [`search::query::Query`], a filter
//! engine with fuzzy matching and named time ranges, an aggregator producing
//! grouped statistics, and text/JSON renderers.

pub mod config;
pub mod error;
pub mod fuzzy;
pub mod model;
pub mod prefs;
pub mod render;
pub mod search;
pub mod source;
pub mod stats;
pub mod time_range;
pub mod unsubscribe;
