pub mod batch;
pub mod config;
pub mod dedup;
pub mod domain;
pub mod error;
pub mod filename;
pub mod gallery;
pub mod ledger;
pub mod output;
pub mod pipeline;
pub mod scheduler;
pub mod source;
pub mod store;
