//! User service: the reference wiring of pagewise
//!
//! `biz` holds the use cases and the repository contract, `data` the
//! PostgreSQL repository, `service` the HTTP handlers and `router` the
//! route table with its filters.

pub mod biz;
pub mod data;
pub mod model;
pub mod router;
pub mod service;

#[cfg(test)]
mod memory;

pub use router::router;
