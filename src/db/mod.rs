//! Database-agnostic persistence layer (spec §4.3-§4.4, C3/C4).
//!
//! [`executor`] is the dialect-hiding facade every repository is built on;
//! [`repo`] holds one typed repository per entity in the data model (spec
//! §3).

pub mod executor;
pub mod repo;

pub use executor::{Executor, PgExecutor, QueryParam, Row};
