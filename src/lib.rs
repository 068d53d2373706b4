pub mod config;
pub mod dashboard;
pub mod error;
pub mod model;
pub mod query;
pub mod shutdown;
pub mod table;
pub mod tree;
