pub mod backup;
pub mod config;
pub mod fetch;
pub mod index;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod store;
