// Library for tests to access modules

pub mod charts;
pub mod config;
pub mod models;
pub mod routes;
pub mod scheduler;
pub mod series;
pub mod snapshot_repo;
pub mod sources;
pub mod version;
