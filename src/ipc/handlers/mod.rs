pub mod assignments;
pub mod auth;
pub mod backup;
pub mod core;
pub mod courses;
pub mod dashboard;
pub mod setup;
