pub mod auth;
pub mod error;
pub mod groups;
pub mod messages;
pub mod middleware;
pub mod routes;
pub mod uploads;
pub mod views;
