pub mod auth;
pub mod booking;
pub mod clock;
pub mod config;
pub mod db;
pub mod effects;
pub mod error;
pub mod models;
pub mod push;
pub mod routes;
pub mod schedule;
pub mod slots;
pub mod state;

#[cfg(test)]
mod testing;
