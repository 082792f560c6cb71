pub mod db;
pub mod delivery;
pub mod error;
pub mod models;
pub mod options;
pub mod registrar;
pub mod routes;
pub mod services;
pub mod state;
