pub mod jwt;
pub mod models;
pub mod token_service;
