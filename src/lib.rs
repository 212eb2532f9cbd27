pub mod app;
pub mod cache;
pub mod config;
pub mod error;
pub mod facade;
pub mod ledger;
pub mod lists;
pub mod mapper;
pub mod models;
pub mod store;
pub mod tmdb;
