pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod models;
pub mod output;
pub mod pages;
pub mod resources;
pub mod routes;
pub mod shell;
pub mod statechip;
