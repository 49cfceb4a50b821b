#![forbid(unsafe_code)]

pub mod api;
pub mod app;
pub mod config;
