// src/lib.rs

pub mod analysis;
pub mod api;
pub mod app_state;
pub mod config;
pub mod decompose;
pub mod error;
pub mod service;
pub mod storage;
