//! Command handlers

pub mod bulk;
pub mod config;
pub mod document;
