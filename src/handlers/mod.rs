// src/handlers/mod.rs

pub mod auth;
pub mod parent;
pub mod quiz;
