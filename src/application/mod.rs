//! Application layer - Use cases, services and DTOs
//!
//! This layer contains the application logic that orchestrates
//! domain policies and coordinates with infrastructure through ports.

pub mod dto;
pub mod factories;
pub mod scheduler;
pub mod services;
pub mod use_cases;
