//! Use-case services over repository contracts.

pub mod user_service;
