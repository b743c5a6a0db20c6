pub mod auth_service;
pub mod refresh_strategy;
pub mod session_service;
pub mod token_service;
