// API services
// Thin wrappers over the task tracker endpoints

pub mod activity;
pub mod auth;
pub mod tasks;
