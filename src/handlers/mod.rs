// src/handlers/mod.rs

pub mod assignments;
pub mod auth;
pub mod certificates;
pub mod courses;
pub mod dashboard;
pub mod email;
pub mod enrollments;
pub mod payments;
pub mod users;
