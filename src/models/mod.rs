// src/models/mod.rs

pub mod assignment;
pub mod certificate;
pub mod course;
pub mod enrollment;
pub mod otp;
pub mod submission;
pub mod user;
