// src/services/mod.rs

pub mod completion;
pub mod notify;
pub mod payments;
