//! Command implementations for langbridge

pub mod doctor;
pub mod serve;
