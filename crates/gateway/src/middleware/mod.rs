//! Request middleware

pub mod metrics;
pub mod rate_limit;
