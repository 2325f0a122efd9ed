pub mod analytics;
pub mod focus;
pub mod scheduling;
