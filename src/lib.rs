pub mod descriptor;
pub mod engine;
pub mod error;
pub mod humanize;
pub mod notification;
pub mod observability;
pub mod params;
pub mod queue;
pub mod result;
pub mod worker;
