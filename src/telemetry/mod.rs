pub mod alerts;
pub mod latency;
