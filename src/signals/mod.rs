pub mod probability;
pub mod tightness;
pub mod volatility;
pub mod volume;
