pub mod analyzer;
pub mod backtest;
pub mod batch;
pub mod transitions;
