pub mod config;
pub mod differentiation;
