pub mod build;
pub mod forward;
pub mod rules;
