pub mod dtype;
pub mod shape_spec;
