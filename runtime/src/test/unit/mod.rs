pub mod compiler;
pub mod derivator;
