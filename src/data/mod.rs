pub mod context;
pub mod market;
