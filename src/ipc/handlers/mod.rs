pub mod convert;
pub mod core;
