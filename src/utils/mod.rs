//! Utils module - logging setup and small helpers

pub mod logging;
pub mod string;
