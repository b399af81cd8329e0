//! Detection module - critical value scanning and alerting

mod scanner;
mod alert;

pub use scanner::*;
pub use alert::*;
