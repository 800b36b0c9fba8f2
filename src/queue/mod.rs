mod admin;
mod lease;
mod sweeper;

pub use admin::*;
pub use lease::*;
pub use sweeper::*;
