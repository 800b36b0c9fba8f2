mod client;
mod continuation;
mod embedders;
mod providers;

pub use client::*;
pub use continuation::*;
pub use embedders::*;
pub use providers::*;
