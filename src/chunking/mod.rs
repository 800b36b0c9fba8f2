mod merge;
mod splitter;
mod tokens;

pub use merge::*;
pub use splitter::*;
pub use tokens::*;
