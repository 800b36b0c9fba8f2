mod events;
mod task;
mod task_status;
pub mod worker;

pub use events::*;
pub use task::*;
pub use task_status::*;
