mod match_observer;
mod queue_book;
mod queue_command;
mod queue_manager;

pub use match_observer::*;
pub use queue_book::*;
pub use queue_command::*;
pub use queue_manager::*;
