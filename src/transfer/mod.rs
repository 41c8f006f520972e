//! Transfer core: the pause signal, ranged stream, progress meter, worker,
//! executor, and task manager that together drive a transfer task from
//! creation to completion.

pub mod events;
pub mod executor;
pub mod manager;
pub mod pause;
pub mod progress;
pub mod stream;
pub mod task;
pub mod worker;

pub use events::TransferEvent;
pub use manager::TransferManager;
pub use task::{DiskType, TaskId, TaskStatus, TransferDirection, TransferTask};
