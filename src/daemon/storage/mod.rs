//!  Storage is organized through [history_storage::HistoryStorageImpl].
//!  The basic idea is:
//!   - The whole history lives in a single JSON file mapping `YYYY-MM-DD` to the day's counts.
//!   - The file is only ever replaced atomically, a crash never leaves half of it behind.
//!   - Writes happen on [save_worker::SaveWorker], away from the event path.

pub mod entities;
pub mod history_storage;
pub mod save_worker;
