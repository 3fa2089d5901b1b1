//! Channel-level machinery: command execution, file transfer and the local
//! terminal the command streams to.

pub mod exec;
pub mod terminal;
pub mod transfer;

pub use exec::{ExecState, Executor};
pub use terminal::{BufferTerminal, LocalTerminal, RawMode, StdTerminal};
pub use transfer::{
    is_unchanged, temp_path, ProgressHook, PutOptions, PutOutcome, Source, TransferEngine,
    TransferProgress,
};
