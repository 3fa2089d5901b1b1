//! Scripted remote administration over SSH.
//!
//! A [`Session`] runs shell commands on one host, streaming their output to
//! the local terminal, and moves files with staged, elevated commits. Scopes
//! (`cd`, `env`, `sudo`, `unsudo`, `screen`) are guards that change how
//! commands render until they drop. Every failure is a [`TaskError`]; a
//! nonzero exit status is one too, so a script written with `?` stops at the
//! first command that fails.

pub mod command;
pub mod constants;
pub mod context;
pub mod engine;
pub mod errors;
pub mod session;
pub mod status;
pub mod transport;

pub mod services {
    pub mod config;
    pub mod logger;
}

pub mod utils {
    pub mod data_path;
    pub mod merge;
    pub mod template;
    pub mod user_paths;
    pub mod value;
}

pub use command::{CommandLine, Params};
pub use context::{Context, Elevation, Scope};
pub use engine::{PutOptions, PutOutcome, Source, TransferProgress};
pub use errors::{TaskError, TaskErrorKind};
pub use services::config::Config;
pub use services::logger::{LogLevel, Logger};
pub use session::{
    ChownOptions, ConnectOptions, CpOptions, LsOptions, MkdirOptions, Scoped, Session,
};
pub use status::Status;
pub use transport::Target;
pub use utils::template::{render_template, template};
