mod task_error;

pub use task_error::{TaskError, TaskErrorKind};

pub type Result<T> = std::result::Result<T, TaskError>;
