mod line;
mod params;
mod render;

pub use line::{bool_flag, equal_flag, initial_flag, CommandLine};
pub use params::Params;
pub use render::{elevation_prefix, render};
