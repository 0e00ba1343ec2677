pub mod apath;
pub mod buf;
pub mod hash;
pub mod problem;
pub mod stamp;

pub use apath::Apath;
pub use problem::{Error, IoContext, Problem, ProblemResult, Result};
pub use stamp::Stamp;
