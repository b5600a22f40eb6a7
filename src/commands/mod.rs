pub mod capture;
pub mod config;
pub mod flow;
pub mod submission;

pub use capture::*;
pub use config::*;
pub use flow::*;
pub use submission::*;
