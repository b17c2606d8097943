pub mod log;
pub mod process;
pub mod shell;
pub mod text;
