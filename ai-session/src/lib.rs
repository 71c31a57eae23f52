//! Low-level process and line-stream primitives for driving CLI coding
//! agents. This crate has no knowledge of backends, sessions, or wire
//! protocols; it only knows how to spawn a child process and turn its
//! stdout/stderr into lines.

pub mod linereader;
pub mod process;

pub use linereader::spawn_line_reader;
pub use process::ProcessHandle;
