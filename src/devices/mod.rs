//! Reference devices used to exercise I/O dispatch end-to-end. Not meant to
//! be load-bearing drivers — the spec treats leaf device drivers as an
//! external collaborator, specified only through [`crate::device::Device`].

mod console;
mod echo;

pub use console::ConsoleOutputDevice;
pub use echo::AsyncEchoDevice;
