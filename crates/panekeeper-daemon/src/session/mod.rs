mod process;
mod transport;

#[cfg(test)]
pub(crate) mod scripted;

pub use process::ProcessTransport;
pub use transport::{ProcessProbe, SessionRead, SessionTransport};
