pub mod envelope;
pub mod error;
pub mod logging;
pub mod reply;
pub mod status;

pub use tracing;

pub use self::{envelope::Envelope, reply::ReplyLine, status::Status};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
}
