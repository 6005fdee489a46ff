//! SMTP sessions and the streams that drive them

pub mod processor;
pub mod publisher;
pub mod registry;
#[allow(clippy::module_inception)]
pub mod session;
pub mod state;
pub mod stream;

pub use processor::{CommandProcessor, StreamExit};
pub use publisher::{publish, EventStream, Termination, TerminationSignal};
pub use registry::SessionRegistry;
pub use session::Session;
pub use state::{ConnectionState, SessionId, SessionPhase, SessionSnapshot};
pub use stream::{open_stream, OpenStream, StreamOptions};
