// Library modules
pub mod config;
pub mod constants;
pub mod daemon;
pub mod history;
pub mod session;
pub mod term;

// Re-export commonly used types
pub use config::Config;
pub use daemon::protocol::{Event, EventType, Request, RequestType, Response};
pub use daemon::{endpoint_name, Daemon, DaemonClient};
pub use history::transcript::TranscriptStore;
pub use history::{CommandLog, CommandLogEntry};
pub use session::manager::{SessionInfo, SessionManager};
pub use session::{Session, SessionEvent};
pub use term::{Emulator, Parser, Perform, Screen, ScreenSnapshot, ScrollbackRing, SideEvent};
