//! Terminal emulation: VT parsing and the screen model.
//!
//! # Architecture
//!
//! ```text
//! Emulator
//!  ├── Parser        (byte-in state machine, UTF-8 aware)
//!  └── Interpreter   (Perform impl)
//!       ├── Screen   (grid, cursor, margins, alt screen)
//!       │    └── ScrollbackRing<Line>
//!       ├── pending responses (DSR/DA write-backs)
//!       └── side events (bell, title, cwd, markers, notifications)
//! ```
//!
//! The parser knows nothing about cells; the screen knows nothing about
//! bytes. The emulator is the only type that sees both.

pub mod cell;
pub mod emulator;
pub mod osc;
pub mod parser;
pub mod ring;
pub mod screen;
pub mod snapshot;

pub use cell::{Attribute, Cell, Color, Line};
pub use emulator::{Emulator, SideEvent};
pub use osc::{parse_osc, MarkerKind, OscEvent};
pub use parser::{Parser, Perform};
pub use ring::ScrollbackRing;
pub use screen::{Modes, Screen};
pub use snapshot::ScreenSnapshot;
