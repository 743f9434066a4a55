//! Drives a chess engine — a UCI or XBoard subprocess, or a bundled internal
//! searcher — behind one small capability trait, `EngineSession`.

pub mod internal;
pub mod limits;
pub mod position;
pub mod process;
pub mod session;
pub mod uci;
pub mod xboard;

pub type Res<T> = anyhow::Result<T>;

pub use limits::SearchLimits;
pub use position::Position;
pub use session::{Dialect, EngineSession, SessionConfig};
