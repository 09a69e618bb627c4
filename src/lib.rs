//! Refix: the Fix-and-Continue engine of a source-level debugger.
//!
//! The engine accepts a freshly compiled replacement translation unit (a
//! "fix bundle") for a source file of an already-running program, loads it
//! into the live process through the platform dynamic linker, and splices
//! the new definitions into the running code: replaced functions get a
//! trampoline written over their old entry, the bundle's indirect references
//! to file-scope data are pointed back at the original instances, and every
//! superseded symbol is marked obsolete. A bundle that would be unsafe to
//! install — say, it changes the arity of a function currently on some
//! thread's stack — is rejected before a single byte of the inferior
//! changes.
//!
//! The engine reasons about three worlds at once and keeps them consistent:
//!
//! - the symbolic world (`refix-environ`): modules, (partial) symtabs,
//!   blocks, symbols, minimal symbols;
//! - the live process, reached only through the [`Inferior`] trait: memory,
//!   threads, frames, registers, inferior function calls;
//! - the binary object on disk: sections, the non-lazy symbol pointer
//!   table, and the ISA-specific instruction encodings in [`isa`].
//!
//! Entry points: build a [`Session`] for a target triple, feed it the
//! program's modules, and call [`Session::fix`] — or go through
//! [`commands::fix_command`] for the debugger-command surface.

pub mod commands;
mod error;
pub mod inferior;
pub mod isa;
pub mod loader;
mod obsolete;
mod preload;
mod redirect;
mod registry;
pub mod report;
mod restrict;
mod session;
pub mod stacks;
mod statics;
mod target;

pub use crate::error::{FixError, FixResult};
pub use crate::inferior::{CallArg, Frame, Inferior, InferiorError, ThreadId};
pub use crate::registry::{FixInfo, FixRegistry, FixedDatum, FixedObj, ObsoletedSym};
pub use crate::report::{FixOutcome, ReplacedFrame, ReplacedThread};
pub use crate::session::{FixRequest, Session};
pub use crate::statics::NL_SYMBOL_PTR_SECTION;
pub use crate::target::Target;
