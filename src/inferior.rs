//! The seam between the engine and the live process.
//!
//! The engine only ever talks to the inferior through this trait: memory,
//! threads and frames, registers, inferior function calls, and the dynamic
//! linker bookkeeping that keeps the symbol store's module list in step with
//! reality. The inferior is stopped for the whole duration of a fix request;
//! nothing here is expected to be reentered.

use refix_environ::{ModuleId, SymbolStore};
use thiserror::Error;

/// A debugger-side thread number.
pub type ThreadId = i32;

/// One unwound stack frame: its depth (0 = innermost) and resume PC.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub level: i32,
    pub pc: u64,
}

/// An argument to an inferior function call. Byte arguments are copied into
/// inferior memory and passed by address, exactly like the debugger pushing
/// a C string for a runtime call.
#[derive(Clone, Debug)]
pub enum CallArg {
    Bytes(Vec<u8>),
    Int(i64),
    Addr(u64),
}

/// Failures at the inferior boundary.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InferiorError {
    #[error("memory read of {len} bytes at {addr:#x} failed")]
    Read { addr: u64, len: usize },
    #[error("memory write of {len} bytes at {addr:#x} failed")]
    Write { addr: u64, len: usize },
    #[error("no function '{0}' in the inferior")]
    NoFunction(String),
    #[error("inferior call to '{0}' failed")]
    CallFailed(String),
    #[error("unable to allocate {0} bytes in the inferior")]
    AllocFailed(u64),
    #[error("no such thread {0}")]
    NoThread(ThreadId),
}

/// The live process, as the engine needs to see it.
pub trait Inferior {
    /// Fill `buf` from inferior memory at `addr`.
    fn read_memory(&mut self, addr: u64, buf: &mut [u8]) -> Result<(), InferiorError>;

    /// Write `data` to inferior memory at `addr`.
    fn write_memory(&mut self, addr: u64, data: &[u8]) -> Result<(), InferiorError>;

    /// All thread ids, live or not. Liveness is discovered by unwinding.
    fn threads(&self) -> Vec<ThreadId>;

    /// Unwind a thread's stack, innermost frame first. `None` means the
    /// thread is dead; callers skip it silently.
    fn frames(&mut self, thread: ThreadId) -> Option<Vec<Frame>>;

    /// Store `value` into a general-purpose register of `thread`.
    fn write_register(&mut self, thread: ThreadId, reg: u8, value: u64)
        -> Result<(), InferiorError>;

    /// Reserve `size` bytes of scratch space in the inferior.
    fn allocate(&mut self, size: u64) -> Result<u64, InferiorError>;

    /// Call a function in the inferior by name and return its integer
    /// result. Blocks until the call completes; there is no cancellation.
    fn call_function(&mut self, name: &str, args: &[CallArg]) -> Result<i64, InferiorError>;

    /// Bring the store's module list in step with the dynamic linker after
    /// something was mapped or unmapped behind the debugger's back.
    fn sync_modules(&mut self, store: &mut SymbolStore) -> Result<(), InferiorError>;

    /// Tear a half-registered module out of the dynamic-linker records after
    /// an aborted load.
    fn remove_module_from_records(&mut self, store: &mut SymbolStore, module: ModuleId);
}

impl From<InferiorError> for crate::FixError {
    fn from(err: InferiorError) -> crate::FixError {
        crate::FixError::Io(err.to_string())
    }
}
