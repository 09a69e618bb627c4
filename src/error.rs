//! Errors for fix requests.
//!
//! Every error is fatal to the request in flight and surfaces to the user as
//! a single diagnostic; the engine never recovers locally beyond the two
//! documented soft-failure paths (dead threads while snapshotting stacks,
//! unresolvable types during restriction checks), both of which are warnings
//! rather than errors.

use thiserror::Error;

/// A convenient alias for a `Result` using `FixError`.
pub type FixResult<T> = Result<T, FixError>;

/// The reasons a fix request can fail.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FixError {
    /// The command arguments were malformed.
    #[error("{0}")]
    Usage(String),

    /// A file, source, or module the request depends on could not be found.
    #[error("{0}")]
    NotFound(String),

    /// The bundle is already a known module of the inferior.
    #[error("Bundle '{0}' has already been loaded.")]
    AlreadyLoaded(String),

    /// The candidate violates a fix restriction; the text says which.
    #[error("{0}")]
    Restriction(String),

    /// The dynamic linker could not create an image from the bundle.
    #[error(
        "NSCreateObjectFileImageFromFile failed.  This can happen if certain \
         QuickDraw calls are happening in a run loop.  Stop your program with \
         a normal breakpoint and re-try fix while stopped in your code."
    )]
    ImageCreateFailed,

    /// The dynamic linker refused to link the bundle into the process.
    #[error(
        "NSLinkModule was not able to correctly load the Fix bundle, most \
         likely due to unresolved external references."
    )]
    LoadFailed,

    /// The non-lazy symbol pointer section is not a whole number of pointers.
    #[error("Incorrect __DATA, __nl_symbol_ptr section size!")]
    CorruptSection,

    /// A precondition of an internal step was violated; never expected in
    /// practice.
    #[error("internal error: {0}")]
    Internal(String),

    /// An inferior memory or call operation failed.
    #[error("{0}")]
    Io(String),
}
