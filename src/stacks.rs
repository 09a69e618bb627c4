//! Active-stack snapshot.
//!
//! Before anything is mutated, the engine walks every thread and records
//! which frames are executing functions of the source being fixed. The
//! snapshot drives the stricter active-function restrictions, the trampoline
//! preflight, and the replaced-functions report. It lives for one request.

use crate::inferior::{Frame, Inferior, ThreadId};
use refix_environ::{basename, SymbolStore};

/// One frame executing a function of the fixed source. Names and the frame
/// descriptor are copied by value; the symbols they came from may belong to
/// the transient pre-load module, which is freed before the snapshot is.
#[derive(Clone, Debug)]
pub struct ActiveFunc {
    pub source_name: String,
    pub linkage_name: String,
    /// Filename of the symtab the frame's PC resolved to.
    pub file: String,
    pub frame: Frame,
}

/// A thread with at least one frame in the fixed source.
#[derive(Clone, Debug)]
pub struct ActiveThread {
    pub thread: ThreadId,
    /// Matching frames, innermost first.
    pub funcs: Vec<ActiveFunc>,
    /// The thread's stopped PC.
    pub pc: u64,
}

/// Walk every thread and collect the frames whose function lives in
/// `source_filename`, matched by full path or by basename. Dead threads are
/// skipped silently.
pub fn snapshot_active_threads(
    store: &SymbolStore,
    inferior: &mut dyn Inferior,
    source_filename: &str,
) -> Vec<ActiveThread> {
    let source_base = basename(source_filename);
    let mut out = Vec::new();

    for thread in inferior.threads() {
        let Some(frames) = inferior.frames(thread) else {
            // Thread's dead, Jed.
            continue;
        };
        let mut funcs = Vec::new();
        for frame in &frames {
            let Some(st) = store.find_pc_symtab(frame.pc) else {
                continue;
            };
            let symtab = store.symtab(st);
            let matches = symtab.filename == source_filename
                || symtab.fullname.as_deref() == Some(source_filename)
                || basename(&symtab.filename) == source_base;
            if !matches {
                continue;
            }
            let Some(sym) = store.find_pc_function(frame.pc) else {
                continue;
            };
            let sym = store.symbol(sym);
            funcs.push(ActiveFunc {
                source_name: sym.source_name.clone(),
                linkage_name: sym.linkage_name.clone(),
                file: symtab.filename.clone(),
                frame: *frame,
            });
        }
        if !funcs.is_empty() {
            out.push(ActiveThread {
                thread,
                funcs,
                pc: frames[0].pc,
            });
        }
    }
    out
}

/// Is a function `name` currently executing on any snapshot thread?
pub fn in_active_func(name: &str, threads: &[ActiveThread]) -> bool {
    threads.iter().any(|t| {
        t.funcs
            .iter()
            .any(|f| f.source_name == name || f.linkage_name == name)
    })
}
