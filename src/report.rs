//! The replaced-functions report and the PC-adjustment helper.

use crate::error::FixResult;
use crate::inferior::{Inferior, ThreadId};
use crate::isa::PatchIsa;
use crate::registry::FixInfo;
use crate::target::Target;
use refix_environ::{SymbolId, SymbolStore};
use serde_derive::Serialize;

/// One stack frame whose function was just replaced.
#[derive(Clone, Debug, Serialize)]
pub struct ReplacedFrame {
    pub level: i32,
    pub pc: u64,
    pub func: String,
    pub file: String,
}

/// All replaced frames of one thread.
#[derive(Clone, Debug, Serialize)]
pub struct ReplacedThread {
    #[serde(rename = "thread-id")]
    pub thread_id: ThreadId,
    pub replaced: Vec<ReplacedFrame>,
}

/// What a fix request reports back: for each thread that had replaced
/// functions on its stack, which frames they were. Machine-readable UIs use
/// this to prompt the user about moving stopped PCs.
#[derive(Clone, Debug, Default, Serialize)]
pub struct FixOutcome {
    #[serde(rename = "replaced-functions")]
    pub replaced_functions: Vec<ReplacedThread>,
}

impl FixOutcome {
    pub fn is_empty(&self) -> bool {
        self.replaced_functions.is_empty()
    }
}

/// Build the report from the request's stack snapshot.
pub fn build_outcome(info: &FixInfo) -> FixOutcome {
    FixOutcome {
        replaced_functions: info
            .active_threads
            .iter()
            .map(|t| ReplacedThread {
                thread_id: t.thread,
                replaced: t
                    .funcs
                    .iter()
                    .map(|f| ReplacedFrame {
                        level: f.frame.level,
                        pc: f.frame.pc,
                        func: f.source_name.clone(),
                        file: f.file.clone(),
                    })
                    .collect(),
            })
            .collect(),
    }
}

/// When a replaced function sits at frame 0 and the UI moves that thread's
/// PC into the new version, the PIC base register set by the old prologue is
/// stale. Parse the new function's prologue and, if it establishes a PIC
/// base, store the computed address into that register of `thread`. A
/// function with no discoverable PIC base is left alone silently.
pub fn update_picbase_register(
    store: &SymbolStore,
    inferior: &mut dyn Inferior,
    isa: &dyn PatchIsa,
    target: &Target,
    new_fun: SymbolId,
    thread: ThreadId,
) -> FixResult<()> {
    let sym = store.symbol(new_fun);
    let Some(block) = sym.block.map(|b| &store.symtab(sym.symtab).blocks[b]) else {
        return Ok(());
    };
    let len = (block.end.saturating_sub(block.start) as usize) & !3;
    if len == 0 {
        return Ok(());
    }
    let mut code = vec![0; len];
    inferior.read_memory(block.start, &mut code)?;

    let prologue = isa.parse_prologue(&code, block.start, target);
    match (prologue.pic_base_reg, prologue.pic_base_addr) {
        (Some(reg), Some(addr)) => {
            inferior.write_register(thread, reg, addr)?;
            Ok(())
        }
        _ => Ok(()),
    }
}
