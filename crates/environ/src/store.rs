//! The symbol store: every module the debugger knows about, with entity-id
//! based access so callers can hold references across arbitrary mutation.

use cranelift_entity::PrimaryMap;

use crate::entities::{MinsymId, ModuleId, PsymtabId, SymbolId, SymtabId};
use crate::module::Module;
use crate::symbol::{MinimalSymbol, Namespace, Symbol, SymbolClass};
use crate::symfile::{ModuleData, SymtabData};
use crate::symtab::{Block, PartialSymtab, Symtab, GLOBAL_BLOCK, STATIC_BLOCK};

/// All symbolic state for one debugged process.
///
/// Modules are tombstoned rather than deleted when removed, so the ids of
/// their contents stay stable; everything reachable through the normal
/// iteration methods belongs to a live module.
#[derive(Default)]
pub struct SymbolStore {
    modules: PrimaryMap<ModuleId, Option<Module>>,
    symtabs: PrimaryMap<SymtabId, Symtab>,
    psymtabs: PrimaryMap<PsymtabId, PartialSymtab>,
    symbols: PrimaryMap<SymbolId, Symbol>,
    minsyms: PrimaryMap<MinsymId, MinimalSymbol>,
}

impl SymbolStore {
    pub fn new() -> SymbolStore {
        SymbolStore::default()
    }

    /// Register a module from its parsed symbol-file form. Partial symtabs
    /// are created immediately; full symtabs only on expansion.
    pub fn add_module(&mut self, data: ModuleData) -> ModuleId {
        let id = self.modules.push(None);
        let mut module = Module {
            path: data.path,
            sections: data.sections,
            symtabs: Vec::new(),
            psymtabs: Vec::new(),
            minsyms: Vec::new(),
        };
        for ms in data.minsyms {
            let mid = self.minsyms.push(MinimalSymbol {
                module: id,
                name: ms.name,
                address: ms.address,
                obsolete: false,
            });
            module.minsyms.push(mid);
        }
        for ps in data.psymtabs {
            let pid = self.psymtabs.push(PartialSymtab {
                module: id,
                filename: ps.filename,
                fullname: ps.fullname,
                texthigh: ps.texthigh,
                symtab: None,
                pending: Some(ps.symtab),
                obsolete: false,
            });
            module.psymtabs.push(pid);
        }
        self.modules[id] = Some(module);
        log::debug!("registered module {id}");
        id
    }

    /// Drop a module from the store. Ids into its contents stay allocated
    /// but become unreachable through iteration.
    pub fn remove_module(&mut self, id: ModuleId) {
        log::debug!("removed module {id}");
        self.modules[id] = None;
    }

    pub fn module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(id).and_then(|slot| slot.as_ref())
    }

    /// Iterate live modules in load order.
    pub fn modules(&self) -> impl Iterator<Item = (ModuleId, &Module)> {
        self.modules
            .iter()
            .filter_map(|(id, slot)| slot.as_ref().map(|m| (id, m)))
    }

    /// Snapshot of the live module ids, for before/after load diffing.
    pub fn module_ids(&self) -> Vec<ModuleId> {
        self.modules().map(|(id, _)| id).collect()
    }

    /// Find a live module by the path the dynamic linker reports for it.
    pub fn find_module_by_name(&self, name: &str) -> Option<ModuleId> {
        self.modules()
            .find(|(_, m)| m.path == name)
            .map(|(id, _)| id)
    }

    pub fn symtab(&self, id: SymtabId) -> &Symtab {
        &self.symtabs[id]
    }

    pub fn symtab_mut(&mut self, id: SymtabId) -> &mut Symtab {
        &mut self.symtabs[id]
    }

    pub fn psymtab(&self, id: PsymtabId) -> &PartialSymtab {
        &self.psymtabs[id]
    }

    pub fn psymtab_mut(&mut self, id: PsymtabId) -> &mut PartialSymtab {
        &mut self.psymtabs[id]
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id]
    }

    pub fn minsym(&self, id: MinsymId) -> &MinimalSymbol {
        &self.minsyms[id]
    }

    pub fn minsym_mut(&mut self, id: MinsymId) -> &mut MinimalSymbol {
        &mut self.minsyms[id]
    }

    /// The full symtabs of a module, optionally including obsoleted ones.
    pub fn module_symtabs(&self, id: ModuleId, incl_obsolete: bool) -> Vec<SymtabId> {
        match self.module(id) {
            Some(m) => m
                .symtabs
                .iter()
                .copied()
                .filter(|&st| incl_obsolete || !self.symtabs[st].obsolete)
                .collect(),
            None => Vec::new(),
        }
    }

    /// The partial symtabs of a module, optionally including obsoleted ones.
    pub fn module_psymtabs(&self, id: ModuleId, incl_obsolete: bool) -> Vec<PsymtabId> {
        match self.module(id) {
            Some(m) => m
                .psymtabs
                .iter()
                .copied()
                .filter(|&ps| incl_obsolete || !self.psymtabs[ps].obsolete)
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn module_minsyms(&self, id: ModuleId) -> Vec<MinsymId> {
        match self.module(id) {
            Some(m) => m.minsyms.clone(),
            None => Vec::new(),
        }
    }

    /// Every live, non-obsolete partial symtab in module load order.
    pub fn all_psymtabs(&self) -> Vec<PsymtabId> {
        let mut out = Vec::new();
        for (_, m) in self.modules() {
            out.extend(
                m.psymtabs
                    .iter()
                    .copied()
                    .filter(|&ps| !self.psymtabs[ps].obsolete),
            );
        }
        out
    }

    /// Expand a partial symtab into a full symtab, or hand back the one it
    /// already expanded into.
    pub fn expand_psymtab(&mut self, pid: PsymtabId) -> SymtabId {
        if let Some(st) = self.psymtabs[pid].symtab {
            return st;
        }
        let module = self.psymtabs[pid].module;
        let data = match self.psymtabs[pid].pending.take() {
            Some(data) => data,
            // A psymtab with no payload expands to an empty mirror.
            None => {
                let ps = &self.psymtabs[pid];
                let mut data = SymtabData::new(ps.filename.clone());
                data.fullname = ps.fullname.clone();
                data.primary = false;
                data
            }
        };
        let st = self.build_symtab(module, data);
        self.psymtabs[pid].symtab = Some(st);
        if let Some(m) = self.modules[module].as_mut() {
            m.symtabs.push(st);
        }
        log::debug!("expanded {pid} into {st}");
        st
    }

    /// Expand every partial symtab of a module, obsoleted ones included.
    /// Coalesced C++ symbols can hide in any of them.
    pub fn expand_all_psymtabs(&mut self, id: ModuleId) {
        for pid in self.module_psymtabs(id, true) {
            self.expand_psymtab(pid);
        }
    }

    fn build_symtab(&mut self, module: ModuleId, data: SymtabData) -> SymtabId {
        let stid = self.symtabs.push(Symtab {
            module,
            filename: data.filename,
            fullname: data.fullname,
            primary: data.primary,
            language: data.language,
            blocks: vec![Block::default(), Block::default()],
            obsolete: false,
        });
        for sd in data.globals {
            let sid = self.push_symbol(stid, sd);
            self.symtabs[stid].blocks[GLOBAL_BLOCK].symbols.push(sid);
        }
        for sd in data.statics {
            let sid = self.push_symbol(stid, sd);
            self.symtabs[stid].blocks[STATIC_BLOCK].symbols.push(sid);
        }
        for f in data.functions {
            let fsym = [GLOBAL_BLOCK, STATIC_BLOCK].iter().find_map(|&b| {
                self.symtabs[stid].blocks[b]
                    .symbols
                    .iter()
                    .copied()
                    .find(|&s| {
                        self.symbols[s].linkage_name == f.linkage_name
                            && self.symbols[s].is_function()
                    })
            });
            let idx = self.symtabs[stid].blocks.len();
            let mut block = Block {
                function: fsym,
                start: f.start,
                end: f.end,
                symbols: Vec::new(),
            };
            for sd in f.args.into_iter().chain(f.locals) {
                block.symbols.push(self.push_symbol(stid, sd));
            }
            self.symtabs[stid].blocks.push(block);
            if let Some(fs) = fsym {
                self.symbols[fs].block = Some(idx);
                self.symbols[fs].address = f.start;
            }
        }
        stid
    }

    fn push_symbol(&mut self, symtab: SymtabId, sd: crate::symfile::SymbolData) -> SymbolId {
        self.symbols.push(Symbol {
            symtab,
            source_name: sd.source_name,
            linkage_name: sd.linkage_name,
            namespace: sd.namespace,
            class: sd.class,
            ty: sd.ty,
            address: sd.address,
            block: None,
            obsolete: false,
        })
    }

    /// Look up a symbol within one block of one symtab.
    pub fn lookup_block_symbol(
        &self,
        st: SymtabId,
        block: usize,
        source_name: &str,
        linkage_name: &str,
        namespace: Namespace,
    ) -> Option<SymbolId> {
        self.symtabs[st].lookup_block_symbol(
            |id| &self.symbols[id],
            block,
            source_name,
            linkage_name,
            namespace,
        )
    }

    /// Look up a symbol by linkage name in the global and static blocks of a
    /// module's symtabs. First match in symtab order wins.
    pub fn lookup_symbol_by_linkage(
        &self,
        module: ModuleId,
        linkage_name: &str,
        namespace: Namespace,
        incl_obsolete: bool,
    ) -> Option<SymbolId> {
        for st in self.module_symtabs(module, incl_obsolete) {
            for block in [GLOBAL_BLOCK, STATIC_BLOCK] {
                let found = self.symtabs[st].blocks[block]
                    .symbols
                    .iter()
                    .copied()
                    .find(|&s| {
                        self.symbols[s].namespace == namespace
                            && self.symbols[s].linkage_name == linkage_name
                    });
                if found.is_some() {
                    return found;
                }
            }
        }
        None
    }

    /// Look up a non-obsolete minimal symbol by name, optionally confined to
    /// one module.
    pub fn lookup_minimal_symbol(&self, name: &str, module: Option<ModuleId>) -> Option<MinsymId> {
        for (mid, m) in self.modules() {
            if module.is_some_and(|want| want != mid) {
                continue;
            }
            for &ms in &m.minsyms {
                if !self.minsyms[ms].obsolete && self.minsyms[ms].name == name {
                    return Some(ms);
                }
            }
        }
        None
    }

    /// The minimal symbol covering `pc`: the nearest one at or below it.
    pub fn lookup_minimal_symbol_by_pc(&self, pc: u64) -> Option<MinsymId> {
        let mut best: Option<MinsymId> = None;
        for (_, m) in self.modules() {
            for &ms in &m.minsyms {
                let addr = self.minsyms[ms].address;
                if addr <= pc && best.is_none_or(|b| self.minsyms[b].address < addr) {
                    best = Some(ms);
                }
            }
        }
        best
    }

    /// The live module whose sections cover `addr`.
    pub fn find_pc_section_module(&self, addr: u64) -> Option<ModuleId> {
        self.modules()
            .find(|(_, m)| m.section_for(addr).is_some())
            .map(|(id, _)| id)
    }

    /// The primary symtab containing `pc` in one of its function blocks.
    /// Non-obsolete symtabs win; obsoleted code a thread is still executing
    /// in is found as a fallback.
    pub fn find_pc_symtab(&self, pc: u64) -> Option<SymtabId> {
        let mut fallback = None;
        for (_, m) in self.modules() {
            for &st in &m.symtabs {
                let t = &self.symtabs[st];
                if !t.primary {
                    continue;
                }
                if t.blocks
                    .iter()
                    .skip(crate::symtab::FIRST_LOCAL_BLOCK)
                    .any(|b| b.contains(pc))
                {
                    if !t.obsolete {
                        return Some(st);
                    }
                    fallback.get_or_insert(st);
                }
            }
        }
        fallback
    }

    /// The function symbol whose block contains `pc`.
    pub fn find_pc_function(&self, pc: u64) -> Option<SymbolId> {
        let st = self.find_pc_symtab(pc)?;
        self.symtabs[st]
            .blocks
            .iter()
            .skip(crate::symtab::FIRST_LOCAL_BLOCK)
            .find(|b| b.contains(pc))
            .and_then(|b| b.function)
    }

    /// Search for a coalesced symbol: a weak definition the linker merged
    /// into one arbitrary symtab of `module`. If the module's minimal-symbol
    /// index knows the name, every partial symtab is expanded and the lookup
    /// retried across all of them.
    pub fn search_for_coalesced_symbol(
        &mut self,
        module: ModuleId,
        linkage_name: &str,
        namespace: Namespace,
    ) -> Option<SymbolId> {
        self.lookup_minimal_symbol(linkage_name, Some(module))?;
        self.expand_all_psymtabs(module);
        self.lookup_symbol_by_linkage(module, linkage_name, namespace, true)
    }

    /// True when any symbol of the static-or-global kind at `addr` exists in
    /// the given block of the symtab.
    pub fn find_static_by_address(&self, st: SymtabId, block: usize, addr: u64) -> Option<SymbolId> {
        self.symtabs[st]
            .blocks
            .get(block)?
            .symbols
            .iter()
            .copied()
            .find(|&s| {
                self.symbols[s].class == SymbolClass::Static && self.symbols[s].address == addr
            })
    }
}
