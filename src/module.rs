//! Cross-module lookups (spec §6: `ImportLookup`).
//!
//! The import resolver itself — turning a dotted path into a parsed, bound module — is an
//! external collaborator (spec §1). This module defines only the narrow, synchronous contract the
//! evaluator calls into, mirroring the teacher's `module_name.rs` for the dotted-name type.

use crate::name::Name;
use crate::symbol::SymbolTableRef;
use std::fmt;

/// A dotted module path (`foo.bar.baz`), normalized and comparable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleName(Vec<Name>);

impl ModuleName {
    pub fn new(segments: impl IntoIterator<Item = Name>) -> Self {
        Self(segments.into_iter().collect())
    }

    pub fn parse(dotted: &str) -> Option<Self> {
        if dotted.is_empty() {
            return None;
        }
        Some(Self(dotted.split('.').map(Name::new).collect()))
    }

    pub fn segments(&self) -> &[Name] {
        &self.0
    }

    pub fn is_submodule_of(&self, parent: &ModuleName) -> bool {
        self.0.len() > parent.0.len() && self.0.starts_with(&parent.0)
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(seg.as_str())?;
        }
        Ok(())
    }
}

/// What `ImportLookup(path)` returns for a resolvable module (spec §6).
#[derive(Debug, Clone)]
pub struct ResolvedModule {
    pub symbol_table: SymbolTableRef,
    pub doc_string: Option<Name>,
}

/// Synchronous lookup of already-parsed modules by canonical path (spec §5: "assumed to be fast
/// (table lookup into pre-loaded modules)").
pub trait ImportLookup {
    fn lookup(&self, path: &ModuleName) -> Option<ResolvedModule>;
}

/// A trivial in-memory implementation, useful for tests and as the default when embedding this
/// core without a real import resolver.
#[derive(Debug, Default)]
pub struct InMemoryImportTable {
    modules: rustc_hash::FxHashMap<ModuleName, ResolvedModule>,
}

impl InMemoryImportTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: ModuleName, module: ResolvedModule) {
        self.modules.insert(path, module);
    }
}

impl ImportLookup for InMemoryImportTable {
    fn lookup(&self, path: &ModuleName) -> Option<ResolvedModule> {
        self.modules.get(path).cloned()
    }
}
