//! The multi-tier cache described in spec §4.8: a permanent node-keyed cache, a speculative-mode
//! stack whose writes are fully undone on scope exit, an incomplete-type tracker for fixed-point
//! recursion, a symbol-resolution stack for cycle detection, and a depth-bounded return-type
//! inference stack.
//!
//! See DESIGN.md for why this is hand-rolled rather than built on the teacher's Salsa
//! incremental-query memoization: Salsa's revision-based caching has no notion of "discard
//! everything written under this sub-tree," which speculative overload probing and narrowing
//! sub-evaluation both require (spec §4.8, §7).

use crate::ast::NodeId;
use crate::symbol::SymbolId;
use crate::types::Type;
use rustc_hash::FxHashMap;
use std::cell::RefCell;

/// Historically-tuned threshold (spec §4.8) past which a driver is expected to discard the
/// evaluator rather than keep growing its cache indefinitely.
pub const CACHE_GROWTH_GUARD_THRESHOLD: usize = 750_000;

/// The permanent `node_id -> Type` cache (spec §4.8), bundled with the speculative/incomplete
/// trackers that record *undo* information about writes made into it. Bundling them in one struct
/// (rather than threading three separate `&mut` borrows through the evaluator) is what lets the
/// RAII guards below do their undo work without resorting to unsafe pointer tricks.
#[derive(Debug, Default)]
pub struct TypeCacheState {
    entries: FxHashMap<NodeId, Type>,
    speculative: SpeculativeTracker,
    incomplete: IncompleteTypeTracker,
}

impl TypeCacheState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, node: NodeId) -> Option<&Type> {
        self.entries.get(&node)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_over_growth_guard(&self) -> bool {
        self.entries.len() > CACHE_GROWTH_GUARD_THRESHOLD
    }

    /// Writes `ty` for `node`. If a speculative frame is active, the write is also recorded there
    /// so it can be undone; if an incomplete frame is active, the write additionally never counts
    /// towards the permanent cache once the outermost incomplete frame exits.
    pub fn insert(&mut self, node: NodeId, ty: Type) {
        self.entries.insert(node, ty);
        if let Some(frame) = self.speculative.frames.last_mut() {
            frame.written.push(node);
        }
        if self.incomplete.is_active() {
            self.incomplete.pending.push(node);
        }
    }

    fn remove(&mut self, node: NodeId) {
        self.entries.remove(&node);
    }

    pub fn is_speculating(&self) -> bool {
        self.speculative.is_active()
    }

    pub fn is_incomplete(&self) -> bool {
        self.incomplete.is_active()
    }
}

/// Opens a speculative frame rooted at `root` (spec §4.8: used for overload probing and
/// narrowing-callback exploration). The returned guard, once dropped, removes every cache entry
/// written while it was the innermost active frame — this is what makes overload candidates fully
/// discardable when they don't match.
///
/// Takes `&RefCell<TypeCacheState>` rather than `&mut TypeCacheState`: the work this guard
/// brackets (probing a call, walking a flow graph) recurses back into other `&self` evaluator
/// methods that themselves take a short `cache.borrow()`, so the guard must not hold a live
/// `RefMut` across that work — only at push time here and at pop time in `Drop`.
pub fn enter_speculative(cache: &RefCell<TypeCacheState>, root: Option<NodeId>) -> SpeculativeGuard<'_> {
    cache.borrow_mut().speculative.frames.push(SpeculativeFrame { root, written: Vec::new() });
    SpeculativeGuard {
        cache,
        bomb: drop_bomb::DropBomb::new("SpeculativeGuard must run its Drop impl to undo speculative writes"),
    }
}

/// Opens an incomplete-type frame (spec §4.6's `LoopLabel` fixed-point, §4.8's incomplete-type
/// tracker). Writes made while any such frame is open never survive past the outermost one
/// exiting. Same short-borrow discipline as [`enter_speculative`].
pub fn enter_incomplete(cache: &RefCell<TypeCacheState>) -> IncompleteGuard<'_> {
    cache.borrow_mut().incomplete.depth += 1;
    IncompleteGuard {
        cache,
        bomb: drop_bomb::DropBomb::new("IncompleteGuard must run its Drop impl to settle the fixed-point frame"),
    }
}

#[derive(Debug, Default)]
struct SpeculativeFrame {
    #[allow(dead_code)]
    root: Option<NodeId>,
    written: Vec<NodeId>,
}

/// A stack of nested speculative frames (spec §4.8: "speculative contexts nest").
#[derive(Debug, Default)]
struct SpeculativeTracker {
    frames: Vec<SpeculativeFrame>,
}

impl SpeculativeTracker {
    fn is_active(&self) -> bool {
        !self.frames.is_empty()
    }
}

/// RAII guard for one speculative scope (see [`TypeCacheState::enter_speculative`]). Undoing on
/// `Drop` means the cleanup runs whether the enclosing call returns normally, via `?`, or via a
/// bubbled [`crate::cancellation::Cancelled`] — exactly the unwind-restores-caches guarantee spec
/// §5 asks for, without needing actual exception unwinding.
#[must_use]
pub struct SpeculativeGuard<'c> {
    cache: &'c RefCell<TypeCacheState>,
    bomb: drop_bomb::DropBomb,
}

impl Drop for SpeculativeGuard<'_> {
    fn drop(&mut self) {
        self.bomb.defuse();
        let mut state = self.cache.borrow_mut();
        if let Some(frame) = state.speculative.frames.pop() {
            for node in frame.written {
                state.remove(node);
            }
        }
    }
}

/// A type that is still being resolved as part of a fixed-point iteration.
#[derive(Debug, Default)]
struct IncompleteTypeTracker {
    depth: u32,
    pending: Vec<NodeId>,
}

impl IncompleteTypeTracker {
    fn is_active(&self) -> bool {
        self.depth > 0
    }
}

#[must_use]
pub struct IncompleteGuard<'c> {
    cache: &'c RefCell<TypeCacheState>,
    bomb: drop_bomb::DropBomb,
}

impl Drop for IncompleteGuard<'_> {
    fn drop(&mut self) {
        self.bomb.defuse();
        let mut state = self.cache.borrow_mut();
        state.incomplete.depth -= 1;
        if state.incomplete.depth == 0 {
            let pending = std::mem::take(&mut state.incomplete.pending);
            for node in pending {
                state.remove(node);
            }
        }
    }
}

/// Detects symbol <-> declaration resolution cycles (spec §4.8).
///
/// Each attempt pushes `(symbol, declaration-node)`. If the same pair is already present deeper on
/// the stack, every intermediate entry between the two occurrences is marked invalid and `push`
/// returns `false`, signalling the caller to fall back to a partial/placeholder type rather than
/// recursing forever.
#[derive(Debug, Default)]
pub struct SymbolResolutionStack {
    entries: Vec<SymbolResolutionEntry>,
}

#[derive(Debug, Clone)]
struct SymbolResolutionEntry {
    symbol: SymbolId,
    declaration: NodeId,
    is_valid: bool,
    /// A type usable by a recursive caller while this entry is still being resolved (e.g. a class
    /// referencing itself in a base-class expression).
    partial_type: Option<Type>,
}

impl SymbolResolutionStack {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn push(&mut self, symbol: SymbolId, declaration: NodeId) -> bool {
        if let Some(depth) = self
            .entries
            .iter()
            .position(|e| e.symbol == symbol && e.declaration == declaration)
        {
            for entry in &mut self.entries[depth..] {
                entry.is_valid = false;
            }
            return false;
        }
        self.entries.push(SymbolResolutionEntry {
            symbol,
            declaration,
            is_valid: true,
            partial_type: None,
        });
        true
    }

    pub fn pop(&mut self) {
        self.entries.pop();
    }

    pub fn is_entry_valid(&self, symbol: SymbolId, declaration: NodeId) -> bool {
        self.entries
            .iter()
            .rev()
            .find(|e| e.symbol == symbol && e.declaration == declaration)
            .map(|e| e.is_valid)
            .unwrap_or(true)
    }

    pub fn set_partial_type(&mut self, symbol: SymbolId, declaration: NodeId, ty: Type) {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .rev()
            .find(|e| e.symbol == symbol && e.declaration == declaration)
        {
            entry.partial_type = Some(ty);
        }
    }

    pub fn partial_type_for(&self, symbol: SymbolId, declaration: NodeId) -> Option<&Type> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.symbol == symbol && e.declaration == declaration)
            .and_then(|e| e.partial_type.as_ref())
    }

    pub fn is_resolving(&self, symbol: SymbolId, declaration: NodeId) -> bool {
        self.entries
            .iter()
            .any(|e| e.symbol == symbol && e.declaration == declaration)
    }
}

/// Bounds call-site-contextual return-type inference (spec §4.8: "depth-bounded stack (default
/// limit 3)").
#[derive(Debug)]
pub struct ReturnTypeInferenceStack {
    depth: u32,
    limit: u32,
}

impl Default for ReturnTypeInferenceStack {
    fn default() -> Self {
        Self { depth: 0, limit: 3 }
    }
}

impl ReturnTypeInferenceStack {
    pub fn new(limit: u32) -> Self {
        Self { depth: 0, limit }
    }

    #[must_use]
    pub fn try_enter(&mut self) -> bool {
        if self.depth >= self.limit {
            false
        } else {
            self.depth += 1;
            true
        }
    }

    pub fn leave(&mut self) {
        debug_assert!(self.depth > 0);
        self.depth -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speculative_frame_undoes_writes_on_drop() {
        let state = RefCell::new(TypeCacheState::new());
        state.borrow_mut().insert(NodeId(0), Type::None);
        {
            let _guard = enter_speculative(&state, Some(NodeId(1)));
            state.borrow_mut().insert(NodeId(1), Type::Unknown);
            assert!(state.borrow().get(NodeId(1)).is_some());
        }
        assert!(state.borrow().get(NodeId(0)).is_some());
        assert!(state.borrow().get(NodeId(1)).is_none());
    }

    #[test]
    fn nested_speculative_frames_undo_independently() {
        let state = RefCell::new(TypeCacheState::new());
        let outer = enter_speculative(&state, None);
        state.borrow_mut().insert(NodeId(0), Type::Unknown);
        {
            let _inner = enter_speculative(&state, None);
            state.borrow_mut().insert(NodeId(1), Type::Unknown);
        }
        assert!(state.borrow().get(NodeId(1)).is_none());
        assert!(state.borrow().get(NodeId(0)).is_some());
        drop(outer);
        assert!(state.borrow().get(NodeId(0)).is_none());
    }

    #[test]
    fn incomplete_frame_discards_pending_writes_only_once_outermost_exits() {
        let state = RefCell::new(TypeCacheState::new());
        let outer = enter_incomplete(&state);
        state.borrow_mut().insert(NodeId(0), Type::Unknown);
        assert!(state.borrow().is_incomplete());
        {
            let inner = enter_incomplete(&state);
            state.borrow_mut().insert(NodeId(1), Type::Unknown);
            drop(inner);
        }
        assert!(state.borrow().get(NodeId(0)).is_some());
        assert!(state.borrow().is_incomplete());
        drop(outer);
        assert!(!state.borrow().is_incomplete());
        assert!(state.borrow().get(NodeId(0)).is_none());
        assert!(state.borrow().get(NodeId(1)).is_none());
    }

    #[test]
    fn symbol_resolution_cycle_marks_entries_invalid() {
        let mut stack = SymbolResolutionStack::new();
        assert!(stack.push(SymbolId(0), NodeId(0)));
        assert!(stack.push(SymbolId(1), NodeId(1)));
        assert!(!stack.push(SymbolId(0), NodeId(0)));
        assert!(!stack.is_entry_valid(SymbolId(0), NodeId(0)));
    }

    #[test]
    fn return_type_inference_stack_bounds_depth() {
        let mut stack = ReturnTypeInferenceStack::new(2);
        assert!(stack.try_enter());
        assert!(stack.try_enter());
        assert!(!stack.try_enter());
        stack.leave();
        assert!(stack.try_enter());
    }
}
