//! Undo history for document mutations
//!
//! Snapshots are immutable and share their bytes, so pushing one onto the
//! history is a reference count bump. The original document is held outside
//! the stack: undoing back to it and resetting to it are byte-identical.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    /// Bytes as loaded, before any signing
    Original,
    /// Output of at least one mutation
    Derived,
}

/// Immutable PDF bytes plus where they came from.
#[derive(Clone, PartialEq, Eq)]
pub struct DocumentSnapshot {
    bytes: Arc<[u8]>,
    kind: SnapshotKind,
}

impl DocumentSnapshot {
    pub fn original(bytes: Vec<u8>) -> Self {
        Self {
            bytes: bytes.into(),
            kind: SnapshotKind::Original,
        }
    }

    pub fn derived(bytes: Vec<u8>) -> Self {
        Self {
            bytes: bytes.into(),
            kind: SnapshotKind::Derived,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn kind(&self) -> SnapshotKind {
        self.kind
    }

    pub fn is_derived(&self) -> bool {
        self.kind == SnapshotKind::Derived
    }

    /// Same bytes as `other`, regardless of kind.
    pub fn same_bytes(&self, other: &DocumentSnapshot) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes) || self.bytes == other.bytes
    }

    fn as_kind(&self, kind: SnapshotKind) -> Self {
        Self {
            bytes: Arc::clone(&self.bytes),
            kind,
        }
    }
}

impl fmt::Debug for DocumentSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentSnapshot")
            .field("kind", &self.kind)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryState {
    Idle,
    Mutating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoOutcome {
    NothingToUndo,
    Restored {
        kind: SnapshotKind,
        remaining: usize,
    },
}

/// Tracks the original document, the active snapshot and the undo stack.
#[derive(Debug)]
pub struct HistoryManager {
    original: Option<DocumentSnapshot>,
    active: Option<DocumentSnapshot>,
    stack: Vec<DocumentSnapshot>,
    enable_undo: bool,
    state: HistoryState,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(true)
    }
}

impl HistoryManager {
    pub fn new(enable_undo: bool) -> Self {
        Self {
            original: None,
            active: None,
            stack: Vec::new(),
            enable_undo,
            state: HistoryState::Idle,
        }
    }

    /// Start over with a freshly loaded document.
    pub fn load(&mut self, original: DocumentSnapshot) {
        let original = original.as_kind(SnapshotKind::Original);
        self.active = Some(original.clone());
        self.original = Some(original);
        self.stack.clear();
        self.state = HistoryState::Idle;
    }

    /// Forget the document entirely.
    pub fn clear(&mut self) {
        self.original = None;
        self.active = None;
        self.stack.clear();
        self.state = HistoryState::Idle;
    }

    pub fn active(&self) -> Option<&DocumentSnapshot> {
        self.active.as_ref()
    }

    pub fn original(&self) -> Option<&DocumentSnapshot> {
        self.original.as_ref()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn state(&self) -> HistoryState {
        self.state
    }

    pub fn undo_enabled(&self) -> bool {
        self.enable_undo
    }

    pub fn can_undo(&self) -> bool {
        self.enable_undo && !self.stack.is_empty()
    }

    pub fn has_modifications(&self) -> bool {
        self.active.as_ref().is_some_and(DocumentSnapshot::is_derived)
    }

    /// A signature has been committed to the active snapshot.
    pub fn has_signature(&self) -> bool {
        self.has_modifications()
    }

    /// Enter the `Mutating` state.
    ///
    /// With undo enabled the current snapshot is pushed first. The guard
    /// removes that entry again unless [`MutationGuard::commit`] is called.
    pub fn begin_mutation(&mut self) -> Result<MutationGuard<'_>, ValidationError> {
        if self.state == HistoryState::Mutating {
            return Err(ValidationError::MutationInProgress);
        }
        let source = self
            .active
            .clone()
            .ok_or(ValidationError::DocumentNotLoaded)?;

        let pushed = self.enable_undo;
        if pushed {
            self.stack.push(source.clone());
            debug!("Saved snapshot before mutation (depth {})", self.stack.len());
        }
        self.state = HistoryState::Mutating;

        Ok(MutationGuard {
            history: self,
            source,
            pushed,
            finished: false,
        })
    }

    pub fn undo(&mut self) -> Result<UndoOutcome, ValidationError> {
        if self.state == HistoryState::Mutating {
            return Err(ValidationError::MutationInProgress);
        }
        if !self.enable_undo {
            return Ok(UndoOutcome::NothingToUndo);
        }
        let Some(previous) = self.stack.pop() else {
            return Ok(UndoOutcome::NothingToUndo);
        };

        let kind = match &self.original {
            Some(original) if previous.same_bytes(original) => SnapshotKind::Original,
            _ => SnapshotKind::Derived,
        };
        self.active = Some(previous.as_kind(kind));
        info!("Undo restored {:?} snapshot ({} left)", kind, self.stack.len());

        Ok(UndoOutcome::Restored {
            kind,
            remaining: self.stack.len(),
        })
    }

    /// Drop all history and make the original active again.
    pub fn reset(&mut self) -> Result<(), ValidationError> {
        if self.state == HistoryState::Mutating {
            return Err(ValidationError::MutationInProgress);
        }
        let original = self
            .original
            .clone()
            .ok_or(ValidationError::DocumentNotLoaded)?;
        self.stack.clear();
        self.active = Some(original);
        info!("History reset to original document");
        Ok(())
    }

    fn finish(&mut self, pushed: bool, result: Option<DocumentSnapshot>) {
        match result {
            Some(snapshot) => {
                self.active = Some(snapshot);
            }
            None => {
                if pushed {
                    self.stack.pop();
                }
                debug!("Mutation rolled back (depth {})", self.stack.len());
            }
        }
        self.state = HistoryState::Idle;
    }
}

/// Open mutation on a [`HistoryManager`].
pub struct MutationGuard<'a> {
    history: &'a mut HistoryManager,
    source: DocumentSnapshot,
    pushed: bool,
    finished: bool,
}

impl MutationGuard<'_> {
    /// Snapshot the mutation starts from.
    pub fn source(&self) -> &DocumentSnapshot {
        &self.source
    }

    /// Publish `snapshot` as the new active document.
    pub fn commit(mut self, snapshot: DocumentSnapshot) {
        self.finished = true;
        self.history.finish(self.pushed, Some(snapshot));
    }

    pub fn rollback(mut self) {
        self.finished = true;
        self.history.finish(self.pushed, None);
    }
}

impl Drop for MutationGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.history.finish(self.pushed, None);
        }
    }
}
