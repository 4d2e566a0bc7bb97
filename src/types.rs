//! Newtype wrappers and type aliases for domain concepts.
//!
//! Newtypes for identifiers (process ids, core ids) prevent silent type
//! confusion. Type aliases for quantities (ticks, virtual addresses)
//! provide self-documenting code without the boilerplate of implementing
//! arithmetic traits.

/// Process identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid(pub u64);

/// Core (worker slot) identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoreId(pub usize);

/// Global clock tick count.
pub type Tick = u64;

/// A byte address inside a process's virtual span.
pub type VirtAddr = usize;
