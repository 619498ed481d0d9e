use crate::ir::body::BodyToken;
use crate::ir::inst::InstId;
use crate::ir::name::BlockName;
use crate::ir::ty::Type;
use std::fmt;

/// Index of a block in its method body's block arena
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct BlockId(pub(crate) u32);

impl BlockId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// How a block is entered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    /// Entered by explicit control-flow edges from other blocks
    Body,
    /// Exception handler entry: predecessors are implicit (any instruction in
    /// the protected range), so no explicit predecessor edges may be recorded
    Catch { exception: Type },
}

/// A straight-line instruction sequence with one entry and one terminating
/// exit.
///
/// Predecessor/successor edges are stored as index relations, mirrored by
/// the terminator and merge instructions that reference them; the verifier
/// re-derives and checks that symmetry.
#[derive(Debug, Clone)]
pub struct BlockData {
    pub name: BlockName,
    pub kind: BlockKind,
    pub(crate) insts: Vec<InstId>,
    pub(crate) preds: Vec<BlockId>,
    pub(crate) succs: Vec<BlockId>,
    pub(crate) owner: BodyToken,
}

impl BlockData {
    /// Instructions in execution order
    pub fn insts(&self) -> &[InstId] {
        &self.insts
    }

    pub fn preds(&self) -> &[BlockId] {
        &self.preds
    }

    pub fn succs(&self) -> &[BlockId] {
        &self.succs
    }

    pub fn is_catch(&self) -> bool {
        matches!(self.kind, BlockKind::Catch { .. })
    }

    /// Token of the method body this block was created in
    pub fn owner(&self) -> BodyToken {
        self.owner
    }

    pub fn last_inst(&self) -> Option<InstId> {
        self.insts.last().copied()
    }
}
