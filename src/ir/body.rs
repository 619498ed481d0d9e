use crate::ir::block::{BlockData, BlockId, BlockKind};
use crate::ir::inst::{BinOp, InstData, InstId, InstKind, Location};
use crate::ir::name::{BlockName, ValueName};
use crate::ir::ty::Type;
use crate::ir::value::{Constant, ValueData, ValueDef, ValueId};
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_BODY_TOKEN: AtomicU32 = AtomicU32::new(0);

/// Process-unique identity of one method body.
///
/// Blocks are stamped with the token of the body that created them, which is
/// what lets the verifier check the owning-method back-reference without the
/// graph carrying ownership cycles.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub struct BodyToken(u32);

/// Arena-owned control-flow graph of one method.
///
/// Values, instructions, and blocks live in three arenas addressed by
/// [`ValueId`]/[`InstId`]/[`BlockId`]; every cyclic relation in the graph
/// (block edges, instruction parents, use lists) is an index relation. The
/// body is the single owner: dropping it releases the whole graph.
#[derive(Debug)]
pub struct MethodBody {
    token: BodyToken,
    values: Vec<ValueData>,
    insts: Vec<InstData>,
    blocks: Vec<BlockData>,
    block_order: Vec<BlockId>,
    entry: Option<BlockId>,
    catch_entries: Vec<BlockId>,
    next_slot: u32,
}

impl Default for MethodBody {
    fn default() -> Self {
        MethodBody::new()
    }
}

impl MethodBody {
    pub fn new() -> MethodBody {
        MethodBody {
            token: BodyToken(NEXT_BODY_TOKEN.fetch_add(1, Ordering::Relaxed)),
            values: Vec::new(),
            insts: Vec::new(),
            blocks: Vec::new(),
            block_order: Vec::new(),
            entry: None,
            catch_entries: Vec::new(),
            next_slot: 0,
        }
    }

    pub fn token(&self) -> BodyToken {
        self.token
    }

    // ---------------------------------------------------------------- blocks

    pub fn add_block(&mut self, name: impl Into<String>, kind: BlockKind) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BlockData {
            name: BlockName::new(name),
            kind,
            insts: Vec::new(),
            preds: Vec::new(),
            succs: Vec::new(),
            owner: self.token,
        });
        self.block_order.push(id);
        id
    }

    pub fn block(&self, id: BlockId) -> &BlockData {
        &self.blocks[id.index()]
    }

    pub(crate) fn block_mut(&mut self, id: BlockId) -> &mut BlockData {
        &mut self.blocks[id.index()]
    }

    /// Blocks in method order
    pub fn blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.block_order.iter().copied()
    }

    pub fn block_count(&self) -> usize {
        self.block_order.len()
    }

    pub fn contains_block(&self, id: BlockId) -> bool {
        id.index() < self.blocks.len() && self.block_order.contains(&id)
    }

    pub(crate) fn block_arena_len(&self) -> usize {
        self.blocks.len()
    }

    pub fn set_entry(&mut self, block: BlockId) {
        self.entry = Some(block);
    }

    pub fn entry(&self) -> Option<BlockId> {
        self.entry
    }

    pub fn register_catch_entry(&mut self, block: BlockId) {
        if !self.catch_entries.contains(&block) {
            self.catch_entries.push(block);
        }
    }

    pub fn catch_entries(&self) -> &[BlockId] {
        &self.catch_entries
    }

    /// Record an explicit control-flow edge `from -> to` (both directions)
    pub fn link_forward(&mut self, from: BlockId, to: BlockId) {
        if !self.blocks[from.index()].succs.contains(&to) {
            self.blocks[from.index()].succs.push(to);
        }
        if !self.blocks[to.index()].preds.contains(&from) {
            self.blocks[to.index()].preds.push(from);
        }
    }

    /// Drop the explicit edge `from -> to` if present
    pub fn unlink(&mut self, from: BlockId, to: BlockId) {
        self.blocks[from.index()].succs.retain(|b| *b != to);
        self.blocks[to.index()].preds.retain(|b| *b != from);
    }

    // ---------------------------------------------------------------- values

    pub fn value(&self, id: ValueId) -> &ValueData {
        &self.values[id.index()]
    }

    pub fn values(&self) -> impl Iterator<Item = ValueId> + '_ {
        (0..self.values.len() as u32).map(ValueId)
    }

    fn push_value(&mut self, data: ValueData) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(data);
        id
    }

    pub fn make_this(&mut self, ty: Type) -> ValueId {
        self.push_value(ValueData {
            name: ValueName::This,
            ty,
            def: ValueDef::This,
            uses: Vec::new(),
        })
    }

    pub fn make_arg(&mut self, index: u16, ty: Type) -> ValueId {
        self.push_value(ValueData {
            name: ValueName::Arg(index),
            ty,
            def: ValueDef::Arg { index },
            uses: Vec::new(),
        })
    }

    pub fn make_constant(&mut self, constant: Constant, ty: Type) -> ValueId {
        self.push_value(ValueData {
            name: ValueName::Undefined,
            ty,
            def: ValueDef::Const(constant),
            uses: Vec::new(),
        })
    }

    /// Next unused compiler-generated slot name
    pub fn fresh_slot(&mut self) -> ValueName {
        let slot = self.next_slot;
        self.next_slot += 1;
        ValueName::Slot(slot)
    }

    // ---------------------------------------------------------- instructions

    pub fn inst(&self, id: InstId) -> &InstData {
        &self.insts[id.index()]
    }

    pub fn inst_mut(&mut self, id: InstId) -> &mut InstData {
        &mut self.insts[id.index()]
    }

    pub fn set_location(&mut self, id: InstId, location: Location) {
        self.insts[id.index()].location = location;
    }

    fn push_inst(
        &mut self,
        kind: InstKind,
        operands: Vec<ValueId>,
        result: Option<(ValueName, Type)>,
    ) -> InstId {
        let id = InstId(self.insts.len() as u32);
        for op in &operands {
            self.values[op.index()].uses.push(id);
        }
        let result = result.map(|(name, ty)| {
            self.push_value(ValueData {
                name,
                ty,
                def: ValueDef::Inst(id),
                uses: Vec::new(),
            })
        });
        self.insts.push(InstData {
            kind,
            operands,
            result,
            parent: None,
            location: Location::default(),
        });
        id
    }

    pub fn new_jump(&mut self, target: BlockId) -> InstId {
        self.push_inst(InstKind::Jump { target }, vec![], None)
    }

    pub fn new_branch(&mut self, cond: ValueId, then_target: BlockId, else_target: BlockId) -> InstId {
        self.push_inst(
            InstKind::Branch {
                then_target,
                else_target,
            },
            vec![cond],
            None,
        )
    }

    pub fn new_switch(
        &mut self,
        key: ValueId,
        default: BlockId,
        arms: Vec<(i64, BlockId)>,
    ) -> InstId {
        self.push_inst(InstKind::Switch { default, arms }, vec![key], None)
    }

    pub fn new_return(&mut self, value: Option<ValueId>) -> InstId {
        let operands = value.into_iter().collect();
        self.push_inst(InstKind::Return, operands, None)
    }

    pub fn new_throw(&mut self, exception: ValueId) -> InstId {
        self.push_inst(InstKind::Throw, vec![exception], None)
    }

    pub fn new_phi(
        &mut self,
        name: impl Into<ValueName>,
        ty: Type,
        incoming: Vec<(BlockId, ValueId)>,
    ) -> InstId {
        let operands = incoming.iter().map(|(_, v)| *v).collect();
        self.push_inst(InstKind::Phi { incoming }, operands, Some((name.into(), ty)))
    }

    pub fn new_cast(&mut self, name: impl Into<ValueName>, to: Type, operand: ValueId) -> InstId {
        self.push_inst(InstKind::Cast(to.clone()), vec![operand], Some((name.into(), to)))
    }

    pub fn new_bin_op(
        &mut self,
        name: impl Into<ValueName>,
        ty: Type,
        op: BinOp,
        lhs: ValueId,
        rhs: ValueId,
    ) -> InstId {
        self.push_inst(InstKind::BinOp(op), vec![lhs, rhs], Some((name.into(), ty)))
    }

    /// Append an instruction to a block and record the parent back-reference
    pub fn append_inst(&mut self, block: BlockId, inst: InstId) {
        debug_assert!(self.insts[inst.index()].parent.is_none());
        self.insts[inst.index()].parent = Some(block);
        self.blocks[block.index()].insts.push(inst);
    }

    /// Detach an instruction from its block, severing its use edges.
    ///
    /// The instruction stays in the arena (ids are stable) but no longer
    /// participates in the graph.
    pub fn remove_inst(&mut self, block: BlockId, inst: InstId) {
        self.blocks[block.index()].insts.retain(|i| *i != inst);
        self.insts[inst.index()].parent = None;
        let operands = std::mem::take(&mut self.insts[inst.index()].operands);
        for op in operands {
            self.values[op.index()].uses.retain(|i| *i != inst);
        }
    }

    /// The block's final instruction, when it is a terminator
    pub fn terminator_of(&self, block: BlockId) -> Option<InstId> {
        let last = self.blocks[block.index()].insts.last()?;
        self.insts[last.index()].is_terminator().then(|| *last)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn use_edges_follow_mutation() {
        let mut body = MethodBody::new();
        let entry = body.add_block("entry", BlockKind::Body);
        body.set_entry(entry);

        let value = body.make_constant(Constant::Int(1), Type::Int);
        let ret = body.new_return(Some(value));
        body.append_inst(entry, ret);

        assert_eq!(body.value(value).uses(), &[ret]);
        assert_eq!(body.terminator_of(entry), Some(ret));

        body.remove_inst(entry, ret);
        assert!(body.value(value).uses().is_empty());
        assert_eq!(body.inst(ret).parent(), None);
        assert_eq!(body.terminator_of(entry), None);
    }

    #[test]
    fn forward_links_are_sets() {
        let mut body = MethodBody::new();
        let a = body.add_block("a", BlockKind::Body);
        let b = body.add_block("b", BlockKind::Body);
        body.link_forward(a, b);
        body.link_forward(a, b);
        assert_eq!(body.block(a).succs(), &[b]);
        assert_eq!(body.block(b).preds(), &[a]);
    }
}
