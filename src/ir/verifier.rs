//! Structural invariant checking for method graphs.
//!
//! Any pass that mutates a method body is expected to leave the graph in a
//! state this verifier accepts: unique well-formed names, instruction/block
//! membership, phi edges mirroring predecessor sets, terminator edges
//! mirroring successor sets, and exactly one trailing terminator per block.
//! The verifier re-derives all of these facts in one full traversal and
//! fails fast on the first violation.

use crate::ir::block::BlockId;
use crate::ir::inst::{InstId, InstKind};
use crate::ir::method::Method;
use crate::ir::name::{is_valid_block_name, is_valid_value_name};
use crate::ir::value::ValueId;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

/// A method graph failed verification.
///
/// Carries the first violated check as its error source; remaining checks
/// for that method are not run.
#[derive(Debug, Error)]
#[error("invalid IR in method `{method}`")]
pub struct InvalidIr {
    pub method: String,
    #[source]
    pub violation: StructuralViolation,
}

/// One violated structural invariant, naming the offending values/blocks
#[derive(Debug, Error)]
pub enum StructuralViolation {
    #[error("value name `{name}` does not match the value naming grammar")]
    MalformedValueName { name: String },
    #[error("two distinct values share the name `{name}`")]
    ValueNameCollision { name: String },
    #[error("block name `{name}` does not match the block naming grammar")]
    MalformedBlockName { name: String },
    #[error("two distinct blocks share the name `{name}`")]
    BlockNameCollision { name: String },
    #[error("instruction {inst} has no parent block")]
    DetachedInstruction { inst: InstId },
    #[error("instruction {inst} is parented to `{block}`, which is not a member of the method")]
    ForeignParent { inst: InstId, block: String },
    #[error("phi in `{block}` declares incoming block `{incoming}`, which is not a member of the method")]
    PhiForeignIncoming { block: String, incoming: String },
    #[error("phi in `{block}` declares {declared} incoming blocks but the block has {actual} predecessors")]
    PhiPredecessorCount {
        block: String,
        declared: usize,
        actual: usize,
    },
    #[error("phi in `{block}` declares incoming block `{incoming}`, which is not a predecessor")]
    PhiUnknownPredecessor { block: String, incoming: String },
    #[error("phi below a non-merge instruction in block `{block}`")]
    PhiNotAtHead { block: String },
    #[error("terminator of `{block}` declares successor `{succ}`, which is not a member of the method")]
    TerminatorForeignSuccessor { block: String, succ: String },
    #[error("terminator successors of `{block}` differ from the block's successor set")]
    TerminatorSuccessorMismatch { block: String },
    #[error("method has blocks but no designated entry block")]
    MissingEntry,
    #[error("block `{block}` belongs to a different method body")]
    ForeignBlock { block: String },
    #[error("catch block `{block}` is not registered in the method's catch entries")]
    UnregisteredCatchBlock { block: String },
    #[error("catch block `{block}` must not have explicit predecessors")]
    CatchBlockWithPredecessors { block: String },
    #[error("entry block `{block}` must not have predecessors")]
    EntryBlockWithPredecessors { block: String },
    #[error("block `{block}` predecessor `{pred}` is not a member of the method")]
    ForeignPredecessor { block: String, pred: String },
    #[error("block `{block}` successor `{succ}` is not a member of the method")]
    ForeignSuccessor { block: String, succ: String },
    #[error("block `{block}` does not end with a terminator")]
    MissingTerminator { block: String },
    #[error("block `{block}` holds {count} terminators, expected exactly one")]
    TerminatorCount { block: String, count: usize },
}

/// Label for diagnostics; foreign ids may not resolve in this arena
fn block_label(method: &Method, id: BlockId) -> String {
    if id.index() < method.body.block_arena_len() {
        method.body.block(id).name.to_string()
    } else {
        id.to_string()
    }
}

/// Reusable structural checker.
///
/// The name maps are scoped to a single `verify` call and cleared on every
/// exit path, so one instance can sweep a whole program without leaking
/// names across methods. `cleanup` is also public for drivers that manage
/// visitor lifecycles explicitly.
#[derive(Debug, Default)]
pub struct IrVerifier {
    value_names: HashMap<String, ValueId>,
    block_names: HashMap<String, BlockId>,
}

impl IrVerifier {
    pub fn new() -> IrVerifier {
        IrVerifier::default()
    }

    /// Check every structural invariant of the method's graph.
    ///
    /// Fails fast: the first violated check aborts the remaining ones and is
    /// wrapped into the returned [`InvalidIr`].
    pub fn verify(&mut self, method: &Method) -> Result<(), InvalidIr> {
        let result = self.check_method(method);
        self.cleanup();
        result.map_err(|violation| InvalidIr {
            method: method.name.clone(),
            violation,
        })
    }

    /// Reset the per-method name maps.
    pub fn cleanup(&mut self) {
        self.value_names.clear();
        self.block_names.clear();
    }

    fn check_method(&mut self, method: &Method) -> Result<(), StructuralViolation> {
        let body = &method.body;
        if body.block_count() > 0 && body.entry().is_none() {
            return Err(StructuralViolation::MissingEntry);
        }
        for block in body.blocks() {
            self.check_block(method, block)?;
            for inst in body.block(block).insts() {
                self.check_inst(method, block, *inst)?;
            }
        }
        Ok(())
    }

    fn check_block(&mut self, method: &Method, id: BlockId) -> Result<(), StructuralViolation> {
        let body = &method.body;
        let block = body.block(id);
        let name = block.name.to_string();

        if !is_valid_block_name(&name) {
            return Err(StructuralViolation::MalformedBlockName { name });
        }
        match self.block_names.get(&name) {
            Some(stored) if *stored != id => {
                return Err(StructuralViolation::BlockNameCollision { name });
            }
            _ => {
                self.block_names.insert(name.clone(), id);
            }
        }
        if block.owner() != body.token() {
            return Err(StructuralViolation::ForeignBlock { block: name });
        }

        if block.is_catch() {
            if !body.catch_entries().contains(&id) {
                return Err(StructuralViolation::UnregisteredCatchBlock { block: name });
            }
            if !block.preds().is_empty() {
                return Err(StructuralViolation::CatchBlockWithPredecessors { block: name });
            }
        } else if body.entry() == Some(id) {
            if !block.preds().is_empty() {
                return Err(StructuralViolation::EntryBlockWithPredecessors { block: name });
            }
        } else {
            for pred in block.preds() {
                if !body.contains_block(*pred) {
                    return Err(StructuralViolation::ForeignPredecessor {
                        block: name,
                        pred: block_label(method, *pred),
                    });
                }
            }
        }
        for succ in block.succs() {
            if !body.contains_block(*succ) {
                return Err(StructuralViolation::ForeignSuccessor {
                    block: name,
                    succ: block_label(method, *succ),
                });
            }
        }

        match block.last_inst() {
            Some(last) if body.inst(last).is_terminator() => {}
            _ => return Err(StructuralViolation::MissingTerminator { block: name }),
        }
        let count = block
            .insts()
            .iter()
            .filter(|inst| body.inst(**inst).is_terminator())
            .count();
        if count != 1 {
            return Err(StructuralViolation::TerminatorCount { block: name, count });
        }
        Ok(())
    }

    fn check_inst(
        &mut self,
        method: &Method,
        block: BlockId,
        id: InstId,
    ) -> Result<(), StructuralViolation> {
        let body = &method.body;
        let inst = body.inst(id);

        for operand in inst.operands() {
            self.check_value(method, *operand)?;
        }
        if let Some(result) = inst.result() {
            self.check_value(method, result)?;
        }

        match inst.parent() {
            None => return Err(StructuralViolation::DetachedInstruction { inst: id }),
            Some(parent) if !body.contains_block(parent) => {
                return Err(StructuralViolation::ForeignParent {
                    inst: id,
                    block: block_label(method, parent),
                });
            }
            Some(_) => {}
        }

        match &inst.kind {
            InstKind::Phi { incoming } => self.check_phi(method, block, incoming)?,
            kind if kind.is_terminator() => self.check_terminator(method, block, kind)?,
            _ => {}
        }
        Ok(())
    }

    fn check_phi(
        &mut self,
        method: &Method,
        block: BlockId,
        incoming: &[(BlockId, ValueId)],
    ) -> Result<(), StructuralViolation> {
        let body = &method.body;
        let block_data = body.block(block);
        let block_name = block_data.name.to_string();

        // Phis may only form the leading prefix of a block
        let phi_prefix = block_data
            .insts()
            .iter()
            .take_while(|inst| body.inst(**inst).kind.is_phi())
            .count();
        if block_data.insts()[phi_prefix..]
            .iter()
            .any(|inst| body.inst(*inst).kind.is_phi())
        {
            return Err(StructuralViolation::PhiNotAtHead { block: block_name });
        }

        for (incoming_block, _) in incoming {
            if !body.contains_block(*incoming_block) {
                return Err(StructuralViolation::PhiForeignIncoming {
                    block: block_name,
                    incoming: block_label(method, *incoming_block),
                });
            }
        }
        if incoming.len() != block_data.preds().len() {
            return Err(StructuralViolation::PhiPredecessorCount {
                block: block_name,
                declared: incoming.len(),
                actual: block_data.preds().len(),
            });
        }
        for (incoming_block, _) in incoming {
            if !block_data.preds().contains(incoming_block) {
                return Err(StructuralViolation::PhiUnknownPredecessor {
                    block: block_name,
                    incoming: body.block(*incoming_block).name.to_string(),
                });
            }
        }
        Ok(())
    }

    fn check_terminator(
        &mut self,
        method: &Method,
        block: BlockId,
        kind: &InstKind,
    ) -> Result<(), StructuralViolation> {
        let body = &method.body;
        let block_data = body.block(block);
        let declared: BTreeSet<BlockId> = kind.successors().into_iter().collect();

        if declared.len() != block_data.succs().len() {
            return Err(StructuralViolation::TerminatorSuccessorMismatch {
                block: block_data.name.to_string(),
            });
        }
        for succ in kind.successors() {
            if !body.contains_block(succ) {
                return Err(StructuralViolation::TerminatorForeignSuccessor {
                    block: block_data.name.to_string(),
                    succ: block_label(method, succ),
                });
            }
            if !block_data.succs().contains(&succ) {
                return Err(StructuralViolation::TerminatorSuccessorMismatch {
                    block: block_data.name.to_string(),
                });
            }
        }
        Ok(())
    }

    fn check_value(&mut self, method: &Method, id: ValueId) -> Result<(), StructuralViolation> {
        let value = method.body.value(id);
        if !value.name.is_defined() || value.is_constant() {
            return Ok(());
        }
        let name = value.name.to_string();
        if !is_valid_value_name(&name) {
            return Err(StructuralViolation::MalformedValueName { name });
        }
        match self.value_names.get(&name) {
            // Re-sighting the identical value (or an equal one) is fine;
            // a distinct value under the same name is a collision.
            Some(stored) if *stored != id && method.body.value(*stored) != value => {
                Err(StructuralViolation::ValueNameCollision { name })
            }
            _ => {
                self.value_names.insert(name, id);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ir::{BlockKind, Constant, Method, Type};

    fn single_return_method() -> Method {
        let mut method = Method::new("simple", vec![], Type::Void);
        let entry = method.body.add_block("entry", BlockKind::Body);
        method.body.set_entry(entry);
        let ret = method.body.new_return(None);
        method.body.append_inst(entry, ret);
        method
    }

    #[test]
    fn accepts_single_block_method() {
        let method = single_return_method();
        assert!(IrVerifier::new().verify(&method).is_ok());
    }

    #[test]
    fn rejects_block_without_terminator() {
        let mut method = Method::new("unterminated", vec![], Type::Void);
        let entry = method.body.add_block("entry", BlockKind::Body);
        method.body.set_entry(entry);

        let err = IrVerifier::new().verify(&method).unwrap_err();
        assert!(matches!(
            err.violation,
            StructuralViolation::MissingTerminator { .. }
        ));
        assert_eq!(err.method, "unterminated");
    }

    #[test]
    fn rejects_second_terminator() {
        let mut method = single_return_method();
        let entry = method.body.entry().unwrap();
        let extra = method.body.new_return(None);
        method.body.append_inst(entry, extra);

        let err = IrVerifier::new().verify(&method).unwrap_err();
        assert!(matches!(
            err.violation,
            StructuralViolation::TerminatorCount { count: 2, .. }
        ));
    }

    #[test]
    fn rejects_name_collision_between_distinct_values() {
        let mut method = Method::new("collision", vec![], Type::Int);
        let entry = method.body.add_block("entry", BlockKind::Body);
        method.body.set_entry(entry);

        let lhs = method.body.make_constant(Constant::Int(1), Type::Int);
        let rhs = method.body.make_constant(Constant::Int(2), Type::Int);
        let a = method
            .body
            .new_bin_op("x", Type::Int, crate::ir::BinOp::Add, lhs, rhs);
        method.body.append_inst(entry, a);
        let a_val = method.body.inst(a).result().unwrap();
        let b = method
            .body
            .new_bin_op("x", Type::Long, crate::ir::BinOp::Add, a_val, a_val);
        method.body.append_inst(entry, b);
        let b_val = method.body.inst(b).result().unwrap();
        let ret = method.body.new_return(Some(b_val));
        method.body.append_inst(entry, ret);

        let err = IrVerifier::new().verify(&method).unwrap_err();
        assert!(matches!(
            err.violation,
            StructuralViolation::ValueNameCollision { ref name } if name == "%x"
        ));
    }

    #[test]
    fn accepts_repeated_sightings_of_same_value() {
        let mut method = Method::new("resight", vec![Type::Int], Type::Int);
        let entry = method.body.add_block("entry", BlockKind::Body);
        method.body.set_entry(entry);

        let arg = method.body.make_arg(0, Type::Int);
        let sum = method
            .body
            .new_bin_op("sum", Type::Int, crate::ir::BinOp::Add, arg, arg);
        method.body.append_inst(entry, sum);
        let sum_val = method.body.inst(sum).result().unwrap();
        let ret = method.body.new_return(Some(sum_val));
        method.body.append_inst(entry, ret);

        assert!(IrVerifier::new().verify(&method).is_ok());
    }

    #[test]
    fn rejects_catch_block_with_explicit_predecessor() {
        let mut method = Method::new("handler", vec![], Type::Void);
        let entry = method.body.add_block("entry", BlockKind::Body);
        method.body.set_entry(entry);
        let handler = method.body.add_block(
            "catch.all",
            BlockKind::Catch {
                exception: Type::reference("java/lang/Throwable"),
            },
        );
        method.body.register_catch_entry(handler);

        let jump = method.body.new_jump(handler);
        method.body.append_inst(entry, jump);
        method.body.link_forward(entry, handler);

        let throwable = method
            .body
            .make_constant(Constant::Null, Type::reference("java/lang/Throwable"));
        let rethrow = method.body.new_throw(throwable);
        method.body.append_inst(handler, rethrow);

        let err = IrVerifier::new().verify(&method).unwrap_err();
        assert!(matches!(
            err.violation,
            StructuralViolation::CatchBlockWithPredecessors { .. }
        ));
    }

    #[test]
    fn accepts_registered_catch_block_without_predecessors() {
        let mut method = Method::new("handler", vec![], Type::Void);
        let entry = method.body.add_block("entry", BlockKind::Body);
        method.body.set_entry(entry);
        let ret = method.body.new_return(None);
        method.body.append_inst(entry, ret);

        let handler = method.body.add_block(
            "catch.all",
            BlockKind::Catch {
                exception: Type::reference("java/lang/Throwable"),
            },
        );
        method.body.register_catch_entry(handler);
        let throwable = method
            .body
            .make_constant(Constant::Null, Type::reference("java/lang/Throwable"));
        let rethrow = method.body.new_throw(throwable);
        method.body.append_inst(handler, rethrow);

        assert!(IrVerifier::new().verify(&method).is_ok());
    }

    #[test]
    fn rejects_unregistered_catch_block() {
        let mut method = Method::new("handler", vec![], Type::Void);
        let entry = method.body.add_block("entry", BlockKind::Body);
        method.body.set_entry(entry);
        let ret = method.body.new_return(None);
        method.body.append_inst(entry, ret);

        let handler = method.body.add_block(
            "catch.all",
            BlockKind::Catch {
                exception: Type::reference("java/lang/Throwable"),
            },
        );
        let throwable = method
            .body
            .make_constant(Constant::Null, Type::reference("java/lang/Throwable"));
        let rethrow = method.body.new_throw(throwable);
        method.body.append_inst(handler, rethrow);

        let err = IrVerifier::new().verify(&method).unwrap_err();
        assert!(matches!(
            err.violation,
            StructuralViolation::UnregisteredCatchBlock { .. }
        ));
    }

    #[test]
    fn rejects_terminator_edge_mismatch() {
        let mut method = Method::new("mismatch", vec![], Type::Void);
        let entry = method.body.add_block("entry", BlockKind::Body);
        let other = method.body.add_block("other", BlockKind::Body);
        method.body.set_entry(entry);

        // Jump declares `other` but no forward edge was recorded
        let jump = method.body.new_jump(other);
        method.body.append_inst(entry, jump);
        let ret = method.body.new_return(None);
        method.body.append_inst(other, ret);

        let err = IrVerifier::new().verify(&method).unwrap_err();
        assert!(matches!(
            err.violation,
            StructuralViolation::TerminatorSuccessorMismatch { .. }
        ));
    }

    #[test]
    fn name_maps_reset_between_methods() {
        let mut verifier = IrVerifier::new();
        // Both methods define a value named `%x`; the second must not trip
        // over leakage from the first.
        for _ in 0..2 {
            let mut method = Method::new("reuse", vec![Type::Int], Type::Int);
            let entry = method.body.add_block("entry", BlockKind::Body);
            method.body.set_entry(entry);
            let arg = method.body.make_arg(0, Type::Int);
            let x = method
                .body
                .new_bin_op("x", Type::Int, crate::ir::BinOp::Add, arg, arg);
            method.body.append_inst(entry, x);
            let x_val = method.body.inst(x).result().unwrap();
            let ret = method.body.new_return(Some(x_val));
            method.body.append_inst(entry, ret);

            assert!(verifier.verify(&method).is_ok());
        }
    }
}
