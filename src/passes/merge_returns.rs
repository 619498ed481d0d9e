use crate::ir::{
    merge_types, BlockId, BlockKind, InstId, InstKind, Method, Type, ValueId, WORD,
};
use thiserror::Error;

/// Merge-type inference contradicted the method's declared return type.
///
/// This is a fatal precondition violation: an upstream pass produced return
/// values whose join is integral while the signature demands something else
/// entirely. It is reported, never papered over.
#[derive(Debug, Error)]
#[error(
    "method `{method}` merges returns to integral `{join}` but declares return type `{declared}`"
)]
pub struct SignatureMismatch {
    pub method: String,
    pub join: Type,
    pub declared: Type,
}

/// Collapses a method's return points into a single return block.
///
/// Many downstream consumers rely on a method body having at most one
/// return. This pass finds every block whose terminator is a return and,
/// when there is more than one, reroutes them through a fresh `%bb.return`
/// hub: each return becomes an unconditional jump (keeping its source
/// location), the returned values meet in a `%retval` phi under their join
/// type, and a `%retval.casted` conversion is inserted when the join and
/// the declared return type are far enough apart to matter.
#[derive(Debug, Default)]
pub struct MergeReturns {
    return_blocks: Vec<(BlockId, InstId)>,
}

impl MergeReturns {
    pub fn new() -> MergeReturns {
        MergeReturns::default()
    }

    /// Reset the per-method scratch state.
    pub fn cleanup(&mut self) {
        self.return_blocks.clear();
    }

    /// Rewrite `method` in place so it has at most one return point.
    pub fn normalize(&mut self, method: &mut Method) -> Result<(), SignatureMismatch> {
        let result = self.run(method);
        self.cleanup();
        result
    }

    fn run(&mut self, method: &mut Method) -> Result<(), SignatureMismatch> {
        let return_type = method.return_type.clone();
        let body = &mut method.body;

        for block in body.blocks() {
            if let Some(term) = body.terminator_of(block) {
                if matches!(body.inst(term).kind, InstKind::Return) {
                    self.return_blocks.push((block, term));
                }
            }
        }
        if self.return_blocks.len() <= 1 {
            return Ok(());
        }

        let hub = body.add_block("bb.return", BlockKind::Body);

        let mut incomings: Vec<(BlockId, ValueId)> = Vec::new();
        for (block, return_inst) in self.return_blocks.drain(..) {
            let location = body.inst(return_inst).location.clone();
            let returned = body.inst(return_inst).return_value();
            body.remove_inst(block, return_inst);
            body.link_forward(block, hub);
            if let Some(value) = returned {
                incomings.push((block, value));
            }

            let jump = body.new_jump(hub);
            body.set_location(jump, location);
            body.append_inst(block, jump);
        }

        if return_type.is_void() {
            let ret = body.new_return(None);
            body.append_inst(hub, ret);
            return Ok(());
        }

        let incoming_types: Vec<Type> = incomings
            .iter()
            .map(|(_, value)| body.value(*value).ty.clone())
            .collect();
        let join = merge_types(incoming_types.iter()).unwrap_or_else(|| return_type.clone());

        let phi = body.new_phi("retval", join.clone(), incomings);
        body.append_inst(hub, phi);
        let phi_value = body.inst(phi).result().expect("phi result");

        let return_value = if join == return_type {
            phi_value
        } else if join.is_integral() {
            if !return_type.is_integral() {
                return Err(SignatureMismatch {
                    method: method.name.clone(),
                    join,
                    declared: return_type,
                });
            }
            let join_width = join.bit_size().expect("integral width");
            let declared_width = return_type.bit_size().expect("integral width");

            // An int/long mismatch needs an explicit conversion; anything
            // narrower than a word is representable in place.
            if join_width.abs_diff(declared_width) >= WORD {
                let cast = body.new_cast("retval.casted", return_type.clone(), phi_value);
                body.append_inst(hub, cast);
                body.inst(cast).result().expect("cast result")
            } else {
                phi_value
            }
        } else {
            let cast = body.new_cast("retval.casted", return_type.clone(), phi_value);
            body.append_inst(hub, cast);
            body.inst(cast).result().expect("cast result")
        };

        let ret = body.new_return(Some(return_value));
        body.append_inst(hub, ret);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ir::verifier::IrVerifier;
    use crate::ir::{Constant, ValueName};

    /// Entry switches over `arms.len() + 1` blocks; each returns a constant
    /// of the given type (or nothing for `void`).
    fn method_with_returns(return_type: Type, value_types: &[Type]) -> Method {
        let mut method = Method::new("subject", vec![Type::Int], return_type);
        let entry = method.body.add_block("entry", BlockKind::Body);
        method.body.set_entry(entry);
        let key = method.body.make_arg(0, Type::Int);

        let mut return_blocks = Vec::new();
        for (idx, ty) in value_types.iter().enumerate() {
            let block = method.body.add_block(format!("ret{}", idx), BlockKind::Body);
            let value = match ty {
                Type::Void => None,
                ty => Some(method.body.make_constant(Constant::Int(idx as i64), ty.clone())),
            };
            let ret = method.body.new_return(value);
            method.body.append_inst(block, ret);
            return_blocks.push(block);
        }

        let default = return_blocks[0];
        let arms: Vec<(i64, BlockId)> = return_blocks[1..]
            .iter()
            .enumerate()
            .map(|(i, block)| (i as i64 + 1, *block))
            .collect();
        let switch = method.body.new_switch(key, default, arms);
        method.body.append_inst(entry, switch);
        for block in &return_blocks {
            method.body.link_forward(entry, *block);
        }
        method
    }

    fn hub_block(method: &Method) -> BlockId {
        method
            .body
            .blocks()
            .find(|b| method.body.block(*b).name.as_str() == "bb.return")
            .expect("return hub")
    }

    #[test]
    fn single_return_is_untouched() {
        let mut method = method_with_returns(Type::Int, &[Type::Int]);
        let blocks_before = method.body.block_count();
        MergeReturns::new().normalize(&mut method).unwrap();
        assert_eq!(method.body.block_count(), blocks_before);
        assert!(IrVerifier::new().verify(&method).is_ok());
    }

    #[test]
    fn merges_int_int_long_under_long() {
        let mut method = method_with_returns(Type::Long, &[Type::Int, Type::Int, Type::Long]);
        assert!(IrVerifier::new().verify(&method).is_ok());
        MergeReturns::new().normalize(&mut method).unwrap();
        assert!(IrVerifier::new().verify(&method).is_ok());

        let hub = hub_block(&method);
        let insts = method.body.block(hub).insts();
        // phi + return; join Long == declared Long, so no cast
        assert_eq!(insts.len(), 2);
        let phi = method.body.inst(insts[0]);
        match &phi.kind {
            InstKind::Phi { incoming } => assert_eq!(incoming.len(), 3),
            other => panic!("expected phi, got {:?}", other),
        }
        let phi_result = phi.result().unwrap();
        assert_eq!(method.body.value(phi_result).ty, Type::Long);
        assert_eq!(
            method.body.value(phi_result).name,
            ValueName::Symbol(String::from("retval"))
        );
        let ret = method.body.inst(insts[1]);
        assert_eq!(ret.return_value(), Some(phi_result));
    }

    #[test]
    fn cast_tolerance_is_one_word() {
        // (declared, incoming values, expect cast)
        let table: &[(Type, &[Type], bool)] = &[
            (Type::Int, &[Type::Int, Type::Long], true), // join long, gap 32
            (Type::Long, &[Type::Int, Type::Int], true), // join int, gap 32
            (Type::Int, &[Type::Short, Type::Short], false), // join short, gap 16
            (Type::Int, &[Type::Short, Type::Char], false), // join int, gap 0
            (Type::Long, &[Type::Long, Type::Long], false), // join == declared
        ];
        for (declared, values, expect_cast) in table {
            let mut method = method_with_returns(declared.clone(), values);
            MergeReturns::new().normalize(&mut method).unwrap();
            assert!(IrVerifier::new().verify(&method).is_ok());

            let hub = hub_block(&method);
            let has_cast = method
                .body
                .block(hub)
                .insts()
                .iter()
                .any(|i| matches!(method.body.inst(*i).kind, InstKind::Cast(_)));
            assert_eq!(
                has_cast, *expect_cast,
                "declared {:?} from {:?}",
                declared, values
            );
        }
    }

    #[test]
    fn non_integral_mismatch_always_casts() {
        let string = Type::reference("java/lang/String");
        let integer = Type::reference("java/lang/Integer");
        let mut method = method_with_returns(string.clone(), &[string.clone(), integer]);
        MergeReturns::new().normalize(&mut method).unwrap();
        assert!(IrVerifier::new().verify(&method).is_ok());

        let hub = hub_block(&method);
        let insts = method.body.block(hub).insts();
        assert_eq!(insts.len(), 3);
        let cast = method.body.inst(insts[1]);
        assert_eq!(cast.kind, InstKind::Cast(string.clone()));
        let cast_result = cast.result().unwrap();
        assert_eq!(
            method.body.value(cast_result).name,
            ValueName::Symbol(String::from("retval.casted"))
        );
        assert_eq!(
            method.body.inst(insts[2]).return_value(),
            Some(cast_result)
        );
    }

    #[test]
    fn integral_join_against_reference_signature_is_fatal() {
        let mut method = method_with_returns(
            Type::reference("java/lang/String"),
            &[Type::Int, Type::Long],
        );
        let err = MergeReturns::new().normalize(&mut method).unwrap_err();
        assert_eq!(err.join, Type::Long);
        assert_eq!(err.declared, Type::reference("java/lang/String"));
    }

    #[test]
    fn void_returns_merge_to_plain_return() {
        let mut method = method_with_returns(Type::Void, &[Type::Void, Type::Void]);
        MergeReturns::new().normalize(&mut method).unwrap();
        assert!(IrVerifier::new().verify(&method).is_ok());

        let hub = hub_block(&method);
        let insts = method.body.block(hub).insts();
        assert_eq!(insts.len(), 1);
        assert_eq!(method.body.inst(insts[0]).kind, InstKind::Return);
        assert_eq!(method.body.inst(insts[0]).return_value(), None);
    }

    #[test]
    fn normalizing_twice_is_a_no_op() {
        let mut method = method_with_returns(Type::Long, &[Type::Int, Type::Int, Type::Long]);
        let mut pass = MergeReturns::new();
        pass.normalize(&mut method).unwrap();
        let blocks_after_first = method.body.block_count();
        let hub = hub_block(&method);
        let hub_insts = method.body.block(hub).insts().to_vec();

        pass.normalize(&mut method).unwrap();
        assert_eq!(method.body.block_count(), blocks_after_first);
        assert_eq!(method.body.block(hub).insts(), &hub_insts[..]);
        assert!(IrVerifier::new().verify(&method).is_ok());
    }

    #[test]
    fn jump_inherits_return_location() {
        use crate::ir::Location;

        let mut method = method_with_returns(Type::Int, &[Type::Int, Type::Int]);
        let loc = Location {
            file: Some(String::from("Subject.java")),
            line: 41,
        };
        // Stamp the first return with a location before normalizing
        let first_ret = method
            .body
            .blocks()
            .find_map(|b| {
                let term = method.body.terminator_of(b)?;
                matches!(method.body.inst(term).kind, InstKind::Return).then(|| term)
            })
            .unwrap();
        let origin = method.body.inst(first_ret).parent().unwrap();
        method.body.set_location(first_ret, loc.clone());

        MergeReturns::new().normalize(&mut method).unwrap();

        let jump = method.body.terminator_of(origin).unwrap();
        assert!(matches!(method.body.inst(jump).kind, InstKind::Jump { .. }));
        assert_eq!(method.body.inst(jump).location, loc);
    }
}
