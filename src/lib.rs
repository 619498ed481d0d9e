//! Typed control-flow IR over JVM class files
//!
//! `classflow` parses compiled classes into a structured form, hands
//! transformation passes a mutable, verified control-flow graph per method,
//! and serializes the results back into loadable bytecode — stack-map
//! frames included.
//!
//! The pieces, bottom up:
//!
//!   - [`ir`] — the value/instruction/block graph a method body is made of,
//!     plus the [structural verifier](ir::verifier) that every mutating
//!     pass must leave the graph acceptable to
//!   - [`passes`] — graph rewrites; [`passes::MergeReturns`] collapses a
//!     method's return points into one
//!   - [`classfile`] — the binary class-file surface: structural parse,
//!     `jsr` inlining, stack-map recomputation, write-back
//!   - [`hierarchy`] — lazily resolved class metadata backing the
//!     common-supertype queries frame recomputation needs
//!   - [`container`] — where class bytes live: single files, directory
//!     trees, archives, filtered by namespace
//!
//! ### Example: one return point per method
//!
//! ```
//! use classflow::ir::verifier::IrVerifier;
//! use classflow::ir::{BlockKind, Constant, InstKind, Method, Type};
//! use classflow::passes::MergeReturns;
//!
//! # fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! // int pick(int flag) { if (flag != 0) return 1; else return 2L; }
//! let mut method = Method::new("pick", vec![Type::Int], Type::Long);
//! let entry = method.body.add_block("entry", BlockKind::Body);
//! let on_true = method.body.add_block("on.true", BlockKind::Body);
//! let on_false = method.body.add_block("on.false", BlockKind::Body);
//! method.body.set_entry(entry);
//!
//! let flag = method.body.make_arg(0, Type::Int);
//! let branch = method.body.new_branch(flag, on_true, on_false);
//! method.body.append_inst(entry, branch);
//! method.body.link_forward(entry, on_true);
//! method.body.link_forward(entry, on_false);
//!
//! let one = method.body.make_constant(Constant::Int(1), Type::Int);
//! let ret = method.body.new_return(Some(one));
//! method.body.append_inst(on_true, ret);
//! let two = method.body.make_constant(Constant::Int(2), Type::Long);
//! let ret = method.body.new_return(Some(two));
//! method.body.append_inst(on_false, ret);
//!
//! // Collapse both returns into a single hub with a widening phi
//! MergeReturns::new().normalize(&mut method)?;
//! IrVerifier::new().verify(&method)?;
//!
//! let returns = method
//!     .body
//!     .blocks()
//!     .filter(|b| {
//!         method.body.terminator_of(*b).map_or(false, |t| {
//!             matches!(method.body.inst(t).kind, InstKind::Return)
//!         })
//!     })
//!     .count();
//! assert_eq!(returns, 1);
//! # Ok(())
//! # }
//! # demo().unwrap();
//! ```

pub mod classfile;
pub mod container;
pub mod hierarchy;
pub mod ir;
pub mod passes;
