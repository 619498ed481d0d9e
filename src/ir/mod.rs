//! Typed control-flow IR over method bodies
//!
//! ### Structure
//!
//! A [`Method`] owns a [`MethodBody`], which is the arena for everything in
//! the method's graph: typed [values](ValueData), [instructions](InstData)
//! that consume and produce values, and [basic blocks](BlockData) holding
//! ordered instruction sequences. All cross-references — block edges,
//! instruction parents, use lists — are `u32` index relations into the
//! arenas, so the cyclic graph has exactly one owner.
//!
//! ### Building a method body
//!
//! ```
//! use classflow::ir::{BlockKind, Constant, Method, Type};
//!
//! let mut method = Method::new("answer", vec![], Type::Int);
//! let entry = method.body.add_block("entry", BlockKind::Body);
//! method.body.set_entry(entry);
//!
//! let forty_two = method.body.make_constant(Constant::Int(42), Type::Int);
//! let ret = method.body.new_return(Some(forty_two));
//! method.body.append_inst(entry, ret);
//! ```
//!
//! Mutating passes relink edges and detach instructions through the
//! [`MethodBody`] API, which keeps use lists consistent; the structural
//! invariants the graph must satisfy afterwards are checked by
//! [`verifier::IrVerifier`].

mod block;
mod body;
mod inst;
mod method;
mod name;
mod ty;
mod value;

pub mod verifier;

pub use block::{BlockData, BlockId, BlockKind};
pub use body::{BodyToken, MethodBody};
pub use inst::{BinOp, InstData, InstId, InstKind, Location};
pub use method::{Class, Field, Method};
pub use name::{is_valid_block_name, is_valid_value_name, BlockName, ValueName};
pub use ty::{merge_types, Type, OBJECT_CLASS, WORD};
pub use value::{Constant, ValueData, ValueDef, ValueId};
