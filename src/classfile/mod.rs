//! The binary class-file surface: structural parse, rewrite, and write-back
//!
//! Raw class bytes parse into [`ClassFile`], the external class
//! representation the [containers](crate::container) traffic in. Everything
//! structural is decoded — constant pool, members, exception tables, stack
//! maps — while the instruction stream and unrecognized attributes are kept
//! as raw bytes and round-trip untouched. On the way back out,
//! [`emit_class`] applies the write-side options: legacy `jsr` subroutines
//! are inlined, and stack-map frames are regenerated against a real class
//! hierarchy (see [`crate::hierarchy`]).

mod access_flags;
mod attribute;
mod class;
mod code;
mod constants;
mod frames;
mod serialize;

pub use access_flags::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags};
pub use attribute::{
    Attribute, AttributeInfo, CodeAttribute, ExceptionHandler, StackMapFrame, VerificationType,
};
pub use class::{ClassFile, MemberInfo, Version};
pub use code::inline_subroutines;
pub use constants::{ConstantPool, CpEntry};
pub use frames::{recompute_frames, recompute_maxs};
pub use serialize::{Deserialize, Serialize};

use crate::hierarchy::ClassHierarchy;
use bitflags::bitflags;
use std::io;
use thiserror::Error;

bitflags! {
    /// Read/write option bitset.
    ///
    /// Read options prune what the parser keeps; write options request
    /// extra computation before serialization. Composable; the default is
    /// read everything, write nothing extra.
    pub struct Flags: u8 {
        /// Drop debug attributes (source file, line numbers, local tables)
        const SKIP_DEBUG = 0b0001;
        /// Drop `StackMapTable` attributes on read
        const SKIP_FRAMES = 0b0010;
        /// Recompute `max_stack`/`max_locals` when writing
        const COMPUTE_MAXS = 0b0100;
        /// Regenerate stack-map frames when writing
        const COMPUTE_FRAMES = 0b1000;

        const READ_ALL = 0;
        const READ_CODE_ONLY = Self::SKIP_DEBUG.bits | Self::SKIP_FRAMES.bits;
        const WRITE_COMPUTE_NONE = 0;
        const WRITE_COMPUTE_ALL = Self::COMPUTE_FRAMES.bits | Self::COMPUTE_MAXS.bits;
    }
}

/// Failure while reading or decoding class bytes
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("i/o failure reading class bytes")]
    Io(#[from] io::Error),
    #[error("not a class file (bad magic)")]
    BadMagic,
    #[error("constant pool entry is not valid UTF-8")]
    MalformedUtf8,
    #[error("constant pool index {index} is unusable")]
    BadConstantIndex { index: u16 },
    #[error("unknown constant pool tag {tag}")]
    BadConstantTag { tag: u8 },
    #[error("unknown stack map frame tag {tag}")]
    BadFrameTag { tag: u8 },
    #[error("unknown verification type tag {tag}")]
    BadVerificationTypeTag { tag: u8 },
    #[error("unknown opcode 0x{opcode:02x} at offset {offset}")]
    BadOpcode { opcode: u8, offset: usize },
    #[error("code stream is truncated at offset {offset}")]
    TruncatedCode { offset: usize },
    #[error("branch target {target} is not an instruction boundary")]
    BadBranchTarget { target: usize },
    #[error("malformed descriptor `{descriptor}`")]
    BadDescriptor { descriptor: String },
    #[error("frame recomputation failed while loading `{class}`")]
    FrameRecompute {
        class: String,
        #[source]
        source: Box<WriteError>,
    },
}

/// Failure while rewriting or serializing a class
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("i/o failure writing class bytes")]
    Io(#[from] io::Error),
    #[error("method body could not be decoded")]
    Malformed(#[from] ReadError),
    #[error("stack-map frame computation failed: {0}")]
    FrameComputation(String),
    #[error("unsupported bytecode construct: {0}")]
    UnsupportedBytecode(String),
    #[error("branch offset out of range after relocation")]
    BranchOverflow,
}

/// Serialize a class, applying the write-side options first.
///
/// `jsr`/`ret` subroutines inherited from legacy bytecode are always
/// inlined (later verifiers reject them); frames and maxes are recomputed
/// when requested. Frame recomputation resolves common supertypes through
/// `hierarchy`, falling back to `java/lang/Object` when classes are missing
/// from the lookup path.
pub fn emit_class(
    class: &mut ClassFile,
    flags: Flags,
    hierarchy: &ClassHierarchy,
) -> Result<Vec<u8>, WriteError> {
    code::inline_subroutines(class)?;
    if flags.contains(Flags::COMPUTE_FRAMES) {
        frames::recompute_frames(class, hierarchy)?;
    } else if flags.contains(Flags::COMPUTE_MAXS) {
        frames::recompute_maxs(class, hierarchy)?;
    }
    class.to_bytes().map_err(WriteError::Io)
}
