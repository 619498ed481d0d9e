use crate::classfile::constants::ConstantPool;
use crate::classfile::serialize::{Deserialize, Serialize};
use crate::classfile::{Flags, ReadError};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io;

/// Attribute names dropped by [`Flags::SKIP_DEBUG`]
const DEBUG_ATTRIBUTES: &[&str] = &[
    "SourceFile",
    "SourceDebugExtension",
    "LineNumberTable",
    "LocalVariableTable",
    "LocalVariableTypeTable",
    "MethodParameters",
];

/// An attribute of a class, field, method, or code body.
///
/// Only the attributes this layer actually inspects are parsed into
/// structure (`Code` and `StackMapTable`); everything else is carried as a
/// raw byte payload and round-trips untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name_index: u16,
    pub info: AttributeInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeInfo {
    Code(CodeAttribute),
    StackMapTable(Vec<StackMapFrame>),
    Raw(Vec<u8>),
}

impl Attribute {
    pub const CODE: &'static str = "Code";
    pub const STACK_MAP_TABLE: &'static str = "StackMapTable";

    pub fn is_stack_map_table(&self, pool: &ConstantPool) -> bool {
        matches!(self.info, AttributeInfo::StackMapTable(_))
            || pool
                .utf8(self.name_index)
                .map_or(false, |name| name == Self::STACK_MAP_TABLE)
    }

    /// Parse one attribute, or `None` when the given flags filter it out
    pub fn parse<R: ReadBytesExt>(
        reader: &mut R,
        pool: &ConstantPool,
        flags: Flags,
    ) -> Result<Option<Attribute>, ReadError> {
        let name_index = u16::deserialize(reader)?;
        let length = u32::deserialize(reader)?;
        let mut payload = vec![0u8; length as usize];
        reader.read_exact(&mut payload)?;

        let name = pool.utf8(name_index)?;
        if flags.contains(Flags::SKIP_DEBUG) && DEBUG_ATTRIBUTES.contains(&name) {
            return Ok(None);
        }
        let info = match name {
            Self::CODE => {
                AttributeInfo::Code(CodeAttribute::parse(&mut payload.as_slice(), pool, flags)?)
            }
            Self::STACK_MAP_TABLE => {
                if flags.contains(Flags::SKIP_FRAMES) {
                    return Ok(None);
                }
                AttributeInfo::StackMapTable(parse_frames(&mut payload.as_slice())?)
            }
            _ => AttributeInfo::Raw(payload),
        };
        Ok(Some(Attribute { name_index, info }))
    }
}

/// Parse a `u16`-counted attribute list
pub fn parse_attributes<R: ReadBytesExt>(
    reader: &mut R,
    pool: &ConstantPool,
    flags: Flags,
) -> Result<Vec<Attribute>, ReadError> {
    let count = u16::deserialize(reader)?;
    let mut attributes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        if let Some(attribute) = Attribute::parse(reader, pool, flags)? {
            attributes.push(attribute);
        }
    }
    Ok(attributes)
}

impl Serialize for Attribute {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
        let payload = match &self.info {
            AttributeInfo::Raw(bytes) => bytes.clone(),
            AttributeInfo::Code(code) => {
                let mut buffer = vec![];
                code.serialize(&mut buffer)?;
                buffer
            }
            AttributeInfo::StackMapTable(frames) => {
                let mut buffer = vec![];
                frames.serialize(&mut buffer)?;
                buffer
            }
        };
        self.name_index.serialize(writer)?;
        (payload.len() as u32).serialize(writer)?;
        writer.write_all(&payload)?;
        Ok(())
    }
}

/// The `Code` attribute: the method body proper.
///
/// The instruction stream stays raw here; decoding into IR instruction
/// objects is the loader's concern. The pieces this layer rewrites — the
/// exception table, stack maps, and nested attributes — are structural.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionHandler>,
    pub attributes: Vec<Attribute>,
}

impl CodeAttribute {
    fn parse<R: ReadBytesExt>(
        reader: &mut R,
        pool: &ConstantPool,
        flags: Flags,
    ) -> Result<CodeAttribute, ReadError> {
        let max_stack = u16::deserialize(reader)?;
        let max_locals = u16::deserialize(reader)?;
        let code_length = u32::deserialize(reader)?;
        let mut code = vec![0u8; code_length as usize];
        reader.read_exact(&mut code)?;

        let handler_count = u16::deserialize(reader)?;
        let mut exception_table = Vec::with_capacity(handler_count as usize);
        for _ in 0..handler_count {
            exception_table.push(ExceptionHandler {
                start_pc: u16::deserialize(reader)?,
                end_pc: u16::deserialize(reader)?,
                handler_pc: u16::deserialize(reader)?,
                catch_type: u16::deserialize(reader)?,
            });
        }
        let attributes = parse_attributes(reader, pool, flags)?;
        Ok(CodeAttribute {
            max_stack,
            max_locals,
            code,
            exception_table,
            attributes,
        })
    }

    /// The parsed stack maps, if the body carries any
    pub fn stack_map_table(&self) -> Option<&[StackMapFrame]> {
        self.attributes.iter().find_map(|attr| match &attr.info {
            AttributeInfo::StackMapTable(frames) => Some(frames.as_slice()),
            _ => None,
        })
    }

    /// Drop any stack maps (stale after code edits)
    pub fn remove_stack_map_table(&mut self) {
        self.attributes
            .retain(|attr| !matches!(attr.info, AttributeInfo::StackMapTable(_)));
    }
}

impl Serialize for CodeAttribute {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
        self.max_stack.serialize(writer)?;
        self.max_locals.serialize(writer)?;
        (self.code.len() as u32).serialize(writer)?;
        writer.write_all(&self.code)?;
        (self.exception_table.len() as u16).serialize(writer)?;
        for handler in &self.exception_table {
            handler.serialize(writer)?;
        }
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

/// One exception-table entry: `[start_pc, end_pc)` protected range, handler
/// entry point, and the caught class (0 = catch-all)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    pub catch_type: u16,
}

impl ExceptionHandler {
    pub fn covers(&self, pc: u16) -> bool {
        self.start_pc <= pc && pc < self.end_pc
    }
}

impl Serialize for ExceptionHandler {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
        self.start_pc.serialize(writer)?;
        self.end_pc.serialize(writer)?;
        self.handler_pc.serialize(writer)?;
        self.catch_type.serialize(writer)?;
        Ok(())
    }
}

/// Verification types from the [class-file verifier hierarchy][0]
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.10.1.2
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum VerificationType {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,
    UninitializedThis,
    /// Object type, by `Class` constant
    Object(u16),
    /// Value produced by a `new` at the given code offset, `<init>` not yet run
    Uninitialized(u16),
}

impl VerificationType {
    /// Long and double occupy two variable slots
    pub fn width(&self) -> usize {
        match self {
            VerificationType::Double | VerificationType::Long => 2,
            _ => 1,
        }
    }

    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<VerificationType, ReadError> {
        Ok(match u8::deserialize(reader)? {
            0 => VerificationType::Top,
            1 => VerificationType::Integer,
            2 => VerificationType::Float,
            3 => VerificationType::Double,
            4 => VerificationType::Long,
            5 => VerificationType::Null,
            6 => VerificationType::UninitializedThis,
            7 => VerificationType::Object(u16::deserialize(reader)?),
            8 => VerificationType::Uninitialized(u16::deserialize(reader)?),
            tag => return Err(ReadError::BadVerificationTypeTag { tag }),
        })
    }
}

impl Serialize for VerificationType {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
        match self {
            VerificationType::Top => 0u8.serialize(writer)?,
            VerificationType::Integer => 1u8.serialize(writer)?,
            VerificationType::Float => 2u8.serialize(writer)?,
            VerificationType::Double => 3u8.serialize(writer)?,
            VerificationType::Long => 4u8.serialize(writer)?,
            VerificationType::Null => 5u8.serialize(writer)?,
            VerificationType::UninitializedThis => 6u8.serialize(writer)?,
            VerificationType::Object(cls) => {
                7u8.serialize(writer)?;
                cls.serialize(writer)?;
            }
            VerificationType::Uninitialized(off) => {
                8u8.serialize(writer)?;
                off.serialize(writer)?;
            }
        };
        Ok(())
    }
}

/// One `StackMapTable` entry
#[derive(Debug, Clone, PartialEq)]
pub enum StackMapFrame {
    /// Same locals as the previous frame, empty stack (tags 0-63, 251)
    SameLocalsNoStack { offset_delta: u16 },
    /// Same locals as the previous frame, one stack item (tags 64-127, 247)
    SameLocalsOneStack {
        offset_delta: u16,
        stack: VerificationType,
    },
    /// Previous frame minus the last `chopped_k` locals (tags 248-250)
    ChopLocalsNoStack { offset_delta: u16, chopped_k: u8 },
    /// Previous frame plus extra locals (tags 252-254)
    AppendLocalsNoStack {
        offset_delta: u16,
        locals: Vec<VerificationType>,
    },
    /// Exactly the locals and stack given (tag 255)
    Full {
        offset_delta: u16,
        locals: Vec<VerificationType>,
        stack: Vec<VerificationType>,
    },
}

fn parse_frames<R: ReadBytesExt>(reader: &mut R) -> Result<Vec<StackMapFrame>, ReadError> {
    let count = u16::deserialize(reader)?;
    let mut frames = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let tag = u8::deserialize(reader)?;
        frames.push(match tag {
            0..=63 => StackMapFrame::SameLocalsNoStack {
                offset_delta: tag as u16,
            },
            64..=127 => StackMapFrame::SameLocalsOneStack {
                offset_delta: (tag - 64) as u16,
                stack: VerificationType::parse(reader)?,
            },
            247 => StackMapFrame::SameLocalsOneStack {
                offset_delta: u16::deserialize(reader)?,
                stack: VerificationType::parse(reader)?,
            },
            248..=250 => StackMapFrame::ChopLocalsNoStack {
                offset_delta: u16::deserialize(reader)?,
                chopped_k: 251 - tag,
            },
            251 => StackMapFrame::SameLocalsNoStack {
                offset_delta: u16::deserialize(reader)?,
            },
            252..=254 => {
                let offset_delta = u16::deserialize(reader)?;
                let mut locals = Vec::with_capacity((tag - 251) as usize);
                for _ in 0..(tag - 251) {
                    locals.push(VerificationType::parse(reader)?);
                }
                StackMapFrame::AppendLocalsNoStack {
                    offset_delta,
                    locals,
                }
            }
            255 => {
                let offset_delta = u16::deserialize(reader)?;
                let local_count = u16::deserialize(reader)?;
                let mut locals = Vec::with_capacity(local_count as usize);
                for _ in 0..local_count {
                    locals.push(VerificationType::parse(reader)?);
                }
                let stack_count = u16::deserialize(reader)?;
                let mut stack = Vec::with_capacity(stack_count as usize);
                for _ in 0..stack_count {
                    stack.push(VerificationType::parse(reader)?);
                }
                StackMapFrame::Full {
                    offset_delta,
                    locals,
                    stack,
                }
            }
            tag => return Err(ReadError::BadFrameTag { tag }),
        });
    }
    Ok(frames)
}

impl Serialize for StackMapFrame {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
        match self {
            // `same_frame` and `same_frame_extended`
            StackMapFrame::SameLocalsNoStack { offset_delta } => {
                if *offset_delta <= 63 {
                    (*offset_delta as u8).serialize(writer)?;
                } else {
                    251u8.serialize(writer)?;
                    offset_delta.serialize(writer)?;
                }
            }

            // `same_locals_1_stack_item_frame` and its extended form
            StackMapFrame::SameLocalsOneStack {
                offset_delta,
                stack,
            } => {
                if *offset_delta <= 63 {
                    (*offset_delta as u8 + 64).serialize(writer)?;
                } else {
                    247u8.serialize(writer)?;
                    offset_delta.serialize(writer)?;
                }
                stack.serialize(writer)?;
            }

            // `chop_frame`
            StackMapFrame::ChopLocalsNoStack {
                offset_delta,
                chopped_k,
            } => {
                (251 - chopped_k).serialize(writer)?;
                offset_delta.serialize(writer)?;
            }

            // `append_frame`
            StackMapFrame::AppendLocalsNoStack {
                offset_delta,
                locals,
            } => {
                (251 + locals.len() as u8).serialize(writer)?;
                offset_delta.serialize(writer)?;
                for local in locals {
                    local.serialize(writer)?;
                }
            }

            // `full_frame`
            StackMapFrame::Full {
                offset_delta,
                locals,
                stack,
            } => {
                255u8.serialize(writer)?;
                offset_delta.serialize(writer)?;
                (locals.len() as u16).serialize(writer)?;
                for local in locals {
                    local.serialize(writer)?;
                }
                (stack.len() as u16).serialize(writer)?;
                for item in stack {
                    item.serialize(writer)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn frame_encoding_round_trip() {
        let frames = vec![
            StackMapFrame::SameLocalsNoStack { offset_delta: 5 },
            StackMapFrame::SameLocalsOneStack {
                offset_delta: 80,
                stack: VerificationType::Integer,
            },
            StackMapFrame::ChopLocalsNoStack {
                offset_delta: 3,
                chopped_k: 2,
            },
            StackMapFrame::AppendLocalsNoStack {
                offset_delta: 10,
                locals: vec![VerificationType::Long, VerificationType::Object(7)],
            },
            StackMapFrame::Full {
                offset_delta: 0,
                locals: vec![VerificationType::Top, VerificationType::Uninitialized(4)],
                stack: vec![VerificationType::Null],
            },
        ];
        let mut bytes = vec![];
        frames.serialize(&mut bytes).unwrap();
        let reparsed = parse_frames(&mut bytes.as_slice()).unwrap();
        assert_eq!(frames, reparsed);
    }
}
