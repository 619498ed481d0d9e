//! Raw code-stream scanning and rewriting.
//!
//! The IR loader owns real instruction decoding; this module only needs the
//! *shape* of the stream — instruction boundaries, branch targets, and the
//! handful of opcodes that get rewritten on the way out. Decoded
//! instructions keep their operand bytes verbatim and carry branch targets
//! as instruction indices, so a decode/encode round trip reproduces the
//! input exactly and rewrites only have to relocate targets.

use crate::classfile::attribute::{AttributeInfo, CodeAttribute, ExceptionHandler};
use crate::classfile::class::ClassFile;
use crate::classfile::{ReadError, WriteError};
use std::collections::HashMap;

pub(crate) mod op {
    pub const ACONST_NULL: u8 = 0x01;
    pub const BIPUSH: u8 = 0x10;
    pub const SIPUSH: u8 = 0x11;
    pub const LDC: u8 = 0x12;
    pub const LDC_W: u8 = 0x13;
    pub const LDC2_W: u8 = 0x14;
    pub const ILOAD: u8 = 0x15;
    pub const ALOAD: u8 = 0x19;
    pub const ISTORE: u8 = 0x36;
    pub const ASTORE: u8 = 0x3a;
    pub const IINC: u8 = 0x84;
    pub const IFEQ: u8 = 0x99;
    pub const GOTO: u8 = 0xa7;
    pub const JSR: u8 = 0xa8;
    pub const RET: u8 = 0xa9;
    pub const TABLESWITCH: u8 = 0xaa;
    pub const LOOKUPSWITCH: u8 = 0xab;
    pub const IRETURN: u8 = 0xac;
    pub const RETURN: u8 = 0xb1;
    pub const GETSTATIC: u8 = 0xb2;
    pub const PUTSTATIC: u8 = 0xb3;
    pub const GETFIELD: u8 = 0xb4;
    pub const PUTFIELD: u8 = 0xb5;
    pub const INVOKEVIRTUAL: u8 = 0xb6;
    pub const INVOKESPECIAL: u8 = 0xb7;
    pub const INVOKESTATIC: u8 = 0xb8;
    pub const INVOKEINTERFACE: u8 = 0xb9;
    pub const INVOKEDYNAMIC: u8 = 0xba;
    pub const NEW: u8 = 0xbb;
    pub const NEWARRAY: u8 = 0xbc;
    pub const ANEWARRAY: u8 = 0xbd;
    pub const ATHROW: u8 = 0xbf;
    pub const CHECKCAST: u8 = 0xc0;
    pub const INSTANCEOF: u8 = 0xc1;
    pub const WIDE: u8 = 0xc4;
    pub const MULTIANEWARRAY: u8 = 0xc5;
    pub const IFNULL: u8 = 0xc6;
    pub const IFNONNULL: u8 = 0xc7;
    pub const GOTO_W: u8 = 0xc8;
    pub const JSR_W: u8 = 0xc9;
}

/// One scanned instruction: original opcode plus either verbatim operand
/// bytes or symbolic (index-based) branch targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insn {
    pub offset: u16,
    pub op: u8,
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    None,
    /// Operand bytes copied verbatim (constant-pool indexes, immediates)
    Bytes(Vec<u8>),
    /// 16-bit-encoded branch to an instruction index
    Branch(usize),
    /// 32-bit-encoded branch to an instruction index (`goto_w`/`jsr_w`)
    BranchW(usize),
    TableSwitch {
        default: usize,
        low: i32,
        targets: Vec<usize>,
    },
    LookupSwitch {
        default: usize,
        pairs: Vec<(i32, usize)>,
    },
}

impl Insn {
    /// Does execution fall through to the lexically next instruction?
    pub fn falls_through(&self) -> bool {
        !matches!(
            self.op,
            op::GOTO
                | op::GOTO_W
                | op::RET
                | op::TABLESWITCH
                | op::LOOKUPSWITCH
                | op::IRETURN..=op::RETURN
                | op::ATHROW
        )
    }

    /// Branch targets as instruction indices
    pub fn branch_targets(&self) -> Vec<usize> {
        match &self.payload {
            Payload::Branch(target) | Payload::BranchW(target) => vec![*target],
            Payload::TableSwitch {
                default, targets, ..
            } => {
                let mut out = vec![*default];
                out.extend_from_slice(targets);
                out
            }
            Payload::LookupSwitch { default, pairs } => {
                let mut out = vec![*default];
                out.extend(pairs.iter().map(|(_, t)| *t));
                out
            }
            _ => vec![],
        }
    }

    /// First two operand bytes as a big-endian index
    pub fn operand_u16(&self) -> Option<u16> {
        match &self.payload {
            Payload::Bytes(bytes) if bytes.len() >= 2 => {
                Some(u16::from_be_bytes([bytes[0], bytes[1]]))
            }
            _ => None,
        }
    }
}

/// Length in bytes of the fixed-size instruction starting at `op`, or
/// `None` for the variable-length ones (`wide`, switches)
fn fixed_length(op: u8) -> Option<usize> {
    Some(match op {
        0x00..=0x0f => 1,
        op::BIPUSH | op::LDC => 2,
        op::SIPUSH | op::LDC_W | op::LDC2_W => 3,
        0x15..=0x19 => 2,
        0x1a..=0x35 => 1,
        0x36..=0x3a => 2,
        0x3b..=0x83 => 1,
        op::IINC => 3,
        0x85..=0x98 => 1,
        0x99..=0xa8 => 3,
        op::RET => 2,
        op::TABLESWITCH | op::LOOKUPSWITCH => return None,
        0xac..=0xb1 => 1,
        0xb2..=0xb8 => 3,
        op::INVOKEINTERFACE | op::INVOKEDYNAMIC => 5,
        op::NEW => 3,
        op::NEWARRAY => 2,
        op::ANEWARRAY => 3,
        0xbe..=0xbf => 1,
        op::CHECKCAST | op::INSTANCEOF => 3,
        0xc2..=0xc3 => 1,
        op::WIDE => return None,
        op::MULTIANEWARRAY => 4,
        op::IFNULL | op::IFNONNULL => 3,
        op::GOTO_W | op::JSR_W => 5,
        _ => return None,
    })
}

fn read_u16(code: &[u8], at: usize) -> Result<u16, ReadError> {
    match code.get(at..at + 2) {
        Some(b) => Ok(u16::from_be_bytes([b[0], b[1]])),
        None => Err(ReadError::TruncatedCode { offset: at }),
    }
}

fn read_i16(code: &[u8], at: usize) -> Result<i16, ReadError> {
    read_u16(code, at).map(|v| v as i16)
}

fn read_i32(code: &[u8], at: usize) -> Result<i32, ReadError> {
    match code.get(at..at + 4) {
        Some(b) => Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]])),
        None => Err(ReadError::TruncatedCode { offset: at }),
    }
}

/// Scan a code array into instructions with symbolic branch targets
pub fn decode(code: &[u8]) -> Result<Vec<Insn>, ReadError> {
    // First pass: instruction boundaries, targets still as absolute offsets
    enum RawTargets {
        None,
        Branch(usize),
        BranchW(usize),
        Table { default: usize, low: i32, targets: Vec<usize> },
        Lookup { default: usize, pairs: Vec<(i32, usize)> },
    }
    let mut raw: Vec<(u16, u8, Vec<u8>, RawTargets)> = Vec::new();
    let mut offset_to_index: HashMap<usize, usize> = HashMap::new();

    let mut offset = 0usize;
    while offset < code.len() {
        let op = code[offset];
        offset_to_index.insert(offset, raw.len());

        match op {
            // Relative 16-bit branches
            0x99..=0xa8 | op::IFNULL | op::IFNONNULL => {
                let rel = read_i16(code, offset + 1)?;
                let target = offset.wrapping_add(rel as isize as usize);
                raw.push((offset as u16, op, vec![], RawTargets::Branch(target)));
                offset += 3;
            }
            op::GOTO_W | op::JSR_W => {
                let rel = read_i32(code, offset + 1)?;
                let target = offset.wrapping_add(rel as isize as usize);
                raw.push((offset as u16, op, vec![], RawTargets::BranchW(target)));
                offset += 5;
            }
            op::TABLESWITCH => {
                let pad = (4 - ((offset + 1) % 4)) % 4;
                let mut at = offset + 1 + pad;
                let default = offset.wrapping_add(read_i32(code, at)? as isize as usize);
                let low = read_i32(code, at + 4)?;
                let high = read_i32(code, at + 8)?;
                at += 12;
                if high < low {
                    return Err(ReadError::TruncatedCode { offset: at });
                }
                let count = (high - low + 1) as usize;
                let mut targets = Vec::with_capacity(count);
                for i in 0..count {
                    targets
                        .push(offset.wrapping_add(read_i32(code, at + 4 * i)? as isize as usize));
                }
                raw.push((
                    offset as u16,
                    op,
                    vec![],
                    RawTargets::Table { default, low, targets },
                ));
                offset = at + 4 * count;
            }
            op::LOOKUPSWITCH => {
                let pad = (4 - ((offset + 1) % 4)) % 4;
                let at = offset + 1 + pad;
                let default = offset.wrapping_add(read_i32(code, at)? as isize as usize);
                let npairs = read_i32(code, at + 4)?;
                if npairs < 0 {
                    return Err(ReadError::TruncatedCode { offset: at });
                }
                let mut pairs = Vec::with_capacity(npairs as usize);
                for i in 0..npairs as usize {
                    let key = read_i32(code, at + 8 + 8 * i)?;
                    let target =
                        offset.wrapping_add(read_i32(code, at + 12 + 8 * i)? as isize as usize);
                    pairs.push((key, target));
                }
                raw.push((
                    offset as u16,
                    op,
                    vec![],
                    RawTargets::Lookup { default, pairs },
                ));
                offset = at + 8 + 8 * npairs as usize;
            }
            op::WIDE => {
                let inner = *code
                    .get(offset + 1)
                    .ok_or(ReadError::TruncatedCode { offset })?;
                let length = match inner {
                    op::IINC => 6,
                    op::ILOAD..=op::ALOAD | op::ISTORE..=op::ASTORE | op::RET => 4,
                    _ => return Err(ReadError::BadOpcode { opcode: inner, offset }),
                };
                let operands = code
                    .get(offset + 1..offset + length)
                    .ok_or(ReadError::TruncatedCode { offset })?
                    .to_vec();
                raw.push((offset as u16, op, operands, RawTargets::None));
                offset += length;
            }
            op => {
                let length =
                    fixed_length(op).ok_or(ReadError::BadOpcode { opcode: op, offset })?;
                let operands = code
                    .get(offset + 1..offset + length)
                    .ok_or(ReadError::TruncatedCode { offset })?
                    .to_vec();
                raw.push((offset as u16, op, operands, RawTargets::None));
                offset += length;
            }
        }
    }

    // Second pass: resolve offsets into instruction indices
    let resolve = |target: usize| -> Result<usize, ReadError> {
        offset_to_index
            .get(&target)
            .copied()
            .ok_or(ReadError::BadBranchTarget { target })
    };
    raw.into_iter()
        .map(|(offset, op, operands, targets)| {
            let payload = match targets {
                RawTargets::None if operands.is_empty() => Payload::None,
                RawTargets::None => Payload::Bytes(operands),
                RawTargets::Branch(t) => Payload::Branch(resolve(t)?),
                RawTargets::BranchW(t) => Payload::BranchW(resolve(t)?),
                RawTargets::Table { default, low, targets } => Payload::TableSwitch {
                    default: resolve(default)?,
                    low,
                    targets: targets
                        .into_iter()
                        .map(resolve)
                        .collect::<Result<_, _>>()?,
                },
                RawTargets::Lookup { default, pairs } => Payload::LookupSwitch {
                    default: resolve(default)?,
                    pairs: pairs
                        .into_iter()
                        .map(|(k, t)| Ok((k, resolve(t)?)))
                        .collect::<Result<_, ReadError>>()?,
                },
            };
            Ok(Insn { offset, op, payload })
        })
        .collect()
}

/// Byte length of an instruction laid out at `offset`
fn encoded_length(insn: &Insn, offset: usize) -> usize {
    match &insn.payload {
        Payload::None => 1,
        Payload::Bytes(bytes) => 1 + bytes.len(),
        Payload::Branch(_) => 3,
        Payload::BranchW(_) => 5,
        Payload::TableSwitch { targets, .. } => {
            let pad = (4 - ((offset + 1) % 4)) % 4;
            1 + pad + 12 + 4 * targets.len()
        }
        Payload::LookupSwitch { pairs, .. } => {
            let pad = (4 - ((offset + 1) % 4)) % 4;
            1 + pad + 8 + 8 * pairs.len()
        }
    }
}

/// Lay out and serialize instructions, resolving symbolic targets back into
/// relative offsets. Returns the code bytes and each instruction's offset.
pub fn encode(insns: &[Insn]) -> Result<(Vec<u8>, Vec<u16>), WriteError> {
    let mut offsets = Vec::with_capacity(insns.len());
    let mut offset = 0usize;
    for insn in insns {
        offsets.push(offset as u16);
        offset += encoded_length(insn, offset);
        if offset > u16::MAX as usize {
            return Err(WriteError::UnsupportedBytecode(String::from(
                "method body exceeds the 65536-byte code limit",
            )));
        }
    }

    let rel16 = |from: usize, to_index: usize| -> Result<[u8; 2], WriteError> {
        let rel = offsets[to_index] as i64 - from as i64;
        i16::try_from(rel)
            .map(|v| v.to_be_bytes())
            .map_err(|_| WriteError::BranchOverflow)
    };

    let mut out = Vec::with_capacity(offset);
    for (index, insn) in insns.iter().enumerate() {
        let at = offsets[index] as usize;
        out.push(insn.op);
        match &insn.payload {
            Payload::None => {}
            Payload::Bytes(bytes) => out.extend_from_slice(bytes),
            Payload::Branch(target) => out.extend_from_slice(&rel16(at, *target)?),
            Payload::BranchW(target) => {
                let rel = offsets[*target] as i64 - at as i64;
                out.extend_from_slice(&(rel as i32).to_be_bytes());
            }
            Payload::TableSwitch { default, low, targets } => {
                let pad = (4 - ((at + 1) % 4)) % 4;
                out.extend(std::iter::repeat(0u8).take(pad));
                out.extend_from_slice(&((offsets[*default] as i64 - at as i64) as i32).to_be_bytes());
                out.extend_from_slice(&low.to_be_bytes());
                let high = low + targets.len() as i32 - 1;
                out.extend_from_slice(&high.to_be_bytes());
                for target in targets {
                    out.extend_from_slice(
                        &((offsets[*target] as i64 - at as i64) as i32).to_be_bytes(),
                    );
                }
            }
            Payload::LookupSwitch { default, pairs } => {
                let pad = (4 - ((at + 1) % 4)) % 4;
                out.extend(std::iter::repeat(0u8).take(pad));
                out.extend_from_slice(&((offsets[*default] as i64 - at as i64) as i32).to_be_bytes());
                out.extend_from_slice(&(pairs.len() as i32).to_be_bytes());
                for (key, target) in pairs {
                    out.extend_from_slice(&key.to_be_bytes());
                    out.extend_from_slice(
                        &((offsets[*target] as i64 - at as i64) as i32).to_be_bytes(),
                    );
                }
            }
        }
    }
    Ok((out, offsets))
}

/// Inline every `jsr`/`ret` subroutine in the class into straight-line form.
///
/// Structured-jump subroutines come out of legacy compilers and are rejected
/// by modern bytecode verifiers, so they must be eliminated before writing.
/// Each `jsr` site receives its own copy of the subroutine body: the pushed
/// return address is replaced by `aconst_null` (the subroutine's leading
/// `astore` still expects an operand), and the `ret` becomes a `goto` back
/// to the instruction after the call site. Nested subroutines are rejected.
pub fn inline_subroutines(class: &mut ClassFile) -> Result<(), WriteError> {
    for method in &mut class.methods {
        if let Some(code) = method
            .attributes
            .iter_mut()
            .find_map(|attr| match &mut attr.info {
                AttributeInfo::Code(code) => Some(code),
                _ => None,
            })
        {
            inline_code_subroutines(code)?;
        }
    }
    Ok(())
}

fn inline_code_subroutines(code: &mut CodeAttribute) -> Result<(), WriteError> {
    let insns = decode(&code.code)?;
    if !insns
        .iter()
        .any(|insn| matches!(insn.op, op::JSR | op::JSR_W))
    {
        return Ok(());
    }
    log::debug!("inlining jsr subroutines ({} instructions)", insns.len());

    // Subroutine extents: from each jsr target to the first `ret` in linear
    // order. Everything trickier than that (nested calls, shared tails) is
    // rejected rather than miscompiled.
    let mut subroutines: HashMap<usize, std::ops::RangeInclusive<usize>> = HashMap::new();
    for insn in &insns {
        if matches!(insn.op, op::JSR | op::JSR_W) {
            let entry = insn.branch_targets()[0];
            if subroutines.contains_key(&entry) {
                continue;
            }
            let ret_index = (entry..insns.len())
                .find(|i| insns[*i].op == op::RET || insns[*i].op == op::WIDE && matches!(&insns[*i].payload, Payload::Bytes(b) if b.first() == Some(&op::RET)))
                .ok_or_else(|| {
                    WriteError::UnsupportedBytecode(String::from(
                        "jsr subroutine without a ret",
                    ))
                })?;
            let range = entry..=ret_index;
            if insns[range.clone()]
                .iter()
                .any(|insn| matches!(insn.op, op::JSR | op::JSR_W))
            {
                return Err(WriteError::UnsupportedBytecode(String::from(
                    "nested jsr subroutines",
                )));
            }
            subroutines.insert(entry, range);
        }
    }
    let in_subroutine = |index: usize| subroutines.values().any(|range| range.contains(&index));

    // Rebuild the instruction list, cloning the subroutine body at each
    // call site. Branch targets stay as *old* indices during the rebuild
    // and are rewritten through the provenance maps afterwards.
    #[derive(Clone, Copy)]
    enum Origin {
        Plain(usize),
        Clone { site: usize, old: usize },
        Synthetic,
    }
    let mut rebuilt: Vec<(Insn, Origin)> = Vec::new();
    let mut plain_map: HashMap<usize, usize> = HashMap::new();
    let mut clone_maps: HashMap<usize, HashMap<usize, usize>> = HashMap::new();

    for (index, insn) in insns.iter().enumerate() {
        if in_subroutine(index) {
            continue;
        }
        if matches!(insn.op, op::JSR | op::JSR_W) {
            let entry = insn.branch_targets()[0];
            let range = subroutines[&entry].clone();

            plain_map.insert(index, rebuilt.len());
            rebuilt.push((
                Insn {
                    offset: insn.offset,
                    op: op::ACONST_NULL,
                    payload: Payload::None,
                },
                Origin::Synthetic,
            ));

            let site_map = clone_maps.entry(index).or_default();
            for old in range {
                site_map.insert(old, rebuilt.len());
                let source = &insns[old];
                let cloned = if source.op == op::RET
                    || matches!(&source.payload, Payload::Bytes(b) if source.op == op::WIDE && b.first() == Some(&op::RET))
                {
                    // Return from the subroutine goes back to the call site
                    Insn {
                        offset: source.offset,
                        op: op::GOTO,
                        payload: Payload::Branch(index + 1),
                    }
                } else {
                    source.clone()
                };
                rebuilt.push((cloned, Origin::Clone { site: index, old }));
            }
        } else {
            plain_map.insert(index, rebuilt.len());
            rebuilt.push((insn.clone(), Origin::Plain(index)));
        }
    }

    // Rewrite symbolic targets through the provenance maps
    let resolve = |origin: Origin, old_target: usize| -> Result<usize, WriteError> {
        if let Origin::Clone { site, .. } = origin {
            if let Some(new) = clone_maps[&site].get(&old_target) {
                return Ok(*new);
            }
        }
        plain_map.get(&old_target).copied().ok_or_else(|| {
            WriteError::UnsupportedBytecode(String::from("branch into a jsr subroutine"))
        })
    };
    let mut new_insns = Vec::with_capacity(rebuilt.len());
    for (mut insn, origin) in rebuilt {
        insn.payload = match insn.payload {
            Payload::Branch(t) => Payload::Branch(resolve(origin, t)?),
            Payload::BranchW(t) => Payload::BranchW(resolve(origin, t)?),
            Payload::TableSwitch { default, low, targets } => Payload::TableSwitch {
                default: resolve(origin, default)?,
                low,
                targets: targets
                    .into_iter()
                    .map(|t| resolve(origin, t))
                    .collect::<Result<_, _>>()?,
            },
            Payload::LookupSwitch { default, pairs } => Payload::LookupSwitch {
                default: resolve(origin, default)?,
                pairs: pairs
                    .into_iter()
                    .map(|(k, t)| Ok((k, resolve(origin, t)?)))
                    .collect::<Result<_, WriteError>>()?,
            },
            other => other,
        };
        new_insns.push(insn);
    }

    let old_offsets: Vec<u16> = insns.iter().map(|insn| insn.offset).collect();
    let (new_code, new_offsets) = encode(&new_insns)?;

    // Relocate the exception table. Entries covering a subroutine get one
    // clone per call site; entries covering removed code only are dropped.
    let old_index_of_offset = |pc: u16| -> Option<usize> {
        if pc as usize == code.code.len() {
            Some(old_offsets.len())
        } else {
            old_offsets.binary_search(&pc).ok()
        }
    };
    let end_offset = |new_index: usize| -> u16 {
        if new_index == new_offsets.len() {
            new_code.len() as u16
        } else {
            new_offsets[new_index]
        }
    };
    let mut new_table = Vec::new();
    for handler in &code.exception_table {
        let (Some(start), Some(end), Some(target)) = (
            old_index_of_offset(handler.start_pc),
            old_index_of_offset(handler.end_pc),
            old_index_of_offset(handler.handler_pc),
        ) else {
            return Err(WriteError::UnsupportedBytecode(String::from(
                "exception range not on an instruction boundary",
            )));
        };
        let handler_target = resolve_handler(&plain_map, target).ok_or_else(|| {
            WriteError::UnsupportedBytecode(String::from("handler inside a jsr subroutine"))
        })?;

        // Portion of the protected range outside any subroutine
        let plain_range: Vec<usize> = (start..end).filter(|i| plain_map.contains_key(i)).collect();
        if let (Some(first), Some(last)) = (plain_range.first(), plain_range.last()) {
            new_table.push(ExceptionHandler {
                start_pc: new_offsets[plain_map[first]],
                end_pc: end_offset(plain_map[last] + 1),
                handler_pc: new_offsets[handler_target],
                catch_type: handler.catch_type,
            });
        }
        // Cloned copies for every call site whose subroutine intersects
        for site_map in clone_maps.values() {
            let covered: Vec<usize> = (start..end).filter(|i| site_map.contains_key(i)).collect();
            if let (Some(first), Some(last)) = (covered.first(), covered.last()) {
                new_table.push(ExceptionHandler {
                    start_pc: new_offsets[site_map[first]],
                    end_pc: end_offset(site_map[last] + 1),
                    handler_pc: new_offsets[handler_target],
                    catch_type: handler.catch_type,
                });
            }
        }
    }

    code.code = new_code;
    code.exception_table = new_table;
    // Offset-addressed metadata is stale now; frames get recomputed by the
    // writer and debug tables for jsr-era classes are expendable
    code.attributes.clear();
    Ok(())
}

fn resolve_handler(plain_map: &HashMap<usize, usize>, target: usize) -> Option<usize> {
    plain_map.get(&target).copied()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decode_encode_round_trip() {
        // iconst_0; istore_1; iload_1; ifeq +5; iconst_1; ireturn; iconst_0; ireturn
        let code: Vec<u8> = vec![
            0x03, 0x3c, 0x1b, op::IFEQ, 0x00, 0x05, 0x04, 0xac, 0x03, 0xac,
        ];
        let insns = decode(&code).unwrap();
        assert_eq!(insns.len(), 8);
        assert_eq!(insns[3].payload, Payload::Branch(6));
        let (encoded, offsets) = encode(&insns).unwrap();
        assert_eq!(encoded, code);
        assert_eq!(offsets[3], 3);
    }

    #[test]
    fn decode_rejects_bogus_targets() {
        // ifeq pointing into the middle of the following sipush
        let code: Vec<u8> = vec![op::IFEQ, 0x00, 0x04, op::SIPUSH, 0x00, 0x07];
        assert!(matches!(
            decode(&code),
            Err(ReadError::BadBranchTarget { target: 4 })
        ));
    }

    #[test]
    fn tableswitch_round_trip() {
        // iconst_0 at 0, switch at offset 1 (needs 2 bytes of padding);
        // operands run through offset 19, return sits at 20, so both the
        // default and the single case target encode as +19
        let mut code: Vec<u8> = vec![0x03, op::TABLESWITCH, 0, 0];
        code.extend_from_slice(&19i32.to_be_bytes());
        code.extend_from_slice(&0i32.to_be_bytes());
        code.extend_from_slice(&0i32.to_be_bytes());
        code.extend_from_slice(&19i32.to_be_bytes());
        code.push(op::RETURN);
        let insns = decode(&code).unwrap();
        assert_eq!(insns.len(), 3);
        assert_eq!(
            insns[1].payload,
            Payload::TableSwitch {
                default: 2,
                low: 0,
                targets: vec![2]
            }
        );
        let (encoded, _) = encode(&insns).unwrap();
        assert_eq!(encoded, code);
    }

    #[test]
    fn inlines_single_level_subroutine() {
        use crate::classfile::attribute::CodeAttribute;

        // 0: jsr +4 (-> 4)    3: return
        // 4: astore_1         5: ret 1
        let code_bytes: Vec<u8> = vec![op::JSR, 0x00, 0x04, op::RETURN, 0x4c, op::RET, 0x01];
        let mut code = CodeAttribute {
            max_stack: 1,
            max_locals: 2,
            code: code_bytes,
            exception_table: vec![],
            attributes: vec![],
        };
        inline_code_subroutines(&mut code).unwrap();

        let insns = decode(&code.code).unwrap();
        let ops: Vec<u8> = insns.iter().map(|i| i.op).collect();
        // aconst_null; astore_1; goto (-> return); return
        assert_eq!(ops, vec![op::ACONST_NULL, 0x4c, op::GOTO, op::RETURN]);
        assert_eq!(insns[2].payload, Payload::Branch(3));
        assert!(!code.code.contains(&op::JSR));
    }

    #[test]
    fn code_without_subroutines_is_untouched() {
        let code_bytes: Vec<u8> = vec![0x03, 0xac];
        let mut code = CodeAttribute {
            max_stack: 1,
            max_locals: 1,
            code: code_bytes.clone(),
            exception_table: vec![],
            attributes: vec![],
        };
        inline_code_subroutines(&mut code).unwrap();
        assert_eq!(code.code, code_bytes);
    }
}
