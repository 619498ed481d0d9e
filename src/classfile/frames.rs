//! Stack-map frame recomputation.
//!
//! A worklist dataflow over the scanned code stream rebuilds the
//! verification type state at every control-flow join, merging object types
//! through the real class hierarchy (see
//! [`ClassHierarchy::common_superclass`]). The result is re-emitted as a
//! `StackMapTable` of full frames, plus recomputed `max_stack`/`max_locals`.
//!
//! Classes compiled before the frame era ship without this metadata and are
//! unusable by the downstream bytecode verifier until it is regenerated;
//! the containers run this recomputation on such classes at load time.

use crate::classfile::attribute::{
    Attribute, AttributeInfo, CodeAttribute, StackMapFrame, VerificationType,
};
use crate::classfile::class::ClassFile;
use crate::classfile::code::{self, op, Insn, Payload};
use crate::classfile::constants::{ConstantPool, CpEntry};
use crate::classfile::WriteError;
use crate::hierarchy::ClassHierarchy;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

const OBJECT: &str = "java/lang/Object";
const THROWABLE: &str = "java/lang/Throwable";

/// Analysis-time verification type; object types are by name so they can be
/// merged through the hierarchy before being interned into the pool
#[derive(Debug, Clone, PartialEq, Eq)]
enum VType {
    Top,
    Integer,
    Float,
    Long,
    Double,
    Null,
    UninitThis,
    Object(String),
    Uninit(u16),
}

impl VType {
    fn width(&self) -> usize {
        match self {
            VType::Long | VType::Double => 2,
            _ => 1,
        }
    }

    fn from_field_descriptor(desc: &str) -> Result<VType, WriteError> {
        let malformed =
            || WriteError::FrameComputation(format!("malformed field descriptor `{}`", desc));
        match desc.as_bytes().first().ok_or_else(malformed)? {
            b'Z' | b'B' | b'C' | b'S' | b'I' => Ok(VType::Integer),
            b'J' => Ok(VType::Long),
            b'F' => Ok(VType::Float),
            b'D' => Ok(VType::Double),
            b'L' => {
                let name = desc
                    .strip_prefix('L')
                    .and_then(|rest| rest.strip_suffix(';'))
                    .ok_or_else(malformed)?;
                Ok(VType::Object(name.to_owned()))
            }
            b'[' => Ok(VType::Object(desc.to_owned())),
            _ => Err(malformed()),
        }
    }

    fn into_verification_type(
        self,
        pool: &mut ConstantPool,
    ) -> Result<VerificationType, WriteError> {
        Ok(match self {
            VType::Top => VerificationType::Top,
            VType::Integer => VerificationType::Integer,
            VType::Float => VerificationType::Float,
            VType::Long => VerificationType::Long,
            VType::Double => VerificationType::Double,
            VType::Null => VerificationType::Null,
            VType::UninitThis => VerificationType::UninitializedThis,
            VType::Object(name) => VerificationType::Object(pool.ensure_class(&name)),
            VType::Uninit(offset) => VerificationType::Uninitialized(offset),
        })
    }
}

/// Split `(args)ret` into argument and return verification types
fn parse_method_descriptor(desc: &str) -> Result<(Vec<VType>, Option<VType>), WriteError> {
    let malformed =
        || WriteError::FrameComputation(format!("malformed method descriptor `{}`", desc));
    let inner = desc.strip_prefix('(').ok_or_else(malformed)?;
    let close = inner.find(')').ok_or_else(malformed)?;
    let (params, ret) = (&inner[..close], &inner[close + 1..]);

    let mut args = Vec::new();
    let mut rest = params;
    while !rest.is_empty() {
        let len = field_descriptor_length(rest).ok_or_else(malformed)?;
        args.push(VType::from_field_descriptor(&rest[..len])?);
        rest = &rest[len..];
    }
    let ret = match ret {
        "V" => None,
        ret => Some(VType::from_field_descriptor(ret)?),
    };
    Ok((args, ret))
}

fn field_descriptor_length(desc: &str) -> Option<usize> {
    let bytes = desc.as_bytes();
    let mut at = 0;
    while bytes.get(at) == Some(&b'[') {
        at += 1;
    }
    match bytes.get(at)? {
        b'L' => desc[at..].find(';').map(|semi| at + semi + 1),
        b'Z' | b'B' | b'C' | b'S' | b'I' | b'J' | b'F' | b'D' => Some(at + 1),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FrameState {
    locals: Vec<VType>,
    stack: Vec<VType>,
}

impl FrameState {
    fn stack_width(&self) -> usize {
        self.stack.iter().map(VType::width).sum()
    }
}

struct Analysis {
    /// Reached state per instruction index
    states: BTreeMap<usize, FrameState>,
    /// Indices that are branch targets or handler entries
    joins: BTreeSet<usize>,
    max_stack: u16,
    max_locals: u16,
}

/// Regenerate the `StackMapTable` (and maxes) of every method body.
///
/// Merges that need a common supertype resolve through `hierarchy`; classes
/// missing from its lookup path degrade to `java/lang/Object` rather than
/// failing the write.
pub fn recompute_frames(
    class: &mut ClassFile,
    hierarchy: &ClassHierarchy,
) -> Result<(), WriteError> {
    rewrite_methods(class, hierarchy, true)
}

/// Recompute only `max_stack`/`max_locals`, leaving frames untouched
pub fn recompute_maxs(class: &mut ClassFile, hierarchy: &ClassHierarchy) -> Result<(), WriteError> {
    rewrite_methods(class, hierarchy, false)
}

fn rewrite_methods(
    class: &mut ClassFile,
    hierarchy: &ClassHierarchy,
    emit_frames: bool,
) -> Result<(), WriteError> {
    let class_name = class
        .name()
        .map_err(|_| WriteError::FrameComputation(String::from("class has no resolvable name")))?
        .to_owned();

    let pool = &mut class.constants;
    for method in &mut class.methods {
        let name = pool
            .utf8(method.name_index)
            .map_err(WriteError::Malformed)?
            .to_owned();
        let descriptor = pool
            .utf8(method.descriptor_index)
            .map_err(WriteError::Malformed)?
            .to_owned();
        let is_static = method.is_static();

        let Some(code) = method.attributes.iter_mut().find_map(|attr| match &mut attr.info {
            AttributeInfo::Code(code) => Some(code),
            _ => None,
        }) else {
            continue;
        };

        let analysis = analyze(&name, &descriptor, is_static, &class_name, code, pool, hierarchy)?;
        code.max_stack = analysis.max_stack;
        code.max_locals = analysis.max_locals;

        if emit_frames {
            let insns = code::decode(&code.code).map_err(WriteError::Malformed)?;
            let frames = emit_frame_table(&analysis, &insns, pool)?;
            code.remove_stack_map_table();
            code.attributes.push(Attribute {
                name_index: pool.ensure_utf8(Attribute::STACK_MAP_TABLE),
                info: AttributeInfo::StackMapTable(frames),
            });
        }
    }
    Ok(())
}

fn emit_frame_table(
    analysis: &Analysis,
    insns: &[Insn],
    pool: &mut ConstantPool,
) -> Result<Vec<StackMapFrame>, WriteError> {
    let mut frames = Vec::new();
    let mut previous_offset: i64 = -1;
    for index in &analysis.joins {
        let Some(state) = analysis.states.get(index) else {
            // Unreached join target (dead code); no frame to describe
            continue;
        };
        let offset = insns[*index].offset as i64;
        let offset_delta = (offset - previous_offset - 1) as u16;
        previous_offset = offset;

        // Wide locals carry a Top filler slot in the analysis state that the
        // encoded frame omits; trailing Tops are chopped entirely
        let mut locals = Vec::new();
        let mut slot = 0;
        while slot < state.locals.len() {
            let local = &state.locals[slot];
            slot += local.width();
            locals.push(local.clone());
        }
        while matches!(locals.last(), Some(VType::Top)) {
            locals.pop();
        }

        let locals = locals
            .into_iter()
            .map(|v| v.into_verification_type(pool))
            .collect::<Result<Vec<_>, _>>()?;
        let stack = state
            .stack
            .iter()
            .cloned()
            .map(|v| v.into_verification_type(pool))
            .collect::<Result<Vec<_>, _>>()?;
        frames.push(StackMapFrame::Full {
            offset_delta,
            locals,
            stack,
        });
    }
    Ok(frames)
}

fn analyze(
    method_name: &str,
    descriptor: &str,
    is_static: bool,
    class_name: &str,
    code: &CodeAttribute,
    pool: &ConstantPool,
    hierarchy: &ClassHierarchy,
) -> Result<Analysis, WriteError> {
    let insns = code::decode(&code.code).map_err(WriteError::Malformed)?;
    let (args, _) = parse_method_descriptor(descriptor)?;

    let mut initial = FrameState {
        locals: Vec::new(),
        stack: Vec::new(),
    };
    if !is_static {
        initial.locals.push(if method_name == "<init>" && class_name != OBJECT {
            VType::UninitThis
        } else {
            VType::Object(class_name.to_owned())
        });
    }
    for arg in args {
        let width = arg.width();
        initial.locals.push(arg);
        if width == 2 {
            initial.locals.push(VType::Top);
        }
    }

    if insns.is_empty() {
        let max_locals = initial.locals.len() as u16;
        return Ok(Analysis {
            states: BTreeMap::new(),
            joins: BTreeSet::new(),
            max_stack: 0,
            max_locals: max_locals.max(code.max_locals),
        });
    }

    let offset_of: Vec<u16> = insns.iter().map(|insn| insn.offset).collect();
    let index_of_offset: HashMap<u16, usize> = offset_of
        .iter()
        .enumerate()
        .map(|(index, offset)| (*offset, index))
        .collect();

    // Classes instantiated by each `new`, for resolving uninitialized types
    // once their `<init>` runs
    let mut new_classes: HashMap<u16, String> = HashMap::new();
    for insn in &insns {
        if insn.op == op::NEW {
            let index = insn.operand_u16().ok_or_else(truncated)?;
            let name = pool.class_name(index).map_err(WriteError::Malformed)?;
            new_classes.insert(insn.offset, name.to_owned());
        }
    }

    let mut joins: BTreeSet<usize> = BTreeSet::new();
    for insn in &insns {
        joins.extend(insn.branch_targets());
    }
    for handler in &code.exception_table {
        let index = index_of_offset.get(&handler.handler_pc).ok_or_else(|| {
            WriteError::FrameComputation(String::from("handler entry off instruction boundary"))
        })?;
        joins.insert(*index);
    }

    let ctx = ExecCtx {
        pool,
        class_name,
        new_classes,
    };

    let mut states: BTreeMap<usize, FrameState> = BTreeMap::new();
    let mut max_stack = initial.stack_width();
    let mut max_locals = initial.locals.len().max(code.max_locals as usize);
    states.insert(0, initial);

    let mut worklist: VecDeque<usize> = VecDeque::from([0]);
    let mut queued: BTreeSet<usize> = BTreeSet::from([0]);
    let mut iterations = 0usize;
    while let Some(index) = worklist.pop_front() {
        queued.remove(&index);
        iterations += 1;
        if iterations > 100_000 {
            return Err(WriteError::FrameComputation(String::from(
                "frame analysis exceeded its iteration limit",
            )));
        }

        let insn = &insns[index];
        let in_state = states
            .get(&index)
            .ok_or_else(|| WriteError::FrameComputation(format!("no state at {}", index)))?
            .clone();

        // Exception edges use the pre-instruction locals with a one-item stack
        for handler in code
            .exception_table
            .iter()
            .filter(|handler| handler.covers(insn.offset))
        {
            let caught = if handler.catch_type == 0 {
                THROWABLE.to_owned()
            } else {
                ctx.pool
                    .class_name(handler.catch_type)
                    .map_err(WriteError::Malformed)?
                    .to_owned()
            };
            let handler_state = FrameState {
                locals: in_state.locals.clone(),
                stack: vec![VType::Object(caught)],
            };
            let target = index_of_offset[&handler.handler_pc];
            propagate(
                &mut states,
                &mut worklist,
                &mut queued,
                target,
                handler_state,
                hierarchy,
            )?;
        }

        let mut out_state = in_state;
        execute(insn, &mut out_state, &ctx)?;
        max_stack = max_stack.max(out_state.stack_width());
        max_locals = max_locals.max(out_state.locals.len());

        let mut successors = insn.branch_targets();
        if insn.falls_through() {
            let next = index + 1;
            if next >= insns.len() {
                return Err(WriteError::FrameComputation(String::from(
                    "execution falls off the end of the code array",
                )));
            }
            successors.push(next);
        }
        for successor in successors {
            propagate(
                &mut states,
                &mut worklist,
                &mut queued,
                successor,
                out_state.clone(),
                hierarchy,
            )?;
        }
    }

    Ok(Analysis {
        states,
        joins,
        max_stack: max_stack as u16,
        max_locals: max_locals as u16,
    })
}

fn propagate(
    states: &mut BTreeMap<usize, FrameState>,
    worklist: &mut VecDeque<usize>,
    queued: &mut BTreeSet<usize>,
    target: usize,
    incoming: FrameState,
    hierarchy: &ClassHierarchy,
) -> Result<(), WriteError> {
    let merged = match states.get(&target) {
        None => incoming,
        Some(existing) => match merge_states(existing, &incoming, hierarchy)? {
            None => return Ok(()),
            Some(merged) => merged,
        },
    };
    states.insert(target, merged);
    if queued.insert(target) {
        worklist.push_back(target);
    }
    Ok(())
}

/// Merge an incoming state into an existing one; `None` means no change
fn merge_states(
    existing: &FrameState,
    incoming: &FrameState,
    hierarchy: &ClassHierarchy,
) -> Result<Option<FrameState>, WriteError> {
    if existing.stack.len() != incoming.stack.len() {
        return Err(WriteError::FrameComputation(String::from(
            "inconsistent stack depth at control-flow join",
        )));
    }
    let local_count = existing.locals.len().max(incoming.locals.len());
    let mut locals = Vec::with_capacity(local_count);
    for slot in 0..local_count {
        let a = existing.locals.get(slot).unwrap_or(&VType::Top);
        let b = incoming.locals.get(slot).unwrap_or(&VType::Top);
        locals.push(merge_types(a, b, hierarchy));
    }
    let stack = existing
        .stack
        .iter()
        .zip(&incoming.stack)
        .map(|(a, b)| merge_types(a, b, hierarchy))
        .collect();

    let merged = FrameState { locals, stack };
    Ok((&merged != existing).then_some(merged))
}

fn merge_types(a: &VType, b: &VType, hierarchy: &ClassHierarchy) -> VType {
    if a == b {
        return a.clone();
    }
    match (a, b) {
        (VType::Null, VType::Object(name)) | (VType::Object(name), VType::Null) => {
            VType::Object(name.clone())
        }
        (VType::Object(left), VType::Object(right)) => {
            // Array types only ever join at the root; class pairs resolve
            // through the hierarchy
            if left.starts_with('[') || right.starts_with('[') {
                VType::Object(OBJECT.to_owned())
            } else {
                VType::Object(hierarchy.common_superclass(left, right))
            }
        }
        _ => VType::Top,
    }
}

struct ExecCtx<'a> {
    pool: &'a ConstantPool,
    class_name: &'a str,
    new_classes: HashMap<u16, String>,
}

fn truncated() -> WriteError {
    WriteError::FrameComputation(String::from("instruction operands are truncated"))
}

fn underflow() -> WriteError {
    WriteError::FrameComputation(String::from("operand stack underflow"))
}

fn pop(state: &mut FrameState) -> Result<VType, WriteError> {
    state.stack.pop().ok_or_else(underflow)
}

fn local_get(state: &FrameState, index: usize) -> VType {
    state.locals.get(index).cloned().unwrap_or(VType::Top)
}

fn local_set(state: &mut FrameState, index: usize, value: VType) {
    let width = value.width();
    if state.locals.len() < index + width {
        state.locals.resize(index + width, VType::Top);
    }
    // Overwriting the second half of a wide value kills its first half
    if index > 0 && state.locals[index - 1].width() == 2 {
        state.locals[index - 1] = VType::Top;
    }
    state.locals[index] = value;
    if width == 2 {
        state.locals[index + 1] = VType::Top;
    }
}

/// Duplicate the top `dup_width` of the stack, inserting the copy below the
/// next `skip_width` of entries (the generic shape behind the `dup` family)
fn dup_under(state: &mut FrameState, dup_width: usize, skip_width: usize) -> Result<(), WriteError> {
    let mut top = Vec::new();
    let mut width = 0;
    while width < dup_width {
        let value = pop(state)?;
        width += value.width();
        top.push(value);
    }
    let mut skipped = Vec::new();
    let mut width = 0;
    while width < skip_width {
        let value = pop(state)?;
        width += value.width();
        skipped.push(value);
    }
    for value in top.iter().rev() {
        state.stack.push(value.clone());
    }
    for value in skipped.into_iter().rev() {
        state.stack.push(value);
    }
    for value in top.into_iter().rev() {
        state.stack.push(value);
    }
    Ok(())
}

fn field_type(ctx: &ExecCtx, cp_index: u16) -> Result<VType, WriteError> {
    let name_and_type = match ctx.pool.get(cp_index).map_err(WriteError::Malformed)? {
        CpEntry::FieldRef { name_and_type, .. } => *name_and_type,
        _ => {
            return Err(WriteError::FrameComputation(format!(
                "constant {} is not a field reference",
                cp_index
            )))
        }
    };
    let descriptor = ctx
        .pool
        .member_descriptor(name_and_type)
        .map_err(WriteError::Malformed)?;
    VType::from_field_descriptor(descriptor)
}

fn method_io(ctx: &ExecCtx, cp_index: u16) -> Result<(Vec<VType>, Option<VType>, String), WriteError> {
    let name_and_type = match ctx.pool.get(cp_index).map_err(WriteError::Malformed)? {
        CpEntry::MethodRef { name_and_type, .. }
        | CpEntry::InterfaceMethodRef { name_and_type, .. }
        | CpEntry::InvokeDynamic { name_and_type, .. }
        | CpEntry::Dynamic { name_and_type, .. } => *name_and_type,
        _ => {
            return Err(WriteError::FrameComputation(format!(
                "constant {} is not a method reference",
                cp_index
            )))
        }
    };
    let descriptor = ctx
        .pool
        .member_descriptor(name_and_type)
        .map_err(WriteError::Malformed)?;
    let name = ctx
        .pool
        .member_name(name_and_type)
        .map_err(WriteError::Malformed)?;
    let (args, ret) = parse_method_descriptor(descriptor)?;
    Ok((args, ret, name.to_owned()))
}

fn array_element(array: &VType) -> VType {
    match array {
        VType::Null => VType::Null,
        VType::Object(desc) if desc.starts_with('[') => {
            let element = &desc[1..];
            VType::from_field_descriptor(element)
                .unwrap_or_else(|_| VType::Object(OBJECT.to_owned()))
        }
        _ => VType::Object(OBJECT.to_owned()),
    }
}

fn execute(insn: &Insn, state: &mut FrameState, ctx: &ExecCtx) -> Result<(), WriteError> {
    let bytes: &[u8] = match &insn.payload {
        Payload::Bytes(bytes) => bytes,
        _ => &[],
    };
    match insn.op {
        0x00 => {}
        op::ACONST_NULL => state.stack.push(VType::Null),
        0x02..=0x08 => state.stack.push(VType::Integer),
        0x09..=0x0a => state.stack.push(VType::Long),
        0x0b..=0x0d => state.stack.push(VType::Float),
        0x0e..=0x0f => state.stack.push(VType::Double),
        op::BIPUSH | op::SIPUSH => state.stack.push(VType::Integer),

        op::LDC | op::LDC_W | op::LDC2_W => {
            let index = if insn.op == op::LDC {
                *bytes.first().ok_or_else(truncated)? as u16
            } else {
                insn.operand_u16().ok_or_else(truncated)?
            };
            let loaded = match ctx.pool.get(index).map_err(WriteError::Malformed)? {
                CpEntry::Integer(_) => VType::Integer,
                CpEntry::Float(_) => VType::Float,
                CpEntry::Long(_) => VType::Long,
                CpEntry::Double(_) => VType::Double,
                CpEntry::Str { .. } => VType::Object(String::from("java/lang/String")),
                CpEntry::Class { .. } => VType::Object(String::from("java/lang/Class")),
                CpEntry::MethodHandle { .. } => {
                    VType::Object(String::from("java/lang/invoke/MethodHandle"))
                }
                CpEntry::MethodType { .. } => {
                    VType::Object(String::from("java/lang/invoke/MethodType"))
                }
                CpEntry::Dynamic { name_and_type, .. } => {
                    let descriptor = ctx
                        .pool
                        .member_descriptor(*name_and_type)
                        .map_err(WriteError::Malformed)?;
                    VType::from_field_descriptor(descriptor)?
                }
                entry => {
                    return Err(WriteError::FrameComputation(format!(
                        "constant {:?} is not loadable",
                        entry
                    )))
                }
            };
            state.stack.push(loaded);
        }

        // Typed loads push their family; reference loads surface the local
        op::ILOAD => state.stack.push(VType::Integer),
        0x16 => state.stack.push(VType::Long),
        0x17 => state.stack.push(VType::Float),
        0x18 => state.stack.push(VType::Double),
        op::ALOAD => {
            let index = *bytes.first().ok_or_else(truncated)? as usize;
            let local = local_get(state, index);
            state.stack.push(local);
        }
        0x1a..=0x1d => state.stack.push(VType::Integer),
        0x1e..=0x21 => state.stack.push(VType::Long),
        0x22..=0x25 => state.stack.push(VType::Float),
        0x26..=0x29 => state.stack.push(VType::Double),
        0x2a..=0x2d => {
            let local = local_get(state, (insn.op - 0x2a) as usize);
            state.stack.push(local);
        }

        // Array loads
        0x2e | 0x33 | 0x34 | 0x35 => {
            pop(state)?;
            pop(state)?;
            state.stack.push(VType::Integer);
        }
        0x2f => {
            pop(state)?;
            pop(state)?;
            state.stack.push(VType::Long);
        }
        0x30 => {
            pop(state)?;
            pop(state)?;
            state.stack.push(VType::Float);
        }
        0x31 => {
            pop(state)?;
            pop(state)?;
            state.stack.push(VType::Double);
        }
        0x32 => {
            pop(state)?;
            let array = pop(state)?;
            state.stack.push(array_element(&array));
        }

        // Stores
        op::ISTORE | 0x37 | 0x38 | 0x39 | op::ASTORE => {
            let index = *bytes.first().ok_or_else(truncated)? as usize;
            let value = pop(state)?;
            local_set(state, index, value);
        }
        0x3b..=0x3e => {
            let value = pop(state)?;
            local_set(state, (insn.op - 0x3b) as usize, value);
        }
        0x3f..=0x42 => {
            let value = pop(state)?;
            local_set(state, (insn.op - 0x3f) as usize, value);
        }
        0x43..=0x46 => {
            let value = pop(state)?;
            local_set(state, (insn.op - 0x43) as usize, value);
        }
        0x47..=0x4a => {
            let value = pop(state)?;
            local_set(state, (insn.op - 0x47) as usize, value);
        }
        0x4b..=0x4e => {
            let value = pop(state)?;
            local_set(state, (insn.op - 0x4b) as usize, value);
        }

        // Array stores
        0x4f..=0x56 => {
            pop(state)?;
            pop(state)?;
            pop(state)?;
        }

        0x57 => {
            pop(state)?;
        }
        0x58 => {
            let top = pop(state)?;
            if top.width() == 1 {
                pop(state)?;
            }
        }
        0x59 => dup_under(state, 1, 0)?,
        0x5a => dup_under(state, 1, 1)?,
        0x5b => dup_under(state, 1, 2)?,
        0x5c => dup_under(state, 2, 0)?,
        0x5d => dup_under(state, 2, 1)?,
        0x5e => dup_under(state, 2, 2)?,
        0x5f => {
            let a = pop(state)?;
            let b = pop(state)?;
            state.stack.push(a);
            state.stack.push(b);
        }

        // Arithmetic: the operand family is the low two bits
        0x60..=0x73 => {
            pop(state)?;
            pop(state)?;
            state.stack.push(match (insn.op - 0x60) % 4 {
                0 => VType::Integer,
                1 => VType::Long,
                2 => VType::Float,
                _ => VType::Double,
            });
        }
        0x74..=0x77 => {
            let value = pop(state)?;
            state.stack.push(value);
        }
        0x78..=0x7d => {
            pop(state)?; // shift amount
            pop(state)?;
            state.stack.push(if insn.op % 2 == 0 {
                VType::Integer
            } else {
                VType::Long
            });
        }
        0x7e..=0x83 => {
            pop(state)?;
            pop(state)?;
            state.stack.push(if insn.op % 2 == 0 {
                VType::Integer
            } else {
                VType::Long
            });
        }
        op::IINC => {}

        // Conversions
        0x85..=0x93 => {
            pop(state)?;
            state.stack.push(match insn.op {
                0x85 | 0x8c | 0x8f => VType::Long,
                0x86 | 0x89 | 0x90 => VType::Float,
                0x87 | 0x8a | 0x8d => VType::Double,
                _ => VType::Integer,
            });
        }

        // Comparisons
        0x94..=0x98 => {
            pop(state)?;
            pop(state)?;
            state.stack.push(VType::Integer);
        }

        // Branches
        0x99..=0x9e | op::IFNULL | op::IFNONNULL => {
            pop(state)?;
        }
        0x9f..=0xa6 => {
            pop(state)?;
            pop(state)?;
        }
        op::GOTO | op::GOTO_W => {}
        op::JSR | op::JSR_W | op::RET => {
            return Err(WriteError::UnsupportedBytecode(String::from(
                "jsr/ret must be inlined before frame computation",
            )))
        }
        op::TABLESWITCH | op::LOOKUPSWITCH => {
            pop(state)?;
        }

        0xac..=0xb0 => {
            pop(state)?;
        }
        op::RETURN => {}

        op::GETSTATIC => {
            let index = insn.operand_u16().ok_or_else(truncated)?;
            state.stack.push(field_type(ctx, index)?);
        }
        op::PUTSTATIC => {
            pop(state)?;
        }
        op::GETFIELD => {
            let index = insn.operand_u16().ok_or_else(truncated)?;
            pop(state)?;
            state.stack.push(field_type(ctx, index)?);
        }
        op::PUTFIELD => {
            pop(state)?;
            pop(state)?;
        }

        op::INVOKEVIRTUAL | op::INVOKESPECIAL | op::INVOKESTATIC | op::INVOKEINTERFACE
        | op::INVOKEDYNAMIC => {
            let index = insn.operand_u16().ok_or_else(truncated)?;
            let (args, ret, name) = method_io(ctx, index)?;
            for _ in &args {
                pop(state)?;
            }
            let has_receiver =
                !matches!(insn.op, op::INVOKESTATIC | op::INVOKEDYNAMIC);
            if has_receiver {
                let receiver = pop(state)?;
                if insn.op == op::INVOKESPECIAL && name == "<init>" {
                    let initialized = match &receiver {
                        VType::UninitThis => VType::Object(ctx.class_name.to_owned()),
                        VType::Uninit(offset) => {
                            let class = ctx.new_classes.get(offset).ok_or_else(|| {
                                WriteError::FrameComputation(format!(
                                    "no `new` instruction at offset {}",
                                    offset
                                ))
                            })?;
                            VType::Object(class.clone())
                        }
                        // Calling a superclass constructor on an already
                        // initialized reference (nothing to substitute)
                        _ => receiver.clone(),
                    };
                    for slot in state.locals.iter_mut().chain(state.stack.iter_mut()) {
                        if *slot == receiver {
                            *slot = initialized.clone();
                        }
                    }
                }
            }
            if let Some(ret) = ret {
                state.stack.push(ret);
            }
        }

        op::NEW => {
            state.stack.push(VType::Uninit(insn.offset));
        }
        op::NEWARRAY => {
            pop(state)?;
            let descriptor = match bytes.first().ok_or_else(truncated)? {
                4 => "[Z",
                5 => "[C",
                6 => "[F",
                7 => "[D",
                8 => "[B",
                9 => "[S",
                10 => "[I",
                11 => "[J",
                atype => {
                    return Err(WriteError::FrameComputation(format!(
                        "unknown newarray type {}",
                        atype
                    )))
                }
            };
            state.stack.push(VType::Object(descriptor.to_owned()));
        }
        op::ANEWARRAY => {
            let index = insn.operand_u16().ok_or_else(truncated)?;
            let element = ctx.pool.class_name(index).map_err(WriteError::Malformed)?;
            pop(state)?;
            let descriptor = if element.starts_with('[') {
                format!("[{}", element)
            } else {
                format!("[L{};", element)
            };
            state.stack.push(VType::Object(descriptor));
        }
        0xbe => {
            pop(state)?;
            state.stack.push(VType::Integer);
        }
        op::ATHROW => {
            pop(state)?;
        }
        op::CHECKCAST => {
            let index = insn.operand_u16().ok_or_else(truncated)?;
            let name = ctx.pool.class_name(index).map_err(WriteError::Malformed)?;
            pop(state)?;
            state.stack.push(VType::Object(name.to_owned()));
        }
        op::INSTANCEOF => {
            pop(state)?;
            state.stack.push(VType::Integer);
        }
        0xc2..=0xc3 => {
            pop(state)?;
        }

        op::WIDE => {
            let inner = *bytes.first().ok_or_else(truncated)?;
            let index =
                u16::from_be_bytes([bytes[1], bytes[2]]) as usize;
            match inner {
                op::ILOAD => state.stack.push(VType::Integer),
                0x16 => state.stack.push(VType::Long),
                0x17 => state.stack.push(VType::Float),
                0x18 => state.stack.push(VType::Double),
                op::ALOAD => {
                    let local = local_get(state, index);
                    state.stack.push(local);
                }
                op::ISTORE | 0x37 | 0x38 | 0x39 | op::ASTORE => {
                    let value = pop(state)?;
                    local_set(state, index, value);
                }
                op::IINC => {}
                other => {
                    return Err(WriteError::UnsupportedBytecode(format!(
                        "wide-prefixed opcode 0x{:02x}",
                        other
                    )))
                }
            }
        }
        op::MULTIANEWARRAY => {
            let index = insn.operand_u16().ok_or_else(truncated)?;
            let dims = *bytes.get(2).ok_or_else(truncated)?;
            for _ in 0..dims {
                pop(state)?;
            }
            let name = ctx.pool.class_name(index).map_err(WriteError::Malformed)?;
            state.stack.push(VType::Object(name.to_owned()));
        }

        other => {
            return Err(WriteError::Malformed(crate::classfile::ReadError::BadOpcode {
                opcode: other,
                offset: insn.offset as usize,
            }))
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn descriptor_parsing() {
        let (args, ret) = parse_method_descriptor("(IJLjava/lang/String;[D)V").unwrap();
        assert_eq!(
            args,
            vec![
                VType::Integer,
                VType::Long,
                VType::Object(String::from("java/lang/String")),
                VType::Object(String::from("[D")),
            ]
        );
        assert_eq!(ret, None);

        let (args, ret) = parse_method_descriptor("()[I").unwrap();
        assert!(args.is_empty());
        assert_eq!(ret, Some(VType::Object(String::from("[I"))));
    }

    #[test]
    fn dup_family_shapes() {
        let mut state = FrameState {
            locals: vec![],
            stack: vec![VType::Integer, VType::Float],
        };
        // dup_x1: v2 v1 -> v1 v2 v1
        dup_under(&mut state, 1, 1).unwrap();
        assert_eq!(
            state.stack,
            vec![VType::Float, VType::Integer, VType::Float]
        );

        let mut state = FrameState {
            locals: vec![],
            stack: vec![VType::Long],
        };
        // dup2 duplicates one wide entry
        dup_under(&mut state, 2, 0).unwrap();
        assert_eq!(state.stack, vec![VType::Long, VType::Long]);
    }

    #[test]
    fn wide_local_store_tracks_filler() {
        let mut state = FrameState {
            locals: vec![],
            stack: vec![VType::Long],
        };
        let value = pop(&mut state).unwrap();
        local_set(&mut state, 1, value);
        assert_eq!(state.locals, vec![VType::Top, VType::Long, VType::Top]);

        // Clobbering the second half kills the wide value
        local_set(&mut state, 2, VType::Integer);
        assert_eq!(state.locals, vec![VType::Top, VType::Top, VType::Integer]);
    }
}
