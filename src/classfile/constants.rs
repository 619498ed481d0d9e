use crate::classfile::serialize::{Deserialize, Serialize};
use crate::classfile::ReadError;
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io;

/// One constant-pool entry.
///
/// Indices held by entries point back into the same pool; `Long` and
/// `Double` occupy two slots, with the second slot held by a [`Reserved`]
/// filler so pool indices stay straightforward.
///
/// [`Reserved`]: CpEntry::Reserved
#[derive(Debug, Clone, PartialEq)]
pub enum CpEntry {
    /// Slot 0 and the trailing slot of 8-byte constants
    Reserved,
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class { name: u16 },
    Str { string: u16 },
    FieldRef { class: u16, name_and_type: u16 },
    MethodRef { class: u16, name_and_type: u16 },
    InterfaceMethodRef { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType { descriptor: u16 },
    Dynamic { bootstrap_method: u16, name_and_type: u16 },
    InvokeDynamic { bootstrap_method: u16, name_and_type: u16 },
    Module { name: u16 },
    Package { name: u16 },
}

impl CpEntry {
    fn tag(&self) -> u8 {
        match self {
            CpEntry::Reserved => 0,
            CpEntry::Utf8(_) => 1,
            CpEntry::Integer(_) => 3,
            CpEntry::Float(_) => 4,
            CpEntry::Long(_) => 5,
            CpEntry::Double(_) => 6,
            CpEntry::Class { .. } => 7,
            CpEntry::Str { .. } => 8,
            CpEntry::FieldRef { .. } => 9,
            CpEntry::MethodRef { .. } => 10,
            CpEntry::InterfaceMethodRef { .. } => 11,
            CpEntry::NameAndType { .. } => 12,
            CpEntry::MethodHandle { .. } => 15,
            CpEntry::MethodType { .. } => 16,
            CpEntry::Dynamic { .. } => 17,
            CpEntry::InvokeDynamic { .. } => 18,
            CpEntry::Module { .. } => 19,
            CpEntry::Package { .. } => 20,
        }
    }

    /// `Long`/`Double` take up two pool slots
    fn is_wide(&self) -> bool {
        matches!(self, CpEntry::Long(_) | CpEntry::Double(_))
    }
}

/// The class file's constant pool, 1-indexed like the binary format
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    entries: Vec<CpEntry>,
}

impl ConstantPool {
    pub fn new() -> ConstantPool {
        ConstantPool {
            entries: vec![CpEntry::Reserved],
        }
    }

    /// `constant_pool_count` as written in the class-file header
    pub fn count(&self) -> u16 {
        self.entries.len() as u16
    }

    pub fn get(&self, index: u16) -> Result<&CpEntry, ReadError> {
        match self.entries.get(index as usize) {
            Some(CpEntry::Reserved) | None => Err(ReadError::BadConstantIndex { index }),
            Some(entry) => Ok(entry),
        }
    }

    pub fn utf8(&self, index: u16) -> Result<&str, ReadError> {
        match self.get(index)? {
            CpEntry::Utf8(s) => Ok(s),
            _ => Err(ReadError::BadConstantIndex { index }),
        }
    }

    /// Resolve a `Class` entry to its binary name
    pub fn class_name(&self, index: u16) -> Result<&str, ReadError> {
        match self.get(index)? {
            CpEntry::Class { name } => self.utf8(*name),
            _ => Err(ReadError::BadConstantIndex { index }),
        }
    }

    /// Resolve the descriptor half of the `NameAndType` behind a member ref
    pub fn member_descriptor(&self, name_and_type: u16) -> Result<&str, ReadError> {
        match self.get(name_and_type)? {
            CpEntry::NameAndType { descriptor, .. } => self.utf8(*descriptor),
            _ => Err(ReadError::BadConstantIndex {
                index: name_and_type,
            }),
        }
    }

    /// Resolve the name half of the `NameAndType` behind a member ref
    pub fn member_name(&self, name_and_type: u16) -> Result<&str, ReadError> {
        match self.get(name_and_type)? {
            CpEntry::NameAndType { name, .. } => self.utf8(*name),
            _ => Err(ReadError::BadConstantIndex {
                index: name_and_type,
            }),
        }
    }

    fn push(&mut self, entry: CpEntry) -> u16 {
        let index = self.entries.len() as u16;
        let wide = entry.is_wide();
        self.entries.push(entry);
        if wide {
            self.entries.push(CpEntry::Reserved);
        }
        index
    }

    /// Index of the given UTF-8 constant, inserting it if missing.
    ///
    /// The pool only ever grows by a handful of entries during frame
    /// recomputation, so a linear probe beats carrying dedup maps around.
    pub fn ensure_utf8(&mut self, value: &str) -> u16 {
        for (index, entry) in self.entries.iter().enumerate() {
            if matches!(entry, CpEntry::Utf8(s) if s == value) {
                return index as u16;
            }
        }
        self.push(CpEntry::Utf8(value.to_owned()))
    }

    /// Index of a `Class` entry for the given binary name, inserting if missing
    pub fn ensure_class(&mut self, name: &str) -> u16 {
        for (index, entry) in self.entries.iter().enumerate() {
            if let CpEntry::Class { name: name_index } = entry {
                if self.utf8(*name_index).map_or(false, |s| s == name) {
                    return index as u16;
                }
            }
        }
        let name_index = self.ensure_utf8(name);
        self.push(CpEntry::Class { name: name_index })
    }

    pub fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<ConstantPool, ReadError> {
        let count = u16::deserialize(reader)?;
        let mut entries = vec![CpEntry::Reserved];
        while entries.len() < count as usize {
            let tag = u8::deserialize(reader)?;
            let entry = match tag {
                1 => {
                    let len = u16::deserialize(reader)?;
                    let mut bytes = vec![0u8; len as usize];
                    reader.read_exact(&mut bytes)?;
                    CpEntry::Utf8(String::from_utf8(bytes).map_err(|_| ReadError::MalformedUtf8)?)
                }
                3 => CpEntry::Integer(i32::deserialize(reader)?),
                4 => CpEntry::Float(f32::deserialize(reader)?),
                5 => CpEntry::Long(i64::deserialize(reader)?),
                6 => CpEntry::Double(f64::deserialize(reader)?),
                7 => CpEntry::Class {
                    name: u16::deserialize(reader)?,
                },
                8 => CpEntry::Str {
                    string: u16::deserialize(reader)?,
                },
                9 => CpEntry::FieldRef {
                    class: u16::deserialize(reader)?,
                    name_and_type: u16::deserialize(reader)?,
                },
                10 => CpEntry::MethodRef {
                    class: u16::deserialize(reader)?,
                    name_and_type: u16::deserialize(reader)?,
                },
                11 => CpEntry::InterfaceMethodRef {
                    class: u16::deserialize(reader)?,
                    name_and_type: u16::deserialize(reader)?,
                },
                12 => CpEntry::NameAndType {
                    name: u16::deserialize(reader)?,
                    descriptor: u16::deserialize(reader)?,
                },
                15 => CpEntry::MethodHandle {
                    kind: u8::deserialize(reader)?,
                    reference: u16::deserialize(reader)?,
                },
                16 => CpEntry::MethodType {
                    descriptor: u16::deserialize(reader)?,
                },
                17 => CpEntry::Dynamic {
                    bootstrap_method: u16::deserialize(reader)?,
                    name_and_type: u16::deserialize(reader)?,
                },
                18 => CpEntry::InvokeDynamic {
                    bootstrap_method: u16::deserialize(reader)?,
                    name_and_type: u16::deserialize(reader)?,
                },
                19 => CpEntry::Module {
                    name: u16::deserialize(reader)?,
                },
                20 => CpEntry::Package {
                    name: u16::deserialize(reader)?,
                },
                tag => return Err(ReadError::BadConstantTag { tag }),
            };
            let wide = entry.is_wide();
            entries.push(entry);
            if wide {
                entries.push(CpEntry::Reserved);
            }
        }
        Ok(ConstantPool { entries })
    }
}

impl Serialize for ConstantPool {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
        self.count().serialize(writer)?;
        for entry in &self.entries {
            match entry {
                CpEntry::Reserved => continue,
                entry => entry.tag().serialize(writer)?,
            }
            match entry {
                CpEntry::Reserved => unreachable!(),
                CpEntry::Utf8(s) => {
                    (s.len() as u16).serialize(writer)?;
                    writer.write_all(s.as_bytes())?;
                }
                CpEntry::Integer(v) => v.serialize(writer)?,
                CpEntry::Float(v) => v.serialize(writer)?,
                CpEntry::Long(v) => v.serialize(writer)?,
                CpEntry::Double(v) => v.serialize(writer)?,
                CpEntry::Class { name } => name.serialize(writer)?,
                CpEntry::Str { string } => string.serialize(writer)?,
                CpEntry::FieldRef {
                    class,
                    name_and_type,
                }
                | CpEntry::MethodRef {
                    class,
                    name_and_type,
                }
                | CpEntry::InterfaceMethodRef {
                    class,
                    name_and_type,
                } => {
                    class.serialize(writer)?;
                    name_and_type.serialize(writer)?;
                }
                CpEntry::NameAndType { name, descriptor } => {
                    name.serialize(writer)?;
                    descriptor.serialize(writer)?;
                }
                CpEntry::MethodHandle { kind, reference } => {
                    kind.serialize(writer)?;
                    reference.serialize(writer)?;
                }
                CpEntry::MethodType { descriptor } => descriptor.serialize(writer)?,
                CpEntry::Dynamic {
                    bootstrap_method,
                    name_and_type,
                }
                | CpEntry::InvokeDynamic {
                    bootstrap_method,
                    name_and_type,
                } => {
                    bootstrap_method.serialize(writer)?;
                    name_and_type.serialize(writer)?;
                }
                CpEntry::Module { name } | CpEntry::Package { name } => name.serialize(writer)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn wide_entries_take_two_slots() {
        let mut pool = ConstantPool::new();
        let long_index = pool.push(CpEntry::Long(7));
        let next = pool.ensure_utf8("after");
        assert_eq!(long_index, 1);
        assert_eq!(next, 3);
        assert!(pool.get(2).is_err());
        assert_eq!(pool.get(1).unwrap(), &CpEntry::Long(7));
    }

    #[test]
    fn ensure_is_idempotent() {
        let mut pool = ConstantPool::new();
        let a = pool.ensure_class("java/lang/Object");
        let b = pool.ensure_class("java/lang/Object");
        assert_eq!(a, b);
        let utf8 = pool.ensure_utf8("java/lang/Object");
        assert_eq!(pool.class_name(a).unwrap(), "java/lang/Object");
        assert_eq!(pool.utf8(utf8).unwrap(), "java/lang/Object");
    }

    #[test]
    fn parse_serialize_round_trip() {
        let mut pool = ConstantPool::new();
        pool.push(CpEntry::Utf8(String::from("Hello")));
        pool.push(CpEntry::Integer(-3));
        pool.push(CpEntry::Double(2.5));
        pool.push(CpEntry::Class { name: 1 });

        let mut bytes = vec![];
        pool.serialize(&mut bytes).unwrap();
        let reparsed = ConstantPool::parse(&mut bytes.as_slice()).unwrap();
        let mut bytes_again = vec![];
        reparsed.serialize(&mut bytes_again).unwrap();
        assert_eq!(bytes, bytes_again);
        assert_eq!(reparsed.utf8(1).unwrap(), "Hello");
        assert_eq!(reparsed.class_name(5).unwrap(), "Hello");
    }
}
