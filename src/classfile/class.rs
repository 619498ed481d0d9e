use crate::classfile::attribute::{parse_attributes, Attribute, AttributeInfo, CodeAttribute};
use crate::classfile::constants::ConstantPool;
use crate::classfile::serialize::{Deserialize, Serialize};
use crate::classfile::{Flags, MethodAccessFlags, ReadError};
use byteorder::WriteBytesExt;
use std::fs;
use std::io;
use std::io::Read;
use std::path::Path;

/// Class-file version pair
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub minor: u16,
    pub major: u16,
}

impl Version {
    pub const JAVA8: Version = Version { minor: 0, major: 52 };
    pub const JAVA11: Version = Version { minor: 0, major: 55 };
    pub const JAVA17: Version = Version { minor: 0, major: 61 };
}

/// A field or method entry; both share the same binary shape
#[derive(Debug, Clone)]
pub struct MemberInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<Attribute>,
}

impl MemberInfo {
    pub fn name<'p>(&self, pool: &'p ConstantPool) -> Result<&'p str, ReadError> {
        pool.utf8(self.name_index)
    }

    pub fn descriptor<'p>(&self, pool: &'p ConstantPool) -> Result<&'p str, ReadError> {
        pool.utf8(self.descriptor_index)
    }

    pub fn is_static(&self) -> bool {
        MethodAccessFlags::from_bits_truncate(self.access_flags)
            .contains(MethodAccessFlags::STATIC)
    }

    /// The method body, for methods that have one
    pub fn code(&self) -> Option<&CodeAttribute> {
        self.attributes.iter().find_map(|attr| match &attr.info {
            AttributeInfo::Code(code) => Some(code),
            _ => None,
        })
    }

    pub fn code_mut(&mut self) -> Option<&mut CodeAttribute> {
        self.attributes.iter_mut().find_map(|attr| match &mut attr.info {
            AttributeInfo::Code(code) => Some(code),
            _ => None,
        })
    }

    fn parse<R: byteorder::ReadBytesExt>(
        reader: &mut R,
        pool: &ConstantPool,
        flags: Flags,
    ) -> Result<MemberInfo, ReadError> {
        Ok(MemberInfo {
            access_flags: u16::deserialize(reader)?,
            name_index: u16::deserialize(reader)?,
            descriptor_index: u16::deserialize(reader)?,
            attributes: parse_attributes(reader, pool, flags)?,
        })
    }
}

impl Serialize for MemberInfo {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
        self.access_flags.serialize(writer)?;
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

/// Structural representation of the [`class` file format][0].
///
/// This is the external class form the containers produce and consume:
/// everything is parsed far enough to be rewritten (constant pool, members,
/// exception tables, stack maps), while the instruction stream and unknown
/// attributes round-trip as raw bytes.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html
#[derive(Debug, Clone)]
pub struct ClassFile {
    pub version: Version,
    pub constants: ConstantPool,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<MemberInfo>,
    pub methods: Vec<MemberInfo>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Magic header bytes that go at the front of the serialized class file
    pub const MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

    pub fn parse(bytes: &[u8], flags: Flags) -> Result<ClassFile, ReadError> {
        let reader = &mut &bytes[..];
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != Self::MAGIC {
            return Err(ReadError::BadMagic);
        }
        let minor = u16::deserialize(reader)?;
        let major = u16::deserialize(reader)?;
        let constants = ConstantPool::parse(reader)?;
        let access_flags = u16::deserialize(reader)?;
        let this_class = u16::deserialize(reader)?;
        let super_class = u16::deserialize(reader)?;

        let interface_count = u16::deserialize(reader)?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            interfaces.push(u16::deserialize(reader)?);
        }

        let field_count = u16::deserialize(reader)?;
        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            fields.push(MemberInfo::parse(reader, &constants, flags)?);
        }
        let method_count = u16::deserialize(reader)?;
        let mut methods = Vec::with_capacity(method_count as usize);
        for _ in 0..method_count {
            methods.push(MemberInfo::parse(reader, &constants, flags)?);
        }
        let attributes = parse_attributes(reader, &constants, flags)?;

        Ok(ClassFile {
            version: Version { minor, major },
            constants,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    /// Binary name of this class
    pub fn name(&self) -> Result<&str, ReadError> {
        self.constants.class_name(self.this_class)
    }

    /// Binary name of the superclass; `None` only for `java/lang/Object`
    pub fn super_name(&self) -> Result<Option<&str>, ReadError> {
        if self.super_class == 0 {
            Ok(None)
        } else {
            self.constants.class_name(self.super_class).map(Some)
        }
    }

    pub fn interface_names(&self) -> Result<Vec<&str>, ReadError> {
        self.interfaces
            .iter()
            .map(|index| self.constants.class_name(*index))
            .collect()
    }

    pub fn is_interface(&self) -> bool {
        crate::classfile::ClassAccessFlags::from_bits_truncate(self.access_flags)
            .contains(crate::classfile::ClassAccessFlags::INTERFACE)
    }

    /// Whether any method body carries verification-frame metadata.
    ///
    /// Archives built by old compilers ship classes without frames; those
    /// are unusable by the downstream bytecode verifier until frames are
    /// regenerated.
    pub fn has_frame_info(&self) -> bool {
        self.methods.iter().any(|method| {
            method
                .code()
                .map_or(false, |code| code.stack_map_table().is_some())
        })
    }

    /// Serialize without recomputing anything
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let mut bytes = vec![];
        self.serialize(&mut bytes)?;
        Ok(bytes)
    }

    /// Save the class file to disk
    pub fn save_to_path<P: AsRef<Path>>(
        &self,
        path: P,
        create_missing_directories: bool,
    ) -> io::Result<()> {
        let path = path.as_ref();
        if create_missing_directories {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut class_file = fs::File::create(path)?;
        self.serialize(&mut class_file)
    }
}

impl Serialize for ClassFile {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&ClassFile::MAGIC)?;
        self.version.minor.serialize(writer)?;
        self.version.major.serialize(writer)?;
        self.constants.serialize(writer)?;
        self.access_flags.serialize(writer)?;
        self.this_class.serialize(writer)?;
        self.super_class.serialize(writer)?;
        self.interfaces.serialize(writer)?;
        self.fields.serialize(writer)?;
        self.methods.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}
