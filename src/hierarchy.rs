//! Class hierarchy resolution for frame recomputation.
//!
//! Merging two object types in a stack-map frame needs their lowest common
//! ancestor in the *real* class hierarchy, so this module maintains a lazily
//! populated graph of class metadata: superclass, interfaces, and the
//! interface flag, resolved on demand from a lookup path of directories,
//! archives, and single class files. Entries are interned in an arena and
//! shared by reference, so repeated lookups are cheap and the graph can grow
//! behind a shared reference.
//!
//! Resolution is deliberately best-effort: a class missing from the lookup
//! path (an absent dependency is common when rewriting one archive of a
//! larger application) degrades the answer to `java/lang/Object` instead of
//! failing the write. Frame precision is traded for a writer that keeps
//! working against an incomplete class path.

use crate::classfile::{ConstantPool, Deserialize, ReadError};
use elsa::FrozenMap;
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use typed_arena::Arena;

const OBJECT: &str = "java/lang/Object";

/// A supertype could not be loaded from the lookup path.
///
/// Always recovered internally by falling back to the universal root type;
/// this never crosses the public API.
#[derive(Debug, Error)]
#[error("unable to resolve class `{name}` on the lookup path")]
pub struct ClassResolutionError {
    pub name: String,
}

/// The slice of class metadata hierarchy walks need
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMeta {
    pub name: String,
    pub superclass: Option<String>,
    pub interfaces: Vec<String>,
    pub is_interface: bool,
}

impl ClassMeta {
    pub fn class(name: &str, superclass: &str) -> ClassMeta {
        ClassMeta {
            name: name.to_owned(),
            superclass: Some(superclass.to_owned()),
            interfaces: Vec::new(),
            is_interface: false,
        }
    }

    pub fn interface(name: &str) -> ClassMeta {
        ClassMeta {
            name: name.to_owned(),
            superclass: Some(OBJECT.to_owned()),
            interfaces: Vec::new(),
            is_interface: true,
        }
    }

    fn with_interfaces(mut self, interfaces: &[&str]) -> ClassMeta {
        self.interfaces = interfaces.iter().map(|s| (*s).to_owned()).collect();
        self
    }
}

/// Arena the hierarchy's interned metadata lives in
pub struct HierarchyArenas {
    class_arena: Arena<ClassMeta>,
}

impl HierarchyArenas {
    pub fn new() -> HierarchyArenas {
        HierarchyArenas {
            class_arena: Arena::new(),
        }
    }
}

impl Default for HierarchyArenas {
    fn default() -> Self {
        HierarchyArenas::new()
    }
}

/// Lazily populated class graph over a lookup path.
///
/// Grows behind `&self`: resolution interns new metadata into the arena and
/// the frozen map, so the hierarchy can be shared by the read and write
/// paths of a whole container sweep.
pub struct ClassHierarchy<'g> {
    arenas: &'g HierarchyArenas,
    classes: FrozenMap<String, &'g ClassMeta>,
    lookup_path: Vec<PathBuf>,
}

impl<'g> ClassHierarchy<'g> {
    /// New hierarchy holding only the preloaded core library types
    pub fn new(arenas: &'g HierarchyArenas) -> ClassHierarchy<'g> {
        Self::with_lookup_path(arenas, Vec::new())
    }

    /// New hierarchy resolving unknown classes from the given roots
    /// (directories, archives, or single class files)
    pub fn with_lookup_path(
        arenas: &'g HierarchyArenas,
        lookup_path: Vec<PathBuf>,
    ) -> ClassHierarchy<'g> {
        let hierarchy = ClassHierarchy {
            arenas,
            classes: FrozenMap::new(),
            lookup_path,
        };
        hierarchy.insert_core_library_types();
        hierarchy
    }

    /// Register metadata directly, bypassing the lookup path
    pub fn define(&self, meta: ClassMeta) -> &'g ClassMeta {
        let meta = &*self.arenas.class_arena.alloc(meta);
        self.classes.insert(meta.name.clone(), meta);
        meta
    }

    /// Metadata for the `java/lang` types every hierarchy walk ends up in.
    ///
    /// The JDK itself is rarely on the lookup path, so the skeleton of the
    /// core library is preloaded the same way generated classes preload
    /// their standard library knowledge.
    fn insert_core_library_types(&self) {
        self.define(ClassMeta {
            name: OBJECT.to_owned(),
            superclass: None,
            interfaces: Vec::new(),
            is_interface: false,
        });
        for interface in [
            "java/lang/Cloneable",
            "java/lang/CharSequence",
            "java/lang/Comparable",
            "java/lang/Iterable",
            "java/lang/Runnable",
            "java/io/Serializable",
        ] {
            self.define(ClassMeta::interface(interface));
        }
        self.define(
            ClassMeta::class("java/lang/String", OBJECT)
                .with_interfaces(&["java/lang/CharSequence", "java/io/Serializable"]),
        );
        self.define(ClassMeta::class("java/lang/Class", OBJECT));
        self.define(ClassMeta::class("java/lang/Number", OBJECT));
        for boxed in [
            "java/lang/Integer",
            "java/lang/Long",
            "java/lang/Short",
            "java/lang/Byte",
            "java/lang/Float",
            "java/lang/Double",
        ] {
            self.define(ClassMeta::class(boxed, "java/lang/Number"));
        }
        self.define(ClassMeta::class("java/lang/Boolean", OBJECT));
        self.define(ClassMeta::class("java/lang/Character", OBJECT));
        self.define(ClassMeta::class("java/lang/Throwable", OBJECT));
        self.define(ClassMeta::class("java/lang/Exception", "java/lang/Throwable"));
        self.define(ClassMeta::class("java/lang/Error", "java/lang/Throwable"));
        self.define(ClassMeta::class(
            "java/lang/RuntimeException",
            "java/lang/Exception",
        ));
        self.define(ClassMeta::class(
            "java/lang/IllegalArgumentException",
            "java/lang/RuntimeException",
        ));
        self.define(ClassMeta::class(
            "java/lang/IllegalStateException",
            "java/lang/RuntimeException",
        ));
        self.define(ClassMeta::class("java/lang/StringBuilder", OBJECT));
    }

    fn resolve(&self, name: &str) -> Option<&ClassMeta> {
        if let Some(meta) = self.classes.get(name) {
            return Some(meta);
        }
        for root in &self.lookup_path {
            let Some(bytes) = load_class_bytes(root, name) else {
                continue;
            };
            match parse_class_header(&bytes) {
                Ok(meta) if meta.name == name => return Some(self.define(meta)),
                Ok(meta) => {
                    log::debug!("lookup for `{}` found `{}` instead, ignoring", name, meta.name)
                }
                Err(err) => log::debug!("unreadable class while resolving `{}`: {}", name, err),
            }
        }
        None
    }

    /// Is `sub` assignable to `super_type`, walking superclass and
    /// superinterface edges? Unresolvable classes act as dead ends.
    pub fn is_assignable(&self, sub: &str, super_type: &str) -> bool {
        if sub == super_type {
            return true;
        }
        // When the super type is a class, interface edges cannot reach it
        let super_is_class = self
            .resolve(super_type)
            .map_or(true, |meta| !meta.is_interface);

        let mut to_visit: Vec<String> = vec![sub.to_owned()];
        let mut dont_revisit: HashSet<String> = HashSet::new();
        dont_revisit.insert(sub.to_owned());

        while let Some(current) = to_visit.pop() {
            if current == super_type {
                return true;
            }
            let Some(meta) = self.resolve(&current) else {
                continue;
            };
            if let Some(superclass) = &meta.superclass {
                if dont_revisit.insert(superclass.clone()) {
                    to_visit.push(superclass.clone());
                }
            }
            if !super_is_class {
                for interface in &meta.interfaces {
                    if dont_revisit.insert(interface.clone()) {
                        to_visit.push(interface.clone());
                    }
                }
            }
        }
        false
    }

    /// Lowest common ancestor of two classes in the real hierarchy.
    ///
    /// If one type is assignable to the other, the more general one wins;
    /// interfaces join at the root; otherwise the first type's superclass
    /// chain is walked until it can hold the second. Any resolution failure
    /// degrades to `java/lang/Object` rather than failing the caller.
    pub fn common_superclass(&self, first: &str, second: &str) -> String {
        match self.try_common_superclass(first, second) {
            Ok(name) => name,
            Err(err) => {
                log::debug!("frame merge falls back to {}: {}", OBJECT, err);
                OBJECT.to_owned()
            }
        }
    }

    fn try_common_superclass(
        &self,
        first: &str,
        second: &str,
    ) -> Result<String, ClassResolutionError> {
        if first == second {
            return Ok(first.to_owned());
        }
        let first_meta = self.resolve_or_err(first)?;
        let second_meta = self.resolve_or_err(second)?;

        if self.is_assignable(second, first) {
            return Ok(first.to_owned());
        }
        if self.is_assignable(first, second) {
            return Ok(second.to_owned());
        }
        if first_meta.is_interface || second_meta.is_interface {
            return Ok(OBJECT.to_owned());
        }

        let mut seen = HashSet::new();
        let mut current = first.to_owned();
        loop {
            let meta = self.resolve_or_err(&current)?;
            current = match &meta.superclass {
                Some(superclass) if seen.insert(superclass.clone()) => superclass.clone(),
                _ => return Ok(OBJECT.to_owned()),
            };
            if self.is_assignable(second, &current) {
                return Ok(current);
            }
        }
    }

    fn resolve_or_err(&self, name: &str) -> Result<&ClassMeta, ClassResolutionError> {
        self.resolve(name).ok_or_else(|| ClassResolutionError {
            name: name.to_owned(),
        })
    }
}

/// Fetch raw class bytes for `name` from one lookup root
fn load_class_bytes(root: &Path, name: &str) -> Option<Vec<u8>> {
    let entry_name = format!("{}.class", name);
    if root.is_dir() {
        return std::fs::read(root.join(&entry_name)).ok();
    }
    match root.extension().and_then(|ext| ext.to_str()) {
        Some("jar") | Some("zip") => {
            let mut archive = zip::ZipArchive::new(File::open(root).ok()?).ok()?;
            let mut entry = archive.by_name(&entry_name).ok()?;
            let mut bytes = Vec::with_capacity(entry.size() as usize);
            std::io::copy(&mut entry, &mut bytes).ok()?;
            Some(bytes)
        }
        Some("class") => std::fs::read(root).ok(),
        _ => None,
    }
}

/// Parse just the header of a class file: everything a hierarchy walk needs
/// comes before the field and method tables
fn parse_class_header(bytes: &[u8]) -> Result<ClassMeta, ReadError> {
    use crate::classfile::{ClassAccessFlags, ClassFile};

    let reader = &mut &bytes[..];
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != ClassFile::MAGIC {
        return Err(ReadError::BadMagic);
    }
    let _minor = u16::deserialize(reader)?;
    let _major = u16::deserialize(reader)?;
    let constants = ConstantPool::parse(reader)?;
    let access_flags = u16::deserialize(reader)?;
    let this_class = u16::deserialize(reader)?;
    let super_class = u16::deserialize(reader)?;
    let interface_count = u16::deserialize(reader)?;
    let mut interfaces = Vec::with_capacity(interface_count as usize);
    for _ in 0..interface_count {
        let index = u16::deserialize(reader)?;
        interfaces.push(constants.class_name(index)?.to_owned());
    }

    Ok(ClassMeta {
        name: constants.class_name(this_class)?.to_owned(),
        superclass: if super_class == 0 {
            None
        } else {
            Some(constants.class_name(super_class)?.to_owned())
        },
        interfaces,
        is_interface: ClassAccessFlags::from_bits_truncate(access_flags)
            .contains(ClassAccessFlags::INTERFACE),
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_hierarchy(arenas: &HierarchyArenas) -> ClassHierarchy<'_> {
        let hierarchy = ClassHierarchy::new(arenas);
        hierarchy.define(ClassMeta::class("org/example/Base", OBJECT));
        hierarchy.define(ClassMeta::class("org/example/Left", "org/example/Base"));
        hierarchy.define(ClassMeta::class("org/example/Right", "org/example/Base"));
        hierarchy.define(
            ClassMeta::class("org/example/Leaf", "org/example/Left")
                .with_interfaces(&["java/lang/Runnable"]),
        );
        hierarchy
    }

    #[test]
    fn assignability_walks_superclasses_and_interfaces() {
        let arenas = HierarchyArenas::new();
        let hierarchy = sample_hierarchy(&arenas);

        assert!(hierarchy.is_assignable("org/example/Leaf", "org/example/Base"));
        assert!(hierarchy.is_assignable("org/example/Leaf", "java/lang/Runnable"));
        assert!(hierarchy.is_assignable("org/example/Leaf", OBJECT));
        assert!(!hierarchy.is_assignable("org/example/Base", "org/example/Leaf"));
        assert!(!hierarchy.is_assignable("org/example/Left", "org/example/Right"));
    }

    #[test]
    fn direct_subclass_joins_at_the_superclass() {
        let arenas = HierarchyArenas::new();
        let hierarchy = sample_hierarchy(&arenas);

        assert_eq!(
            hierarchy.common_superclass("org/example/Base", "org/example/Left"),
            "org/example/Base"
        );
        assert_eq!(
            hierarchy.common_superclass("org/example/Left", "org/example/Base"),
            "org/example/Base"
        );
    }

    #[test]
    fn siblings_join_at_their_common_ancestor() {
        let arenas = HierarchyArenas::new();
        let hierarchy = sample_hierarchy(&arenas);

        assert_eq!(
            hierarchy.common_superclass("org/example/Left", "org/example/Right"),
            "org/example/Base"
        );
        assert_eq!(
            hierarchy.common_superclass("org/example/Leaf", "org/example/Right"),
            "org/example/Base"
        );
    }

    #[test]
    fn unrelated_interfaces_join_at_the_root() {
        let arenas = HierarchyArenas::new();
        let hierarchy = ClassHierarchy::new(&arenas);
        assert_eq!(
            hierarchy.common_superclass("java/lang/Runnable", "java/lang/Cloneable"),
            OBJECT
        );
    }

    #[test]
    fn resolution_failure_falls_back_to_the_root() {
        let arenas = HierarchyArenas::new();
        let hierarchy = ClassHierarchy::new(&arenas);
        assert_eq!(
            hierarchy.common_superclass("com/missing/Dependency", "java/lang/String"),
            OBJECT
        );
    }

    #[test]
    fn boxed_numbers_share_the_number_ancestor() {
        let arenas = HierarchyArenas::new();
        let hierarchy = ClassHierarchy::new(&arenas);
        assert_eq!(
            hierarchy.common_superclass("java/lang/Integer", "java/lang/Long"),
            "java/lang/Number"
        );
    }
}
