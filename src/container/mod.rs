//! Containers: where class bytes live.
//!
//! A container abstracts a source of compiled classes — a single `.class`
//! file, a directory tree, or an archive — scoped to a [`Package`]
//! namespace filter. Containers own no IR: they produce parsed
//! [`ClassFile`] forms on the way in and consume (possibly transformed)
//! ones from a [`ClassRegistry`] on the way out. Classes that arrive
//! without verification-frame metadata get frames recomputed at load time,
//! since several published archives still ship pre-frame bytecode.

mod directory;
mod file;
mod jar;

pub use directory::DirectoryContainer;
pub use file::FileContainer;
pub use jar::JarContainer;

pub use crate::classfile::Flags;

use crate::classfile::{emit_class, ClassFile, ReadError, WriteError};
use crate::hierarchy::{ClassHierarchy, HierarchyArenas};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A namespace filter over fully-qualified class names.
///
/// Accepts both separator conventions (`org.example.*` and
/// `org/example/*`); a trailing `*` widens the filter to subpackages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    path: String,
    expanded: bool,
}

impl Package {
    pub const SEPARATOR: char = '/';
    pub const CANONICAL_SEPARATOR: char = '.';
    pub const EXPANSION: char = '*';

    pub fn parse(pattern: &str) -> Package {
        let canonical = pattern.replace(Self::CANONICAL_SEPARATOR, "/");
        if canonical == "*" {
            return Package::everything();
        }
        match canonical.strip_suffix("/*") {
            Some(prefix) => Package {
                path: prefix.to_owned(),
                expanded: true,
            },
            None => Package {
                path: canonical.trim_end_matches('/').to_owned(),
                expanded: false,
            },
        }
    }

    /// The unbounded filter, `*`
    pub fn everything() -> Package {
        Package {
            path: String::new(),
            expanded: true,
        }
    }

    /// Does the filter contain this fully-qualified class name?
    pub fn is_parent(&self, class_name: &str) -> bool {
        let package = match class_name.rfind(Self::SEPARATOR) {
            Some(index) => &class_name[..index],
            None => "",
        };
        if package == self.path {
            return true;
        }
        self.expanded
            && (self.path.is_empty() || package.starts_with(&format!("{}/", self.path)))
    }
}

impl std::fmt::Display for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.expanded {
            if self.path.is_empty() {
                f.write_str("*")
            } else {
                write!(f, "{}/*", self.path)
            }
        } else {
            f.write_str(&self.path)
        }
    }
}

impl Default for Package {
    fn default() -> Package {
        Package::everything()
    }
}

/// The parsed (and possibly transformed) classes of a program, keyed by
/// qualified name.
///
/// This is the surface the containers consume when unpacking: the registry
/// answers which classes exist, which are *concrete* (inside the namespace
/// filter, hence subject to transformation), and hands out their current
/// external form for serialization.
#[derive(Debug, Default)]
pub struct ClassRegistry {
    package: Package,
    classes: BTreeMap<String, ClassFile>,
}

impl ClassRegistry {
    pub fn new(package: Package) -> ClassRegistry {
        ClassRegistry {
            package,
            classes: BTreeMap::new(),
        }
    }

    pub fn package(&self) -> &Package {
        &self.package
    }

    /// Load every class the container yields
    pub fn initialize(
        &mut self,
        container: &dyn Container,
        flags: Flags,
    ) -> Result<(), ReadError> {
        for (name, class) in container.parse(flags)? {
            self.classes.insert(name, class);
        }
        Ok(())
    }

    /// Register (or replace) a class under its own name
    pub fn insert(&mut self, class: ClassFile) -> Result<(), ReadError> {
        let name = class.name()?.to_owned();
        self.classes.insert(name, class);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ClassFile> {
        self.classes.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ClassFile> {
        self.classes.get_mut(name)
    }

    /// Inside the namespace filter and present in the registry
    pub fn is_concrete(&self, name: &str) -> bool {
        self.package.is_parent(name) && self.classes.contains_key(name)
    }

    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// A source of class bytes scoped to a namespace filter
pub trait Container {
    /// Human-readable identity (usually the backing path)
    fn name(&self) -> &str;

    /// The namespace filter this container is scoped to
    fn package(&self) -> &Package;

    /// Lookup roots for class hierarchy resolution
    fn class_path(&self) -> Vec<PathBuf>;

    /// Parse every class inside the namespace filter.
    ///
    /// Classes lacking frame metadata have their frames recomputed before
    /// being returned. Unreadable entries are skipped with a warning unless
    /// the container was put in fail-fast mode.
    fn parse(&self, flags: Flags) -> Result<BTreeMap<String, ClassFile>, ReadError>;

    /// Write classes out under `target`.
    ///
    /// Concrete classes (inside the filter, present in `registry`) are
    /// serialized from their registry form with frames recomputed; with
    /// `all_classes`, everything else is copied through byte-for-byte.
    fn unpack(
        &self,
        registry: &ClassRegistry,
        target: &Path,
        all_classes: bool,
    ) -> Result<(), WriteError>;

    /// Unpack into `target` and return a container rooted there
    fn update(
        &self,
        registry: &ClassRegistry,
        target: &Path,
    ) -> Result<DirectoryContainer, WriteError>;
}

/// Shared read-path step: parse one entry, recomputing frames if the class
/// arrived without them
fn load_entry(
    bytes: &[u8],
    flags: Flags,
    hierarchy: &ClassHierarchy,
) -> Result<ClassFile, ReadError> {
    let mut class = ClassFile::parse(bytes, flags)?;
    if !flags.contains(Flags::SKIP_FRAMES) && !class.has_frame_info() {
        let name = class.name()?.to_owned();
        log::debug!("recomputing missing frames for `{}`", name);
        // Frame-less classes predate the frame era and may still carry jsr
        // subroutines, which the frame dataflow refuses to see
        crate::classfile::inline_subroutines(&mut class)
            .and_then(|()| crate::classfile::recompute_frames(&mut class, hierarchy))
            .map_err(|source| ReadError::FrameRecompute {
                class: name,
                source: Box::new(source),
            })?;
    }
    Ok(class)
}

/// Shared write-path step: serialize the registry's form of a concrete
/// class under its qualified name
fn write_concrete_class(
    registry: &ClassRegistry,
    name: &str,
    target: &Path,
    hierarchy: &ClassHierarchy,
) -> Result<(), WriteError> {
    let class = registry
        .get(name)
        .expect("caller checked registry membership");
    let mut class = class.clone();
    let bytes = emit_class(&mut class, Flags::COMPUTE_FRAMES, hierarchy)?;
    let path = target.join(format!("{}.class", name));
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Copy one entry through unchanged
fn copy_through(bytes: &[u8], target: &Path, relative: &str) -> Result<(), WriteError> {
    let path = target.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    Ok(())
}

fn hierarchy_for<'g>(
    arenas: &'g HierarchyArenas,
    container: &dyn Container,
) -> ClassHierarchy<'g> {
    ClassHierarchy::with_lookup_path(arenas, container.class_path())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn package_parsing_accepts_both_separators() {
        assert_eq!(Package::parse("org.example.*"), Package::parse("org/example/*"));
        assert_eq!(Package::parse("*"), Package::everything());
    }

    #[test]
    fn expanded_packages_cover_subpackages() {
        let pkg = Package::parse("org/example/*");
        assert!(pkg.is_parent("org/example/Foo"));
        assert!(pkg.is_parent("org/example/deep/Bar"));
        assert!(!pkg.is_parent("org/other/Baz"));
        assert!(!pkg.is_parent("Toplevel"));
    }

    #[test]
    fn concrete_packages_do_not_cover_subpackages() {
        let pkg = Package::parse("org.example");
        assert!(pkg.is_parent("org/example/Foo"));
        assert!(!pkg.is_parent("org/example/deep/Bar"));
    }

    #[test]
    fn everything_covers_the_default_package() {
        assert!(Package::everything().is_parent("Toplevel"));
        assert!(Package::everything().is_parent("org/example/Foo"));
    }
}
