use crate::classfile::{ClassFile, Flags, ReadError, WriteError};
use crate::container::{
    copy_through, hierarchy_for, load_entry, write_concrete_class, ClassRegistry, Container,
    DirectoryContainer, Package,
};
use crate::hierarchy::HierarchyArenas;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// A container over a `.jar`/`.zip` archive of compiled classes.
///
/// The archive handle is opened per operation and closed when the operation
/// returns, failures included; nothing is held across calls.
pub struct JarContainer {
    path: PathBuf,
    name: String,
    package: Package,
    fail_fast: bool,
}

impl JarContainer {
    pub fn new(path: impl Into<PathBuf>, package: Package) -> JarContainer {
        let path = path.into();
        JarContainer {
            name: path.display().to_string(),
            path,
            package,
            fail_fast: false,
        }
    }

    /// Propagate entry read failures instead of skipping them
    pub fn fail_fast(mut self, fail_fast: bool) -> JarContainer {
        self.fail_fast = fail_fast;
        self
    }

    fn open(&self) -> io::Result<ZipArchive<File>> {
        ZipArchive::new(File::open(&self.path)?).map_err(zip_error)
    }
}

fn zip_error(err: zip::result::ZipError) -> io::Error {
    match err {
        zip::result::ZipError::Io(err) => err,
        other => io::Error::new(io::ErrorKind::InvalidData, other),
    }
}

/// One `.class` archive entry: (qualified name, entry path, bytes)
fn class_entries(archive: &mut ZipArchive<File>) -> io::Result<Vec<(String, String, Vec<u8>)>> {
    let mut entries = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(zip_error)?;
        let entry_name = entry.name().to_owned();
        let Some(qualified) = entry_name.strip_suffix(".class") else {
            continue;
        };
        let qualified = qualified.to_owned();
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;
        entries.push((qualified, entry_name, bytes));
    }
    Ok(entries)
}

impl Container for JarContainer {
    fn name(&self) -> &str {
        &self.name
    }

    fn package(&self) -> &Package {
        &self.package
    }

    fn class_path(&self) -> Vec<PathBuf> {
        vec![self.path.clone()]
    }

    fn parse(&self, flags: Flags) -> Result<BTreeMap<String, ClassFile>, ReadError> {
        let arenas = HierarchyArenas::new();
        let hierarchy = hierarchy_for(&arenas, self);

        let mut archive = self.open()?;
        let mut classes = BTreeMap::new();
        for (qualified, entry_name, bytes) in class_entries(&mut archive)? {
            if !self.package.is_parent(&qualified) {
                continue;
            }
            match load_entry(&bytes, flags, &hierarchy) {
                Ok(class) => {
                    classes.insert(class.name()?.to_owned(), class);
                }
                Err(err) if self.fail_fast => return Err(err),
                Err(err) => {
                    log::warn!(
                        "skipping unreadable entry `{}` in {}: {}",
                        entry_name,
                        self.name,
                        err
                    )
                }
            }
        }
        Ok(classes)
    }

    fn unpack(
        &self,
        registry: &ClassRegistry,
        target: &Path,
        all_classes: bool,
    ) -> Result<(), WriteError> {
        let arenas = HierarchyArenas::new();
        let hierarchy = hierarchy_for(&arenas, self);

        let mut archive = self.open().map_err(WriteError::Io)?;
        for (qualified, entry_name, bytes) in
            class_entries(&mut archive).map_err(WriteError::Io)?
        {
            if registry.is_concrete(&qualified) {
                write_concrete_class(registry, &qualified, target, &hierarchy)?;
            } else if all_classes {
                copy_through(&bytes, target, &entry_name)?;
            }
        }
        Ok(())
    }

    /// Unpack the whole archive — transformed classes from the registry,
    /// everything else byte-for-byte — and return the resulting tree
    fn update(
        &self,
        registry: &ClassRegistry,
        target: &Path,
    ) -> Result<DirectoryContainer, WriteError> {
        self.unpack(registry, target, true)?;
        Ok(DirectoryContainer::new(target, self.package.clone()))
    }
}
