use crate::classfile::{ClassFile, Flags, ReadError, WriteError};
use crate::container::file::is_class_file;
use crate::container::{
    copy_through, hierarchy_for, load_entry, write_concrete_class, ClassRegistry, Container,
    Package,
};
use crate::hierarchy::HierarchyArenas;
use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// A container over a directory tree of compiled classes
pub struct DirectoryContainer {
    root: PathBuf,
    name: String,
    package: Package,
    fail_fast: bool,
}

impl DirectoryContainer {
    pub fn new(root: impl Into<PathBuf>, package: Package) -> DirectoryContainer {
        let root = root.into();
        DirectoryContainer {
            name: root.display().to_string(),
            root,
            package,
            fail_fast: false,
        }
    }

    /// Propagate entry read failures instead of skipping them
    pub fn fail_fast(mut self, fail_fast: bool) -> DirectoryContainer {
        self.fail_fast = fail_fast;
        self
    }

    /// Every `.class` file under the root, in a stable order
    fn class_files(&self) -> io::Result<Vec<PathBuf>> {
        let mut result = Vec::new();
        let mut queue = VecDeque::from([self.root.clone()]);
        while let Some(current) = queue.pop_front() {
            if current.is_dir() {
                for entry in fs::read_dir(&current)? {
                    queue.push_back(entry?.path());
                }
            } else if is_class_file(&current) {
                result.push(current);
            }
        }
        result.sort();
        Ok(result)
    }
}

impl Container for DirectoryContainer {
    fn name(&self) -> &str {
        &self.name
    }

    fn package(&self) -> &Package {
        &self.package
    }

    fn class_path(&self) -> Vec<PathBuf> {
        vec![self.root.clone()]
    }

    fn parse(&self, flags: Flags) -> Result<BTreeMap<String, ClassFile>, ReadError> {
        let arenas = HierarchyArenas::new();
        let hierarchy = hierarchy_for(&arenas, self);

        let mut classes = BTreeMap::new();
        for path in self.class_files()? {
            let bytes = fs::read(&path)?;
            match load_entry(&bytes, flags, &hierarchy) {
                Ok(class) => {
                    let name = class.name()?.to_owned();
                    if self.package.is_parent(&name) {
                        classes.insert(name, class);
                    }
                }
                Err(err) if self.fail_fast => return Err(err),
                Err(err) => {
                    log::warn!("skipping unreadable class `{}`: {}", path.display(), err)
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

        for path in self.class_files().map_err(WriteError::Io)? {
            let bytes = fs::read(&path).map_err(WriteError::Io)?;
            let name =
                ClassFile::parse(&bytes, Flags::READ_ALL).and_then(|c| c.name().map(str::to_owned));
            match name {
                Ok(name) if registry.is_concrete(&name) => {
                    write_concrete_class(registry, &name, target, &hierarchy)?;
                }
                _ if all_classes => {
                    let relative = path
                        .strip_prefix(&self.root)
                        .unwrap_or(&path)
                        .to_string_lossy()
                        .into_owned();
                    copy_through(&bytes, target, &relative)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn update(
        &self,
        registry: &ClassRegistry,
        target: &Path,
    ) -> Result<DirectoryContainer, WriteError> {
        self.unpack(registry, target, false)?;
        Ok(DirectoryContainer::new(target, self.package.clone()))
    }
}
