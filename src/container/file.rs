use crate::classfile::{ClassFile, Flags, ReadError, WriteError};
use crate::container::{
    copy_through, hierarchy_for, load_entry, write_concrete_class, ClassRegistry, Container,
    DirectoryContainer, Package,
};
use crate::hierarchy::HierarchyArenas;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub(crate) fn is_class_file(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "class")
}

/// A container over one compiled `.class` file
pub struct FileContainer {
    path: PathBuf,
    name: String,
    package: Package,
    fail_fast: bool,
}

impl FileContainer {
    pub fn new(path: impl Into<PathBuf>, package: Package) -> FileContainer {
        let path = path.into();
        FileContainer {
            name: path.display().to_string(),
            path,
            package,
            fail_fast: false,
        }
    }

    /// Propagate entry read failures instead of skipping them
    pub fn fail_fast(mut self, fail_fast: bool) -> FileContainer {
        self.fail_fast = fail_fast;
        self
    }
}

impl Container for FileContainer {
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
        let mut classes = BTreeMap::new();
        if !is_class_file(&self.path) {
            return Ok(classes);
        }
        let arenas = HierarchyArenas::new();
        let hierarchy = hierarchy_for(&arenas, self);

        let bytes = fs::read(&self.path)?;
        match load_entry(&bytes, flags, &hierarchy) {
            Ok(class) => {
                let name = class.name()?.to_owned();
                if self.package.is_parent(&name) {
                    classes.insert(name, class);
                }
            }
            Err(err) if self.fail_fast => return Err(err),
            Err(err) => log::warn!("skipping unreadable class `{}`: {}", self.name, err),
        }
        Ok(classes)
    }

    fn unpack(
        &self,
        registry: &ClassRegistry,
        target: &Path,
        all_classes: bool,
    ) -> Result<(), WriteError> {
        if !is_class_file(&self.path) {
            return Ok(());
        }
        let arenas = HierarchyArenas::new();
        let hierarchy = hierarchy_for(&arenas, self);

        let bytes = fs::read(&self.path).map_err(WriteError::Io)?;
        match ClassFile::parse(&bytes, Flags::READ_ALL).and_then(|c| c.name().map(str::to_owned)) {
            Ok(name) if registry.is_concrete(&name) => {
                write_concrete_class(registry, &name, target, &hierarchy)
            }
            _ if all_classes => {
                let file_name = self
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| String::from("unnamed.class"));
                copy_through(&bytes, target, &file_name)
            }
            _ => Ok(()),
        }
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
