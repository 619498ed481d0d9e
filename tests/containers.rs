//! Container round-trips over synthetic class files.
//!
//! The classes are assembled by hand (no compiler in the loop): a small
//! static method with one branch, shipped deliberately without stack-map
//! frames so the load path has to regenerate them.

use classflow::classfile::{
    Attribute, AttributeInfo, ClassFile, CodeAttribute, ConstantPool, Flags, MemberInfo,
    StackMapFrame, VerificationType, Version,
};
use classflow::container::{
    ClassRegistry, Container, DirectoryContainer, FileContainer, JarContainer, Package,
};
use std::fs;
use std::io::Write;
use std::path::Path;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// `static int max(int, int)` with an `if_icmpge` branch and no frames
fn sample_class(name: &str) -> ClassFile {
    let mut pool = ConstantPool::new();
    let this_class = pool.ensure_class(name);
    let super_class = pool.ensure_class("java/lang/Object");
    let method_name = pool.ensure_utf8("max");
    let descriptor = pool.ensure_utf8("(II)I");
    let code_name = pool.ensure_utf8("Code");

    // 0: iload_0; 1: iload_1; 2: if_icmpge -> 7; 5: iload_1; 6: ireturn;
    // 7: iload_0; 8: ireturn
    let code = vec![0x1a, 0x1b, 0xa1, 0x00, 0x05, 0x1b, 0xac, 0x1a, 0xac];

    ClassFile {
        version: Version::JAVA8,
        constants: pool,
        access_flags: 0x0021, // public super
        this_class,
        super_class,
        interfaces: vec![],
        fields: vec![],
        methods: vec![MemberInfo {
            access_flags: 0x0009, // public static
            name_index: method_name,
            descriptor_index: descriptor,
            attributes: vec![Attribute {
                name_index: code_name,
                info: AttributeInfo::Code(CodeAttribute {
                    max_stack: 2,
                    max_locals: 2,
                    code,
                    exception_table: vec![],
                    attributes: vec![],
                }),
            }],
        }],
        attributes: vec![],
    }
}

/// `void nop()` in a class outside the namespace filter
fn other_class(name: &str) -> ClassFile {
    let mut pool = ConstantPool::new();
    let this_class = pool.ensure_class(name);
    let super_class = pool.ensure_class("java/lang/Object");
    let method_name = pool.ensure_utf8("nop");
    let descriptor = pool.ensure_utf8("()V");
    let code_name = pool.ensure_utf8("Code");

    ClassFile {
        version: Version::JAVA8,
        constants: pool,
        access_flags: 0x0021,
        this_class,
        super_class,
        interfaces: vec![],
        fields: vec![],
        methods: vec![MemberInfo {
            access_flags: 0x0001,
            name_index: method_name,
            descriptor_index: descriptor,
            attributes: vec![Attribute {
                name_index: code_name,
                info: AttributeInfo::Code(CodeAttribute {
                    max_stack: 0,
                    max_locals: 1,
                    code: vec![0xb1], // return
                    exception_table: vec![],
                    attributes: vec![],
                }),
            }],
        }],
        attributes: vec![],
    }
}

fn write_class_file(dir: &Path, class: &ClassFile) -> std::path::PathBuf {
    let name = class.name().unwrap().to_owned();
    let path = dir.join(format!("{}.class", name));
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, class.to_bytes().unwrap()).unwrap();
    path
}

#[test]
fn read_path_recomputes_missing_frames() {
    init_logs();
    let dir = tempfile::tempdir().unwrap();
    let class = sample_class("org/example/Sample");
    assert!(!class.has_frame_info());
    write_class_file(dir.path(), &class);

    let container = DirectoryContainer::new(dir.path(), Package::parse("org.example.*"));
    let classes = container.parse(Flags::READ_ALL).unwrap();
    let loaded = &classes["org/example/Sample"];
    assert!(loaded.has_frame_info());

    // The branch target at offset 7 gets a full frame: two int locals,
    // empty stack
    let frames = loaded.methods[0].code().unwrap().stack_map_table().unwrap();
    assert_eq!(
        frames,
        &[StackMapFrame::Full {
            offset_delta: 7,
            locals: vec![VerificationType::Integer, VerificationType::Integer],
            stack: vec![],
        }]
    );
}

#[test]
fn container_round_trip_preserves_method_bodies() {
    init_logs();
    let source_dir = tempfile::tempdir().unwrap();
    let target_dir = tempfile::tempdir().unwrap();
    let original = sample_class("org/example/Sample");
    write_class_file(source_dir.path(), &original);

    let package = Package::parse("org.example.*");
    let container = DirectoryContainer::new(source_dir.path(), package.clone());
    let mut registry = ClassRegistry::new(package.clone());
    registry.initialize(&container, Flags::READ_ALL).unwrap();

    let updated = container.update(&registry, target_dir.path()).unwrap();
    let reread = updated.parse(Flags::READ_ALL).unwrap();
    let class = &reread["org/example/Sample"];

    assert!(class.has_frame_info());
    // Frames were added; the instruction stream itself is untouched
    assert_eq!(
        class.methods[0].code().unwrap().code,
        original.methods[0].code().unwrap().code,
    );
}

#[test]
fn file_container_parses_a_single_class() {
    init_logs();
    let dir = tempfile::tempdir().unwrap();
    let class = sample_class("org/example/Sample");
    let path = write_class_file(dir.path(), &class);

    let container = FileContainer::new(&path, Package::parse("org.example.*"));
    let classes = container.parse(Flags::READ_ALL).unwrap();
    assert_eq!(classes.len(), 1);
    assert!(classes.contains_key("org/example/Sample"));

    // The same file against a disjoint namespace filter yields nothing
    let filtered = FileContainer::new(&path, Package::parse("com.other.*"));
    assert!(filtered.parse(Flags::READ_ALL).unwrap().is_empty());
}

#[test]
fn jar_update_writes_transformed_and_copied_entries() {
    init_logs();
    let dir = tempfile::tempdir().unwrap();
    let jar_path = dir.path().join("app.jar");

    let inside = sample_class("org/example/Sample");
    let outside = other_class("com/other/Thing");
    let outside_bytes = outside.to_bytes().unwrap();
    {
        let file = fs::File::create(&jar_path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        writer
            .start_file("org/example/Sample.class", options)
            .unwrap();
        writer.write_all(&inside.to_bytes().unwrap()).unwrap();
        writer
            .start_file("com/other/Thing.class", options)
            .unwrap();
        writer.write_all(&outside_bytes).unwrap();
        writer.finish().unwrap();
    }

    let package = Package::parse("org.example.*");
    let container = JarContainer::new(&jar_path, package.clone());
    let parsed = container.parse(Flags::READ_ALL).unwrap();
    assert_eq!(parsed.len(), 1, "filter admits only org/example classes");

    let mut registry = ClassRegistry::new(package);
    registry.initialize(&container, Flags::READ_ALL).unwrap();

    let target = tempfile::tempdir().unwrap();
    let updated = container.update(&registry, target.path()).unwrap();

    // Transformed class landed with frames; the outside class is an exact
    // byte copy
    let transformed =
        fs::read(target.path().join("org/example/Sample.class")).unwrap();
    let transformed = ClassFile::parse(&transformed, Flags::READ_ALL).unwrap();
    assert!(transformed.has_frame_info());

    let copied = fs::read(target.path().join("com/other/Thing.class")).unwrap();
    assert_eq!(copied, outside_bytes);

    // The updated container covers the transformed tree
    let reread = updated.parse(Flags::READ_ALL).unwrap();
    assert!(reread.contains_key("org/example/Sample"));
}

#[test]
fn unreadable_entries_are_skipped_unless_fail_fast() {
    init_logs();
    let dir = tempfile::tempdir().unwrap();
    write_class_file(dir.path(), &sample_class("org/example/Sample"));
    fs::write(dir.path().join("Broken.class"), b"\xCA\xFE\xBA\xBEgarbage").unwrap();

    let package = Package::parse("*");
    let tolerant = DirectoryContainer::new(dir.path(), package.clone());
    let classes = tolerant.parse(Flags::READ_ALL).unwrap();
    assert_eq!(classes.len(), 1);

    let strict = DirectoryContainer::new(dir.path(), package).fail_fast(true);
    assert!(strict.parse(Flags::READ_ALL).is_err());
}

#[test]
fn skip_frames_drops_stack_maps_on_read() {
    init_logs();
    let dir = tempfile::tempdir().unwrap();
    let class = sample_class("org/example/Sample");
    let path = write_class_file(dir.path(), &class);

    // First load adds frames; write that form out verbatim
    let container = FileContainer::new(&path, Package::parse("org.example.*"));
    let with_frames = container
        .parse(Flags::READ_ALL)
        .unwrap()
        .remove("org/example/Sample")
        .unwrap();
    assert!(with_frames.has_frame_info());
    fs::write(&path, with_frames.to_bytes().unwrap()).unwrap();

    let stripped = ClassFile::parse(&fs::read(&path).unwrap(), Flags::SKIP_FRAMES).unwrap();
    assert!(!stripped.has_frame_info());
}
