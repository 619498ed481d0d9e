use crate::ir::body::MethodBody;
use crate::ir::ty::Type;
use crate::ir::value::Constant;

/// Semantic representation of a method: signature plus the owned block graph
#[derive(Debug)]
pub struct Method {
    pub name: String,
    pub arg_types: Vec<Type>,
    pub return_type: Type,
    /// Raw class-file access flags
    pub access: u16,
    pub body: MethodBody,
}

impl Method {
    pub fn new(name: impl Into<String>, arg_types: Vec<Type>, return_type: Type) -> Method {
        Method {
            name: name.into(),
            arg_types,
            return_type,
            access: 0,
            body: MethodBody::new(),
        }
    }

    /// Render the JVM method descriptor, `(II)J` style
    pub fn descriptor(&self) -> String {
        let mut out = String::from("(");
        for arg in &self.arg_types {
            out.push_str(&arg.descriptor());
        }
        out.push(')');
        out.push_str(&self.return_type.descriptor());
        out
    }
}

/// A field: name, static type, and optional constant initializer
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: Type,
    pub access: u16,
    pub default_value: Option<Constant>,
}

/// Semantic representation of a class: identity within a namespace plus the
/// owned fields, methods, and nested class names.
///
/// Discarding or replacing a class drops its methods and, transitively,
/// every block and instruction they own.
#[derive(Debug)]
pub struct Class {
    /// Fully-qualified binary name, `org/example/Outer$Inner`
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub access: u16,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    /// Binary names of nested classes
    pub inner_classes: Vec<String>,
}

impl Class {
    pub fn new(name: impl Into<String>) -> Class {
        Class {
            name: name.into(),
            super_name: Some(String::from(crate::ir::ty::OBJECT_CLASS)),
            interfaces: Vec::new(),
            access: 0,
            fields: Vec::new(),
            methods: Vec::new(),
            inner_classes: Vec::new(),
        }
    }

    /// Package part of the qualified name (empty for the default package)
    pub fn package(&self) -> &str {
        match self.name.rfind('/') {
            Some(idx) => &self.name[..idx],
            None => "",
        }
    }

    /// Simple name within the package
    pub fn simple_name(&self) -> &str {
        match self.name.rfind('/') {
            Some(idx) => &self.name[idx + 1..],
            None => &self.name,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn descriptor_rendering() {
        let method = Method::new(
            "combine",
            vec![Type::Int, Type::reference("java/lang/String")],
            Type::Long,
        );
        assert_eq!(method.descriptor(), "(ILjava/lang/String;)J");
    }

    #[test]
    fn qualified_name_split() {
        let class = Class::new("org/example/Outer$Inner");
        assert_eq!(class.package(), "org/example");
        assert_eq!(class.simple_name(), "Outer$Inner");

        let unpackaged = Class::new("Root");
        assert_eq!(unpackaged.package(), "");
        assert_eq!(unpackaged.simple_name(), "Root");
    }
}
