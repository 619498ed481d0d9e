use std::fmt;

/// Number of bits in one machine word of the bytecode verifier's type model.
///
/// Integral widening casts are only material once the widths diverge by at
/// least this much (an `int`/`short` mismatch is representable in place, an
/// `int`/`long` mismatch is not).
pub const WORD: u32 = 32;

/// Static type of an IR value.
///
/// This is deliberately the flat JVM-level view: primitives, references by
/// binary name, arrays, and the `null` type. The full subtyping lattice lives
/// in [`crate::hierarchy::ClassHierarchy`]; the IR only needs equality,
/// width queries, and the [`merge_types`] join.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum Type {
    Void,
    Bool,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    /// Class or interface reference, by binary name (`java/lang/String`)
    Reference(String),
    /// Array with the given element type
    Array(Box<Type>),
    /// Type of the `null` constant; assignable to any reference
    Null,
}

impl Type {
    /// The universal reference root, `java/lang/Object`
    pub fn object() -> Type {
        Type::Reference(String::from(OBJECT_CLASS))
    }

    pub fn reference(name: impl Into<String>) -> Type {
        Type::Reference(name.into())
    }

    pub fn array(element: Type) -> Type {
        Type::Array(Box::new(element))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            Type::Bool | Type::Byte | Type::Char | Type::Short | Type::Int | Type::Long
        )
    }

    pub fn is_real(&self) -> bool {
        matches!(self, Type::Float | Type::Double)
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Type::Reference(_) | Type::Array(_) | Type::Null)
    }

    /// Width in bits, for integral and floating types
    pub fn bit_size(&self) -> Option<u32> {
        match self {
            Type::Bool | Type::Byte => Some(8),
            Type::Char | Type::Short => Some(16),
            Type::Int | Type::Float => Some(32),
            Type::Long | Type::Double => Some(64),
            _ => None,
        }
    }

    /// Parse a field descriptor (`I`, `J`, `Ljava/lang/String;`, `[[D`, ...)
    pub fn from_descriptor(desc: &str) -> Option<Type> {
        let mut chars = desc.chars();
        let ty = Self::parse_descriptor(&mut chars)?;
        chars.next().is_none().then(|| ty)
    }

    fn parse_descriptor(chars: &mut std::str::Chars) -> Option<Type> {
        match chars.next()? {
            'V' => Some(Type::Void),
            'Z' => Some(Type::Bool),
            'B' => Some(Type::Byte),
            'C' => Some(Type::Char),
            'S' => Some(Type::Short),
            'I' => Some(Type::Int),
            'J' => Some(Type::Long),
            'F' => Some(Type::Float),
            'D' => Some(Type::Double),
            '[' => Some(Type::array(Self::parse_descriptor(chars)?)),
            'L' => {
                let name: String = chars.take_while(|c| *c != ';').collect();
                if name.is_empty() {
                    None
                } else {
                    Some(Type::Reference(name))
                }
            }
            _ => None,
        }
    }

    /// Render back into descriptor syntax
    pub fn descriptor(&self) -> String {
        let mut out = String::new();
        self.descriptor_to(&mut out);
        out
    }

    fn descriptor_to(&self, out: &mut String) {
        match self {
            Type::Void => out.push('V'),
            Type::Bool => out.push('Z'),
            Type::Byte => out.push('B'),
            Type::Char => out.push('C'),
            Type::Short => out.push('S'),
            Type::Int => out.push('I'),
            Type::Long => out.push('J'),
            Type::Float => out.push('F'),
            Type::Double => out.push('D'),
            Type::Reference(name) => {
                out.push('L');
                out.push_str(name);
                out.push(';');
            }
            Type::Array(elem) => {
                out.push('[');
                elem.descriptor_to(out);
            }
            Type::Null => out.push_str("Lnull;"),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => f.write_str("void"),
            Type::Bool => f.write_str("bool"),
            Type::Byte => f.write_str("byte"),
            Type::Char => f.write_str("char"),
            Type::Short => f.write_str("short"),
            Type::Int => f.write_str("int"),
            Type::Long => f.write_str("long"),
            Type::Float => f.write_str("float"),
            Type::Double => f.write_str("double"),
            Type::Reference(name) => f.write_str(name),
            Type::Array(elem) => write!(f, "{}[]", elem),
            Type::Null => f.write_str("null"),
        }
    }
}

/// Binary name of the universal reference root
pub const OBJECT_CLASS: &str = "java/lang/Object";

/// Join a set of candidate types into their most specific common type.
///
/// This is the merge/widen half of the type system that the return-merging
/// pass needs: integrals widen to the widest candidate (mixed kinds of the
/// same width widen one step further, to `int`), reals widen by width,
/// `null` disappears into any reference, and unequal references collapse to
/// `java/lang/Object`. Returns `None` when the candidates have no common
/// type at all (empty input, `void`, or a primitive/reference mix).
pub fn merge_types<'a>(candidates: impl IntoIterator<Item = &'a Type>) -> Option<Type> {
    let mut merged: Option<Type> = None;
    for ty in candidates {
        merged = Some(match merged {
            None => ty.clone(),
            Some(prev) => merge_pair(&prev, ty)?,
        });
    }
    merged
}

fn merge_pair(a: &Type, b: &Type) -> Option<Type> {
    if a == b {
        return Some(a.clone());
    }
    match (a, b) {
        (Type::Void, _) | (_, Type::Void) => None,

        (a, b) if a.is_integral() && b.is_integral() => {
            let (wa, wb) = (a.bit_size()?, b.bit_size()?);
            if wa > wb {
                Some(a.clone())
            } else if wb > wa {
                Some(b.clone())
            } else {
                // Same width but different kinds (short vs. char, bool vs. byte)
                Some(Type::Int)
            }
        }

        (a, b) if a.is_real() && b.is_real() => {
            Some(if a.bit_size()? >= b.bit_size()? {
                a.clone()
            } else {
                b.clone()
            })
        }

        (Type::Null, other) | (other, Type::Null) if other.is_reference() => Some(other.clone()),

        (Type::Array(ea), Type::Array(eb)) => match merge_pair(ea, eb) {
            Some(elem) if elem.is_reference() => Some(Type::array(elem)),
            _ => Some(Type::object()),
        },

        (a, b) if a.is_reference() && b.is_reference() => Some(Type::object()),

        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn integral_widening() {
        assert_eq!(merge_types([&Type::Int, &Type::Int]), Some(Type::Int));
        assert_eq!(merge_types([&Type::Int, &Type::Long]), Some(Type::Long));
        assert_eq!(merge_types([&Type::Short, &Type::Int]), Some(Type::Int));
        assert_eq!(merge_types([&Type::Short, &Type::Char]), Some(Type::Int));
        assert_eq!(
            merge_types([&Type::Int, &Type::Int, &Type::Long]),
            Some(Type::Long)
        );
    }

    #[test]
    fn reference_joins() {
        let string = Type::reference("java/lang/String");
        let integer = Type::reference("java/lang/Integer");
        assert_eq!(merge_types([&string, &Type::Null]), Some(string.clone()));
        assert_eq!(merge_types([&string, &integer]), Some(Type::object()));
        assert_eq!(
            merge_types([&Type::array(Type::Int), &Type::array(Type::Int)]),
            Some(Type::array(Type::Int))
        );
        assert_eq!(
            merge_types([&Type::array(Type::Int), &Type::array(Type::Long)]),
            Some(Type::object())
        );
    }

    #[test]
    fn no_common_type() {
        assert_eq!(merge_types(std::iter::empty()), None);
        assert_eq!(merge_types([&Type::Int, &Type::object()]), None);
        assert_eq!(merge_types([&Type::Void, &Type::Int]), None);
        assert_eq!(merge_types([&Type::Float, &Type::Int]), None);
    }

    #[test]
    fn descriptor_round_trip() {
        for desc in ["I", "J", "Ljava/lang/String;", "[[D", "[Ljava/util/List;"] {
            let ty = Type::from_descriptor(desc).unwrap();
            assert_eq!(ty.descriptor(), desc);
        }
        assert_eq!(Type::from_descriptor("L;"), None);
        assert_eq!(Type::from_descriptor("II"), None);
    }
}
