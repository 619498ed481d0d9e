use std::fmt;

/// Name of an IR value.
///
/// Values come out of the bytecode loader with compiler-generated slot names
/// (`%0`, `%1`, ...), out of debug info with source-preserved names
/// (`%count`), or with one of the two fixed argument forms (`this`,
/// `arg$N`). Values that never materialize in a register position carry no
/// name at all.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum ValueName {
    /// Compiler-generated numbered name, rendered `%N`
    Slot(u32),
    /// Source-preserved symbolic name, rendered `%name`
    Symbol(String),
    /// The receiver reference, rendered `this`
    This,
    /// Formal argument `N`, rendered `arg$N`
    Arg(u16),
    /// No name; exempt from the naming grammar and uniqueness checks
    Undefined,
}

impl ValueName {
    pub fn is_defined(&self) -> bool {
        !matches!(self, ValueName::Undefined)
    }

    /// Source-preserved names are the only ones that survive from debug info
    pub fn is_symbolic(&self) -> bool {
        matches!(self, ValueName::Symbol(_))
    }
}

/// Bare strings become source-preserved symbolic names
impl From<&str> for ValueName {
    fn from(name: &str) -> ValueName {
        ValueName::Symbol(name.to_owned())
    }
}

impl From<String> for ValueName {
    fn from(name: String) -> ValueName {
        ValueName::Symbol(name)
    }
}

impl fmt::Display for ValueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueName::Slot(n) => write!(f, "%{}", n),
            ValueName::Symbol(s) => write!(f, "%{}", s),
            ValueName::This => f.write_str("this"),
            ValueName::Arg(n) => write!(f, "arg${}", n),
            ValueName::Undefined => f.write_str("<undef>"),
        }
    }
}

/// Check a rendered value name against the value-naming grammar:
/// `%` followed by an identifier or a digit sequence, or one of the literal
/// `this` / `arg$N` forms.
pub fn is_valid_value_name(name: &str) -> bool {
    if name == "this" {
        return true;
    }
    if let Some(digits) = name.strip_prefix("arg$") {
        return !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit());
    }
    let Some(rest) = name.strip_prefix('%') else {
        return false;
    };
    let mut bytes = rest.bytes();
    match bytes.next() {
        None => false,
        Some(b) if b.is_ascii_digit() => bytes.all(|b| b.is_ascii_digit()),
        Some(b) if is_ident_start(b) => bytes.all(is_ident_part),
        Some(_) => false,
    }
}

/// Check a rendered block name against the block-naming grammar:
/// `%` followed by a letter and at least one further identifier character.
pub fn is_valid_block_name(name: &str) -> bool {
    let Some(rest) = name.strip_prefix('%') else {
        return false;
    };
    let mut bytes = rest.bytes();
    matches!(bytes.next(), Some(b) if b.is_ascii_alphabetic())
        && bytes.len() > 0
        && bytes.all(is_ident_part)
}

fn is_ident_start(b: u8) -> bool {
    b == b'_' || b == b'-' || b == b'$' || b.is_ascii_alphabetic()
}

fn is_ident_part(b: u8) -> bool {
    b == b'_' || b == b'-' || b == b'$' || b == b'.' || b.is_ascii_alphanumeric()
}

/// Name of a basic block, rendered with the same `%` sigil as values
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct BlockName(String);

impl BlockName {
    pub fn new(name: impl Into<String>) -> BlockName {
        BlockName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlockName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn value_grammar() {
        for ok in ["%0", "%42", "%retval", "%retval.casted", "%_t1", "this", "arg$0", "arg$13"] {
            assert!(is_valid_value_name(ok), "{} should be valid", ok);
        }
        for bad in ["", "%", "retval", "%.x", "% x", "arg$", "arg$x", "this2"] {
            assert!(!is_valid_value_name(bad), "{} should be invalid", bad);
        }
    }

    #[test]
    fn block_grammar() {
        for ok in ["%entry", "%bb.return", "%bb0", "%loop.head"] {
            assert!(is_valid_block_name(ok), "{} should be valid", ok);
        }
        for bad in ["%b", "%0b", "entry", "%", "%bb return"] {
            assert!(!is_valid_block_name(bad), "{} should be invalid", bad);
        }
    }
}
