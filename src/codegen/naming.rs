//! Local variable naming.

use std::collections::HashMap;

use crate::types::{JavaType, PrimitiveType};

const KEYWORDS: &[&str] = &[
    "abstract", "assert", "boolean", "break", "byte", "case", "catch", "char", "class", "const",
    "continue", "default", "do", "double", "else", "enum", "extends", "false", "final",
    "finally", "float", "for", "goto", "if", "implements", "import", "instanceof", "int",
    "interface", "long", "native", "new", "null", "package", "private", "protected", "public",
    "return", "short", "static", "strictfp", "super", "switch", "synchronized", "this", "throw",
    "throws", "transient", "true", "try", "void", "volatile", "while", "var", "yield", "record",
];

/// Returns `true` if `name` cannot be used as an identifier.
#[must_use]
pub fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(&name)
}

/// Hands out unique local names derived from their types.
///
/// The first `int` is `i`, the next `i2`, and so on; reference types use the lower-camel
/// simple class name (`list`, `ioException`), with `str` for strings and `obj` for
/// `Object`. Names never collide with each other or with Java keywords.
#[derive(Debug, Default)]
pub struct LocalNamer {
    counters: HashMap<String, usize>,
}

impl LocalNamer {
    /// Creates a namer with no names taken.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a fresh name for a local of type `ty`.
    pub fn name(&mut self, ty: &JavaType) -> String {
        self.fresh(&base_name(ty))
    }

    /// Returns a fresh name built on `base`.
    pub fn fresh(&mut self, base: &str) -> String {
        let count = self.counters.entry(base.to_string()).or_insert(0);
        *count += 1;
        if *count == 1 && !is_keyword(base) {
            base.to_string()
        } else {
            let mut suffix = (*count).max(2);
            let mut candidate = format!("{base}{suffix}");
            // `i2` handed out as a base elsewhere is skipped.
            while self.counters.contains_key(&candidate) {
                suffix += 1;
                candidate = format!("{base}{suffix}");
            }
            if let Some(count) = self.counters.get_mut(base) {
                *count = suffix;
            }
            self.counters.insert(candidate.clone(), 1);
            candidate
        }
    }
}

fn base_name(ty: &JavaType) -> String {
    match ty {
        JavaType::Void => "v".to_string(),
        JavaType::Primitive(primitive) => match primitive {
            PrimitiveType::Boolean => "z",
            PrimitiveType::Byte => "b",
            PrimitiveType::Char => "c",
            PrimitiveType::Short => "s",
            PrimitiveType::Int => "i",
            PrimitiveType::Long => "j",
            PrimitiveType::Float => "f",
            PrimitiveType::Double => "d",
        }
        .to_string(),
        JavaType::Array(_) => "arr".to_string(),
        JavaType::Class(class) => match class.name() {
            "java.lang.String" => "str".to_string(),
            "java.lang.Object" => "obj".to_string(),
            _ => lower_camel(class.simple_name()),
        },
    }
}

/// `IOException` becomes `ioException`, `List` becomes `list`.
fn lower_camel(name: &str) -> String {
    let chars: Vec<char> = name.chars().filter(|c| c.is_alphanumeric() || *c == '_').collect();
    if chars.is_empty() {
        return "obj".to_string();
    }
    let upper_run = chars.iter().take_while(|c| c.is_uppercase()).count();
    // In `IOException` the last capital of the run starts the next word.
    let lowered = match upper_run {
        0 => 0,
        n if n == chars.len() || n == 1 => n,
        n => n - 1,
    };
    let mut out: String = chars[..lowered].iter().flat_map(|c| c.to_lowercase()).collect();
    out.extend(&chars[lowered..]);
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_follow_types() {
        let mut namer = LocalNamer::new();
        assert_eq!(namer.name(&JavaType::INT), "i");
        assert_eq!(namer.name(&JavaType::INT), "i2");
        assert_eq!(namer.name(&JavaType::FLOAT), "f");
        assert_eq!(namer.name(&JavaType::class("java.lang.String")), "str");
        assert_eq!(namer.name(&JavaType::class("java.io.IOException")), "ioException");
        assert_eq!(namer.name(&JavaType::class("java.util.List")), "list");
        assert_eq!(namer.name(&JavaType::INT.array_of()), "arr");
    }

    #[test]
    fn test_keywords_are_avoided() {
        let mut namer = LocalNamer::new();
        let name = namer.name(&JavaType::class("java.lang.Class"));
        assert!(!is_keyword(&name));
        assert_eq!(name, "class2");
    }

    #[test]
    fn test_suffixes_skip_taken_names() {
        let mut namer = LocalNamer::new();
        assert_eq!(namer.fresh("i2"), "i2");
        assert_eq!(namer.fresh("i"), "i");
        assert_eq!(namer.fresh("i"), "i3");
    }
}
