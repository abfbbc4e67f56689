//! Raw instruction listings, the artifact of methods that could not be decompiled.

use crate::bytecode::MethodCode;

/// Renders the instructions and exception table of `method`, one entry per line.
///
/// The listing only formats what the input holds; it never fails, even for instruction
/// streams the graph builder rejects.
#[must_use]
pub fn listing(method: &MethodCode) -> String {
    let mut out = format!("// {}\n", method.key());
    for instruction in method.instructions.iter() {
        out.push_str(&instruction.to_string());
        out.push('\n');
    }
    for handler in method.handlers.iter() {
        let caught = handler
            .catch_type
            .as_ref()
            .map_or_else(|| "<any>".to_string(), ToString::to_string);
        out.push_str(&format!(
            ".catch {caught} {{{:04x} .. {:04x}}} {:04x}\n",
            handler.start, handler.end, handler.handler
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{CodeAssembler, IfCondition};

    #[test]
    fn test_listing_shows_every_instruction() {
        let mut asm = CodeAssembler::new();
        asm.label("start")
            .if_zero(IfCondition::Eq, 0, "out")
            .const_int(0, 1)
            .label("out")
            .return_value(0)
            .try_range("start", "out", "out", None);
        let method = asm.build_method("a.B", "f", "(I)I", true, 1).unwrap();
        let text = listing(&method);

        assert!(text.starts_with("// a.B.f(I)I\n"));
        assert_eq!(text.lines().filter(|line| line.contains(": ")).count(), 3);
        assert!(text.contains(".catch <any>"));
    }
}
