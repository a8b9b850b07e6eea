//! Writer for the generated unit text

use super::parse::Node;
use crate::types::SourcePos;
use std::fmt::Write as _;

const INDENT: &str = "    ";

/// Quotes `text` as a string literal of the generated language.
///
/// The escaping is JSON-compatible so the toolchain can unescape literals
/// with `serde_json`.
pub(crate) fn quote(text: &str) -> String {
    serde_json::Value::from(text).to_string()
}

/// Generated statements are single-line; embedded newlines become spaces so
/// column offsets stay valid for the first line.
fn single_line(code: &str) -> String {
    code.replace(['\r', '\n'], " ")
}

pub(crate) struct Emitter {
    out: String,
    pragmas: bool,
}

impl Emitter {
    pub fn new(pragmas: bool) -> Self {
        Self {
            out: String::new(),
            pragmas,
        }
    }

    pub fn line(&mut self, depth: usize, text: &str) {
        for _ in 0..depth {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    pub fn blank(&mut self) {
        self.out.push('\n');
    }

    /// Writes `prefix code suffix`, preceded by a `#line` pragma mapping the
    /// start of `code` back to `at` in the template.
    pub fn mapped(
        &mut self,
        depth: usize,
        at: Option<SourcePos>,
        prefix: &str,
        code: &str,
        suffix: &str,
    ) {
        if let (true, Some(at)) = (self.pragmas, at) {
            let column = depth * INDENT.len() + prefix.chars().count() + 1;
            // Writing to a String cannot fail
            let _ = writeln!(self.out, "#line {}:{} @{}", at.line, at.column, column);
        }
        self.line(depth, &format!("{}{}{}", prefix, single_line(code), suffix));
    }

    /// Statements for a node list. Sections are emitted as members; in a
    /// body they leave a `define_section` marker.
    pub fn nodes(&mut self, depth: usize, nodes: &[Node]) {
        for node in nodes {
            match node {
                Node::Text { text, .. } => self.line(depth, &format!("write {};", quote(text))),
                Node::Expr { code, at } => self.mapped(depth, Some(*at), "emit ", code, ";"),
                Node::Var { name, code, at } => {
                    self.mapped(depth, Some(*at), &format!("var {} = ", name), code, ";")
                }
                Node::If {
                    branches,
                    otherwise,
                } => {
                    for (index, branch) in branches.iter().enumerate() {
                        let keyword = if index == 0 { "if (" } else { "else if (" };
                        self.mapped(depth, Some(branch.at), keyword, &branch.cond, ")");
                        self.block(depth, &branch.body);
                    }
                    if let Some(body) = otherwise {
                        self.line(depth, "else");
                        self.block(depth, body);
                    }
                }
                Node::ForEach {
                    var,
                    source,
                    at,
                    body,
                } => {
                    self.mapped(
                        depth,
                        Some(*at),
                        &format!("foreach (var {} in ", var),
                        source,
                        ")",
                    );
                    self.block(depth, body);
                }
                Node::Section { name, .. } => {
                    self.line(depth, &format!("define_section {};", quote(name)))
                }
            }
        }
    }

    fn block(&mut self, depth: usize, body: &[Node]) {
        self.line(depth, "{");
        self.nodes(depth + 1, body);
        self.line(depth, "}");
    }

    pub fn finish(self) -> String {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_escapes_like_json() {
        assert_eq!(quote("a\"b\\c\n"), r#""a\"b\\c\n""#);
        assert_eq!(quote("<p>"), "\"<p>\"");
    }

    #[test]
    fn test_mapped_pragma_points_at_code_column() {
        let mut emitter = Emitter::new(true);
        emitter.mapped(2, Some(SourcePos::new(3, 7)), "emit ", "Model.Name", ";");
        assert_eq!(emitter.finish(), "#line 3:7 @14\n        emit Model.Name;\n");
    }

    #[test]
    fn test_mapped_without_pragmas() {
        let mut emitter = Emitter::new(false);
        emitter.mapped(0, Some(SourcePos::new(1, 1)), "emit ", "a\nb", ";");
        assert_eq!(emitter.finish(), "emit a b;\n");
    }
}
