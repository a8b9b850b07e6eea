//! Markup parser
//!
//! Splits template text into literal text, expressions and directive blocks.
//! Embedded code is delimited but not interpreted: it travels verbatim into
//! the generated unit and is checked by the toolchain.

use super::blocks::{balanced, find_top_level, split_statements, Span, Unmatched};
use super::error::ParseError;
use super::scan::{advance, is_ident_char, is_ident_start, is_identifier, Cursor};
use crate::types::SourcePos;

/// Keywords that look like control flow but are not supported after `@`
const UNSUPPORTED_KEYWORDS: &[&str] = &[
    "for", "while", "do", "switch", "try", "lock", "helper", "page", "inject",
];

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Text {
        text: String,
        at: SourcePos,
    },
    Expr {
        code: String,
        at: SourcePos,
    },
    Var {
        name: String,
        code: String,
        at: SourcePos,
    },
    If {
        branches: Vec<Branch>,
        otherwise: Option<Vec<Node>>,
    },
    ForEach {
        var: String,
        source: String,
        at: SourcePos,
        body: Vec<Node>,
    },
    Section {
        name: String,
        at: SourcePos,
        body: Vec<Node>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Branch {
    pub cond: String,
    pub at: SourcePos,
    pub body: Vec<Node>,
}

/// Value of a line directive and where the value starts
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Directive {
    pub value: String,
    pub at: SourcePos,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FunctionDecl {
    pub name: String,
    pub params: Vec<String>,
    pub code: String,
    pub at: SourcePos,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Directives {
    pub model: Option<Directive>,
    pub inherits: Option<Directive>,
    pub layout: Option<Directive>,
    pub usings: Vec<Directive>,
    pub functions: Vec<FunctionDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Document {
    pub nodes: Vec<Node>,
    pub directives: Directives,
}

/// Parses `text`, attributing errors to `template`
pub(crate) fn parse(template: &str, text: &str) -> Result<Document, ParseError> {
    let mut parser = Parser {
        template,
        cursor: Cursor::new(text),
        directives: Directives::default(),
        sections: Vec::new(),
    };
    let nodes = parser.parse_nodes(&Block::TopLevel)?;
    Ok(Document {
        nodes,
        directives: parser.directives,
    })
}

#[derive(Debug, Clone)]
enum Block {
    TopLevel,
    Nested {
        opened_at: SourcePos,
        label: String,
        in_section: bool,
    },
}

impl Block {
    fn is_top_level(&self) -> bool {
        matches!(self, Block::TopLevel)
    }

    fn in_section(&self) -> bool {
        matches!(
            self,
            Block::Nested {
                in_section: true,
                ..
            }
        )
    }

    fn nested(&self, opened_at: SourcePos, label: impl Into<String>) -> Block {
        Block::Nested {
            opened_at,
            label: label.into(),
            in_section: self.in_section(),
        }
    }
}

/// Literal text accumulated between constructs
#[derive(Default)]
struct TextRun {
    text: String,
    at: Option<SourcePos>,
}

impl TextRun {
    fn push(&mut self, c: char, at: SourcePos) {
        self.at.get_or_insert(at);
        self.text.push(c);
    }

    fn last(&self) -> Option<char> {
        self.text.chars().next_back()
    }

    fn flush(&mut self, nodes: &mut Vec<Node>) {
        if let Some(at) = self.at.take() {
            nodes.push(Node::Text {
                text: std::mem::take(&mut self.text),
                at,
            });
        }
    }
}

struct Parser<'a> {
    template: &'a str,
    cursor: Cursor<'a>,
    directives: Directives,
    sections: Vec<(String, SourcePos)>,
}

impl<'a> Parser<'a> {
    fn error(&self, at: SourcePos, message: impl Into<String>) -> ParseError {
        ParseError::new(self.template, at, message)
    }

    fn unmatched(&self, err: Unmatched, opened_at: SourcePos, what: &str) -> ParseError {
        match err {
            Unmatched::String(at) => self.error(at, "Unterminated string literal"),
            Unmatched::Unclosed => self.error(
                opened_at,
                format!("The {} is missing its closing delimiter", what),
            ),
            Unmatched::Mismatched { found, at } => {
                self.error(at, format!("Unexpected '{}' in {}", found, what))
            }
        }
    }

    fn parse_nodes(&mut self, block: &Block) -> Result<Vec<Node>, ParseError> {
        let mut nodes = Vec::new();
        let mut text = TextRun::default();
        let mut depth = 0usize;

        loop {
            let at = self.cursor.pos();
            let Some(c) = self.cursor.peek() else {
                if let Block::Nested {
                    opened_at, label, ..
                } = block
                {
                    return Err(self.error(
                        *opened_at,
                        format!("The {} block is missing a closing '}}' character", label),
                    ));
                }
                break;
            };

            match c {
                '}' if !block.is_top_level() && depth == 0 => {
                    self.cursor.bump();
                    break;
                }
                '{' if !block.is_top_level() => {
                    depth += 1;
                    text.push(c, at);
                    self.cursor.bump();
                }
                '}' if !block.is_top_level() => {
                    depth -= 1;
                    text.push(c, at);
                    self.cursor.bump();
                }
                '@' => self.parse_at(block, &mut nodes, &mut text)?,
                _ => {
                    text.push(c, at);
                    self.cursor.bump();
                }
            }
        }

        text.flush(&mut nodes);
        Ok(nodes)
    }

    fn parse_at(
        &mut self,
        block: &Block,
        nodes: &mut Vec<Node>,
        text: &mut TextRun,
    ) -> Result<(), ParseError> {
        let at = self.cursor.pos();

        // `name@host` in literal text is an e-mail address, not a code
        // transition. Code that just ended never counts.
        let after_word = text.last().is_some_and(|p| p.is_ascii_alphanumeric());
        if after_word && self.cursor.peek_second().is_some_and(is_ident_char) {
            text.push('@', at);
            self.cursor.bump();
            return Ok(());
        }

        self.cursor.bump();
        match self.cursor.peek() {
            Some('@') => {
                text.push('@', at);
                self.cursor.bump();
            }
            Some('*') => {
                self.cursor.bump();
                while !self.cursor.eat_str("*@") {
                    if self.cursor.bump().is_none() {
                        return Err(self.error(
                            at,
                            "The comment block is not terminated. Expected '*@'",
                        ));
                    }
                }
            }
            Some('(') => {
                text.flush(nodes);
                let span = balanced(&mut self.cursor)
                    .map_err(|e| self.unmatched(e, at, "explicit expression"))?
                    .trim();
                if span.is_blank() {
                    return Err(self.error(at, "Explicit expression '@()' is empty"));
                }
                nodes.push(Node::Expr {
                    code: span.text.to_string(),
                    at: span.start,
                });
            }
            Some('{') => {
                text.flush(nodes);
                self.parse_code_block(at, block, nodes)?;
            }
            Some(c) if is_ident_start(c) => {
                text.flush(nodes);
                self.parse_keyword_or_expression(at, block, nodes)?;
            }
            Some(c) => {
                return Err(self.error(
                    at,
                    format!("'{}' is not valid at the start of a code block", c),
                ));
            }
            None => {
                return Err(self.error(at, "Unexpected end of template after '@'"));
            }
        }
        Ok(())
    }

    fn parse_keyword_or_expression(
        &mut self,
        at: SourcePos,
        block: &Block,
        nodes: &mut Vec<Node>,
    ) -> Result<(), ParseError> {
        let start = self.cursor;
        let word = self.cursor.identifier().unwrap_or_default();

        match word {
            "if" => nodes.push(self.parse_if(block)?),
            "foreach" => nodes.push(self.parse_foreach(block)?),
            "section" => nodes.push(self.parse_section(at, block)?),
            "functions" => self.parse_functions(at, block)?,
            "model" | "inherits" | "using" | "layout" => {
                self.parse_line_directive(word, at, block)?
            }
            "else" => {
                return Err(self.error(at, "Unexpected 'else' without a preceding '@if' block"));
            }
            _ if UNSUPPORTED_KEYWORDS.contains(&word) => {
                return Err(self.error(at, format!("'@{}' is not supported", word)));
            }
            _ => {
                self.cursor = start;
                nodes.push(self.parse_implicit_expression()?);
            }
        }
        Ok(())
    }

    /// `@Name.Member.Call(args)`
    fn parse_implicit_expression(&mut self) -> Result<Node, ParseError> {
        let at = self.cursor.pos();
        let start = self.cursor.offset();
        self.cursor.identifier();

        loop {
            match self.cursor.peek() {
                Some('.') if self.cursor.peek_second().is_some_and(is_ident_start) => {
                    self.cursor.bump();
                    self.cursor.identifier();
                }
                Some('(') => {
                    let opened = self.cursor.pos();
                    balanced(&mut self.cursor)
                        .map_err(|e| self.unmatched(e, opened, "argument list"))?;
                }
                _ => break,
            }
        }

        Ok(Node::Expr {
            code: self.cursor.slice(start, self.cursor.offset()).to_string(),
            at,
        })
    }

    fn expect_open_brace(&mut self, what: &str) -> Result<SourcePos, ParseError> {
        self.cursor.skip_whitespace();
        let opened = self.cursor.pos();
        if !self.cursor.eat('{') {
            return Err(self.error(opened, format!("Expected '{{' to open the {} block", what)));
        }
        Ok(opened)
    }

    fn parenthesized(&mut self, keyword: &str) -> Result<Span<'a>, ParseError> {
        self.cursor.skip_whitespace();
        let opened = self.cursor.pos();
        if self.cursor.peek() != Some('(') {
            return Err(self.error(opened, format!("Expected '(' after '{}'", keyword)));
        }
        let span = balanced(&mut self.cursor)
            .map_err(|e| self.unmatched(e, opened, &format!("'{}' condition", keyword)))?
            .trim();
        if span.is_blank() {
            return Err(self.error(opened, format!("The '{}' condition is empty", keyword)));
        }
        Ok(span)
    }

    fn parse_if(&mut self, block: &Block) -> Result<Node, ParseError> {
        let mut branches = Vec::new();
        let mut otherwise = None;

        loop {
            let cond = self.parenthesized("if")?;
            let opened = self.expect_open_brace("'if'")?;
            let body = self.parse_nodes(&block.nested(opened, "'if'"))?;
            branches.push(Branch {
                cond: cond.text.to_string(),
                at: cond.start,
                body,
            });

            let mut probe = self.cursor;
            probe.skip_whitespace();
            if !(probe.eat_str("else") && !probe.peek().is_some_and(is_ident_char)) {
                break;
            }
            self.cursor = probe;
            self.cursor.skip_whitespace();

            let mut probe = self.cursor;
            if probe.eat_str("if") && !probe.peek().is_some_and(is_ident_char) {
                self.cursor = probe;
                continue;
            }

            let opened = self.expect_open_brace("'else'")?;
            otherwise = Some(self.parse_nodes(&block.nested(opened, "'else'"))?);
            break;
        }

        Ok(Node::If {
            branches,
            otherwise,
        })
    }

    fn parse_foreach(&mut self, block: &Block) -> Result<Node, ParseError> {
        let header = self.parenthesized("foreach")?;
        let malformed = || {
            self.error(
                header.start,
                "Expected 'var <name> in <expression>' in '@foreach'",
            )
        };

        let split = find_top_level(header.text, " in ").ok_or_else(malformed)?;
        let binding = header.text[..split].trim();
        let var = binding
            .strip_prefix("var ")
            .map(str::trim)
            .unwrap_or(binding);
        if !is_identifier(var) {
            return Err(malformed());
        }

        let source_offset = split + " in ".len();
        let source = Span {
            text: &header.text[source_offset..],
            start: advance(header.start, &header.text[..source_offset]),
        }
        .trim();
        if source.is_blank() {
            return Err(malformed());
        }

        let opened = self.expect_open_brace("'foreach'")?;
        let body = self.parse_nodes(&block.nested(opened, "'foreach'"))?;
        Ok(Node::ForEach {
            var: var.to_string(),
            source: source.text.to_string(),
            at: source.start,
            body,
        })
    }

    fn parse_section(&mut self, at: SourcePos, block: &Block) -> Result<Node, ParseError> {
        if block.in_section() {
            return Err(self.error(at, "Section blocks cannot be nested"));
        }
        if !block.is_top_level() {
            return Err(self.error(
                at,
                "The '@section' directive is only allowed at the top level",
            ));
        }

        self.cursor.skip_inline_whitespace();
        let name_at = self.cursor.pos();
        let name = self
            .cursor
            .identifier()
            .ok_or_else(|| self.error(name_at, "Expected a section name after '@section'"))?
            .to_string();

        if let Some((_, first)) = self.sections.iter().find(|(existing, _)| *existing == name) {
            return Err(self.error(
                at,
                format!("Section '{}' is already defined at line {}", name, first.line),
            ));
        }
        self.sections.push((name.clone(), at));

        self.expect_open_brace(&format!("section '{}'", name))?;
        let body = self.parse_nodes(&Block::Nested {
            opened_at: at,
            label: format!("section '{}'", name),
            in_section: true,
        })?;
        self.cursor.eat_blank_line_end();

        Ok(Node::Section { name, at, body })
    }

    fn parse_line_directive(
        &mut self,
        keyword: &str,
        at: SourcePos,
        block: &Block,
    ) -> Result<(), ParseError> {
        if !block.is_top_level() {
            return Err(self.error(
                at,
                format!("The '@{}' directive is only allowed at the top level", keyword),
            ));
        }

        self.cursor.skip_inline_whitespace();
        let value_at = self.cursor.pos();
        let raw = self.cursor.line_rest().trim();
        self.cursor.eat('\n');

        if raw.is_empty() {
            return Err(self.error(
                at,
                format!("The '@{}' directive requires a value", keyword),
            ));
        }

        let value = if keyword == "layout" {
            unquote(raw).unwrap_or(raw).to_string()
        } else {
            let qualified = raw.trim_end_matches(';').trim();
            if !qualified.split('.').all(is_identifier) {
                return Err(self.error(
                    value_at,
                    format!("'{}' is not a valid name for '@{}'", raw, keyword),
                ));
            }
            qualified.to_string()
        };
        if value.is_empty() {
            return Err(self.error(value_at, "The layout name is empty"));
        }

        let directive = Directive {
            value,
            at: value_at,
        };
        let slot = match keyword {
            "model" => &mut self.directives.model,
            "inherits" => &mut self.directives.inherits,
            "layout" => &mut self.directives.layout,
            _ => {
                self.directives.usings.push(directive);
                return Ok(());
            }
        };
        if slot.is_some() {
            return Err(ParseError::new(
                self.template,
                at,
                format!("The '@{}' directive may only appear once per template", keyword),
            ));
        }
        *slot = Some(directive);
        Ok(())
    }

    fn parse_functions(&mut self, at: SourcePos, block: &Block) -> Result<(), ParseError> {
        if !block.is_top_level() {
            return Err(self.error(
                at,
                "The '@functions' block is only allowed at the top level",
            ));
        }
        self.cursor.skip_whitespace();
        if self.cursor.peek() != Some('{') {
            return Err(self.error(
                self.cursor.pos(),
                "Expected '{' to open the functions block",
            ));
        }
        let span = balanced(&mut self.cursor)
            .map_err(|e| self.unmatched(e, at, "functions block"))?;
        self.cursor.eat_blank_line_end();

        let pieces = split_statements(span);
        let Some((last, declarations)) = pieces.split_last() else {
            return Ok(());
        };
        if !last.is_blank() {
            return Err(self.error(
                last.trim().start,
                "Expected ';' after function declaration",
            ));
        }

        for piece in declarations.iter().map(Span::trim) {
            if piece.is_blank() {
                continue;
            }
            let decl = self.parse_function_decl(piece)?;
            if self
                .directives
                .functions
                .iter()
                .any(|existing| existing.name == decl.name)
            {
                return Err(self.error(
                    piece.start,
                    format!("Function '{}' is already defined", decl.name),
                ));
            }
            self.directives.functions.push(decl);
        }
        Ok(())
    }

    /// `Name(a, b) => expression`
    fn parse_function_decl(&self, piece: Span<'_>) -> Result<FunctionDecl, ParseError> {
        let malformed = || {
            self.error(
                piece.start,
                "Expected '<Name>(<parameters>) => <expression>' in '@functions'",
            )
        };

        let arrow = find_top_level(piece.text, "=>").ok_or_else(malformed)?;
        let head = piece.text[..arrow].trim();
        let open = head.find('(').ok_or_else(malformed)?;
        let name = head[..open].trim();
        let params_text = head[open + 1..].strip_suffix(')').ok_or_else(malformed)?;
        if !is_identifier(name) {
            return Err(malformed());
        }

        let mut params = Vec::new();
        if !params_text.trim().is_empty() {
            for param in params_text.split(',').map(str::trim) {
                if !is_identifier(param) || params.iter().any(|p| p == param) {
                    return Err(malformed());
                }
                params.push(param.to_string());
            }
        }

        let body_offset = arrow + "=>".len();
        let body = Span {
            text: &piece.text[body_offset..],
            start: advance(piece.start, &piece.text[..body_offset]),
        }
        .trim();
        if body.is_blank() {
            return Err(malformed());
        }

        Ok(FunctionDecl {
            name: name.to_string(),
            params,
            code: body.text.to_string(),
            at: body.start,
        })
    }

    /// `@{ var x = expr; Layout = "key"; }`
    fn parse_code_block(
        &mut self,
        at: SourcePos,
        block: &Block,
        nodes: &mut Vec<Node>,
    ) -> Result<(), ParseError> {
        let span = balanced(&mut self.cursor).map_err(|e| self.unmatched(e, at, "code block"))?;
        if block.is_top_level() {
            self.cursor.eat_blank_line_end();
        }

        let pieces = split_statements(span);
        let Some((last, statements)) = pieces.split_last() else {
            return Ok(());
        };
        if !last.is_blank() {
            return Err(self.error(last.trim().start, "Expected ';' after statement"));
        }

        for statement in statements.iter().map(Span::trim) {
            if statement.is_blank() {
                continue;
            }
            let assignment = find_top_level(statement.text, "=")
                .filter(|&i| !statement.text[i + 1..].starts_with('='));

            let Some(eq) = assignment else {
                return Err(self.error(
                    statement.start,
                    format!("Unsupported statement in code block: '{}'", statement.text),
                ));
            };
            let target = statement.text[..eq].trim();
            let value = Span {
                text: &statement.text[eq + 1..],
                start: advance(statement.start, &statement.text[..eq + 1]),
            }
            .trim();
            if value.is_blank() {
                return Err(self.error(statement.start, "Missing value in assignment"));
            }

            if target == "Layout" {
                self.assign_layout(statement.start, value, block)?;
            } else if let Some(name) = target.strip_prefix("var ").map(str::trim) {
                if !is_identifier(name) {
                    return Err(self.error(
                        statement.start,
                        format!("'{}' is not a valid variable name", name),
                    ));
                }
                nodes.push(Node::Var {
                    name: name.to_string(),
                    code: value.text.to_string(),
                    at: value.start,
                });
            } else {
                return Err(self.error(
                    statement.start,
                    format!("Unsupported statement in code block: '{}'", statement.text),
                ));
            }
        }
        Ok(())
    }

    fn assign_layout(
        &mut self,
        at: SourcePos,
        value: Span<'_>,
        block: &Block,
    ) -> Result<(), ParseError> {
        if !block.is_top_level() {
            return Err(self.error(at, "Layout can only be assigned at the top level"));
        }
        let key = serde_json::from_str::<String>(value.text)
            .map_err(|_| self.error(value.start, "Layout must be assigned a string literal"))?;
        if key.is_empty() {
            return Err(self.error(value.start, "The layout name is empty"));
        }
        if self.directives.layout.is_some() {
            return Err(self.error(at, "The layout may only be set once per template"));
        }
        self.directives.layout = Some(Directive {
            value: key,
            at: value.start,
        });
        Ok(())
    }
}

fn unquote(text: &str) -> Option<&str> {
    text.strip_prefix('"')?.strip_suffix('"')
}
