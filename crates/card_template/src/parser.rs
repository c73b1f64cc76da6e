//! Recursive descent parser for card templates.
//!
//! The parser works directly on the source bytes: markup, mustaches and the
//! expressions inside mustaches are recognised in a single pass. Lookahead
//! compares bytes, and text runs only end at ASCII delimiters, so the cursor
//! may sit inside a multi-byte character but every slice taken from the
//! source starts and ends on a UTF-8 boundary.

use crate::ast::*;
use crate::error::TemplateError;
use crate::printer;

/// Parses template source into a [`Template`], numbering paths from zero.
pub fn parse(source: &str) -> Result<Template, TemplateError> {
    let mut ids = NodeIds::default();
    parse_with_ids(source, &mut ids)
}

/// Parses template source, drawing path ids from `ids`.
///
/// Sharing one allocator across several parses keeps ids unique when
/// parsed fragments are spliced into a single tree.
pub fn parse_with_ids(source: &str, ids: &mut NodeIds) -> Result<Template, TemplateError> {
    let mut parser = TemplateParser {
        source,
        pos: 0,
        ids,
    };
    let (body, stop) = parser.parse_nodes()?;
    match stop {
        Stop::Eof => Ok(Template { body }),
        Stop::CloseTag { name, offset } => Err(TemplateError::syntax(
            format!("unexpected closing tag </{name}>"),
            offset,
        )),
        Stop::Else { offset } => Err(TemplateError::syntax(
            "unexpected {{else}} outside of a block",
            offset,
        )),
        Stop::BlockClose { name, offset } => Err(TemplateError::syntax(
            format!("unexpected {{{{/{name}}}}} without an open block"),
            offset,
        )),
    }
}

/// Why a run of sibling nodes ended.
enum Stop {
    Eof,
    CloseTag { name: String, offset: usize },
    Else { offset: usize },
    BlockClose { name: String, offset: usize },
}

struct TemplateParser<'src, 'ids> {
    source: &'src str,
    pos: usize,
    ids: &'ids mut NodeIds,
}

fn is_tag_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || matches!(b, b'@' | b':' | b'_')
}

fn is_tag_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'@' | b':' | b'$')
}

fn is_path_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.' | b'@' | b'$' | b':')
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'$')
}

impl TemplateParser<'_, '_> {
    // ========================================================================
    // Primitive operations
    // ========================================================================

    fn bytes(&self) -> &[u8] {
        self.source.as_bytes()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn peek(&self) -> u8 {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> u8 {
        self.bytes().get(self.pos + offset).copied().unwrap_or(0)
    }

    fn starts_with(&self, s: &str) -> bool {
        self.bytes()
            .get(self.pos..)
            .is_some_and(|rest| rest.starts_with(s.as_bytes()))
    }

    fn skip_ws(&mut self) {
        while !self.at_end() && self.peek().is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn expect(&mut self, s: &str) -> Result<(), TemplateError> {
        if self.starts_with(s) {
            self.pos += s.len();
            Ok(())
        } else {
            Err(self.error(format!("expected `{s}`")))
        }
    }

    fn error(&self, message: impl Into<String>) -> TemplateError {
        TemplateError::syntax(message, self.pos)
    }

    fn take_while(&mut self, pred: fn(u8) -> bool) -> &str {
        let start = self.pos;
        while !self.at_end() && pred(self.peek()) {
            self.pos += 1;
        }
        &self.source[start..self.pos]
    }

    /// Consumes everything up to `terminator` and returns it, leaving the
    /// cursor after the terminator.
    fn take_until(&mut self, terminator: &str, what: &str) -> Result<String, TemplateError> {
        let start = self.pos;
        match self.source[self.pos..].find(terminator) {
            Some(len) => {
                self.pos += len + terminator.len();
                Ok(self.source[start..start + len].to_string())
            }
            None => Err(TemplateError::syntax(format!("unterminated {what}"), start)),
        }
    }

    // ========================================================================
    // Content
    // ========================================================================

    fn parse_nodes(&mut self) -> Result<(Vec<Node>, Stop), TemplateError> {
        let mut nodes: Vec<Node> = Vec::new();
        loop {
            if self.at_end() {
                return Ok((nodes, Stop::Eof));
            }
            let start = self.pos;
            if self.starts_with("{{!--") {
                self.pos += 5;
                let text = self.take_until("--}}", "mustache comment")?;
                nodes.push(Node::MustacheComment { text, long: true });
            } else if self.starts_with("{{!") {
                self.pos += 3;
                let text = self.take_until("}}", "mustache comment")?;
                nodes.push(Node::MustacheComment { text, long: false });
            } else if self.starts_with("{{#") {
                nodes.push(Node::Block(self.parse_block()?));
            } else if self.starts_with("{{/") {
                let name = self.parse_block_close()?;
                return Ok((nodes, Stop::BlockClose { name, offset: start }));
            } else if self.at_else()? {
                return Ok((nodes, Stop::Else { offset: start }));
            } else if self.starts_with("{{") {
                nodes.push(Node::Mustache(self.parse_mustache()?));
            } else if self.starts_with("<!--") {
                self.pos += 4;
                let text = self.take_until("-->", "comment")?;
                nodes.push(Node::Comment(text));
            } else if self.starts_with("</") {
                let name = self.parse_close_tag()?;
                return Ok((nodes, Stop::CloseTag { name, offset: start }));
            } else if self.peek() == b'<' && is_tag_start(self.peek_at(1)) {
                nodes.push(Node::Element(self.parse_element()?));
            } else {
                let text = self.parse_text();
                match nodes.last_mut() {
                    Some(Node::Text(prev)) => prev.push_str(&text),
                    _ => nodes.push(Node::Text(text)),
                }
            }
        }
    }

    fn parse_text(&mut self) -> String {
        let start = self.pos;
        self.pos += 1;
        while !self.at_end() && !self.starts_with("{{") && self.peek() != b'<' {
            self.pos += 1;
        }
        self.source[start..self.pos].to_string()
    }

    /// Recognises `{{else}}` and consumes it.
    fn at_else(&mut self) -> Result<bool, TemplateError> {
        if !self.starts_with("{{") {
            return Ok(false);
        }
        let mut i = self.pos + 2;
        let bytes = self.bytes();
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if !bytes[i..].starts_with(b"else") {
            return Ok(false);
        }
        let after = i + 4;
        if after < bytes.len() && is_ident_char(bytes[after]) {
            return Ok(false);
        }
        let mut j = after;
        while j < bytes.len() && bytes[j].is_ascii_whitespace() {
            j += 1;
        }
        if bytes[j..].starts_with(b"}}") {
            self.pos = j + 2;
            Ok(true)
        } else {
            Err(TemplateError::syntax(
                "chained `{{else ...}}` blocks are not supported",
                self.pos,
            ))
        }
    }

    // ========================================================================
    // Mustaches and blocks
    // ========================================================================

    fn parse_mustache(&mut self) -> Result<Mustache, TemplateError> {
        let trusting = self.starts_with("{{{");
        self.pos += if trusting { 3 } else { 2 };
        self.skip_ws();
        let call = self.parse_call()?;
        self.skip_ws();
        self.expect(if trusting { "}}}" } else { "}}" })?;
        Ok(Mustache { call, trusting })
    }

    fn parse_block(&mut self) -> Result<Block, TemplateError> {
        let start = self.pos;
        self.expect("{{#")?;
        self.skip_ws();
        let call = self.parse_call()?;
        self.skip_ws();
        let block_params = if self.at_block_params() {
            self.parse_block_params()?
        } else {
            Vec::new()
        };
        self.skip_ws();
        self.expect("}}")?;

        let name = printer::expr_to_string(&call.path);
        let (program, stop) = self.parse_nodes()?;
        let (inverse, stop) = match stop {
            Stop::Else { .. } => {
                let (inverse, stop) = self.parse_nodes()?;
                (Some(inverse), stop)
            }
            other => (None, other),
        };

        match stop {
            Stop::BlockClose { name: close, .. } if close == name => Ok(Block {
                call,
                block_params,
                program,
                inverse,
            }),
            Stop::BlockClose { name: close, offset } => Err(TemplateError::syntax(
                format!("mismatched block close: expected {{{{/{name}}}}}, found {{{{/{close}}}}}"),
                offset,
            )),
            Stop::Else { offset } => Err(TemplateError::syntax(
                format!("duplicate {{{{else}}}} in block {{{{#{name}}}}}"),
                offset,
            )),
            Stop::CloseTag { name: tag, offset } => Err(TemplateError::syntax(
                format!("unexpected closing tag </{tag}> inside block {{{{#{name}}}}}"),
                offset,
            )),
            Stop::Eof => Err(TemplateError::syntax(
                format!("unclosed block {{{{#{name}}}}}"),
                start,
            )),
        }
    }

    fn parse_block_close(&mut self) -> Result<String, TemplateError> {
        self.expect("{{/")?;
        self.skip_ws();
        let name = self.take_while(is_path_char).to_string();
        if name.is_empty() {
            return Err(self.error("expected block name"));
        }
        self.skip_ws();
        self.expect("}}")?;
        Ok(name)
    }

    fn at_block_params(&self) -> bool {
        if !self.starts_with("as") || is_ident_char(self.peek_at(2)) {
            return false;
        }
        let rest = self.source[self.pos + 2..].trim_start();
        rest.starts_with('|')
    }

    fn parse_block_params(&mut self) -> Result<Vec<String>, TemplateError> {
        self.expect("as")?;
        self.skip_ws();
        self.expect("|")?;
        let mut params = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == b'|' {
                self.pos += 1;
                break;
            }
            let name = self.take_while(is_ident_char).to_string();
            if name.is_empty() {
                return Err(self.error("expected block parameter name"));
            }
            params.push(name);
        }
        Ok(params)
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn at_call_end(&self) -> bool {
        self.at_end() || self.starts_with("}}") || self.peek() == b')' || self.at_block_params()
    }

    fn parse_call(&mut self) -> Result<Call, TemplateError> {
        let path = self.parse_expr()?;
        let mut params = Vec::new();
        let mut hash = Vec::new();
        loop {
            self.skip_ws();
            if self.at_call_end() {
                break;
            }
            if let Some(key) = self.take_hash_key() {
                self.skip_ws();
                let value = self.parse_expr()?;
                hash.push(HashPair { key, value });
            } else {
                if !hash.is_empty() {
                    return Err(self.error("positional argument after named arguments"));
                }
                params.push(self.parse_expr()?);
            }
        }
        Ok(Call { path, params, hash })
    }

    /// Consumes `key=` if the cursor is at a hash pair.
    fn take_hash_key(&mut self) -> Option<String> {
        let bytes = self.bytes();
        let mut i = self.pos;
        while i < bytes.len() && is_ident_char(bytes[i]) {
            i += 1;
        }
        if i > self.pos && bytes.get(i) == Some(&b'=') {
            let key = self.source[self.pos..i].to_string();
            self.pos = i + 1;
            Some(key)
        } else {
            None
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, TemplateError> {
        match self.peek() {
            b'(' => {
                self.pos += 1;
                self.skip_ws();
                let call = self.parse_call()?;
                self.skip_ws();
                self.expect(")")?;
                Ok(Expr::SubExpr(Box::new(call)))
            }
            b'"' | b'\'' => self.parse_string().map(|s| Expr::Literal(Literal::String(s))),
            b'-' if self.peek_at(1).is_ascii_digit() => Ok(self.parse_number()),
            b if b.is_ascii_digit() => Ok(self.parse_number()),
            b if is_path_char(b) => self.parse_path_or_keyword(),
            _ => Err(self.error("expected expression")),
        }
    }

    fn parse_string(&mut self) -> Result<String, TemplateError> {
        let start = self.pos;
        let quote = self.peek();
        self.pos += 1;
        let mut value = String::new();
        let mut run_start = self.pos;
        loop {
            if self.at_end() {
                return Err(TemplateError::syntax("unterminated string literal", start));
            }
            let b = self.peek();
            if b == b'\\' && self.peek_at(1) == quote {
                value.push_str(&self.source[run_start..self.pos]);
                value.push(quote as char);
                self.pos += 2;
                run_start = self.pos;
            } else if b == quote {
                value.push_str(&self.source[run_start..self.pos]);
                self.pos += 1;
                return Ok(value);
            } else {
                self.pos += 1;
            }
        }
    }

    fn parse_number(&mut self) -> Expr {
        let start = self.pos;
        if self.peek() == b'-' {
            self.pos += 1;
        }
        while !self.at_end() && (self.peek().is_ascii_digit() || self.peek() == b'.') {
            self.pos += 1;
        }
        Expr::Literal(Literal::Number(self.source[start..self.pos].to_string()))
    }

    fn parse_path_or_keyword(&mut self) -> Result<Expr, TemplateError> {
        let start = self.pos;
        let token = self.take_while(is_path_char).to_string();
        let literal = match token.as_str() {
            "true" => Some(Literal::Bool(true)),
            "false" => Some(Literal::Bool(false)),
            "null" => Some(Literal::Null),
            "undefined" => Some(Literal::Undefined),
            _ => None,
        };
        if let Some(literal) = literal {
            return Ok(Expr::Literal(literal));
        }

        let mut segments = token.split('.');
        let first = segments.next().unwrap_or_default();
        let head = if first == "this" {
            PathHead::This
        } else if let Some(arg) = first.strip_prefix('@') {
            PathHead::Arg(arg.to_string())
        } else {
            PathHead::Var(first.to_string())
        };
        let tail: Vec<String> = segments.map(str::to_string).collect();
        let head_empty = matches!(&head, PathHead::Arg(a) | PathHead::Var(a) if a.is_empty());
        if head_empty || tail.iter().any(|s| s.is_empty() || s.contains('@')) {
            return Err(TemplateError::syntax(
                format!("invalid path expression `{token}`"),
                start,
            ));
        }
        Ok(Expr::Path(PathExpr {
            id: self.ids.next_id(),
            head,
            tail,
        }))
    }

    // ========================================================================
    // Elements
    // ========================================================================

    fn parse_element(&mut self) -> Result<Element, TemplateError> {
        let start = self.pos;
        self.expect("<")?;
        let tag = self.take_while(is_tag_char).to_string();
        let mut attributes = Vec::new();
        let mut modifiers = Vec::new();

        loop {
            self.skip_ws();
            if self.at_end() {
                return Err(TemplateError::syntax(
                    format!("unclosed start tag <{tag}>"),
                    start,
                ));
            }
            if self.starts_with("/>") {
                self.pos += 2;
                return Ok(Element {
                    tag,
                    attributes,
                    modifiers,
                    children: Vec::new(),
                    self_closing: true,
                });
            }
            if self.peek() == b'>' {
                self.pos += 1;
                break;
            }
            if self.starts_with("{{") {
                self.pos += 2;
                self.skip_ws();
                modifiers.push(self.parse_call()?);
                self.skip_ws();
                self.expect("}}")?;
                continue;
            }
            attributes.push(self.parse_attribute()?);
        }

        if is_void_element(&tag) {
            return Ok(Element {
                tag,
                attributes,
                modifiers,
                children: Vec::new(),
                self_closing: false,
            });
        }

        let (children, stop) = self.parse_nodes()?;
        match stop {
            Stop::CloseTag { name, .. } if name == tag => Ok(Element {
                tag,
                attributes,
                modifiers,
                children,
                self_closing: false,
            }),
            Stop::CloseTag { name, offset } => Err(TemplateError::syntax(
                format!("mismatched closing tag: expected </{tag}>, found </{name}>"),
                offset,
            )),
            Stop::Eof => Err(TemplateError::syntax(
                format!("unclosed element <{tag}>"),
                start,
            )),
            Stop::Else { offset } => Err(TemplateError::syntax(
                format!("unexpected {{{{else}}}} inside <{tag}>"),
                offset,
            )),
            Stop::BlockClose { name, offset } => Err(TemplateError::syntax(
                format!("unexpected {{{{/{name}}}}} inside <{tag}>"),
                offset,
            )),
        }
    }

    fn parse_close_tag(&mut self) -> Result<String, TemplateError> {
        self.expect("</")?;
        let name = self.take_while(is_tag_char).to_string();
        self.skip_ws();
        self.expect(">")?;
        Ok(name)
    }

    fn parse_attribute(&mut self) -> Result<Attribute, TemplateError> {
        let start = self.pos;
        while !self.at_end()
            && !self.peek().is_ascii_whitespace()
            && !matches!(self.peek(), b'=' | b'>' | b'"' | b'\'')
            && !self.starts_with("/>")
            && !self.starts_with("{{")
        {
            self.pos += 1;
        }
        let name = self.source[start..self.pos].to_string();
        if name.is_empty() {
            return Err(self.error("expected attribute name"));
        }

        let before_ws = self.pos;
        self.skip_ws();
        if self.peek() != b'=' {
            self.pos = before_ws;
            return Ok(Attribute {
                name,
                value: AttrValue::None,
            });
        }
        self.pos += 1;
        self.skip_ws();
        let value = self.parse_attr_value()?;
        Ok(Attribute { name, value })
    }

    fn parse_attr_value(&mut self) -> Result<AttrValue, TemplateError> {
        match self.peek() {
            b'"' | b'\'' => self.parse_quoted_value(),
            _ if self.starts_with("{{") => Ok(AttrValue::Mustache(self.parse_mustache()?)),
            _ => {
                let start = self.pos;
                while !self.at_end()
                    && !self.peek().is_ascii_whitespace()
                    && self.peek() != b'>'
                    && !self.starts_with("/>")
                {
                    self.pos += 1;
                }
                if self.pos == start {
                    return Err(self.error("expected attribute value"));
                }
                Ok(AttrValue::Text(self.source[start..self.pos].to_string()))
            }
        }
    }

    fn parse_quoted_value(&mut self) -> Result<AttrValue, TemplateError> {
        let start = self.pos;
        let quote = self.peek();
        self.pos += 1;
        let mut parts = Vec::new();
        let mut run_start = self.pos;
        loop {
            if self.at_end() {
                return Err(TemplateError::syntax(
                    "unterminated attribute value",
                    start,
                ));
            }
            if self.peek() == quote {
                if self.pos > run_start {
                    parts.push(ConcatPart::Text(
                        self.source[run_start..self.pos].to_string(),
                    ));
                }
                self.pos += 1;
                break;
            }
            if self.starts_with("{{") {
                if self.pos > run_start {
                    parts.push(ConcatPart::Text(
                        self.source[run_start..self.pos].to_string(),
                    ));
                }
                parts.push(ConcatPart::Mustache(self.parse_mustache()?));
                run_start = self.pos;
                continue;
            }
            self.pos += 1;
        }

        Ok(match parts.as_slice() {
            [] => AttrValue::Text(String::new()),
            [ConcatPart::Text(text)] => AttrValue::Text(text.clone()),
            _ => AttrValue::Concat(parts),
        })
    }
}
