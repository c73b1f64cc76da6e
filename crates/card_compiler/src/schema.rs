//! Schema source scanning.
//!
//! A schema is a JavaScript class module. Only the parts the compiler needs
//! are recognised: import declarations, and class members decorated with
//! `@contains(Type)` or `@containsMany(Type)`. Everything else is skipped
//! token by token, so comments and string literals never yield false fields.

use std::collections::BTreeMap;
use std::ops::Range;

use card_common::{CardUrl, ModuleRef};

use crate::card::{Arity, FieldSpec};
use crate::error::CompileError;

/// A malformed schema construct.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at byte {offset}")]
pub struct SchemaSyntaxError {
    /// What went wrong.
    pub message: String,
    /// Byte offset into the schema source.
    pub offset: usize,
}

/// One imported binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaImport {
    /// Local binding name.
    pub local: String,
    /// Module specifier as written.
    pub specifier: String,
    /// Byte range of the specifier text, without quotes.
    pub specifier_span: Range<usize>,
}

/// A decorated field member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    /// Member name.
    pub name: String,
    /// Identifier passed to the decorator.
    pub type_ident: String,
    /// `@contains` or `@containsMany`.
    pub arity: Arity,
    /// Declared with `computeVia` or as a getter.
    pub computed: bool,
    /// Byte offset of the decorator.
    pub offset: usize,
}

/// The recognised parts of a schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedSchema {
    /// Import bindings in source order.
    pub imports: Vec<SchemaImport>,
    /// Field declarations in source order.
    pub fields: Vec<FieldDecl>,
}

impl ParsedSchema {
    fn import(&self, local: &str) -> Option<&SchemaImport> {
        self.imports.iter().find(|i| i.local == local)
    }
}

// ============================================================================
// Tokens
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Str(String),
    Punct(u8),
    Other,
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    start: usize,
    end: usize,
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'$' || b >= 0x80
}

fn is_ident_char(b: u8) -> bool {
    is_ident_start(b) || b.is_ascii_digit()
}

fn tokenize(source: &str) -> Result<Vec<Token>, SchemaSyntaxError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let b = bytes[pos];
        let start = pos;
        if b.is_ascii_whitespace() {
            pos += 1;
        } else if source[pos..].starts_with("//") {
            pos = source[pos..].find('\n').map_or(bytes.len(), |n| pos + n);
        } else if source[pos..].starts_with("/*") {
            let len = source[pos + 2..].find("*/").ok_or_else(|| SchemaSyntaxError {
                message: "unterminated comment".to_string(),
                offset: start,
            })?;
            pos += 2 + len + 2;
        } else if matches!(b, b'"' | b'\'' | b'`') {
            pos += 1;
            loop {
                match bytes.get(pos) {
                    None => {
                        return Err(SchemaSyntaxError {
                            message: "unterminated string literal".to_string(),
                            offset: start,
                        })
                    }
                    Some(b'\\') => pos += 2,
                    Some(&c) if c == b => {
                        pos += 1;
                        break;
                    }
                    Some(_) => pos += 1,
                }
            }
            tokens.push(Token {
                tok: Tok::Str(source[start + 1..pos - 1].to_string()),
                start,
                end: pos,
            });
        } else if is_ident_start(b) {
            while pos < bytes.len() && is_ident_char(bytes[pos]) {
                pos += 1;
            }
            tokens.push(Token {
                tok: Tok::Ident(source[start..pos].to_string()),
                start,
                end: pos,
            });
        } else if b.is_ascii_digit() {
            while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'.') {
                pos += 1;
            }
            tokens.push(Token {
                tok: Tok::Other,
                start,
                end: pos,
            });
        } else {
            pos += 1;
            tokens.push(Token {
                tok: Tok::Punct(b),
                start,
                end: pos,
            });
        }
    }
    Ok(tokens)
}

// ============================================================================
// Parser
// ============================================================================

struct SchemaParser {
    tokens: Vec<Token>,
    pos: usize,
    source_len: usize,
}

impl SchemaParser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn peek_at(&self, offset: usize) -> Option<&Tok> {
        self.tokens.get(self.pos + offset).map(|t| &t.tok)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map_or(self.source_len, |t| t.start)
    }

    fn error(&self, message: &str) -> SchemaSyntaxError {
        SchemaSyntaxError {
            message: message.to_string(),
            offset: self.offset(),
        }
    }

    fn at_punct(&self, p: u8) -> bool {
        self.peek() == Some(&Tok::Punct(p))
    }

    fn at_ident(&self, name: &str) -> bool {
        matches!(self.peek(), Some(Tok::Ident(s)) if s == name)
    }

    fn expect_punct(&mut self, p: u8, what: &str) -> Result<(), SchemaSyntaxError> {
        if self.at_punct(p) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected {what}")))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, SchemaSyntaxError> {
        match self.peek() {
            Some(Tok::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error(&format!("expected {what}"))),
        }
    }

    /// Skips a balanced `open ... close` group, returning the identifiers
    /// seen inside it.
    fn skip_group(&mut self, open: u8, close: u8) -> Result<Vec<String>, SchemaSyntaxError> {
        let start = self.offset();
        self.expect_punct(open, &format!("`{}`", open as char))?;
        let mut depth = 1;
        let mut idents = Vec::new();
        while depth > 0 {
            match self.peek() {
                None => {
                    return Err(SchemaSyntaxError {
                        message: format!("unclosed `{}`", open as char),
                        offset: start,
                    })
                }
                Some(Tok::Punct(p)) if *p == open => depth += 1,
                Some(Tok::Punct(p)) if *p == close => depth -= 1,
                Some(Tok::Ident(name)) => idents.push(name.clone()),
                _ => {}
            }
            self.pos += 1;
        }
        Ok(idents)
    }

    fn parse(mut self) -> Result<ParsedSchema, SchemaSyntaxError> {
        let mut schema = ParsedSchema::default();
        while let Some(tok) = self.peek() {
            let after_dot = self.pos > 0 && self.tokens[self.pos - 1].tok == Tok::Punct(b'.');
            match tok {
                Tok::Ident(kw) if kw == "import" && !after_dot => self.parse_import(&mut schema)?,
                Tok::Punct(b'@')
                    if matches!(self.peek_at(1), Some(Tok::Ident(d)) if d == "contains" || d == "containsMany") =>
                {
                    let field = self.parse_field()?;
                    schema.fields.push(field);
                }
                _ => self.pos += 1,
            }
        }
        Ok(schema)
    }

    fn parse_import(&mut self, schema: &mut ParsedSchema) -> Result<(), SchemaSyntaxError> {
        self.pos += 1;
        match self.peek() {
            // `import "side-effect";`
            Some(Tok::Str(_)) => {
                self.pos += 1;
                return Ok(());
            }
            // `import(...)` and `import.meta`
            Some(Tok::Punct(b'(')) | Some(Tok::Punct(b'.')) => return Ok(()),
            _ => {}
        }

        let mut locals = Vec::new();
        if let Some(Tok::Ident(name)) = self.peek() {
            if name != "from" || self.peek_at(1) == Some(&Tok::Ident("from".to_string())) {
                locals.push(name.clone());
                self.pos += 1;
                if self.at_punct(b',') {
                    self.pos += 1;
                }
            }
        }
        if self.at_punct(b'{') {
            let idents = self.skip_group(b'{', b'}')?;
            // `a as b` binds `b`.
            let mut iter = idents.into_iter().peekable();
            while let Some(name) = iter.next() {
                if iter.peek().map(String::as_str) == Some("as") {
                    iter.next();
                    if let Some(alias) = iter.next() {
                        locals.push(alias);
                    }
                } else {
                    locals.push(name);
                }
            }
        } else if self.at_punct(b'*') {
            self.pos += 1;
            if !self.at_ident("as") {
                return Err(self.error("expected `as` in namespace import"));
            }
            self.pos += 1;
            locals.push(self.expect_ident("namespace binding")?);
        }

        if !self.at_ident("from") {
            return Err(self.error("expected `from` in import declaration"));
        }
        self.pos += 1;
        let (specifier, span) = match self.tokens.get(self.pos) {
            Some(Token {
                tok: Tok::Str(s),
                start,
                end,
            }) => (s.clone(), start + 1..end - 1),
            _ => return Err(self.error("expected module specifier")),
        };
        self.pos += 1;
        schema
            .imports
            .extend(locals.into_iter().map(|local| SchemaImport {
                local,
                specifier: specifier.clone(),
                specifier_span: span.clone(),
            }));
        Ok(())
    }

    fn parse_field(&mut self) -> Result<FieldDecl, SchemaSyntaxError> {
        let offset = self.offset();
        self.pos += 1;
        let arity = match self.expect_ident("decorator")?.as_str() {
            "containsMany" => Arity::Plural,
            _ => Arity::Single,
        };
        self.expect_punct(b'(', "`(` after field decorator")?;
        let type_ident = self.expect_ident("field card identifier")?;

        let mut computed = false;
        if self.at_punct(b',') {
            self.pos += 1;
            if self.at_punct(b'{') {
                let keys = self.skip_group(b'{', b'}')?;
                computed = keys.iter().any(|k| k == "computeVia");
            }
        }
        self.expect_punct(b')', "`)` closing field decorator")?;

        // Further decorators on the same member.
        while self.at_punct(b'@') {
            self.pos += 1;
            self.expect_ident("decorator")?;
            if self.at_punct(b'(') {
                self.skip_group(b'(', b')')?;
            }
        }

        let getter = self.at_ident("get") && matches!(self.peek_at(1), Some(Tok::Ident(_)));
        if getter {
            self.pos += 1;
        }
        let name = self.expect_ident("field name")?;
        Ok(FieldDecl {
            name,
            type_ident,
            arity,
            computed: computed || getter,
            offset,
        })
    }
}

/// Scans a schema source.
pub fn parse_schema(source: &str) -> Result<ParsedSchema, SchemaSyntaxError> {
    let tokens = tokenize(source)?;
    SchemaParser {
        tokens,
        pos: 0,
        source_len: source.len(),
    }
    .parse()
}

/// Resolves field declarations to field specs, resolving each type through
/// its import against the card URL.
pub fn resolve_fields(url: &CardUrl, schema: &ParsedSchema) -> Result<Vec<FieldSpec>, CompileError> {
    schema
        .fields
        .iter()
        .map(|decl| {
            let import = schema
                .import(&decl.type_ident)
                .ok_or_else(|| CompileError::UnknownFieldType {
                    url: url.clone(),
                    field: decl.name.clone(),
                    ident: decl.type_ident.clone(),
                })?;
            Ok(FieldSpec {
                local_name: decl.name.clone(),
                field_card_url: url.join(&import.specifier)?,
                arity: decl.arity,
                is_computed: decl.computed,
            })
        })
        .collect()
}

/// Replaces import specifiers that resolve to a card in `targets` with that
/// card's schema module.
pub fn rewrite_imports(
    url: &CardUrl,
    source: &str,
    schema: &ParsedSchema,
    targets: &BTreeMap<CardUrl, ModuleRef>,
) -> String {
    let mut spans: Vec<(&Range<usize>, &ModuleRef)> = Vec::new();
    for import in &schema.imports {
        let Ok(target) = url.join(&import.specifier) else {
            continue;
        };
        if let Some(module) = targets.get(&target) {
            if !spans.iter().any(|(s, _)| *s == &import.specifier_span) {
                spans.push((&import.specifier_span, module));
            }
        }
    }
    spans.sort_by_key(|(span, _)| span.start);

    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    for (span, module) in spans {
        out.push_str(&source[cursor..span.start]);
        out.push_str(module.as_str());
        cursor = span.end;
    }
    out.push_str(&source[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const POST_SCHEMA: &str = r#"
import { contains, containsMany } from "@cardstack/types";
import string from "https://cardstack.com/base/string";
import date from "https://cardstack.com/base/date";

export default class Post {
  @contains(string) title;
  @contains(string) body;
  @containsMany(string) tags;
  @contains(date, { computeVia: "computeCreated" }) createdAt;
  @contains(string)
  get slug() {
    return this.title.toLowerCase();
  }
}
"#;

    fn url(s: &str) -> CardUrl {
        CardUrl::parse(s).unwrap()
    }

    #[test]
    fn parses_imports() {
        let schema = parse_schema(POST_SCHEMA).unwrap();
        let locals: Vec<&str> = schema.imports.iter().map(|i| i.local.as_str()).collect();
        assert_eq!(locals, vec!["contains", "containsMany", "string", "date"]);
        let string = schema.import("string").unwrap();
        assert_eq!(string.specifier, "https://cardstack.com/base/string");
        assert_eq!(
            &POST_SCHEMA[string.specifier_span.clone()],
            "https://cardstack.com/base/string"
        );
    }

    #[test]
    fn parses_fields() {
        let schema = parse_schema(POST_SCHEMA).unwrap();
        let fields: Vec<(&str, &str, Arity, bool)> = schema
            .fields
            .iter()
            .map(|f| (f.name.as_str(), f.type_ident.as_str(), f.arity, f.computed))
            .collect();
        assert_eq!(
            fields,
            vec![
                ("title", "string", Arity::Single, false),
                ("body", "string", Arity::Single, false),
                ("tags", "string", Arity::Plural, false),
                ("createdAt", "date", Arity::Single, true),
                ("slug", "string", Arity::Single, true),
            ]
        );
    }

    #[test]
    fn comments_and_strings_are_ignored() {
        let source = r#"
import string from "../string";
// @contains(string) commented;
/* @contains(string) blocked; */
const s = "@contains(string) quoted;";
const t = `@contains(string) templated;`;
export default class { @contains(string) real; }
"#;
        let schema = parse_schema(source).unwrap();
        assert_eq!(schema.fields.len(), 1);
        assert_eq!(schema.fields[0].name, "real");
    }

    #[test]
    fn aliased_and_namespace_imports_bind_locals() {
        let source = r#"
import Base, { contains as has } from "../base";
import * as helpers from "./helpers";
"#;
        let schema = parse_schema(source).unwrap();
        let locals: Vec<&str> = schema.imports.iter().map(|i| i.local.as_str()).collect();
        assert_eq!(locals, vec!["Base", "has", "helpers"]);
    }

    #[test]
    fn other_decorators_are_skipped() {
        let source = r#"
import string from "../string";
export default class { @tracked count = 0; @contains(string) @action name; }
"#;
        let schema = parse_schema(source).unwrap();
        assert_eq!(schema.fields.len(), 1);
        assert_eq!(schema.fields[0].name, "name");
    }

    #[test]
    fn malformed_decorator_reports_offset() {
        let source = "export default class { @contains() title; }";
        let err = parse_schema(source).unwrap_err();
        assert_eq!(err.message, "expected field card identifier");
        assert_eq!(err.offset, source.find(')').unwrap());
    }

    #[test]
    fn unterminated_comment_is_an_error() {
        let err = parse_schema("/* never closed").unwrap_err();
        assert_eq!(err.offset, 0);
    }

    #[test]
    fn resolve_fields_uses_imports() {
        let schema = parse_schema(POST_SCHEMA).unwrap();
        let specs = resolve_fields(&url("https://demo.com/post"), &schema).unwrap();
        assert_eq!(specs.len(), 5);
        assert_eq!(
            specs[0].field_card_url,
            url("https://cardstack.com/base/string")
        );
        assert_eq!(specs[2].arity, Arity::Plural);
        assert!(specs[3].is_computed);
    }

    #[test]
    fn resolve_relative_specifier_against_card() {
        let schema = parse_schema(
            "import person from '../person'; export default class { @contains(person) author; }",
        )
        .unwrap();
        let specs = resolve_fields(&url("https://demo.com/post"), &schema).unwrap();
        assert_eq!(specs[0].field_card_url, url("https://demo.com/person"));
    }

    #[test]
    fn unknown_type_identifier_is_an_error() {
        let schema =
            parse_schema("export default class { @contains(mystery) title; }").unwrap();
        let err = resolve_fields(&url("https://demo.com/post"), &schema).unwrap_err();
        assert!(matches!(
            err,
            CompileError::UnknownFieldType { ref field, ref ident, .. }
                if field == "title" && ident == "mystery"
        ));
    }

    #[test]
    fn rewrite_replaces_card_specifiers_only() {
        let source = r#"import { contains } from "@cardstack/types";
import string from "https://cardstack.com/base/string";
import Post from "../post";
export default class extends Post { @contains(string) subtitle; }
"#;
        let schema = parse_schema(source).unwrap();
        let mut targets = BTreeMap::new();
        targets.insert(
            url("https://cardstack.com/base/string"),
            ModuleRef::new("@cards/compiled/string/schema.js"),
        );
        targets.insert(
            url("https://demo.com/post"),
            ModuleRef::new("@cards/compiled/post/schema.js"),
        );
        let out = rewrite_imports(&url("https://demo.com/post0"), source, &schema, &targets);
        assert!(out.contains(r#"import { contains } from "@cardstack/types";"#));
        assert!(out.contains(r#"import string from "@cards/compiled/string/schema.js";"#));
        assert!(out.contains(r#"import Post from "@cards/compiled/post/schema.js";"#));
        assert!(out.ends_with("@contains(string) subtitle; }\n"));
    }
}
