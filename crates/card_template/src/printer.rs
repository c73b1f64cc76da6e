//! Renders a [`Template`] back to source.
//!
//! Output is canonical rather than byte-identical: quoting, whitespace inside
//! mustaches, and self-closing spacing are normalised, but printing then
//! re-parsing always yields the same tree.

use std::fmt::Write;

use crate::ast::*;

/// Prints a template to source text.
pub fn print(template: &Template) -> String {
    let mut out = String::new();
    print_nodes(&template.body, &mut out);
    out
}

/// Prints a single expression.
pub fn expr_to_string(expr: &Expr) -> String {
    let mut out = String::new();
    print_expr(expr, &mut out);
    out
}

fn print_nodes(nodes: &[Node], out: &mut String) {
    for node in nodes {
        print_node(node, out);
    }
}

fn print_node(node: &Node, out: &mut String) {
    match node {
        Node::Text(text) => out.push_str(text),
        Node::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
        Node::MustacheComment { text, long: true } => {
            out.push_str("{{!--");
            out.push_str(text);
            out.push_str("--}}");
        }
        Node::MustacheComment { text, long: false } => {
            out.push_str("{{!");
            out.push_str(text);
            out.push_str("}}");
        }
        Node::Mustache(m) => print_mustache(m, out),
        Node::Block(block) => print_block(block, out),
        Node::Element(el) => print_element(el, out),
    }
}

fn print_mustache(m: &Mustache, out: &mut String) {
    let (open, close) = if m.trusting {
        ("{{{", "}}}")
    } else {
        ("{{", "}}")
    };
    out.push_str(open);
    print_call(&m.call, out);
    out.push_str(close);
}

fn print_block(block: &Block, out: &mut String) {
    out.push_str("{{#");
    print_call(&block.call, out);
    if !block.block_params.is_empty() {
        out.push_str(" as |");
        out.push_str(&block.block_params.join(" "));
        out.push('|');
    }
    out.push_str("}}");
    print_nodes(&block.program, out);
    if let Some(inverse) = &block.inverse {
        out.push_str("{{else}}");
        print_nodes(inverse, out);
    }
    out.push_str("{{/");
    print_expr(&block.call.path, out);
    out.push_str("}}");
}

fn print_element(el: &Element, out: &mut String) {
    out.push('<');
    out.push_str(&el.tag);
    for attr in &el.attributes {
        out.push(' ');
        print_attribute(attr, out);
    }
    for modifier in &el.modifiers {
        out.push_str(" {{");
        print_call(modifier, out);
        out.push_str("}}");
    }
    if el.self_closing {
        out.push_str(" />");
        return;
    }
    out.push('>');
    if is_void_element(&el.tag) {
        return;
    }
    print_nodes(&el.children, out);
    out.push_str("</");
    out.push_str(&el.tag);
    out.push('>');
}

fn print_attribute(attr: &Attribute, out: &mut String) {
    out.push_str(&attr.name);
    match &attr.value {
        AttrValue::None => {}
        AttrValue::Text(text) => {
            let quote = if text.contains('"') { '\'' } else { '"' };
            out.push('=');
            out.push(quote);
            out.push_str(text);
            out.push(quote);
        }
        AttrValue::Mustache(m) => {
            out.push('=');
            print_mustache(m, out);
        }
        AttrValue::Concat(parts) => {
            let has_double = parts
                .iter()
                .any(|part| matches!(part, ConcatPart::Text(text) if text.contains('"')));
            let quote = if has_double { '\'' } else { '"' };
            out.push('=');
            out.push(quote);
            for part in parts {
                match part {
                    ConcatPart::Text(text) => out.push_str(text),
                    ConcatPart::Mustache(m) => print_mustache(m, out),
                }
            }
            out.push(quote);
        }
    }
}

fn print_call(call: &Call, out: &mut String) {
    print_expr(&call.path, out);
    for param in &call.params {
        out.push(' ');
        print_expr(param, out);
    }
    for pair in &call.hash {
        out.push(' ');
        out.push_str(&pair.key);
        out.push('=');
        print_expr(&pair.value, out);
    }
}

fn print_expr(expr: &Expr, out: &mut String) {
    match expr {
        Expr::Path(path) => print_path(path, out),
        Expr::Literal(literal) => print_literal(literal, out),
        Expr::SubExpr(call) => {
            out.push('(');
            print_call(call, out);
            out.push(')');
        }
    }
}

fn print_path(path: &PathExpr, out: &mut String) {
    match &path.head {
        PathHead::This => out.push_str("this"),
        PathHead::Arg(name) => {
            out.push('@');
            out.push_str(name);
        }
        PathHead::Var(name) => out.push_str(name),
    }
    for segment in &path.tail {
        out.push('.');
        out.push_str(segment);
    }
}

fn print_literal(literal: &Literal, out: &mut String) {
    match literal {
        Literal::String(s) if s.contains('"') && !s.contains('\'') => {
            let _ = write!(out, "'{s}'");
        }
        Literal::String(s) => {
            let _ = write!(out, "\"{}\"", s.replace('"', "\\\""));
        }
        Literal::Number(n) => out.push_str(n),
        Literal::Bool(b) => {
            let _ = write!(out, "{b}");
        }
        Literal::Null => out.push_str("null"),
        Literal::Undefined => out.push_str("undefined"),
    }
}
