//! Card view templates: parsing, printing, and field-reference transformation.
//!
//! Templates use a Handlebars/Glimmer subset. [`parse`] builds a [`Template`]
//! AST, [`print`] renders one back to canonical source, and [`transform`]
//! rewrites `<@model.<field> />` references into either inlined markup or
//! generated component invocations.

#![warn(missing_docs)]

pub mod ast;
pub mod error;
pub mod parser;
pub mod printer;
pub mod transform;

pub use ast::{
    AttrValue, Attribute, Block, Call, ConcatPart, Element, Expr, HashPair, Literal, Mustache,
    Node, NodeId, NodeIds, PathExpr, PathHead, Template,
};
pub use error::TemplateError;
pub use parser::{parse, parse_with_ids};
pub use printer::print;
pub use transform::{
    transform, transform_template, FieldBinding, FieldComponent, FieldTable, Transformed,
};
