//! Template AST node types.
//!
//! The AST mirrors the surface syntax closely enough that printing a parsed
//! template yields equivalent source. Every path expression carries a
//! [`NodeId`] unique within one parse (or one transform), which lets rewrites
//! track which paths they have already touched.

/// Identity of a path expression within a parse or transform session.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct NodeId(u32);

impl NodeId {
    /// Creates a `NodeId` from a raw index.
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw index.
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

/// Allocator of fresh [`NodeId`]s.
#[derive(Debug, Default)]
pub struct NodeIds {
    next: u32,
}

impl NodeIds {
    /// Creates an allocator whose first id is `first`.
    pub fn starting_at(first: u32) -> Self {
        Self { next: first }
    }

    /// Allocates the next id.
    pub fn next_id(&mut self) -> NodeId {
        let id = NodeId(self.next);
        self.next += 1;
        id
    }
}

/// A parsed template.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Template {
    /// Top-level nodes.
    pub body: Vec<Node>,
}

/// A template node.
#[derive(Clone, PartialEq, Debug)]
pub enum Node {
    /// Literal text, kept verbatim.
    Text(String),
    /// An HTML comment `<!--...-->`.
    Comment(String),
    /// A mustache comment; `long` selects `{{!--...--}}` over `{{!...}}`.
    MustacheComment {
        /// Comment body.
        text: String,
        /// Whether the dashed form was used.
        long: bool,
    },
    /// `{{...}}` or `{{{...}}}`.
    Mustache(Mustache),
    /// `{{#name ...}}...{{/name}}`.
    Block(Block),
    /// An HTML element or component invocation.
    Element(Element),
}

/// A mustache statement.
#[derive(Clone, PartialEq, Debug)]
pub struct Mustache {
    /// The expression or helper call inside the braces.
    pub call: Call,
    /// `true` for the triple-stash form, which skips HTML escaping.
    pub trusting: bool,
}

/// A callee with positional params and named hash pairs.
///
/// A plain `{{@model.title}}` is a call with no params and an empty hash.
#[derive(Clone, PartialEq, Debug)]
pub struct Call {
    /// The callee (a path, a literal, or a sub-expression).
    pub path: Expr,
    /// Positional arguments.
    pub params: Vec<Expr>,
    /// Named arguments in source order.
    pub hash: Vec<HashPair>,
}

/// A `key=value` argument.
#[derive(Clone, PartialEq, Debug)]
pub struct HashPair {
    /// Argument name.
    pub key: String,
    /// Argument value.
    pub value: Expr,
}

/// An expression.
#[derive(Clone, PartialEq, Debug)]
pub enum Expr {
    /// A path such as `@model.title`, `this.count` or `item`.
    Path(PathExpr),
    /// A literal value.
    Literal(Literal),
    /// A parenthesized helper call.
    SubExpr(Box<Call>),
}

/// A dotted path expression.
#[derive(Clone, PartialEq, Debug)]
pub struct PathExpr {
    /// Identity within the current parse/transform session.
    pub id: NodeId,
    /// The root the path starts from.
    pub head: PathHead,
    /// Property segments after the head.
    pub tail: Vec<String>,
}

impl PathExpr {
    /// Returns `true` if the path is rooted at the `@name` argument.
    pub fn is_arg(&self, name: &str) -> bool {
        matches!(&self.head, PathHead::Arg(arg) if arg == name)
    }
}

/// The root of a path expression.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum PathHead {
    /// `this`.
    This,
    /// A named argument, stored without the leading `@`.
    Arg(String),
    /// A local variable, block param, or helper name.
    Var(String),
}

/// A literal value.
#[derive(Clone, PartialEq, Debug)]
pub enum Literal {
    /// A string literal (unescaped contents).
    String(String),
    /// A number, kept in its source spelling.
    Number(String),
    /// `true` or `false`.
    Bool(bool),
    /// `null`.
    Null,
    /// `undefined`.
    Undefined,
}

/// A block statement.
#[derive(Clone, PartialEq, Debug)]
pub struct Block {
    /// The helper call that opens the block.
    pub call: Call,
    /// Names bound by `as |a b|`.
    pub block_params: Vec<String>,
    /// The main body.
    pub program: Vec<Node>,
    /// The `{{else}}` body, if present.
    pub inverse: Option<Vec<Node>>,
}

/// An element or component invocation.
#[derive(Clone, PartialEq, Debug)]
pub struct Element {
    /// Tag name as written (`h1`, `@model.title`, `AuthorField`).
    pub tag: String,
    /// Attributes and `@arg`s in source order.
    pub attributes: Vec<Attribute>,
    /// Element modifiers (`{{on "click" this.save}}`).
    pub modifiers: Vec<Call>,
    /// Child nodes.
    pub children: Vec<Node>,
    /// Written as `<tag />`.
    pub self_closing: bool,
}

/// An attribute or argument on an element.
#[derive(Clone, PartialEq, Debug)]
pub struct Attribute {
    /// Name as written, including a leading `@` for arguments.
    pub name: String,
    /// The value.
    pub value: AttrValue,
}

/// The value of an attribute.
#[derive(Clone, PartialEq, Debug)]
pub enum AttrValue {
    /// A valueless attribute such as `disabled` or `...attributes`.
    None,
    /// Plain text.
    Text(String),
    /// An unquoted `{{...}}` value.
    Mustache(Mustache),
    /// A quoted value mixing text and mustaches.
    Concat(Vec<ConcatPart>),
}

/// A piece of a quoted attribute value.
#[derive(Clone, PartialEq, Debug)]
pub enum ConcatPart {
    /// Literal text.
    Text(String),
    /// An interpolated mustache.
    Mustache(Mustache),
}

/// HTML elements that never have children or a closing tag.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Returns `true` if `tag` is an HTML void element.
pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

// ============================================================================
// Path visitors
// ============================================================================

impl Expr {
    /// Visits every path in this expression.
    pub fn for_each_path(&self, f: &mut dyn FnMut(&PathExpr)) {
        match self {
            Expr::Path(path) => f(path),
            Expr::Literal(_) => {}
            Expr::SubExpr(call) => call.for_each_path(f),
        }
    }

    /// Visits every path in this expression mutably.
    pub fn for_each_path_mut(&mut self, f: &mut dyn FnMut(&mut PathExpr)) {
        match self {
            Expr::Path(path) => f(path),
            Expr::Literal(_) => {}
            Expr::SubExpr(call) => call.for_each_path_mut(f),
        }
    }
}

impl Call {
    /// Visits the callee, params and hash values.
    pub fn for_each_path(&self, f: &mut dyn FnMut(&PathExpr)) {
        self.path.for_each_path(f);
        for param in &self.params {
            param.for_each_path(f);
        }
        for pair in &self.hash {
            pair.value.for_each_path(f);
        }
    }

    /// Visits the callee, params and hash values mutably.
    pub fn for_each_path_mut(&mut self, f: &mut dyn FnMut(&mut PathExpr)) {
        self.path.for_each_path_mut(f);
        for param in &mut self.params {
            param.for_each_path_mut(f);
        }
        for pair in &mut self.hash {
            pair.value.for_each_path_mut(f);
        }
    }
}

impl AttrValue {
    fn for_each_path(&self, f: &mut dyn FnMut(&PathExpr)) {
        match self {
            AttrValue::None | AttrValue::Text(_) => {}
            AttrValue::Mustache(m) => m.call.for_each_path(f),
            AttrValue::Concat(parts) => {
                for part in parts {
                    if let ConcatPart::Mustache(m) = part {
                        m.call.for_each_path(f);
                    }
                }
            }
        }
    }

    fn for_each_path_mut(&mut self, f: &mut dyn FnMut(&mut PathExpr)) {
        match self {
            AttrValue::None | AttrValue::Text(_) => {}
            AttrValue::Mustache(m) => m.call.for_each_path_mut(f),
            AttrValue::Concat(parts) => {
                for part in parts {
                    if let ConcatPart::Mustache(m) = part {
                        m.call.for_each_path_mut(f);
                    }
                }
            }
        }
    }
}

impl Element {
    /// Visits paths in the element's own attributes and modifiers, not its
    /// children.
    pub fn for_each_own_path(&self, f: &mut dyn FnMut(&PathExpr)) {
        for attr in &self.attributes {
            attr.value.for_each_path(f);
        }
        for modifier in &self.modifiers {
            modifier.for_each_path(f);
        }
    }

    fn for_each_own_path_mut(&mut self, f: &mut dyn FnMut(&mut PathExpr)) {
        for attr in &mut self.attributes {
            attr.value.for_each_path_mut(f);
        }
        for modifier in &mut self.modifiers {
            modifier.for_each_path_mut(f);
        }
    }
}

/// Visits every path expression in `nodes`, depth first.
pub fn walk_paths(nodes: &[Node], f: &mut dyn FnMut(&PathExpr)) {
    for node in nodes {
        match node {
            Node::Mustache(m) => m.call.for_each_path(f),
            Node::Block(block) => {
                block.call.for_each_path(f);
                walk_paths(&block.program, f);
                if let Some(inverse) = &block.inverse {
                    walk_paths(inverse, f);
                }
            }
            Node::Element(el) => {
                el.for_each_own_path(f);
                walk_paths(&el.children, f);
            }
            Node::Text(_) | Node::Comment(_) | Node::MustacheComment { .. } => {}
        }
    }
}

/// Visits every path expression in `nodes` mutably, depth first.
pub fn walk_paths_mut(nodes: &mut [Node], f: &mut dyn FnMut(&mut PathExpr)) {
    for node in nodes {
        match node {
            Node::Mustache(m) => m.call.for_each_path_mut(f),
            Node::Block(block) => {
                block.call.for_each_path_mut(f);
                walk_paths_mut(&mut block.program, f);
                if let Some(inverse) = &mut block.inverse {
                    walk_paths_mut(inverse, f);
                }
            }
            Node::Element(el) => {
                el.for_each_own_path_mut(f);
                walk_paths_mut(&mut el.children, f);
            }
            Node::Text(_) | Node::Comment(_) | Node::MustacheComment { .. } => {}
        }
    }
}

impl Template {
    /// Returns one past the largest [`NodeId`] used in the template.
    pub fn id_watermark(&self) -> u32 {
        let mut max = 0;
        walk_paths(&self.body, &mut |path| max = max.max(path.id.as_raw() + 1));
        max
    }
}
