//! Field-reference transformation.
//!
//! Every `<@model.<field> />` tag naming a known field is replaced, either by
//! the field card's inline template spliced into place or by an invocation
//! of a generated component that receives the field value as `@model`.
//! Tags naming unknown fields pass through untouched.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::BuildHasher;

use crate::ast::*;
use crate::error::TemplateError;
use crate::parser::{parse, parse_with_ids};

const MODEL_ARG: &str = "model";
const FIELD_TAG_PREFIX: &str = "@model.";

/// How a field renders when a template references it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldBinding {
    /// Template source to splice in place of the reference, when the field's
    /// card is cheap enough to inline.
    pub inline: Option<String>,
    /// `true` for fields holding a list of cards.
    pub plural: bool,
}

/// Lookup of field bindings by local field name.
pub trait FieldTable {
    /// Returns the binding for `name`, or `None` if no such field exists.
    fn binding(&self, name: &str) -> Option<&FieldBinding>;
}

impl<S: BuildHasher> FieldTable for HashMap<String, FieldBinding, S> {
    fn binding(&self, name: &str) -> Option<&FieldBinding> {
        self.get(name)
    }
}

impl FieldTable for BTreeMap<String, FieldBinding> {
    fn binding(&self, name: &str) -> Option<&FieldBinding> {
        self.get(name)
    }
}

/// A generated component referenced by a transformed template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldComponent {
    /// The field the component renders.
    pub field: String,
    /// Identifier used as the tag name in the template scope.
    pub identifier: String,
    /// Module reference returned by the component emitter.
    pub module: String,
}

/// Result of transforming one template.
#[derive(Clone, Debug, PartialEq)]
pub struct Transformed {
    /// The rewritten template.
    pub template: Template,
    /// Known fields the template references, in first-use order.
    pub used_fields: Vec<String>,
    /// Generated components the template invokes, one per field.
    pub components: Vec<FieldComponent>,
}

/// Parses and transforms template source.
///
/// `emit_component` is called once per field that must be rendered as a
/// component and returns the module reference of that component.
pub fn transform(
    source: &str,
    fields: &dyn FieldTable,
    emit_component: &mut dyn FnMut(&str) -> String,
) -> Result<Transformed, TemplateError> {
    let template = parse(source)?;
    run(template, fields, emit_component)
}

/// Transforms an already parsed template without modifying it.
pub fn transform_template(
    template: &Template,
    fields: &dyn FieldTable,
    emit_component: &mut dyn FnMut(&str) -> String,
) -> Result<Transformed, TemplateError> {
    run(template.clone(), fields, emit_component)
}

fn run(
    template: Template,
    fields: &dyn FieldTable,
    emit_component: &mut dyn FnMut(&str) -> String,
) -> Result<Transformed, TemplateError> {
    let mut transformer = Transformer {
        fields,
        emit_component,
        ids: NodeIds::starting_at(template.id_watermark()),
        rewritten: HashSet::new(),
        used_fields: Vec::new(),
        components: Vec::new(),
    };
    let body = transformer.transform_nodes(template.body)?;
    Ok(Transformed {
        template: Template { body },
        used_fields: transformer.used_fields,
        components: transformer.components,
    })
}

/// Returns the field named by a `<@model.<field>>` tag.
fn field_reference(tag: &str) -> Option<&str> {
    let field = tag.strip_prefix(FIELD_TAG_PREFIX)?;
    if field.is_empty() || field.contains('.') {
        None
    } else {
        Some(field)
    }
}

/// `author_name` becomes `AuthorNameField`.
fn component_identifier(field: &str) -> String {
    let mut ident = String::with_capacity(field.len() + 5);
    let mut upper = true;
    for c in field.chars() {
        if c == '_' || c == '-' {
            upper = true;
        } else if upper {
            ident.extend(c.to_uppercase());
            upper = false;
        } else {
            ident.push(c);
        }
    }
    ident.push_str("Field");
    ident
}

struct Transformer<'a> {
    fields: &'a dyn FieldTable,
    emit_component: &'a mut dyn FnMut(&str) -> String,
    ids: NodeIds,
    /// Paths already moved into a field's scope.
    rewritten: HashSet<NodeId>,
    used_fields: Vec<String>,
    components: Vec<FieldComponent>,
}

impl Transformer<'_> {
    fn transform_nodes(&mut self, nodes: Vec<Node>) -> Result<Vec<Node>, TemplateError> {
        let mut out = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node {
                Node::Element(el) => {
                    let fields = self.fields;
                    let binding = field_reference(&el.tag)
                        .and_then(|field| fields.binding(field).map(|b| (field.to_string(), b)));
                    match binding {
                        Some((field, binding)) => {
                            out.extend(self.expand_field(&field, binding, el)?);
                        }
                        None if field_reference(&el.tag).is_some() => out.push(Node::Element(el)),
                        None => {
                            let mut el = el;
                            el.for_each_own_path(&mut |p| self.note_path(p));
                            el.children = self.transform_nodes(el.children)?;
                            out.push(Node::Element(el));
                        }
                    }
                }
                Node::Block(mut block) => {
                    block.call.for_each_path(&mut |p| self.note_path(p));
                    block.program = self.transform_nodes(block.program)?;
                    block.inverse = match block.inverse {
                        Some(inverse) => Some(self.transform_nodes(inverse)?),
                        None => None,
                    };
                    out.push(Node::Block(block));
                }
                Node::Mustache(m) => {
                    m.call.for_each_path(&mut |p| self.note_path(p));
                    out.push(Node::Mustache(m));
                }
                other => out.push(other),
            }
        }
        Ok(out)
    }

    /// Counts `@model.<field>` paths in the consumer's own template.
    fn note_path(&mut self, path: &PathExpr) {
        if !path.is_arg(MODEL_ARG) {
            return;
        }
        if let Some(first) = path.tail.first() {
            if self.fields.binding(first).is_some() {
                self.mark_used(first);
            }
        }
    }

    fn mark_used(&mut self, field: &str) {
        if !self.used_fields.iter().any(|f| f == field) {
            self.used_fields.push(field.to_string());
        }
    }

    fn model_path(&mut self, field: &str) -> PathExpr {
        PathExpr {
            id: self.ids.next_id(),
            head: PathHead::Arg(MODEL_ARG.to_string()),
            tail: vec![field.to_string()],
        }
    }

    fn expand_field(
        &mut self,
        field: &str,
        binding: &FieldBinding,
        el: Element,
    ) -> Result<Vec<Node>, TemplateError> {
        self.mark_used(field);

        let item = format!("{field}Item");
        let scope = if binding.plural {
            PathExpr {
                id: self.ids.next_id(),
                head: PathHead::Var(item.clone()),
                tail: Vec::new(),
            }
        } else {
            self.model_path(field)
        };

        let body = match &binding.inline {
            Some(source) => {
                let inline = parse_with_ids(source, &mut self.ids).map_err(|e| {
                    TemplateError::Inline {
                        field: field.to_string(),
                        source: Box::new(e),
                    }
                })?;
                let mut nodes = inline.body;
                self.move_into_scope(&mut nodes, &scope);
                nodes
            }
            None => vec![self.component_invocation(field, scope, el)],
        };

        if !binding.plural {
            return Ok(body);
        }
        let each = PathExpr {
            id: self.ids.next_id(),
            head: PathHead::Var("each".to_string()),
            tail: Vec::new(),
        };
        let list = self.model_path(field);
        Ok(vec![Node::Block(Block {
            call: Call {
                path: Expr::Path(each),
                params: vec![Expr::Path(list)],
                hash: Vec::new(),
            },
            block_params: vec![item],
            program: body,
            inverse: None,
        })])
    }

    /// Rewrites `@model`-rooted paths in spliced nodes so they resolve
    /// against `scope`. Each path is rewritten at most once.
    fn move_into_scope(&mut self, nodes: &mut [Node], scope: &PathExpr) {
        let rewritten = &mut self.rewritten;
        walk_paths_mut(nodes, &mut |path| {
            if !path.is_arg(MODEL_ARG) || !rewritten.insert(path.id) {
                return;
            }
            let mut tail = scope.tail.clone();
            tail.append(&mut path.tail);
            path.head = scope.head.clone();
            path.tail = tail;
        });
    }

    fn component_invocation(&mut self, field: &str, scope: PathExpr, el: Element) -> Node {
        let identifier = self.component_for(field);
        let mut attributes = vec![Attribute {
            name: format!("@{MODEL_ARG}"),
            value: AttrValue::Mustache(Mustache {
                call: Call {
                    path: Expr::Path(scope),
                    params: Vec::new(),
                    hash: Vec::new(),
                },
                trusting: false,
            }),
        }];
        attributes.extend(el.attributes);
        Node::Element(Element {
            tag: identifier,
            attributes,
            modifiers: el.modifiers,
            children: Vec::new(),
            self_closing: true,
        })
    }

    fn component_for(&mut self, field: &str) -> String {
        if let Some(existing) = self.components.iter().find(|c| c.field == field) {
            return existing.identifier.clone();
        }
        let base = component_identifier(field);
        let mut identifier = base.clone();
        let mut suffix = 2;
        while self.components.iter().any(|c| c.identifier == identifier) {
            identifier = format!("{base}{suffix}");
            suffix += 1;
        }
        let module = (self.emit_component)(field);
        self.components.push(FieldComponent {
            field: field.to_string(),
            identifier: identifier.clone(),
            module,
        });
        identifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::printer::print;

    fn table(entries: &[(&str, Option<&str>, bool)]) -> BTreeMap<String, FieldBinding> {
        entries
            .iter()
            .map(|(name, inline, plural)| {
                (
                    name.to_string(),
                    FieldBinding {
                        inline: inline.map(str::to_string),
                        plural: *plural,
                    },
                )
            })
            .collect()
    }

    fn run_source(source: &str, fields: &BTreeMap<String, FieldBinding>) -> Transformed {
        transform(source, fields, &mut |field| format!("mod/{field}/embedded.js")).unwrap()
    }

    #[test]
    fn inline_field_is_spliced_into_model_scope() {
        let fields = table(&[("title", Some("{{@model}}"), false)]);
        let out = run_source("<h1><@model.title/></h1>", &fields);
        assert_eq!(print(&out.template), "<h1>{{@model.title}}</h1>");
        assert_eq!(out.used_fields, vec!["title"]);
        assert!(out.components.is_empty());
    }

    #[test]
    fn non_inline_field_becomes_component_invocation() {
        let fields = table(&[("title", None, false)]);
        let out = run_source("<h1><@model.title/></h1>", &fields);
        assert_eq!(
            print(&out.template),
            "<h1><TitleField @model={{@model.title}} /></h1>"
        );
        assert_eq!(out.used_fields, vec!["title"]);
        assert_eq!(
            out.components,
            vec![FieldComponent {
                field: "title".into(),
                identifier: "TitleField".into(),
                module: "mod/title/embedded.js".into(),
            }]
        );
    }

    #[test]
    fn unknown_field_is_left_untouched() {
        let fields = table(&[("title", None, false)]);
        let out = run_source("<p><@model.missingField /></p>", &fields);
        assert_eq!(print(&out.template), "<p><@model.missingField /></p>");
        assert!(out.used_fields.is_empty());
        assert!(out.components.is_empty());
    }

    #[test]
    fn inline_paths_keep_their_tails() {
        let fields = table(&[("when", Some("<time>{{format @model.date style=\"short\"}}</time>"), false)]);
        let out = run_source("<@model.when />", &fields);
        assert_eq!(
            print(&out.template),
            "<time>{{format @model.when.date style=\"short\"}}</time>"
        );
    }

    #[test]
    fn plural_inline_field_iterates_items() {
        let fields = table(&[("tags", Some("<span>{{@model}}</span>"), true)]);
        let out = run_source("<@model.tags />", &fields);
        assert_eq!(
            print(&out.template),
            "{{#each @model.tags as |tagsItem|}}<span>{{tagsItem}}</span>{{/each}}"
        );
        assert_eq!(out.used_fields, vec!["tags"]);
    }

    #[test]
    fn plural_component_field_iterates_items() {
        let fields = table(&[("comments", None, true)]);
        let out = run_source("<@model.comments />", &fields);
        assert_eq!(
            print(&out.template),
            "{{#each @model.comments as |commentsItem|}}<CommentsField @model={{commentsItem}} />{{/each}}"
        );
    }

    #[test]
    fn attributes_carry_onto_component() {
        let fields = table(&[("author_name", None, false)]);
        let out = run_source(r#"<@model.author_name class="byline" />"#, &fields);
        assert_eq!(
            print(&out.template),
            r#"<AuthorNameField @model={{@model.author_name}} class="byline" />"#
        );
    }

    #[test]
    fn component_is_emitted_once_per_field() {
        let fields = table(&[("author", None, false)]);
        let mut calls = 0;
        let out = transform(
            "<@model.author /><div><@model.author /></div>",
            &fields,
            &mut |_| {
                calls += 1;
                "mod".to_string()
            },
        )
        .unwrap();
        assert_eq!(calls, 1);
        assert_eq!(out.components.len(), 1);
        assert_eq!(out.used_fields, vec!["author"]);
    }

    #[test]
    fn colliding_identifiers_are_disambiguated() {
        let fields = table(&[
            ("author_name", None, false),
            ("authorName", None, false),
            ("author-name", None, false),
        ]);
        let out = run_source(
            "<@model.author_name /><@model.authorName /><@model.author-name /><@model.author_name />",
            &fields,
        );
        assert_eq!(
            print(&out.template),
            "<AuthorNameField @model={{@model.author_name}} />\
             <AuthorNameField2 @model={{@model.authorName}} />\
             <AuthorNameField3 @model={{@model.author-name}} />\
             <AuthorNameField @model={{@model.author_name}} />"
        );
        let identifiers: Vec<_> = out.components.iter().map(|c| c.identifier.as_str()).collect();
        assert_eq!(identifiers, vec!["AuthorNameField", "AuthorNameField2", "AuthorNameField3"]);
        assert_eq!(out.components[1].module, "mod/authorName/embedded.js");
    }

    #[test]
    fn non_ascii_markup_around_inline_splice() {
        let fields = table(&[("title", Some("<em>« {{@model}} »</em>"), false)]);
        let out = run_source(r#"<h1 title="Título">Café: <@model.title/> ✓</h1>"#, &fields);
        assert_eq!(
            print(&out.template),
            r#"<h1 title="Título">Café: <em>« {{@model.title}} »</em> ✓</h1>"#
        );
        assert_eq!(out.used_fields, vec!["title"]);
    }

    #[test]
    fn mustache_paths_count_as_used() {
        let fields = table(&[("body", None, false), ("title", None, false)]);
        let out = run_source(
            "{{#if @model.title}}<p>{{@model.body}}</p>{{/if}}{{@model.other}}",
            &fields,
        );
        assert_eq!(out.used_fields, vec!["title", "body"]);
        assert!(out.components.is_empty());
    }

    #[test]
    fn nested_blocks_and_elements_are_transformed() {
        let fields = table(&[("title", Some("{{@model}}"), false)]);
        let out = run_source(
            "{{#if @show}}<header><@model.title /></header>{{else}}<@model.title />{{/if}}",
            &fields,
        );
        assert_eq!(
            print(&out.template),
            "{{#if @show}}<header>{{@model.title}}</header>{{else}}{{@model.title}}{{/if}}"
        );
    }

    #[test]
    fn transform_template_does_not_mutate_input() {
        let template = parse("<@model.title />").unwrap();
        let inline = table(&[("title", Some("{{@model}}"), false)]);
        let component = table(&[("title", None, false)]);
        let a = transform_template(&template, &inline, &mut |_| "m".into()).unwrap();
        let b = transform_template(&template, &component, &mut |_| "m".into()).unwrap();
        assert_eq!(print(&template), "<@model.title />");
        assert_eq!(print(&a.template), "{{@model.title}}");
        assert_eq!(print(&b.template), "<TitleField @model={{@model.title}} />");
    }

    #[test]
    fn scope_rewrite_applies_once_per_path() {
        let fields = table(&[]);
        let mut emit = |_: &str| String::new();
        let mut transformer = Transformer {
            fields: &fields,
            emit_component: &mut emit,
            ids: NodeIds::default(),
            rewritten: HashSet::new(),
            used_fields: Vec::new(),
            components: Vec::new(),
        };
        let mut nodes = parse_with_ids("{{@model.name}}", &mut transformer.ids)
            .unwrap()
            .body;
        let scope = transformer.model_path("author");
        transformer.move_into_scope(&mut nodes, &scope);
        transformer.move_into_scope(&mut nodes, &scope);
        assert_eq!(
            print(&Template { body: nodes }),
            "{{@model.author.name}}"
        );
    }

    #[test]
    fn spliced_ids_do_not_collide_with_consumer_ids() {
        let fields = table(&[("title", Some("{{@model}}"), false)]);
        let out = run_source("{{@model.x}}<@model.title />{{this.y}}", &fields);
        let mut ids = Vec::new();
        walk_paths(&out.template.body, &mut |p| ids.push(p.id));
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn invalid_inline_source_names_field() {
        let fields = table(&[("title", Some("{{@model"), false)]);
        let err = transform("<@model.title />", &fields, &mut |_| String::new()).unwrap_err();
        assert!(matches!(err, TemplateError::Inline { ref field, .. } if field == "title"));
    }

    #[test]
    fn component_identifiers() {
        assert_eq!(component_identifier("title"), "TitleField");
        assert_eq!(component_identifier("author_name"), "AuthorNameField");
        assert_eq!(component_identifier("published-at"), "PublishedAtField");
    }
}
