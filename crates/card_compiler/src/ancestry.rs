//! Cycle detection over the card graph.
//!
//! Before anything is compiled, the graph reachable from a card through
//! `adoptsFrom` and field-type edges is walked depth first. Compiling a cycle
//! would otherwise wait on itself forever, since every card on it would be
//! waiting for another card on it to finish.
//!
//! Cards that are already compiled end the walk: they cannot lead back to a
//! card still being resolved.

use std::collections::HashSet;

use card_common::CardUrl;
use tracing::debug;

use crate::card::RawCard;
use crate::compiler::CompileHost;
use crate::error::{CompileError, Cycle};
use crate::schema::{parse_schema, resolve_fields};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Edge {
    Adoption,
    Field,
}

struct Frame {
    url: CardUrl,
    edges: Vec<(CardUrl, Edge)>,
    next: usize,
}

impl Frame {
    fn new(raw: &RawCard) -> Self {
        Self {
            url: raw.url.clone(),
            edges: edges(raw),
            next: 0,
        }
    }
}

/// Outgoing edges of a card, parent first.
///
/// Malformed references contribute no edge. They are reported when the card
/// that holds them is compiled.
fn edges(raw: &RawCard) -> Vec<(CardUrl, Edge)> {
    let mut out = Vec::new();
    if let Ok(Some(parent)) = raw.parent_url() {
        out.push((parent, Edge::Adoption));
    }
    if let Some(source) = raw.schema_source.as_deref() {
        let specs = parse_schema(source)
            .ok()
            .and_then(|schema| resolve_fields(&raw.url, &schema).ok())
            .unwrap_or_default();
        out.extend(specs.into_iter().map(|s| (s.field_card_url, Edge::Field)));
    }
    out
}

fn cycle_error(urls: Vec<CardUrl>, edges: &[Edge]) -> CompileError {
    let cycle = Cycle(urls);
    if edges.iter().all(|e| *e == Edge::Adoption) {
        CompileError::CyclicAdoption { cycle }
    } else {
        CompileError::CyclicFieldReference { cycle }
    }
}

/// Fails if the card graph reachable from `root` contains a cycle.
///
/// A cycle made of adoption edges only is a [`CompileError::CyclicAdoption`];
/// any cycle through a field type is a
/// [`CompileError::CyclicFieldReference`].
pub(crate) async fn check_cycles(
    host: &dyn CompileHost,
    root: &RawCard,
) -> Result<(), CompileError> {
    let mut stack = vec![Frame::new(root)];
    // via[i] is the edge from stack[i] to stack[i + 1].
    let mut via: Vec<Edge> = Vec::new();
    let mut done: HashSet<CardUrl> = HashSet::new();

    loop {
        let Some(frame) = stack.last_mut() else {
            break;
        };
        if frame.next == frame.edges.len() {
            done.insert(frame.url.clone());
            stack.pop();
            via.pop();
            continue;
        }
        let (target, edge) = frame.edges[frame.next].clone();
        frame.next += 1;

        if let Some(pos) = stack.iter().position(|f| f.url == target) {
            let mut urls: Vec<CardUrl> = stack[pos..].iter().map(|f| f.url.clone()).collect();
            urls.push(target);
            let mut kinds = via[pos..].to_vec();
            kinds.push(edge);
            return Err(cycle_error(urls, &kinds));
        }
        if done.contains(&target) || host.is_compiled(&target) {
            continue;
        }

        let raw = host.raw_card(&target).await?;
        via.push(edge);
        stack.push(Frame::new(&raw));
    }

    debug!(card = %root.url, visited = done.len(), "card graph is acyclic");
    Ok(())
}
