//! End-to-end builder scenarios: realm fetch, compile, caching, single-flight
//! and module ownership, over in-memory and on-disk backends.

use std::sync::Arc;
use std::time::Duration;

use card_builder::{Builder, BuilderError, InMemoryRealm};
use card_cache::{CacheManifest, InMemoryModuleRegistry, ModuleRegistry};
use card_common::{encode_card_url, CardUrl, Format};
use card_compiler::{CompileError, RawCard};
use serde_json::json;

const PREFIX: &str = "@cards/compiled";
const STRING: &str = "https://cardstack.com/base/string";
const POST: &str = "https://demo.com/post";
const POST0: &str = "https://demo.com/post0";

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn url(s: &str) -> CardUrl {
    CardUrl::parse(s).unwrap()
}

fn string_card() -> RawCard {
    RawCard::new(url(STRING))
        .with_template(Format::Embedded, "{{@model}}")
        .with_template(Format::Isolated, "{{@model}}")
}

fn post_card() -> RawCard {
    RawCard::new(url(POST))
        .with_schema(
            r#"import { contains } from "@cardstack/types";
import string from "https://cardstack.com/base/string";
export default class Post {
  @contains(string) title;
  @contains(string) body;
}"#,
        )
        .with_template(Format::Embedded, "<h1><@model.title/></h1>")
        .with_template(
            Format::Isolated,
            "<article><h1><@model.title/></h1><p><@model.body/></p></article>",
        )
}

fn post0_card() -> RawCard {
    RawCard::new(url(POST0))
        .adopting("../post")
        .with_data("title", json!("Hello World"))
        .with_data("body", json!("First post."))
}

struct Harness {
    realm: Arc<InMemoryRealm>,
    registry: Arc<InMemoryModuleRegistry>,
    builder: Builder,
}

fn harness(realm: InMemoryRealm) -> Harness {
    let realm = Arc::new(realm);
    let registry = Arc::new(InMemoryModuleRegistry::new(PREFIX));
    let builder = Builder::new(realm.clone(), registry.clone());
    Harness {
        realm,
        registry,
        builder,
    }
}

fn blog() -> Harness {
    harness(InMemoryRealm::with_cards([
        string_card(),
        post_card(),
        post0_card(),
    ]))
}

fn modules_of(registry: &InMemoryModuleRegistry, card: &str) -> usize {
    let marker = format!("/{}/", encode_card_url(&url(card)));
    registry
        .defined()
        .iter()
        .filter(|m| m.as_str().contains(&marker))
        .count()
}

// ---------------------------------------------------------------------------
// Compile scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn post_embedded_inlines_title() {
    let h = blog();
    let post = h.builder.get_compiled_card(&url(POST)).await.unwrap();

    let embedded = post.component(Format::Embedded).unwrap();
    assert_eq!(embedded.used_fields, vec!["title"]);
    let source = h.registry.source(&embedded.module_name).unwrap().source;
    assert!(source.contains(r#""<h1>{{@model.title}}</h1>""#));
}

#[tokio::test]
async fn non_ascii_templates_compile() {
    let h = harness(InMemoryRealm::with_cards([
        string_card(),
        post_card()
            .with_template(Format::Embedded, r#"<h1 title="Título">Café: <@model.title/> ✓</h1>"#)
            .with_template(Format::Isolated, "<p>日本語 <@model.body/> 🎉</p>"),
    ]));
    let post = h.builder.get_compiled_card(&url(POST)).await.unwrap();

    let embedded = post.component(Format::Embedded).unwrap();
    assert_eq!(embedded.used_fields, vec!["title"]);
    let source = h.registry.source(&embedded.module_name).unwrap().source;
    assert!(source.contains(r#"<h1 title=\"Título\">Café: {{@model.title}} ✓</h1>"#));

    let isolated = post.component(Format::Isolated).unwrap();
    let source = h.registry.source(&isolated.module_name).unwrap().source;
    assert!(source.contains("<p>日本語 {{@model.body}} 🎉</p>"));
}

#[tokio::test]
async fn post0_inherits_from_post() {
    let h = blog();
    let post = h.builder.get_compiled_card(&url(POST)).await.unwrap();
    let post0 = h.builder.get_compiled_card(&url(POST0)).await.unwrap();

    assert_eq!(post0.fields, post.fields);
    assert_eq!(
        post0.component(Format::Embedded).unwrap().module_name,
        post.component(Format::Embedded).unwrap().module_name
    );
    assert_eq!(
        post0.data.as_ref().unwrap(),
        json!({ "title": "Hello World", "body": "First post." })
            .as_object()
            .unwrap()
    );
}

#[tokio::test]
async fn child_first_compiles_whole_chain_once() {
    let h = blog();
    h.builder.get_compiled_card(&url(POST0)).await.unwrap();
    h.builder.get_compiled_card(&url(POST)).await.unwrap();
    let stats = h.builder.stats();
    assert_eq!(stats.compiles, 3);
    assert_eq!(stats.raw_fetches, 3);
}

#[tokio::test]
async fn compiled_card_is_served_from_cache() {
    let h = blog();
    let first = h.builder.get_compiled_card(&url(POST)).await.unwrap();
    let second = h.builder.get_compiled_card(&url(POST)).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(h.builder.stats().compiles, 2);
    assert!(h.builder.stats().compiled_hits >= 1);
}

#[tokio::test]
async fn raw_card_is_fetched_once() {
    let h = blog();
    let a = h.builder.get_raw_card(&url(POST)).await.unwrap();
    let b = h.builder.get_raw_card(&url(POST)).await.unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(h.realm.fetch_count(), 1);
}

#[tokio::test]
async fn not_found_is_not_cached() {
    let h = harness(InMemoryRealm::new());
    let err = h.builder.get_raw_card(&url(STRING)).await.unwrap_err();
    assert!(err.is_not_found());

    h.realm.insert(string_card());
    h.builder.get_raw_card(&url(STRING)).await.unwrap();
    assert_eq!(h.realm.fetch_count(), 2);
}

#[tokio::test]
async fn missing_field_card_propagates_not_found() {
    let h = harness(InMemoryRealm::with_cards([post_card()]));
    let err = h.builder.get_compiled_card(&url(POST)).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(h.registry.is_empty());
}

// ---------------------------------------------------------------------------
// Single-flight
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_requests_share_one_compile() {
    let h = harness(
        InMemoryRealm::with_cards([string_card(), post_card()])
            .with_latency(Duration::from_millis(20)),
    );
    let u = url(POST);
    let (a, b) = tokio::join!(
        h.builder.get_compiled_card(&u),
        h.builder.get_compiled_card(&u)
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(Arc::ptr_eq(&a, &b));
    // post and string, each once.
    assert_eq!(h.builder.stats().compiles, 2);
    assert_eq!(h.realm.fetch_count(), 2);
}

#[tokio::test]
async fn many_concurrent_requests_share_one_compile() {
    let h = harness(
        InMemoryRealm::with_cards([string_card(), post_card(), post0_card()])
            .with_latency(Duration::from_millis(10)),
    );
    let u = url(POST0);
    let results = futures::future::join_all((0..8).map(|_| h.builder.get_compiled_card(&u))).await;
    let cards: Vec<_> = results.into_iter().map(Result::unwrap).collect();
    assert!(cards.iter().all(|c| Arc::ptr_eq(c, &cards[0])));
    assert_eq!(h.builder.stats().compiles, 3);
}

#[tokio::test]
async fn concurrent_misses_share_one_failure() {
    let h = harness(InMemoryRealm::new().with_latency(Duration::from_millis(10)));
    let u = url(POST);
    let (a, b) = tokio::join!(h.builder.get_raw_card(&u), h.builder.get_raw_card(&u));
    assert!(a.unwrap_err().is_not_found());
    assert!(b.unwrap_err().is_not_found());

    // Nothing was cached: a later request asks the realm again.
    h.realm.insert(post_card());
    h.builder.get_raw_card(&u).await.unwrap();
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn adoption_cycles_are_rejected() {
    let h = harness(InMemoryRealm::with_cards([
        RawCard::new(url("https://demo.com/a")).adopting("../b"),
        RawCard::new(url("https://demo.com/b")).adopting("../a"),
        RawCard::new(url("https://demo.com/x")).adopting("../y"),
        RawCard::new(url("https://demo.com/y")).adopting("../z"),
        RawCard::new(url("https://demo.com/z")).adopting("../x"),
    ]));
    for card in ["https://demo.com/a", "https://demo.com/x"] {
        let err = h.builder.get_compiled_card(&url(card)).await.unwrap_err();
        assert!(matches!(err, CompileError::CyclicAdoption { .. }), "{card}: {err}");
    }
    // Retrying reports the same cycle rather than hanging.
    let err = h
        .builder
        .get_compiled_card(&url("https://demo.com/b"))
        .await
        .unwrap_err();
    assert!(matches!(err, CompileError::CyclicAdoption { .. }));
    assert!(h.registry.is_empty());
}

#[tokio::test]
async fn missing_format_is_an_error() {
    let h = harness(InMemoryRealm::with_cards([
        RawCard::new(url("https://demo.com/bare")).with_template(Format::Embedded, "x"),
    ]));
    let err = h
        .builder
        .get_compiled_card(&url("https://demo.com/bare"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CompileError::MissingFormat { format: Format::Isolated, .. }
    ));
}

#[tokio::test]
async fn failed_compile_leaves_no_modules_behind() {
    let broken = RawCard::new(url("https://demo.com/broken"))
        .with_schema(
            "import string from 'https://cardstack.com/base/string'; export default class { @contains(string) title; }",
        )
        .with_template(Format::Isolated, "<h1><@model.title/></h1>")
        .with_template(Format::Embedded, "<h1>{{#if @model.title}}</h1>");
    let h = harness(InMemoryRealm::with_cards([string_card(), broken]));

    let err = h
        .builder
        .get_compiled_card(&url("https://demo.com/broken"))
        .await
        .unwrap_err();
    assert!(matches!(err, CompileError::Template { format: Format::Embedded, .. }));

    assert_eq!(modules_of(&h.registry, "https://demo.com/broken"), 0);
    // The field card compiled fine and stays.
    assert!(modules_of(&h.registry, STRING) > 0);
}

// ---------------------------------------------------------------------------
// Ownership and cache mutation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cleanup_undefines_everything_and_is_idempotent() {
    let h = blog();
    h.builder.get_compiled_card(&url(POST0)).await.unwrap();
    assert!(!h.registry.is_empty());
    assert_eq!(h.builder.owned_modules().len(), h.registry.len());

    h.builder.cleanup().unwrap();
    assert!(h.registry.is_empty());
    assert!(h.builder.owned_modules().is_empty());
    h.builder.cleanup().unwrap();

    // Compiled cards referencing the released modules are gone too.
    h.builder.get_compiled_card(&url(POST0)).await.unwrap();
    assert_eq!(h.builder.stats().compiles, 6);
}

#[tokio::test]
async fn cleanup_without_compiles_is_a_noop() {
    let h = blog();
    h.builder.cleanup().unwrap();
    assert!(h.registry.is_empty());
}

#[tokio::test]
async fn delete_compiled_card_undefines_its_modules() {
    let h = blog();
    let post = h.builder.get_compiled_card(&url(POST)).await.unwrap();
    assert!(post.modules.iter().all(|m| h.registry.is_defined(m)));

    let evicted = h.builder.delete_compiled_card(&url(POST)).unwrap().unwrap();
    assert!(Arc::ptr_eq(&evicted, &post));
    assert!(post.modules.iter().all(|m| !h.registry.is_defined(m)));
    assert!(modules_of(&h.registry, STRING) > 0);
    assert!(h.builder.delete_compiled_card(&url(POST)).unwrap().is_none());
}

#[tokio::test]
async fn update_compiled_card_keeps_reused_modules() {
    let h = blog();
    let post = h.builder.get_compiled_card(&url(POST)).await.unwrap();

    let mut edited = (*post).clone();
    edited.data = Some(json!({ "title": "Edited" }).as_object().unwrap().clone());
    let previous = h.builder.update_compiled_card(&url(POST), edited).unwrap();
    assert!(previous.is_some());
    assert!(post.modules.iter().all(|m| h.registry.is_defined(m)));

    let cached = h.builder.get_compiled_card(&url(POST)).await.unwrap();
    assert_eq!(cached.data.as_ref().unwrap()["title"], json!("Edited"));
}

#[tokio::test]
async fn update_of_uncached_card_stores_nothing() {
    let h = blog();
    let previous = h
        .builder
        .update_raw_card(&url(POST), post_card())
        .unwrap();
    assert!(previous.is_none());
    h.builder.get_raw_card(&url(POST)).await.unwrap();
    assert_eq!(h.realm.fetch_count(), 1);
}

#[tokio::test]
async fn invalidate_picks_up_realm_edits_for_that_card_only() {
    let h = blog();
    h.builder.get_compiled_card(&url(POST0)).await.unwrap();

    h.realm.insert(
        post_card().with_template(Format::Embedded, "<h2><@model.title/></h2>"),
    );
    h.builder.invalidate(&url(POST)).unwrap();

    let post = h.builder.get_compiled_card(&url(POST)).await.unwrap();
    let source = h
        .registry
        .source(&post.component(Format::Embedded).unwrap().module_name)
        .unwrap()
        .source;
    assert!(source.contains("<h2>{{@model.title}}</h2>"));

    // Descendants are not invalidated implicitly.
    let post0 = h.builder.get_compiled_card(&url(POST0)).await.unwrap();
    assert!(!Arc::ptr_eq(post0.adopts_from.as_ref().unwrap(), &post));
}

#[tokio::test]
async fn set_raw_card_overrides_realm() {
    let h = blog();
    h.builder
        .set_raw_card(&url(POST), post_card().with_data("title", json!("Seeded")))
        .unwrap();
    let raw = h.builder.get_raw_card(&url(POST)).await.unwrap();
    assert_eq!(raw.data.as_ref().unwrap()["title"], json!("Seeded"));
    assert_eq!(h.realm.fetch_count(), 0);
    assert!(h.builder.delete_raw_card(&url(POST)).unwrap().is_some());
}

// ---------------------------------------------------------------------------
// On-disk configuration
// ---------------------------------------------------------------------------

fn write(dir: &std::path::Path, rel: &str, content: &str) {
    let path = dir.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn disk_project(dir: &std::path::Path) -> card_config::CardsConfig {
    write(
        dir,
        "cards.toml",
        r#"
[project]
name = "blog"

[realms.base]
url = "https://cardstack.com/base/"
path = "base"

[realms.demo]
url = "https://demo.com/"
path = "cards"
"#,
    );
    write(dir, "base/string/card.json", r#"{ "embedded": "e.hbs", "isolated": "e.hbs" }"#);
    write(dir, "base/string/e.hbs", "{{@model}}");
    write(
        dir,
        "cards/post/card.json",
        r#"{ "schema": "schema.js", "embedded": "embedded.hbs", "isolated": "embedded.hbs" }"#,
    );
    write(
        dir,
        "cards/post/schema.js",
        "import string from 'https://cardstack.com/base/string';\nexport default class { @contains(string) title; }",
    );
    write(dir, "cards/post/embedded.hbs", "<h1><@model.title/></h1>");
    write(dir, "cards/post/style.css", "h1 { margin: 0; }");
    card_config::load_config(dir).unwrap()
}

#[tokio::test]
async fn disk_builder_requires_packaged_cache() {
    let tmp = tempfile::tempdir().unwrap();
    let config = disk_project(tmp.path());
    let err = Builder::from_config(&config, tmp.path()).err().unwrap();
    assert!(matches!(err, BuilderError::Packaging { .. }));
}

#[tokio::test]
async fn disk_builder_rejects_prefix_mismatch() {
    let tmp = tempfile::tempdir().unwrap();
    let config = disk_project(tmp.path());
    CacheManifest::init(&tmp.path().join(&config.builder.cache_dir), "@other/prefix").unwrap();
    let err = Builder::from_config(&config, tmp.path()).err().unwrap();
    assert!(matches!(err, BuilderError::Packaging { .. }));
}

#[tokio::test]
async fn disk_builder_compiles_and_cleans_up() {
    let tmp = tempfile::tempdir().unwrap();
    let config = disk_project(tmp.path());
    let cache_dir = tmp.path().join(&config.builder.cache_dir);
    CacheManifest::init(&cache_dir, &config.builder.module_prefix).unwrap();

    let builder = Builder::from_config(&config, tmp.path()).unwrap();
    let post = builder.get_compiled_card(&url(POST)).await.unwrap();
    assert_eq!(post.assets.len(), 1);

    let card_dir = cache_dir.join(encode_card_url(&url(POST)));
    assert!(card_dir.join("schema.js").is_file());
    assert!(card_dir.join("embedded.js").is_file());
    assert!(card_dir.join("style.css").is_file());

    builder.cleanup().unwrap();
    assert!(!card_dir.exists());
    assert!(CacheManifest::open(&cache_dir).is_ok());
}
