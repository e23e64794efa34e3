use std::collections::BTreeMap;
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use rstest::rstest;
use serde_json::json;
use similar_asserts::assert_eq;

use super::*;
use crate::paths::PathnameOptions;
use crate::paths::basename;
use crate::paths::create_slug;
use crate::paths::editor_uri;
use crate::paths::extname;
use crate::paths::file_path_to_pathname;
use crate::paths::glob_parent;
use crate::paths::join;
use crate::paths::relative_key;
use crate::paths::remove_order_prefix;
use crate::paths::to_kebab_case;

fn write_file(root: &Path, relative: &str, content: &str) -> PathBuf {
	let path = root.join(relative);
	if let Some(parent) = path.parent() {
		std::fs::create_dir_all(parent).unwrap_or_else(|e| panic!("mkdir: {e}"));
	}
	std::fs::write(&path, content).unwrap_or_else(|e| panic!("write: {e}"));
	path
}

fn open_project(root: &Path, mode: BuildMode) -> Project {
	let options = ProjectOptions {
		mode,
		..ProjectOptions::default()
	};
	Project::open(root, options).unwrap_or_else(|e| panic!("open: {e}"))
}

fn parse_module(source: &str) -> Module {
	Module::parse(Path::new("module.ts"), source).unwrap_or_else(|e| panic!("parse: {e}"))
}

#[rstest]
#[case::file("a/b/file.ts", false, "file.ts")]
#[case::strip_extension("a/b/file.test.ts", true, "file.test")]
#[case::trailing_separator("a/b/", false, "b")]
#[case::windows("a\\b\\c.md", true, "c")]
fn basename_of_path(#[case] path: &str, #[case] strip: bool, #[case] expected: &str) {
	assert_eq!(basename(path, strip), expected);
}

#[rstest]
#[case::simple("a/b.ts", ".ts")]
#[case::last_extension("a/b.d.ts", ".ts")]
#[case::dot_file(".gitignore", "")]
#[case::dot_in_directory("a.b/c", "")]
#[case::none("Makefile", "")]
fn extname_of_path(#[case] path: &str, #[case] expected: &str) {
	assert_eq!(extname(path), expected);
}

#[rstest]
#[case::repeated_separators(&["a/", "/b", "c/"], "a/b/c")]
#[case::leading_separator(&["/a", "b"], "/a/b")]
#[case::empty_parts(&["", "a", ""], "a")]
fn join_parts(#[case] parts: &[&str], #[case] expected: &str) {
	assert_eq!(join(parts), expected);
}

#[rstest]
#[case::dot("01.intro", "intro")]
#[case::dash("2-setup", "setup")]
#[case::only_digits("01", "01")]
#[case::no_prefix("v2", "v2")]
#[case::digits_without_separator("2024", "2024")]
fn order_prefix_removal(#[case] segment: &str, #[case] expected: &str) {
	assert_eq!(remove_order_prefix(segment), expected);
}

#[rstest]
#[case::pascal("GettingStarted", "getting-started")]
#[case::acronym("HTMLParser", "html-parser")]
#[case::snake_and_space("my_file name", "my-file-name")]
#[case::already_kebab("already-kebab", "already-kebab")]
#[case::camel("useThing", "use-thing")]
fn kebab_case(#[case] input: &str, #[case] expected: &str) {
	assert_eq!(to_kebab_case(input), expected);
}

#[test]
fn slug_drops_punctuation() {
	assert_eq!(create_slug("Hello, World!"), "hello-world");
	assert_eq!(create_slug("Setup `npm`"), "setup-npm");
}

#[rstest]
#[case::double_star("docs/**/*.mdx", "docs")]
#[case::top_level("*.ts", ".")]
#[case::no_glob("src/components/Button.tsx", "src/components")]
#[case::absolute("/abs/x/*.md", "/abs/x")]
#[case::braces("content/{posts,pages}/*.md", "content")]
fn glob_parent_of_pattern(#[case] pattern: &str, #[case] expected: &str) {
	assert_eq!(glob_parent(pattern), expected);
}

#[rstest]
#[case::defaults(None, None, None, "vscode://file//a/b.ts:0:0")]
#[case::position(Some(10), Some(2), None, "vscode://file//a/b.ts:10:2")]
#[case::scheme(Some(3), None, Some("cursor"), "cursor://file//a/b.ts:3:0")]
fn editor_uri_format(
	#[case] line: Option<u32>,
	#[case] column: Option<u32>,
	#[case] scheme: Option<&str>,
	#[case] expected: &str,
) {
	assert_eq!(editor_uri(Path::new("/a/b.ts"), line, column, scheme), expected);
}

#[rstest]
#[case::order_prefixes("01.getting-started/02.Installation.mdx", PathnameOptions::default(), "/getting-started/installation")]
#[case::index("components/index.tsx", PathnameOptions::default(), "/components/index")]
#[case::readme("README.md", PathnameOptions::default(), "/readme")]
#[case::base_pathname_present(
	"docs/intro.mdx",
	PathnameOptions { base_pathname: Some("docs".into()), ..PathnameOptions::default() },
	"/docs/intro"
)]
#[case::base_pathname_added(
	"intro.mdx",
	PathnameOptions { base_pathname: Some("docs".into()), ..PathnameOptions::default() },
	"/docs/intro"
)]
#[case::package_name(
	"ui/Button.tsx",
	PathnameOptions { package_name: Some("ui".into()), ..PathnameOptions::default() },
	"/button"
)]
#[case::base_directory(
	"src/hooks/useThing.ts",
	PathnameOptions { base_directory: Some("src".into()), ..PathnameOptions::default() },
	"/hooks/use-thing"
)]
fn pathname_of_file(#[case] relative: &str, #[case] options: PathnameOptions, #[case] expected: &str) {
	let root = Path::new("/project");
	assert_eq!(file_path_to_pathname(&root.join(relative), root, true, &options), expected);
}

#[test]
fn pathname_of_root_directory() {
	let root = Path::new("/project");
	assert_eq!(file_path_to_pathname(root, root, false, &PathnameOptions::default()), "/");
}

#[test]
fn relative_key_uses_forward_slashes() {
	assert_eq!(relative_key(Path::new("/r"), Path::new("/r/a/b.ts")), "a/b.ts");
}

#[test]
fn pathname_map_covers_every_node() {
	let root = PathBuf::from("/r");
	let files = vec![
		root.join("docs/01.intro.mdx"),
		root.join("docs/guide/index.mdx"),
		root.join("docs/guide/Advanced Usage.mdx"),
	];
	let tree = SourceNode::from_files(&root, &files);
	let pathnames = compute_pathname_map(&tree, &PathnameOptions::default());

	assert_eq!(pathnames.len(), tree.len());
	let mut nodes = Vec::new();
	tree.walk(&mut |node| nodes.push(node.path.clone()));
	for node in nodes {
		assert!(pathnames.contains_key(&node), "unmapped node {}", node.display());
	}

	assert_eq!(pathnames[&root], "/");
	assert_eq!(pathnames[&root.join("docs")], "/docs");
	assert_eq!(pathnames[&root.join("docs/01.intro.mdx")], "/docs/intro");
	assert_eq!(pathnames[&root.join("docs/guide/index.mdx")], "/docs/guide/index");
	assert_eq!(pathnames[&root.join("docs/guide/Advanced Usage.mdx")], "/docs/guide/advanced-usage");
}

#[test]
fn order_map_is_alphabetical_not_input_order() {
	let root = SourceNode::directory(
		"/r",
		vec![
			SourceNode::file("/r/b"),
			SourceNode::file("/r/a"),
			SourceNode::file("/r/c"),
		],
	);
	let order = compute_order_map(&root, None);

	let expected: BTreeMap<PathBuf, String> = [("/r/a", "01"), ("/r/b", "02"), ("/r/c", "03")]
		.into_iter()
		.map(|(path, key)| (PathBuf::from(path), key.to_string()))
		.collect();
	assert_eq!(order, expected);
}

#[test]
fn order_map_of_empty_directory_is_empty() {
	let root = SourceNode::directory("/r", Vec::new());
	assert!(compute_order_map(&root, None).is_empty());
}

#[test]
fn order_keys_compose_for_nested_public_files() {
	let root = SourceNode::directory(
		"/r",
		vec![
			SourceNode::file("/r/a"),
			SourceNode::file("/r/private"),
			SourceNode::directory("/r/d", vec![SourceNode::file("/r/d/x")]),
		],
	);
	let public: HashSet<PathBuf> = [PathBuf::from("/r/a"), PathBuf::from("/r/d/x")].into_iter().collect();
	let order = compute_order_map(&root, Some(&public));

	assert_eq!(order.get(Path::new("/r/a")).map(String::as_str), Some("01"));
	assert_eq!(order.get(Path::new("/r/d")).map(String::as_str), Some("02"));
	assert_eq!(order.get(Path::new("/r/d/x")).map(String::as_str), Some("02.01"));
	assert!(!order.contains_key(Path::new("/r/private")));
	assert!(!order.contains_key(Path::new("/r")));
}

#[test]
fn locale_compare_orders_lowercase_first_on_ties() {
	let mut names = vec!["b", "B", "a", "A"];
	names.sort_by(|a, b| locale_compare(a, b));
	assert_eq!(names, vec!["a", "A", "b", "B"]);
}

#[test]
fn tree_read_skips_ignored_entries() {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	write_file(tmp.path(), "docs/intro.md", "# Intro\n");
	write_file(tmp.path(), "node_modules/pkg/index.js", "");
	write_file(tmp.path(), ".hidden/secret.md", "");
	write_file(tmp.path(), "generated/out.md", "");
	write_file(tmp.path(), ".gitignore", "generated/\n");

	let tree = SourceNode::read(tmp.path()).unwrap_or_else(|e| panic!("read: {e}"));
	let names: Vec<&str> = tree.children.iter().map(|child| child.name.as_str()).collect();
	assert_eq!(names, vec!["docs"]);
	assert_eq!(tree.children[0].children[0].extension, ".md");
}

#[test]
fn section_tree_nests_and_disambiguates_slugs() {
	let headings = vec![Heading::new(1, "A"), Heading::new(2, "B"), Heading::new(2, "B")];
	let sections = build_section_tree(&headings);

	assert_eq!(sections.len(), 1);
	assert_eq!(sections[0].id, "a");
	let children: Vec<&str> = sections[0].children.iter().map(|child| child.id.as_str()).collect();
	assert_eq!(children, vec!["b", "b-1"]);
}

#[rstest]
#[case::generated_suffix_collides(&["Foo", "Foo", "Foo 1"], &["foo", "foo-1", "foo-1-1"])]
#[case::literal_suffix_first(&["Foo 1", "Foo", "Foo"], &["foo-1", "foo", "foo-2"])]
#[case::repeated(&["Foo", "Foo", "Foo"], &["foo", "foo-1", "foo-2"])]
fn section_ids_are_unique(#[case] titles: &[&str], #[case] expected: &[&str]) {
	let headings: Vec<Heading> = titles.iter().map(|title| Heading::new(1, *title)).collect();
	let sections = build_section_tree(&headings);
	let ids: Vec<&str> = sections.iter().map(|section| section.id.as_str()).collect();
	assert_eq!(ids, expected);
}

#[test]
fn section_tree_pops_to_shallower_headings() {
	let headings = vec![
		Heading::new(2, "One"),
		Heading::new(3, "Deep"),
		Heading::new(1, "Top"),
		Heading::new(2, "Two"),
	];
	let sections = build_section_tree(&headings);

	let value = serde_json::to_value(&sections).unwrap_or_else(|e| panic!("json: {e}"));
	assert_eq!(
		value,
		json!([
			{
				"id": "one",
				"title": "One",
				"depth": 2,
				"children": [{ "id": "deep", "title": "Deep", "depth": 3 }]
			},
			{
				"id": "top",
				"title": "Top",
				"depth": 1,
				"children": [{ "id": "two", "title": "Two", "depth": 2 }]
			}
		])
	);
}

#[test]
fn headings_are_extracted_from_markdown() -> CorpusResult<()> {
	let content = "# Intro\n\nText\n\n## Setup `npm`\n\n### Deep\n\n## Setup `npm`\n";
	let headings = extract_headings(content, false)?;

	assert_eq!(
		headings,
		vec![
			Heading::new(1, "Intro"),
			Heading::new(2, "Setup npm"),
			Heading::new(3, "Deep"),
			Heading::new(2, "Setup npm"),
		]
	);

	let sections = build_section_tree(&headings);
	let ids: Vec<&str> = sections[0].children.iter().map(|child| child.id.as_str()).collect();
	assert_eq!(ids, vec!["setup-npm", "setup-npm-1"]);

	Ok(())
}

#[test]
fn front_matter_is_parsed_as_json() -> CorpusResult<()> {
	let content = "---\ntitle: Hello\norder: 2\n---\n\n# Hello\n";
	assert_eq!(parse_front_matter(content)?, Some(json!({ "title": "Hello", "order": 2 })));
	assert_eq!(parse_front_matter("# No front matter\n")?, None);
	Ok(())
}

const DOCUMENTED: &str = r"/**
 * Adds two numbers.
 *
 * Returns their sum.
 * @param a The first number.
 * @param b The second
 *   number.
 * @returns The sum.
 */
export function add(a: number, b: number) {
	return a + b;
}

// Subtracts numbers.
export const subtract = (a: number, b: number) => a - b;

export const undocumented = 1;

/** See {@link add} for details. */
export const link = 1;

/**
 * @deprecated
 */
export const onlyTags = 1;
";

#[test]
fn describe_symbol_prefers_jsdoc() {
	let module = parse_module(DOCUMENTED);
	assert_eq!(
		describe_symbol(&module, "add").as_deref(),
		Some("Adds two numbers.\n\nReturns their sum.")
	);
}

#[rstest]
#[case::line_comment("subtract", Some("Subtracts numbers."))]
#[case::nothing("undocumented", None)]
#[case::inline_link("link", Some("See add for details."))]
#[case::tags_only("onlyTags", None)]
#[case::unknown("missing", None)]
fn describe_symbol_fallbacks(#[case] name: &str, #[case] expected: Option<&str>) {
	let module = parse_module(DOCUMENTED);
	assert_eq!(describe_symbol(&module, name).as_deref(), expected);
}

#[test]
fn doc_metadata_keeps_paragraphs_and_tags() {
	let module = parse_module(DOCUMENTED);
	let metadata = parse_doc_metadata(&module, "add").unwrap_or_else(|| panic!("metadata"));

	assert_eq!(
		metadata,
		DocMetadata {
			description: Some("Adds two numbers.\n\nReturns their sum.".to_string()),
			tags: vec![
				DocTag {
					name: "param".to_string(),
					text: "a The first number.".to_string(),
				},
				DocTag {
					name: "param".to_string(),
					text: "b The second\nnumber.".to_string(),
				},
				DocTag {
					name: "returns".to_string(),
					text: "The sum.".to_string(),
				},
			],
		}
	);
}

#[test]
fn doc_metadata_is_absent_without_jsdoc() {
	let module = parse_module(DOCUMENTED);
	assert_eq!(parse_doc_metadata(&module, "subtract"), None);
	assert_eq!(parse_doc_metadata(&module, "undocumented"), None);

	let tags_only = parse_doc_metadata(&module, "onlyTags").unwrap_or_else(|| panic!("metadata"));
	assert_eq!(tags_only.description, None);
	assert_eq!(tags_only.tag("deprecated").map(|tag| tag.text.as_str()), Some(""));
}

#[test]
fn jsdoc_on_variable_declarator_is_found() {
	let module = parse_module("const first = 1,\n\t/** The second value. */\n\tsecond = 2;\nexport { second };\n");
	assert_eq!(describe_symbol(&module, "second").as_deref(), Some("The second value."));
}

#[test]
fn module_lists_exports() {
	let module = parse_module(
		"export function a() {}\nexport const b = 1, c = 2;\nconst d = 3;\nexport { d as e };\nexport * from './x';\nexport { f } from './y';\nexport default class Widget {}\n",
	);
	let names: Vec<(String, DeclarationKind)> = module
		.exports()
		.into_iter()
		.map(|export| (export.name, export.kind))
		.collect();

	assert_eq!(
		names,
		vec![
			("a".to_string(), DeclarationKind::Function),
			("b".to_string(), DeclarationKind::Variable),
			("c".to_string(), DeclarationKind::Variable),
			("e".to_string(), DeclarationKind::Variable),
			("f".to_string(), DeclarationKind::ReExport),
			("default".to_string(), DeclarationKind::Class),
		]
	);
}

const CLOSURE_SOURCE: &str = r#"import { a, b } from "./ab";
import "./side-effect.css";

const unused = 1;

/** Doubles. */
function double(value: number) {
	return value * a;
}

export const helper = 2;

export function target() {
	return double(helper);
}

console.log(unused);

export * from "./other";
"#;

const CLOSURE_EXPECTED: &str = r#"import { a } from "./ab";

import "./side-effect.css";

/** Doubles. */
function double(value: number) {
	return value * a;
}

const helper = 2;

export function target() {
	return double(helper);
}"#;

#[test]
fn export_closure_keeps_reachable_declarations() -> CorpusResult<()> {
	let module = parse_module(CLOSURE_SOURCE);
	let closure = extract_export_closure(&module, "target")?;
	assert_eq!(closure, CLOSURE_EXPECTED);

	// The caller's module is untouched.
	assert_eq!(module.text(), CLOSURE_SOURCE);

	Ok(())
}

#[test]
fn export_closure_is_idempotent() -> CorpusResult<()> {
	let first = extract_export_closure(&parse_module(CLOSURE_SOURCE), "target")?;
	let second = extract_export_closure(&parse_module(&first), "target")?;
	assert_eq!(second, first);
	Ok(())
}

#[test]
fn export_closure_follows_export_lists() -> CorpusResult<()> {
	let module = parse_module(
		"const value = 1;\nfunction internal() { return value; }\nconst noise = 2;\nexport { internal as publicName };\n",
	);
	let closure = extract_export_closure(&module, "publicName")?;
	assert_eq!(
		closure,
		"const value = 1;\n\nfunction internal() { return value; }\n\nexport { internal as publicName };"
	);
	Ok(())
}

#[test]
fn export_closure_of_imported_binding_keeps_the_import() -> CorpusResult<()> {
	let module = parse_module(
		"import { helper, other } from './helper';\nexport const local = other;\nexport { helper as tool };\n",
	);
	let closure = extract_export_closure(&module, "tool")?;
	assert_eq!(closure, "import { helper } from './helper';\n\nexport { helper as tool };");

	let again = extract_export_closure(&parse_module(&closure), "tool")?;
	assert_eq!(again, closure);
	Ok(())
}

#[test]
fn export_closure_of_default_export() -> CorpusResult<()> {
	let module = parse_module(
		"const greeting = \"hi\";\nexport default function greet() { return greeting; }\nexport const other = 1;\n",
	);
	let closure = extract_export_closure(&module, "default")?;
	assert_eq!(
		closure,
		"const greeting = \"hi\";\n\nexport default function greet() { return greeting; }"
	);
	Ok(())
}

#[test]
fn export_closure_follows_type_references() -> CorpusResult<()> {
	let module = parse_module(
		"interface Props { label: string }\ntype Unused = number;\nexport function render(props: Props) { return props.label; }\n",
	);
	let closure = extract_export_closure(&module, "render")?;
	assert_eq!(
		closure,
		"interface Props { label: string }\n\nexport function render(props: Props) { return props.label; }"
	);
	Ok(())
}

#[rstest]
#[case::missing("nothing")]
#[case::re_export("other")]
fn export_closure_of_unknown_export_fails(#[case] identifier: &str) {
	let module = parse_module("export { other } from './other';\nexport const here = 1;\n");
	let result = extract_export_closure(&module, identifier);
	assert!(
		matches!(result, Err(CorpusError::Extraction { identifier: ref missing, .. }) if missing == identifier),
		"unexpected result: {result:?}"
	);
}

#[test]
fn metadata_export_is_evaluated_as_literal() -> CorpusResult<()> {
	let module = parse_module(
		r#"export const metadata = {
	title: 'Hello\nWorld',
	count: -3,
	hex: 0x10,
	tags: ["a", `b`],
	nested: { ok: true, none: null },
	"quoted-key": 1.5,
} as const;
"#,
	);

	assert_eq!(
		metadata_export(&module)?,
		Some(json!({
			"title": "Hello\nWorld",
			"count": -3,
			"hex": 16,
			"tags": ["a", "b"],
			"nested": { "ok": true, "none": null },
			"quoted-key": 1.5,
		}))
	);
	Ok(())
}

#[rstest]
#[case::call("export const metadata = { title: getTitle() };")]
#[case::shorthand("const title = 'x';\nexport const metadata = { title };")]
#[case::template_substitution("const x = 1;\nexport const metadata = { title: `a${x}` };")]
#[case::function("export const metadata = { render: () => null };")]
fn metadata_export_rejects_non_literals(#[case] source: &str) {
	let module = parse_module(source);
	let result = metadata_export(&module);
	assert!(
		matches!(result, Err(CorpusError::Configuration { .. })),
		"unexpected result: {result:?}"
	);
}

#[test]
fn literal_unescape() {
	assert_eq!(unescape(r"a\nb\tA\u{1F600}\x41\\"), "a\nb\tA\u{1F600}A\\");
}

const COLLECTIONS_SOURCE: &str = r#"import { createCollection } from "corpus";
import * as corpus from "corpus";
import { createCollection as make } from "corpus";
import { createCollection as unrelated } from "somewhere-else";

export const docs = createCollection("docs/**/*.mdx", {
	baseDirectory: "docs",
	basePath: "guides",
	sort: "order",
	schema: { mdx: { title: "string" } },
	loader: { mdx: (slug) => import(`./docs/${slug}.mdx`) },
});

export const components = corpus.createCollection(`components/*.tsx`);
export const posts = make("posts/*.md", { sort: "date", unknownKey: -1 });
export const ignored = unrelated("ignored/*.md");
"#;

#[test]
fn collection_calls_are_found_through_every_binding() -> CorpusResult<()> {
	let module = parse_module(COLLECTIONS_SOURCE);
	let configurations = find_collection_calls(&module, &EntrypointConfig::default())?;

	let patterns: Vec<&str> = configurations
		.iter()
		.map(|configuration| configuration.pattern.as_str())
		.collect();
	assert_eq!(patterns, vec!["docs/**/*.mdx", "components/*.tsx", "posts/*.md"]);

	let docs = &configurations[0].options;
	assert_eq!(docs.base_directory.as_deref(), Some("docs"));
	assert_eq!(docs.base_path.as_deref(), Some("guides"));
	assert_eq!(docs.sort.as_deref(), Some("order"));
	assert_eq!(
		docs.schema_for(".mdx").and_then(|schema| schema.get("title")).and_then(Literal::as_str),
		Some("string")
	);
	assert!(docs
		.loader
		.as_ref()
		.and_then(|loader| loader.get("mdx"))
		.is_some_and(Literal::is_opaque));

	assert_eq!(configurations[0].call_site.line, 6);
	assert_eq!(configurations[2].options.sort.as_deref(), Some("date"));

	Ok(())
}

#[rstest]
#[case::variable_pattern("import { createCollection } from 'corpus';\nconst p = 'x';\ncreateCollection(p);\n", "3:")]
#[case::non_object_options("import { createCollection } from 'corpus';\ncreateCollection('x', options);\n", "2:")]
#[case::computed_option(
	"import { createCollection } from 'corpus';\ncreateCollection('x', {\n\tsort: getSort(),\n});\n",
	"3:"
)]
#[case::function_outside_schema(
	"import { createCollection } from 'corpus';\ncreateCollection('x', { sort: () => 'a' });\n",
	"2:"
)]
fn collection_calls_must_be_literal(#[case] source: &str, #[case] line: &str) {
	let module = parse_module(source);
	let result = find_collection_calls(&module, &EntrypointConfig::default());

	match result {
		Err(CorpusError::Configuration { location, .. }) => {
			assert!(location.starts_with("module.ts:"), "location: {location}");
			assert!(location.contains(&format!(":{line}")), "location: {location}");
		}
		other => panic!("unexpected result: {other:?}"),
	}
}

#[test]
#[tracing_test::traced_test]
fn duplicate_collection_patterns_keep_the_last_declaration() {
	let mut registry = CollectionRegistry::new();
	let site = |line| CallSite {
		file: PathBuf::from("a.ts"),
		line,
		column: 1,
	};

	registry.register(CollectionConfiguration {
		pattern: "docs/*.mdx".to_string(),
		options: CollectionOptions::default(),
		call_site: site(1),
	});
	registry.register(CollectionConfiguration {
		pattern: "docs/*.mdx".to_string(),
		options: CollectionOptions {
			sort: Some("order".to_string()),
			..CollectionOptions::default()
		},
		call_site: site(9),
	});

	assert_eq!(registry.len(), 1);
	let kept = registry.get("docs/*.mdx").unwrap_or_else(|| panic!("registered"));
	assert_eq!(kept.call_site.line, 9);
	assert_eq!(kept.options.sort.as_deref(), Some("order"));
	assert!(logs_contain("declared more than once"));
}

fn collection_fixture() -> tempfile::TempDir {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	write_file(tmp.path(), "docs/intro.mdx", "---\ntitle: Intro\n---\n\n# Intro\n");
	write_file(tmp.path(), "docs/guides/setup.mdx", "# Setup\n");
	write_file(tmp.path(), "docs/guides/api.md", "# API\n");
	write_file(tmp.path(), "docs/notes.txt", "not matched");
	write_file(
		tmp.path(),
		"src/collections.ts",
		"import { createCollection } from 'corpus';\n\nexport const docs = createCollection('docs/**/*.{md,mdx}');\n",
	);
	tmp
}

#[test]
fn glob_import_string_has_one_entry_per_extension() -> CorpusResult<()> {
	let tmp = collection_fixture();
	let project = open_project(tmp.path(), BuildMode::Development);

	let entries = resolve_glob_import_string(&project, "docs/**/*.{md,mdx}", None)?;
	let parent = project.root().join("docs");
	let parent_text = parent.to_string_lossy().replace('\\', "/");

	let extensions: Vec<&str> = entries.iter().map(|entry| entry.extension.as_str()).collect();
	assert_eq!(extensions, vec![".md", ".mdx"]);
	assert_eq!(entries[0].glob_parent, parent);
	assert_eq!(
		entries[1].source,
		format!("(slug) => import(`{parent_text}/${{slug}}.mdx`)")
	);

	Ok(())
}

#[rstest]
#[case::top_level("*.ts")]
#[case::dot_slash("./*.ts")]
fn top_level_glob_imports_from_the_base_directory(#[case] pattern: &str) -> CorpusResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	write_file(tmp.path(), "index.ts", "export const a = 1;\n");
	let project = open_project(tmp.path(), BuildMode::Production);
	let root_text = project.root().to_string_lossy().replace('\\', "/");

	let entries = resolve_glob_import_string(&project, pattern, None)?;
	assert_eq!(entries.len(), 1);
	assert_eq!(entries[0].glob_parent, project.root().to_path_buf());
	assert_eq!(
		entries[0].source,
		format!("(slug) => import(`{root_text}/${{slug}}.ts`)")
	);
	assert!(!entries[0].source.contains("/./"));

	Ok(())
}

#[test]
fn glob_import_string_without_matches_depends_on_mode() {
	let tmp = collection_fixture();

	let development = open_project(tmp.path(), BuildMode::Development);
	let entries = resolve_glob_import_string(&development, "missing/*.mdx", None)
		.unwrap_or_else(|e| panic!("development: {e}"));
	assert!(entries.is_empty());

	let production = open_project(tmp.path(), BuildMode::Production);
	let result = resolve_glob_import_string(&production, "missing/*.mdx", None);
	assert!(
		matches!(result, Err(CorpusError::NotFound { ref pattern, .. }) if pattern == "missing/*.mdx"),
		"unexpected result: {result:?}"
	);
}

#[test]
fn glob_is_relative_to_tsconfig_directory() -> CorpusResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	write_file(tmp.path(), "site/tsconfig.json", "{}");
	write_file(tmp.path(), "site/posts/hello.md", "# Hello\n");
	write_file(tmp.path(), "posts/outside.md", "# Outside\n");
	let project = open_project(tmp.path(), BuildMode::Production);

	let matches = resolve_glob_files(&project, "posts/*.md", Some("site/tsconfig.json"))?;
	assert_eq!(matches.files, vec![project.root().join("site/posts/hello.md")]);
	Ok(())
}

#[test]
fn import_map_rendering_is_deterministic() {
	let mut maps = BTreeMap::new();
	maps.insert(
		"docs/*.mdx".to_string(),
		vec![ImportMapEntry {
			extension: ".mdx".to_string(),
			glob_parent: PathBuf::from("/site/docs"),
			source: "(slug) => import(`/site/docs/${slug}.mdx`)".to_string(),
		}],
	);

	insta::assert_snapshot!(render_import_map_module(&maps), @r#"
	export const importMaps = {
	  "docs/*.mdx": {
	    ".mdx": (slug) => import(`/site/docs/${slug}.mdx`),
	  },
	};
	"#);
	assert_eq!(render_import_map_module(&BTreeMap::new()), "export const importMaps = {};\n");
}

#[test]
fn import_map_regeneration_is_byte_identical() -> CorpusResult<()> {
	let tmp = collection_fixture();
	let project = open_project(tmp.path(), BuildMode::Development);

	let first = write_collection_import_maps(&project)?;
	let first_content = std::fs::read_to_string(&first.path)?;
	assert!(first.changed);
	assert_eq!(first.collections, 1);
	assert_eq!(first.path, project.root().join(".corpus/import-map.js"));
	assert!(first_content.contains("\"docs/**/*.{md,mdx}\": {"));

	let second = write_collection_import_maps(&project)?;
	let second_content = std::fs::read_to_string(&second.path)?;
	assert!(!second.changed);
	assert_eq!(second_content, first_content);

	Ok(())
}

fn configuration(pattern: &str, options: CollectionOptions) -> CollectionConfiguration {
	CollectionConfiguration {
		pattern: pattern.to_string(),
		options,
		call_site: CallSite {
			file: PathBuf::from("collections.ts"),
			line: 1,
			column: 1,
		},
	}
}

#[test]
fn collection_entries_are_sorted_by_metadata() -> CorpusResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	write_file(tmp.path(), "docs/01.intro.mdx", "---\ntitle: Intro\norder: 2\n---\n\n# Intro\n");
	write_file(tmp.path(), "docs/02.setup.mdx", "---\ntitle: Setup\norder: 1\n---\n\n# Setup\n");
	write_file(
		tmp.path(),
		"docs/03.api.tsx",
		"export const metadata = { title: 'API', order: 3 };\nexport default function Api() { return null; }\n",
	);
	let project = open_project(tmp.path(), BuildMode::Development);

	let entries = load_collection(
		&project,
		&configuration(
			"docs/*.{mdx,tsx}",
			CollectionOptions {
				base_path: Some("docs".to_string()),
				sort: Some("order".to_string()),
				..CollectionOptions::default()
			},
		),
	)?;

	let summary: Vec<(&str, &str)> = entries
		.iter()
		.map(|entry| (entry.pathname.as_str(), entry.order.as_str()))
		.collect();
	assert_eq!(
		summary,
		vec![("/docs/setup", "02"), ("/docs/intro", "01"), ("/docs/api", "03")]
	);
	assert_eq!(entries[2].metadata, Some(json!({ "title": "API", "order": 3 })));

	Ok(())
}

#[test]
fn sorting_requires_metadata() {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	write_file(tmp.path(), "posts/a.md", "---\ndate: 2024-01-01\n---\n");
	write_file(tmp.path(), "posts/b.md", "# No metadata\n");
	let project = open_project(tmp.path(), BuildMode::Development);

	let result = load_collection(
		&project,
		&configuration(
			"posts/*.md",
			CollectionOptions {
				sort: Some("date".to_string()),
				..CollectionOptions::default()
			},
		),
	);
	assert!(
		matches!(result, Err(CorpusError::MissingMetadata { ref file, .. }) if file.ends_with("b.md")),
		"unexpected result: {result:?}"
	);
}

#[rstest]
#[case::missing_required("---\norder: 1\n---\n")]
#[case::wrong_type("---\ntitle: 1\n---\n")]
#[case::forbidden_key("---\ntitle: ok\nconstructor: 1\n---\n")]
fn collection_metadata_is_validated(#[case] front_matter: &str) {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	write_file(tmp.path(), "posts/a.md", front_matter);
	let project = open_project(tmp.path(), BuildMode::Development);

	let schema = Literal::Object(
		[
			("title".to_string(), Literal::String("string".to_string())),
			("order".to_string(), Literal::String("number?".to_string())),
		]
		.into_iter()
		.collect(),
	);
	let result = load_collection(
		&project,
		&configuration(
			"posts/*.md",
			CollectionOptions {
				schema: Some(schema),
				..CollectionOptions::default()
			},
		),
	);
	assert!(matches!(result, Err(CorpusError::Validation(_))), "unexpected result: {result:?}");
}

#[test]
fn project_tracks_supported_source_files() {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	write_file(tmp.path(), "a.ts", "export const a = 1;\r\n");
	write_file(tmp.path(), "README.md", "# Readme\n");
	write_file(tmp.path(), "notes.txt", "ignored");
	write_file(tmp.path(), "node_modules/dep/index.ts", "");
	write_file(tmp.path(), ".corpus/import-map.js", "");
	write_file(tmp.path(), "nested/corpus.toml", "");
	write_file(tmp.path(), "nested/inner.ts", "");
	let project = open_project(tmp.path(), BuildMode::Development);

	let root = project.root().to_path_buf();
	assert_eq!(project.tracked_paths(), vec![root.join("README.md"), root.join("a.ts")]);
	assert_eq!(
		project.file_text(&root.join("a.ts")).as_deref(),
		Some("export const a = 1;\n")
	);
}

#[test]
fn project_respects_exclude_patterns_and_size_limit() {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	write_file(tmp.path(), "keep.ts", "");
	write_file(tmp.path(), "generated/skip.ts", "");

	let options = ProjectOptions {
		exclude_patterns: vec!["generated/".to_string()],
		..ProjectOptions::default()
	};
	let project = Project::open(tmp.path(), options).unwrap_or_else(|e| panic!("open: {e}"));
	assert_eq!(project.tracked_paths(), vec![project.root().join("keep.ts")]);

	write_file(tmp.path(), "big.ts", "export const big = 'xxxxxxxxxxxxxxxx';\n");
	let options = ProjectOptions {
		max_file_size: 8,
		..ProjectOptions::default()
	};
	let result = Project::open(tmp.path(), options);
	assert!(matches!(result, Err(CorpusError::FileTooLarge { .. })), "unexpected result: {result:?}");
}

#[test]
fn config_is_loaded_from_candidates() -> CorpusResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	assert!(CorpusConfig::load(tmp.path())?.is_none());

	write_file(
		tmp.path(),
		".config/corpus.toml",
		"mode = \"production\"\nloader_paths = [\"loaders\"]\n\n[entrypoint]\nmodule = \"my-corpus\"\n\n[server]\nport = 7000\n",
	);
	let config = CorpusConfig::load(tmp.path())?.unwrap_or_else(|| panic!("config"));
	let options = ProjectOptions::from_config(Some(&config));

	assert_eq!(options.mode, BuildMode::Production);
	assert_eq!(options.entrypoint.module, "my-corpus");
	assert_eq!(options.entrypoint.export, DEFAULT_ENTRYPOINT_EXPORT);
	assert_eq!(options.server_port, 7000);
	assert_eq!(options.loader_paths, vec![PathBuf::from("loaders")]);
	assert_eq!(options.cache_directory, PathBuf::from(DEFAULT_CACHE_DIRECTORY));

	Ok(())
}

#[test]
fn invalid_config_is_a_parse_error() {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	write_file(tmp.path(), "corpus.toml", "mode = [");
	assert!(matches!(CorpusConfig::load(tmp.path()), Err(CorpusError::ConfigParse(_))));
}

#[test]
fn language_is_derived_from_extension() {
	assert_eq!(Language::from_path(Path::new("a.mts")), Language::TypeScript);
	assert_eq!(Language::from_path(Path::new("a.tsx")), Language::Tsx);
	assert_eq!(Language::from_path(Path::new("a.jsx")), Language::JavaScript);
	assert_eq!(Language::from_path(Path::new("a.markdown")), Language::Markdown);
	assert_eq!(Language::from_path(Path::new("a.mdx")), Language::Mdx);
	assert_eq!(Language::from_path(Path::new("a.json")), Language::Text);
}

#[tokio::test]
async fn refresh_barrier_waits_for_in_flight_refreshes() {
	let barrier = RefreshBarrier::new();
	let first = barrier.begin();
	let second = barrier.begin();
	assert_eq!(barrier.in_flight(), 2);

	let waited = tokio::time::timeout(Duration::from_millis(50), barrier.settled()).await;
	assert!(waited.is_err(), "settled while refreshes were in flight");

	drop(first);
	drop(second);
	assert_eq!(barrier.in_flight(), 0);
	tokio::time::timeout(Duration::from_secs(1), barrier.settled())
		.await
		.unwrap_or_else(|e| panic!("barrier never settled: {e}"));
}

#[tokio::test]
async fn analysis_reads_the_latest_refresh() -> CorpusResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	write_file(tmp.path(), "src/math.ts", "/** Adds. */\nexport function add() {}\n");
	let project = open_project(tmp.path(), BuildMode::Development);
	let path = project.root().join("src/math.ts");

	std::fs::write(&path, "/** Adds numbers. */\nexport function add() {}\nexport const zero = 0;\n")?;
	project.refresh(Some(&path)).await?;

	let analysis = analyze_source_text(&project, AnalysisRequest::for_path(&path).with_closures()).await?;
	let Analysis::Module { exports } = analysis else {
		panic!("expected a module analysis: {analysis:?}");
	};

	let summary: Vec<(&str, Option<&str>)> = exports
		.iter()
		.map(|export| (export.name.as_str(), export.description.as_deref()))
		.collect();
	assert_eq!(summary, vec![("add", Some("Adds numbers.")), ("zero", None)]);
	assert_eq!(
		exports[0].closure.as_deref(),
		Some("/** Adds numbers. */\nexport function add() {}")
	);

	Ok(())
}

#[tokio::test]
async fn analysis_with_closures_skips_imported_export_list_entries() -> CorpusResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let project = open_project(tmp.path(), BuildMode::Development);

	let analysis = analyze_source_text(
		&project,
		AnalysisRequest::for_text(
			"import { helper } from './helper';\nexport const local = 1;\nexport { helper };\n",
			Language::TypeScript,
		)
		.with_closures(),
	)
	.await?;
	let Analysis::Module { exports } = analysis else {
		panic!("expected a module analysis: {analysis:?}");
	};

	let summary: Vec<(&str, DeclarationKind, bool)> = exports
		.iter()
		.map(|export| (export.name.as_str(), export.kind, export.closure.is_some()))
		.collect();
	assert_eq!(
		summary,
		vec![
			("local", DeclarationKind::Variable, true),
			("helper", DeclarationKind::ReExport, false),
		]
	);

	Ok(())
}

#[tokio::test]
async fn analysis_of_documents_and_text() -> CorpusResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let project = open_project(tmp.path(), BuildMode::Development);

	let document = analyze_source_text(
		&project,
		AnalysisRequest::for_text("---\ntitle: Guide\n---\n\n# Guide\n\n## Install\n", Language::Markdown),
	)
	.await?;
	let Analysis::Document(document) = document else {
		panic!("expected a document analysis: {document:?}");
	};
	assert_eq!(document.front_matter, Some(json!({ "title": "Guide" })));
	assert_eq!(document.sections[0].id, "guide");
	assert_eq!(document.sections[0].children[0].id, "install");

	let text = analyze_source_text(&project, AnalysisRequest::for_text("plain", Language::Text)).await?;
	assert_eq!(
		text,
		Analysis::Text {
			text: "plain".to_string()
		}
	);

	Ok(())
}

type Updates = Arc<Mutex<Vec<PathBuf>>>;

fn record(updates: &Updates) -> impl FnOnce(PathBuf) -> std::future::Ready<()> + use<> {
	let updates = Arc::clone(updates);
	move |path| {
		updates
			.lock()
			.unwrap_or_else(std::sync::PoisonError::into_inner)
			.push(path);
		std::future::ready(())
	}
}

fn recorded(updates: &Updates) -> Vec<PathBuf> {
	updates
		.lock()
		.unwrap_or_else(std::sync::PoisonError::into_inner)
		.clone()
}

#[test]
fn files_are_removed_without_a_runtime() {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	write_file(tmp.path(), "src/gone.ts", "export const gone = 1;\n");
	let project = open_project(tmp.path(), BuildMode::Development);
	let path = project.root().join("src/gone.ts");
	assert!(project.is_tracked(&path));

	assert!(project.remove_file(&path));
	assert!(!project.is_tracked(&path));
	assert!(!project.remove_file(&path));
	assert_eq!(project.barrier().in_flight(), 0);
}

#[tokio::test]
async fn watch_events_register_and_unregister_files() -> CorpusResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let project = open_project(tmp.path(), BuildMode::Development);
	let updates: Updates = Arc::default();
	let path = write_file(project.root(), "src/new.ts", "export const fresh = 1;\n");

	handle_watch_event(&project, &[], WatchEvent::Added(path.clone()), record(&updates)).await?;
	assert!(project.is_tracked(&path));
	assert_eq!(recorded(&updates), vec![path.clone()]);

	std::fs::write(&path, "export const fresh = 2;\n")?;
	handle_watch_event(&project, &[], WatchEvent::Changed(path.clone()), record(&updates)).await?;
	assert_eq!(project.file_text(&path).as_deref(), Some("export const fresh = 2;\n"));

	std::fs::remove_file(&path)?;
	handle_watch_event(&project, &[], WatchEvent::Removed(path.clone()), record(&updates)).await?;
	assert!(!project.is_tracked(&path));
	assert_eq!(recorded(&updates), vec![path.clone(), path.clone(), path]);

	Ok(())
}

#[tokio::test]
async fn watch_events_skip_loader_and_cache_paths() -> CorpusResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let project = open_project(tmp.path(), BuildMode::Development);
	let updates: Updates = Arc::default();
	let loaders = project.root().join("loaders");
	let loader = write_file(project.root(), "loaders/mdx.ts", "export {};\n");
	let cached = write_file(project.root(), ".corpus/import-map.js", "");

	handle_watch_event(&project, &[loaders], WatchEvent::Added(loader.clone()), record(&updates)).await?;
	assert!(!project.is_tracked(&loader));
	assert_eq!(recorded(&updates), vec![loader]);

	handle_watch_event(&project, &[], WatchEvent::Changed(cached), record(&updates)).await?;
	assert_eq!(recorded(&updates).len(), 1);

	Ok(())
}

#[test]
fn notify_renames_become_removal_and_addition() {
	let event = notify::Event::new(notify::EventKind::Modify(notify::event::ModifyKind::Name(
		notify::event::RenameMode::Both,
	)))
	.add_path(PathBuf::from("/r/old.ts"))
	.add_path(PathBuf::from("/r/new.ts"));

	assert_eq!(
		WatchEvent::from_notify(&event),
		vec![
			WatchEvent::Removed(PathBuf::from("/r/old.ts")),
			WatchEvent::Added(PathBuf::from("/r/new.ts")),
		]
	);
}

#[rstest]
#[case::create_then_write(
	vec![WatchEvent::Added(PathBuf::from("/r/a.ts")), WatchEvent::Changed(PathBuf::from("/r/a.ts"))],
	vec![WatchEvent::Added(PathBuf::from("/r/a.ts"))]
)]
#[case::repeated_writes(
	vec![WatchEvent::Changed(PathBuf::from("/r/a.ts")), WatchEvent::Changed(PathBuf::from("/r/a.ts"))],
	vec![WatchEvent::Changed(PathBuf::from("/r/a.ts"))]
)]
#[case::created_then_deleted(
	vec![WatchEvent::Added(PathBuf::from("/r/a.ts")), WatchEvent::Removed(PathBuf::from("/r/a.ts"))],
	vec![WatchEvent::Removed(PathBuf::from("/r/a.ts"))]
)]
#[case::deleted_then_recreated(
	vec![
		WatchEvent::Removed(PathBuf::from("/r/a.ts")),
		WatchEvent::Added(PathBuf::from("/r/a.ts")),
		WatchEvent::Changed(PathBuf::from("/r/a.ts")),
	],
	vec![WatchEvent::Added(PathBuf::from("/r/a.ts"))]
)]
#[case::distinct_paths_keep_first_seen_order(
	vec![
		WatchEvent::Changed(PathBuf::from("/r/b.ts")),
		WatchEvent::Added(PathBuf::from("/r/a.ts")),
		WatchEvent::Changed(PathBuf::from("/r/b.ts")),
		WatchEvent::Changed(PathBuf::from("/r/a.ts")),
	],
	vec![WatchEvent::Changed(PathBuf::from("/r/b.ts")), WatchEvent::Added(PathBuf::from("/r/a.ts"))]
)]
fn watch_events_are_coalesced_per_path(#[case] events: Vec<WatchEvent>, #[case] expected: Vec<WatchEvent>) {
	assert_eq!(coalesce_events(events), expected);
}

fn counting(updates: &Updates) -> impl Fn(PathBuf) -> std::future::Ready<()> + Send + Sync + use<> {
	let updates = Arc::clone(updates);
	move |path| {
		updates
			.lock()
			.unwrap_or_else(std::sync::PoisonError::into_inner)
			.push(path);
		std::future::ready(())
	}
}

fn updates_for(updates: &Updates, path: &Path) -> usize {
	recorded(updates).iter().filter(|recorded| *recorded == path).count()
}

async fn wait_for_updates(updates: &Updates, path: &Path, count: usize) {
	let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
	while updates_for(updates, path) < count {
		assert!(
			tokio::time::Instant::now() < deadline,
			"expected {count} update(s) for {}, saw {:?}",
			path.display(),
			recorded(updates)
		);
		tokio::time::sleep(Duration::from_millis(20)).await;
	}
	// Anything arriving late would be a duplicate.
	tokio::time::sleep(WATCH_DEBOUNCE * 3).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn watcher_reports_each_created_and_deleted_file_once() -> CorpusResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let project = Arc::new(open_project(tmp.path(), BuildMode::Development));
	let updates: Updates = Arc::default();
	let _watcher = create_watcher(Arc::clone(&project), project.loader_paths(), counting(&updates))?;

	let path = project.root().join("fresh.ts");
	std::fs::write(&path, "export const fresh = 1;\n")?;
	wait_for_updates(&updates, &path, 1).await;
	assert_eq!(updates_for(&updates, &path), 1);
	assert!(project.is_tracked(&path));

	std::fs::remove_file(&path)?;
	wait_for_updates(&updates, &path, 2).await;
	assert_eq!(updates_for(&updates, &path), 2);
	assert!(!project.is_tracked(&path));

	Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropped_watcher_stops_reporting() -> CorpusResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let project = Arc::new(open_project(tmp.path(), BuildMode::Development));
	let updates: Updates = Arc::default();
	let watcher = create_watcher(Arc::clone(&project), project.loader_paths(), counting(&updates))?;
	drop(watcher);

	let path = project.root().join("late.ts");
	std::fs::write(&path, "export const late = 1;\n")?;
	tokio::time::sleep(WATCH_DEBOUNCE * 3).await;

	assert_eq!(recorded(&updates), Vec::<PathBuf>::new());
	assert!(!project.is_tracked(&path));

	Ok(())
}
