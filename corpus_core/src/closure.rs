use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;

use tree_sitter::Node;

use crate::CorpusError;
use crate::CorpusResult;
use crate::analysis::ImportDeclaration;
use crate::analysis::Item;
use crate::analysis::Module;
use crate::analysis::named_children;

/// Isolate one export of `module` together with everything it transitively
/// references inside the module.
///
/// Top-level statements form a reference graph; the statements reachable from
/// the declaration exporting `identifier` are emitted in source order with
/// their leading comments. Re-exports and statements that declare nothing are
/// dropped, other exported declarations that are reachable lose their
/// `export` keyword and imports keep only the specifiers that are used. An
/// imported binding exported through `export { … }` keeps its import.
///
/// Running this on its own output yields the same text.
pub fn extract_export_closure(module: &Module, identifier: &str) -> CorpusResult<String> {
	let items = module.items();
	let root = find_root(module, &items, identifier).ok_or_else(|| CorpusError::Extraction {
		identifier: identifier.to_string(),
		file: module.path().display().to_string(),
	})?;

	let mut bindings: HashMap<String, Vec<usize>> = HashMap::new();
	for (index, item) in items.iter().enumerate() {
		let names: Vec<&str> = match item {
			Item::Declaration(declaration) => declaration.names.iter().map(String::as_str).collect(),
			Item::Import(import) => import
				.specifiers
				.iter()
				.map(|specifier| specifier.local.as_str())
				.collect(),
			_ => Vec::new(),
		};
		for name in names {
			bindings.entry(name.to_string()).or_default().push(index);
		}
	}

	let mut reachable: BTreeSet<usize> = BTreeSet::new();
	let mut used_imports: HashSet<String> = HashSet::new();
	let mut queue: VecDeque<usize> = root.declarations.iter().copied().collect();
	reachable.extend(root.declarations.iter().copied());
	if let Some((index, local)) = &root.import {
		reachable.insert(*index);
		used_imports.insert(local.clone());
	}

	while let Some(index) = queue.pop_front() {
		let Item::Declaration(declaration) = &items[index] else {
			continue;
		};
		for name in references(module, declaration.statement) {
			let Some(targets) = bindings.get(&name) else {
				continue;
			};
			for &target in targets {
				match &items[target] {
					Item::Import(_) => {
						used_imports.insert(name.clone());
						reachable.insert(target);
					}
					_ => {
						if reachable.insert(target) {
							queue.push_back(target);
						}
					}
				}
			}
		}
	}

	let mut pieces = Vec::new();
	for (index, item) in items.iter().enumerate() {
		let piece = match item {
			Item::Import(import) if import.specifiers.is_empty() => {
				Some(with_comments(module, &items, index, module.node_text(import.node)))
			}
			Item::Import(import) if reachable.contains(&index) => {
				render_import(module, import, &used_imports)
					.map(|text| with_comments(module, &items, index, &text))
			}
			Item::Declaration(declaration) if reachable.contains(&index) => {
				let keep_export = root.keeps_export && root.declarations.contains(&index);
				let text = if declaration.exported && !keep_export {
					module.node_text(declaration.node)
				} else {
					module.node_text(declaration.statement)
				};
				Some(with_comments(module, &items, index, text))
			}
			_ => None,
		};
		pieces.extend(piece);
	}

	if let Some(export_list) = root.export_list {
		pieces.push(export_list);
	}

	Ok(pieces.join("\n\n").trim().to_string())
}

struct Root {
	/// Top-level items declaring the exported binding.
	declarations: Vec<usize>,
	/// Whether those declarations keep their own `export` keyword.
	keeps_export: bool,
	/// A re-created `export { … }` entry when the binding was exported through
	/// an export list.
	export_list: Option<String>,
	/// The import providing an export list entry's binding, with that binding.
	import: Option<(usize, String)>,
}

fn find_root(module: &Module, items: &[Item<'_>], identifier: &str) -> Option<Root> {
	let direct: Vec<usize> = items
		.iter()
		.enumerate()
		.filter(|(_, item)| match item {
			Item::Declaration(declaration) if declaration.exported => {
				if declaration.default_export {
					identifier == "default"
				} else {
					declaration.names.iter().any(|name| name == identifier)
				}
			}
			_ => false,
		})
		.map(|(index, _)| index)
		.collect();

	if !direct.is_empty() {
		return Some(Root {
			declarations: direct,
			keeps_export: true,
			export_list: None,
			import: None,
		});
	}

	let local = items.iter().find_map(|item| match item {
		Item::ExportList { specifiers, .. } => specifiers
			.iter()
			.find(|specifier| specifier.exported == identifier)
			.map(|specifier| specifier.local.clone()),
		_ => None,
	})?;

	let declarations: Vec<usize> = items
		.iter()
		.enumerate()
		.filter(|(_, item)| match item {
			Item::Declaration(declaration) => declaration.names.iter().any(|name| *name == local),
			_ => false,
		})
		.map(|(index, _)| index)
		.collect();

	let import = if declarations.is_empty() {
		items.iter().position(|item| match item {
			Item::Import(import) => import.specifiers.iter().any(|specifier| specifier.local == local),
			_ => false,
		})
	} else {
		None
	};

	if declarations.is_empty() && import.is_none() {
		tracing::debug!(
			file = %module.path().display(),
			identifier,
			local,
			"export list entry has no local binding"
		);
		return None;
	}

	let export_list = if local == identifier {
		format!("export {{ {local} }};")
	} else {
		format!("export {{ {local} as {identifier} }};")
	};

	Some(Root {
		declarations,
		keeps_export: false,
		export_list: Some(export_list),
		import: import.map(|index| (index, local)),
	})
}

/// Every identifier a statement mentions, including type references.
fn references(module: &Module, node: Node<'_>) -> HashSet<String> {
	let mut names = HashSet::new();
	let mut stack = vec![node];

	while let Some(current) = stack.pop() {
		match current.kind() {
			"identifier" | "type_identifier" | "shorthand_property_identifier" => {
				names.insert(module.node_text(current).to_string());
			}
			"comment" | "string" | "number" => {}
			_ => stack.extend(named_children(current)),
		}
	}

	names
}

/// The source of `text` preceded by the contiguous comments above item
/// `index`.
fn with_comments(module: &Module, items: &[Item<'_>], index: usize, text: &str) -> String {
	let statement_start = item_node(&items[index]).start_byte();
	let mut start = statement_start;

	for item in items[..index].iter().rev() {
		let Item::Comment(comment) = item else {
			break;
		};
		if !module.text()[comment.end_byte()..start].trim().is_empty() {
			break;
		}
		start = comment.start_byte();
	}

	format!("{}{text}", &module.text()[start..statement_start])
}

fn item_node<'tree>(item: &Item<'tree>) -> Node<'tree> {
	match item {
		Item::Import(import) => import.node,
		Item::ReExport { node, .. } | Item::ExportList { node, .. } => *node,
		Item::Declaration(declaration) => declaration.statement,
		Item::Comment(node) | Item::Other(node) => *node,
	}
}

/// Render an import declaration keeping only the used specifiers, or `None`
/// when none is used.
fn render_import(module: &Module, import: &ImportDeclaration<'_>, used: &HashSet<String>) -> Option<String> {
	let kept: Vec<_> = import
		.specifiers
		.iter()
		.filter(|specifier| used.contains(&specifier.local))
		.collect();

	if kept.is_empty() {
		return None;
	}
	if kept.len() == import.specifiers.len() {
		return Some(module.node_text(import.node).to_string());
	}

	let mut clauses = Vec::new();
	if let Some(default) = kept.iter().find(|specifier| specifier.imported == "default" && specifier.text == specifier.local) {
		clauses.push(default.local.clone());
	}
	if let Some(namespace) = kept.iter().find(|specifier| specifier.imported == "*") {
		clauses.push(namespace.text.clone());
	}
	let named: Vec<&str> = kept
		.iter()
		.filter(|specifier| specifier.imported != "*" && !(specifier.imported == "default" && specifier.text == specifier.local))
		.map(|specifier| specifier.text.as_str())
		.collect();
	if !named.is_empty() {
		clauses.push(format!("{{ {} }}", named.join(", ")));
	}

	let source = import
		.node
		.child_by_field_name("source")
		.map_or_else(|| format!("\"{}\"", import.source), |source| module.node_text(source).to_string());
	let keyword = if import.type_only { "import type" } else { "import" };

	Some(format!("{keyword} {} from {source};", clauses.join(", ")))
}
