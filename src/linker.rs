//! # Reference Linker (component 4.G)
//!
//! Converts parser-emitted imports/references and textual file mentions
//! into resolved edges in the graph: classification, alias/relative
//! resolution, barrel re-export chasing, edge materialization, and pending
//! placeholders for references that don't resolve yet.
//!
//! Grounded on `nodekey.rs`'s `regularize`/`regularize_unchecked` (relative
//! reference resolution against a "home" context) and its
//! `resolve_network_sync`/`_async` (string parse that can report an
//! unresolved reference, to be retried once resolvable) — the same
//! two-phase "resolve now, park if unresolved, retry later" shape spec.md
//! 4.G asks for. Re-export-chase regex matching follows the "regex-based
//! re-export detection" design note in spec.md 9.
use std::collections::{HashMap, HashSet};

use regex::Regex;
use uuid::Uuid;

use crate::identity::{coord, derive_uuid};
use crate::model::{EdgeKind, EdgeProperties};

pub const DEFAULT_MAX_CHASE_DEPTH: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Import,
    ReexportStar,
    ReexportNamed,
    DynamicImport,
    ProseMention,
}

/// A single reference as extracted by a parser, per spec.md 4.G "Inputs".
#[derive(Debug, Clone)]
pub struct RawReference {
    pub kind: ReferenceKind,
    pub symbols: Vec<String>,
    pub is_local: bool,
    pub raw_path: String,
    pub line: u32,
}

/// Absolute-path alias table loaded from the source ecosystem's toolchain
/// config (tsconfig `paths`, Cargo workspace deps, etc.) — opaque to this
/// crate beyond prefix -> absolute-directory mapping.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    prefixes: HashMap<String, String>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_alias(mut self, prefix: impl Into<String>, target_dir: impl Into<String>) -> Self {
        self.prefixes.insert(prefix.into(), target_dir.into());
        self
    }

    fn resolve(&self, raw_path: &str) -> Option<String> {
        for (prefix, target) in &self.prefixes {
            if let Some(rest) = raw_path.strip_prefix(prefix) {
                return Some(format!("{}{}", target.trim_end_matches('/'), rest));
            }
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Not rooted in the project: produces (at most) an IMPORTS_LIBRARY
    /// edge to an external-library placeholder.
    External { package_name: String },
    /// Rooted in the project, pending resolution to an absolute path.
    Local { raw_path: String },
}

/// Classifies a raw import path per spec.md 4.G step 1: anything not
/// starting with `.`, `/`, or a known alias prefix is external.
pub fn classify(raw_path: &str, aliases: &AliasTable) -> Classification {
    if raw_path.starts_with('.') || raw_path.starts_with('/') || aliases.resolve(raw_path).is_some() {
        Classification::Local {
            raw_path: raw_path.to_string(),
        }
    } else {
        let package_name = raw_path.split('/').next().unwrap_or(raw_path).to_string();
        Classification::External { package_name }
    }
}

/// Abstraction over filesystem probing so resolution/chasing is testable
/// without touching a real filesystem. `RealFs` is the production impl.
pub trait FileProbe: Send + Sync {
    fn exists(&self, path: &str) -> bool;
    fn read_to_string(&self, path: &str) -> Option<String>;
}

pub struct RealFs;

impl FileProbe for RealFs {
    fn exists(&self, path: &str) -> bool {
        std::path::Path::new(path).is_file()
    }

    fn read_to_string(&self, path: &str) -> Option<String> {
        std::fs::read_to_string(path).ok()
    }
}

/// Resolves a local reference to an absolute file path, per spec.md 4.G
/// step 2: alias resolution, then relative-to-importer resolution, probing
/// candidate extensions and `<dir>/index.<ext>` in `module_resolution`
/// order, verified to exist on the filesystem.
pub fn resolve_local(
    raw_path: &str,
    importer_dir: &str,
    aliases: &AliasTable,
    module_resolution: &[&str],
    fs: &dyn FileProbe,
) -> Option<String> {
    let based = aliases.resolve(raw_path).unwrap_or_else(|| {
        if let Some(rest) = raw_path.strip_prefix("./").or_else(|| raw_path.strip_prefix('/')) {
            if raw_path.starts_with('/') {
                format!("/{rest}")
            } else {
                join_path(importer_dir, rest)
            }
        } else if let Some(rest) = raw_path.strip_prefix("../") {
            join_path(&parent_dir(importer_dir), rest)
        } else {
            join_path(importer_dir, raw_path)
        }
    });

    if fs.exists(&based) {
        return Some(normalize(&based));
    }
    for ext in module_resolution {
        let candidate = format!("{based}.{ext}");
        if fs.exists(&candidate) {
            return Some(normalize(&candidate));
        }
    }
    for ext in module_resolution {
        let candidate = format!("{based}/index.{ext}");
        if fs.exists(&candidate) {
            return Some(normalize(&candidate));
        }
    }
    None
}

fn join_path(dir: &str, rest: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), rest)
}

fn parent_dir(dir: &str) -> String {
    match dir.trim_end_matches('/').rfind('/') {
        Some(idx) => dir[..idx].to_string(),
        None => "/".to_string(),
    }
}

fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    format!("/{}", parts.join("/"))
}

static STAR_REEXPORT: once_cell::sync::Lazy<Regex> = once_cell::sync::Lazy::new(|| {
    Regex::new(r#"(?m)export\s*\*\s*from\s*["']([^"']+)["']"#).unwrap()
});

static NAMED_REEXPORT: once_cell::sync::Lazy<Regex> = once_cell::sync::Lazy::new(|| {
    Regex::new(r#"(?ms)export\s*(?:type\s*)?\{([^}]*)\}\s*from\s*["']([^"']+)["']"#).unwrap()
});

#[derive(Debug, Clone)]
pub struct ChaseOutcome {
    /// The file where the symbol's ultimate definition lives, if the chase
    /// could follow it all the way through.
    pub resolved_file: Option<String>,
    pub depth_exceeded: bool,
}

/// Follows barrel re-exports of `symbol` starting from `entry_file`, per
/// spec.md 4.G step 3: depth-capped at `max_depth`, cycle-safe via a
/// visited set. Non-trivial computed re-exports degrade to "unresolved
/// through this barrel" rather than being chased, per the design note in
/// spec.md 9 — the caller then materializes a CONSUMES edge to the barrel
/// itself.
pub fn chase_reexports(
    entry_file: &str,
    symbol: &str,
    aliases: &AliasTable,
    module_resolution: &[&str],
    fs: &dyn FileProbe,
    max_depth: usize,
) -> ChaseOutcome {
    let mut visited = HashSet::new();
    let mut current = entry_file.to_string();
    let mut depth = 0;

    loop {
        if !visited.insert(current.clone()) {
            // cycle
            return ChaseOutcome {
                resolved_file: Some(current),
                depth_exceeded: false,
            };
        }
        if depth >= max_depth {
            return ChaseOutcome {
                resolved_file: Some(current),
                depth_exceeded: true,
            };
        }
        let Some(source) = fs.read_to_string(&current) else {
            return ChaseOutcome {
                resolved_file: Some(current),
                depth_exceeded: false,
            };
        };

        let current_dir = parent_dir(&current);
        let mut next: Option<String> = None;

        for cap in NAMED_REEXPORT.captures_iter(&source) {
            let names = &cap[1];
            let from = &cap[2];
            let exports_symbol = names
                .split(',')
                .map(|n| n.trim().split(" as ").next().unwrap_or("").trim())
                .any(|n| n == symbol);
            if exports_symbol {
                next = resolve_local(from, &current_dir, aliases, module_resolution, fs);
                break;
            }
        }
        if next.is_none() {
            if let Some(cap) = STAR_REEXPORT.captures(&source) {
                let from = &cap[1];
                next = resolve_local(from, &current_dir, aliases, module_resolution, fs);
            }
        }

        match next {
            Some(next_file) => {
                current = next_file;
                depth += 1;
            }
            None => {
                return ChaseOutcome {
                    resolved_file: Some(current),
                    depth_exceeded: false,
                };
            }
        }
    }
}

/// A resolved scope to materialize an edge onto: the scope's own span, used
/// to find the enclosing source scope for a reference's line (spec.md 4.G
/// step 4).
#[derive(Debug, Clone)]
pub struct ScopeSpan {
    pub uuid: Uuid,
    pub start_line: u32,
    pub end_line: u32,
}

/// Finds the innermost scope in `scopes` containing `line`, falling back to
/// `file_node_uuid` when no scope encloses it (spec.md 4.G step 4).
pub fn enclosing_scope(scopes: &[ScopeSpan], line: u32, file_node_uuid: Uuid) -> Uuid {
    scopes
        .iter()
        .filter(|s| s.start_line <= line && line <= s.end_line)
        .min_by_key(|s| s.end_line - s.start_line)
        .map(|s| s.uuid)
        .unwrap_or(file_node_uuid)
}

/// One fully-resolved or pending materialization decision for a single raw
/// reference, produced by [`resolve_reference`] and turned into graph edge
/// operations by the orchestrator.
#[derive(Debug, Clone)]
pub enum LinkOutcome {
    Resolved {
        target_file: String,
        symbols: Vec<String>,
    },
    ExternalLibrary {
        package_name: String,
    },
    Pending {
        import_path: String,
        symbols: Vec<String>,
    },
}

/// Resolves a single raw reference end to end: classify, resolve locally,
/// chase re-exports if the target is a barrel, or fall back to pending.
/// This is pure with respect to the graph store — it only touches the
/// filesystem via `fs` — so the orchestrator decides what to do with the
/// outcome (upsert edges vs. park a placeholder).
pub fn resolve_reference(
    reference: &RawReference,
    importer_dir: &str,
    aliases: &AliasTable,
    module_resolution: &[&str],
    fs: &dyn FileProbe,
    max_chase_depth: usize,
) -> LinkOutcome {
    match classify(&reference.raw_path, aliases) {
        Classification::External { package_name } => LinkOutcome::ExternalLibrary { package_name },
        Classification::Local { raw_path } => {
            match resolve_local(&raw_path, importer_dir, aliases, module_resolution, fs) {
                None => LinkOutcome::Pending {
                    import_path: reference.raw_path.clone(),
                    symbols: reference.symbols.clone(),
                },
                Some(resolved_file) => {
                    if reference.symbols.is_empty() {
                        return LinkOutcome::Resolved {
                            target_file: resolved_file,
                            symbols: reference.symbols.clone(),
                        };
                    }
                    // Chase each symbol independently: different named
                    // imports from the same barrel may resolve to
                    // different ultimate files.
                    let mut by_target: HashMap<String, Vec<String>> = HashMap::new();
                    for symbol in &reference.symbols {
                        let outcome = chase_reexports(
                            &resolved_file,
                            symbol,
                            aliases,
                            module_resolution,
                            fs,
                            max_chase_depth,
                        );
                        let target = outcome.resolved_file.unwrap_or_else(|| resolved_file.clone());
                        by_target.entry(target).or_default().push(symbol.clone());
                    }
                    // Spec.md 4.G materializes one CONSUMES edge per
                    // resolved target; when all symbols land on the same
                    // file (the common case) this is a single outcome.
                    if by_target.len() == 1 {
                        let (target_file, symbols) = by_target.into_iter().next().unwrap();
                        LinkOutcome::Resolved {
                            target_file,
                            symbols,
                        }
                    } else {
                        // Degenerate multi-target case: materialize against
                        // the barrel itself rather than silently picking one.
                        LinkOutcome::Resolved {
                            target_file: resolved_file,
                            symbols: reference.symbols.clone(),
                        }
                    }
                }
            }
        }
    }
}

/// Placeholder UUID for a pending import, keyed by `(from_uuid,
/// import_path)` per spec.md 3.1.
pub fn pending_placeholder_uuid(from_uuid: Uuid, import_path: &str) -> Uuid {
    derive_uuid(&coord::pending(&from_uuid.to_string(), import_path))
}

pub fn edge_properties(symbols: &[String], line: u32) -> EdgeProperties {
    let mut dedup = symbols.to_vec();
    dedup.sort();
    dedup.dedup();
    EdgeProperties {
        symbols: dedup,
        line: Some(line),
        resolved_at: None,
        import_path: None,
    }
}

pub fn consumes_kind() -> EdgeKind {
    EdgeKind::Consumes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    struct FakeFs(Map<String, String>);

    impl FileProbe for FakeFs {
        fn exists(&self, path: &str) -> bool {
            self.0.contains_key(path)
        }
        fn read_to_string(&self, path: &str) -> Option<String> {
            self.0.get(path).cloned()
        }
    }

    #[test]
    fn classify_dot_relative_is_local() {
        let aliases = AliasTable::new();
        assert_eq!(
            classify("./sibling", &aliases),
            Classification::Local {
                raw_path: "./sibling".into()
            }
        );
    }

    #[test]
    fn classify_bare_name_is_external() {
        let aliases = AliasTable::new();
        assert_eq!(
            classify("some_lib/sub", &aliases),
            Classification::External {
                package_name: "some_lib".into()
            }
        );
    }

    #[test]
    fn classify_alias_prefix_is_local() {
        let aliases = AliasTable::new().with_alias("@app", "/proj/src");
        assert_eq!(
            classify("@app/widgets", &aliases),
            Classification::Local {
                raw_path: "@app/widgets".into()
            }
        );
    }

    #[test]
    fn resolve_local_probes_extensions_then_index() {
        let mut files = Map::new();
        files.insert("/proj/b.ext".to_string(), String::new());
        let fs = FakeFs(files);
        let resolved = resolve_local("./b", "/proj", &AliasTable::new(), &["ext"], &fs);
        assert_eq!(resolved, Some("/proj/b.ext".to_string()));
    }

    #[test]
    fn resolve_local_falls_back_to_index_file() {
        let mut files = Map::new();
        files.insert("/proj/b/index.ext".to_string(), String::new());
        let fs = FakeFs(files);
        let resolved = resolve_local("./b", "/proj", &AliasTable::new(), &["ext"], &fs);
        assert_eq!(resolved, Some("/proj/b/index.ext".to_string()));
    }

    #[test]
    fn resolve_local_returns_none_when_nothing_matches() {
        let fs = FakeFs(Map::new());
        let resolved = resolve_local("./missing", "/proj", &AliasTable::new(), &["ext"], &fs);
        assert!(resolved.is_none());
    }

    #[test]
    fn chase_follows_named_reexport_to_ultimate_definition() {
        let mut files = Map::new();
        files.insert(
            "/proj/index.ext".to_string(),
            r#"export { foo } from "./impl""#.to_string(),
        );
        files.insert("/proj/impl.ext".to_string(), "function foo() {}".to_string());
        let fs = FakeFs(files);
        let outcome = chase_reexports(
            "/proj/index.ext",
            "foo",
            &AliasTable::new(),
            &["ext"],
            &fs,
            DEFAULT_MAX_CHASE_DEPTH,
        );
        assert_eq!(outcome.resolved_file, Some("/proj/impl.ext".to_string()));
        assert!(!outcome.depth_exceeded);
    }

    #[test]
    fn chase_follows_star_reexport() {
        let mut files = Map::new();
        files.insert(
            "/proj/index.ext".to_string(),
            r#"export * from "./impl""#.to_string(),
        );
        files.insert("/proj/impl.ext".to_string(), "function foo() {}".to_string());
        let fs = FakeFs(files);
        let outcome = chase_reexports(
            "/proj/index.ext",
            "foo",
            &AliasTable::new(),
            &["ext"],
            &fs,
            DEFAULT_MAX_CHASE_DEPTH,
        );
        assert_eq!(outcome.resolved_file, Some("/proj/impl.ext".to_string()));
    }

    #[test]
    fn chase_detects_cycles() {
        let mut files = Map::new();
        files.insert(
            "/proj/a.ext".to_string(),
            r#"export { foo } from "./b""#.to_string(),
        );
        files.insert(
            "/proj/b.ext".to_string(),
            r#"export { foo } from "./a""#.to_string(),
        );
        let fs = FakeFs(files);
        let outcome = chase_reexports(
            "/proj/a.ext",
            "foo",
            &AliasTable::new(),
            &["ext"],
            &fs,
            DEFAULT_MAX_CHASE_DEPTH,
        );
        assert!(!outcome.depth_exceeded);
        assert!(outcome.resolved_file.is_some());
    }

    #[test]
    fn chase_caps_depth() {
        let mut files = Map::new();
        for i in 0..20 {
            files.insert(
                format!("/proj/f{i}.ext"),
                format!(r#"export {{ foo }} from "./f{}""#, i + 1),
            );
        }
        let fs = FakeFs(files);
        let outcome = chase_reexports("/proj/f0.ext", "foo", &AliasTable::new(), &["ext"], &fs, 10);
        assert!(outcome.depth_exceeded);
    }

    #[test]
    fn enclosing_scope_picks_innermost() {
        let scopes = vec![
            ScopeSpan {
                uuid: Uuid::from_u128(1),
                start_line: 1,
                end_line: 100,
            },
            ScopeSpan {
                uuid: Uuid::from_u128(2),
                start_line: 10,
                end_line: 20,
            },
        ];
        let file_uuid = Uuid::from_u128(99);
        assert_eq!(enclosing_scope(&scopes, 15, file_uuid), Uuid::from_u128(2));
        assert_eq!(enclosing_scope(&scopes, 50, file_uuid), Uuid::from_u128(1));
        assert_eq!(enclosing_scope(&scopes, 500, file_uuid), file_uuid);
    }

    #[test]
    fn resolve_reference_unresolved_local_becomes_pending() {
        let fs = FakeFs(Map::new());
        let reference = RawReference {
            kind: ReferenceKind::Import,
            symbols: vec!["foo".into()],
            is_local: true,
            raw_path: "./b".into(),
            line: 3,
        };
        let outcome = resolve_reference(
            &reference,
            "/proj",
            &AliasTable::new(),
            &["ext"],
            &fs,
            DEFAULT_MAX_CHASE_DEPTH,
        );
        assert!(matches!(outcome, LinkOutcome::Pending { import_path, .. } if import_path == "./b"));
    }

    #[test]
    fn resolve_reference_external_package() {
        let fs = FakeFs(Map::new());
        let reference = RawReference {
            kind: ReferenceKind::Import,
            symbols: vec![],
            is_local: false,
            raw_path: "some_lib/util".into(),
            line: 1,
        };
        let outcome = resolve_reference(
            &reference,
            "/proj",
            &AliasTable::new(),
            &["ext"],
            &fs,
            DEFAULT_MAX_CHASE_DEPTH,
        );
        assert!(matches!(outcome, LinkOutcome::ExternalLibrary { package_name } if package_name == "some_lib"));
    }

    #[test]
    fn edge_properties_dedups_symbols() {
        let props = edge_properties(&["a".into(), "b".into(), "a".into()], 5);
        assert_eq!(props.symbols, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(props.line, Some(5));
    }
}
