//! Module-file resolution for relative and absolute specifiers.
//!
//! Two behaviors behind one type: when the project root carries a
//! tsconfig-style file its `moduleResolution` mode and `customConditions`
//! are honored (the bundler-like mode accepts extensionless relative
//! imports); otherwise resolution is plain Node-style (`node,import,default`
//! for ESM, `node,require,default` for CJS). Results are cached per
//! condition set.

use npmvulncheck_graph::ImportKind;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

const RESOLVABLE_EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "cts", "js", "jsx", "mjs", "cjs"];

#[derive(Debug, Clone, Default)]
pub struct ResolvedModule {
    pub resolved_file_path: Option<PathBuf>,
    pub failed_lookup_locations: Vec<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TsConfigFile {
    #[serde(default)]
    compiler_options: TsCompilerOptions,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TsCompilerOptions {
    module_resolution: Option<String>,
    #[serde(default)]
    custom_conditions: Vec<String>,
}

pub struct ModuleFileResolver {
    root: PathBuf,
    /// Accepts extensionless relative imports in ESM, like a bundler.
    bundler_mode: bool,
    custom_conditions: Vec<String>,
    cache: Mutex<HashMap<(PathBuf, String, String), ResolvedModule>>,
}

impl ModuleFileResolver {
    /// Config-aware constructor: honors `tsconfig.json` (or `jsconfig.json`)
    /// at the project root when present.
    pub fn new(root: &Path) -> Self {
        let mut bundler_mode = false;
        let mut custom_conditions = Vec::new();
        for name in ["tsconfig.json", "jsconfig.json"] {
            let path = root.join(name);
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            match serde_json::from_str::<TsConfigFile>(&strip_json_comments(&content)) {
                Ok(config) => {
                    bundler_mode = config
                        .compiler_options
                        .module_resolution
                        .as_deref()
                        .is_some_and(|m| m.eq_ignore_ascii_case("bundler"));
                    custom_conditions = config.compiler_options.custom_conditions;
                }
                Err(e) => debug!("ignoring unparseable {name}: {e}"),
            }
            break;
        }
        Self {
            root: root.to_path_buf(),
            bundler_mode,
            custom_conditions,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The conditions in effect for an import site: the Node defaults for the
    /// import kind plus config `customConditions` plus the caller's.
    pub fn effective_conditions(&self, kind: ImportKind, extra: &[String]) -> Vec<String> {
        let mut conditions: Vec<String> = match kind {
            ImportKind::CjsRequire => vec!["node".into(), "require".into(), "default".into()],
            _ => vec!["node".into(), "import".into(), "default".into()],
        };
        for c in self.custom_conditions.iter().chain(extra) {
            if !conditions.iter().any(|have| have == c) {
                conditions.push(c.clone());
            }
        }
        conditions
    }

    /// Resolve a relative or absolute specifier issued from `from_file`.
    pub fn resolve(
        &self,
        specifier: &str,
        from_file: &Path,
        kind: ImportKind,
        conditions: &[String],
    ) -> ResolvedModule {
        let condition_key = self.effective_conditions(kind, conditions).join(",");
        let cache_key = (
            from_file.to_path_buf(),
            specifier.to_string(),
            condition_key,
        );
        if let Some(hit) = self.cache.lock().expect("resolver cache lock").get(&cache_key) {
            return hit.clone();
        }
        let result = self.resolve_uncached(specifier, from_file, kind);
        self.cache
            .lock()
            .expect("resolver cache lock")
            .insert(cache_key, result.clone());
        result
    }

    fn resolve_uncached(&self, specifier: &str, from_file: &Path, kind: ImportKind) -> ResolvedModule {
        let base = if specifier.starts_with('/') {
            PathBuf::from(specifier)
        } else {
            let dir = from_file.parent().unwrap_or(&self.root);
            normalize(&dir.join(specifier))
        };
        let mut failed = Vec::new();

        // 1. The literal path.
        if base.is_file() {
            return ResolvedModule {
                resolved_file_path: Some(base),
                failed_lookup_locations: failed,
            };
        }
        failed.push(base.clone());

        // 2. TypeScript convention: a `.js`-suffixed import may name a `.ts`
        //    source.
        if let Some(stem) = strip_js_extension(&base) {
            for ext in ["ts", "tsx", "mts", "cts"] {
                let candidate = stem.with_extension(ext);
                if candidate.is_file() {
                    return ResolvedModule {
                        resolved_file_path: Some(candidate),
                        failed_lookup_locations: failed,
                    };
                }
                failed.push(candidate);
            }
        }

        // 3. Extension and index probing: always for CJS, and for ESM only
        //    under the bundler-like mode.
        if kind == ImportKind::CjsRequire || self.bundler_mode {
            for ext in RESOLVABLE_EXTENSIONS {
                let candidate = append_extension(&base, ext);
                if candidate.is_file() {
                    return ResolvedModule {
                        resolved_file_path: Some(candidate),
                        failed_lookup_locations: failed,
                    };
                }
                failed.push(candidate);
            }
            if base.is_dir() {
                for ext in RESOLVABLE_EXTENSIONS {
                    let candidate = base.join(format!("index.{ext}"));
                    if candidate.is_file() {
                        return ResolvedModule {
                            resolved_file_path: Some(candidate),
                            failed_lookup_locations: failed,
                        };
                    }
                    failed.push(candidate);
                }
            }
        }

        ResolvedModule {
            resolved_file_path: None,
            failed_lookup_locations: failed,
        }
    }
}

/// Whether a resolved path lives inside a dependency package rather than
/// project source.
pub fn is_in_dependency(path: &Path) -> bool {
    path.components()
        .any(|c| matches!(c, Component::Normal(name) if name == "node_modules"))
}

fn strip_js_extension(path: &Path) -> Option<PathBuf> {
    let ext = path.extension()?.to_str()?;
    if matches!(ext, "js" | "jsx" | "mjs" | "cjs") {
        Some(path.with_extension(""))
    } else {
        None
    }
}

fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(format!(".{ext}"));
    PathBuf::from(s)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// tsconfig files allow comments; strip them before handing the text to a
/// strict JSON parser.
fn strip_json_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;
    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = ' ';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn resolves_exact_and_ts_swapped_paths() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("src")).unwrap();
        fs::write(temp.path().join("src/util.ts"), "export const x = 1;").unwrap();
        let resolver = ModuleFileResolver::new(temp.path());
        let from = temp.path().join("src/index.ts");

        let exact = resolver.resolve("./util.ts", &from, ImportKind::EsmImport, &[]);
        assert_eq!(
            exact.resolved_file_path,
            Some(temp.path().join("src/util.ts"))
        );

        // `.js` import naming a `.ts` source.
        let swapped = resolver.resolve("./util.js", &from, ImportKind::EsmImport, &[]);
        assert_eq!(
            swapped.resolved_file_path,
            Some(temp.path().join("src/util.ts"))
        );
    }

    #[test]
    fn extensionless_needs_bundler_or_cjs() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("src")).unwrap();
        fs::write(temp.path().join("src/util.ts"), "export const x = 1;").unwrap();
        let from = temp.path().join("src/index.ts");

        let strict = ModuleFileResolver::new(temp.path());
        let esm = strict.resolve("./util", &from, ImportKind::EsmImport, &[]);
        assert!(esm.resolved_file_path.is_none());
        assert!(!esm.failed_lookup_locations.is_empty());
        let cjs = strict.resolve("./util", &from, ImportKind::CjsRequire, &[]);
        assert!(cjs.resolved_file_path.is_some());

        fs::write(
            temp.path().join("tsconfig.json"),
            r#"{
                // bundler-style resolution
                "compilerOptions": { "moduleResolution": "bundler" }
            }"#,
        )
        .unwrap();
        let bundler = ModuleFileResolver::new(temp.path());
        let esm = bundler.resolve("./util", &from, ImportKind::EsmImport, &[]);
        assert!(esm.resolved_file_path.is_some());
    }

    #[test]
    fn directory_index_probing() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("src/lib")).unwrap();
        fs::write(temp.path().join("src/lib/index.js"), "module.exports = {};").unwrap();
        let resolver = ModuleFileResolver::new(temp.path());
        let from = temp.path().join("src/app.js");
        let result = resolver.resolve("./lib", &from, ImportKind::CjsRequire, &[]);
        assert_eq!(
            result.resolved_file_path,
            Some(temp.path().join("src/lib/index.js"))
        );
    }

    #[test]
    fn custom_conditions_extend_defaults() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("tsconfig.json"),
            r#"{"compilerOptions": {"customConditions": ["development"]}}"#,
        )
        .unwrap();
        let resolver = ModuleFileResolver::new(temp.path());
        let conditions = resolver.effective_conditions(ImportKind::EsmImport, &[]);
        assert_eq!(conditions, ["node", "import", "default", "development"]);
    }

    #[test]
    fn dependency_predicate() {
        assert!(is_in_dependency(Path::new(
            "/app/node_modules/express/index.js"
        )));
        assert!(!is_in_dependency(Path::new("/app/src/index.ts")));
    }

    #[test]
    fn comment_stripping_preserves_strings() {
        let input = r#"{
            // line comment
            "a": "http://not-a-comment", /* block */ "b": 2
        }"#;
        let stripped = strip_json_comments(input);
        let value: serde_json::Value = serde_json::from_str(&stripped).unwrap();
        assert_eq!(value["a"], "http://not-a-comment");
        assert_eq!(value["b"], 2);
    }
}
