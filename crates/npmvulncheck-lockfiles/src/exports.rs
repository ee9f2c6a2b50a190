//! Subpath `exports` and internal `imports` (`#` specifier) matching.
//!
//! Implements the manifest entry-point matching the npm resolver enforces:
//! condition objects are walked in declaration order (`default` always
//! matches), wildcard patterns pick the longest matching prefix, and `null`
//! targets mean the subpath is explicitly blocked.

use serde_json::Value;

const MAX_INTERNAL_HOPS: usize = 8;

/// Resolve a subpath (`"."` or `"./x"`) against a package's `exports` value.
///
/// `None` means the subpath is not exported; when the manifest declares
/// `exports` at all, callers must treat that as a blocked resolution.
pub fn resolve_exports(exports: &Value, subpath: &str, conditions: &[String]) -> Option<String> {
    match exports {
        Value::String(_) | Value::Array(_) => {
            if subpath == "." {
                resolve_target(exports, None, conditions)
            } else {
                None
            }
        }
        Value::Object(map) => {
            let is_subpath_map = map.keys().any(|k| k.starts_with('.'));
            if is_subpath_map {
                resolve_subpath_map(map, subpath, conditions)
            } else if subpath == "." {
                // A bare conditions object describes the package root.
                resolve_target(exports, None, conditions)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Resolve a `#`-prefixed internal specifier against a manifest's `imports`
/// map. Nested `#` targets are followed up to a fixed hop limit.
pub fn resolve_imports(imports: &Value, specifier: &str, conditions: &[String]) -> Option<String> {
    let mut current = specifier.to_string();
    for _ in 0..MAX_INTERNAL_HOPS {
        let map = imports.as_object()?;
        let resolved = resolve_subpath_map(map, &current, conditions)?;
        if resolved.starts_with('#') {
            current = resolved;
            continue;
        }
        return Some(resolved);
    }
    None
}

fn resolve_subpath_map(
    map: &serde_json::Map<String, Value>,
    subpath: &str,
    conditions: &[String],
) -> Option<String> {
    if let Some(target) = map.get(subpath) {
        return resolve_target(target, None, conditions);
    }
    // Wildcard patterns; the longest prefix before `*` wins, suffix length
    // breaks ties.
    let mut best: Option<(usize, usize, String, &Value)> = None;
    for (key, target) in map {
        let Some(star) = key.find('*') else { continue };
        let (prefix, suffix) = (&key[..star], &key[star + 1..]);
        if subpath.len() < prefix.len() + suffix.len()
            || !subpath.starts_with(prefix)
            || !subpath.ends_with(suffix)
        {
            continue;
        }
        let captured = subpath[prefix.len()..subpath.len() - suffix.len()].to_string();
        let better = match &best {
            None => true,
            Some((best_prefix, best_suffix, _, _)) => {
                prefix.len() > *best_prefix
                    || (prefix.len() == *best_prefix && suffix.len() > *best_suffix)
            }
        };
        if better {
            best = Some((prefix.len(), suffix.len(), captured, target));
        }
    }
    let (_, _, captured, target) = best?;
    resolve_target(target, Some(&captured), conditions)
}

fn resolve_target(target: &Value, captured: Option<&str>, conditions: &[String]) -> Option<String> {
    match target {
        Value::String(s) => Some(match captured {
            Some(cap) => s.replace('*', cap),
            None => s.clone(),
        }),
        Value::Object(map) => {
            for (condition, nested) in map {
                if condition == "default" || conditions.iter().any(|c| c == condition) {
                    return resolve_target(nested, captured, conditions);
                }
            }
            None
        }
        Value::Array(items) => items
            .iter()
            .find_map(|item| resolve_target(item, captured, conditions)),
        // An explicit null blocks the subpath.
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn conds(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn string_exports_cover_root_only() {
        let exports = json!("./index.js");
        assert_eq!(
            resolve_exports(&exports, ".", &conds(&["node", "import"])),
            Some("./index.js".to_string())
        );
        assert_eq!(resolve_exports(&exports, "./extra", &conds(&["node"])), None);
    }

    #[test]
    fn condition_object_in_declaration_order() {
        let exports = json!({
            "import": "./index.mjs",
            "require": "./index.cjs",
            "default": "./index.js"
        });
        assert_eq!(
            resolve_exports(&exports, ".", &conds(&["node", "import"])),
            Some("./index.mjs".to_string())
        );
        assert_eq!(
            resolve_exports(&exports, ".", &conds(&["node", "require"])),
            Some("./index.cjs".to_string())
        );
        assert_eq!(
            resolve_exports(&exports, ".", &conds(&["browser"])),
            Some("./index.js".to_string())
        );
    }

    #[test]
    fn subpath_map_with_nested_conditions() {
        let exports = json!({
            ".": { "import": "./index.mjs", "default": "./index.js" },
            "./utils": { "node": "./utils/node.js", "default": "./utils/browser.js" }
        });
        assert_eq!(
            resolve_exports(&exports, "./utils", &conds(&["node", "import"])),
            Some("./utils/node.js".to_string())
        );
    }

    #[test]
    fn unexported_subpath_is_none() {
        let exports = json!({ ".": "./index.js" });
        assert_eq!(
            resolve_exports(&exports, "./internal/secret", &conds(&["node"])),
            None
        );
    }

    #[test]
    fn null_target_blocks() {
        let exports = json!({ ".": "./index.js", "./package.json": null });
        assert_eq!(
            resolve_exports(&exports, "./package.json", &conds(&["node"])),
            None
        );
    }

    #[test]
    fn wildcard_longest_prefix_wins() {
        let exports = json!({
            "./*": "./dist/*.js",
            "./lib/*": "./dist/lib/*.js"
        });
        assert_eq!(
            resolve_exports(&exports, "./lib/util", &conds(&["node"])),
            Some("./dist/lib/util.js".to_string())
        );
        assert_eq!(
            resolve_exports(&exports, "./other", &conds(&["node"])),
            Some("./dist/other.js".to_string())
        );
    }

    #[test]
    fn imports_with_conditions_and_wildcards() {
        let imports = json!({
            "#db": { "node": "pg", "default": "./db/stub.js" },
            "#internal/*": "./src/internal/*.ts"
        });
        assert_eq!(
            resolve_imports(&imports, "#db", &conds(&["node"])),
            Some("pg".to_string())
        );
        assert_eq!(
            resolve_imports(&imports, "#internal/auth", &conds(&["node"])),
            Some("./src/internal/auth.ts".to_string())
        );
    }

    #[test]
    fn nested_internal_targets_follow() {
        let imports = json!({
            "#a": "#b",
            "#b": "some-pkg"
        });
        assert_eq!(
            resolve_imports(&imports, "#a", &conds(&["node"])),
            Some("some-pkg".to_string())
        );
    }

    #[test]
    fn cyclic_internal_targets_terminate() {
        let imports = json!({
            "#a": "#b",
            "#b": "#a"
        });
        assert_eq!(resolve_imports(&imports, "#a", &conds(&["node"])), None);
    }
}
