//! Import specifier classification.
//!
//! Classifies a raw import specifier as bare / relative / absolute / builtin
//! / subpath-internal, and splits bare specifiers into a package name and a
//! subpath.

/// Node builtin modules, matched with or without the `node:` prefix.
const NODE_BUILTINS: &[&str] = &[
    "assert",
    "assert/strict",
    "async_hooks",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "diagnostics_channel",
    "dns",
    "dns/promises",
    "domain",
    "events",
    "fs",
    "fs/promises",
    "http",
    "http2",
    "https",
    "inspector",
    "module",
    "net",
    "os",
    "path",
    "path/posix",
    "path/win32",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "readline/promises",
    "repl",
    "stream",
    "stream/consumers",
    "stream/promises",
    "stream/web",
    "string_decoder",
    "sys",
    "timers",
    "timers/promises",
    "tls",
    "trace_events",
    "tty",
    "url",
    "util",
    "util/types",
    "v8",
    "vm",
    "wasi",
    "worker_threads",
    "zlib",
];

/// A bare specifier split into its package name and subpath.
///
/// The subpath is `"."` for the package root, otherwise `"./<rest>"` — the
/// form the `exports` matcher consumes directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BareSpecifier {
    pub package_name: String,
    pub subpath: String,
}

pub fn is_relative(spec: &str) -> bool {
    spec.starts_with('.')
}

pub fn is_absolute(spec: &str) -> bool {
    spec.starts_with('/')
}

pub fn is_internal(spec: &str) -> bool {
    spec.starts_with('#')
}

pub fn is_builtin(spec: &str) -> bool {
    let bare = spec.strip_prefix("node:").unwrap_or(spec);
    NODE_BUILTINS.contains(&bare)
}

/// The package name of a bare specifier, or `None` for anything that is not
/// a bare package reference.
pub fn package_name(spec: &str) -> Option<String> {
    parse_bare(spec).map(|b| b.package_name)
}

/// Split a bare specifier into package name and subpath.
///
/// Returns `None` for empty, relative, absolute, `node:`, and `#` specifiers,
/// and for a scope with no package name (`"@foo"`).
pub fn parse_bare(spec: &str) -> Option<BareSpecifier> {
    if spec.is_empty()
        || is_relative(spec)
        || is_absolute(spec)
        || is_internal(spec)
        || spec.starts_with("node:")
    {
        return None;
    }
    if let Some(rest) = spec.strip_prefix('@') {
        // Scoped: the name is the first two segments.
        let slash = rest.find('/')?;
        let scope = &rest[..slash];
        let after_scope = &rest[slash + 1..];
        if scope.is_empty() || after_scope.is_empty() {
            return None;
        }
        let (name_part, subpath) = match after_scope.find('/') {
            Some(i) => (&after_scope[..i], subpath_of(&after_scope[i + 1..])),
            None => (after_scope, ".".to_string()),
        };
        Some(BareSpecifier {
            package_name: format!("@{}/{}", scope, name_part),
            subpath,
        })
    } else {
        let (name, subpath) = match spec.find('/') {
            Some(i) => (&spec[..i], subpath_of(&spec[i + 1..])),
            None => (spec, ".".to_string()),
        };
        if name.is_empty() {
            return None;
        }
        Some(BareSpecifier {
            package_name: name.to_string(),
            subpath,
        })
    }
}

fn subpath_of(rest: &str) -> String {
    if rest.is_empty() {
        ".".to_string()
    } else {
        format!("./{}", rest)
    }
}
