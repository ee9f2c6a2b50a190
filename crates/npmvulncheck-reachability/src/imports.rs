//! Import extraction using SWC for JavaScript and TypeScript.
//!
//! One pass over a file's AST collects static imports and re-exports,
//! `require(...)` calls, and dynamic `import(...)` expressions with their
//! source positions and raw text.

use crate::error::{ReachabilityError, Result};
use npmvulncheck_graph::ImportKind;
use std::path::Path;
use swc_common::sync::Lrc;
use swc_common::{SourceMap, SourceMapper, Span};
use swc_ecma_ast::*;
use swc_ecma_parser::{lexer::Lexer, Parser, StringInput, Syntax, TsConfig};
use swc_ecma_visit::{Visit, VisitWith};

/// One import site in a source file. Positions are 1-based.
#[derive(Debug, Clone)]
pub struct ParsedImport {
    pub kind: ImportKind,
    /// `None` when the argument is not a string literal.
    pub specifier: Option<String>,
    pub type_only: bool,
    pub line: usize,
    pub column: usize,
    pub text: String,
    /// The specifier could not be determined statically.
    pub unknown: bool,
}

/// Parse a file and extract every import site.
pub fn parse_imports(file_path: &Path) -> Result<Vec<ParsedImport>> {
    let cm: Lrc<SourceMap> = Default::default();
    let fm = cm
        .load_file(file_path)
        .map_err(|e| ReachabilityError::Parse {
            file: file_path.display().to_string(),
            message: format!("failed to load file: {e}"),
        })?;

    let lexer = Lexer::new(
        determine_syntax(file_path),
        Default::default(),
        StringInput::from(&*fm),
        None,
    );
    let mut parser = Parser::new_from(lexer);
    let module = parser.parse_module().map_err(|e| {
        let mut message = format!("{e:?}");
        for error in parser.take_errors() {
            message.push_str(&format!(" {error:?}"));
        }
        ReachabilityError::Parse {
            file: file_path.display().to_string(),
            message,
        }
    })?;
    // The parser recovers from some malformed syntax; recovered errors still
    // mean the file cannot be trusted for import extraction.
    let errors = parser.take_errors();
    if !errors.is_empty() {
        return Err(ReachabilityError::Parse {
            file: file_path.display().to_string(),
            message: format!("{errors:?}"),
        });
    }

    let mut extractor = ImportExtractor {
        cm,
        imports: Vec::new(),
    };
    module.visit_with(&mut extractor);
    Ok(extractor.imports)
}

/// Determine the syntax (JS vs TS) based on file extension.
fn determine_syntax(file_path: &Path) -> Syntax {
    let extension = file_path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("");
    match extension {
        "ts" | "tsx" | "mts" | "cts" => Syntax::Typescript(TsConfig {
            tsx: extension == "tsx",
            decorators: true,
            ..Default::default()
        }),
        _ => Syntax::Es(Default::default()),
    }
}

struct ImportExtractor {
    cm: Lrc<SourceMap>,
    imports: Vec<ParsedImport>,
}

impl ImportExtractor {
    fn push(&mut self, span: Span, kind: ImportKind, specifier: Option<String>, type_only: bool) {
        let loc = self.cm.lookup_char_pos(span.lo);
        let unknown = specifier.is_none();
        self.imports.push(ParsedImport {
            kind,
            specifier,
            type_only,
            line: loc.line,
            column: loc.col_display + 1,
            text: self.cm.span_to_snippet(span).unwrap_or_default(),
            unknown,
        });
    }
}

impl Visit for ImportExtractor {
    fn visit_import_decl(&mut self, node: &ImportDecl) {
        // A clause is type-only when declared with `import type` or when
        // every named binding carries its own type marker.
        let all_bindings_typed = !node.specifiers.is_empty()
            && node.specifiers.iter().all(|s| match s {
                ImportSpecifier::Named(named) => named.is_type_only,
                _ => false,
            });
        self.push(
            node.span,
            ImportKind::EsmImport,
            Some(node.src.value.to_string()),
            node.type_only || all_bindings_typed,
        );
        node.visit_children_with(self);
    }

    fn visit_named_export(&mut self, node: &NamedExport) {
        if let Some(src) = &node.src {
            let all_bindings_typed = !node.specifiers.is_empty()
                && node.specifiers.iter().all(|s| match s {
                    ExportSpecifier::Named(named) => named.is_type_only,
                    _ => false,
                });
            self.push(
                node.span,
                ImportKind::EsmImport,
                Some(src.value.to_string()),
                node.type_only || all_bindings_typed,
            );
        }
        node.visit_children_with(self);
    }

    fn visit_export_all(&mut self, node: &ExportAll) {
        self.push(
            node.span,
            ImportKind::EsmImport,
            Some(node.src.value.to_string()),
            node.type_only,
        );
        node.visit_children_with(self);
    }

    fn visit_call_expr(&mut self, node: &CallExpr) {
        let kind = match &node.callee {
            Callee::Import(_) => Some(ImportKind::EsmDynamicImport),
            Callee::Expr(expr) => match &**expr {
                Expr::Ident(ident) if &*ident.sym == "require" => Some(ImportKind::CjsRequire),
                _ => None,
            },
            _ => None,
        };
        if let Some(kind) = kind {
            let specifier = node.args.first().and_then(|arg| match &*arg.expr {
                Expr::Lit(Lit::Str(s)) => Some(s.value.to_string()),
                _ => None,
            });
            self.push(node.span, kind, specifier, false);
        }
        node.visit_children_with(self);
    }
}
