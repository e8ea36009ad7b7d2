//! Tree-sitter scope resolver for JavaScript, TypeScript, Python, Go and Java.

use super::{Guard, GuardKind, RawScope, RawScopeKind, ScopeResolver, ScopeSkeleton, ScopeTree};
use crate::catalog::{Language, LifecycleTable};
use crate::error::{Result, ScanError};
use crate::matcher::SourceFile;
use streaming_iterator::StreamingIterator;
use tree_sitter::{Node, Parser, Query, QueryCursor};

const JAVASCRIPT_QUERY: &str = r#"
(class_declaration) @class
(class) @class
(function_declaration) @function
(generator_function_declaration) @function
(method_definition) @function
(arrow_function) @closure
(function_expression) @closure
(generator_function) @closure
(finally_clause) @finally
(return_statement) @return
"#;

const TYPESCRIPT_EXTRA_QUERY: &str = r#"
(abstract_class_declaration) @class
"#;

const PYTHON_QUERY: &str = r#"
(class_definition) @class
(function_definition) @function
(lambda) @closure
(finally_clause) @finally
(with_clause) @managed
(return_statement) @return
"#;

const GO_QUERY: &str = r#"
(function_declaration) @function
(method_declaration) @function
(func_literal) @closure
(defer_statement) @deferred
(return_statement) @return
"#;

const JAVA_QUERY: &str = r#"
(class_declaration) @class
(interface_declaration) @class
(enum_declaration) @class
(record_declaration) @class
(object_creation_expression (class_body) @class)
(method_declaration) @function
(constructor_declaration) @function
(lambda_expression) @closure
(finally_clause) @finally
(resource_specification) @managed
(return_statement) @return
"#;

#[derive(Debug, Default, Clone, Copy)]
pub struct SyntaxScopeResolver;

impl SyntaxScopeResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn supports(language: Language) -> bool {
        matches!(
            language,
            Language::JavaScript
                | Language::TypeScript
                | Language::Python
                | Language::Go
                | Language::Java
        )
    }

    fn grammar(source: &SourceFile) -> Option<tree_sitter::Language> {
        let tsx = source
            .path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("tsx"));
        match source.language {
            Language::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
            Language::TypeScript if tsx => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
            Language::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            Language::Python => Some(tree_sitter_python::LANGUAGE.into()),
            Language::Go => Some(tree_sitter_go::LANGUAGE.into()),
            Language::Java => Some(tree_sitter_java::LANGUAGE.into()),
            _ => None,
        }
    }

    fn query_source(language: Language) -> String {
        match language {
            Language::JavaScript => JAVASCRIPT_QUERY.to_string(),
            Language::TypeScript => format!("{}{}", JAVASCRIPT_QUERY, TYPESCRIPT_EXTRA_QUERY),
            Language::Python => PYTHON_QUERY.to_string(),
            Language::Go => GO_QUERY.to_string(),
            Language::Java => JAVA_QUERY.to_string(),
            _ => String::new(),
        }
    }

    /// Parses the file and collects scopes, guards and return statements.
    /// The second value is false when the parse tree contains error nodes.
    fn analyze_ast(&self, source: &SourceFile) -> anyhow::Result<(ScopeSkeleton, bool)> {
        let language = Self::grammar(source)
            .ok_or_else(|| anyhow::anyhow!("no grammar for {}", source.language))?;
        let mut parser = Parser::new();
        parser.set_language(&language)?;

        let tree = parser
            .parse(&source.text, None)
            .ok_or_else(|| anyhow::anyhow!("Failed to parse source"))?;
        let root = tree.root_node();
        let text = source.text.as_bytes();

        let query = Query::new(&language, &Self::query_source(source.language))?;
        let names = query.capture_names();
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&query, root, text);
        let mut skeleton = ScopeSkeleton::default();

        matches.advance();
        while let Some(match_) = matches.get() {
            for capture in match_.captures {
                let node = capture.node;
                let span = node.byte_range();
                match names[capture.index as usize] {
                    "class" => skeleton.scopes.push(
                        RawScope::new(RawScopeKind::Class, span)
                            .named(field_text(node, "name", text)),
                    ),
                    "function" => skeleton.scopes.push(
                        RawScope::new(RawScopeKind::Function, span)
                            .named(field_text(node, "name", text)),
                    ),
                    "closure" => skeleton.scopes.push(
                        RawScope::new(RawScopeKind::Closure, span)
                            .named(closure_name(node, text))
                            .with_callee(hook_callee(node, text))
                            .returned(is_returned(node)),
                    ),
                    "finally" => skeleton.guards.push(Guard {
                        kind: GuardKind::Finally,
                        span,
                    }),
                    "deferred" => skeleton.guards.push(Guard {
                        kind: GuardKind::Deferred,
                        span,
                    }),
                    "managed" => skeleton.guards.push(Guard {
                        kind: GuardKind::Managed,
                        span,
                    }),
                    "return" => skeleton.returns.push(span),
                    _ => {}
                }
            }
            matches.advance();
        }

        Ok((skeleton, !root.has_error()))
    }
}

impl ScopeResolver for SyntaxScopeResolver {
    fn is_precise(&self) -> bool {
        true
    }

    fn resolve(&self, source: &SourceFile, lifecycle: &LifecycleTable) -> Result<ScopeTree> {
        let (skeleton, clean) = self
            .analyze_ast(source)
            .map_err(|e| ScanError::tool_failed("tree-sitter", e.to_string()))?;
        Ok(ScopeTree::build(skeleton, source.text.len(), clean, lifecycle))
    }
}

fn node_text(node: Node<'_>, text: &[u8]) -> Option<String> {
    node.utf8_text(text).ok().map(|s| s.trim().to_string())
}

fn field_text(node: Node<'_>, field: &str, text: &[u8]) -> Option<String> {
    node.child_by_field_name(field)
        .and_then(|n| node_text(n, text))
}

fn last_segment(path: &str) -> String {
    path.rsplit(['.', ':'])
        .next()
        .unwrap_or(path)
        .trim()
        .to_string()
}

/// Name a closure receives from the declaration or property it is assigned to.
fn closure_name(node: Node<'_>, text: &[u8]) -> Option<String> {
    let parent = node.parent()?;
    let field = match parent.kind() {
        "variable_declarator" | "public_field_definition" => "name",
        "field_definition" => "property",
        "pair" => "key",
        "assignment_expression" | "assignment" => "left",
        _ => return None,
    };
    let name = field_text(parent, field, text)?;
    Some(last_segment(name.trim_matches(|c| c == '"' || c == '\'')))
}

/// Callee of the call the closure is passed to, e.g. `useEffect`.
fn hook_callee(node: Node<'_>, text: &[u8]) -> Option<String> {
    let arguments = node.parent()?;
    if !matches!(arguments.kind(), "arguments" | "argument_list") {
        return None;
    }
    let call = arguments.parent()?;
    let field = match call.kind() {
        "call_expression" | "call" => "function",
        "method_invocation" => "name",
        _ => return None,
    };
    field_text(call, field, text).map(|callee| last_segment(&callee))
}

fn is_returned(node: Node<'_>) -> bool {
    let mut current = node;
    while let Some(parent) = current.parent() {
        match parent.kind() {
            "return_statement" => return true,
            "expression_list" | "parenthesized_expression" => current = parent,
            "arrow_function" => {
                return parent
                    .child_by_field_name("body")
                    .is_some_and(|body| body.id() == current.id());
            }
            _ => return false,
        }
    }
    false
}
