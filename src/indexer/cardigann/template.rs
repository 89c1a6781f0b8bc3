//! Go-template subset used inside definitions
//!
//! Supports `{{ .Path }}`, `{{ if }}/{{ else if }}/{{ else }}/{{ end }}`, and the
//! functions `or`, `and`, `not`, `eq`, `ne`, `join` and `re_replace`.
//! Anything else is left in the output untouched.
//!
//! Rendering runs to a fixed point with a hard pass cap so conditional
//! bodies resolve fully. Substituted values are opaque: text pulled from the
//! environment (keywords, settings, earlier fields) is emitted as-is and never
//! parsed as a template.

use std::collections::HashMap;

use regex::Regex;

/// Hard cap on re-evaluation passes
const MAX_PASSES: usize = 50;

/// Delimiters of a value slot in intermediate output. Values live outside the
/// text being re-parsed and are spliced back in once rendering settles.
const SLOT_OPEN: char = '\u{E000}';
const SLOT_CLOSE: char = '\u{E001}';

/// A value bound in the template environment
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateValue {
    Text(String),
    List(Vec<String>),
    Bool(bool),
    Null,
}

impl TemplateValue {
    pub fn is_truthy(&self) -> bool {
        match self {
            TemplateValue::Text(s) => !s.is_empty(),
            TemplateValue::List(items) => !items.is_empty(),
            TemplateValue::Bool(b) => *b,
            TemplateValue::Null => false,
        }
    }

    pub fn render(&self) -> String {
        match self {
            TemplateValue::Text(s) => s.clone(),
            TemplateValue::List(items) => items.join(","),
            TemplateValue::Bool(b) => b.to_string(),
            TemplateValue::Null => String::new(),
        }
    }
}

impl From<&str> for TemplateValue {
    fn from(s: &str) -> Self {
        TemplateValue::Text(s.to_string())
    }
}

impl From<String> for TemplateValue {
    fn from(s: String) -> Self {
        TemplateValue::Text(s)
    }
}

impl From<Vec<String>> for TemplateValue {
    fn from(items: Vec<String>) -> Self {
        TemplateValue::List(items)
    }
}

impl From<bool> for TemplateValue {
    fn from(b: bool) -> Self {
        TemplateValue::Bool(b)
    }
}

/// Variables visible to a template, keyed by dotted path without the
/// leading dot (`Keywords`, `Config.sort`, `Result.title`).
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: HashMap<String, TemplateValue>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<TemplateValue>) {
        let name = name.into();
        let name = name.trim_start_matches('.').to_string();
        self.vars.insert(name, value.into());
    }

    pub fn get(&self, name: &str) -> Option<&TemplateValue> {
        self.vars.get(name.trim_start_matches('.'))
    }

    /// Rendered text of a variable, empty when unbound
    pub fn text(&self, name: &str) -> String {
        self.get(name).map(|v| v.render()).unwrap_or_default()
    }
}

/// Render a template against an environment
pub fn evaluate(template: &str, env: &Environment) -> String {
    evaluate_with(template, env, &|s| s.to_string())
}

/// Render a template, passing every substituted value through `escape`
/// (literal template text is never escaped)
pub fn evaluate_with(template: &str, env: &Environment, escape: &dyn Fn(&str) -> String) -> String {
    let mut values = Vec::new();
    let mut current = template.replace([SLOT_OPEN, SLOT_CLOSE], "");
    for _ in 0..MAX_PASSES {
        if !current.contains("{{") {
            break;
        }
        let next = render_pass(&current, env, &mut values);
        if next == current {
            break;
        }
        current = next;
    }
    fill_slots(&current, &values, escape)
}

fn fill_slots(text: &str, values: &[String], escape: &dyn Fn(&str) -> String) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find(SLOT_OPEN) {
        out.push_str(&rest[..open]);
        let after = &rest[open + SLOT_OPEN.len_utf8()..];
        let slot = after.find(SLOT_CLOSE).and_then(|close| {
            let index: usize = after[..close].parse().ok()?;
            Some((values.get(index)?, close))
        });
        match slot {
            Some((value, close)) => {
                out.push_str(&escape(value));
                rest = &after[close + SLOT_CLOSE.len_utf8()..];
            }
            None => rest = after,
        }
    }
    out.push_str(rest);
    out
}

#[derive(Debug)]
enum Token<'a> {
    Text(&'a str),
    Action {
        inner: &'a str,
        start: usize,
        end: usize,
    },
}

fn tokenize(source: &str) -> Vec<Token<'_>> {
    let mut tokens = vec![];
    let mut pos = 0;

    while pos < source.len() {
        let Some(open) = source[pos..].find("{{").map(|i| pos + i) else {
            tokens.push(Token::Text(&source[pos..]));
            break;
        };
        let Some(close) = source[open + 2..].find("}}").map(|i| open + 2 + i) else {
            tokens.push(Token::Text(&source[pos..]));
            break;
        };

        if open > pos {
            tokens.push(Token::Text(&source[pos..open]));
        }
        let inner = source[open + 2..close]
            .trim()
            .trim_start_matches('-')
            .trim_end_matches('-')
            .trim();
        tokens.push(Token::Action {
            inner,
            start: open,
            end: close + 2,
        });
        pos = close + 2;
    }

    tokens
}

#[derive(Debug)]
enum Node<'a> {
    Text(&'a str),
    Action {
        expr: &'a str,
        raw: &'a str,
    },
    If {
        branches: Vec<(&'a str, Vec<Node<'a>>)>,
        otherwise: Vec<Node<'a>>,
        raw: &'a str,
    },
}

enum Terminator<'a> {
    Else(Option<&'a str>),
    End,
}

fn keyword<'a>(inner: &'a str, word: &str) -> Option<&'a str> {
    let rest = inner.strip_prefix(word)?;
    if rest.is_empty() {
        Some(rest)
    } else if rest.starts_with(char::is_whitespace) {
        Some(rest.trim())
    } else {
        None
    }
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token<'a>>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn parse_block(&mut self, nested: bool) -> (Vec<Node<'a>>, Option<Terminator<'a>>) {
        let mut nodes = vec![];

        while self.pos < self.tokens.len() {
            let index = self.pos;
            self.pos += 1;

            let (inner, start, end) = match &self.tokens[index] {
                Token::Text(text) => {
                    nodes.push(Node::Text(*text));
                    continue;
                }
                Token::Action { inner, start, end } => (*inner, *start, *end),
            };
            let source: &'a str = self.source;
            let raw = &source[start..end];

            if nested {
                if keyword(inner, "end").is_some_and(str::is_empty) {
                    return (nodes, Some(Terminator::End));
                }
                if let Some(rest) = keyword(inner, "else") {
                    let cond = keyword(rest, "if");
                    return (nodes, Some(Terminator::Else(cond)));
                }
            }

            match keyword(inner, "if") {
                Some(cond) if !cond.is_empty() => match self.parse_if(cond, start) {
                    Some(node) => nodes.push(node),
                    None => {
                        self.pos = index + 1;
                        nodes.push(Node::Text(raw));
                    }
                },
                _ => nodes.push(Node::Action { expr: inner, raw }),
            }
        }

        (nodes, None)
    }

    /// Parse the remainder of an `if` block; `None` when it is never closed
    fn parse_if(&mut self, first_cond: &'a str, start: usize) -> Option<Node<'a>> {
        let source: &'a str = self.source;
        let mut branches = vec![];
        let mut cond = first_cond;

        loop {
            let (body, terminator) = self.parse_block(true);
            branches.push((cond, body));
            match terminator? {
                Terminator::End => {
                    return Some(Node::If {
                        branches,
                        otherwise: vec![],
                        raw: &source[start..self.end_of_previous()],
                    });
                }
                Terminator::Else(Some(next)) => cond = next,
                Terminator::Else(None) => {
                    let (otherwise, terminator) = self.parse_block(true);
                    return match terminator? {
                        Terminator::End => Some(Node::If {
                            branches,
                            otherwise,
                            raw: &source[start..self.end_of_previous()],
                        }),
                        Terminator::Else(_) => None,
                    };
                }
            }
        }
    }

    fn end_of_previous(&self) -> usize {
        match self.tokens.get(self.pos.wrapping_sub(1)) {
            Some(Token::Action { end, .. }) => *end,
            _ => self.source.len(),
        }
    }
}

fn render_pass(source: &str, env: &Environment, values: &mut Vec<String>) -> String {
    let mut parser = Parser {
        source,
        tokens: tokenize(source),
        pos: 0,
    };
    let (nodes, _) = parser.parse_block(false);

    let mut out = String::with_capacity(source.len());
    render_nodes(&nodes, env, values, &mut out);
    out
}

fn render_nodes(nodes: &[Node<'_>], env: &Environment, values: &mut Vec<String>, out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Action { expr, raw } => match eval_expr(expr, env) {
                Some(value) => {
                    out.push(SLOT_OPEN);
                    out.push_str(&values.len().to_string());
                    out.push(SLOT_CLOSE);
                    values.push(value.render());
                }
                None => {
                    tracing::debug!(action = %raw, "Leaving unsupported template action verbatim");
                    out.push_str(raw);
                }
            },
            Node::If {
                branches,
                otherwise,
                raw,
            } => {
                let mut chosen: Option<&[Node<'_>]> = None;
                let mut unknown = false;
                for (cond, body) in branches {
                    match eval_expr(cond, env) {
                        Some(value) if value.is_truthy() => {
                            chosen = Some(body.as_slice());
                            break;
                        }
                        Some(_) => {}
                        None => {
                            unknown = true;
                            break;
                        }
                    }
                }

                if unknown {
                    out.push_str(raw);
                } else {
                    render_nodes(chosen.unwrap_or(otherwise.as_slice()), env, values, out);
                }
            }
        }
    }
}

/// Split an expression into arguments, keeping quoted strings and
/// parenthesised sub-expressions whole.
fn split_args(expr: &str) -> Option<Vec<&str>> {
    let bytes = expr.as_bytes();
    let mut args = vec![];
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b' ' | b'\t' | b'\n' | b'\r' => i += 1,
            b'"' => {
                let start = i;
                i += 1;
                while i < bytes.len() && bytes[i] != b'"' {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
                if i >= bytes.len() {
                    return None;
                }
                i += 1;
                args.push(&expr[start..i]);
            }
            b'`' => {
                let start = i;
                i += 1;
                while i < bytes.len() && bytes[i] != b'`' {
                    i += 1;
                }
                if i >= bytes.len() {
                    return None;
                }
                i += 1;
                args.push(&expr[start..i]);
            }
            b'(' => {
                let start = i;
                let mut depth = 0;
                while i < bytes.len() {
                    match bytes[i] {
                        b'(' => depth += 1,
                        b')' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    i += 1;
                }
                if i >= bytes.len() {
                    return None;
                }
                i += 1;
                args.push(&expr[start..i]);
            }
            _ => {
                let start = i;
                while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                args.push(&expr[start..i]);
            }
        }
    }

    Some(args)
}

fn unquote(literal: &str) -> String {
    if let Some(raw) = literal.strip_prefix('`').and_then(|s| s.strip_suffix('`')) {
        return raw.to_string();
    }
    let inner = &literal[1..literal.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn eval_arg(arg: &str, env: &Environment) -> Option<TemplateValue> {
    if arg.starts_with('"') || arg.starts_with('`') {
        return Some(TemplateValue::Text(unquote(arg)));
    }
    if let Some(inner) = arg.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        return eval_expr(inner, env);
    }
    if arg.starts_with('.') {
        return Some(match env.get(arg) {
            Some(value) => value.clone(),
            None => {
                tracing::trace!(variable = %arg, "Template variable is unbound");
                TemplateValue::Null
            }
        });
    }
    match arg {
        "true" => Some(TemplateValue::Bool(true)),
        "false" => Some(TemplateValue::Bool(false)),
        "nil" => Some(TemplateValue::Null),
        _ if arg.parse::<f64>().is_ok() => Some(TemplateValue::Text(arg.to_string())),
        _ => None,
    }
}

fn eval_expr(expr: &str, env: &Environment) -> Option<TemplateValue> {
    let args = split_args(expr.trim())?;
    let (head, rest) = args.split_first()?;

    if rest.is_empty() {
        if let Some(value) = eval_arg(head, env) {
            return Some(value);
        }
    }

    let values = || -> Option<Vec<TemplateValue>> {
        rest.iter().map(|a| eval_arg(a, env)).collect()
    };

    match *head {
        "or" => {
            let values = values()?;
            let fallback = values.last().cloned().unwrap_or(TemplateValue::Null);
            Some(values.into_iter().find(|v| v.is_truthy()).unwrap_or(fallback))
        }
        "and" => {
            let values = values()?;
            if values.iter().all(|v| v.is_truthy()) {
                Some(values.last().cloned().unwrap_or(TemplateValue::Null))
            } else {
                Some(TemplateValue::Text(String::new()))
            }
        }
        "not" => {
            let values = values()?;
            Some(TemplateValue::Bool(!values.first()?.is_truthy()))
        }
        "eq" | "ne" => {
            let values = values()?;
            let (first, others) = values.split_first()?;
            if others.is_empty() {
                return None;
            }
            let wanted = first.render();
            let equal = others.iter().any(|v| v.render() == wanted);
            Some(TemplateValue::Bool(if *head == "eq" { equal } else { !equal }))
        }
        "join" => {
            let values = values()?;
            let [list, sep] = values.as_slice() else {
                return None;
            };
            let sep = sep.render();
            Some(TemplateValue::Text(match list {
                TemplateValue::List(items) => items.join(&sep),
                other => other.render(),
            }))
        }
        "re_replace" => {
            let values = values()?;
            let [input, pattern, replacement] = values.as_slice() else {
                return None;
            };
            match Regex::new(&pattern.render()) {
                Ok(re) => Some(TemplateValue::Text(
                    re.replace_all(&input.render(), replacement.render().as_str())
                        .into_owned(),
                )),
                Err(e) => {
                    tracing::warn!(pattern = %pattern.render(), error = %e, "Invalid regex in template");
                    Some(input.clone())
                }
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Environment {
        let mut env = Environment::new();
        env.set("Keywords", "ubuntu 22.04");
        env.set("Config.sort", "seeders");
        env.set("Config.freeleech", true);
        env.set("Config.empty", "");
        env.set("Config.nested", "{{ .Config.sort }}-desc");
        env.set("Config.cookie", "SECRET");
        env.set("Categories", vec!["1".to_string(), "7".to_string()]);
        env
    }

    #[test]
    fn test_variable_lookup() {
        assert_eq!(evaluate("q={{ .Keywords }}", &env()), "q=ubuntu 22.04");
        assert_eq!(evaluate("{{.Config.sort}}", &env()), "seeders");
        assert_eq!(evaluate("[{{ .Config.missing }}]", &env()), "[]");
    }

    #[test]
    fn test_if_else() {
        let e = env();
        assert_eq!(
            evaluate("{{ if .Config.freeleech }}free{{ else }}all{{ end }}", &e),
            "free"
        );
        assert_eq!(
            evaluate("{{ if .Config.empty }}yes{{ else }}no{{ end }}", &e),
            "no"
        );
        assert_eq!(evaluate("a{{ if .Config.empty }}b{{ end }}c", &e), "ac");
    }

    #[test]
    fn test_else_if_chain() {
        let tpl = "{{ if eq .Config.sort \"size\" }}S{{ else if eq .Config.sort \"seeders\" }}P{{ else }}X{{ end }}";
        assert_eq!(evaluate(tpl, &env()), "P");
    }

    #[test]
    fn test_nested_if() {
        let tpl = "{{ if .Keywords }}{{ if .Config.empty }}a{{ else }}b{{ end }}-{{ .Config.sort }}{{ end }}";
        assert_eq!(evaluate(tpl, &env()), "b-seeders");
    }

    #[test]
    fn test_or_and() {
        let e = env();
        assert_eq!(evaluate("{{ or .Config.empty .Config.sort }}", &e), "seeders");
        assert_eq!(evaluate("{{ and .Keywords .Config.sort }}", &e), "seeders");
        assert_eq!(evaluate("{{ and .Keywords .Config.empty }}", &e), "");
        assert_eq!(
            evaluate("{{ if or .Config.empty .Keywords }}y{{ else }}n{{ end }}", &e),
            "y"
        );
        assert_eq!(
            evaluate("{{ if and .Keywords .Config.empty }}y{{ else }}n{{ end }}", &e),
            "n"
        );
    }

    #[test]
    fn test_eq_ne() {
        let e = env();
        assert_eq!(evaluate("{{ eq .Config.sort \"seeders\" }}", &e), "true");
        assert_eq!(evaluate("{{ ne .Config.sort \"seeders\" }}", &e), "false");
        assert_eq!(
            evaluate("{{ if ne .Config.sort \"size\" }}y{{ end }}", &e),
            "y"
        );
    }

    #[test]
    fn test_join() {
        assert_eq!(evaluate("{{ join .Categories \";\" }}", &env()), "1;7");
        assert_eq!(evaluate("{{ .Categories }}", &env()), "1,7");
    }

    #[test]
    fn test_re_replace() {
        assert_eq!(
            evaluate("{{ re_replace .Keywords \"\\\\s+\" \"+\" }}", &env()),
            "ubuntu+22.04"
        );
    }

    #[test]
    fn test_conditional_bodies_resolve_fully() {
        assert_eq!(
            evaluate(
                "{{ if .Config.freeleech }}{{ if .Keywords }}{{ .Config.sort }}-{{ .Keywords }}{{ end }}{{ end }}",
                &env()
            ),
            "seeders-ubuntu 22.04"
        );
    }

    #[test]
    fn test_substituted_values_are_not_reparsed() {
        assert_eq!(evaluate("{{ .Config.nested }}", &env()), "{{ .Config.sort }}-desc");

        let mut e = env();
        e.set("Keywords", "{{ .Config.cookie }}");
        assert_eq!(evaluate("/search?q={{ .Keywords }}", &e), "/search?q={{ .Config.cookie }}");
        assert_eq!(
            evaluate_with("/search?q={{ .Keywords }}", &e, &|s| urlencoding::encode(s).into_owned()),
            "/search?q=%7B%7B%20.Config.cookie%20%7D%7D"
        );

        e.set("Keywords", "{{ if .Config.freeleech }}x{{ end }}");
        assert_eq!(evaluate("{{ join .Categories \",\" }} {{ .Keywords }}", &e), "1,7 {{ if .Config.freeleech }}x{{ end }}");
    }

    #[test]
    fn test_unknown_function_left_verbatim() {
        let tpl = "x {{ printf \"%s\" .Keywords }} y";
        assert_eq!(evaluate(tpl, &env()), tpl);
        let tpl = "{{ if weird .Keywords }}a{{ end }}";
        assert_eq!(evaluate(tpl, &env()), tpl);
    }

    #[test]
    fn test_unbalanced_if_left_verbatim() {
        assert_eq!(
            evaluate("{{ if .Keywords }}open {{ .Config.sort }}", &env()),
            "{{ if .Keywords }}open seeders"
        );
    }

    #[test]
    fn test_idempotent_at_fixed_point() {
        let e = env();
        for tpl in [
            "{{ if .Config.freeleech }}free={{ .Keywords }}{{ end }}",
            "{{ printf \"x\" }} {{ .Config.sort }}",
            "plain text",
        ] {
            let once = evaluate(tpl, &e);
            assert_eq!(evaluate(&once, &e), once);
        }
    }

    #[test]
    fn test_self_referencing_value_terminates() {
        let mut e = Environment::new();
        e.set("Config.loop", "{{ .Config.loop }}x");
        assert_eq!(evaluate("{{ .Config.loop }}", &e), "{{ .Config.loop }}x");
    }

    #[test]
    fn test_escape_applies_to_values_only() {
        let out = evaluate_with("search/{{ .Keywords }}/", &env(), &|s| s.replace(' ', "%20"));
        assert_eq!(out, "search/ubuntu%2022.04/");
    }

    #[test]
    fn test_trim_markers() {
        assert_eq!(evaluate("{{- .Config.sort -}}", &env()), "seeders");
    }
}
