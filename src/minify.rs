//! Text-level minifiers for the site's stylesheet, script and markup.
//!
//! Each minifier is a fixed, ordered list of substitutions. Comment stripping
//! always runs before whitespace collapsing. Output is never validated.

use std::sync::LazyLock;

use regex::Regex;

fn pattern(src: &str) -> Regex {
    Regex::new(src).expect("minifier pattern is valid")
}

static BLOCK_COMMENT: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?s)/\*.*?\*/"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| pattern(r"\s+"));
static OPEN_BRACE: LazyLock<Regex> = LazyLock::new(|| pattern(r"\s*\{\s*"));
static CLOSE_BRACE: LazyLock<Regex> = LazyLock::new(|| pattern(r"\s*\}\s*"));
static SEMICOLON: LazyLock<Regex> = LazyLock::new(|| pattern(r"\s*;\s*"));
static COLON: LazyLock<Regex> = LazyLock::new(|| pattern(r"\s*:\s*"));
static COMMA: LazyLock<Regex> = LazyLock::new(|| pattern(r"\s*,\s*"));
static OPEN_PAREN: LazyLock<Regex> = LazyLock::new(|| pattern(r"\s*\(\s*"));
static CLOSE_PAREN: LazyLock<Regex> = LazyLock::new(|| pattern(r"\s*\)\s*"));
static TRAILING_SEMICOLONS: LazyLock<Regex> = LazyLock::new(|| pattern(r";+\}"));
static EMPTY_RULE: LazyLock<Regex> = LazyLock::new(|| pattern(r"[^}]+\{\s*\}"));
static CONSOLE_LOG: LazyLock<Regex> = LazyLock::new(|| pattern(r"console\.log\([^)]*\);?"));
static BETWEEN_TAGS: LazyLock<Regex> = LazyLock::new(|| pattern(r">\s+<"));
static URL_AHEAD: LazyLock<Regex> = LazyLock::new(|| pattern(r"^[/\s]*http"));

/// Minifies until a further pass changes nothing, so the output is stable.
pub fn minify_css(css: &str) -> String {
    let mut current = css_pass(css);
    loop {
        let next = css_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn css_pass(css: &str) -> String {
    let css = BLOCK_COMMENT.replace_all(css, "");
    let css = WHITESPACE.replace_all(&css, " ");
    let css = OPEN_BRACE.replace_all(&css, "{");
    let css = CLOSE_BRACE.replace_all(&css, "}");
    let css = SEMICOLON.replace_all(&css, ";");
    let css = COLON.replace_all(&css, ":");
    let css = COMMA.replace_all(&css, ",");
    let css = TRAILING_SEMICOLONS.replace_all(&css, "}");
    let css = EMPTY_RULE.replace_all(&css, "");
    css.trim().to_owned()
}

pub fn minify_js(js: &str) -> String {
    let js = strip_line_comments(js);
    let js = BLOCK_COMMENT.replace_all(&js, "");
    let js = WHITESPACE.replace_all(&js, " ");
    let js = OPEN_BRACE.replace_all(&js, "{");
    let js = CLOSE_BRACE.replace_all(&js, "}");
    let js = SEMICOLON.replace_all(&js, ";");
    let js = COMMA.replace_all(&js, ",");
    let js = OPEN_PAREN.replace_all(&js, "(");
    let js = CLOSE_PAREN.replace_all(&js, ")");
    let js = CONSOLE_LOG.replace_all(&js, "");
    js.trim().to_owned()
}

pub fn minify_html(html: &str) -> String {
    let html = strip_html_comments(html);
    let html = BETWEEN_TAGS.replace_all(&html, "><");
    let html = WHITESPACE.replace_all(&html, " ");
    html.trim().to_owned()
}

/// Removes `//` comments up to the end of their line.
///
/// A `//` directly after a `:` (as in `https://`) or followed by something
/// that looks like a URL is left alone. String literals are not tracked.
fn strip_line_comments(js: &str) -> String {
    let mut out = String::with_capacity(js.len());
    let mut copied = 0;
    let mut search = 0;
    while let Some(found) = js[search..].find("//") {
        let pos = search + found;
        if js[..pos].ends_with(':') || URL_AHEAD.is_match(&js[pos + 2..]) {
            search = pos + 1;
            continue;
        }
        out.push_str(&js[copied..pos]);
        let end = js[pos..].find('\n').map_or(js.len(), |nl| pos + nl);
        copied = end;
        search = end;
    }
    out.push_str(&js[copied..]);
    out
}

/// Removes `<!-- -->` comments, keeping conditional comments (`<!--[if ...`).
fn strip_html_comments(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    while let Some(start) = rest.find("<!--") {
        let body = &rest[start + 4..];
        if body.starts_with("[if") {
            out.push_str(&rest[..start + 1]);
            rest = &rest[start + 1..];
            continue;
        }
        match body.find("-->") {
            Some(end) => {
                out.push_str(&rest[..start]);
                rest = &body[end + 3..];
            }
            None => break,
        }
    }
    out.push_str(rest);
    out
}

/// Points the markup at the minified stylesheet and script.
pub fn rewrite_asset_references(html: &str, rewrites: &[(&str, &str)]) -> String {
    rewrites
        .iter()
        .fold(html.to_owned(), |html, (from, to)| html.replace(from, to))
}
