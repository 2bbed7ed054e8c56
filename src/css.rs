//! Heuristic unused-rule removal for a single stylesheet.
//!
//! Selectors are pulled out of the stylesheet with a regex and matched against
//! the `class`/`id` attributes found in the markup, also with regexes. Nothing
//! here parses CSS or HTML: the pass only drops a rule when the line opening it
//! carries a selector judged unused, and it assumes that line maps to exactly
//! one later line holding the closing brace. Nested rules and selector lists
//! spread over several lines are not tracked.

use std::{collections::HashSet, sync::LazyLock};

use regex::Regex;

static SELECTOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"([.#]?[a-zA-Z_-][a-zA-Z0-9_-]*(?:\[[^\]]*\])?(?:::[a-zA-Z-]+)?(?:\s*[,>+~]\s*[a-zA-Z_-][a-zA-Z0-9_-]*)*)\s*\{",
    )
    .expect("selector pattern is valid")
});
static CLASS_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"class="([^"]*)""#).expect("class pattern is valid"));
static ID_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"id="([^"]*)""#).expect("id pattern is valid"));
static CLASS_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.([a-zA-Z_-][a-zA-Z0-9_-]*)").expect("class token is valid"));
static ID_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#([a-zA-Z_-][a-zA-Z0-9_-]*)").expect("id token is valid"));
static RULE_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^{]+)\{").expect("rule pattern is valid"));

/// Prefixes of at-rules and keyframe steps, never stripped.
const ALWAYS_USED_PREFIXES: [&str; 5] = ["@", "from", "to", "0%", "100%"];

const STRUCTURAL_ELEMENTS: [&str; 29] = [
    "html", "body", "main", "article", "section", "div", "p", "h1", "h2", "h3", "h4", "h5", "h6",
    "span", "a", "img", "button", "input", "textarea", "form", "nav", "header", "footer",
    "aside", "ul", "li", "figure", "picture", "source",
];

/// A rule whose selector contains one of these is kept even when unused.
const PROTECTED_KEYWORDS: [&str; 9] = [
    "hover",
    "focus",
    "active",
    "before",
    "after",
    "media",
    "keyframes",
    "root",
    "*",
];

/// Classes and ids referenced by literal attributes in a document.
#[derive(Debug, Default)]
pub struct MarkupIndex {
    classes: HashSet<String>,
    ids: HashSet<String>,
}

impl MarkupIndex {
    pub fn from_html(html: &str) -> Self {
        let classes = CLASS_ATTR
            .captures_iter(html)
            .flat_map(|caps| {
                caps[1]
                    .split_whitespace()
                    .map(str::to_owned)
                    .collect::<Vec<_>>()
            })
            .collect();
        let ids = ID_ATTR
            .captures_iter(html)
            .map(|caps| caps[1].to_owned())
            .collect();
        Self { classes, ids }
    }

    pub fn is_used(&self, selector: &str) -> bool {
        let selector = selector.trim();
        if ALWAYS_USED_PREFIXES
            .iter()
            .any(|prefix| selector.starts_with(prefix))
        {
            return true;
        }
        if CLASS_TOKEN
            .captures_iter(selector)
            .any(|caps| self.classes.contains(&caps[1]))
        {
            return true;
        }
        if ID_TOKEN
            .captures_iter(selector)
            .any(|caps| self.ids.contains(&caps[1]))
        {
            return true;
        }
        if selector.starts_with(['.', '#']) {
            return false;
        }
        let element = selector
            .split_whitespace()
            .next()
            .and_then(|first| first.split(':').next())
            .and_then(|first| first.split('[').next())
            .unwrap_or_default();
        STRUCTURAL_ELEMENTS.contains(&element)
    }
}

/// Selectors found in a stylesheet, split by whether the markup appears to use them.
#[derive(Debug, Default)]
pub struct SelectorUsage {
    pub used: HashSet<String>,
    pub unused: HashSet<String>,
}

pub fn analyze_usage(css: &str, html: &str) -> SelectorUsage {
    let index = MarkupIndex::from_html(html);
    let mut usage = SelectorUsage::default();
    for caps in SELECTOR.captures_iter(css) {
        let selector = caps[1].to_owned();
        if index.is_used(&selector) {
            usage.used.insert(selector);
        } else {
            usage.unused.insert(selector);
        }
    }
    usage
}

fn is_protected(selector: &str) -> bool {
    let selector = selector.to_lowercase();
    PROTECTED_KEYWORDS
        .iter()
        .any(|keyword| selector.contains(keyword))
}

#[derive(Debug)]
pub struct Pruned {
    pub css: String,
    /// Number of selectors judged unused, removed or not.
    pub unused_selectors: usize,
}

/// Drops rules whose opening line names a selector the markup never uses.
pub fn remove_unused(css: &str, html: &str) -> Pruned {
    let usage = analyze_usage(css, html);

    let mut kept = Vec::new();
    let mut skip_rule = false;
    for line in css.split('\n') {
        if !skip_rule && line.contains('{') {
            let opened = RULE_OPEN
                .captures(line.trim())
                .map(|caps| caps[1].trim().to_owned());
            if let Some(selector) = opened {
                if usage.unused.contains(&selector) && !is_protected(&selector) {
                    //skipping ends on a later line holding `}`, even when this line closes the rule
                    skip_rule = true;
                    continue;
                }
            }
        }
        if skip_rule {
            if line.contains('}') {
                skip_rule = false;
            }
            continue;
        }
        kept.push(line);
    }

    Pruned {
        css: kept.join("\n"),
        unused_selectors: usage.unused.len(),
    }
}
