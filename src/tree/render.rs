use std::collections::{HashMap, HashSet};

use ecow::{EcoString, eco_format};
use phf::phf_set;

use crate::settings::RenderSettings;

use super::from::FromElement;
use super::node::{NodeId, SharedNode};

/// Words that cannot appear as bare identifiers in query text.
static RESERVED_WORDS: phf::Set<&'static str> = phf_set! {
    "all", "and", "as", "asc", "between", "by", "cross", "delete", "desc",
    "distinct", "else", "empty", "end", "escape", "except", "exists", "false",
    "fetch", "from", "full", "group", "having", "ilike", "in", "inner",
    "insert", "intersect", "into", "is", "join", "left", "like", "limit",
    "materialized", "member", "not", "null", "of", "offset", "on", "or",
    "order", "outer", "right", "select", "set", "then", "true", "union",
    "update", "values", "versioned", "when", "where", "with",
};

pub(crate) fn identifier_needs_quotes(id: &str) -> bool {
    let valid = match id.as_bytes() {
        [] => false,
        [first, rest @ ..] => {
            (first.is_ascii_alphabetic() || *first == b'_')
                && rest
                    .iter()
                    .all(|&b| b == b'_' || b == b'$' || b.is_ascii_alphanumeric())
        }
    };
    !valid || RESERVED_WORDS.contains(id.to_ascii_lowercase().as_str())
}

/// Append an identifier, backtick-quoting it when it is not a plain word.
pub(crate) fn identifier_append<'b>(buf: &'b mut String, id: &str) -> &'b mut String {
    if identifier_needs_quotes(id) {
        buf.push('`');
        buf.push_str(&id.replace('`', "``"));
        buf.push('`');
    } else {
        buf.push_str(id);
    }
    buf
}

/// Append a single-quoted string literal, doubling embedded quotes.
pub(crate) fn string_literal_append<'b>(buf: &'b mut String, value: &str) -> &'b mut String {
    buf.push('\'');
    for c in value.chars() {
        if c == '\'' {
            buf.push('\'');
        }
        buf.push(c);
    }
    buf.push('\'');
    buf
}

/// Per-render session state.
///
/// Assigns each from-element an alias on first sight and returns the same
/// alias for the rest of the render. Explicit aliases are used as-is;
/// anonymous elements get `{prefix}{n}`, skipping any name already taken.
/// Assignment order is first-seen-first-assigned, so rendering the same tree
/// with two fresh contexts produces identical text.
#[derive(Debug)]
pub struct RenderContext {
    prefix: EcoString,
    aliases: HashMap<NodeId, EcoString>,
    taken: HashSet<EcoString>,
    counter: usize,
}

impl Default for RenderContext {
    fn default() -> Self {
        Self::with_settings(&RenderSettings::default())
    }
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: &RenderSettings) -> Self {
        Self {
            prefix: EcoString::from(settings.alias_prefix.as_str()),
            aliases: HashMap::new(),
            taken: HashSet::new(),
            counter: 0,
        }
    }

    /// Mark an explicit alias as in use so generated aliases avoid it.
    pub fn reserve(&mut self, alias: &str) {
        self.taken.insert(EcoString::from(alias));
    }

    pub fn resolve_alias(&mut self, from: &FromElement) -> EcoString {
        if let Some(alias) = self.aliases.get(&from.node_id()) {
            return alias.clone();
        }

        let alias = match from.alias() {
            Some(explicit) => explicit.clone(),
            None => self.alias_generate(),
        };
        self.taken.insert(alias.clone());
        self.aliases.insert(from.node_id(), alias.clone());
        alias
    }

    fn alias_generate(&mut self) -> EcoString {
        loop {
            self.counter += 1;
            let candidate = eco_format!("{}{}", self.prefix, self.counter);
            if !self.taken.contains(&candidate) {
                return candidate;
            }
        }
    }
}
