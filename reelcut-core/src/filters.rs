//! A small model of engine filter graphs.
//!
//! Filters are assembled from typed pieces and rendered once, so caption
//! text and expressions go through a single escaping path instead of being
//! spliced into strings by hand.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
enum Arg {
    Positional(String),
    Keyed(String, String),
}

/// One filter: `name=arg:arg:key=value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    name: String,
    args: Vec<Arg>,
}

impl Filter {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            args: Vec::new(),
        }
    }

    /// Add a positional argument
    pub fn arg(mut self, value: impl ToString) -> Self {
        self.args.push(Arg::Positional(value.to_string()));
        self
    }

    /// Add a `key=value` option
    pub fn opt(mut self, key: &str, value: impl ToString) -> Self {
        self.args.push(Arg::Keyed(key.to_string(), value.to_string()));
        self
    }

    /// Add an expression option, single-quoted so commas inside it do not
    /// split the chain
    pub fn expr(self, key: &str, expr: impl AsRef<str>) -> Self {
        let quoted = format!("'{}'", expr.as_ref());
        self.opt(key, quoted)
    }

    /// Add a free-form value (caption text, a file path), escaped for both
    /// the graph and the option parser
    pub fn text(self, key: &str, text: &str) -> Self {
        let escaped = escape_text(text);
        self.opt(key, escaped)
    }

    /// Restrict the filter to the given time windows
    pub fn enable(self, windows: &[(f64, f64)]) -> Self {
        let predicate = between(windows);
        self.expr("enable", predicate)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            f.write_str(if i == 0 { "=" } else { ":" })?;
            match arg {
                Arg::Positional(value) => f.write_str(value)?,
                Arg::Keyed(key, value) => write!(f, "{key}={value}")?,
            }
        }
        Ok(())
    }
}

/// Filters applied one after another to a single stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterChain {
    filters: Vec<Filter>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn push(&mut self, filter: Filter) {
        self.filters.push(filter);
    }

    pub fn extend(mut self, other: FilterChain) -> Self {
        self.filters.extend(other.filters);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }
}

impl From<Filter> for FilterChain {
    fn from(filter: Filter) -> Self {
        Self::new().then(filter)
    }
}

impl fmt::Display for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, filter) in self.filters.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{filter}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Link {
    inputs: Vec<String>,
    chain: FilterChain,
    outputs: Vec<String>,
}

/// Labelled chains for `-filter_complex`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterGraph {
    links: Vec<Link>,
}

impl FilterGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `[inputs]chain[outputs]`
    pub fn chain(
        mut self,
        inputs: &[&str],
        chain: impl Into<FilterChain>,
        outputs: &[&str],
    ) -> Self {
        self.links.push(Link {
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            chain: chain.into(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
        });
        self
    }
}

impl fmt::Display for FilterGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, link) in self.links.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            for label in &link.inputs {
                write!(f, "[{label}]")?;
            }
            write!(f, "{}", link.chain)?;
            for label in &link.outputs {
                write!(f, "[{label}]")?;
            }
        }
        Ok(())
    }
}

/// Escape a value for embedding as a filter option inside a graph.
///
/// The engine unescapes twice: the graph parser first, then the filter's
/// option parser. The option level escapes backslashes, apostrophes and
/// colons; the graph level then escapes backslashes, apostrophes, commas,
/// semicolons and brackets. An apostrophe ends up as `\\\'`, a colon as
/// `\\:` and a comma as `\,`.
pub fn escape_text(text: &str) -> String {
    escape_for_graph(&escape_for_option(text))
}

fn escape_for_option(text: &str) -> String {
    backslash_escape(text, &['\\', '\'', ':'])
}

fn escape_for_graph(text: &str) -> String {
    backslash_escape(text, &['\\', '\'', ',', ';', '[', ']'])
}

fn backslash_escape(text: &str, special: &[char]) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if special.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// `between(t,a,b)+...` over the windows; `0` when there are none.
pub fn between(windows: &[(f64, f64)]) -> String {
    if windows.is_empty() {
        return "0".to_string();
    }
    windows
        .iter()
        .map(|(start, end)| format!("between(t,{start:.3},{end:.3})"))
        .collect::<Vec<_>>()
        .join("+")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::engine_options;

    #[test]
    fn renders_positional_and_keyed_args() {
        let crop = Filter::new("crop").arg(640).arg(360).arg(0).arg(10);
        assert_eq!(crop.to_string(), "crop=640:360:0:10");

        let fade = Filter::new("fade").opt("t", "in").opt("st", 0).opt("d", 0.5);
        assert_eq!(fade.to_string(), "fade=t=in:st=0:d=0.5");

        assert_eq!(Filter::new("anull").to_string(), "anull");
    }

    #[test]
    fn caption_special_characters_are_escaped() {
        assert_eq!(escape_text("It's 5:00, ok"), r"It\\\'s 5\\:00\, ok");
        assert_eq!(escape_text("a;[b]"), r"a\;\[b\]");
        assert_eq!(escape_text(r"C:\x"), r"C\\:\\\\x");
        assert_eq!(escape_text("plain words"), "plain words");
    }

    #[test]
    fn text_survives_both_parsing_levels() {
        let text = r"Q: why? It's 5, ok [a];b\c";
        let filter = Filter::new("drawtext").text("text", text).opt("x", 1).to_string();
        assert_eq!(
            engine_options(&filter),
            vec![
                ("text".to_string(), text.to_string()),
                ("x".to_string(), "1".to_string())
            ]
        );
    }

    #[test]
    fn quoted_expressions_keep_their_commas() {
        let filter = Filter::new("volume")
            .opt("volume", 0.5)
            .enable(&[(0.0, 1.0), (2.0, 3.0)])
            .to_string();
        assert_eq!(
            engine_options(&filter),
            vec![
                ("volume".to_string(), "0.5".to_string()),
                (
                    "enable".to_string(),
                    "between(t,0.000,1.000)+between(t,2.000,3.000)".to_string()
                )
            ]
        );
    }

    #[test]
    fn graph_labels_and_separators() {
        let graph = FilterGraph::new()
            .chain(&["1", "0"], Filter::new("scale2ref"), &["i", "v"])
            .chain(
                &["v", "i"],
                Filter::new("overlay").expr("x", "if(between(t,1,2),0,NAN)"),
                &[],
            );
        assert_eq!(
            graph.to_string(),
            "[1][0]scale2ref[i][v];[v][i]overlay=x='if(between(t,1,2),0,NAN)'"
        );
    }

    #[test]
    fn enable_windows() {
        let volume = Filter::new("volume").arg(0.8).enable(&[(0.0, 4.0), (9.0, 13.0)]);
        assert_eq!(
            volume.to_string(),
            "volume=0.8:enable='between(t,0.000,4.000)+between(t,9.000,13.000)'"
        );
        assert_eq!(between(&[]), "0");
    }

    #[test]
    fn chains_join_with_commas() {
        let chain = FilterChain::new()
            .then(Filter::new("fade").opt("t", "in"))
            .then(Filter::new("fade").opt("t", "out"));
        assert_eq!(chain.to_string(), "fade=t=in,fade=t=out");
        assert_eq!(chain.len(), 2);
    }
}
