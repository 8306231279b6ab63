use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

/// Placeholder marker for one token inside a matcher template.
const PLACEHOLDER: &str = "{}";

/// Timestamp layout used inside canonical filenames.
/// Matching and rendering share this single layout,
/// so a parsed and re-rendered timestamp is textually identical.
pub const FILE_DATE_FORMAT: &str = "%Y-%m-%d %H_%M_%S";

const DATE: PatternToken = PatternToken::new(
    "date",
    r"[0-9]{4}-[0-9]{2}-[0-9]{2} [0-9]{2}_[0-9]{2}_[0-9]{2}",
    FormatSpec::Plain,
);
const ID: PatternToken = PatternToken::new("id", "[0-9]{4}", FormatSpec::Plain);
const INDEX: PatternToken = PatternToken::new("index", "[0-9]{2}", FormatSpec::ZeroPad(2));
const EXTENSION: PatternToken = PatternToken::new("extension", "[a-zA-Z0-9]+", FormatSpec::Plain);
const CODEC: PatternToken = PatternToken::new("codec", "[XH]", FormatSpec::Plain);

/// Matcher for names straight off the camera: `GX010042.mp4`.
pub static RAW: LazyLock<Matcher> = LazyLock::new(|| Matcher::new("G{}{}{}.{}", vec![CODEC, INDEX, ID, EXTENSION]));

/// Matcher for canonical fragment names:
/// `Recording _-_ Date 2023-06-01 10_00_00 _-_ ID 0042 _-_ Part 01.mp4`.
pub static RENAMED: LazyLock<Matcher> = LazyLock::new(|| {
    Matcher::new(
        "Recording _-_ Date {} _-_ ID {} _-_ Part {}.{}",
        vec![DATE, ID, INDEX, EXTENSION],
    )
});

/// Matcher for canonical merged recording names:
/// `Recording _-_ Date 2023-06-01 10_00_00 _-_ ID 0042.mp4`.
pub static MERGED: LazyLock<Matcher> =
    LazyLock::new(|| Matcher::new("Recording _-_ Date {} _-_ ID {}.{}", vec![DATE, ID, EXTENSION]));

/// How a token value is written out when rendering a filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatSpec {
    /// Value as-is.
    Plain,
    /// Numeric value left-padded with zeros to the given width.
    ZeroPad(usize),
}

/// A named field in a filename pattern,
/// carrying both the regex fragment used for matching
/// and the format rule used for rendering.
#[derive(Debug, Clone, Copy)]
pub struct PatternToken {
    pub name: &'static str,
    capture: &'static str,
    format: FormatSpec,
    /// 0-based position within the parent template, assigned when the matcher is built.
    position: usize,
}

/// Value for one token when rendering a filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenValue<'a> {
    Text(&'a str),
    Number(u32),
}

/// A filename grammar compiled from one ordered token list:
/// a whole-string capture regex and its rendering counterpart,
/// built from the same template so they always agree on token count and order.
#[derive(Debug)]
pub struct Matcher {
    template: &'static str,
    tokens: Vec<PatternToken>,
    positions: HashMap<&'static str, usize>,
    regex: Regex,
}

impl PatternToken {
    const fn new(name: &'static str, capture: &'static str, format: FormatSpec) -> Self {
        Self {
            name,
            capture,
            format,
            position: 0,
        }
    }
}

impl FormatSpec {
    fn apply(self, value: TokenValue) -> String {
        match (self, value) {
            (Self::Plain, TokenValue::Text(text)) => text.to_string(),
            (Self::Plain, TokenValue::Number(number)) => number.to_string(),
            (Self::ZeroPad(width), TokenValue::Number(number)) => format!("{number:0width$}"),
            (Self::ZeroPad(width), TokenValue::Text(text)) => format!("{text:0>width$}"),
        }
    }
}

impl Matcher {
    /// Build a matcher from a template and its tokens in template order.
    ///
    /// Token names must be unique within one matcher.
    ///
    /// # Panics
    /// Panics if the template placeholder count does not match the token count.
    #[must_use]
    pub fn new(template: &'static str, mut tokens: Vec<PatternToken>) -> Self {
        let placeholders = template.matches(PLACEHOLDER).count();
        assert_eq!(
            placeholders,
            tokens.len(),
            "Template '{template}' has {placeholders} placeholders for {} tokens",
            tokens.len()
        );

        let mut positions = HashMap::new();
        let mut pattern = String::from('^');
        let mut literals = template.split(PLACEHOLDER);
        pattern.push_str(&regex::escape(literals.next().unwrap_or_default()));
        for (position, token) in tokens.iter_mut().enumerate() {
            token.position = position;
            positions.insert(token.name, position);
            pattern.push('(');
            pattern.push_str(token.capture);
            pattern.push(')');
            pattern.push_str(&regex::escape(literals.next().unwrap_or_default()));
        }
        pattern.push('$');

        let regex = Regex::new(&pattern).expect("Failed to create regex pattern for filename matcher");

        Self {
            template,
            tokens,
            positions,
            regex,
        }
    }

    /// Match the entire input against this grammar.
    ///
    /// Returns the captured values in token order,
    /// or `None` unless the whole string matches (no partial matches).
    #[must_use]
    pub fn captures<'a>(&self, input: &'a str) -> Option<Vec<&'a str>> {
        let captures = self.regex.captures(input)?;
        self.tokens
            .iter()
            .map(|token| captures.get(token.position + 1).map(|group| group.as_str()))
            .collect()
    }

    /// Look up one captured value by token name.
    #[must_use]
    pub fn field<'a>(&self, values: &[&'a str], name: &str) -> Option<&'a str> {
        self.positions.get(name).and_then(|&position| values.get(position)).copied()
    }

    /// Render a filename from values given in token order.
    ///
    /// This is the exact inverse surface of [`Self::captures`]:
    /// any rendered value set, when matched again, recovers the same values.
    #[must_use]
    pub fn render(&self, values: &[TokenValue]) -> String {
        debug_assert_eq!(values.len(), self.tokens.len());
        let mut literals = self.template.split(PLACEHOLDER);
        let mut name = String::from(literals.next().unwrap_or_default());
        for (token, value) in self.tokens.iter().zip(values) {
            name.push_str(&token.format.apply(*value));
            name.push_str(literals.next().unwrap_or_default());
        }
        name
    }

    /// Number of tokens in this grammar.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
