use serde::{Deserialize, Serialize};

/// S-expression nodes of the script language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Expr {
    /// A bare symbol.
    Symbol(String),
    /// Keyword tokens (leading colon).
    Keyword(String),
    /// String literal.
    String(String),
    /// Signed integer literal.
    Integer(i64),
    /// Floating-point literal.
    Float(f64),
    /// Boolean literal.
    Boolean(bool),
    /// Nested list with the 1-based line its opening parenthesis is on.
    List {
        /// Elements.
        items: Vec<Expr>,
        /// Source line.
        line: usize,
    },
}

impl Expr {
    /// Symbol text, if this is a symbol.
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Expr::Symbol(symbol) => Some(symbol),
            _ => None,
        }
    }

    /// Whether this is the symbol `word`, ignoring case.
    pub fn is_symbol(&self, word: &str) -> bool {
        self.as_symbol()
            .is_some_and(|symbol| symbol.eq_ignore_ascii_case(word))
    }
}

/// Parsed script text: the top-level forms plus the source they came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptSource {
    /// Parsed forms.
    pub forms: Vec<Expr>,
    /// Original source text, retained for error reporting.
    pub source: String,
}

impl ScriptSource {
    /// Wrap parsed forms.
    pub fn new(source: impl Into<String>, forms: Vec<Expr>) -> Self {
        Self {
            source: source.into(),
            forms,
        }
    }
}
