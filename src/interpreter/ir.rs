use std::collections::HashMap;
use std::sync::Arc;

use crate::runtime::chunk::{Granularity, Preposition};
use crate::runtime::ordinal::Ordinal;
use crate::runtime::part::{Owner, PartType};
use crate::runtime::property::Adjective;
use crate::runtime::value::{SortStyle, Value};

/// Compiled script of one part: message handlers and functions keyed by
/// lowercase name.
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// `on` handlers.
    pub handlers: HashMap<String, Arc<Handler>>,
    /// `function` handlers.
    pub functions: HashMap<String, Arc<Handler>>,
}

impl Script {
    /// Message handler for `name`, ignoring case.
    pub fn handler(&self, name: &str) -> Option<Arc<Handler>> {
        self.handlers.get(&name.to_lowercase()).cloned()
    }

    /// Function handler for `name`, ignoring case.
    pub fn function(&self, name: &str) -> Option<Arc<Handler>> {
        self.functions.get(&name.to_lowercase()).cloned()
    }

    /// Whether the script defines nothing.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty() && self.functions.is_empty()
    }
}

/// A message or function handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Handler {
    /// Name as written.
    pub name: String,
    /// Parameter names.
    pub params: Vec<String>,
    /// Statements.
    pub body: Vec<Statement>,
    /// Line of the handler header.
    pub line: usize,
}

/// A statement with its source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// 1-based line.
    pub line: usize,
    /// What the statement does.
    pub kind: StatementKind,
}

/// Statement forms.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    /// `put value [into|before|after container]`; no container means the message box.
    Put {
        /// Value written.
        value: Expr,
        /// Replace, prepend or append.
        preposition: Preposition,
        /// Target container.
        destination: Option<ContainerRef>,
    },
    /// `get value`: assigns `it`.
    Get(Expr),
    /// `set [adjective] property [of part] to value`
    Set {
        /// Property name.
        property: String,
        /// Adjective as written; only the base form is writable.
        adjective: Option<Adjective>,
        /// Owning part; the application when absent.
        part: Option<PartRef>,
        /// New value.
        value: Expr,
    },
    /// `send message [args] [to part]`
    Send {
        /// Message name.
        message: String,
        /// Arguments.
        args: Vec<Expr>,
        /// Receiver; `me` when absent.
        to: Option<PartRef>,
    },
    /// A message sent to `me`, falling back to a host command.
    Command {
        /// Command name.
        name: String,
        /// Arguments.
        args: Vec<Expr>,
    },
    /// `pass`
    Pass,
    /// `exit handler`
    ExitHandler,
    /// `exit repeat`
    ExitRepeat,
    /// `next repeat`
    NextRepeat,
    /// `return [value]`
    Return(Option<Expr>),
    /// `if`
    If {
        /// Condition; must evaluate to a boolean.
        condition: Expr,
        /// Statements run when true.
        then_branch: Vec<Statement>,
        /// Statements run when false.
        else_branch: Vec<Statement>,
    },
    /// `repeat`
    Repeat {
        /// Loop control.
        control: RepeatControl,
        /// Loop body.
        body: Vec<Statement>,
    },
    /// `global names`
    Global(Vec<String>),
    /// `sort [granularity] of container`
    Sort {
        /// Unit being sorted.
        granularity: Granularity,
        /// Container rewritten in place.
        container: ContainerRef,
        /// Ordering.
        style: SortStyle,
        /// Largest first.
        descending: bool,
    },
}

/// How a repeat loop is controlled.
#[derive(Debug, Clone, PartialEq)]
pub enum RepeatControl {
    /// Until `exit repeat`.
    Forever,
    /// A fixed count evaluated once.
    Times(Expr),
    /// While the condition holds.
    While(Expr),
    /// Until the condition holds.
    Until(Expr),
    /// Counting loop with inclusive bounds.
    With {
        /// Loop variable.
        variable: String,
        /// First value.
        from: Expr,
        /// Last value.
        to: Expr,
        /// Count down instead of up.
        descending: bool,
    },
}

/// Expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Constant.
    Literal(Value),
    /// Variable; an unassigned variable evaluates to its own name.
    Variable(String),
    /// `it`
    It,
    /// `me`
    Me,
    /// `the target`
    Target,
    /// `the result`
    TheResult,
    /// `the [adjective] property [of part]`
    Property {
        /// Property name.
        property: String,
        /// Requested form.
        adjective: Option<Adjective>,
        /// Owning part; the application when absent.
        part: Option<Box<PartRef>>,
    },
    /// `word 2 of expr`
    Chunk {
        /// Chunk to extract.
        chunk: ChunkExpr,
        /// Value it is taken from.
        of: Box<Expr>,
    },
    /// `the number of words in expr`
    Count {
        /// Unit counted.
        granularity: Granularity,
        /// Value counted in.
        of: Box<Expr>,
    },
    /// Contents of a part.
    Part(Box<PartRef>),
    /// Function call.
    Call {
        /// Function name.
        name: String,
        /// Arguments.
        args: Vec<Expr>,
    },
    /// `param n`
    Param(Box<Expr>),
    /// `the paramCount`
    ParamCount,
    /// `the params`
    Params,
    /// Unary operator.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Box<Expr>,
    },
    /// Binary operator.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },
    /// `point x y`
    Point(Box<Expr>, Box<Expr>),
    /// `rect l t r b`
    Rect(Vec<Expr>),
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Boolean negation.
    Not,
    /// Arithmetic negation.
    Negate,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `&`
    Concat,
    /// `&&`: concatenation with a space.
    ConcatSpace,
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `mod`
    Mod,
    /// `=` / `is`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    Le,
    /// `>=`
    Ge,
    /// Short-circuit `and`.
    And,
    /// Short-circuit `or`.
    Or,
    /// Case-insensitive substring test.
    Contains,
}

/// A chunk whose positions may be computed at run time.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkExpr {
    /// Unit being addressed.
    pub granularity: Granularity,
    /// First position.
    pub start: OrdinalExpr,
    /// Last position of a range.
    pub end: Option<OrdinalExpr>,
    /// Enclosing chunk, resolved first.
    pub of: Option<Box<ChunkExpr>>,
}

/// Position in a chunk or part reference.
#[derive(Debug, Clone, PartialEq)]
pub enum OrdinalExpr {
    /// Known at compile time (`last`, `third`).
    Fixed(Ordinal),
    /// Computed; validated when evaluated.
    Computed(Box<Expr>),
}

/// Reference to a part in script text.
#[derive(Debug, Clone, PartialEq)]
pub enum PartRef {
    /// `button id 3`
    Id {
        /// Kind of part.
        part_type: PartType,
        /// Layer filter.
        owner: Option<Owner>,
        /// Id expression.
        id: Expr,
    },
    /// `button 2` or `button "OK"`: numbers select by position, text by name.
    Lookup {
        /// Kind of part.
        part_type: PartType,
        /// Layer filter.
        owner: Option<Owner>,
        /// Number or name.
        key: Expr,
    },
    /// `last card`
    Ordinal {
        /// Kind of part.
        part_type: PartType,
        /// Layer filter.
        owner: Option<Owner>,
        /// Position selector.
        ordinal: Ordinal,
    },
    /// `this card`
    This(PartType),
    /// The message box.
    MessageBox,
    /// `me`
    Me,
    /// `the target`
    Target,
    /// `part of container`
    Of {
        /// Inner reference.
        part: Box<PartRef>,
        /// Container it is looked up in.
        container: Box<PartRef>,
    },
}

/// Something `put` can write to.
#[derive(Debug, Clone, PartialEq)]
pub enum ContainerRef {
    /// A variable.
    Variable(String),
    /// `it`
    It,
    /// The message box.
    MessageBox,
    /// Contents of a part.
    Part(PartRef),
    /// A chunk of another container.
    Chunk {
        /// Chunk addressed.
        chunk: ChunkExpr,
        /// Container holding it.
        container: Box<ContainerRef>,
    },
}
