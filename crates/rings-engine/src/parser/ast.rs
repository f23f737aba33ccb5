//! Abstract syntax tree for the rings scripting language.
//!
//! The tree is produced by the parser and walked directly by the
//! interpreter. Nodes that can raise at runtime carry the source line so
//! errors and tracebacks can point at it.

use std::rc::Rc;

/// A parsed chunk: the top-level block of one compiled source text.
#[derive(Debug)]
pub struct Chunk {
    /// Diagnostic name (`[string "..."]`, a file name, ...)
    pub name: Rc<str>,
    pub body: Rc<FunctionBody>,
}

/// A block of statements.
#[derive(Debug, Default)]
pub struct Block {
    pub statements: Vec<Statement>,
}

#[derive(Debug)]
pub struct Statement {
    pub kind: StatementKind,
    pub line: u32,
}

#[derive(Debug)]
pub enum StatementKind {
    /// `local a, b = e1, e2`
    Local {
        names: Vec<Rc<str>>,
        values: Vec<Expression>,
    },

    /// `local function f() ... end`
    LocalFunction {
        name: Rc<str>,
        body: Rc<FunctionBody>,
    },

    /// `a, t.x = e1, e2`
    Assign {
        targets: Vec<Expression>,
        values: Vec<Expression>,
    },

    /// A function or method call used as a statement
    Call(Expression),

    Do(Block),

    While {
        condition: Expression,
        body: Block,
    },

    Repeat {
        body: Block,
        condition: Expression,
    },

    If {
        branches: Vec<(Expression, Block)>,
        otherwise: Option<Block>,
    },

    NumericFor {
        variable: Rc<str>,
        start: Expression,
        limit: Expression,
        step: Option<Expression>,
        body: Block,
    },

    GenericFor {
        names: Vec<Rc<str>>,
        values: Vec<Expression>,
        body: Block,
    },

    Return(Vec<Expression>),

    Break,
}

/// A function literal: parameters plus body.
#[derive(Debug)]
pub struct FunctionBody {
    /// Name used in tracebacks, when one is known
    pub name: Option<Rc<str>>,
    pub params: Vec<Rc<str>>,
    pub is_vararg: bool,
    pub block: Block,
    /// Line of the `function` keyword (0 for a main chunk)
    pub line: u32,
}

#[derive(Debug)]
pub enum Expression {
    Nil,
    True,
    False,
    Number(f64),
    String(Rc<str>),
    Vararg,
    Function(Rc<FunctionBody>),
    Name(Rc<str>),
    Index {
        object: Box<Expression>,
        key: Box<Expression>,
        line: u32,
    },
    Call {
        callee: Box<Expression>,
        args: Vec<Expression>,
        line: u32,
    },
    MethodCall {
        object: Box<Expression>,
        method: Rc<str>,
        args: Vec<Expression>,
        line: u32,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
        line: u32,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
        line: u32,
    },
    Table(Vec<TableField>),
    /// Parenthesized expression; truncates multiple results to one
    Paren(Box<Expression>),
}

impl Expression {
    /// Calls and `...` can produce any number of values.
    pub fn is_multi_valued(&self) -> bool {
        matches!(
            self,
            Expression::Call { .. } | Expression::MethodCall { .. } | Expression::Vararg
        )
    }
}

#[derive(Debug)]
pub enum TableField {
    /// `[k] = v` or `name = v`
    Keyed(Expression, Expression),
    /// Positional entry
    Positional(Expression),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    /// Left and right binding power (Lua precedence table).
    pub fn priority(self) -> (u8, u8) {
        match self {
            BinaryOp::Or => (1, 1),
            BinaryOp::And => (2, 2),
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => (3, 3),
            // right associative
            BinaryOp::Concat => (5, 4),
            BinaryOp::Add | BinaryOp::Sub => (6, 6),
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => (7, 7),
            // right associative, binds tighter than unary operators
            BinaryOp::Pow => (10, 9),
        }
    }
}

/// Binding power of unary operators.
pub const UNARY_PRIORITY: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    Len,
}
