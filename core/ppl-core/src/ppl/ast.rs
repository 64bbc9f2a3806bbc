//! PPL abstract syntax tree.
//!
//! Every node carries a [`Span`]; spans never take part in equality, so two
//! trees parsed from differently formatted text compare equal when their
//! structure matches. `Display` renders a tree back to PPL text with binary
//! expressions fully parenthesized.

use super::lexer::{Keyword, Position};
use crate::value::ScalarValue;
use std::fmt;

/// Source range of a node. Always equal to any other span.
#[derive(Debug, Clone, Copy, Default)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }
}

impl PartialEq for Span {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

/// A whole query: the leading search followed by piped commands.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub search: SearchCommand,
    pub commands: Vec<Command>,
}

/// Field or alias name as written.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            span: Span::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchCommand {
    pub source: Ident,
    pub filter: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Where(WhereCommand),
    Fields(FieldsCommand),
    Stats(StatsCommand),
    Sort(SortCommand),
    Head(HeadCommand),
    Top(TopCommand),
    Eval(EvalCommand),
    Rename(RenameCommand),
    Parse(ParseCommand),
    Join(JoinCommand),
    Lookup(LookupCommand),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Where(_) => "where",
            Command::Fields(_) => "fields",
            Command::Stats(_) => "stats",
            Command::Sort(_) => "sort",
            Command::Head(_) => "head",
            Command::Top(_) => "top",
            Command::Eval(_) => "eval",
            Command::Rename(_) => "rename",
            Command::Parse(p) => match p.kind {
                ParseKind::Regex => "parse",
                ParseKind::Grok => "grok",
            },
            Command::Join(_) => "join",
            Command::Lookup(_) => "lookup",
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Command::Where(c) => c.span,
            Command::Fields(c) => c.span,
            Command::Stats(c) => c.span,
            Command::Sort(c) => c.span,
            Command::Head(c) => c.span,
            Command::Top(c) => c.span,
            Command::Eval(c) => c.span,
            Command::Rename(c) => c.span,
            Command::Parse(c) => c.span,
            Command::Join(c) => c.span,
            Command::Lookup(c) => c.span,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhereCommand {
    pub predicate: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldsCommand {
    /// `fields - a, b` drops the listed fields instead of keeping them
    pub exclude: bool,
    pub fields: Vec<Ident>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggCall {
    pub function: String,
    pub args: Vec<Expr>,
    pub alias: Option<Ident>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatsCommand {
    pub aggregations: Vec<AggCall>,
    pub group_by: Vec<Ident>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub field: Ident,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortCommand {
    pub keys: Vec<SortKey>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeadCommand {
    pub count: usize,
    pub offset: usize,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopCommand {
    pub count: usize,
    pub fields: Vec<Ident>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvalCommand {
    pub assignments: Vec<(Ident, Expr)>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenameCommand {
    pub renames: Vec<(Ident, Ident)>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseKind {
    /// Java-style regex with named groups
    Regex,
    /// `%{PATTERN:name}` grok syntax
    Grok,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseCommand {
    pub kind: ParseKind,
    pub field: Ident,
    pub pattern: String,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

impl JoinType {
    /// Unmatched left rows survive the join.
    pub fn preserves_left(&self) -> bool {
        matches!(self, JoinType::Left | JoinType::Full)
    }

    /// Unmatched right rows survive the join.
    pub fn preserves_right(&self) -> bool {
        matches!(self, JoinType::Right | JoinType::Full)
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JoinType::Inner => "inner",
            JoinType::Left => "left",
            JoinType::Right => "right",
            JoinType::Full => "full",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinCommand {
    pub join_type: JoinType,
    pub source: Ident,
    pub alias: Option<Ident>,
    pub condition: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LookupCommand {
    pub source: Ident,
    /// Key field in the lookup index
    pub key: Ident,
    /// Matching field in the current rows; defaults to `key`
    pub local_key: Option<Ident>,
    /// Lookup fields appended to each row; empty means all non-key fields
    pub outputs: Vec<Ident>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum BinaryOp {
    Or,
    Xor,
    And,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or | BinaryOp::Xor)
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq
        )
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod
        )
    }

    /// `a op b` ⇔ `b op' a`
    pub fn flip(&self) -> BinaryOp {
        match self {
            BinaryOp::Lt => BinaryOp::Gt,
            BinaryOp::LtEq => BinaryOp::GtEq,
            BinaryOp::Gt => BinaryOp::Lt,
            BinaryOp::GtEq => BinaryOp::LtEq,
            other => *other,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Or => "OR",
            BinaryOp::Xor => "XOR",
            BinaryOp::And => "AND",
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        span: Span,
    },
    Call {
        name: String,
        args: Vec<Expr>,
        span: Span,
    },
    Field(Ident),
    Literal {
        value: ScalarValue,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Binary { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Call { span, .. }
            | Expr::Literal { span, .. } => *span,
            Expr::Field(ident) => ident.span,
        }
    }
}

/// Writes `name` bare when it lexes back as the same identifier, otherwise
/// backquoted.
pub(crate) fn write_name(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    let mut chars = name.chars();
    let plain = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '@' => chars
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '@' | '.')),
        _ => false,
    };
    if plain && Keyword::lookup(name).is_none() {
        f.write_str(name)
    } else {
        write!(f, "`{name}`")
    }
}

fn write_string(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    if text.contains('"') {
        write!(f, "'{text}'")
    } else {
        write!(f, "\"{text}\"")
    }
}

fn write_list<T>(
    f: &mut fmt::Formatter<'_>,
    items: &[T],
    mut each: impl FnMut(&mut fmt::Formatter<'_>, &T) -> fmt::Result,
) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        each(f, item)?;
    }
    Ok(())
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_name(f, &self.name)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Binary {
                op, left, right, ..
            } => write!(f, "({left} {op} {right})"),
            Expr::Unary {
                op: UnaryOp::Not,
                operand,
                ..
            } => write!(f, "(NOT {operand})"),
            Expr::Unary {
                op: UnaryOp::Neg,
                operand,
                ..
            } => write!(f, "(-{operand})"),
            Expr::Call { name, args, .. } => {
                write!(f, "{name}(")?;
                write_list(f, args, |f, arg| write!(f, "{arg}"))?;
                f.write_str(")")
            }
            Expr::Field(ident) => write!(f, "{ident}"),
            Expr::Literal { value, .. } => match value {
                ScalarValue::Utf8(s) => write_string(f, s),
                other => write!(f, "{other}"),
            },
        }
    }
}

impl fmt::Display for AggCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.function)?;
        write_list(f, &self.args, |f, arg| write!(f, "{arg}"))?;
        f.write_str(")")?;
        if let Some(alias) = &self.alias {
            write!(f, " as {alias}")?;
        }
        Ok(())
    }
}

impl fmt::Display for SearchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "search source={}", self.source)?;
        if let Some(filter) = &self.filter {
            write!(f, " {filter}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Where(c) => write!(f, "where {}", c.predicate),
            Command::Fields(c) => {
                f.write_str(if c.exclude { "fields - " } else { "fields " })?;
                write_list(f, &c.fields, |f, i| write!(f, "{i}"))
            }
            Command::Stats(c) => {
                f.write_str("stats ")?;
                write_list(f, &c.aggregations, |f, a| write!(f, "{a}"))?;
                if !c.group_by.is_empty() {
                    f.write_str(" by ")?;
                    write_list(f, &c.group_by, |f, i| write!(f, "{i}"))?;
                }
                Ok(())
            }
            Command::Sort(c) => {
                f.write_str("sort ")?;
                write_list(f, &c.keys, |f, k| {
                    write!(f, "{}", k.field)?;
                    if k.descending {
                        f.write_str(" desc")?;
                    }
                    Ok(())
                })
            }
            Command::Head(c) => {
                write!(f, "head {}", c.count)?;
                if c.offset > 0 {
                    write!(f, " from {}", c.offset)?;
                }
                Ok(())
            }
            Command::Top(c) => {
                write!(f, "top {} ", c.count)?;
                write_list(f, &c.fields, |f, i| write!(f, "{i}"))
            }
            Command::Eval(c) => {
                f.write_str("eval ")?;
                write_list(f, &c.assignments, |f, (name, expr)| {
                    write!(f, "{name} = {expr}")
                })
            }
            Command::Rename(c) => {
                f.write_str("rename ")?;
                write_list(f, &c.renames, |f, (from, to)| write!(f, "{from} as {to}"))
            }
            Command::Parse(c) => {
                f.write_str(match c.kind {
                    ParseKind::Regex => "parse ",
                    ParseKind::Grok => "grok ",
                })?;
                write!(f, "{} ", c.field)?;
                write_string(f, &c.pattern)
            }
            Command::Join(c) => {
                match c.join_type {
                    JoinType::Inner => f.write_str("join ")?,
                    other => write!(f, "{other} join ")?,
                }
                write!(f, "{}", c.source)?;
                if let Some(alias) = &c.alias {
                    write!(f, " as {alias}")?;
                }
                write!(f, " on {}", c.condition)
            }
            Command::Lookup(c) => {
                write!(f, "lookup {} {}", c.source, c.key)?;
                if let Some(local) = &c.local_key {
                    write!(f, " as {local}")?;
                }
                if !c.outputs.is_empty() {
                    f.write_str(" output ")?;
                    write_list(f, &c.outputs, |f, i| write!(f, "{i}"))?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.search)?;
        for command in &self.commands {
            write!(f, " | {command}")?;
        }
        Ok(())
    }
}
