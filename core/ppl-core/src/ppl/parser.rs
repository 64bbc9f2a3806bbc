//! PPL parser: recursive descent over the token stream.
//!
//! ```text
//! query    := search ('|' command)* EOF
//! search   := [SEARCH] SOURCE '=' name expr*
//! command  := where | fields | stats | sort | head | top | eval | rename
//!           | parse | grok | join | lookup
//! ```
//!
//! Expressions use precedence climbing: `OR`/`XOR` < `AND` < `NOT` <
//! comparison < additive < multiplicative < unary minus < primary.

use super::ast::*;
use super::lexer::{Keyword, Position, Token, TokenKind};
use crate::error::{PplError, PplResult};
use crate::value::ScalarValue;

/// Default row count for `head` and `top` without an explicit number.
pub const DEFAULT_HEAD_SIZE: usize = 10;

/// Parses a complete token stream (as produced by `tokenize`).
pub fn parse(tokens: Vec<Token>) -> PplResult<Query> {
    Parser::new(tokens).parse_query()
}

/// PPL Parser.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    default_head: usize,
    prev_end: Position,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last().map(|t| t.kind) != Some(TokenKind::Eof) {
            let position = tokens.last().map(|t| t.position).unwrap_or_default();
            tokens.push(Token {
                kind: TokenKind::Eof,
                text: String::new(),
                position,
            });
        }
        Self {
            tokens,
            pos: 0,
            default_head: DEFAULT_HEAD_SIZE,
            prev_end: Position::default(),
        }
    }

    /// Row count used by `head` / `top` when the query omits it.
    pub fn with_default_head(mut self, count: usize) -> Self {
        self.default_head = count;
        self
    }

    pub fn parse_query(&mut self) -> PplResult<Query> {
        let search = self.parse_search()?;
        let mut commands = Vec::new();
        while self.eat(TokenKind::Pipe) {
            commands.push(self.parse_command()?);
        }
        if !self.check(TokenKind::Eof) {
            return Err(self.error("'|' or end of input"));
        }
        Ok(Query { search, commands })
    }

    // ── token helpers ──

    fn current(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_kind(&self, n: usize) -> TokenKind {
        self.tokens
            .get(self.pos + n)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        self.prev_end = token.position;
        token
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn check_keyword(&self, keyword: Keyword) -> bool {
        self.check(TokenKind::Keyword(keyword))
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        self.eat(TokenKind::Keyword(keyword))
    }

    fn expect(&mut self, kind: TokenKind) -> PplResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(&kind.to_string()))
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> PplResult<Token> {
        self.expect(TokenKind::Keyword(keyword))
    }

    fn error(&self, expected: &str) -> PplError {
        let token = self.current();
        PplError::Parse {
            position: token.position,
            expected: expected.to_string(),
            found: token.describe(),
        }
    }

    fn span_from(&self, start: Position) -> Span {
        Span::new(start, self.prev_end)
    }

    // ── commands ──

    fn parse_search(&mut self) -> PplResult<SearchCommand> {
        let start = self.current().position;
        self.eat_keyword(Keyword::Search);
        if !self.check_keyword(Keyword::Source) {
            return Err(self.error("'source' (queries start with a search command)"));
        }
        self.advance();
        self.expect(TokenKind::Eq)?;
        let source = if self.check(TokenKind::String) {
            let token = self.advance();
            Ident {
                name: token.text,
                span: Span::new(token.position, token.position),
            }
        } else {
            self.parse_name("index name")?
        };

        let mut filter: Option<Expr> = None;
        while self.starts_search_term() {
            let term = self.parse_expr()?;
            filter = Some(match filter {
                None => term,
                Some(prev) => {
                    let span = Span::new(prev.span().start, self.prev_end);
                    Expr::Binary {
                        op: BinaryOp::And,
                        left: Box::new(prev),
                        right: Box::new(term),
                        span,
                    }
                }
            });
        }

        Ok(SearchCommand {
            source,
            filter,
            span: self.span_from(start),
        })
    }

    fn starts_search_term(&self) -> bool {
        matches!(
            self.current().kind,
            TokenKind::Ident
                | TokenKind::QuotedIdent
                | TokenKind::String
                | TokenKind::Integer
                | TokenKind::Float
                | TokenKind::LParen
                | TokenKind::Minus
                | TokenKind::Keyword(Keyword::Not | Keyword::True | Keyword::False | Keyword::Null)
        )
    }

    fn parse_command(&mut self) -> PplResult<Command> {
        let start = self.current().position;
        let TokenKind::Keyword(keyword) = self.current().kind else {
            return Err(self.error("command"));
        };
        match keyword {
            Keyword::Where => {
                self.advance();
                let predicate = self.parse_expr()?;
                Ok(Command::Where(WhereCommand {
                    predicate,
                    span: self.span_from(start),
                }))
            }
            Keyword::Fields => {
                self.advance();
                let exclude = if self.eat(TokenKind::Minus) {
                    true
                } else {
                    self.eat(TokenKind::Plus);
                    false
                };
                let fields = self.parse_name_list("field name")?;
                Ok(Command::Fields(FieldsCommand {
                    exclude,
                    fields,
                    span: self.span_from(start),
                }))
            }
            Keyword::Stats => self.parse_stats(start).map(Command::Stats),
            Keyword::Sort => self.parse_sort(start).map(Command::Sort),
            Keyword::Head => {
                self.advance();
                let count = self.parse_optional_count()?;
                let offset = if self.eat_keyword(Keyword::From) {
                    self.parse_count()?
                } else {
                    0
                };
                Ok(Command::Head(HeadCommand {
                    count,
                    offset,
                    span: self.span_from(start),
                }))
            }
            Keyword::Top => {
                self.advance();
                let count = self.parse_optional_count()?;
                let fields = self.parse_name_list("field name")?;
                Ok(Command::Top(TopCommand {
                    count,
                    fields,
                    span: self.span_from(start),
                }))
            }
            Keyword::Eval => {
                self.advance();
                let mut assignments = Vec::new();
                loop {
                    let name = self.parse_name("field name")?;
                    self.expect(TokenKind::Eq)?;
                    let expr = self.parse_expr()?;
                    assignments.push((name, expr));
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                Ok(Command::Eval(EvalCommand {
                    assignments,
                    span: self.span_from(start),
                }))
            }
            Keyword::Rename => {
                self.advance();
                let mut renames = Vec::new();
                loop {
                    let from = self.parse_name("field name")?;
                    self.expect_keyword(Keyword::As)?;
                    let to = self.parse_name("new field name")?;
                    renames.push((from, to));
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                Ok(Command::Rename(RenameCommand {
                    renames,
                    span: self.span_from(start),
                }))
            }
            Keyword::Parse | Keyword::Grok => {
                self.advance();
                let kind = if keyword == Keyword::Parse {
                    ParseKind::Regex
                } else {
                    ParseKind::Grok
                };
                let field = self.parse_name("field name")?;
                let pattern = self.expect(TokenKind::String)?.text;
                Ok(Command::Parse(ParseCommand {
                    kind,
                    field,
                    pattern,
                    span: self.span_from(start),
                }))
            }
            Keyword::Join | Keyword::Inner | Keyword::Left | Keyword::Right | Keyword::Full => {
                self.parse_join(start).map(Command::Join)
            }
            Keyword::Lookup => self.parse_lookup(start).map(Command::Lookup),
            Keyword::Search | Keyword::Source => {
                Err(self.error("command (search is only valid as the first command)"))
            }
            _ => Err(self.error("command")),
        }
    }

    fn parse_stats(&mut self, start: Position) -> PplResult<StatsCommand> {
        self.advance();
        let mut aggregations = Vec::new();
        loop {
            aggregations.push(self.parse_agg_call()?);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        let group_by = if self.eat_keyword(Keyword::By) {
            self.parse_name_list("group-by field")?
        } else {
            Vec::new()
        };
        Ok(StatsCommand {
            aggregations,
            group_by,
            span: self.span_from(start),
        })
    }

    fn parse_agg_call(&mut self) -> PplResult<AggCall> {
        let start = self.current().position;
        if !(self.check(TokenKind::Ident) && self.peek_kind(1) == TokenKind::LParen) {
            return Err(self.error("aggregate function call"));
        }
        let function = self.advance().text;
        self.expect(TokenKind::LParen)?;
        let args = if self.check(TokenKind::Star) && self.peek_kind(1) == TokenKind::RParen {
            // count(*) is the same as count()
            self.advance();
            Vec::new()
        } else {
            self.parse_args()?
        };
        self.expect(TokenKind::RParen)?;
        let alias = if self.eat_keyword(Keyword::As) {
            Some(self.parse_name("alias")?)
        } else {
            None
        };
        Ok(AggCall {
            function,
            args,
            alias,
            span: self.span_from(start),
        })
    }

    fn parse_sort(&mut self, start: Position) -> PplResult<SortCommand> {
        self.advance();
        let mut keys = Vec::new();
        loop {
            let mut descending = if self.eat(TokenKind::Minus) {
                true
            } else {
                self.eat(TokenKind::Plus);
                false
            };
            let field = self.parse_name("sort field")?;
            if self.eat_keyword(Keyword::Desc) {
                descending = true;
            } else {
                self.eat_keyword(Keyword::Asc);
            }
            keys.push(SortKey { field, descending });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        Ok(SortCommand {
            keys,
            span: self.span_from(start),
        })
    }

    fn parse_join(&mut self, start: Position) -> PplResult<JoinCommand> {
        let join_type = if self.eat_keyword(Keyword::Left) {
            self.eat_keyword(Keyword::Outer);
            JoinType::Left
        } else if self.eat_keyword(Keyword::Right) {
            self.eat_keyword(Keyword::Outer);
            JoinType::Right
        } else if self.eat_keyword(Keyword::Full) {
            self.eat_keyword(Keyword::Outer);
            JoinType::Full
        } else {
            self.eat_keyword(Keyword::Inner);
            JoinType::Inner
        };
        self.expect_keyword(Keyword::Join)?;
        let source = self.parse_name("index name")?;
        let alias = if self.eat_keyword(Keyword::As) {
            Some(self.parse_name("alias")?)
        } else {
            None
        };
        self.expect_keyword(Keyword::On)?;
        let condition = self.parse_expr()?;
        Ok(JoinCommand {
            join_type,
            source,
            alias,
            condition,
            span: self.span_from(start),
        })
    }

    fn parse_lookup(&mut self, start: Position) -> PplResult<LookupCommand> {
        self.advance();
        let source = self.parse_name("index name")?;
        let key = self.parse_name("lookup key field")?;
        let local_key = if self.eat_keyword(Keyword::As) {
            Some(self.parse_name("field name")?)
        } else {
            None
        };
        let outputs = if self.eat_keyword(Keyword::Output) {
            self.parse_name_list("output field")?
        } else {
            Vec::new()
        };
        Ok(LookupCommand {
            source,
            key,
            local_key,
            outputs,
            span: self.span_from(start),
        })
    }

    fn parse_name(&mut self, what: &str) -> PplResult<Ident> {
        let token = self.current();
        let ok = match token.kind {
            TokenKind::Ident | TokenKind::QuotedIdent => true,
            TokenKind::Keyword(k) => !k.is_reserved(),
            _ => false,
        };
        if !ok {
            return Err(self.error(what));
        }
        let token = self.advance();
        Ok(Ident {
            name: token.text,
            span: Span::new(token.position, token.position),
        })
    }

    fn parse_name_list(&mut self, what: &str) -> PplResult<Vec<Ident>> {
        let mut names = vec![self.parse_name(what)?];
        while self.eat(TokenKind::Comma) {
            names.push(self.parse_name(what)?);
        }
        Ok(names)
    }

    fn parse_count(&mut self) -> PplResult<usize> {
        let token = self.expect(TokenKind::Integer)?;
        token.text.parse::<usize>().map_err(|_| PplError::Parse {
            position: token.position,
            expected: "row count".to_string(),
            found: token.describe(),
        })
    }

    fn parse_optional_count(&mut self) -> PplResult<usize> {
        if self.check(TokenKind::Integer) {
            self.parse_count()
        } else {
            Ok(self.default_head)
        }
    }

    // ── expressions ──

    pub fn parse_expr(&mut self) -> PplResult<Expr> {
        let mut left = self.parse_and()?;
        loop {
            let op = if self.check_keyword(Keyword::Or) {
                BinaryOp::Or
            } else if self.check_keyword(Keyword::Xor) {
                BinaryOp::Xor
            } else {
                return Ok(left);
            };
            self.advance();
            let right = self.parse_and()?;
            left = self.binary(op, left, right);
        }
    }

    fn parse_and(&mut self) -> PplResult<Expr> {
        let mut left = self.parse_not()?;
        while self.eat_keyword(Keyword::And) {
            let right = self.parse_not()?;
            left = self.binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> PplResult<Expr> {
        if self.check_keyword(Keyword::Not) {
            let start = self.advance().position;
            let operand = self.parse_not()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
                span: self.span_from(start),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> PplResult<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Eq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::NotEq,
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::LtEq => BinaryOp::LtEq,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::GtEq => BinaryOp::GtEq,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_additive()?;
            left = self.binary(op, left, right);
        }
    }

    fn parse_additive(&mut self) -> PplResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = self.binary(op, left, right);
        }
    }

    fn parse_multiplicative(&mut self) -> PplResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = self.binary(op, left, right);
        }
    }

    fn parse_unary(&mut self) -> PplResult<Expr> {
        if !self.check(TokenKind::Minus) {
            return self.parse_primary();
        }
        let start = self.advance().position;
        if self.check(TokenKind::Integer)
            && self.current().text.parse::<u64>() == Ok(i64::MIN.unsigned_abs())
        {
            self.advance();
            return Ok(Expr::Literal {
                value: ScalarValue::Int64(i64::MIN),
                span: self.span_from(start),
            });
        }
        let operand = self.parse_unary()?;
        let span = self.span_from(start);
        Ok(match operand {
            Expr::Literal {
                value: ScalarValue::Int64(v),
                ..
            } if v != i64::MIN => Expr::Literal {
                value: ScalarValue::Int64(-v),
                span,
            },
            Expr::Literal {
                value: ScalarValue::Float64(v),
                ..
            } => Expr::Literal {
                value: ScalarValue::Float64(-v),
                span,
            },
            other => Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(other),
                span,
            },
        })
    }

    fn parse_primary(&mut self) -> PplResult<Expr> {
        let token = self.current().clone();
        let span = Span::new(token.position, token.position);
        let literal = |value| Expr::Literal { value, span };
        match token.kind {
            TokenKind::Integer => {
                self.advance();
                let value = token.text.parse::<i64>().map_err(|_| PplError::Parse {
                    position: token.position,
                    expected: "integer literal".to_string(),
                    found: token.describe(),
                })?;
                Ok(literal(ScalarValue::Int64(value)))
            }
            TokenKind::Float => {
                self.advance();
                let value = token.text.parse::<f64>().map_err(|_| PplError::Parse {
                    position: token.position,
                    expected: "float literal".to_string(),
                    found: token.describe(),
                })?;
                Ok(literal(ScalarValue::Float64(value)))
            }
            TokenKind::String => {
                self.advance();
                Ok(literal(ScalarValue::Utf8(token.text)))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(literal(ScalarValue::Boolean(true)))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(literal(ScalarValue::Boolean(false)))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.advance();
                Ok(literal(ScalarValue::Null))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::Ident if self.peek_kind(1) == TokenKind::LParen => {
                self.advance();
                self.advance();
                let args = self.parse_args()?;
                self.expect(TokenKind::RParen)?;
                Ok(Expr::Call {
                    name: token.text,
                    args,
                    span: self.span_from(token.position),
                })
            }
            TokenKind::Ident | TokenKind::QuotedIdent => {
                self.advance();
                Ok(Expr::Field(Ident {
                    name: token.text,
                    span,
                }))
            }
            TokenKind::Keyword(k) if !k.is_reserved() => {
                self.advance();
                Ok(Expr::Field(Ident {
                    name: token.text,
                    span,
                }))
            }
            _ => Err(self.error("expression")),
        }
    }

    fn parse_args(&mut self) -> PplResult<Vec<Expr>> {
        let mut args = Vec::new();
        if self.check(TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            if !self.eat(TokenKind::Comma) {
                return Ok(args);
            }
        }
    }

    fn binary(&self, op: BinaryOp, left: Expr, right: Expr) -> Expr {
        let span = Span::new(left.span().start, self.prev_end);
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            span,
        }
    }
}
