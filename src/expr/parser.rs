//! Recursive descent over the operator precedence ladder.
//!
//! Lowest to highest binding:
//!
//! | level | operators |
//! | --- | --- |
//! | or | `\|\|`, `OR` |
//! | and | `&&`, `AND` |
//! | ilri | `IS`, `IN`, `LIKE`, `REGEXP`, `BETWEEN`, `OVERLAPS` (optionally `NOT`-prefixed) |
//! | comparison | `==` `=` `!=` `<>` `>` `>=` `<` `<=` |
//! | shift | `<<` `>>` |
//! | bit | `&` `\|` `^` |
//! | additive | `+` `-` |
//! | multiplicative | `*` `/` `%` `DIV` |
//! | interval | `+ INTERVAL n unit`, `- INTERVAL n unit` |
//! | unary | `!` `~` `+` `-` `NOT` |
//!
//! Binary levels fold left, so `3+5-2` is `(3+5)-2`.
use log::trace;

use super::{
    ColumnIdent, Direction, Expr, Mode, PathItem, Placeholder, Projection, Scalar, SortExpr,
    SyntaxError, literal, path,
    scanner::{Scanner, is_ident_start, is_reserved},
};

/// Keywords that may follow `NOT` as part of a negated predicate.
const NEGATABLE: &[&str] = &["in", "like", "regexp", "between", "overlaps"];

pub(crate) struct Parser<'a> {
    sc: Scanner<'a>,
    mode: Mode,
    positional: u32,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str, mode: Mode) -> Self {
        Self {
            sc: Scanner::new(input),
            mode,
            positional: 0,
        }
    }

    /// Fails unless only whitespace is left.
    pub fn finish(&mut self) -> Result<(), SyntaxError> {
        self.sc.skip_ws();
        if self.sc.is_eof() {
            Ok(())
        } else {
            Err(self.sc.error("unexpected input"))
        }
    }

    pub fn expr(&mut self) -> Result<Expr, SyntaxError> {
        self.or_expr()
    }

    pub fn sort_expr(&mut self) -> Result<SortExpr, SyntaxError> {
        let expr = self.expr()?;
        self.sc.skip_ws();
        let direction = if self.sc.eat_keyword("desc") {
            Direction::Desc
        } else {
            self.sc.eat_keyword("asc");
            Direction::Asc
        };
        Ok(SortExpr { expr, direction })
    }

    pub fn projection(&mut self) -> Result<Projection, SyntaxError> {
        let source = self.expr()?;
        self.sc.skip_ws();
        let alias = if self.sc.eat_keyword("as") {
            self.sc.skip_ws();
            Some(self.identifier()?)
        } else {
            None
        };
        Ok(Projection { source, alias })
    }

    pub fn literal(&mut self) -> Result<Expr, SyntaxError> {
        literal::literal(&mut self.sc).map(Expr::Literal)
    }

    pub fn cast_type(&mut self) -> Result<Expr, SyntaxError> {
        let ty = literal::cast_type(&mut self.sc)?;
        Ok(Expr::Literal(Scalar::Bytes(ty.into_bytes())))
    }

    pub fn placeholder(&mut self) -> Result<Expr, SyntaxError> {
        self.sc.skip_ws();
        match self.sc.peek() {
            Some('?' | ':') => self.atom(),
            _ => Err(self.sc.error("expected placeholder")),
        }
    }

    pub fn function_call(&mut self) -> Result<Expr, SyntaxError> {
        self.sc.skip_ws();
        let first = self.identifier()?;
        let (schema, name) = if self.sc.eat('.') {
            (Some(first), self.identifier()?)
        } else {
            (None, first)
        };
        self.call_args(schema, name)
    }

    pub fn document_field(&mut self) -> Result<Expr, SyntaxError> {
        if self.mode == Mode::Table {
            return Err(self.sc.error("document fields are not available in table mode"));
        }
        self.sc.skip_ws();
        if self.sc.eat('$') {
            return Ok(Expr::DocumentField(path::segments(&mut self.sc, Vec::new())?));
        }
        let first = self.bare_identifier()?;
        Ok(Expr::DocumentField(path::segments(
            &mut self.sc,
            vec![PathItem::Member(first)],
        )?))
    }

    pub fn column_ident(&mut self) -> Result<Expr, SyntaxError> {
        self.sc.skip_ws();
        let first = self.identifier()?;
        self.column_from(first)
    }

    pub fn json_doc(&mut self) -> Result<Expr, SyntaxError> {
        self.sc.skip_ws();
        if !self.sc.eat('{') {
            return Err(self.sc.error("expected '{'"));
        }
        self.json_doc_body()
    }

    pub fn json_array(&mut self) -> Result<Expr, SyntaxError> {
        self.sc.skip_ws();
        if !self.sc.eat('[') {
            return Err(self.sc.error("expected '['"));
        }
        self.json_array_body()
    }

    fn or_expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.and_expr()?;
        loop {
            self.sc.skip_ws();
            if !(self.sc.eat_str("||") || self.sc.eat_keyword("or")) {
                return Ok(lhs);
            }
            let rhs = self.and_expr()?;
            lhs = Expr::op("||", vec![lhs, rhs]);
        }
    }

    fn and_expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.ilri_expr()?;
        loop {
            self.sc.skip_ws();
            if !(self.sc.eat_str("&&") || self.sc.eat_keyword("and")) {
                return Ok(lhs);
            }
            let rhs = self.ilri_expr()?;
            lhs = Expr::op("&&", vec![lhs, rhs]);
        }
    }

    fn ilri_expr(&mut self) -> Result<Expr, SyntaxError> {
        let lhs = self.comp_expr()?;
        self.sc.skip_ws();

        if self.sc.eat_keyword("is") {
            self.sc.skip_ws();
            let not = self.sc.eat_keyword("not");
            self.sc.skip_ws();
            let rhs = literal::keyword_literal(&mut self.sc)
                .ok_or_else(|| self.sc.error("expected NULL, TRUE or FALSE after IS"))?;
            let name = if not { "is_not" } else { "is" };
            return Ok(Expr::op(name, vec![lhs, Expr::Literal(rhs)]));
        }

        let mark = self.sc.pos();
        let not = self.sc.eat_keyword("not");
        if not {
            self.sc.skip_ws();
            if !NEGATABLE.iter().any(|k| self.sc.peek_keyword(k)) {
                self.sc.reset(mark);
                return Ok(lhs);
            }
        }
        let negate = |name: &str| {
            if not {
                format!("not_{name}")
            } else {
                name.to_string()
            }
        };

        if self.sc.eat_keyword("in") {
            self.sc.skip_ws();
            let list_start = self.sc.pos();
            let positional = self.positional;
            if self.sc.eat('(') {
                if let Some(items) = self.paren_list()? {
                    let mut args = vec![lhs];
                    args.extend(items);
                    return Ok(Expr::Operator { name: negate("in"), args });
                }
                self.sc.reset(list_start);
                self.positional = positional;
            }
            let rhs = self.comp_expr()?;
            return Ok(Expr::Operator {
                name: negate("cont_in"),
                args: vec![lhs, rhs],
            });
        }
        if self.sc.eat_keyword("like") {
            let pattern = self.comp_expr()?;
            let mut args = vec![lhs, pattern];
            self.sc.skip_ws();
            if self.sc.eat_keyword("escape") {
                args.push(self.comp_expr()?);
            }
            return Ok(Expr::Operator { name: negate("like"), args });
        }
        if self.sc.eat_keyword("regexp") {
            let rhs = self.comp_expr()?;
            return Ok(Expr::Operator {
                name: negate("regexp"),
                args: vec![lhs, rhs],
            });
        }
        if self.sc.eat_keyword("between") {
            let low = self.comp_expr()?;
            self.sc.skip_ws();
            if !self.sc.eat_keyword("and") {
                return Err(self.sc.error("expected AND in BETWEEN"));
            }
            let high = self.comp_expr()?;
            return Ok(Expr::Operator {
                name: negate("between"),
                args: vec![lhs, low, high],
            });
        }
        if self.sc.eat_keyword("overlaps") {
            let rhs = self.comp_expr()?;
            return Ok(Expr::Operator {
                name: negate("overlaps"),
                args: vec![lhs, rhs],
            });
        }
        Ok(lhs)
    }

    /// Reads `expr, expr, ... )` after an opening parenthesis. Returns `None`
    /// when the parenthesis turns out to open a sub-expression of a larger operand,
    /// as in `a IN (b) + 1`.
    fn paren_list(&mut self) -> Result<Option<Vec<Expr>>, SyntaxError> {
        let mut items = vec![self.expr()?];
        loop {
            self.sc.skip_ws();
            if self.sc.eat(')') {
                break;
            }
            if !self.sc.eat(',') {
                return Err(self.sc.error("expected ',' or ')'"));
            }
            items.push(self.expr()?);
        }
        let after = self.sc.pos();
        self.sc.skip_ws();
        let continues = matches!(
            self.sc.peek(),
            Some('+' | '-' | '*' | '/' | '%' | '<' | '>' | '=' | '!' | '^')
        ) || (self.sc.peek() == Some('&') && self.sc.peek_nth(1) != Some('&'))
            || (self.sc.peek() == Some('|') && self.sc.peek_nth(1) != Some('|'))
            || self.sc.peek_keyword("div");
        self.sc.reset(after);
        if continues && items.len() == 1 {
            return Ok(None);
        }
        Ok(Some(items))
    }

    fn comp_expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.shift_expr()?;
        loop {
            self.sc.skip_ws();
            let sc = &mut self.sc;
            let name = if sc.eat_str("==") {
                "=="
            } else if sc.eat_str("!=") || sc.eat_str("<>") {
                "!="
            } else if sc.eat_str(">=") {
                ">="
            } else if sc.eat_str("<=") {
                "<="
            } else if sc.eat_op("=", &[]) {
                "=="
            } else if sc.eat_op(">", &['>']) {
                ">"
            } else if sc.eat_op("<", &['<']) {
                "<"
            } else {
                return Ok(lhs);
            };
            let rhs = self.shift_expr()?;
            lhs = Expr::op(name, vec![lhs, rhs]);
        }
    }

    fn shift_expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.bit_expr()?;
        loop {
            self.sc.skip_ws();
            let name = if self.sc.eat_str("<<") {
                "<<"
            } else if self.sc.eat_str(">>") {
                ">>"
            } else {
                return Ok(lhs);
            };
            let rhs = self.bit_expr()?;
            lhs = Expr::op(name, vec![lhs, rhs]);
        }
    }

    fn bit_expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.add_sub_expr()?;
        loop {
            self.sc.skip_ws();
            let name = if self.sc.eat_op("&", &['&']) {
                "&"
            } else if self.sc.eat_op("|", &['|']) {
                "|"
            } else if self.sc.eat_op("^", &[]) {
                "^"
            } else {
                return Ok(lhs);
            };
            let rhs = self.add_sub_expr()?;
            lhs = Expr::op(name, vec![lhs, rhs]);
        }
    }

    fn add_sub_expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.mul_div_expr()?;
        loop {
            self.sc.skip_ws();
            let name = if self.sc.eat_op("+", &[]) {
                "+"
            } else if self.sc.eat_op("-", &['>']) {
                "-"
            } else {
                return Ok(lhs);
            };
            let rhs = self.mul_div_expr()?;
            lhs = Expr::op(name, vec![lhs, rhs]);
        }
    }

    fn mul_div_expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.interval_expr()?;
        loop {
            self.sc.skip_ws();
            let name = if self.sc.eat_op("*", &['*']) {
                "*"
            } else if self.sc.eat_op("/", &[]) {
                "/"
            } else if self.sc.eat_op("%", &[]) {
                "%"
            } else if self.sc.eat_keyword("div") {
                "div"
            } else {
                return Ok(lhs);
            };
            let rhs = self.interval_expr()?;
            lhs = Expr::op(name, vec![lhs, rhs]);
        }
    }

    fn interval_expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.unary_expr()?;
        loop {
            let mark = self.sc.pos();
            self.sc.skip_ws();
            let name = match self.sc.peek() {
                Some('+') => "date_add",
                Some('-') if self.sc.peek_nth(1) != Some('>') => "date_sub",
                _ => return Ok(lhs),
            };
            self.sc.bump();
            if !self.sc.peek_keyword_ws("interval") {
                self.sc.reset(mark);
                return Ok(lhs);
            }
            self.sc.skip_ws();
            self.sc.eat_keyword("interval");
            let amount = self.unary_expr()?;
            let unit = literal::interval_unit(&mut self.sc)?;
            lhs = Expr::op(
                name,
                vec![lhs, amount, Expr::Literal(Scalar::Bytes(unit.into_bytes()))],
            );
        }
    }

    fn unary_expr(&mut self) -> Result<Expr, SyntaxError> {
        self.sc.skip_ws();
        let start = self.sc.pos();

        if self.sc.eat_op("!", &['=']) {
            return Ok(Expr::unary("!", self.unary_expr()?));
        }
        if self.sc.eat('~') {
            return Ok(Expr::unary("~", self.unary_expr()?));
        }
        if self.sc.eat('+') {
            return Ok(Expr::unary("sign_plus", self.unary_expr()?));
        }
        if self.sc.eat_op("-", &['>']) {
            self.sc.skip_ws();
            if literal::starts_number(&self.sc) {
                return literal::number(&mut self.sc, true).map(Expr::Literal);
            }
            return Ok(Expr::unary("sign_minus", self.unary_expr()?));
        }
        if self.sc.eat_keyword("not") {
            self.sc.skip_ws();
            if self.sc.peek_keyword("not") {
                let mut ahead = self.sc.clone();
                ahead.eat_keyword("not");
                ahead.skip_ws();
                if NEGATABLE.iter().any(|k| ahead.peek_keyword(k)) {
                    // `not NOT IN (...)`: the first word can only be an operand.
                    self.sc.reset(start);
                    return self.keyword_operand();
                }
            }
            if NEGATABLE.iter().any(|k| self.sc.peek_keyword(k)) {
                return Err(self
                    .sc
                    .error_at(start, "NOT-prefixed operator is missing its left operand"));
            }
            return Ok(Expr::unary("not", self.unary_expr()?));
        }
        self.atom()
    }

    /// Reads a reserved word as a plain field or column name.
    ///
    /// This is how `not not in (1, 2, 3)` parses: a `not` directly followed by the
    /// `not in` operator has nothing to negate, so it is taken as the operand `not` and
    /// the result is `not_in(not, 1, 2, 3)`. A lone `not in (...)` still has no left
    /// operand and is an error.
    fn keyword_operand(&mut self) -> Result<Expr, SyntaxError> {
        let word = self.sc.peek_word().unwrap_or_default();
        self.sc.eat_str(word);
        Ok(match self.mode {
            Mode::Document => Expr::DocumentField(vec![PathItem::Member(word.to_string())]),
            Mode::Table => Expr::column(word),
        })
    }

    fn atom(&mut self) -> Result<Expr, SyntaxError> {
        self.sc.skip_ws();
        let start = self.sc.pos();
        trace!("atom at {start}: {:?}", self.sc.rest());

        if let Some(scalar) = literal::keyword_literal(&mut self.sc) {
            return Ok(Expr::Literal(scalar));
        }
        if literal::starts_number(&self.sc) {
            return literal::number(&mut self.sc, false).map(Expr::Literal);
        }

        match self.sc.peek() {
            Some('(') => {
                self.sc.bump();
                let inner = self.expr()?;
                self.sc.expect(')', "')'")?;
                Ok(inner)
            }
            Some('[') => {
                self.sc.bump();
                self.json_array_body()
            }
            Some('{') => {
                self.sc.bump();
                self.json_doc_body()
            }
            Some('"' | '\'') => literal::quoted(&mut self.sc).map(|s| Expr::Literal(Scalar::Str(s))),
            Some('?') => {
                self.sc.bump();
                let position = self.positional;
                self.positional += 1;
                Ok(Expr::Placeholder(Placeholder::Positional(position)))
            }
            Some(':') => {
                self.sc.bump();
                let name_start = self.sc.pos();
                while self
                    .sc
                    .peek()
                    .is_some_and(|c| c.is_alphanumeric() || c == '_')
                {
                    self.sc.bump();
                }
                if name_start == self.sc.pos() {
                    return Err(self.sc.error("expected placeholder name"));
                }
                let name = self.sc.slice(name_start, self.sc.pos());
                Ok(Expr::Placeholder(Placeholder::Named(name.to_string())))
            }
            Some('$') => {
                if self.mode == Mode::Table {
                    return Err(self.sc.error("document paths are only valid in document mode"));
                }
                self.sc.bump();
                Ok(Expr::DocumentField(path::segments(&mut self.sc, Vec::new())?))
            }
            Some('`') => {
                let first = self.identifier()?;
                self.identifier_tail(first)
            }
            Some(c) if is_ident_start(c) => {
                if self.sc.peek_keyword("cast") && self.peek_after_word_is('(') {
                    return self.cast();
                }
                let first = self.bare_identifier()?;
                self.identifier_tail(first)
            }
            _ => Err(self.sc.error_at(start, "expected expression")),
        }
    }

    /// Decides between a function call, a column and a document field once the
    /// first identifier has been read.
    fn identifier_tail(&mut self, first: String) -> Result<Expr, SyntaxError> {
        let mark = self.sc.pos();
        self.sc.skip_ws();
        if self.sc.peek() == Some('(') {
            return self.call_args(None, first);
        }
        self.sc.reset(mark);

        if self.sc.peek() == Some('.') {
            let mut ahead = self.sc.clone();
            ahead.bump();
            let mut lookahead = Parser {
                sc: ahead,
                mode: self.mode,
                positional: self.positional,
            };
            if let Ok(second) = lookahead.identifier() {
                lookahead.sc.skip_ws();
                if lookahead.sc.peek() == Some('(') {
                    self.sc = lookahead.sc;
                    return self.call_args(Some(first), second);
                }
            }
        }

        match self.mode {
            Mode::Table => self.column_from(first),
            Mode::Document => Ok(Expr::DocumentField(path::segments(
                &mut self.sc,
                vec![PathItem::Member(first)],
            )?)),
        }
    }

    fn column_from(&mut self, first: String) -> Result<Expr, SyntaxError> {
        let mut parts = vec![first];
        while parts.len() < 3 && self.sc.peek() == Some('.') {
            let mark = self.sc.pos();
            self.sc.bump();
            match self.identifier() {
                Ok(part) => parts.push(part),
                Err(_) => {
                    self.sc.reset(mark);
                    break;
                }
            }
        }
        let name = parts.pop().unwrap_or_default();
        let table = parts.pop();
        let mut column = ColumnIdent {
            schema: parts.pop(),
            table,
            name,
            path: Vec::new(),
        };

        let mark = self.sc.pos();
        self.sc.skip_ws();
        let unquote = if self.sc.eat_str("->>") {
            true
        } else if self.sc.eat_str("->") {
            false
        } else {
            self.sc.reset(mark);
            return Ok(Expr::Column(column));
        };
        self.sc.skip_ws();
        let path_start = self.sc.pos();
        let raw = match self.sc.peek() {
            Some('\'' | '"' | '`') => literal::quoted(&mut self.sc)?,
            _ => return Err(self.sc.error("expected quoted JSON path after '->'")),
        };
        column.path = path::rooted(&raw).map_err(|e| SyntaxError {
            position: path_start + 1 + e.position,
            message: e.message,
        })?;
        let ident = Expr::Column(column);
        Ok(if unquote {
            Expr::call("JSON_UNQUOTE", vec![ident])
        } else {
            ident
        })
    }

    fn call_args(&mut self, schema: Option<String>, name: String) -> Result<Expr, SyntaxError> {
        self.sc.expect('(', "'('")?;
        let mut args = Vec::new();
        self.sc.skip_ws();
        if !self.sc.eat(')') {
            loop {
                self.sc.skip_ws();
                let star = self.sc.pos();
                if self.sc.eat('*') {
                    self.sc.skip_ws();
                    if matches!(self.sc.peek(), Some(',' | ')')) {
                        args.push(Expr::op("*", vec![]));
                    } else {
                        return Err(self.sc.error_at(star, "expected expression"));
                    }
                } else {
                    args.push(self.expr()?);
                }
                self.sc.skip_ws();
                if self.sc.eat(')') {
                    break;
                }
                if !self.sc.eat(',') {
                    return Err(self.sc.error("expected ',' or ')' in argument list"));
                }
            }
        }
        Ok(Expr::FunctionCall { schema, name, args })
    }

    fn cast(&mut self) -> Result<Expr, SyntaxError> {
        self.sc.eat_keyword("cast");
        self.sc.expect('(', "'('")?;
        let value = self.expr()?;
        self.sc.skip_ws();
        if !self.sc.eat_keyword("as") {
            return Err(self.sc.error("expected AS in CAST"));
        }
        let ty = self.cast_type()?;
        self.sc.expect(')', "')'")?;
        Ok(Expr::op("cast", vec![value, ty]))
    }

    fn json_doc_body(&mut self) -> Result<Expr, SyntaxError> {
        let mut fields = Vec::new();
        self.sc.skip_ws();
        if self.sc.eat('}') {
            return Ok(Expr::JsonDoc(fields));
        }
        loop {
            self.sc.skip_ws();
            let key = match self.sc.peek() {
                Some('"' | '\'') => literal::quoted(&mut self.sc)?,
                Some(c) if is_ident_start(c) && self.mode == Mode::Document => {
                    let word = self.sc.peek_word().unwrap_or_default();
                    self.sc.eat_str(word);
                    word.to_string()
                }
                _ => return Err(self.sc.error("expected object key")),
            };
            self.sc.expect(':', "':' after object key")?;
            fields.push((key, self.expr()?));
            self.sc.skip_ws();
            if self.sc.eat('}') {
                return Ok(Expr::JsonDoc(fields));
            }
            if !self.sc.eat(',') {
                return Err(self.sc.error("expected ',' or '}'"));
            }
        }
    }

    fn json_array_body(&mut self) -> Result<Expr, SyntaxError> {
        let mut items = Vec::new();
        self.sc.skip_ws();
        if self.sc.eat(']') {
            return Ok(Expr::JsonArray(items));
        }
        loop {
            items.push(self.expr()?);
            self.sc.skip_ws();
            if self.sc.eat(']') {
                return Ok(Expr::JsonArray(items));
            }
            if !self.sc.eat(',') {
                return Err(self.sc.error("expected ',' or ']'"));
            }
        }
    }

    /// A bare or backtick-quoted identifier.
    fn identifier(&mut self) -> Result<String, SyntaxError> {
        if self.sc.peek() == Some('`') {
            return literal::quoted(&mut self.sc);
        }
        self.bare_identifier()
    }

    fn bare_identifier(&mut self) -> Result<String, SyntaxError> {
        match self.sc.peek_word() {
            Some(word) if !is_reserved(word) => {
                self.sc.eat_str(word);
                Ok(word.to_string())
            }
            Some(word) => Err(self.sc.error(format!("'{word}' is a reserved word"))),
            None => Err(self.sc.error("expected identifier")),
        }
    }

    fn peek_after_word_is(&self, c: char) -> bool {
        let mut ahead = self.sc.clone();
        if let Some(word) = ahead.peek_word() {
            ahead.eat_str(word);
        }
        ahead.skip_ws();
        ahead.peek() == Some(c)
    }
}
