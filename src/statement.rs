//! Request builders.
//!
//! Builders compile their expression strings as they are given, so a malformed filter
//! is reported before anything is queued or written.
use thiserror::Error;

use crate::{
    expr::{self, Direction, Expr, Mode, Projection, Scalar, SortExpr, SyntaxError},
    protocol::{
        ClientMessage,
        codec::{AnyValue, Placeholders, encode_expr, encode_scalar},
        message,
    },
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatementError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error("empty statement")]
    EmptyStatement,

    #[error("no value bound for placeholder '{0}'")]
    MissingBinding(String),

    #[error("placeholder '{0}' is not used by the statement")]
    UnknownBinding(String),
}

/// Raw SQL with positional `?` arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    sql: String,
    args: Vec<AnyValue>,
}

impl SqlStatement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            args: Vec::new(),
        }
    }

    pub fn bind(mut self, value: impl Into<AnyValue>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn build(self) -> Result<ClientMessage, StatementError> {
        if self.sql.trim().is_empty() {
            return Err(StatementError::EmptyStatement);
        }
        Ok(ClientMessage::sql(self.sql, self.args))
    }
}

/// `Crud.Find` against a collection (document mode) or a table (table mode).
#[derive(Debug, Clone, PartialEq)]
pub struct FindStatement {
    schema: Option<String>,
    target: String,
    mode: Mode,
    filter: Option<Expr>,
    fields: Vec<Projection>,
    sort: Vec<SortExpr>,
    group_by: Vec<Expr>,
    having: Option<Expr>,
    limit: Option<u64>,
    offset: Option<u64>,
    positional: Vec<Scalar>,
    named: Vec<(String, Scalar)>,
}

impl FindStatement {
    pub fn new(schema: Option<&str>, target: impl Into<String>, mode: Mode) -> Self {
        Self {
            schema: schema.map(str::to_string),
            target: target.into(),
            mode,
            filter: None,
            fields: Vec::new(),
            sort: Vec::new(),
            group_by: Vec::new(),
            having: None,
            limit: None,
            offset: None,
            positional: Vec::new(),
            named: Vec::new(),
        }
    }

    pub fn filter(mut self, criteria: &str) -> Result<Self, StatementError> {
        self.filter = Some(expr::parse_expr(criteria, self.mode)?);
        Ok(self)
    }

    pub fn fields(mut self, fields: &[&str]) -> Result<Self, StatementError> {
        for field in fields {
            self.fields.push(expr::parse_projection(field, self.mode)?);
        }
        Ok(self)
    }

    pub fn sort(mut self, specs: &[&str]) -> Result<Self, StatementError> {
        for spec in specs {
            self.sort.push(expr::parse_sort(spec, self.mode)?);
        }
        Ok(self)
    }

    pub fn group_by(mut self, exprs: &[&str]) -> Result<Self, StatementError> {
        for e in exprs {
            self.group_by.push(expr::parse_expr(e, self.mode)?);
        }
        Ok(self)
    }

    pub fn having(mut self, criteria: &str) -> Result<Self, StatementError> {
        self.having = Some(expr::parse_expr(criteria, self.mode)?);
        Ok(self)
    }

    pub fn limit(mut self, rows: u64) -> Self {
        self.limit = Some(rows);
        self
    }

    pub fn offset(mut self, rows: u64) -> Self {
        self.offset = Some(rows);
        self
    }

    /// Value for the next `?`.
    pub fn arg(mut self, value: impl Into<Scalar>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Value for `:name`. Binding the same name again replaces the value.
    pub fn bind(mut self, name: &str, value: impl Into<Scalar>) -> Self {
        let value = value.into();
        match self.named.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => self.named.push((name.to_string(), value)),
        }
        self
    }

    /// Every clause's expressions, in the order their `?` placeholders are numbered.
    fn exprs_mut(&mut self) -> impl Iterator<Item = &mut Expr> {
        self.filter
            .iter_mut()
            .chain(self.fields.iter_mut().map(|p| &mut p.source))
            .chain(self.sort.iter_mut().map(|s| &mut s.expr))
            .chain(self.group_by.iter_mut())
            .chain(self.having.iter_mut())
    }

    /// Resolves placeholders and encodes the request.
    ///
    /// `?` placeholders are numbered across clauses in the order filter, fields, sort,
    /// grouping, having; `arg` values are consumed in that order.
    pub fn build(mut self) -> Result<ClientMessage, StatementError> {
        let placeholders = Placeholders::assign(self.exprs_mut());

        if let Some((name, _)) = self
            .named
            .iter()
            .find(|(n, _)| !placeholders.named().contains(n))
        {
            return Err(StatementError::UnknownBinding(name.clone()));
        }

        let mut args = Vec::with_capacity(placeholders.len());
        for i in 0..placeholders.positional() as usize {
            let value = self
                .positional
                .get(i)
                .ok_or_else(|| StatementError::MissingBinding(format!("?{i}")))?;
            args.push(encode_scalar(value));
        }
        for name in placeholders.named() {
            let (_, value) = self
                .named
                .iter()
                .find(|(n, _)| n == name)
                .ok_or_else(|| StatementError::MissingBinding(name.clone()))?;
            args.push(encode_scalar(value));
        }

        let encode = |e: &Expr| encode_expr(e, &placeholders);
        let limit = match (self.limit, self.offset) {
            (None, None) => None,
            (row_count, offset) => Some(message::Limit {
                row_count: row_count.unwrap_or(u64::MAX),
                offset,
            }),
        };
        let data_model = match self.mode {
            Mode::Document => message::DataModel::Document,
            Mode::Table => message::DataModel::Table,
        };

        let find = message::Find {
            collection: Some(message::Collection {
                name: self.target,
                schema: self.schema,
            }),
            data_model: Some(data_model as i32),
            projection: self
                .fields
                .iter()
                .map(|p| message::Projection {
                    source: Some(encode(&p.source)),
                    alias: p.alias.clone(),
                })
                .collect(),
            criteria: self.filter.as_ref().map(encode),
            limit,
            order: self
                .sort
                .iter()
                .map(|s| message::Order {
                    expr: Some(encode(&s.expr)),
                    direction: Some(match s.direction {
                        Direction::Asc => message::OrderDirection::Asc,
                        Direction::Desc => message::OrderDirection::Desc,
                    } as i32),
                })
                .collect(),
            grouping: self.group_by.iter().map(encode).collect(),
            grouping_criteria: self.having.as_ref().map(encode),
            args,
        };
        Ok(ClientMessage::Find(Box::new(find)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::ExprType;

    fn find(message: ClientMessage) -> message::Find {
        match message {
            ClientMessage::Find(find) => *find,
            other => panic!("expected find, got {other:?}"),
        }
    }

    #[test]
    fn sql_statement() {
        let msg = SqlStatement::new("SELECT ? + ?").bind(1_i64).bind("x").build().unwrap();
        let ClientMessage::StmtExecute { namespace, args, .. } = msg else {
            panic!("expected StmtExecute");
        };
        assert_eq!(namespace, "sql");
        assert_eq!(args.len(), 2);
    }

    #[test]
    #[should_panic(expected = "EmptyStatement")]
    fn empty_sql() {
        SqlStatement::new("   ").build().unwrap();
    }

    #[test]
    fn find_with_named_bindings() {
        let msg = FindStatement::new(Some("test"), "people", Mode::Document)
            .filter("age > :min && name like :pattern")
            .unwrap()
            .fields(&["name", "age * 2 as double_age"])
            .unwrap()
            .sort(&["age desc"])
            .unwrap()
            .limit(10)
            .bind("pattern", "A%")
            .bind("min", 18_u64)
            .build()
            .unwrap();

        let find = find(msg);
        let collection = find.collection.unwrap();
        assert_eq!(collection.name, "people");
        assert_eq!(collection.schema.as_deref(), Some("test"));
        assert_eq!(find.data_model, Some(message::DataModel::Document as i32));

        // Bindings follow first appearance in the filter, not bind order.
        assert_eq!(find.args.len(), 2);
        assert_eq!(find.args[0].v_unsigned_int, Some(18));
        assert_eq!(find.args[1].v_string.as_ref().unwrap().value, b"A%".to_vec());

        assert_eq!(find.projection[1].alias.as_deref(), Some("double_age"));
        assert_eq!(find.order[0].direction, Some(message::OrderDirection::Desc as i32));
        assert_eq!(find.limit.unwrap().row_count, 10);
        assert_eq!(find.criteria.unwrap().r#type, ExprType::Operator as i32);
    }

    #[test]
    fn positional_and_named_mix() {
        let msg = FindStatement::new(None, "t", Mode::Table)
            .filter("a = ? and b = :b")
            .unwrap()
            .having("count(*) > ?")
            .unwrap()
            .arg(1_u64)
            .bind("b", true)
            .build();
        assert_eq!(msg, Err(StatementError::MissingBinding("?1".into())));
    }

    #[test]
    fn positionals_numbered_across_clauses() {
        let find = find(
            FindStatement::new(None, "t", Mode::Table)
                .filter("a = ? and b = :b")
                .unwrap()
                .having("count(*) > ?")
                .unwrap()
                .arg(1_u64)
                .arg(5_u64)
                .bind("b", true)
                .build()
                .unwrap(),
        );
        assert_eq!(find.args.len(), 3);
        assert_eq!(find.args[1].v_unsigned_int, Some(5));
        assert_eq!(find.args[2].v_bool, Some(true));

        let having = find.grouping_criteria.unwrap().operator.unwrap();
        assert_eq!(having.param[1].r#type, ExprType::Placeholder as i32);
        assert_eq!(having.param[1].position, Some(1));

        let and = find.criteria.unwrap().operator.unwrap();
        let b = and.param[1].operator.as_ref().unwrap();
        assert_eq!(b.param[1].position, Some(2));
    }

    #[test]
    fn unknown_and_missing_bindings() {
        let base = FindStatement::new(None, "c", Mode::Document).filter("a == :a").unwrap();
        assert_eq!(
            base.clone().build(),
            Err(StatementError::MissingBinding("a".into()))
        );
        assert_eq!(
            base.bind("a", 1_u64).bind("zzz", 2_u64).build(),
            Err(StatementError::UnknownBinding("zzz".into()))
        );
    }

    #[test]
    fn syntax_errors_surface_immediately() {
        let err = FindStatement::new(None, "c", Mode::Document)
            .filter("a ==")
            .unwrap_err();
        assert!(matches!(err, StatementError::Syntax(_)));
    }

    #[test]
    fn offset_without_limit() {
        let find = find(
            FindStatement::new(None, "c", Mode::Document)
                .offset(5)
                .build()
                .unwrap(),
        );
        let limit = find.limit.unwrap();
        assert_eq!(limit.row_count, u64::MAX);
        assert_eq!(limit.offset, Some(5));
    }

    #[test]
    fn table_grouping() {
        let find = find(
            FindStatement::new(Some("s"), "orders", Mode::Table)
                .fields(&["customer", "sum(total) as spent"])
                .unwrap()
                .group_by(&["customer"])
                .unwrap()
                .having("sum(total) > 100")
                .unwrap()
                .build()
                .unwrap(),
        );
        assert_eq!(find.data_model, Some(message::DataModel::Table as i32));
        assert_eq!(find.grouping.len(), 1);
        assert!(find.grouping_criteria.is_some());
    }
}
