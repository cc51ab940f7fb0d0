//! Expression compiler for collection and table statements.
//!
//! Filter, projection and ordering strings handed to the statement builders are
//! compiled here into an [`Expr`] tree that maps one-to-one onto the protocol's
//! expression messages. Compilation is pure and synchronous: a string that fails to
//! compile produces a [`SyntaxError`] before anything is written to the wire.
//!
//! # Modes
//!
//! - [`Mode::Document`]: bare identifiers are document fields (`age > 18` reads
//!   `$.age`), and `$`, `[n]`, `[*]`, `.*` and `**` path syntax is available.
//! - [`Mode::Table`]: bare identifiers are columns (`schema.table.column`); JSON
//!   values inside a column are reached with `col->'$.path'` or `col->>'$.path'`.
//!
//! # Grammar entries
//!
//! Each call site asks for the production it needs through [`GrammarEntry`]: a
//! filter is an [`GrammarEntry::Expr`], an ordering clause a
//! [`GrammarEntry::SortExpr`], a projection a [`GrammarEntry::ProjectedSearchExpr`].
//!
//! # Example
//! ```rust
//! use xproto::expr::{self, Expr, GrammarEntry, Mode, Parsed};
//!
//! let parsed = expr::parse("2 * 2 - 1", Mode::Document, GrammarEntry::Expr).unwrap();
//! assert_eq!(
//!     parsed,
//!     Parsed::Expr(Expr::op(
//!         "-",
//!         vec![Expr::op("*", vec![2_u64.into(), 2_u64.into()]), 1_u64.into()],
//!     ))
//! );
//! ```
mod ast;
mod literal;
mod parser;
mod path;
mod scanner;

use thiserror::Error;

pub use ast::{ColumnIdent, Direction, Expr, PathItem, Placeholder, Projection, Scalar, SortExpr};
pub use literal::MAX_SAFE_INTEGER;

use parser::Parser;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("syntax error at position {position}: {message}")]
pub struct SyntaxError {
    /// Byte offset into the input.
    pub position: usize,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Document,
    Table,
}

/// Grammar production to start parsing from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrammarEntry {
    Expr,
    Literal,
    FunctionCall,
    Placeholder,
    DocumentField,
    ColumnIdent,
    JsonDoc,
    JsonArray,
    CastType,
    SortExpr,
    ProjectedSearchExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Parsed {
    Expr(Expr),
    Sort(SortExpr),
    Projection(Projection),
}

impl Parsed {
    pub fn into_expr(self) -> Expr {
        match self {
            Parsed::Expr(e) => e,
            Parsed::Sort(s) => s.expr,
            Parsed::Projection(p) => p.source,
        }
    }
}

/// Compiles `input` starting at `entry`. The whole input has to be consumed.
pub fn parse(input: &str, mode: Mode, entry: GrammarEntry) -> Result<Parsed, SyntaxError> {
    let mut parser = Parser::new(input, mode);
    let parsed = match entry {
        GrammarEntry::Expr => Parsed::Expr(parser.expr()?),
        GrammarEntry::Literal => Parsed::Expr(parser.literal()?),
        GrammarEntry::FunctionCall => Parsed::Expr(parser.function_call()?),
        GrammarEntry::Placeholder => Parsed::Expr(parser.placeholder()?),
        GrammarEntry::DocumentField => Parsed::Expr(parser.document_field()?),
        GrammarEntry::ColumnIdent => Parsed::Expr(parser.column_ident()?),
        GrammarEntry::JsonDoc => Parsed::Expr(parser.json_doc()?),
        GrammarEntry::JsonArray => Parsed::Expr(parser.json_array()?),
        GrammarEntry::CastType => Parsed::Expr(parser.cast_type()?),
        GrammarEntry::SortExpr => Parsed::Sort(parser.sort_expr()?),
        GrammarEntry::ProjectedSearchExpr => Parsed::Projection(parser.projection()?),
    };
    parser.finish()?;
    Ok(parsed)
}

/// Shorthand for a full expression.
pub fn parse_expr(input: &str, mode: Mode) -> Result<Expr, SyntaxError> {
    parse(input, mode, GrammarEntry::Expr).map(Parsed::into_expr)
}

pub fn parse_sort(input: &str, mode: Mode) -> Result<SortExpr, SyntaxError> {
    match parse(input, mode, GrammarEntry::SortExpr)? {
        Parsed::Sort(sort) => Ok(sort),
        other => Ok(SortExpr {
            expr: other.into_expr(),
            direction: Direction::Asc,
        }),
    }
}

pub fn parse_projection(input: &str, mode: Mode) -> Result<Projection, SyntaxError> {
    match parse(input, mode, GrammarEntry::ProjectedSearchExpr)? {
        Parsed::Projection(p) => Ok(p),
        other => Ok(Projection {
            source: other.into_expr(),
            alias: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PathItem::*;

    fn doc(input: &str) -> Expr {
        parse_expr(input, Mode::Document).unwrap()
    }

    fn table(input: &str) -> Expr {
        parse_expr(input, Mode::Table).unwrap()
    }

    fn u(v: u64) -> Expr {
        v.into()
    }

    fn s(v: &str) -> Expr {
        Expr::Literal(Scalar::Str(v.to_string()))
    }

    #[test]
    fn left_associative_arithmetic() {
        assert_eq!(doc("3+5-2"), Expr::op("-", vec![Expr::op("+", vec![u(3), u(5)]), u(2)]));
        assert_eq!(
            doc("2 * 2 - 1"),
            Expr::op("-", vec![Expr::op("*", vec![u(2), u(2)]), u(1)])
        );
    }

    #[test]
    fn higher_precedence_nests_as_operand() {
        assert_eq!(
            doc("3+5*2"),
            Expr::op("+", vec![u(3), Expr::op("*", vec![u(5), u(2)])])
        );
        assert_eq!(
            doc("1 << 2 + 3"),
            Expr::op("<<", vec![u(1), Expr::op("+", vec![u(2), u(3)])])
        );
        assert_eq!(
            doc("a > 1 && b < 2 || c"),
            Expr::op(
                "||",
                vec![
                    Expr::op(
                        "&&",
                        vec![
                            Expr::op(">", vec![Expr::field(&["a"]), u(1)]),
                            Expr::op("<", vec![Expr::field(&["b"]), u(2)]),
                        ]
                    ),
                    Expr::field(&["c"]),
                ]
            )
        );
    }

    #[test]
    fn keyword_operators() {
        assert_eq!(
            doc("a = 1 AND b <> 2 or c div 2"),
            Expr::op(
                "||",
                vec![
                    Expr::op(
                        "&&",
                        vec![
                            Expr::op("==", vec![Expr::field(&["a"]), u(1)]),
                            Expr::op("!=", vec![Expr::field(&["b"]), u(2)]),
                        ]
                    ),
                    Expr::op("div", vec![Expr::field(&["c"]), u(2)]),
                ]
            )
        );
        assert_eq!(
            doc("a & b | c ^ 1"),
            Expr::op(
                "^",
                vec![
                    Expr::op("|", vec![Expr::op("&", vec![Expr::field(&["a"]), Expr::field(&["b"])]), Expr::field(&["c"])]),
                    u(1)
                ]
            )
        );
    }

    #[test]
    fn unary_operators() {
        assert_eq!(doc("!a"), Expr::unary("!", Expr::field(&["a"])));
        assert_eq!(doc("~1"), Expr::unary("~", u(1)));
        assert_eq!(doc("+a"), Expr::unary("sign_plus", Expr::field(&["a"])));
        assert_eq!(doc("-a"), Expr::unary("sign_minus", Expr::field(&["a"])));
        assert_eq!(doc("-5"), Expr::Literal(Scalar::SignedInt(-5)));
        assert_eq!(
            doc("NOT a"),
            Expr::unary("not", Expr::field(&["a"]))
        );
        assert_eq!(
            doc("2 - -1"),
            Expr::op("-", vec![u(2), Expr::Literal(Scalar::SignedInt(-1))])
        );
    }

    #[test]
    fn safe_integer_boundary() {
        for n in [0_i64, 1, -1, 42, -42, 9_007_199_254_740_991, -9_007_199_254_740_991] {
            let expected = Expr::from(n);
            assert_eq!(doc(&n.to_string()), expected, "{n}");
        }
        for n in ["9007199254740992", "-9007199254740992"] {
            assert_eq!(doc(n), Expr::Literal(Scalar::ExactString(n.to_string())));
        }
    }

    #[test]
    fn keyword_literals() {
        assert_eq!(doc("TRUE"), Expr::Literal(Scalar::Bool(true)));
        assert_eq!(doc("false"), Expr::Literal(Scalar::Bool(false)));
        assert_eq!(doc("Null"), Expr::Literal(Scalar::Null));
        assert_eq!(doc("nullable"), Expr::field(&["nullable"]));
    }

    #[test]
    fn quoted_strings() {
        assert_eq!(doc(r#""foo""bar""#), s(r#"foo"bar"#));
        assert_eq!(doc(r"'foo\'bar'"), s("foo'bar"));
        if let Expr::Literal(Scalar::Str(v)) = doc(r#""foo""bar""#) {
            assert_eq!(v.chars().count(), 7);
        }
    }

    #[test]
    fn not_prefixed_predicates() {
        assert!(parse_expr("not in (1,2,3)", Mode::Document).is_err());
        assert_eq!(
            doc("not not in (1,2,3)"),
            Expr::op("not_in", vec![Expr::field(&["not"]), u(1), u(2), u(3)])
        );
        assert_eq!(
            doc("a not in (1, 2)"),
            Expr::op("not_in", vec![Expr::field(&["a"]), u(1), u(2)])
        );
        assert_eq!(
            doc("not (a in (1))"),
            Expr::unary("not", Expr::op("in", vec![Expr::field(&["a"]), u(1)]))
        );
    }

    #[test]
    fn ilri_operators() {
        assert_eq!(
            doc("a is not null"),
            Expr::op("is_not", vec![Expr::field(&["a"]), Expr::Literal(Scalar::Null)])
        );
        assert_eq!(
            doc("name like 'J%' escape '!'"),
            Expr::op("like", vec![Expr::field(&["name"]), s("J%"), s("!")])
        );
        assert_eq!(
            doc("name not regexp '^a'"),
            Expr::op("not_regexp", vec![Expr::field(&["name"]), s("^a")])
        );
        assert_eq!(
            doc("age between 18 and 65 && x"),
            Expr::op(
                "&&",
                vec![
                    Expr::op("between", vec![Expr::field(&["age"]), u(18), u(65)]),
                    Expr::field(&["x"]),
                ]
            )
        );
        assert_eq!(
            doc("'a' in tags"),
            Expr::op("cont_in", vec![s("a"), Expr::field(&["tags"])])
        );
        assert_eq!(
            doc("[1] not overlaps $.ids"),
            Expr::op("not_overlaps", vec![Expr::JsonArray(vec![u(1)]), Expr::field(&["ids"])])
        );
        assert_eq!(
            doc("a in (b) + 1"),
            Expr::op(
                "cont_in",
                vec![Expr::field(&["a"]), Expr::op("+", vec![Expr::field(&["b"]), u(1)])]
            )
        );
    }

    #[test]
    fn intervals() {
        assert_eq!(
            doc("created + interval 2 day"),
            Expr::op(
                "date_add",
                vec![
                    Expr::field(&["created"]),
                    u(2),
                    Expr::Literal(Scalar::Bytes(b"DAY".to_vec()))
                ]
            )
        );
        assert_eq!(
            doc("created - INTERVAL 1 year_month * 2"),
            Expr::op(
                "*",
                vec![
                    Expr::op(
                        "date_sub",
                        vec![
                            Expr::field(&["created"]),
                            u(1),
                            Expr::Literal(Scalar::Bytes(b"YEAR_MONTH".to_vec()))
                        ]
                    ),
                    u(2)
                ]
            )
        );
        assert!(parse_expr("a + interval 1 fortnight", Mode::Document).is_err());
    }

    #[test]
    fn document_paths() {
        assert_eq!(doc("$"), Expr::DocumentField(vec![]));
        assert_eq!(
            doc("$.a.b[2]"),
            Expr::DocumentField(vec![Member("a".into()), Member("b".into()), Index(2)])
        );
        assert_eq!(
            doc("foo[*].bar"),
            Expr::DocumentField(vec![Member("foo".into()), IndexAsterisk, Member("bar".into())])
        );
        assert_eq!(
            doc("$**.x"),
            Expr::DocumentField(vec![DoubleAsterisk, Member("x".into())])
        );
        assert_eq!(
            doc("`odd name`.x"),
            Expr::DocumentField(vec![Member("odd name".into()), Member("x".into())])
        );
        for bad in ["$.foo..bar", "$.a**", "$**", "$****.a", r#"$."foo"bar"#] {
            assert!(parse_expr(bad, Mode::Document).is_err(), "{bad} should fail");
        }
    }

    #[test]
    fn table_mode_columns() {
        assert_eq!(table("price"), Expr::column("price"));
        assert_eq!(
            table("shop.items.price > 10"),
            Expr::op(
                ">",
                vec![
                    Expr::Column(ColumnIdent {
                        schema: Some("shop".into()),
                        table: Some("items".into()),
                        name: "price".into(),
                        path: vec![],
                    }),
                    u(10)
                ]
            )
        );
        assert_eq!(
            table("doc->'$.a[0]'"),
            Expr::Column(ColumnIdent {
                name: "doc".into(),
                path: vec![Member("a".into()), Index(0)],
                ..Default::default()
            })
        );
        assert_eq!(
            table("doc->>'$.name' = 'x'"),
            Expr::op(
                "==",
                vec![
                    Expr::call(
                        "JSON_UNQUOTE",
                        vec![Expr::Column(ColumnIdent {
                            name: "doc".into(),
                            path: vec![Member("name".into())],
                            ..Default::default()
                        })]
                    ),
                    s("x")
                ]
            )
        );
    }

    #[test]
    fn table_mode_rejects_document_syntax() {
        for bad in ["$.a", "a[0]", "a**.b", "doc->'a'"] {
            assert!(parse_expr(bad, Mode::Table).is_err(), "{bad} should fail");
        }
    }

    #[test]
    fn function_calls() {
        assert_eq!(doc("now()"), Expr::call("now", vec![]));
        assert_eq!(
            doc("mysql.concat(a, 'b', :c, lower(d))"),
            Expr::FunctionCall {
                schema: Some("mysql".into()),
                name: "concat".into(),
                args: vec![
                    Expr::field(&["a"]),
                    s("b"),
                    Expr::Placeholder(Placeholder::Named("c".into())),
                    Expr::call("lower", vec![Expr::field(&["d"])]),
                ],
            }
        );
        assert_eq!(
            table("count(*)"),
            Expr::call("count", vec![Expr::op("*", vec![])])
        );
        assert_eq!(
            parse("s.f(1)", Mode::Table, GrammarEntry::FunctionCall).unwrap(),
            Parsed::Expr(Expr::FunctionCall {
                schema: Some("s".into()),
                name: "f".into(),
                args: vec![u(1)],
            })
        );
        assert!(parse("f", Mode::Table, GrammarEntry::FunctionCall).is_err());
    }

    #[test]
    fn cast_expressions() {
        assert_eq!(
            doc("cast(a as decimal( 10 , 2 ))"),
            Expr::op(
                "cast",
                vec![Expr::field(&["a"]), Expr::Literal(Scalar::Bytes(b"DECIMAL(10,2)".to_vec()))]
            )
        );
        assert_eq!(
            parse("unsigned   integer", Mode::Table, GrammarEntry::CastType).unwrap(),
            Parsed::Expr(Expr::Literal(Scalar::Bytes(b"UNSIGNED INTEGER".to_vec())))
        );
    }

    #[test]
    fn placeholders() {
        let expr = doc("a == ? && b == ? && c == :name");
        assert_eq!(expr.positional_count(), 2);
        assert_eq!(expr.placeholders(), vec!["name".to_string()]);
        assert!(parse_expr("a == :", Mode::Document).is_err());
    }

    #[test]
    fn json_literals() {
        assert_eq!(
            doc(r#"{"a": 1, b: [1, "two", {c: $.d}]}"#),
            Expr::JsonDoc(vec![
                ("a".into(), u(1)),
                (
                    "b".into(),
                    Expr::JsonArray(vec![
                        u(1),
                        s("two"),
                        Expr::JsonDoc(vec![("c".into(), Expr::field(&["d"]))]),
                    ])
                ),
            ])
        );
        assert_eq!(doc("{}"), Expr::JsonDoc(vec![]));
        assert!(parse_expr("{b: 1}", Mode::Table).is_err());
        assert_eq!(
            parse("{'k': 1 + 1}", Mode::Table, GrammarEntry::JsonDoc).unwrap(),
            Parsed::Expr(Expr::JsonDoc(vec![("k".into(), Expr::op("+", vec![u(1), u(1)]))]))
        );
    }

    #[test]
    fn sort_entries() {
        assert_eq!(
            parse_sort("age desc", Mode::Document).unwrap(),
            SortExpr {
                expr: Expr::field(&["age"]),
                direction: Direction::Desc
            }
        );
        assert_eq!(
            parse_sort("a + 1 ASC", Mode::Document).unwrap().direction,
            Direction::Asc
        );
        assert_eq!(
            parse_sort("name", Mode::Table).unwrap().direction,
            Direction::Asc
        );
        assert!(parse_sort("name sideways", Mode::Table).is_err());
    }

    #[test]
    fn projection_entries() {
        let p = parse_projection("upper(name) as shout", Mode::Document).unwrap();
        assert_eq!(p.alias.as_deref(), Some("shout"));
        assert_eq!(p.source, Expr::call("upper", vec![Expr::field(&["name"])]));
    }

    #[test]
    fn restricted_entries() {
        assert!(parse("a + 1", Mode::Document, GrammarEntry::Literal).is_err());
        assert_eq!(
            parse("-3.5", Mode::Document, GrammarEntry::Literal).unwrap(),
            Parsed::Expr(Expr::Literal(Scalar::Double(-3.5)))
        );
        assert!(parse("a", Mode::Table, GrammarEntry::DocumentField).is_err());
        assert_eq!(
            parse("a.b", Mode::Document, GrammarEntry::DocumentField).unwrap(),
            Parsed::Expr(Expr::field(&["a", "b"]))
        );
        assert!(parse("x", Mode::Document, GrammarEntry::Placeholder).is_err());
    }

    #[test]
    fn syntax_errors_carry_position() {
        let err = parse_expr("a + ", Mode::Document).unwrap_err();
        assert_eq!(err.position, 4);
        let err = parse_expr("a b", Mode::Document).unwrap_err();
        assert_eq!(err.position, 2);
        let err = parse_expr("(1 + 2", Mode::Document).unwrap_err();
        assert!(err.message.contains("')'"));
    }
}
