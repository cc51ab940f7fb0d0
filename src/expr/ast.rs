use std::fmt;

/// A literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    SignedInt(i64),
    UnsignedInt(u64),
    Double(f64),
    /// A number that would lose precision as a double, kept as its decimal text.
    ExactString(String),
    Str(String),
    Bytes(Vec<u8>),
}

/// One step of a document path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathItem {
    Member(String),
    MemberAsterisk,
    Index(u32),
    IndexAsterisk,
    DoubleAsterisk,
}

/// Table column, optionally drilled into with `->'$.path'`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnIdent {
    pub schema: Option<String>,
    pub table: Option<String>,
    pub name: String,
    pub path: Vec<PathItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
    /// `:name`
    Named(String),
    /// `?`, numbered in order of appearance.
    Positional(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Scalar),
    DocumentField(Vec<PathItem>),
    Column(ColumnIdent),
    Placeholder(Placeholder),
    FunctionCall {
        schema: Option<String>,
        name: String,
        args: Vec<Expr>,
    },
    Operator {
        name: String,
        args: Vec<Expr>,
    },
    UnaryOp {
        name: String,
        arg: Box<Expr>,
    },
    JsonDoc(Vec<(String, Expr)>),
    JsonArray(Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortExpr {
    pub expr: Expr,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub source: Expr,
    pub alias: Option<String>,
}

impl Expr {
    pub fn op(name: &str, args: Vec<Expr>) -> Self {
        Expr::Operator {
            name: name.to_string(),
            args,
        }
    }

    pub fn unary(name: &str, arg: Expr) -> Self {
        Expr::UnaryOp {
            name: name.to_string(),
            arg: Box::new(arg),
        }
    }

    pub fn call(name: &str, args: Vec<Expr>) -> Self {
        Expr::FunctionCall {
            schema: None,
            name: name.to_string(),
            args,
        }
    }

    /// Document field made of plain member names.
    pub fn field(members: &[&str]) -> Self {
        Expr::DocumentField(
            members
                .iter()
                .map(|m| PathItem::Member(m.to_string()))
                .collect(),
        )
    }

    pub fn column(name: &str) -> Self {
        Expr::Column(ColumnIdent {
            name: name.to_string(),
            ..Default::default()
        })
    }

    /// Named placeholders in order of first appearance.
    pub fn placeholders(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_placeholders(&mut out);
        out
    }

    pub(crate) fn collect_placeholders(&self, out: &mut Vec<String>) {
        match self {
            Expr::Placeholder(Placeholder::Named(name)) => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            Expr::FunctionCall { args, .. } | Expr::Operator { args, .. } => {
                args.iter().for_each(|a| a.collect_placeholders(out))
            }
            Expr::UnaryOp { arg, .. } => arg.collect_placeholders(out),
            Expr::JsonDoc(fields) => fields.iter().for_each(|(_, v)| v.collect_placeholders(out)),
            Expr::JsonArray(items) => items.iter().for_each(|v| v.collect_placeholders(out)),
            _ => {}
        }
    }

    /// Renumbers `?` placeholders to start at `base`, for an expression that follows
    /// other separately parsed expressions in the same request.
    pub fn shift_positionals(&mut self, base: u32) {
        match self {
            Expr::Placeholder(Placeholder::Positional(p)) => *p += base,
            Expr::FunctionCall { args, .. } | Expr::Operator { args, .. } | Expr::JsonArray(args) => {
                args.iter_mut().for_each(|a| a.shift_positionals(base))
            }
            Expr::UnaryOp { arg, .. } => arg.shift_positionals(base),
            Expr::JsonDoc(fields) => fields.iter_mut().for_each(|(_, v)| v.shift_positionals(base)),
            _ => {}
        }
    }

    /// Number of `?` placeholders.
    pub fn positional_count(&self) -> u32 {
        match self {
            Expr::Placeholder(Placeholder::Positional(p)) => p + 1,
            Expr::FunctionCall { args, .. } | Expr::Operator { args, .. } | Expr::JsonArray(args) => {
                args.iter().map(Expr::positional_count).max().unwrap_or(0)
            }
            Expr::UnaryOp { arg, .. } => arg.positional_count(),
            Expr::JsonDoc(fields) => fields
                .iter()
                .map(|(_, v)| v.positional_count())
                .max()
                .unwrap_or(0),
            _ => 0,
        }
    }
}

impl From<u64> for Scalar {
    fn from(value: u64) -> Self {
        Scalar::UnsignedInt(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        if value >= 0 {
            Scalar::UnsignedInt(value as u64)
        } else {
            Scalar::SignedInt(value)
        }
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Double(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Str(value.to_string())
    }
}

impl From<Scalar> for Expr {
    fn from(value: Scalar) -> Self {
        Expr::Literal(value)
    }
}

macro_rules! literal_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Expr {
            fn from(value: $t) -> Self {
                Expr::Literal(value.into())
            }
        })*
    };
}

literal_from!(u64, i64, f64, bool, &str);

impl fmt::Display for PathItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathItem::Member(name) => write!(f, ".{name}"),
            PathItem::MemberAsterisk => write!(f, ".*"),
            PathItem::Index(i) => write!(f, "[{i}]"),
            PathItem::IndexAsterisk => write!(f, "[*]"),
            PathItem::DoubleAsterisk => write!(f, "**"),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "NULL"),
            Scalar::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Scalar::SignedInt(i) => write!(f, "{i}"),
            Scalar::UnsignedInt(u) => write!(f, "{u}"),
            Scalar::Double(d) => write!(f, "{d}"),
            Scalar::ExactString(s) => write!(f, "{s}"),
            Scalar::Str(s) => write!(f, "{s:?}"),
            Scalar::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(s) => write!(f, "{s}"),
            Expr::DocumentField(path) => {
                write!(f, "$")?;
                path.iter().try_for_each(|p| write!(f, "{p}"))
            }
            Expr::Column(col) => {
                if let Some(schema) = &col.schema {
                    write!(f, "{schema}.")?;
                }
                if let Some(table) = &col.table {
                    write!(f, "{table}.")?;
                }
                write!(f, "{}", col.name)?;
                if !col.path.is_empty() {
                    write!(f, "->'$")?;
                    col.path.iter().try_for_each(|p| write!(f, "{p}"))?;
                    write!(f, "'")?;
                }
                Ok(())
            }
            Expr::Placeholder(Placeholder::Named(n)) => write!(f, ":{n}"),
            Expr::Placeholder(Placeholder::Positional(_)) => write!(f, "?"),
            Expr::FunctionCall { schema, name, args } => {
                if let Some(schema) = schema {
                    write!(f, "{schema}.")?;
                }
                write!(f, "{name}(")?;
                write_list(f, args)?;
                write!(f, ")")
            }
            Expr::Operator { name, args } => {
                write!(f, "{name}(")?;
                write_list(f, args)?;
                write!(f, ")")
            }
            Expr::UnaryOp { name, arg } => write!(f, "{name}({arg})"),
            Expr::JsonDoc(fields) => {
                write!(f, "{{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k:?}: {v}")?;
                }
                write!(f, "}}")
            }
            Expr::JsonArray(items) => {
                write!(f, "[")?;
                write_list(f, items)?;
                write!(f, "]")
            }
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_in_first_appearance_order() {
        let expr = Expr::op(
            "&&",
            vec![
                Expr::op(
                    "==",
                    vec![
                        Expr::field(&["a"]),
                        Expr::Placeholder(Placeholder::Named("x".into())),
                    ],
                ),
                Expr::op(
                    "in",
                    vec![
                        Expr::Placeholder(Placeholder::Named("y".into())),
                        Expr::Placeholder(Placeholder::Named("x".into())),
                    ],
                ),
            ],
        );
        assert_eq!(expr.placeholders(), vec!["x".to_string(), "y".to_string()]);
        assert_eq!(expr.positional_count(), 0);
    }

    #[test]
    fn display_is_readable() {
        let expr = Expr::op("+", vec![Expr::field(&["a", "b"]), 1_u64.into()]);
        assert_eq!(expr.to_string(), "+($.a.b, 1)");
    }
}
