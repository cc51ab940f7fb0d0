//! Document path grammar (`$.a.b[0]`, `$**.c`, `foo[*].bar`).
//!
//! Paths are read without skipping whitespace. The restrictions enforced here:
//!
//! - `..` is never valid,
//! - `**` cannot end a path or directly follow another `**`,
//! - a quoted member must be followed by `.`, `[`, `**` or the end of the path.
//!
//! `$**.*` and `$**[*]` are accepted even though the server may reject them; the
//! grammar is deliberately no stricter than that.
use super::{
    PathItem, SyntaxError, literal,
    scanner::{Scanner, is_ident_char, is_ident_start},
};

/// Reads path segments following a root (`$`) or a leading member name.
pub(crate) fn segments(sc: &mut Scanner, mut items: Vec<PathItem>) -> Result<Vec<PathItem>, SyntaxError> {
    loop {
        let start = sc.pos();
        if sc.eat_str("**") {
            if items.last() == Some(&PathItem::DoubleAsterisk) {
                return Err(sc.error_at(start, "'**' cannot follow '**'"));
            }
            items.push(PathItem::DoubleAsterisk);
            continue;
        }

        match sc.peek() {
            Some('.') => {
                sc.bump();
                items.push(member(sc)?);
            }
            Some('[') => {
                sc.bump();
                items.push(index(sc)?);
            }
            _ => break,
        }
    }

    if items.last() == Some(&PathItem::DoubleAsterisk) {
        return Err(sc.error("'**' cannot be the last path segment"));
    }
    Ok(items)
}

fn member(sc: &mut Scanner) -> Result<PathItem, SyntaxError> {
    match sc.peek() {
        Some('.') => Err(sc.error("empty path member")),
        Some('*') if sc.peek_nth(1) != Some('*') => {
            sc.bump();
            Ok(PathItem::MemberAsterisk)
        }
        Some('"' | '\'' | '`') => {
            let name = literal::quoted(sc)?;
            if sc.peek().is_some_and(is_ident_char) {
                return Err(sc.error("quoted path member must be followed by '.'"));
            }
            Ok(PathItem::Member(name))
        }
        Some(c) if is_ident_start(c) => {
            let name = sc.peek_word().unwrap_or_default();
            sc.eat_str(name);
            Ok(PathItem::Member(name.to_string()))
        }
        _ => Err(sc.error("expected path member")),
    }
}

fn index(sc: &mut Scanner) -> Result<PathItem, SyntaxError> {
    sc.skip_ws();
    let item = if sc.eat('*') {
        PathItem::IndexAsterisk
    } else {
        let start = sc.pos();
        while sc.peek().is_some_and(|c| c.is_ascii_digit()) {
            sc.bump();
        }
        if start == sc.pos() {
            return Err(sc.error("expected array index"));
        }
        let index = sc
            .slice(start, sc.pos())
            .parse::<u32>()
            .map_err(|_| sc.error_at(start, "array index out of range"))?;
        PathItem::Index(index)
    };
    sc.expect(']', "']'")?;
    Ok(item)
}

/// Reads a complete `$`-rooted path, as found inside `col->'$.path'`.
pub(crate) fn rooted(input: &str) -> Result<Vec<PathItem>, SyntaxError> {
    let mut sc = Scanner::new(input);
    sc.skip_ws();
    if !sc.eat('$') {
        return Err(sc.error("JSON path must start with '$'"));
    }
    let path = segments(&mut sc, Vec::new())?;
    sc.skip_ws();
    if !sc.is_eof() {
        return Err(sc.error("unexpected input in JSON path"));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use PathItem::*;

    fn path(input: &str) -> Vec<PathItem> {
        rooted(input).unwrap()
    }

    #[test]
    fn members_and_indexes() {
        assert_eq!(path("$"), vec![]);
        assert_eq!(
            path("$.foo.bar[3]"),
            vec![Member("foo".into()), Member("bar".into()), Index(3)]
        );
        assert_eq!(
            path("$.*[*]"),
            vec![MemberAsterisk, IndexAsterisk]
        );
    }

    #[test]
    fn quoted_members() {
        assert_eq!(
            path(r#"$."with space".x"#),
            vec![Member("with space".into()), Member("x".into())]
        );
        assert!(rooted(r#"$."foo"bar"#).is_err());
    }

    #[test]
    fn double_asterisk() {
        assert_eq!(
            path("$**.foo"),
            vec![DoubleAsterisk, Member("foo".into())]
        );
        assert_eq!(
            path("$.a**[0]"),
            vec![Member("a".into()), DoubleAsterisk, Index(0)]
        );
        assert!(rooted("$.a**").is_err());
        assert!(rooted("$****.a").is_err());
    }

    #[test]
    fn lax_wildcards_after_double_asterisk() {
        assert_eq!(path("$**.*"), vec![DoubleAsterisk, MemberAsterisk]);
        assert_eq!(path("$**[*]"), vec![DoubleAsterisk, IndexAsterisk]);
    }

    #[test]
    fn consecutive_dots() {
        let err = rooted("$.foo..bar").unwrap_err();
        assert_eq!(err.position, 6);
    }

    #[test]
    fn bad_indexes() {
        assert!(rooted("$[a]").is_err());
        assert!(rooted("$[1").is_err());
        assert!(rooted("$[99999999999]").is_err());
    }
}
