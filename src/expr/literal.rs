//! Literal productions: numbers, quoted strings, keywords and cast types.
use super::{Scalar, SyntaxError, scanner::Scanner};

/// Largest integer a double represents exactly (2^53 - 1).
pub const MAX_SAFE_INTEGER: u64 = 9_007_199_254_740_991;

pub(crate) fn starts_number(sc: &Scanner) -> bool {
    match sc.peek() {
        Some(c) if c.is_ascii_digit() => true,
        Some('.') => sc.peek_nth(1).is_some_and(|c| c.is_ascii_digit()),
        _ => false,
    }
}

/// Reads an unsigned numeric literal; `negative` folds a preceding minus sign in.
///
/// Integers inside the safe range become native integers. Anything that would lose
/// precision through a double is kept as an [`Scalar::ExactString`].
pub(crate) fn number(sc: &mut Scanner, negative: bool) -> Result<Scalar, SyntaxError> {
    let start = sc.pos();
    let mut integral = true;

    while sc.peek().is_some_and(|c| c.is_ascii_digit()) {
        sc.bump();
    }
    let int_end = sc.pos();
    if sc.peek() == Some('.') && sc.peek_nth(1).is_none_or(|c| c.is_ascii_digit() || !c.is_alphabetic()) {
        integral = false;
        sc.bump();
        while sc.peek().is_some_and(|c| c.is_ascii_digit()) {
            sc.bump();
        }
    }
    if matches!(sc.peek(), Some('e' | 'E')) {
        let mark = sc.pos();
        sc.bump();
        if matches!(sc.peek(), Some('+' | '-')) {
            sc.bump();
        }
        if sc.peek().is_some_and(|c| c.is_ascii_digit()) {
            integral = false;
            while sc.peek().is_some_and(|c| c.is_ascii_digit()) {
                sc.bump();
            }
        } else {
            sc.reset(mark);
        }
    }

    let text = sc.slice(start, sc.pos());
    let signed_text = || {
        if negative {
            format!("-{text}")
        } else {
            text.to_string()
        }
    };

    let int_part = sc.slice(start, int_end).trim_start_matches('0');
    let safe_int_part = int_part.len() < 16
        || int_part
            .parse::<u64>()
            .is_ok_and(|v| v <= MAX_SAFE_INTEGER);

    if integral {
        return Ok(match text.parse::<u64>() {
            Ok(v) if v <= MAX_SAFE_INTEGER => {
                if negative {
                    Scalar::SignedInt(-(v as i64))
                } else {
                    Scalar::UnsignedInt(v)
                }
            }
            _ => Scalar::ExactString(signed_text()),
        });
    }

    let value: f64 = text
        .parse()
        .map_err(|_| sc.error_at(start, "malformed number"))?;
    if !safe_int_part || !value.is_finite() {
        return Ok(Scalar::ExactString(signed_text()));
    }
    Ok(Scalar::Double(if negative { -value } else { value }))
}

/// Reads a `'...'` or `"..."` string.
///
/// The delimiter doubled, or preceded by a backslash, stands for itself. Any other
/// backslash sequence is kept verbatim.
pub(crate) fn quoted(sc: &mut Scanner) -> Result<String, SyntaxError> {
    let start = sc.pos();
    let delim = match sc.bump() {
        Some(c @ ('"' | '\'' | '`')) => c,
        _ => return Err(sc.error_at(start, "expected quoted string")),
    };
    let mut out = String::new();
    loop {
        match sc.bump() {
            None => return Err(sc.error_at(start, "unterminated string")),
            Some('\\') => match sc.bump() {
                Some(c) if c == delim => out.push(delim),
                Some(c) => {
                    out.push('\\');
                    out.push(c);
                }
                None => return Err(sc.error_at(start, "unterminated string")),
            },
            Some(c) if c == delim => {
                if sc.eat(delim) {
                    out.push(delim);
                } else {
                    return Ok(out);
                }
            }
            Some(c) => out.push(c),
        }
    }
}

/// `TRUE`, `FALSE` or `NULL`.
pub(crate) fn keyword_literal(sc: &mut Scanner) -> Option<Scalar> {
    if sc.eat_keyword("null") {
        Some(Scalar::Null)
    } else if sc.eat_keyword("true") {
        Some(Scalar::Bool(true))
    } else if sc.eat_keyword("false") {
        Some(Scalar::Bool(false))
    } else {
        None
    }
}

/// Any literal, with an optional leading sign on numbers.
pub(crate) fn literal(sc: &mut Scanner) -> Result<Scalar, SyntaxError> {
    sc.skip_ws();
    if let Some(s) = keyword_literal(sc) {
        return Ok(s);
    }
    match sc.peek() {
        Some('"' | '\'') => quoted(sc).map(Scalar::Str),
        Some(c @ ('-' | '+')) => {
            sc.bump();
            sc.skip_ws();
            if !starts_number(sc) {
                return Err(sc.error("expected number after sign"));
            }
            number(sc, c == '-')
        }
        _ if starts_number(sc) => number(sc, false),
        _ => Err(sc.error("expected literal")),
    }
}

/// Target type of `CAST(expr AS type)`, normalised to upper case with single spaces.
pub(crate) fn cast_type(sc: &mut Scanner) -> Result<String, SyntaxError> {
    sc.skip_ws();
    let start = sc.pos();
    let word = sc
        .peek_word()
        .ok_or_else(|| sc.error("expected cast type"))?
        .to_ascii_uppercase();

    match word.as_str() {
        "SIGNED" | "UNSIGNED" => {
            sc.eat_keyword(&word);
            if sc.peek_keyword_ws("integer") {
                sc.skip_ws();
                sc.eat_keyword("integer");
                Ok(format!("{word} INTEGER"))
            } else {
                Ok(word)
            }
        }
        "CHAR" | "BINARY" => {
            sc.eat_keyword(&word);
            match type_params(sc, 1)? {
                Some(params) => Ok(format!("{word}({params})")),
                None => Ok(word),
            }
        }
        "DECIMAL" => {
            sc.eat_keyword(&word);
            match type_params(sc, 2)? {
                Some(params) => Ok(format!("{word}({params})")),
                None => Ok(word),
            }
        }
        "TIME" | "DATETIME" | "DATE" | "JSON" => {
            sc.eat_keyword(&word);
            Ok(word)
        }
        _ => Err(sc.error_at(start, "unknown cast type")),
    }
}

/// Parses `( n [, m] )` with at most `max` integers; whitespace is dropped.
fn type_params(sc: &mut Scanner, max: usize) -> Result<Option<String>, SyntaxError> {
    let mark = sc.pos();
    sc.skip_ws();
    if !sc.eat('(') {
        sc.reset(mark);
        return Ok(None);
    }
    let mut params = Vec::new();
    loop {
        sc.skip_ws();
        let start = sc.pos();
        while sc.peek().is_some_and(|c| c.is_ascii_digit()) {
            sc.bump();
        }
        if start == sc.pos() {
            return Err(sc.error("expected integer type parameter"));
        }
        params.push(sc.slice(start, sc.pos()));
        sc.skip_ws();
        if sc.eat(')') {
            break;
        }
        if params.len() == max {
            return Err(sc.error("expected ')'"));
        }
        if !sc.eat(',') {
            return Err(sc.error("expected ',' or ')'"));
        }
    }
    Ok(Some(params.join(",")))
}

pub(crate) const INTERVAL_UNITS: &[&str] = &[
    "MICROSECOND",
    "SECOND",
    "MINUTE",
    "HOUR",
    "DAY",
    "WEEK",
    "MONTH",
    "QUARTER",
    "YEAR",
    "SECOND_MICROSECOND",
    "MINUTE_MICROSECOND",
    "MINUTE_SECOND",
    "HOUR_MICROSECOND",
    "HOUR_SECOND",
    "HOUR_MINUTE",
    "DAY_MICROSECOND",
    "DAY_SECOND",
    "DAY_MINUTE",
    "DAY_HOUR",
    "YEAR_MONTH",
];

pub(crate) fn interval_unit(sc: &mut Scanner) -> Result<String, SyntaxError> {
    sc.skip_ws();
    let word = sc
        .peek_word()
        .ok_or_else(|| sc.error("expected interval unit"))?;
    let unit = word.to_ascii_uppercase();
    if !INTERVAL_UNITS.contains(&unit.as_str()) {
        return Err(sc.error("unknown interval unit"));
    }
    sc.eat_keyword(&unit);
    Ok(unit)
}
