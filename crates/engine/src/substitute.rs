use schema::Value;

use crate::AdapterError;

/// Replace each positional `?` placeholder with a safely quoted literal.
///
/// This is the last-mile pass for engines whose HTTP surface takes no bound
/// parameters. Placeholders inside single-quoted string literals (as occur
/// in inlined subquery text) are left untouched.
pub fn substitute(sql: &str, parameters: &[Value]) -> Result<String, AdapterError> {
    let mut out = String::with_capacity(sql.len() + parameters.len() * 8);
    let mut next = 0usize;
    let mut in_string = false;
    let mut chars = sql.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '\'' => {
                in_string = !in_string;
                out.push(ch);
            }
            '\\' if in_string => {
                out.push(ch);
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            '?' if !in_string => {
                let value = parameters.get(next).ok_or(AdapterError::PlaceholderMismatch {
                    placeholders: count_placeholders(sql),
                    parameters: parameters.len(),
                })?;
                out.push_str(&value.to_sql_literal());
                next += 1;
            }
            _ => out.push(ch),
        }
    }

    if next != parameters.len() {
        return Err(AdapterError::PlaceholderMismatch {
            placeholders: next,
            parameters: parameters.len(),
        });
    }
    Ok(out)
}

fn count_placeholders(sql: &str) -> usize {
    let mut count = 0;
    let mut in_string = false;
    let mut chars = sql.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\'' => in_string = !in_string,
            '\\' if in_string => {
                chars.next();
            }
            '?' if !in_string => count += 1,
            _ => (),
        }
    }
    count
}

#[cfg(test)]
mod test {
    use super::substitute;
    use schema::Value;

    #[test]
    fn literals_substitute_in_order() {
        let sql = "SELECT * FROM t WHERE a = ? AND b = ? AND c = ?";
        let out = substitute(
            sql,
            &[Value::Int(1), Value::from("x'y"), Value::Bool(true)],
        )
        .unwrap();
        assert_eq!(out, r"SELECT * FROM t WHERE a = 1 AND b = 'x\'y' AND c = 1");
    }

    #[test]
    fn placeholders_inside_strings_are_preserved() {
        let sql = "SELECT * FROM t WHERE q = 'what?' AND a = ?";
        let out = substitute(sql, &[Value::Int(9)]).unwrap();
        assert_eq!(out, "SELECT * FROM t WHERE q = 'what?' AND a = 9");
    }

    #[test]
    fn count_mismatches_are_errors() {
        assert!(substitute("SELECT ?", &[]).is_err());
        assert!(substitute("SELECT 1", &[Value::Int(1)]).is_err());
    }
}
