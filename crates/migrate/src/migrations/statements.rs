//! Statement splitting for migration scripts
//!
//! Scripts are split on every `;`. There is no awareness of string literals,
//! comments, or procedure bodies, so a `;` inside any of those splits the
//! statement. Whatever follows the final `;` is dropped.

/// Split a script into executable statements, each terminated with `;`
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut fragments: Vec<&str> = sql.split(';').collect();
    // the piece after the last terminator never runs
    fragments.pop();

    fragments
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("{};", s))
        .collect()
}

/// Non-blank content after the final `;`, if any
pub fn unterminated_tail(sql: &str) -> Option<&str> {
    let tail = match sql.rfind(';') {
        Some(pos) => &sql[pos + 1..],
        None => sql,
    };
    let tail = tail.trim();
    (!tail.is_empty()).then_some(tail)
}
