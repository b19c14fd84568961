use polystore_domain::{Result, StoreError, Value};

/// A SQL `WHERE` clause with `?` placeholders and the values bound to them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlFilter {
    clause: String,
    binds: Vec<Value>,
}

impl SqlFilter {
    pub fn new(clause: impl Into<String>, binds: Vec<Value>) -> Self {
        Self {
            clause: clause.into(),
            binds,
        }
    }

    /// Matches every row
    pub fn all() -> Self {
        Self::new("1 = 1", Vec::new())
    }

    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Self::new(format!("{} = ?", quote_ident(column)), vec![value.into()])
    }

    /// `column LIKE %needle%` with `%` and `_` in the needle taken literally.
    ///
    /// Case folding follows the database: SQLite and MySQL's default
    /// collations both ignore ASCII case here.
    pub fn contains(column: &str, needle: &str) -> Self {
        Self::new(
            format!("{} LIKE ? ESCAPE '{}'", quote_ident(column), LIKE_ESCAPE),
            vec![Value::Str(format!("%{}%", escape_like(needle)))],
        )
    }

    pub fn and(self, other: SqlFilter) -> Self {
        let mut binds = self.binds;
        binds.extend(other.binds);
        Self::new(format!("({}) AND ({})", self.clause, other.clause), binds)
    }

    pub fn clause(&self) -> &str {
        &self.clause
    }

    pub fn binds(&self) -> &[Value] {
        &self.binds
    }

    /// Placeholder count must match the bound values
    pub fn check(&self) -> Result<()> {
        let placeholders = self.clause.matches('?').count();
        if placeholders != self.binds.len() {
            return Err(StoreError::read(format!(
                "filter `{}` has {} placeholders but {} values",
                self.clause,
                placeholders,
                self.binds.len()
            )));
        }
        if self.clause.trim().is_empty() {
            return Err(StoreError::read("empty filter clause"));
        }
        Ok(())
    }
}

/// Single character escape understood by MySQL and SQLite without
/// string-literal escaping of its own
const LIKE_ESCAPE: char = '!';

fn escape_like(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len());
    for c in needle.chars() {
        if c == LIKE_ESCAPE || c == '%' || c == '_' {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}

/// Backtick quoting, understood by MySQL and SQLite alike
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}
