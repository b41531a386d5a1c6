//! Parameterised statement builders.
//!
//! Conditions are written with `?` placeholders and renumbered to `$n` in the
//! order they are added, so builders can be composed without tracking a
//! `param_idx` by hand. Values are always bound, never formatted into the
//! statement text.

use super::param::SqlParam;

/// A statement ready for execution.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub text: String,
    pub params: Vec<SqlParam>,
}

impl Statement {
    /// Wrap hand-written text that already uses `$n` placeholders.
    pub fn new(text: impl Into<String>, params: Vec<SqlParam>) -> Self {
        Self {
            text: text.into(),
            params,
        }
    }
}

/// Row-lock strength appended to a SELECT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    ForUpdate,
    ForShare,
}

impl LockMode {
    fn as_sql(&self) -> &'static str {
        match self {
            LockMode::ForUpdate => "FOR UPDATE",
            LockMode::ForShare => "FOR SHARE",
        }
    }
}

/// Quote an identifier, splitting on `.` so `t.uid` becomes `"t"."uid"`.
/// `*` is passed through unquoted.
pub fn quote_ident(name: &str) -> String {
    name.split('.')
        .map(|part| {
            if part == "*" {
                part.to_string()
            } else {
                format!("\"{}\"", part.replace('"', "\"\""))
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Replace every `?` in `fragment` with `$n`, starting at `*next` and
/// advancing it.
fn renumber(fragment: &str, next: &mut usize) -> String {
    let mut out = String::with_capacity(fragment.len() + 4);
    for ch in fragment.chars() {
        if ch == '?' {
            out.push('$');
            out.push_str(&next.to_string());
            *next += 1;
        } else {
            out.push(ch);
        }
    }
    out
}

#[derive(Debug, Clone)]
struct RowLock {
    mode: LockMode,
    of: Option<String>,
    skip_locked: bool,
}

impl RowLock {
    fn render(&self, text: &mut String) {
        text.push(' ');
        text.push_str(self.mode.as_sql());
        if let Some(of) = &self.of {
            text.push_str(" OF ");
            text.push_str(&quote_ident(of));
        }
        if self.skip_locked {
            text.push_str(" SKIP LOCKED");
        }
    }
}

/// Conditions joined with AND.
#[derive(Debug, Clone, Default)]
struct Conditions {
    clauses: Vec<String>,
    params: Vec<SqlParam>,
}

impl Conditions {
    fn push(&mut self, clause: &str, params: Vec<SqlParam>) {
        self.clauses.push(clause.to_string());
        self.params.extend(params);
    }

    fn render(&self, text: &mut String, next: &mut usize) {
        if self.clauses.is_empty() {
            return;
        }
        let rendered: Vec<String> = self
            .clauses
            .iter()
            .map(|c| format!("({})", renumber(c, next)))
            .collect();
        text.push_str(" WHERE ");
        text.push_str(&rendered.join(" AND "));
    }
}

fn render_returning(text: &mut String, returning: &[String]) {
    if returning.is_empty() {
        return;
    }
    let cols: Vec<String> = returning.iter().map(|c| quote_ident(c)).collect();
    text.push_str(" RETURNING ");
    text.push_str(&cols.join(", "));
}

// ============================================================================
// SELECT
// ============================================================================

/// SELECT builder.
#[derive(Debug, Clone)]
pub struct Select {
    table: String,
    alias: Option<String>,
    columns: Vec<String>,
    column_params: Vec<SqlParam>,
    conditions: Conditions,
    order_by: Vec<String>,
    limit: Option<i64>,
    offset: Option<i64>,
    lock: Option<RowLock>,
}

impl Select {
    pub fn from(table: &str) -> Self {
        Self {
            table: table.to_string(),
            alias: None,
            columns: Vec::new(),
            column_params: Vec::new(),
            conditions: Conditions::default(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            lock: None,
        }
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_string());
        self
    }

    /// Select quoted columns. Without any, the statement selects `*`.
    pub fn columns<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.columns
            .extend(columns.iter().map(|c| quote_ident(c.as_ref())));
        self
    }

    /// Select a raw expression, e.g. `COUNT(*) AS count`.
    pub fn expr(mut self, expression: &str) -> Self {
        self.columns.push(expression.to_string());
        self
    }

    /// Select an expression with `?` placeholders, e.g. `?::bigint`.
    /// Its params bind ahead of every condition.
    pub fn expr_with(mut self, expression: &str, params: Vec<SqlParam>) -> Self {
        self.columns.push(expression.to_string());
        self.column_params.extend(params);
        self
    }

    /// Add a condition with `?` placeholders bound to `params` in order.
    pub fn filter(mut self, clause: &str, params: Vec<SqlParam>) -> Self {
        self.conditions.push(clause, params);
        self
    }

    pub fn order_by(mut self, expression: &str) -> Self {
        self.order_by.push(expression.to_string());
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Append a row lock, limited to the rows of `of` when given;
    /// `skip_locked` adds `SKIP LOCKED`.
    pub fn lock(mut self, mode: LockMode, of: Option<&str>, skip_locked: bool) -> Self {
        self.lock = Some(RowLock {
            mode,
            of: of.map(str::to_string),
            skip_locked,
        });
        self
    }

    pub fn build(self) -> Statement {
        let mut next = 1;
        let mut text = String::from("SELECT ");
        if self.columns.is_empty() {
            text.push('*');
        } else {
            let columns: Vec<String> = self
                .columns
                .iter()
                .map(|c| renumber(c, &mut next))
                .collect();
            text.push_str(&columns.join(", "));
        }
        text.push_str(" FROM ");
        text.push_str(&quote_ident(&self.table));
        if let Some(alias) = &self.alias {
            text.push(' ');
            text.push_str(&quote_ident(alias));
        }
        self.conditions.render(&mut text, &mut next);
        if !self.order_by.is_empty() {
            text.push_str(" ORDER BY ");
            text.push_str(&self.order_by.join(", "));
        }

        let mut params = self.column_params;
        params.extend(self.conditions.params);
        if let Some(limit) = self.limit {
            text.push_str(&format!(" LIMIT ${}", next));
            next += 1;
            params.push(SqlParam::Long(limit));
        }
        if let Some(offset) = self.offset {
            text.push_str(&format!(" OFFSET ${}", next));
            params.push(SqlParam::Long(offset));
        }
        if let Some(lock) = &self.lock {
            lock.render(&mut text);
        }
        Statement { text, params }
    }
}

// ============================================================================
// INSERT
// ============================================================================

/// INSERT builder: a single row of values, or the rows of a SELECT.
#[derive(Debug, Clone)]
pub struct Insert {
    table: String,
    columns: Vec<String>,
    params: Vec<SqlParam>,
    source: Option<Select>,
    returning: Vec<String>,
}

impl Insert {
    pub fn into(table: &str) -> Self {
        Self {
            table: table.to_string(),
            columns: Vec::new(),
            params: Vec::new(),
            source: None,
            returning: Vec::new(),
        }
    }

    /// Insert whatever `source` selects into `columns`, replacing any values.
    pub fn from_select<S: AsRef<str>>(mut self, columns: &[S], source: Select) -> Self {
        self.columns = columns.iter().map(|c| c.as_ref().to_string()).collect();
        self.params.clear();
        self.source = Some(source);
        self
    }

    pub fn value(mut self, column: &str, value: impl Into<SqlParam>) -> Self {
        self.columns.push(column.to_string());
        self.params.push(value.into());
        self
    }

    pub fn returning<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.returning
            .extend(columns.iter().map(|c| c.as_ref().to_string()));
        self
    }

    pub fn build(self) -> Statement {
        let cols: Vec<String> = self.columns.iter().map(|c| quote_ident(c)).collect();
        if let Some(source) = self.source {
            let select = source.build();
            let mut text = format!(
                "INSERT INTO {} ({}) {}",
                quote_ident(&self.table),
                cols.join(", "),
                select.text
            );
            render_returning(&mut text, &self.returning);
            return Statement {
                text,
                params: select.params,
            };
        }

        let placeholders: Vec<String> = (1..=self.params.len()).map(|i| format!("${}", i)).collect();
        let mut text = if cols.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", quote_ident(&self.table))
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_ident(&self.table),
                cols.join(", "),
                placeholders.join(", ")
            )
        };
        render_returning(&mut text, &self.returning);
        Statement {
            text,
            params: self.params,
        }
    }
}

// ============================================================================
// UPDATE
// ============================================================================

/// UPDATE builder.
#[derive(Debug, Clone)]
pub struct Update {
    table: String,
    assignments: Vec<String>,
    params: Vec<SqlParam>,
    conditions: Conditions,
    returning: Vec<String>,
}

impl Update {
    pub fn table(table: &str) -> Self {
        Self {
            table: table.to_string(),
            assignments: Vec::new(),
            params: Vec::new(),
            conditions: Conditions::default(),
            returning: Vec::new(),
        }
    }

    pub fn set(mut self, column: &str, value: impl Into<SqlParam>) -> Self {
        self.assignments.push(format!("{} = ?", quote_ident(column)));
        self.params.push(value.into());
        self
    }

    /// Raw assignment with `?` placeholders, e.g. `active = (uid = ?)`.
    pub fn set_expr(mut self, assignment: &str, params: Vec<SqlParam>) -> Self {
        self.assignments.push(assignment.to_string());
        self.params.extend(params);
        self
    }

    pub fn filter(mut self, clause: &str, params: Vec<SqlParam>) -> Self {
        self.conditions.push(clause, params);
        self
    }

    pub fn returning<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.returning
            .extend(columns.iter().map(|c| c.as_ref().to_string()));
        self
    }

    pub fn build(self) -> Statement {
        let mut next = 1;
        let assignments: Vec<String> = self
            .assignments
            .iter()
            .map(|a| renumber(a, &mut next))
            .collect();
        let mut text = format!(
            "UPDATE {} SET {}",
            quote_ident(&self.table),
            assignments.join(", ")
        );
        self.conditions.render(&mut text, &mut next);
        render_returning(&mut text, &self.returning);

        let mut params = self.params;
        params.extend(self.conditions.params);
        Statement { text, params }
    }
}

// ============================================================================
// DELETE
// ============================================================================

/// DELETE builder.
#[derive(Debug, Clone)]
pub struct Delete {
    table: String,
    conditions: Conditions,
    returning: Vec<String>,
}

impl Delete {
    pub fn from(table: &str) -> Self {
        Self {
            table: table.to_string(),
            conditions: Conditions::default(),
            returning: Vec::new(),
        }
    }

    pub fn filter(mut self, clause: &str, params: Vec<SqlParam>) -> Self {
        self.conditions.push(clause, params);
        self
    }

    pub fn returning<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.returning
            .extend(columns.iter().map(|c| c.as_ref().to_string()));
        self
    }

    pub fn build(self) -> Statement {
        let mut next = 1;
        let mut text = format!("DELETE FROM {}", quote_ident(&self.table));
        self.conditions.render(&mut text, &mut next);
        render_returning(&mut text, &self.returning);
        Statement {
            text,
            params: self.conditions.params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("uid"), "\"uid\"");
        assert_eq!(quote_ident("p.uid"), "\"p\".\"uid\"");
        assert_eq!(quote_ident("p.*"), "\"p\".*");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_select_renumbers_placeholders() {
        let stmt = Select::from("projects")
            .filter("uid = ?", vec![SqlParam::Long(4)])
            .filter("hackathon = ? OR hackathon = ?", vec!["a".into(), "b".into()])
            .order_by("uid")
            .limit(10)
            .offset(20)
            .build();

        assert_eq!(
            stmt.text,
            "SELECT * FROM \"projects\" WHERE (uid = $1) AND (hackathon = $2 OR hackathon = $3) \
             ORDER BY uid LIMIT $4 OFFSET $5"
        );
        assert_eq!(stmt.params.len(), 5);
        assert_eq!(stmt.params[3], SqlParam::Long(10));
    }

    #[test]
    fn test_select_lock_suffix() {
        let stmt = Select::from("tables")
            .columns(&["table_number"])
            .limit(1)
            .lock(LockMode::ForUpdate, None, true)
            .build();
        assert_eq!(
            stmt.text,
            "SELECT \"table_number\" FROM \"tables\" LIMIT $1 FOR UPDATE SKIP LOCKED"
        );

        let shared = Select::from("tables")
            .alias("t")
            .lock(LockMode::ForShare, Some("t"), false)
            .build();
        assert_eq!(shared.text, "SELECT * FROM \"tables\" \"t\" FOR SHARE OF \"t\"");
    }

    #[test]
    fn test_insert_from_locked_select() {
        let source = Select::from("tables")
            .alias("t")
            .columns(&["t.table_number"])
            .expr_with("?::bigint", vec![SqlParam::Long(7)])
            .filter("\"t\".\"priority\" < ?", vec![SqlParam::Int(3)])
            .limit(1)
            .lock(LockMode::ForUpdate, Some("t"), true);
        let stmt = Insert::into("table_assignments")
            .value("ignored", 1i32)
            .from_select(&["table_number", "project_id"], source)
            .returning(&["table_number"])
            .build();

        assert_eq!(
            stmt.text,
            "INSERT INTO \"table_assignments\" (\"table_number\", \"project_id\") \
             SELECT \"t\".\"table_number\", $1::bigint FROM \"tables\" \"t\" \
             WHERE (\"t\".\"priority\" < $2) LIMIT $3 FOR UPDATE OF \"t\" SKIP LOCKED \
             RETURNING \"table_number\""
        );
        assert_eq!(
            stmt.params,
            vec![SqlParam::Long(7), SqlParam::Int(3), SqlParam::Long(1)]
        );
    }

    #[test]
    fn test_insert_returning() {
        let stmt = Insert::into("categories")
            .value("category_name", "Best Hardware Hack")
            .value("is_sponsor", false)
            .returning(&["*"])
            .build();
        assert_eq!(
            stmt.text,
            "INSERT INTO \"categories\" (\"category_name\", \"is_sponsor\") VALUES ($1, $2) RETURNING *"
        );
        assert_eq!(stmt.params.len(), 2);
    }

    #[test]
    fn test_update_numbers_set_before_where() {
        let stmt = Update::table("categories")
            .set("category_name", "Renamed")
            .filter("uid = ?", vec![SqlParam::Int(9)])
            .returning(&["*"])
            .build();
        assert_eq!(
            stmt.text,
            "UPDATE \"categories\" SET \"category_name\" = $1 WHERE (uid = $2) RETURNING *"
        );
        assert_eq!(stmt.params, vec![SqlParam::from("Renamed"), SqlParam::Int(9)]);
    }

    #[test]
    fn test_delete_without_conditions() {
        let stmt = Delete::from("categories").returning(&["uid"]).build();
        assert_eq!(stmt.text, "DELETE FROM \"categories\" RETURNING \"uid\"");
        assert!(stmt.params.is_empty());
    }
}
