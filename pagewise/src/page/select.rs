//! PostgreSQL row sources for the pagination engine
//!
//! [`Select`] describes a filtered, ordered select over one table (or a
//! trusted `FROM` expression) and renders it through `sqlx::QueryBuilder`,
//! binding every filter operand. [`PgFind`] maps rows with `FromRow`,
//! [`PgScan`] hands back raw `PgRow`s.
//!
//! Identifiers are validated and double-quoted, so they are matched
//! case-sensitively.

use std::marker::PhantomData;
use std::sync::LazyLock;

use regex::Regex;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgConnection, Postgres, QueryBuilder};

use super::{
    FetchPlan, FilterCondition, FilterOperator, FilterValue, OrderDirection, PageError,
    PageSource, Strategy, Window,
};

/// Alias of the key-only sub-query in join-assisted fetches
pub const OFFSET_TABLE: &str = "offset_t";
/// Column alias of the paged key inside [`OFFSET_TABLE`]
pub const OFFSET_KEY: &str = "offset_key";

static IDENT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex is valid")
});

/// Validates and double-quotes a possibly qualified identifier (`t.col`).
///
/// # Example
///
/// ```rust
/// use pagewise::page::quote_ident;
///
/// assert_eq!(quote_ident("uc_users.id").unwrap(), r#""uc_users"."id""#);
/// assert!(quote_ident("id; DROP TABLE uc_users").is_err());
/// ```
pub fn quote_ident(name: &str) -> Result<String, PageError> {
    quote(name, false)
}

fn quote_column(name: &str) -> Result<String, PageError> {
    quote(name, true)
}

fn quote(name: &str, allow_star: bool) -> Result<String, PageError> {
    let parts: Vec<&str> = name.split('.').collect();
    let last = parts.len() - 1;
    let mut out = String::with_capacity(name.len() + 2 * parts.len());
    for (i, part) in parts.into_iter().enumerate() {
        if i > 0 {
            out.push('.');
        }
        if allow_star && i == last && part == "*" {
            out.push('*');
        } else if IDENT_REGEX.is_match(part) {
            out.push('"');
            out.push_str(part);
            out.push('"');
        } else {
            return Err(PageError::InvalidIdentifier(name.to_string()));
        }
    }
    Ok(out)
}

/// What a [`Select`] reads from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectFrom {
    /// A single table; required for join-assisted fetches
    Table(String),
    /// A trusted SQL fragment such as a join, rendered verbatim
    Expr(String),
}

/// A filtered, ordered select over one source
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    from: SelectFrom,
    columns: Vec<String>,
    filters: Vec<FilterCondition>,
    order_by: Vec<(String, OrderDirection)>,
}

impl Select {
    pub fn table(name: impl Into<String>) -> Self {
        Self::with_from(SelectFrom::Table(name.into()))
    }

    /// Selects from a raw `FROM` fragment. Never build it from user input.
    pub fn from_expr(expr: impl Into<String>) -> Self {
        Self::with_from(SelectFrom::Expr(expr.into()))
    }

    fn with_from(from: SelectFrom) -> Self {
        Self {
            from,
            columns: Vec::new(),
            filters: Vec::new(),
            order_by: Vec::new(),
        }
    }

    /// Restricts the selected columns; all columns by default
    #[must_use]
    pub fn columns<I, C>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn filter(mut self, condition: FilterCondition) -> Self {
        self.filters.push(condition);
        self
    }

    #[must_use]
    pub fn filters(mut self, conditions: impl IntoIterator<Item = FilterCondition>) -> Self {
        self.filters.extend(conditions);
        self
    }

    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, direction: OrderDirection) -> Self {
        self.order_by.push((field.into(), direction));
        self
    }

    pub fn has_order(&self) -> bool {
        !self.order_by.is_empty()
    }

    pub fn source(&self) -> &SelectFrom {
        &self.from
    }

    /// `SELECT COUNT(*)` over the filtered source
    pub fn count_query(&self) -> Result<QueryBuilder<'static, Postgres>, PageError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM ");
        self.push_from(&mut qb)?;
        self.push_where(&mut qb)?;
        Ok(qb)
    }

    /// Row select for a fetch plan
    pub fn rows_query(&self, plan: &FetchPlan) -> Result<QueryBuilder<'static, Postgres>, PageError> {
        let order = plan.default_order.as_deref();
        match &plan.strategy {
            Strategy::All => self.plain_query(order, None),
            Strategy::Direct(window) => self.plain_query(order, Some(*window)),
            Strategy::KeyJoin { key, window } => self.key_join_query(key, order, *window),
        }
    }

    fn plain_query(
        &self,
        default_order: Option<&str>,
        window: Option<Window>,
    ) -> Result<QueryBuilder<'static, Postgres>, PageError> {
        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(self.column_list(None)?);
        qb.push(" FROM ");
        self.push_from(&mut qb)?;
        self.push_where(&mut qb)?;
        self.push_order(&mut qb, default_order)?;
        if let Some(window) = window {
            push_window(&mut qb, window);
        }
        Ok(qb)
    }

    fn key_join_query(
        &self,
        key: &str,
        default_order: Option<&str>,
        window: Window,
    ) -> Result<QueryBuilder<'static, Postgres>, PageError> {
        let table = match &self.from {
            SelectFrom::Table(table) => quote_ident(table)?,
            SelectFrom::Expr(_) => return Err(PageError::ParseModel),
        };
        let key_column = if key.contains('.') {
            quote_ident(key)?
        } else {
            format!("{table}.{}", quote_ident(key)?)
        };
        let offset_table = quote_ident(OFFSET_TABLE)?;
        let offset_key = quote_ident(OFFSET_KEY)?;

        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(self.column_list(Some(&table))?);
        qb.push(format!(" FROM {table} JOIN (SELECT {key_column} AS {offset_key} FROM {table}"));
        self.push_where(&mut qb)?;
        self.push_order(&mut qb, default_order)?;
        push_window(&mut qb, window);
        qb.push(format!(
            ") AS {offset_table} ON {key_column} = {offset_table}.{offset_key}"
        ));
        self.push_where(&mut qb)?;
        self.push_order(&mut qb, default_order)?;
        Ok(qb)
    }

    fn column_list(&self, table: Option<&str>) -> Result<String, PageError> {
        if self.columns.is_empty() {
            return Ok(match table {
                Some(table) => format!("{table}.*"),
                None => "*".to_string(),
            });
        }
        let quoted = self
            .columns
            .iter()
            .map(|column| quote_column(column))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(quoted.join(", "))
    }

    fn push_from(&self, qb: &mut QueryBuilder<'static, Postgres>) -> Result<(), PageError> {
        match &self.from {
            SelectFrom::Table(table) => qb.push(quote_ident(table)?),
            SelectFrom::Expr(expr) => qb.push(expr),
        };
        Ok(())
    }

    fn push_where(&self, qb: &mut QueryBuilder<'static, Postgres>) -> Result<(), PageError> {
        for (i, condition) in self.filters.iter().enumerate() {
            qb.push(if i == 0 { " WHERE " } else { " AND " });
            push_condition(qb, condition)?;
        }
        Ok(())
    }

    fn push_order(
        &self,
        qb: &mut QueryBuilder<'static, Postgres>,
        default_order: Option<&str>,
    ) -> Result<(), PageError> {
        let terms = if self.order_by.is_empty() {
            match default_order {
                Some(field) => vec![format!("{} {}", quote_ident(field)?, OrderDirection::Ascending)],
                None => return Ok(()),
            }
        } else {
            self.order_by
                .iter()
                .map(|(field, direction)| Ok(format!("{} {direction}", quote_ident(field)?)))
                .collect::<Result<Vec<_>, PageError>>()?
        };
        qb.push(" ORDER BY ");
        qb.push(terms.join(", "));
        Ok(())
    }
}

fn push_window(qb: &mut QueryBuilder<'static, Postgres>, window: Window) {
    qb.push(" LIMIT ");
    qb.push_bind(i64::try_from(window.limit).unwrap_or(i64::MAX));
    qb.push(" OFFSET ");
    qb.push_bind(i64::try_from(window.offset).unwrap_or(i64::MAX));
}

fn push_condition(
    qb: &mut QueryBuilder<'static, Postgres>,
    condition: &FilterCondition,
) -> Result<(), PageError> {
    let field = quote_ident(&condition.field)?;
    let invalid = |reason: &str| PageError::InvalidFilter {
        field: condition.field.clone(),
        reason: reason.to_string(),
    };

    match (condition.operator, &condition.value) {
        (FilterOperator::IsNull | FilterOperator::IsNotNull, _) => {
            qb.push(format!("{field} {}", condition.operator));
        }
        (FilterOperator::In, FilterValue::StringList(values)) => {
            qb.push(format!("{field} = ANY("));
            qb.push_bind(values.clone());
            qb.push(")");
        }
        (FilterOperator::In, FilterValue::IntegerList(values)) => {
            qb.push(format!("{field} = ANY("));
            qb.push_bind(values.clone());
            qb.push(")");
        }
        (FilterOperator::In, _) => return Err(invalid("IN requires a list operand")),
        (_, FilterValue::StringList(_) | FilterValue::IntegerList(_)) => {
            return Err(invalid("list operands are only valid with IN"))
        }
        (_, FilterValue::Null) => {
            return Err(invalid("NULL operands are only valid with IS NULL / IS NOT NULL"))
        }
        (operator, value) => {
            qb.push(format!("{field} {operator} "));
            match value {
                FilterValue::String(s) => qb.push_bind(s.clone()),
                FilterValue::Integer(n) => qb.push_bind(*n),
                FilterValue::Float(x) => qb.push_bind(*x),
                FilterValue::Boolean(b) => qb.push_bind(*b),
                FilterValue::StringList(_) | FilterValue::IntegerList(_) | FilterValue::Null => {
                    return Err(invalid("unsupported operand"))
                }
            };
        }
    }
    Ok(())
}

/// Typed row source: rows are decoded with `FromRow`
pub struct PgFind<'c, T> {
    conn: &'c mut PgConnection,
    select: Select,
    row: PhantomData<fn() -> T>,
}

impl<'c, T> PgFind<'c, T> {
    pub fn new(conn: &'c mut PgConnection, select: Select) -> Self {
        Self {
            conn,
            select,
            row: PhantomData,
        }
    }
}

impl<T> PageSource for PgFind<'_, T>
where
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    type Row = T;

    fn has_order(&self) -> bool {
        self.select.has_order()
    }

    async fn count(&mut self) -> Result<i64, PageError> {
        let mut qb = self.select.count_query()?;
        let total = qb
            .build_query_scalar::<i64>()
            .fetch_one(&mut *self.conn)
            .await?;
        Ok(total)
    }

    async fn rows(&mut self, plan: &FetchPlan) -> Result<Vec<T>, PageError> {
        let mut qb = self.select.rows_query(plan)?;
        let rows = qb.build_query_as::<T>().fetch_all(&mut *self.conn).await?;
        Ok(rows)
    }
}

/// Raw row source: rows are returned undecoded
pub struct PgScan<'c> {
    conn: &'c mut PgConnection,
    select: Select,
}

impl<'c> PgScan<'c> {
    pub fn new(conn: &'c mut PgConnection, select: Select) -> Self {
        Self { conn, select }
    }
}

impl PageSource for PgScan<'_> {
    type Row = PgRow;

    fn has_order(&self) -> bool {
        self.select.has_order()
    }

    async fn count(&mut self) -> Result<i64, PageError> {
        let mut qb = self.select.count_query()?;
        let total = qb
            .build_query_scalar::<i64>()
            .fetch_one(&mut *self.conn)
            .await?;
        Ok(total)
    }

    async fn rows(&mut self, plan: &FetchPlan) -> Result<Vec<PgRow>, PageError> {
        let mut qb = self.select.rows_query(plan)?;
        let rows = qb.build().fetch_all(&mut *self.conn).await?;
        Ok(rows)
    }
}
