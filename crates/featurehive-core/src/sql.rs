//! Structured SQL
//!
//! Queries are assembled as a small tree (CTEs, select lists, joins,
//! predicates) and turned into text by exactly one function, [`render`].
//! Identifiers are always quoted by the dialect at render time, so no
//! caller ever splices a raw name into SQL text.
//!
//! # Example
//! ```
//! use featurehive_core::dialect::SqlDialect;
//! use featurehive_core::sql::{render, Expr, Query, Select, TableFactor};
//!
//! let select = Select::new(TableFactor::table("driver_stats"))
//!     .column(Expr::column("driver_id"))
//!     .filter(Expr::lte(Expr::column("event_ts"), Expr::column("cutoff")));
//! let sql = render(&Query::new(select), SqlDialect::DuckDb);
//! assert!(sql.contains("FROM \"driver_stats\""));
//! ```

use crate::dialect::SqlDialect;
use crate::types::Value;

/// Expression (column references, literals, operations)
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference, optionally qualified by a table alias
    Column {
        qualifier: Option<String>,
        name: String,
    },

    /// Literal value
    Literal(Value),

    /// Binary operation (a = b, a <= b, a AND b, ...)
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },

    /// Function call (MIN, MAX, CONCAT, COUNT(*) via `Wildcard`)
    Function { name: String, args: Vec<Expr> },

    /// `CAST(expr AS <text type>)`
    CastText(Box<Expr>),

    /// Timestamp expression shifted back by a number of seconds
    SubtractSeconds { expr: Box<Expr>, seconds: u64 },

    /// `expr BETWEEN low AND high`
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
    },

    /// `ROW_NUMBER() OVER (PARTITION BY ... ORDER BY ...)`
    RowNumber {
        partition_by: Vec<Expr>,
        order_by: Vec<OrderBy>,
    },

    /// `*`
    Wildcard,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Eq,
    /// Equality that treats NULL = NULL as true
    NullSafeEq,
    Gt,
    Gte,
    Lt,
    Lte,
    And,
}

/// Sort key of a window ordering
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub expr: Expr,
    pub descending: bool,
}

impl OrderBy {
    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            descending: true,
        }
    }
}

impl Expr {
    pub fn column(name: &str) -> Self {
        Self::Column {
            qualifier: None,
            name: name.to_string(),
        }
    }

    pub fn qualified(qualifier: &str, name: &str) -> Self {
        Self::Column {
            qualifier: Some(qualifier.to_string()),
            name: name.to_string(),
        }
    }

    pub fn literal(value: Value) -> Self {
        Self::Literal(value)
    }

    pub fn string(value: &str) -> Self {
        Self::Literal(Value::String(value.to_string()))
    }

    fn binary(left: Expr, op: BinaryOperator, right: Expr) -> Self {
        Self::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOperator::Eq, right)
    }

    pub fn null_safe_eq(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOperator::NullSafeEq, right)
    }

    pub fn gt(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOperator::Gt, right)
    }

    pub fn gte(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOperator::Gte, right)
    }

    pub fn lt(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOperator::Lt, right)
    }

    pub fn lte(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOperator::Lte, right)
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOperator::And, right)
    }

    /// Conjunction of all predicates (`None` when empty)
    pub fn and_all(predicates: impl IntoIterator<Item = Expr>) -> Option<Expr> {
        predicates.into_iter().reduce(Expr::and)
    }

    pub fn function(name: &str, args: Vec<Expr>) -> Self {
        Self::Function {
            name: name.to_string(),
            args,
        }
    }

    pub fn max(expr: Expr) -> Self {
        Self::function("MAX", vec![expr])
    }

    pub fn min(expr: Expr) -> Self {
        Self::function("MIN", vec![expr])
    }

    pub fn count_all() -> Self {
        Self::function("COUNT", vec![Expr::Wildcard])
    }

    pub fn cast_text(expr: Expr) -> Self {
        Self::CastText(Box::new(expr))
    }

    pub fn subtract_seconds(expr: Expr, seconds: u64) -> Self {
        Self::SubtractSeconds {
            expr: Box::new(expr),
            seconds,
        }
    }

    pub fn between(expr: Expr, low: Expr, high: Expr) -> Self {
        Self::Between {
            expr: Box::new(expr),
            low: Box::new(low),
            high: Box::new(high),
        }
    }

    pub fn row_number(partition_by: Vec<Expr>, order_by: Vec<OrderBy>) -> Self {
        Self::RowNumber {
            partition_by,
            order_by,
        }
    }
}

/// One entry of a select list
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: Expr,
    pub alias: Option<String>,
}

/// Relation in a FROM clause or join
#[derive(Debug, Clone, PartialEq)]
pub enum TableFactor {
    /// Table or CTE name, optionally database-qualified
    Table { name: String, alias: Option<String> },
    /// Caller-supplied SELECT text used as a subquery
    RawQuery { sql: String, alias: String },
}

impl TableFactor {
    pub fn table(name: &str) -> Self {
        Self::Table {
            name: name.to_string(),
            alias: None,
        }
    }

    pub fn aliased(name: &str, alias: &str) -> Self {
        Self::Table {
            name: name.to_string(),
            alias: Some(alias.to_string()),
        }
    }

    pub fn raw_query(sql: &str, alias: &str) -> Self {
        Self::RawQuery {
            sql: sql.trim().trim_end_matches(';').to_string(),
            alias: alias.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Cross,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub relation: TableFactor,
    pub on: Option<Expr>,
}

/// A single SELECT block
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub projection: Vec<SelectItem>,
    pub from: TableFactor,
    pub joins: Vec<Join>,
    pub selection: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
}

impl Select {
    pub fn new(from: TableFactor) -> Self {
        Self {
            projection: Vec::new(),
            from,
            joins: Vec::new(),
            selection: None,
            group_by: Vec::new(),
            having: None,
        }
    }

    pub fn column(mut self, expr: Expr) -> Self {
        self.projection.push(SelectItem { expr, alias: None });
        self
    }

    pub fn column_as(mut self, expr: Expr, alias: &str) -> Self {
        self.projection.push(SelectItem {
            expr,
            alias: Some(alias.to_string()),
        });
        self
    }

    pub fn join(mut self, kind: JoinKind, relation: TableFactor, on: Option<Expr>) -> Self {
        self.joins.push(Join { kind, relation, on });
        self
    }

    /// Adds a WHERE predicate, AND-ed with any existing one
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.selection = Some(match self.selection.take() {
            Some(existing) => Expr::and(existing, predicate),
            None => predicate,
        });
        self
    }

    pub fn group_by(mut self, expr: Expr) -> Self {
        self.group_by.push(expr);
        self
    }

    pub fn having(mut self, predicate: Expr) -> Self {
        self.having = Some(predicate);
        self
    }
}

/// Common table expression
#[derive(Debug, Clone, PartialEq)]
pub struct Cte {
    pub name: String,
    pub select: Select,
}

/// A full statement: zero or more CTEs followed by a body
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub ctes: Vec<Cte>,
    pub body: Select,
}

impl Query {
    pub fn new(body: Select) -> Self {
        Self {
            ctes: Vec::new(),
            body,
        }
    }

    pub fn with_ctes(ctes: Vec<Cte>, body: Select) -> Self {
        Self { ctes, body }
    }

    pub fn cte(&self, name: &str) -> Option<&Cte> {
        self.ctes.iter().find(|c| c.name == name)
    }

    pub fn cte_names(&self) -> Vec<&str> {
        self.ctes.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Renders a query as SQL text for the given dialect
pub fn render(query: &Query, dialect: SqlDialect) -> String {
    let mut out = String::new();
    if !query.ctes.is_empty() {
        out.push_str("WITH ");
        let ctes: Vec<String> = query
            .ctes
            .iter()
            .map(|cte| {
                format!(
                    "{} AS (\n{}\n)",
                    dialect.quote_part(&cte.name),
                    indent(&render_select(&cte.select, dialect))
                )
            })
            .collect();
        out.push_str(&ctes.join(",\n"));
        out.push('\n');
    }
    out.push_str(&render_select(&query.body, dialect));
    out
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("    {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_select(select: &Select, dialect: SqlDialect) -> String {
    let projection: Vec<String> = if select.projection.is_empty() {
        vec!["*".to_string()]
    } else {
        select
            .projection
            .iter()
            .map(|item| match &item.alias {
                Some(alias) => format!(
                    "{} AS {}",
                    render_expr(&item.expr, dialect),
                    dialect.quote_part(alias)
                ),
                None => render_expr(&item.expr, dialect),
            })
            .collect()
    };

    let mut lines = vec![
        format!("SELECT {}", projection.join(", ")),
        format!("FROM {}", render_table(&select.from, dialect)),
    ];

    for join in &select.joins {
        let keyword = match join.kind {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Cross => "CROSS JOIN",
        };
        let relation = render_table(&join.relation, dialect);
        match (&join.on, join.kind) {
            (Some(on), JoinKind::Inner | JoinKind::Left) => lines.push(format!(
                "{} {} ON {}",
                keyword,
                relation,
                render_expr(on, dialect)
            )),
            // An ON-less inner/left join degenerates to a cartesian product
            (_, _) => lines.push(format!("CROSS JOIN {}", relation)),
        }
    }

    if let Some(selection) = &select.selection {
        lines.push(format!("WHERE {}", render_expr(selection, dialect)));
    }
    if !select.group_by.is_empty() {
        let keys: Vec<String> = select
            .group_by
            .iter()
            .map(|e| render_expr(e, dialect))
            .collect();
        lines.push(format!("GROUP BY {}", keys.join(", ")));
    }
    if let Some(having) = &select.having {
        lines.push(format!("HAVING {}", render_expr(having, dialect)));
    }
    lines.join("\n")
}

fn render_table(table: &TableFactor, dialect: SqlDialect) -> String {
    match table {
        TableFactor::Table { name, alias: None } => dialect.quote_identifier(name),
        TableFactor::Table {
            name,
            alias: Some(alias),
        } => format!(
            "{} AS {}",
            dialect.quote_identifier(name),
            dialect.quote_part(alias)
        ),
        TableFactor::RawQuery { sql, alias } => {
            format!("(\n{}\n) AS {}", indent(sql), dialect.quote_part(alias))
        }
    }
}

fn render_expr(expr: &Expr, dialect: SqlDialect) -> String {
    match expr {
        Expr::Column {
            qualifier: Some(q),
            name,
        } => format!("{}.{}", dialect.quote_part(q), dialect.quote_part(name)),
        Expr::Column {
            qualifier: None,
            name,
        } => dialect.quote_part(name),
        Expr::Literal(value) => dialect.literal(value),
        Expr::BinaryOp { left, op, right } => {
            let op = match op {
                BinaryOperator::Eq => "=",
                BinaryOperator::NullSafeEq => dialect.null_safe_eq(),
                BinaryOperator::Gt => ">",
                BinaryOperator::Gte => ">=",
                BinaryOperator::Lt => "<",
                BinaryOperator::Lte => "<=",
                BinaryOperator::And => "AND",
            };
            format!(
                "{} {} {}",
                render_expr(left, dialect),
                op,
                render_expr(right, dialect)
            )
        }
        Expr::Function { name, args } => {
            let args: Vec<String> = args.iter().map(|a| render_expr(a, dialect)).collect();
            format!("{}({})", name, args.join(", "))
        }
        Expr::CastText(inner) => format!(
            "CAST({} AS {})",
            render_expr(inner, dialect),
            dialect.text_type()
        ),
        Expr::SubtractSeconds { expr, seconds } => {
            dialect.subtract_seconds(&render_expr(expr, dialect), *seconds)
        }
        Expr::Between { expr, low, high } => format!(
            "{} BETWEEN {} AND {}",
            render_expr(expr, dialect),
            render_expr(low, dialect),
            render_expr(high, dialect)
        ),
        Expr::RowNumber {
            partition_by,
            order_by,
        } => {
            let mut window = Vec::new();
            if !partition_by.is_empty() {
                let keys: Vec<String> = partition_by
                    .iter()
                    .map(|e| render_expr(e, dialect))
                    .collect();
                window.push(format!("PARTITION BY {}", keys.join(", ")));
            }
            if !order_by.is_empty() {
                let keys: Vec<String> = order_by
                    .iter()
                    .map(|o| {
                        format!(
                            "{} {}",
                            render_expr(&o.expr, dialect),
                            if o.descending { "DESC" } else { "ASC" }
                        )
                    })
                    .collect();
                window.push(format!("ORDER BY {}", keys.join(", ")));
            }
            format!("ROW_NUMBER() OVER ({})", window.join(" "))
        }
        Expr::Wildcard => "*".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_simple_select() {
        let select = Select::new(TableFactor::aliased("feast.driver_stats", "src"))
            .column(Expr::qualified("src", "driver_id"))
            .column_as(Expr::qualified("src", "ts"), "event_timestamp")
            .filter(Expr::lte(
                Expr::qualified("src", "ts"),
                Expr::string("2024-01-01"),
            ));

        let sql = render(&Query::new(select), SqlDialect::Hive);
        assert_eq!(
            sql,
            "SELECT `src`.`driver_id`, `src`.`ts` AS `event_timestamp`\n\
             FROM `feast`.`driver_stats` AS `src`\n\
             WHERE `src`.`ts` <= '2024-01-01'"
        );
    }

    #[test]
    fn test_group_by_omitted_when_empty() {
        let select = Select::new(TableFactor::table("t")).column(Expr::max(Expr::column("x")));
        let sql = render(&Query::new(select.clone()), SqlDialect::DuckDb);
        assert!(!sql.contains("GROUP BY"));

        let grouped = select.group_by(Expr::column("k"));
        let sql = render(&Query::new(grouped), SqlDialect::DuckDb);
        assert!(sql.ends_with("GROUP BY \"k\""));
    }

    #[test]
    fn test_render_ctes_and_joins() {
        let inner = Select::new(TableFactor::table("src")).column(Expr::column("k"));
        let body = Select::new(TableFactor::aliased("a", "a"))
            .join(
                JoinKind::Left,
                TableFactor::aliased("b", "b"),
                Some(Expr::eq(Expr::qualified("a", "k"), Expr::qualified("b", "k"))),
            )
            .join(JoinKind::Cross, TableFactor::table("bounds"), None);
        let query = Query::with_ctes(
            vec![Cte {
                name: "a".to_string(),
                select: inner,
            }],
            body,
        );

        let sql = render(&query, SqlDialect::DuckDb);
        assert!(sql.starts_with("WITH \"a\" AS (\n    SELECT \"k\"\n    FROM \"src\"\n)\n"));
        assert!(sql.contains("LEFT JOIN \"b\" AS \"b\" ON \"a\".\"k\" = \"b\".\"k\""));
        assert!(sql.contains("CROSS JOIN \"bounds\""));
        assert_eq!(query.cte_names(), vec!["a"]);
    }

    #[test]
    fn test_render_window_and_functions() {
        let rn = Expr::row_number(
            vec![Expr::column("id")],
            vec![
                OrderBy::desc(Expr::column("event_timestamp")),
                OrderBy::desc(Expr::column("created_timestamp")),
            ],
        );
        let sql = render(
            &Query::new(Select::new(TableFactor::table("t")).column_as(rn, "rn")),
            SqlDialect::Hive,
        );
        assert!(sql.contains(
            "ROW_NUMBER() OVER (PARTITION BY `id` ORDER BY `event_timestamp` DESC, `created_timestamp` DESC) AS `rn`"
        ));

        let concat = Expr::function(
            "CONCAT",
            vec![Expr::cast_text(Expr::column("k")), Expr::string("|")],
        );
        let sql = render(
            &Query::new(Select::new(TableFactor::table("t")).column(concat)),
            SqlDialect::DuckDb,
        );
        assert!(sql.contains("CONCAT(CAST(\"k\" AS VARCHAR), '|')"));
    }

    #[test]
    fn test_raw_query_is_wrapped() {
        let select = Select::new(TableFactor::raw_query("SELECT 1 AS x;", "entity_source"));
        let sql = render(&Query::new(select), SqlDialect::DuckDb);
        assert_eq!(sql, "SELECT *\nFROM (\n    SELECT 1 AS x\n) AS \"entity_source\"");
    }
}
