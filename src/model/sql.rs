/// CompiledQuery → PostgreSQL text.
///
/// `to_statement` produces parameterized SQL for execution; every
/// placeholder carries an explicit cast so the server infers parameter types
/// from the literal rather than the column. `to_inline_sql` inlines literals
/// and is only meant for diagnostics.
use super::compiler::{Comparison, CompiledQuery, Predicate, ProjectedColumn};
use super::registry::is_identifier;
use super::types::{OperatorKind, SemanticType, Value, DATE_FORMAT};

/// Parameterized statement ready for the backing store.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub text: String,
    pub params: Vec<Value>,
}

pub fn to_statement(query: &CompiledQuery) -> SqlStatement {
    let mut renderer = Renderer::parameterized();
    let text = renderer.select(query);
    SqlStatement {
        text,
        params: renderer.params,
    }
}

pub fn to_inline_sql(query: &CompiledQuery) -> String {
    Renderer::inline().select(query)
}

/// `SELECT min(col)::text, max(col)::text FROM table` for range probing.
pub fn range_probe(table: &str, column: &str) -> String {
    let column = quote_ident(column);
    format!(
        "SELECT min({col})::text, max({col})::text FROM {}",
        quote_table(table),
        col = column
    )
}

struct Renderer {
    inline: bool,
    params: Vec<Value>,
}

impl Renderer {
    fn parameterized() -> Self {
        Self {
            inline: false,
            params: Vec::new(),
        }
    }

    fn inline() -> Self {
        Self {
            inline: true,
            params: Vec::new(),
        }
    }

    fn select(&mut self, query: &CompiledQuery) -> String {
        let mut parts = Vec::new();

        let columns: Vec<String> = query.columns.iter().map(compile_projection).collect();
        parts.push(format!("SELECT {}", columns.join(", ")));
        parts.push(format!("FROM {}", quote_table(&query.table)));

        if query.predicate != Predicate::Always {
            let filter = self.predicate(&query.predicate);
            parts.push(format!("WHERE {}", filter));
        }

        parts.join(" ")
    }

    fn predicate(&mut self, predicate: &Predicate) -> String {
        match predicate {
            Predicate::Always => String::from("TRUE"),
            Predicate::Compare(comparison) => self.comparison(comparison),
            Predicate::And(left, right) => self.connective("AND", predicate, left, right),
            Predicate::Or(left, right) => self.connective("OR", predicate, left, right),
        }
    }

    fn connective(
        &mut self,
        keyword: &str,
        parent: &Predicate,
        left: &Predicate,
        right: &Predicate,
    ) -> String {
        let left_sql = self.operand(parent, left);
        let right_sql = self.operand(parent, right);
        format!("{} {} {}", left_sql, keyword, right_sql)
    }

    /// Parenthesize a compound child whose connective differs from its parent.
    fn operand(&mut self, parent: &Predicate, child: &Predicate) -> String {
        let sql = self.predicate(child);
        let same_kind = matches!(
            (parent, child),
            (Predicate::And(..), Predicate::And(..)) | (Predicate::Or(..), Predicate::Or(..))
        );
        match child {
            Predicate::And(..) | Predicate::Or(..) if !same_kind => format!("({})", sql),
            _ => sql,
        }
    }

    fn comparison(&mut self, comparison: &Comparison) -> String {
        let column = compile_column(&comparison.column, comparison.semantic_type);
        let values = &comparison.values;

        match comparison.operator {
            OperatorKind::Equals => format!("{} = {}", column, self.bind(&values[0])),
            OperatorKind::NotEquals => format!("{} <> {}", column, self.bind(&values[0])),
            OperatorKind::GreaterThan => format!("{} > {}", column, self.bind(&values[0])),
            OperatorKind::GreaterOrEqual => format!("{} >= {}", column, self.bind(&values[0])),
            OperatorKind::LessThan => format!("{} < {}", column, self.bind(&values[0])),
            OperatorKind::LessOrEqual => format!("{} <= {}", column, self.bind(&values[0])),
            OperatorKind::Contains => {
                let pattern = format!("%{}%", escape_like(&values[0].to_string()));
                format!("{} LIKE {}", column, self.bind(&Value::Text(pattern)))
            }
            OperatorKind::StartsWith => {
                let pattern = format!("{}%", escape_like(&values[0].to_string()));
                format!("{} LIKE {}", column, self.bind(&Value::Text(pattern)))
            }
            OperatorKind::Between => {
                let low = self.bind(&values[0]);
                let high = self.bind(&values[1]);
                format!("{} BETWEEN {} AND {}", column, low, high)
            }
            OperatorKind::In => {
                let items: Vec<String> = values.iter().map(|v| self.bind(v)).collect();
                format!("{} IN ({})", column, items.join(", "))
            }
            OperatorKind::IsNull => format!("{} IS NULL", column),
        }
    }

    fn bind(&mut self, value: &Value) -> String {
        if self.inline {
            return compile_literal(value);
        }
        self.params.push(value.clone());
        format!("${}::{}", self.params.len(), value_cast(value))
    }
}

fn compile_projection(column: &ProjectedColumn) -> String {
    let name = quote_ident(&column.name);
    format!("{}::{} AS {}", name, column_cast(column.semantic_type), name)
}

fn compile_column(name: &str, semantic_type: SemanticType) -> String {
    let name = quote_ident(name);
    match semantic_type {
        // Text comparisons must work for enum, uuid and citext columns too.
        SemanticType::String | SemanticType::Enumerated => format!("{}::text", name),
        _ => name,
    }
}

/// Wire type every projected column is cast to, so each decodes to a known Rust type.
fn column_cast(semantic_type: SemanticType) -> &'static str {
    match semantic_type {
        SemanticType::String | SemanticType::Enumerated => "text",
        SemanticType::Integer => "int8",
        SemanticType::Decimal => "float8",
        SemanticType::Date => "date",
        SemanticType::Boolean => "bool",
    }
}

fn value_cast(value: &Value) -> &'static str {
    match value {
        Value::Text(_) => "text",
        Value::Integer(_) => "int8",
        Value::Decimal(_) => "float8",
        Value::Date(_) => "date",
        Value::Boolean(_) => "bool",
    }
}

fn compile_literal(value: &Value) -> String {
    match value {
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Integer(i) => i.to_string(),
        Value::Decimal(d) => d.to_string(),
        Value::Date(d) => format!("DATE '{}'", d.format(DATE_FORMAT)),
        Value::Boolean(true) => String::from("TRUE"),
        Value::Boolean(false) => String::from("FALSE"),
    }
}

/// Escape LIKE wildcards so user text matches literally.
fn escape_like(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Quote an identifier unless it is already a plain lowercase name.
fn quote_ident(name: &str) -> String {
    let plain = is_identifier(name) && !name.chars().any(|c| c.is_ascii_uppercase());
    if plain && !is_reserved(name) {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

fn quote_table(table: &str) -> String {
    table.split('.').map(quote_ident).collect::<Vec<_>>().join(".")
}

fn is_reserved(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "all", "and", "as", "between", "case", "check", "column", "default", "desc", "distinct",
        "do", "else", "end", "false", "for", "from", "group", "in", "is", "like", "limit", "not",
        "null", "or", "order", "select", "table", "then", "to", "true", "user", "when", "where",
    ];
    RESERVED.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{compile, ConditionNode as Cond, ExecutableQuery};
    use crate::testing::sample_snapshot;
    use chrono::NaiveDate;

    fn compiled(query: ExecutableQuery) -> CompiledQuery {
        compile(&sample_snapshot(), query).unwrap()
    }

    #[test]
    fn test_contains_inline() {
        let query = compiled(
            ExecutableQuery::new("Customer").condition(Cond::new("City", "contains").value("spring")),
        );
        let sql = to_inline_sql(&query);
        assert!(sql.contains("tier::text AS tier FROM customers"));
        assert!(sql.ends_with("WHERE city::text LIKE '%spring%'"), "{}", sql);
    }

    #[test]
    fn test_contains_parameterized() {
        let query = compiled(
            ExecutableQuery::new("Customer").condition(Cond::new("City", "contains").value("50%_off")),
        );
        let statement = to_statement(&query);
        assert!(statement.text.ends_with("WHERE city::text LIKE $1::text"));
        assert_eq!(statement.params, vec![Value::Text("%50\\%\\_off%".into())]);
    }

    #[test]
    fn test_no_where_for_empty_conditions() {
        let statement = to_statement(&compiled(ExecutableQuery::new("Order")));
        assert_eq!(
            statement.text,
            "SELECT id::int8 AS id, status::text AS status, total::float8 AS total, \
             placed_at::date AS placed_at FROM sales.orders"
        );
        assert!(statement.params.is_empty());
    }

    #[test]
    fn test_every_column_is_cast_to_its_wire_type() {
        let sql = to_inline_sql(&compiled(ExecutableQuery::new("Customer")));
        assert_eq!(
            sql,
            "SELECT name::text AS name, city::text AS city, age::int8 AS age, \
             balance::float8 AS balance, joined_on::date AS joined_on, \
             active::bool AS active, tier::text AS tier FROM customers"
        );
    }

    #[test]
    fn test_mixed_separators_are_parenthesized() {
        let query = compiled(
            ExecutableQuery::new("Customer")
                .condition(Cond::new("City", "equals").value("Oslo").then("OR"))
                .condition(Cond::new("City", "equals").value("Bergen").then("AND"))
                .condition(Cond::new("Age", "between").value("20").value("30")),
        );
        let sql = to_inline_sql(&query);
        assert!(
            sql.ends_with("WHERE (city::text = 'Oslo' OR city::text = 'Bergen') AND age BETWEEN 20 AND 30"),
            "{}",
            sql
        );

        let statement = to_statement(&query);
        assert!(statement.text.ends_with(
            "WHERE (city::text = $1::text OR city::text = $2::text) \
             AND age BETWEEN $3::int8 AND $4::int8"
        ));
        assert_eq!(statement.params.len(), 4);
    }

    #[test]
    fn test_same_separator_chain_is_flat() {
        let query = compiled(
            ExecutableQuery::new("Customer")
                .condition(Cond::new("Name", "starts with").value("O'Br").then("AND"))
                .condition(Cond::new("Active", "equals").value("false").then("AND"))
                .condition(Cond::new("Joined", "is null")),
        );
        let sql = to_inline_sql(&query);
        assert!(
            sql.ends_with("WHERE name::text LIKE 'O''Br%' AND active = FALSE AND joined_on IS NULL"),
            "{}",
            sql
        );
    }

    #[test]
    fn test_in_and_date_literals() {
        let query = compiled(
            ExecutableQuery::new("Order")
                .condition(Cond::new("Status", "in").value("open").value("shipped").then("AND"))
                .condition(Cond::new("Placed", "greater or equal").value("2024-01-31")),
        );
        assert!(to_inline_sql(&query)
            .ends_with("WHERE status::text IN ('open', 'shipped') AND placed_at >= DATE '2024-01-31'"));

        let statement = to_statement(&query);
        assert_eq!(
            statement.params,
            vec![
                Value::Text("open".into()),
                Value::Text("shipped".into()),
                Value::Date(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()),
            ]
        );
    }

    #[test]
    fn test_identifier_quoting() {
        assert_eq!(quote_ident("city"), "city");
        assert_eq!(quote_ident("City"), "\"City\"");
        assert_eq!(quote_ident("order"), "\"order\"");
        assert_eq!(quote_table("sales.orders"), "sales.orders");
        assert_eq!(range_probe("customers", "age"), "SELECT min(age)::text, max(age)::text FROM customers");
    }
}
