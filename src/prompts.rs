//! Prompt builders for each pipeline stage.

use crate::state::ChartType;

/// How much of the result dump the visualization decision gets to see.
const DECISION_PREVIEW_CHARS: usize = 500;

pub fn guardrails_prompt(user_query: &str) -> String {
    format!(
        r#"You screen questions for an e-commerce analytics assistant backed by a SQL database.

DATABASE SCOPE:
- products: catalog, pricing, categories, brands, departments
- users: customer demographics, locations, sign-up data
- orders: purchases, status, shipping and delivery times
- order_items: line items and revenue
- inventory_items: stock units and warehouse tracking
- distribution_centers: warehouse locations
- events: web sessions, page views, traffic sources

CLASSIFY THE MESSAGE:
1. GREETING: small talk such as "hi", "hello", "good morning", "how are you".
2. IN-SCOPE: anything answerable from the tables above (revenue, top products, customer counts by state, order trends, stock levels, traffic sources).
3. OUT-OF-SCOPE: personal account questions, forecasts, competitor or external data, general knowledge, jokes, weather, real-time data.

Message: "{user_query}"

RULES:
- Greeting: is_greeting=true, is_question_relevant=false.
- When unsure whether the data can answer it, set is_question_relevant=true.
- Prefer answering over refusing."#
    )
}

pub fn sql_generation_prompt(user_query: &str, schema: &str) -> String {
    format!(
        r#"You write SQLite queries for an e-commerce database.

{schema}

RULES:
1. Use only the tables and columns listed above; join along the listed foreign keys.
2. Use explicit JOIN ... ON syntax and short aliases (p, u, o, oi).
3. Filter with WHERE before aggregating; use HAVING only for aggregate filters.
4. Order ranked results and add LIMIT 10 unless the question asks for another count.
5. Revenue is SUM(order_items.sale_price), never products.retail_price. Exclude orders with status 'Cancelled' or 'Returned' when computing revenue.
6. Dates are TEXT; use DATE() for comparisons and strftime('%Y-%m', created_at) for monthly grouping.

Question: "{user_query}"

Return one executable SQL query with no markdown and no commentary inside the query."#
    )
}

pub fn error_correction_prompt(user_query: &str, failed_sql: &str, error: &str, schema: &str) -> String {
    format!(
        r#"A SQLite query failed. Fix it.

{schema}

QUESTION: "{user_query}"

FAILED QUERY:
{failed_sql}

ERROR:
{error}

CHECKLIST:
- Unknown column: check spelling against the schema and that aliases point at the right table.
- Unknown table: use the exact table names above (order_items, not order_item).
- Syntax: commas between columns, balanced parentheses, an ON clause for every JOIN.
- Aggregation: every non-aggregated selected column must appear in GROUP BY.

Keep the intent of the original query. Return only the corrected SQL, no markdown."#
    )
}

pub fn analysis_prompt(user_query: &str, sql: &str, result: &str) -> String {
    format!(
        r#"You explain database results to a business user.

QUESTION: "{user_query}"

SQL EXECUTED:
{sql}

RESULTS:
{result}

GUIDELINES:
- Answer the question directly first, in plain language.
- Format money as $1,234.56 and counts as 1,234.
- Use a numbered list for rankings; call out differences for comparisons and the direction of trends.
- Give 2-3 key insights in business terms.
- Address every part of a multi-part question.
- Set needs_visualization when a chart would help (trends, comparisons, distributions, rankings)."#
    )
}

pub fn visualization_decision_prompt(user_query: &str, result: &str) -> String {
    let preview: String = result.chars().take(DECISION_PREVIEW_CHARS).collect();
    format!(
        r#"Decide whether a chart would make these results easier to understand.

QUESTION: "{user_query}"

RESULTS (first {DECISION_PREVIEW_CHARS} characters):
{preview}

CHART TYPES:
- bar: comparing categories or ranking items
- line: trends over time, sequential data
- pie: part-to-whole with at most about 7 categories
- scatter: correlation between two numeric variables, distributions, outliers
- none: a single value, yes/no answers, text-heavy results

Answer with needs_visualization and one visualization_type from the list."#
    )
}

pub fn chart_spec_prompt(user_query: &str, result: &str, chart_type: ChartType, columns: &[String], max_points: usize) -> String {
    format!(
        r#"Describe a {chart_type} chart for these query results.

QUESTION: "{user_query}"

AVAILABLE COLUMNS: {columns}

RESULTS:
{result}

REQUIREMENTS:
- chart_type must be "{chart_type}".
- x_column and y_columns must be names from AVAILABLE COLUMNS; y columns must be numeric.
- Give a descriptive title plus x_label and y_label.
- Add hover_columns that help identify each point.
- Show at most {max_points} points; set sort_descending for rankings."#,
        columns = columns.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompts_embed_inputs() {
        assert!(guardrails_prompt("Hello").contains("\"Hello\""));
        let sql = sql_generation_prompt("top 5 products", "TABLE products");
        assert!(sql.contains("TABLE products"));
        assert!(sql.contains("order_items.sale_price"));
        let fix = error_correction_prompt("q", "SELECT x", "no such column: x", "S");
        assert!(fix.contains("SELECT x") && fix.contains("no such column: x"));
    }

    #[test]
    fn test_decision_prompt_truncates_results() {
        let long = "x".repeat(2_000);
        let prompt = visualization_decision_prompt("q", &long);
        assert!(prompt.len() < 2_000);
    }

    #[test]
    fn test_chart_prompt_lists_columns() {
        let prompt = chart_spec_prompt("q", "r", ChartType::Bar, &["name".into(), "revenue".into()], 20);
        assert!(prompt.contains("name, revenue"));
        assert!(prompt.contains("\"bar\""));
    }
}
