//! Prompts - system prompts and output schemas for each pipeline stage

use crate::llm::OutputSchema;

/// System prompt for the router
pub const ROUTER_SYSTEM_PROMPT: &str = r#"You are the router of a data assistant that can answer questions in two ways.

- SQL: the answer is a number, list, ranking, trend or lookup that can be computed from relational tables in the data warehouse (counts, sums, averages, "top N", "how many", "which customers", values over time).
- RETRIEVAL: the answer lives in documents: policies, definitions, procedures, explanations, descriptions of how or why something works.

Use the conversation so far to resolve follow-up questions. A follow-up about numbers from an earlier SQL answer is SQL.

Reply with the route only."#;

pub fn router_schema() -> OutputSchema {
    OutputSchema {
        name: "route_question".to_string(),
        description: "Choose how the question should be answered".to_string(),
        schema: serde_json::json!({
            "type": "object",
            "properties": {
                "route": {"type": "string", "enum": ["SQL", "RETRIEVAL"]}
            },
            "required": ["route"],
            "additionalProperties": false
        }),
    }
}

/// System prompt for table selection
pub const TABLE_SELECTION_SYSTEM_PROMPT: &str = r#"You select tables for a SQL query.

Given a question and a list of candidate tables with their descriptions, return the smallest set of tables that is sufficient to answer the question. Include tables needed for joins. Only return names from the candidate list, exactly as written."#;

/// Selection schema whose items are restricted to `candidates`
pub fn table_selection_schema(candidates: &[String]) -> OutputSchema {
    OutputSchema {
        name: "select_tables".to_string(),
        description: "Tables needed to answer the question".to_string(),
        schema: serde_json::json!({
            "type": "object",
            "properties": {
                "tables": {
                    "type": "array",
                    "items": {"type": "string", "enum": candidates}
                }
            },
            "required": ["tables"],
            "additionalProperties": false
        }),
    }
}

/// System prompt for query synthesis. `{platform}`, `{dialect_rules}`,
/// `{row_limit}` and `{table_info}` are filled in by the synthesizer.
pub const QUERY_SYSTEM_PROMPT: &str = r#"You are a helpful assistant.
Generate one syntactically correct {platform} SQL query that answers the user's question.
{dialect_rules}
Unless the user specifies in their question a specific number of examples they wish to obtain, always limit your query to at most {row_limit} results.
Pay attention to use only the column names that you can see in the schema description.
Never query for all the columns from a specific table, only ask for a few relevant columns given the question.
Be careful to not query for columns that do not exist. Also, pay attention to which column is in which table.
Always use fully qualified table names exactly as listed.
The query must only read data: a single SELECT (optionally with WITH).
Return only the SQL query, without explanation.

Only use the following tables:
{table_info}"#;

/// System prompt for the answer composer
pub const ANSWER_SYSTEM_PROMPT: &str = r#"You are a helpful AI assistant. Given the user's question, the SQL query that was run and its result rows, provide a concise natural language answer.
State the numbers from the result exactly. Do not invent data that is not in the result.
If the rows were truncated, say that the answer is based on the rows shown."#;
