//! Build the prompt sent to the completion service.

use std::fmt::Write;

use query_engine_context::Turn;
use query_engine_metadata::metadata::{DatabaseType, SchemaSnapshot, TablesInfo};

use crate::completion::{Prompt, Role};

fn instructions(database_type: DatabaseType) -> String {
    format!(
        "You translate questions about a database into {dialect} SQL. \
         Answer with exactly one read-only SELECT statement and nothing else. \
         Qualify every column with its table name or alias. \
         Only use the tables and columns listed below.",
        dialect = database_type.dialect_name()
    )
}

/// Describe the tables, columns and relationships of a schema.
pub fn schema_summary(schema: &SchemaSnapshot) -> String {
    let TablesInfo(tables) = &schema.tables;
    let mut summary = String::new();
    let mut relationships = Vec::new();

    for table in tables.values() {
        let _ = writeln!(summary, "Table: {}", table.table_name);
        for column in table.columns.values() {
            let _ = writeln!(summary, " - {} ({})", column.name, column.r#type);
        }
        for relation in table.foreign_relations.0.values() {
            for (local, foreign) in &relation.column_mapping {
                relationships.push(format!(
                    "{}.{local} -> {}.{foreign}",
                    table.table_name, relation.foreign_table
                ));
            }
        }
    }

    if !relationships.is_empty() {
        summary.push_str("Relationships:\n");
        for relationship in relationships {
            let _ = writeln!(summary, " - {relationship}");
        }
    }
    summary
}

/// The full prompt: instructions and schema, the earlier turns of the
/// conversation, then the question.
pub fn build_prompt<'a>(
    database_type: DatabaseType,
    schema: &SchemaSnapshot,
    history: impl IntoIterator<Item = &'a Turn>,
    question: &str,
) -> Prompt {
    let mut prompt = Prompt::default();
    prompt.push(
        Role::System,
        format!("{}\n\n{}", instructions(database_type), schema_summary(schema)),
    );
    for turn in history {
        prompt.push(Role::User, turn.user_text.clone());
        if let Some(sql) = &turn.generated_sql {
            prompt.push(Role::Assistant, sql.clone());
        }
    }
    prompt.push(Role::User, question);
    prompt
}
