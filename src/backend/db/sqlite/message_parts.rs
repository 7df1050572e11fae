use std::collections::HashMap;

use chrono::Utc;
use rusqlite::{Connection, Row, params, types::Type};
use serde_json::Value;
use uuid::Uuid;

use super::assert_one_row_affected;
use crate::backend::{db::DatabaseError, repo::part_codec::PartRow};

const SELECT_PART_COLUMNS: &str = r#"
p.message_id, p.position, p.part_type,
p.text,
p.reasoning_text,
p.file_media_type, p.file_filename, p.file_url,
p.source_url_source_id, p.source_url_url, p.source_url_title,
p.source_document_source_id, p.source_document_media_type, p.source_document_title, p.source_document_filename,
p.tool_call_id, p.tool_state, p.tool_input, p.tool_output, p.tool_error_text,
p.provider_metadata
"#;

fn json_column(row: &Row, idx: usize) -> Result<Option<Value>, rusqlite::Error> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|text| serde_json::from_str(&text))
        .transpose()
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

fn json_param(value: &Option<Value>) -> Result<Option<String>, DatabaseError> {
    value
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|err| DatabaseError::SqliteQueryError(rusqlite::Error::ToSqlConversionFailure(Box::new(err))))
}

pub fn row_to_part(row: &Row) -> Result<PartRow, rusqlite::Error> {
    Ok(PartRow {
        message_id: row.get(0)?,
        order: row.get(1)?,
        part_type: row.get(2)?,
        text: row.get(3)?,
        reasoning_text: row.get(4)?,
        file_media_type: row.get(5)?,
        file_filename: row.get(6)?,
        file_url: row.get(7)?,
        source_url_source_id: row.get(8)?,
        source_url_url: row.get(9)?,
        source_url_title: row.get(10)?,
        source_document_source_id: row.get(11)?,
        source_document_media_type: row.get(12)?,
        source_document_title: row.get(13)?,
        source_document_filename: row.get(14)?,
        tool_call_id: row.get(15)?,
        tool_state: row.get(16)?,
        tool_input: json_column(row, 17)?,
        tool_output: json_column(row, 18)?,
        tool_error_text: row.get(19)?,
        provider_metadata: json_column(row, 20)?,
    })
}

#[cfg(test)]
pub fn list_parts_by_message(
    conn: &Connection,
    message_id: &str,
) -> Result<Vec<PartRow>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_PART_COLUMNS}
         FROM message_parts p
         WHERE p.message_id = ?1
         ORDER BY p.position ASC"
    ))?;
    let parts = stmt
        .query_map([message_id], row_to_part)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(parts)
}

/// All part rows of a chat grouped by message id, each group ordered by position.
pub fn list_parts_by_chat(
    conn: &Connection,
    chat_id: &str,
) -> Result<HashMap<String, Vec<PartRow>>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_PART_COLUMNS}
         FROM message_parts p
         JOIN messages m ON m.id = p.message_id
         WHERE m.chat_id = ?1
         ORDER BY p.message_id ASC, p.position ASC"
    ))?;

    let mut grouped: HashMap<String, Vec<PartRow>> = HashMap::new();
    for part in stmt.query_map([chat_id], row_to_part)? {
        let part = part?;
        grouped.entry(part.message_id.clone()).or_default().push(part);
    }
    Ok(grouped)
}

pub fn insert_part(conn: &Connection, part: &PartRow) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "INSERT INTO message_parts (
            id, message_id, position, part_type,
            text,
            reasoning_text,
            file_media_type, file_filename, file_url,
            source_url_source_id, source_url_url, source_url_title,
            source_document_source_id, source_document_media_type, source_document_title, source_document_filename,
            tool_call_id, tool_state, tool_input, tool_output, tool_error_text,
            provider_metadata,
            created_at
        )
        VALUES (
            ?1, ?2, ?3, ?4,
            ?5,
            ?6,
            ?7, ?8, ?9,
            ?10, ?11, ?12,
            ?13, ?14, ?15, ?16,
            ?17, ?18, ?19, ?20, ?21,
            ?22,
            ?23
        )",
        params![
            Uuid::new_v4().to_string(),
            &part.message_id,
            &part.order,
            &part.part_type,
            &part.text,
            &part.reasoning_text,
            &part.file_media_type,
            &part.file_filename,
            &part.file_url,
            &part.source_url_source_id,
            &part.source_url_url,
            &part.source_url_title,
            &part.source_document_source_id,
            &part.source_document_media_type,
            &part.source_document_title,
            &part.source_document_filename,
            &part.tool_call_id,
            &part.tool_state,
            json_param(&part.tool_input)?,
            json_param(&part.tool_output)?,
            &part.tool_error_text,
            json_param(&part.provider_metadata)?,
            Utc::now().naive_utc(),
        ],
    )?;
    assert_one_row_affected("insert_part", rows)
}

/// Drops every existing part of the message and inserts `parts` in their place.
/// Callers run this inside the message's transaction.
pub fn replace_parts(
    conn: &Connection,
    message_id: &str,
    parts: &[PartRow],
) -> Result<(), DatabaseError> {
    let removed = conn.execute("DELETE FROM message_parts WHERE message_id = ?1", [message_id])?;
    for part in parts {
        insert_part(conn, part)?;
    }
    log::debug!(
        "replaced {removed} parts with {} parts for message {message_id}",
        parts.len()
    );
    Ok(())
}
