//! Dual-indexed schema: every filterable logical field (`repository`,
//! `project`, `version`, `extension`) gets a `_text` analyzed field for
//! free-text matching and a `_raw` keyword/FAST field for exact filtering
//! and faceting — generalizing the teacher's `search.rs::build_schema`,
//! which only ever declared one field per name and used it for both jobs.

use serde::{Deserialize, Serialize};
use tantivy::schema::{Schema, SchemaBuilder, FAST, STORED, STRING, TEXT};
use uuid::Uuid;

use super::analyzer::CODE_ANALYZER;

#[derive(Debug, Clone)]
pub struct SchemaFields {
    pub file_id: tantivy::schema::Field,
    pub file_name_text: tantivy::schema::Field,
    pub file_name_raw: tantivy::schema::Field,
    pub file_path_text: tantivy::schema::Field,
    pub file_path_raw: tantivy::schema::Field,
    pub content: tantivy::schema::Field,
    pub repository_text: tantivy::schema::Field,
    pub repository_raw: tantivy::schema::Field,
    pub project_text: tantivy::schema::Field,
    pub project_raw: tantivy::schema::Field,
    pub version_text: tantivy::schema::Field,
    pub version_raw: tantivy::schema::Field,
    pub extension_text: tantivy::schema::Field,
    pub extension_raw: tantivy::schema::Field,
}

pub fn build_schema() -> (Schema, SchemaFields) {
    let mut builder: SchemaBuilder = Schema::builder();

    let text_indexed = tantivy::schema::TextOptions::default()
        .set_indexing_options(
            tantivy::schema::TextFieldIndexing::default()
                .set_tokenizer(CODE_ANALYZER)
                .set_index_option(tantivy::schema::IndexRecordOption::WithFreqsAndPositions),
        )
        .set_stored();

    let file_id = builder.add_text_field("file_id", STRING | STORED | FAST);

    let file_name_text = builder.add_text_field("file_name_text", text_indexed.clone());
    let file_name_raw = builder.add_text_field("file_name_raw", STRING | STORED | FAST);

    let file_path_text = builder.add_text_field("file_path_text", text_indexed.clone());
    let file_path_raw = builder.add_text_field("file_path_raw", STRING | STORED | FAST);

    let content = builder.add_text_field("content", text_indexed);

    let repository_text = builder.add_text_field("repository_text", TEXT);
    let repository_raw = builder.add_text_field("repository_raw", STRING | STORED | FAST);

    let project_text = builder.add_text_field("project_text", TEXT);
    let project_raw = builder.add_text_field("project_raw", STRING | STORED | FAST);

    let version_text = builder.add_text_field("version_text", TEXT);
    let version_raw = builder.add_text_field("version_raw", STRING | STORED | FAST);

    let extension_text = builder.add_text_field("extension_text", TEXT);
    let extension_raw = builder.add_text_field("extension_raw", STRING | STORED | FAST);

    let schema = builder.build();
    let fields = SchemaFields {
        file_id,
        file_name_text,
        file_name_raw,
        file_path_text,
        file_path_raw,
        content,
        repository_text,
        repository_raw,
        project_text,
        project_raw,
        version_text,
        version_raw,
        extension_text,
        extension_raw,
    };
    (schema, fields)
}

/// The upsert payload for one file, shared by C4 (pipeline) and C5 (index
/// manager).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDocument {
    pub file_id: Uuid,
    pub file_name: String,
    pub file_path: String,
    pub content: String,
    pub repository: String,
    pub project: String,
    pub version: String,
    pub extension: String,
}

pub fn to_tantivy_document(doc: &FileDocument, fields: &SchemaFields) -> tantivy::TantivyDocument {
    let mut td = tantivy::TantivyDocument::default();
    td.add_text(fields.file_id, doc.file_id.to_string());
    td.add_text(fields.file_name_text, &doc.file_name);
    td.add_text(fields.file_name_raw, &doc.file_name);
    td.add_text(fields.file_path_text, &doc.file_path);
    td.add_text(fields.file_path_raw, &doc.file_path);
    td.add_text(fields.content, &doc.content);
    td.add_text(fields.repository_text, &doc.repository);
    td.add_text(fields.repository_raw, &doc.repository);
    td.add_text(fields.project_text, &doc.project);
    td.add_text(fields.project_raw, &doc.project);
    td.add_text(fields.version_text, &doc.version);
    td.add_text(fields.version_raw, &doc.version);
    let extension_value = if doc.extension.is_empty() { "empty" } else { &doc.extension };
    td.add_text(fields.extension_text, extension_value);
    td.add_text(fields.extension_raw, extension_value);
    td
}
