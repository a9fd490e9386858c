//! Code-aware analyzer registration, grounded in the teacher's use of
//! Tantivy's default text analysis for `content`/`file_name`/`file_path`,
//! made explicit here as a named pipeline so it can be reused consistently
//! across every `_text` field in the schema.

use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, TextAnalyzer, TokenizerManager};

pub const CODE_ANALYZER: &str = "code";

pub fn register(manager: &TokenizerManager) {
    let analyzer = TextAnalyzer::builder(SimpleTokenizer::default()).filter(LowerCaser).build();
    manager.register(CODE_ANALYZER, analyzer);
}
