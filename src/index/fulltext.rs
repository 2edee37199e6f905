//! The full-text index (C5): an opaque full-text engine wrapper around
//! `tantivy`. Ranking, tokenization and storage format are intentionally
//! unspecified beyond "tests assert `search(q)` returns ids for which the
//! engine reports a hit" (spec §4.5).

use parking_lot::Mutex;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, STORED, STRING, Schema, TEXT, Value as TantivyValue};
use tantivy::{Index, IndexReader, IndexWriter, TantivyDocument, Term};

use crate::errors::{PageError, Result};

pub struct FullTextIndex {
    index: Index,
    writer: Mutex<IndexWriter>,
    reader: IndexReader,
    id_field: Field,
    body_field: Field,
}

impl FullTextIndex {
    /// Open (or create) a tantivy index at `dir`.
    ///
    /// # Errors
    /// Returns [`PageError::Index`] if tantivy fails to open or create the
    /// index at `dir`.
    pub fn open_or_create(dir: &std::path::Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let mut schema_builder = Schema::builder();
        let id_field = schema_builder.add_text_field("id", STRING | STORED);
        let body_field = schema_builder.add_text_field("body", TEXT);
        let schema = schema_builder.build();

        let mmap_dir = tantivy::directory::MmapDirectory::open(dir).map_err(|e| PageError::Index(e.to_string()))?;
        let index = Index::open_or_create(mmap_dir, schema).map_err(|e| PageError::Index(e.to_string()))?;
        let writer: IndexWriter = index.writer(50_000_000).map_err(|e| PageError::Index(e.to_string()))?;
        let reader = index.reader().map_err(|e| PageError::Index(e.to_string()))?;
        Ok(Self { index, writer: Mutex::new(writer), reader, id_field, body_field })
    }

    /// Insert or replace the document for `id`. `document` is the derived
    /// indexable text (body + selected front-matter fields such as title,
    /// description).
    ///
    /// # Errors
    /// Returns [`PageError::Index`] if the commit fails.
    pub fn upsert(&self, id: &str, document: &str) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.delete_term(Term::from_field_text(self.id_field, id));
        let mut doc = TantivyDocument::default();
        doc.add_text(self.id_field, id);
        doc.add_text(self.body_field, document);
        writer.add_document(doc).map_err(|e| PageError::Index(e.to_string()))?;
        writer.commit().map_err(|e| PageError::Index(e.to_string()))?;
        self.reader.reload().map_err(|e| PageError::Index(e.to_string()))?;
        Ok(())
    }

    /// Remove the document for `id`, if present.
    ///
    /// # Errors
    /// Returns [`PageError::Index`] if the commit fails.
    pub fn remove(&self, id: &str) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.delete_term(Term::from_field_text(self.id_field, id));
        writer.commit().map_err(|e| PageError::Index(e.to_string()))?;
        self.reader.reload().map_err(|e| PageError::Index(e.to_string()))?;
        Ok(())
    }

    /// Ids for which `query` reports a hit, best matches first.
    ///
    /// # Errors
    /// Returns [`PageError::Index`] if the query cannot be parsed or
    /// executed.
    pub fn search(&self, query: &str) -> Result<Vec<String>> {
        let searcher = self.reader.searcher();
        let parser = QueryParser::for_index(&self.index, vec![self.body_field]);
        let parsed = parser.parse_query(query).map_err(|e| PageError::Index(e.to_string()))?;
        let hits = searcher.search(&parsed, &TopDocs::with_limit(100)).map_err(|e| PageError::Index(e.to_string()))?;
        let mut out = Vec::with_capacity(hits.len());
        for (_score, addr) in hits {
            let doc: TantivyDocument = searcher.doc(addr).map_err(|e| PageError::Index(e.to_string()))?;
            if let Some(id) = doc.get_first(self.id_field).and_then(TantivyValue::as_str) {
                out.push(id.to_string());
            }
        }
        Ok(out)
    }
}
