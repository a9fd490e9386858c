//! C5 — the index-alias abstraction. Each repository's searchable content
//! lives in its own physical Tantivy index on disk; an in-memory alias map
//! points every repository id at its current physical index name. `reset`
//! rebuilds a repository in place by allocating a fresh physical index,
//! letting the caller repopulate it, then atomically swapping the alias and
//! deleting the old generation — the teacher's `search.rs` only ever opened
//! one shared `Index` for every repository, which made an isolated rebuild
//! of a single repository impossible without taking the whole index down.

use crate::config::SearchConfig;
use crate::error::IndexError;
use crate::services::search::analyzer;
use crate::services::search::schema::{build_schema, to_tantivy_document, FileDocument, SchemaFields};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, Term};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

const WRITER_HEAP_BYTES: usize = 50_000_000;

pub struct PhysicalIndexHandle {
    pub index: Index,
    pub writer: Arc<Mutex<IndexWriter>>,
    pub reader: IndexReader,
    pub fields: SchemaFields,
}

struct Inner {
    physical: HashMap<String, PhysicalIndexHandle>,
    aliases: HashMap<Uuid, String>,
    generation: HashMap<Uuid, u64>,
}

pub struct IndexManager {
    data_dir: PathBuf,
    index_prefix: String,
    inner: Mutex<Inner>,
}

impl IndexManager {
    pub fn new(config: &SearchConfig) -> Result<Self, IndexError> {
        let data_dir = PathBuf::from(&config.data_dir);
        std::fs::create_dir_all(&data_dir)?;
        Ok(Self {
            data_dir,
            index_prefix: config.index_prefix.clone(),
            inner: Mutex::new(Inner {
                physical: HashMap::new(),
                aliases: HashMap::new(),
                generation: HashMap::new(),
            }),
        })
    }

    fn physical_name(&self, repository_id: Uuid, generation: u64) -> String {
        format!("{}-{}-{}", self.index_prefix, repository_id, generation)
    }

    fn open_or_create(&self, name: &str) -> Result<PhysicalIndexHandle, IndexError> {
        let path = self.data_dir.join(name);
        std::fs::create_dir_all(&path)?;
        let (schema, fields) = build_schema();
        let index = if path.join("meta.json").exists() {
            Index::open_in_dir(&path)?
        } else {
            Index::create_in_dir(&path, schema)?
        };
        analyzer::register(index.tokenizers());
        let writer: IndexWriter = index.writer(WRITER_HEAP_BYTES)?;
        let reader = index.reader_builder().reload_policy(ReloadPolicy::OnCommitWithDelay).try_into()?;
        Ok(PhysicalIndexHandle { index, writer: Arc::new(Mutex::new(writer)), reader, fields })
    }

    async fn ensure_repository(&self, repository_id: Uuid) -> Result<String, IndexError> {
        let mut inner = self.inner.lock().await;
        if let Some(name) = inner.aliases.get(&repository_id) {
            return Ok(name.clone());
        }
        let generation = 0u64;
        let name = self.physical_name(repository_id, generation);
        let handle = self.open_or_create(&name)?;
        inner.physical.insert(name.clone(), handle);
        inner.aliases.insert(repository_id, name.clone());
        inner.generation.insert(repository_id, generation);
        Ok(name)
    }

    /// Upsert a batch into `repository_id`'s currently aliased physical
    /// index. Existing documents sharing a `file_id` are deleted first so a
    /// re-crawl of an unchanged file never produces a duplicate.
    pub async fn upsert_batch(&self, repository_id: Uuid, docs: Vec<FileDocument>) -> Result<(), IndexError> {
        if docs.is_empty() {
            return Ok(());
        }
        let name = self.ensure_repository(repository_id).await?;
        let (writer, fields) = {
            let inner = self.inner.lock().await;
            let handle = inner.physical.get(&name).ok_or(IndexError::NoAlias(repository_id))?;
            (handle.writer.clone(), handle.fields.clone())
        };

        let mut w = writer.lock().await;
        for doc in &docs {
            w.delete_term(Term::from_field_text(fields.file_id, &doc.file_id.to_string()));
        }
        for doc in &docs {
            w.add_document(to_tantivy_document(doc, &fields))?;
        }
        w.commit()?;
        Ok(())
    }

    /// Allocate a new physical index at the next generation, swap the alias
    /// onto it, and delete the previous generation from memory and disk. The
    /// new generation starts empty; the caller repopulates it via
    /// `upsert_batch` before or after calling `reset` as the crawl dictates.
    pub async fn reset(&self, repository_id: Uuid) -> Result<(), IndexError> {
        let (next_generation, old_name) = {
            let inner = self.inner.lock().await;
            let next = inner.generation.get(&repository_id).copied().unwrap_or(0) + 1;
            (next, inner.aliases.get(&repository_id).cloned())
        };
        let new_name = self.physical_name(repository_id, next_generation);
        let handle = self.open_or_create(&new_name)?;

        {
            let mut inner = self.inner.lock().await;
            inner.physical.insert(new_name.clone(), handle);
            inner.aliases.insert(repository_id, new_name.clone());
            inner.generation.insert(repository_id, next_generation);
            if let Some(ref old) = old_name {
                inner.physical.remove(old);
            }
        }

        if let Some(old) = old_name {
            if old != new_name {
                let old_path = self.data_dir.join(&old);
                if let Err(e) = std::fs::remove_dir_all(&old_path) {
                    warn!("failed to remove stale physical index {}: {}", old, e);
                }
            }
        }
        info!("reset index for repository {} -> {}", repository_id, new_name);
        Ok(())
    }

    /// Remove a repository's alias and physical index entirely, used when a
    /// repository is deleted from the registry (C1).
    pub async fn drop_repository(&self, repository_id: Uuid) -> Result<(), IndexError> {
        let removed_name = {
            let mut inner = self.inner.lock().await;
            let name = inner.aliases.remove(&repository_id);
            if let Some(ref n) = name {
                inner.physical.remove(n);
                inner.generation.remove(&repository_id);
            }
            name
        };
        if let Some(name) = removed_name {
            let path = self.data_dir.join(&name);
            if let Err(e) = std::fs::remove_dir_all(&path) {
                warn!("failed to remove physical index {}: {}", name, e);
            }
        }
        Ok(())
    }

    /// Fan out across every physical index currently reachable via an
    /// alias. The read-side counterpart of per-repository write isolation,
    /// used by the query engine (C6) and facet engine (C7) to search or
    /// aggregate across all repositories at once.
    pub async fn readers(&self) -> Vec<(Uuid, IndexReader, SchemaFields)> {
        let inner = self.inner.lock().await;
        inner
            .aliases
            .iter()
            .filter_map(|(repo_id, name)| {
                inner.physical.get(name).map(|h| (*repo_id, h.reader.clone(), h.fields.clone()))
            })
            .collect()
    }

    /// The single physical index for one repository, when a query is scoped
    /// to it.
    pub async fn reader_for(&self, repository_id: Uuid) -> Result<(IndexReader, SchemaFields), IndexError> {
        let inner = self.inner.lock().await;
        let name = inner.aliases.get(&repository_id).ok_or(IndexError::NoAlias(repository_id))?;
        let handle = inner.physical.get(name).ok_or(IndexError::NoAlias(repository_id))?;
        Ok((handle.reader.clone(), handle.fields.clone()))
    }

    pub async fn repository_ids(&self) -> Vec<Uuid> {
        let inner = self.inner.lock().await;
        inner.aliases.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physical_name_is_scoped_by_generation() {
        let cfg = SearchConfig {
            data_dir: "./ignored".into(),
            index_prefix: "codescout".into(),
            alias_name: "codescout-all".into(),
            p_index: 1,
            max_result_window: 10_000,
            max_facet_terms: 200,
            facet_static_ttl_secs: 60,
            max_snippet_fragments: 3,
        };
        let manager = IndexManager { data_dir: PathBuf::from("./ignored"), index_prefix: cfg.index_prefix.clone(), inner: Mutex::new(Inner { physical: HashMap::new(), aliases: HashMap::new(), generation: HashMap::new() }) };
        let id = Uuid::nil();
        assert_eq!(manager.physical_name(id, 0), format!("codescout-{}-0", id));
        assert_ne!(manager.physical_name(id, 0), manager.physical_name(id, 1));
    }
}
