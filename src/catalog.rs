//! Table registry: maps table ids to their storage files and schemas.
//!
//! Tables created through [`Catalog::create_table`] live in the catalog's data directory
//! as `<name>.dat`, and their definitions are persisted to `catalog.bin` so that
//! [`Catalog::open`] can find them again. Tables registered with
//! [`Catalog::add_table`] are only known for the lifetime of the process.

use crate::access::schema::Schema;
use crate::error::{DbError, DbResult};
use crate::storage::file::{HeapFile, StorageFile};
use crate::storage::page::PageLayout;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub type TableId = u32;

pub const CATALOG_FILE_NAME: &str = "catalog.bin";

/// Persisted description of a table created by the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TableDef {
    table_id: TableId,
    name: String,
    file_name: String,
    schema: Schema,
}

struct TableEntry {
    name: String,
    file: Arc<dyn StorageFile>,
    /// Set for tables the catalog created itself and therefore persists.
    file_name: Option<String>,
}

pub struct Catalog {
    data_dir: Option<PathBuf>,
    page_size: usize,
    tables: DashMap<TableId, TableEntry>,
    names: DashMap<String, TableId>,
    next_table_id: AtomicU32,
}

impl Catalog {
    /// An in-memory registry; tables must be supplied through `add_table`.
    pub fn new(page_size: usize) -> Self {
        Self {
            data_dir: None,
            page_size,
            tables: DashMap::new(),
            names: DashMap::new(),
            next_table_id: AtomicU32::new(1),
        }
    }

    /// Opens the catalog stored in `data_dir`, creating the directory if needed, and
    /// reopens every table it lists.
    pub fn open(data_dir: &Path, page_size: usize) -> DbResult<Self> {
        std::fs::create_dir_all(data_dir)?;
        let mut catalog = Self::new(page_size);
        catalog.data_dir = Some(data_dir.to_path_buf());

        let catalog_path = data_dir.join(CATALOG_FILE_NAME);
        if !catalog_path.exists() {
            info!("initialized empty catalog in {:?}", data_dir);
            return Ok(catalog);
        }

        let defs: Vec<TableDef> = bincode::deserialize(&std::fs::read(&catalog_path)?)?;
        let mut max_id = 0;
        for def in defs {
            let file = HeapFile::open(
                def.table_id,
                &data_dir.join(&def.file_name),
                Arc::new(def.schema),
                page_size,
            )?;
            max_id = max_id.max(def.table_id);
            catalog.register(Arc::new(file), def.name, Some(def.file_name))?;
        }
        catalog.next_table_id.store(max_id + 1, Ordering::SeqCst);
        info!("loaded {} tables from {:?}", catalog.tables.len(), catalog_path);
        Ok(catalog)
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// Hands out an id no registered table uses.
    pub fn next_table_id(&self) -> TableId {
        loop {
            let id = self.next_table_id.fetch_add(1, Ordering::SeqCst);
            if !self.tables.contains_key(&id) {
                return id;
            }
        }
    }

    /// Creates a heap file for a new table and persists the catalog.
    pub fn create_table(&self, name: &str, schema: Schema) -> DbResult<TableId> {
        let data_dir = self.data_dir.as_ref().ok_or_else(|| {
            DbError::Catalog("an in-memory catalog cannot create tables".to_string())
        })?;
        validate_table_name(name)?;
        check_fits(name, &schema, self.page_size)?;
        if self.names.contains_key(name) {
            return Err(DbError::DuplicateTable(name.to_string()));
        }
        let file_name = format!("{name}.dat");
        let table_id = self.next_table_id();
        let file = HeapFile::open(
            table_id,
            &data_dir.join(&file_name),
            Arc::new(schema),
            self.page_size,
        )?;
        self.register(Arc::new(file), name.to_string(), Some(file_name))?;
        self.persist()?;
        info!("created table '{}' with id {}", name, table_id);
        Ok(table_id)
    }

    /// Registers an existing storage file under `name`.
    pub fn add_table(&self, file: Arc<dyn StorageFile>, name: &str) -> DbResult<()> {
        self.register(file, name.to_string(), None)
    }

    fn register(
        &self,
        file: Arc<dyn StorageFile>,
        name: String,
        file_name: Option<String>,
    ) -> DbResult<()> {
        let table_id = file.id();
        if file.page_size() != self.page_size {
            return Err(DbError::Catalog(format!(
                "table '{}' uses {} byte pages, catalog uses {}",
                name,
                file.page_size(),
                self.page_size
            )));
        }
        check_fits(&name, file.schema(), file.page_size())?;
        match self.names.entry(name.clone()) {
            Entry::Occupied(_) => Err(DbError::DuplicateTable(name)),
            Entry::Vacant(slot) => {
                if self.tables.contains_key(&table_id) {
                    return Err(DbError::Catalog(format!(
                        "table id {table_id} is already registered"
                    )));
                }
                self.tables.insert(
                    table_id,
                    TableEntry {
                        name,
                        file,
                        file_name,
                    },
                );
                slot.insert(table_id);
                Ok(())
            }
        }
    }

    pub fn storage_file(&self, table_id: TableId) -> DbResult<Arc<dyn StorageFile>> {
        self.tables
            .get(&table_id)
            .map(|entry| entry.file.clone())
            .ok_or(DbError::UnknownTable(table_id))
    }

    pub fn schema_of(&self, table_id: TableId) -> DbResult<Arc<Schema>> {
        Ok(self.storage_file(table_id)?.schema().clone())
    }

    pub fn table_id(&self, name: &str) -> Option<TableId> {
        self.names.get(name).map(|id| *id)
    }

    pub fn table_name(&self, table_id: TableId) -> Option<String> {
        self.tables.get(&table_id).map(|entry| entry.name.clone())
    }

    pub fn table_ids(&self) -> Vec<TableId> {
        let mut ids: Vec<TableId> = self.tables.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Writes the definitions of catalog-created tables to `catalog.bin`.
    fn persist(&self) -> DbResult<()> {
        let Some(data_dir) = &self.data_dir else {
            return Ok(());
        };

        let mut defs: Vec<TableDef> = self
            .tables
            .iter()
            .filter_map(|entry| {
                entry.file_name.as_ref().map(|file_name| TableDef {
                    table_id: *entry.key(),
                    name: entry.name.clone(),
                    file_name: file_name.clone(),
                    schema: entry.file.schema().as_ref().clone(),
                })
            })
            .collect();
        defs.sort_by_key(|def| def.table_id);

        let tmp = data_dir.join(format!("{CATALOG_FILE_NAME}.tmp"));
        std::fs::write(&tmp, bincode::serialize(&defs)?)?;
        std::fs::rename(&tmp, data_dir.join(CATALOG_FILE_NAME))?;
        debug!("persisted {} table definitions", defs.len());
        Ok(())
    }
}

/// Table names become file names, so they may not step outside the data directory.
fn validate_table_name(name: &str) -> DbResult<()> {
    let bad = name.is_empty()
        || name.contains("..")
        || name.chars().any(|c| c == '/' || c == '\\' || c == '\0');
    if bad {
        return Err(DbError::Catalog(format!("invalid table name '{}'", name)));
    }
    Ok(())
}

/// Rejects schemas whose tuples leave no room for a single slot on a page.
fn check_fits(name: &str, schema: &Schema, page_size: usize) -> DbResult<()> {
    let layout = PageLayout::new(page_size, schema.byte_size());
    if layout.num_slots() == 0 {
        return Err(DbError::Catalog(format!(
            "table '{}': {} byte tuples do not fit in {} byte pages",
            name,
            schema.byte_size(),
            page_size
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::schema::Column;
    use crate::access::value::FieldType;
    use anyhow::Result;
    use tempfile::tempdir;

    fn schema() -> Schema {
        Schema::new(vec![
            Column::new("id", FieldType::Int),
            Column::new("name", FieldType::Str),
        ])
        .unwrap()
    }

    #[test]
    fn test_create_and_lookup() -> Result<()> {
        let dir = tempdir()?;
        let catalog = Catalog::open(dir.path(), 4096)?;
        let id = catalog.create_table("users", schema())?;

        assert_eq!(catalog.table_id("users"), Some(id));
        assert_eq!(catalog.table_name(id).as_deref(), Some("users"));
        assert_eq!(*catalog.schema_of(id)?, schema());
        assert_eq!(catalog.storage_file(id)?.id(), id);
        assert!(dir.path().join("users.dat").exists());
        Ok(())
    }

    #[test]
    fn test_duplicate_name() -> Result<()> {
        let dir = tempdir()?;
        let catalog = Catalog::open(dir.path(), 4096)?;
        catalog.create_table("users", schema())?;
        assert!(matches!(
            catalog.create_table("users", schema()),
            Err(DbError::DuplicateTable(_))
        ));
        Ok(())
    }

    #[test]
    fn test_unknown_table() {
        let catalog = Catalog::new(4096);
        assert!(matches!(
            catalog.storage_file(42),
            Err(DbError::UnknownTable(42))
        ));
        assert!(catalog.schema_of(42).is_err());
        assert_eq!(catalog.table_id("nope"), None);
    }

    #[test]
    fn test_in_memory_catalog_cannot_create() {
        let catalog = Catalog::new(4096);
        assert!(catalog.create_table("t", schema()).is_err());
    }

    #[test]
    fn test_reopen_restores_tables() -> Result<()> {
        let dir = tempdir()?;
        let (a, b) = {
            let catalog = Catalog::open(dir.path(), 1024)?;
            let a = catalog.create_table("a", schema())?;
            let b = catalog.create_table("b", Schema::from_types(&[FieldType::Int])?)?;
            (a, b)
        };

        let catalog = Catalog::open(dir.path(), 1024)?;
        assert_eq!(catalog.table_ids(), vec![a, b]);
        assert_eq!(catalog.table_id("b"), Some(b));
        assert_eq!(catalog.schema_of(b)?.num_fields(), 1);
        // Names survive even though equality ignores them.
        assert_eq!(catalog.schema_of(a)?.columns()[1].name, "name");

        let c = catalog.create_table("c", schema())?;
        assert!(c > b);
        Ok(())
    }

    #[test]
    fn test_add_table_checks_page_size() -> Result<()> {
        let dir = tempdir()?;
        let file = HeapFile::open(7, &dir.path().join("x.dat"), Arc::new(schema()), 512)?;
        let catalog = Catalog::new(4096);
        assert!(catalog.add_table(Arc::new(file), "x").is_err());
        Ok(())
    }

    fn wide_schema(columns: usize) -> Result<Schema> {
        Ok(Schema::from_types(&vec![FieldType::Str; columns])?)
    }

    #[test]
    fn test_create_rejects_tuple_wider_than_page() -> Result<()> {
        let dir = tempdir()?;
        let catalog = Catalog::open(dir.path(), 4096)?;
        // 32 string columns need 4224 bytes per tuple.
        assert!(matches!(
            catalog.create_table("wide", wide_schema(32)?),
            Err(DbError::Catalog(_))
        ));
        assert_eq!(catalog.table_id("wide"), None);
        assert!(!dir.path().join("wide.dat").exists());

        // One column less fits exactly one tuple per page.
        catalog.create_table("narrower", wide_schema(31)?)?;
        Ok(())
    }

    #[test]
    fn test_add_table_rejects_tuple_wider_than_page() -> Result<()> {
        let dir = tempdir()?;
        let file = HeapFile::open(3, &dir.path().join("w.dat"), Arc::new(wide_schema(4)?), 512)?;
        let catalog = Catalog::new(512);
        assert!(matches!(
            catalog.add_table(Arc::new(file), "w"),
            Err(DbError::Catalog(_))
        ));
        assert!(catalog.table_ids().is_empty());
        Ok(())
    }

    #[test]
    fn test_reject_path_like_names() -> Result<()> {
        let dir = tempdir()?;
        let catalog = Catalog::open(dir.path(), 4096)?;
        for name in ["", "..", "../escape", "a/b", "a\\b", "x..y"] {
            assert!(
                matches!(catalog.create_table(name, schema()), Err(DbError::Catalog(_))),
                "accepted {:?}",
                name
            );
        }
        assert!(catalog.table_ids().is_empty());
        assert!(!dir.path().parent().unwrap().join("escape.dat").exists());
        catalog.create_table("users_2", schema())?;
        Ok(())
    }
}
