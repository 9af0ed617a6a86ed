//! RocksDB-backed node store.
//!
//! Column families:
//! - `nodes`    — node records (bincode, LZ4 compressed), keyed by node id
//! - `children` — ownership index, keyed by `<parent:16><created_at:8 BE><child:16>`
//! - `profiles` — collaborator profiles (bincode), keyed by actor id
//!
//! The children index key embeds the creation timestamp big-endian so a
//! forward prefix scan yields children in ascending creation order without
//! a sort. Node create/delete writes the record and its index entry in one
//! atomic `WriteBatch`; cascade deletes walk the index depth-first and land
//! in a single batch.

use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DBCompressionType, DBWithThreadMode,
    IteratorMode, Options, SingleThreaded, WriteBatch, WriteOptions,
};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use inkspace_core::{ActorProfile, DocumentNode, NodeKind, NodePatch};

use super::{check_id, NodeStore, StoreError};

const CF_NODES: &str = "nodes";
const CF_CHILDREN: &str = "children";
const CF_PROFILES: &str = "profiles";

const COLUMN_FAMILIES: &[&str] = &[CF_NODES, CF_CHILDREN, CF_PROFILES];

/// Children index keys: parent id + created_at + child id.
const CHILD_KEY_LEN: usize = 16 + 8 + 16;

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database directory path
    pub path: PathBuf,
    /// Block cache size in bytes (default: 64MB)
    pub block_cache_size: usize,
    /// Bloom filter bits per key (default: 10)
    pub bloom_filter_bits: i32,
    /// fsync on every write (default: false)
    pub sync_writes: bool,
    /// Max open files (default: 512)
    pub max_open_files: i32,
    /// Write buffer size per column family (default: 16MB)
    pub write_buffer_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("inkspace_data"),
            block_cache_size: 64 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 512,
            write_buffer_size: 16 * 1024 * 1024,
        }
    }
}

impl StoreConfig {
    /// Small caches for tests.
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 4 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 64,
            write_buffer_size: 2 * 1024 * 1024,
        }
    }
}

/// RocksDB-backed [`NodeStore`].
pub struct RocksNodeStore {
    /// Single-threaded mode — concurrency is the caller's runtime.
    db: DBWithThreadMode<SingleThreaded>,
    config: StoreConfig,
}

impl RocksNodeStore {
    /// Open (creating if missing) the store at the configured path.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_keep_log_file_num(5);
        db_opts.increase_parallelism(num_cpus());

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(name, &config)))
            .collect();

        let db = DBWithThreadMode::<SingleThreaded>::open_cf_descriptors(
            &db_opts,
            &config.path,
            cf_descriptors,
        )
        .map_err(|e| StoreError::Persistence(e.to_string()))?;

        Ok(Self { db, config })
    }

    fn cf_options(name: &str, config: &StoreConfig) -> Options {
        let mut opts = Options::default();

        let mut block_opts = BlockBasedOptions::default();
        let cache = Cache::new_lru_cache(config.block_cache_size);
        block_opts.set_block_cache(&cache);
        block_opts.set_bloom_filter(config.bloom_filter_bits as f64, false);
        block_opts.set_block_size(16 * 1024);
        opts.set_block_based_table_factory(&block_opts);

        opts.set_compression_type(DBCompressionType::Lz4);
        opts.set_write_buffer_size(config.write_buffer_size);

        match name {
            CF_NODES => {
                // Point lookups dominate: single node fetch per editor open.
                opts.optimize_for_point_lookup(config.block_cache_size as u64);
            }
            CF_CHILDREN => {
                // Prefix-scanned by parent id.
                opts.set_prefix_extractor(rocksdb::SliceTransform::create_fixed_prefix(16));
            }
            CF_PROFILES => {
                opts.optimize_for_point_lookup(config.block_cache_size as u64);
            }
            _ => {}
        }

        opts
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Persistence(format!("Column family '{name}' not found")))
    }

    fn child_key(parent_id: Uuid, created_at: u64, child_id: Uuid) -> Vec<u8> {
        let mut key = Vec::with_capacity(CHILD_KEY_LEN);
        key.extend_from_slice(parent_id.as_bytes());
        key.extend_from_slice(&created_at.to_be_bytes());
        key.extend_from_slice(child_id.as_bytes());
        key
    }

    fn encode_node(node: &DocumentNode) -> Result<Vec<u8>, StoreError> {
        let encoded = bincode::serde::encode_to_vec(node, bincode::config::standard())
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(lz4_flex::compress_prepend_size(&encoded))
    }

    fn decode_node(bytes: &[u8]) -> Result<DocumentNode, StoreError> {
        let raw = lz4_flex::decompress_size_prepended(bytes)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let (node, _) = bincode::serde::decode_from_slice(&raw, bincode::config::standard())
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(node)
    }

    fn load_node(&self, id: Uuid) -> Result<Option<DocumentNode>, StoreError> {
        let cf = self.cf(CF_NODES)?;
        match self
            .db
            .get_cf(&cf, id.as_bytes())
            .map_err(|e| StoreError::Persistence(e.to_string()))?
        {
            Some(bytes) => Ok(Some(Self::decode_node(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Children of `parent_id` via the index, ascending by creation time.
    fn scan_children(&self, parent_id: Uuid) -> Result<Vec<DocumentNode>, StoreError> {
        let cf = self.cf(CF_CHILDREN)?;
        let start_key = Self::child_key(parent_id, 0, Uuid::nil());

        let mut children = Vec::new();
        let iter = self.db.iterator_cf(
            &cf,
            IteratorMode::From(&start_key, rocksdb::Direction::Forward),
        );

        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Persistence(e.to_string()))?;
            if key.len() < CHILD_KEY_LEN || &key[..16] != parent_id.as_bytes() {
                break;
            }
            let child_id = Uuid::from_bytes(
                value
                    .as_ref()
                    .try_into()
                    .map_err(|_| StoreError::Serialization("Invalid child index value".into()))?,
            );
            if let Some(node) = self.load_node(child_id)? {
                children.push(node);
            }
        }

        Ok(children)
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        self.db
            .write_opt(batch, &write_opts)
            .map_err(|e| StoreError::Persistence(e.to_string()))
    }
}

impl NodeStore for RocksNodeStore {
    fn get_node(&self, kind: NodeKind, id: Uuid) -> Result<DocumentNode, StoreError> {
        check_id(id)?;
        match self.load_node(id)? {
            Some(node) if node.kind == kind => Ok(node),
            _ => Err(StoreError::NotFound(format!("{kind} {id}"))),
        }
    }

    fn create_node(&self, node: &DocumentNode) -> Result<(), StoreError> {
        check_id(node.id)?;
        node.validate()
            .map_err(|e| StoreError::Constraint(e.to_string()))?;

        if self.load_node(node.id)?.is_some() {
            return Err(StoreError::Constraint(format!("duplicate id {}", node.id)));
        }
        if let Some(parent_id) = node.parent_id {
            let parent = self
                .load_node(parent_id)?
                .ok_or_else(|| StoreError::Constraint(format!("missing parent {parent_id}")))?;
            if Some(parent.kind) != node.kind.parent_kind() {
                return Err(StoreError::Constraint(format!(
                    "{} cannot own {}",
                    parent.kind, node.kind
                )));
            }
        }

        let cf_nodes = self.cf(CF_NODES)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_nodes, node.id.as_bytes(), Self::encode_node(node)?);
        if let Some(parent_id) = node.parent_id {
            let cf_children = self.cf(CF_CHILDREN)?;
            batch.put_cf(
                &cf_children,
                Self::child_key(parent_id, node.created_at, node.id),
                node.id.as_bytes(),
            );
        }
        self.write_batch(batch)
    }

    fn update_node(&self, patch: &NodePatch, id: Uuid) -> Result<DocumentNode, StoreError> {
        check_id(id)?;
        let mut node = self
            .load_node(id)?
            .ok_or_else(|| StoreError::NotFound(format!("node {id}")))?;

        patch.apply_to(&mut node);

        let cf = self.cf(CF_NODES)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(&cf, node.id.as_bytes(), Self::encode_node(&node)?);
        self.write_batch(batch)?;
        Ok(node)
    }

    fn delete_node(&self, id: Uuid) -> Result<(), StoreError> {
        check_id(id)?;
        let root = self
            .load_node(id)?
            .ok_or_else(|| StoreError::NotFound(format!("node {id}")))?;

        let cf_nodes = self.cf(CF_NODES)?;
        let cf_children = self.cf(CF_CHILDREN)?;
        let mut batch = WriteBatch::default();

        // Depth-first cascade over the children index.
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            batch.delete_cf(&cf_nodes, node.id.as_bytes());
            if let Some(parent_id) = node.parent_id {
                batch.delete_cf(
                    &cf_children,
                    Self::child_key(parent_id, node.created_at, node.id),
                );
            }
            let children = self.scan_children(node.id)?;
            stack.extend(children);
        }

        self.write_batch(batch)
    }

    fn list_children(&self, parent_id: Uuid) -> Result<Vec<DocumentNode>, StoreError> {
        check_id(parent_id)?;
        self.scan_children(parent_id)
    }

    fn actor_profile(&self, actor_id: &str) -> Result<ActorProfile, StoreError> {
        let cf = self.cf(CF_PROFILES)?;
        match self
            .db
            .get_cf(&cf, actor_id.as_bytes())
            .map_err(|e| StoreError::Persistence(e.to_string()))?
        {
            Some(bytes) => {
                let (profile, _) =
                    bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
                        .map_err(|e| StoreError::Serialization(e.to_string()))?;
                Ok(profile)
            }
            None => Err(StoreError::NotFound(format!("profile {actor_id}"))),
        }
    }

    fn put_actor_profile(&self, profile: &ActorProfile) -> Result<(), StoreError> {
        let cf = self.cf(CF_PROFILES)?;
        let encoded = bincode::serde::encode_to_vec(profile, bincode::config::standard())
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.db
            .put_cf(&cf, profile.actor_id.as_bytes(), encoded)
            .map_err(|e| StoreError::Persistence(e.to_string()))
    }
}

/// CPU core count for RocksDB background parallelism.
fn num_cpus() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as i32)
        .unwrap_or(4)
}
