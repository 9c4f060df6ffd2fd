//! Dataset types, loading, and parallel map/filter.
//!
//! A [`Dataset`] is an ordered list of [`Row`]s. Each row keeps its original
//! JSON columns untouched and stores token columns produced by tokenization
//! separately, keyed by [`Field`]. A [`DatasetDict`] holds named splits in
//! insertion order.
//!
//! [`Dataset::map`] and [`Dataset::filter`] run on a rayon pool sized by
//! [`ExecOptions::num_proc`]. Output order always matches input order.

use crate::cache::TransformCache;
use crate::chat_templates::Message;
use crate::fields::Field;
use dsproc_core::{DatasetConfig, DsprocError, Result};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::{Arc, OnceLock};

/// A single dataset row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    columns: Map<String, Value>,
    #[serde(default)]
    tokens: BTreeMap<Field, Vec<u32>>,
}

impl Row {
    /// Create a row from its original columns.
    pub fn new(columns: Map<String, Value>) -> Self {
        Self {
            columns,
            tokens: BTreeMap::new(),
        }
    }

    /// Create a row from a JSON object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(columns) => Ok(Self::new(columns)),
            other => Err(DsprocError::Serialization(format!(
                "expected a JSON object per row, got {}",
                other
            ))),
        }
    }

    /// Original column by name.
    pub fn column(&self, key: &str) -> Option<&Value> {
        self.columns.get(key)
    }

    /// All original columns.
    pub fn columns(&self) -> &Map<String, Value> {
        &self.columns
    }

    /// Parse a column as a conversation.
    ///
    /// `index` is only used for error messages.
    pub fn conversation(&self, key: &str, index: usize) -> Result<Vec<Message>> {
        let value = self.column(key).ok_or_else(|| DsprocError::MissingField {
            field: key.to_string(),
            row: index,
        })?;
        Vec::<Message>::deserialize(value).map_err(|e| {
            DsprocError::Serialization(format!("row {}: column '{}': {}", index, key, e))
        })
    }

    /// Token column, if present.
    pub fn tokens(&self, field: Field) -> Option<&[u32]> {
        self.tokens.get(&field).map(Vec::as_slice)
    }

    /// Token column, failing with [`DsprocError::MissingField`] if absent.
    pub fn require_tokens(&self, field: Field, index: usize) -> Result<&[u32]> {
        self.tokens(field).ok_or_else(|| DsprocError::MissingField {
            field: field.key().to_string(),
            row: index,
        })
    }

    /// Set a token column, replacing any previous value.
    pub fn set_tokens(&mut self, field: Field, ids: Vec<u32>) {
        self.tokens.insert(field, ids);
    }

    /// Builder-style [`Row::set_tokens`].
    pub fn with_tokens(mut self, field: Field, ids: Vec<u32>) -> Self {
        self.set_tokens(field, ids);
        self
    }

    /// Set an id column and its all-ones attention mask.
    pub fn with_masked_tokens(mut self, field: Field, ids: Vec<u32>) -> Self {
        if let Some(mask_field) = field.attention_mask() {
            self.set_tokens(mask_field, vec![1; ids.len()]);
        }
        self.set_tokens(field, ids);
        self
    }
}

/// Execution settings for map and filter.
///
/// The worker pool is built on first parallel use and shared by clones.
#[derive(Debug, Clone)]
pub struct ExecOptions {
    num_proc: usize,
    cache: Option<TransformCache>,
    load_from_cache_file: bool,
    pool: Arc<OnceLock<ThreadPool>>,
}

impl ExecOptions {
    /// Single-threaded, uncached execution.
    pub fn sequential() -> Self {
        Self {
            num_proc: 1,
            cache: None,
            load_from_cache_file: false,
            pool: Arc::default(),
        }
    }

    /// Execution settings derived from a dataset configuration.
    pub fn from_config(config: &DatasetConfig) -> Self {
        Self {
            num_proc: config.num_proc(),
            cache: config.cache_dir().map(TransformCache::new),
            load_from_cache_file: config.load_from_cache_file(),
            pool: Arc::default(),
        }
    }

    /// Use `num_proc` worker threads.
    pub fn with_num_proc(mut self, num_proc: usize) -> Self {
        self.num_proc = num_proc;
        self.pool = Arc::default();
        self
    }

    /// Persist results in `cache`, reusing them when `load_from_cache_file`.
    pub fn with_cache(mut self, cache: TransformCache, load_from_cache_file: bool) -> Self {
        self.cache = Some(cache);
        self.load_from_cache_file = load_from_cache_file;
        self
    }

    /// Worker threads.
    pub fn num_proc(&self) -> usize {
        self.num_proc
    }

    /// Where results are persisted, if anywhere.
    pub fn cache(&self) -> Option<&TransformCache> {
        self.cache.as_ref()
    }

    /// Whether persisted results may be reused.
    pub fn load_from_cache_file(&self) -> bool {
        self.load_from_cache_file
    }

    fn pool(&self) -> Result<&ThreadPool> {
        if let Some(pool) = self.pool.get() {
            return Ok(pool);
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.num_proc)
            .build()
            .map_err(|e| DsprocError::InvalidArgument(format!("thread pool: {}", e)))?;
        Ok(self.pool.get_or_init(|| pool))
    }

    fn cache_key(&self, transform: &str, rows: &[Row]) -> Result<Option<String>> {
        self.cache
            .as_ref()
            .map(|cache| cache.key(transform, rows))
            .transpose()
    }

    fn load_cached<T: serde::de::DeserializeOwned>(&self, key: Option<&str>) -> Result<Option<T>> {
        match (&self.cache, key) {
            (Some(cache), Some(key)) if self.load_from_cache_file => cache.load(key),
            _ => Ok(None),
        }
    }

    fn store_cached<T: Serialize>(&self, key: Option<&str>, value: &T) -> Result<()> {
        match (&self.cache, key) {
            (Some(cache), Some(key)) => cache.store(key, value),
            _ => Ok(()),
        }
    }

    /// Run `op` over `items` in order, on the pool when `num_proc > 1`.
    fn run<I, O, F>(&self, items: Vec<I>, op: F) -> Result<Vec<O>>
    where
        I: Send,
        O: Send,
        F: Fn(usize, I) -> Result<O> + Sync + Send,
    {
        if self.num_proc <= 1 {
            return items
                .into_iter()
                .enumerate()
                .map(|(index, item)| op(index, item))
                .collect();
        }

        self.pool()?.install(|| {
            items
                .into_par_iter()
                .enumerate()
                .map(|(index, item)| op(index, item))
                .collect()
        })
    }
}

impl PartialEq for ExecOptions {
    fn eq(&self, other: &Self) -> bool {
        self.num_proc == other.num_proc
            && self.cache == other.cache
            && self.load_from_cache_file == other.load_from_cache_file
    }
}

impl Eq for ExecOptions {}

impl Default for ExecOptions {
    fn default() -> Self {
        Self::sequential()
    }
}

/// An ordered collection of rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    rows: Vec<Row>,
}

impl Dataset {
    /// Create a new empty dataset.
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    /// Create a dataset from rows.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    /// Create a dataset from JSON objects.
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Result<Self> {
        let rows = values
            .into_iter()
            .map(Row::from_value)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rows })
    }

    /// Load a dataset from a JSONL file, one object per non-blank line.
    pub fn from_jsonl<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            DsprocError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to open dataset file {}: {}", path.as_ref().display(), e),
            ))
        })?;

        let reader = BufReader::new(file);
        let mut rows = Vec::new();

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result.map_err(|e| {
                DsprocError::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to read line {}: {}", line_num + 1, e),
                ))
            })?;

            if line.trim().is_empty() {
                continue;
            }

            let value: Value = serde_json::from_str(&line).map_err(|e| {
                DsprocError::Serialization(format!("Line {}: {}", line_num + 1, e))
            })?;
            let row = Row::from_value(value).map_err(|e| {
                DsprocError::Serialization(format!("Line {}: {}", line_num + 1, e))
            })?;
            rows.push(row);
        }

        Ok(Self { rows })
    }

    /// Get the number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the dataset is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Get a row by index.
    pub fn get(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    /// Get all rows.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Keep the rows at `indices`, in the order given.
    pub fn select(self, indices: impl IntoIterator<Item = usize>) -> Result<Self> {
        let len = self.rows.len();
        let mut slots: Vec<Option<Row>> = self.rows.into_iter().map(Some).collect();
        let mut rows = Vec::new();
        for index in indices {
            let slot = slots.get_mut(index).ok_or_else(|| {
                DsprocError::InvalidArgument(format!(
                    "index {} out of range for dataset of {} rows",
                    index, len
                ))
            })?;
            let row = slot.take().ok_or_else(|| {
                DsprocError::InvalidArgument(format!("index {} selected twice", index))
            })?;
            rows.push(row);
        }
        Ok(Self { rows })
    }

    /// Sequence length of `field` for every row.
    pub fn column_lengths(&self, field: Field) -> Result<Vec<usize>> {
        self.rows
            .iter()
            .enumerate()
            .map(|(index, row)| row.require_tokens(field, index).map(<[u32]>::len))
            .collect()
    }

    /// Apply a row transform.
    ///
    /// `transform` identifies the operation and everything it depends on; it
    /// is part of the cache key.
    pub fn map<F>(self, transform: &str, f: F, exec: &ExecOptions) -> Result<Self>
    where
        F: Fn(usize, Row) -> Result<Row> + Sync + Send,
    {
        let key = exec.cache_key(transform, &self.rows)?;
        if let Some(rows) = exec.load_cached::<Vec<Row>>(key.as_deref())? {
            return Ok(Self { rows });
        }

        let rows = exec.run(self.rows, f)?;
        exec.store_cached(key.as_deref(), &rows)?;
        Ok(Self { rows })
    }

    /// Keep rows for which `predicate` holds.
    pub fn filter<P>(self, transform: &str, predicate: P, exec: &ExecOptions) -> Result<Self>
    where
        P: Fn(usize, &Row) -> Result<bool> + Sync + Send,
    {
        let key = exec.cache_key(transform, &self.rows)?;
        let kept = match exec.load_cached::<Vec<usize>>(key.as_deref())? {
            Some(kept) => kept,
            None => {
                let rows: Vec<&Row> = self.rows.iter().collect();
                let keep = exec.run(rows, |index, row| predicate(index, row))?;
                let kept: Vec<usize> = keep
                    .into_iter()
                    .enumerate()
                    .filter_map(|(index, keep)| keep.then_some(index))
                    .collect();
                exec.store_cached(key.as_deref(), &kept)?;
                kept
            }
        };
        self.select(kept)
    }
}

impl IntoIterator for Dataset {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

impl FromIterator<Row> for Dataset {
    fn from_iter<I: IntoIterator<Item = Row>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

/// Named dataset splits, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetDict {
    splits: Vec<(String, Dataset)>,
}

impl DatasetDict {
    /// Create an empty dictionary.
    pub fn new() -> Self {
        Self { splits: Vec::new() }
    }

    /// Add or replace a split. Replacing keeps the split's position.
    pub fn insert(&mut self, name: impl Into<String>, dataset: Dataset) {
        let name = name.into();
        match self.splits.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = dataset,
            None => self.splits.push((name, dataset)),
        }
    }

    /// Builder-style [`DatasetDict::insert`].
    pub fn with_split(mut self, name: impl Into<String>, dataset: Dataset) -> Self {
        self.insert(name, dataset);
        self
    }

    /// Split by name.
    pub fn get(&self, name: &str) -> Option<&Dataset> {
        self.splits.iter().find(|(n, _)| n == name).map(|(_, d)| d)
    }

    /// Mutable split by name.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Dataset> {
        self.splits
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, d)| d)
    }

    /// Number of splits.
    pub fn len(&self) -> usize {
        self.splits.len()
    }

    /// Whether there are no splits.
    pub fn is_empty(&self) -> bool {
        self.splits.is_empty()
    }

    /// Split names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.splits.iter().map(|(n, _)| n.as_str())
    }

    /// Splits in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Dataset)> {
        self.splits.iter().map(|(n, d)| (n.as_str(), d))
    }

    /// Mutable splits in order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Dataset)> {
        self.splits.iter_mut().map(|(n, d)| (n.as_str(), d))
    }
}

impl IntoIterator for DatasetDict {
    type Item = (String, Dataset);
    type IntoIter = std::vec::IntoIter<(String, Dataset)>;

    fn into_iter(self) -> Self::IntoIter {
        self.splits.into_iter()
    }
}

/// Either a single [`Dataset`] or a [`DatasetDict`], processed split by split.
///
/// A lone dataset is one unnamed split.
pub trait Splits: Sized {
    /// Replace every split with `f(name, split)`, stopping at the first error.
    fn try_map_splits<F>(self, f: F) -> Result<Self>
    where
        F: FnMut(Option<&str>, Dataset) -> Result<Dataset>;

    /// Every split with its name.
    fn split_views(&self) -> Vec<(Option<&str>, &Dataset)>;
}

impl Splits for Dataset {
    fn try_map_splits<F>(self, mut f: F) -> Result<Self>
    where
        F: FnMut(Option<&str>, Dataset) -> Result<Dataset>,
    {
        f(None, self)
    }

    fn split_views(&self) -> Vec<(Option<&str>, &Dataset)> {
        vec![(None, self)]
    }
}

impl Splits for DatasetDict {
    fn try_map_splits<F>(self, mut f: F) -> Result<Self>
    where
        F: FnMut(Option<&str>, Dataset) -> Result<Dataset>,
    {
        let splits = self
            .splits
            .into_iter()
            .map(|(name, dataset)| {
                let mapped = f(Some(&name), dataset)?;
                Ok((name, mapped))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { splits })
    }

    fn split_views(&self) -> Vec<(Option<&str>, &Dataset)> {
        self.splits
            .iter()
            .map(|(name, dataset)| (Some(name.as_str()), dataset))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn numbered(n: usize) -> Dataset {
        Dataset::from_values((0..n).map(|i| json!({ "id": i }))).unwrap()
    }

    fn ids(dataset: &Dataset) -> Vec<u64> {
        dataset
            .rows()
            .iter()
            .map(|row| row.column("id").and_then(Value::as_u64).unwrap())
            .collect()
    }

    #[test]
    fn test_row_from_non_object_fails() {
        assert!(Row::from_value(json!([1, 2])).is_err());
    }

    #[test]
    fn test_masked_tokens() {
        let row = Row::default().with_masked_tokens(Field::InputIdsChosen, vec![5, 6, 7]);
        assert_eq!(row.tokens(Field::InputIdsChosen), Some(&[5, 6, 7][..]));
        assert_eq!(row.tokens(Field::AttentionMaskChosen), Some(&[1, 1, 1][..]));

        let row = Row::default().with_masked_tokens(Field::InputIds, vec![5]);
        assert_eq!(row.tokens(Field::InputIds), Some(&[5][..]));
        assert!(row.tokens(Field::AttentionMaskPrompt).is_none());
    }

    #[test]
    fn test_conversation_parsing() {
        let row = Row::from_value(json!({
            "messages": [{"role": "user", "content": "hi"}],
            "bad": [{"role": "robot", "content": "x"}]
        }))
        .unwrap();

        assert_eq!(row.conversation("messages", 0).unwrap(), vec![Message::user("hi")]);
        assert!(matches!(
            row.conversation("missing", 3),
            Err(DsprocError::MissingField { row: 3, .. })
        ));
        assert!(matches!(
            row.conversation("bad", 0),
            Err(DsprocError::Serialization(_))
        ));
    }

    #[test]
    fn test_jsonl_loading_skips_blank_lines() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"id": 0}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"id": 1}}"#).unwrap();

        let dataset = Dataset::from_jsonl(file.path()).unwrap();
        assert_eq!(ids(&dataset), vec![0, 1]);
    }

    #[test]
    fn test_jsonl_reports_line_number() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"id": 0}}"#).unwrap();
        writeln!(file, "not json").unwrap();

        let err = Dataset::from_jsonl(file.path()).unwrap_err().to_string();
        assert!(err.contains("Line 2"), "{err}");
    }

    #[test]
    fn test_select_out_of_range() {
        assert!(numbered(3).select([0, 3]).is_err());
        assert!(numbered(3).select([1, 1]).is_err());
        assert_eq!(ids(&numbered(5).select(0..2).unwrap()), vec![0, 1]);
    }

    #[test]
    fn test_parallel_map_preserves_order() {
        let exec = ExecOptions::sequential().with_num_proc(4);
        let mapped = numbered(200)
            .map(
                "tag",
                |index, row| Ok(row.with_tokens(Field::InputIds, vec![index as u32])),
                &exec,
            )
            .unwrap();

        assert_eq!(ids(&mapped), (0..200).collect::<Vec<_>>());
        for (index, row) in mapped.rows().iter().enumerate() {
            assert_eq!(row.tokens(Field::InputIds), Some(&[index as u32][..]));
        }
    }

    #[test]
    fn test_parallel_filter_preserves_order() {
        let exec = ExecOptions::sequential().with_num_proc(3);
        let kept = numbered(100)
            .filter("odd", |index, _| Ok(index % 2 == 1), &exec)
            .unwrap();
        assert_eq!(ids(&kept), (0..100).filter(|i| i % 2 == 1).collect::<Vec<_>>());
    }

    #[test]
    fn test_pool_is_built_once_and_shared() {
        let exec = ExecOptions::sequential().with_num_proc(2);
        let first: *const ThreadPool = exec.pool().unwrap();

        let mapped = numbered(10)
            .map("noop", |_, row| Ok(row), &exec)
            .unwrap()
            .filter("all", |_, _| Ok(true), &exec)
            .unwrap();
        assert_eq!(mapped.len(), 10);

        assert!(std::ptr::eq(first, exec.pool().unwrap()));
        assert!(std::ptr::eq(first, exec.clone().pool().unwrap()));
        assert_eq!(exec.pool().unwrap().current_num_threads(), 2);

        let resized = exec.with_num_proc(3);
        assert_eq!(resized.pool().unwrap().current_num_threads(), 3);
    }

    #[test]
    fn test_map_error_propagates() {
        let result = numbered(10).map(
            "fail",
            |index, row| {
                if index == 7 {
                    Err(DsprocError::InvalidArgument("boom".into()))
                } else {
                    Ok(row)
                }
            },
            &ExecOptions::sequential().with_num_proc(2),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_cached_map_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let exec = ExecOptions::sequential().with_cache(TransformCache::new(dir.path()), true);

        let first = numbered(4)
            .map("len", |_, row| Ok(row.with_tokens(Field::InputIds, vec![1])), &exec)
            .unwrap();
        // Same transform id, different closure: a hit must return the stored rows.
        let second = numbered(4)
            .map("len", |_, row| Ok(row.with_tokens(Field::InputIds, vec![9])), &exec)
            .unwrap();
        assert_eq!(first, second);

        let uncached = ExecOptions::sequential().with_cache(TransformCache::new(dir.path()), false);
        let third = numbered(4)
            .map("len", |_, row| Ok(row.with_tokens(Field::InputIds, vec![9])), &uncached)
            .unwrap();
        assert_ne!(first, third);
    }

    #[test]
    fn test_dict_keeps_insertion_order() {
        let mut dict = DatasetDict::new()
            .with_split("train", numbered(3))
            .with_split("test", numbered(1));
        dict.insert("train", numbered(2));

        assert_eq!(dict.names().collect::<Vec<_>>(), vec!["train", "test"]);
        assert_eq!(dict.get("train").map(Dataset::len), Some(2));
    }

    #[test]
    fn test_split_views() {
        let dataset = numbered(2);
        assert_eq!(dataset.split_views()[0].0, None);

        let dict = DatasetDict::new().with_split("a", numbered(1)).with_split("b", numbered(2));
        let names: Vec<_> = dict.split_views().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec![Some("a"), Some("b")]);
    }
}
