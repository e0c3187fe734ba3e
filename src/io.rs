//! Safetensors I/O for pattern sets and cross-validation results.
//!
//! Input file layout:
//!
//! | key           | dtype                | contents                                   |
//! |---------------|----------------------|--------------------------------------------|
//! | `patterns`    | F32 / F64            | N-d pattern tensor                         |
//! | `dims`        | U8                   | newline-separated dimension names per axis |
//! | `event_types` | U8                   | newline-separated event label per instance |
//! | `times`       | F32 / F64 (optional) | sample time per time-axis index            |
use anyhow::{bail, ensure, Context, Result};
use ndarray::{ArrayD, ArrayView, Dimension, IxDyn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::crossval::McpaResults;
use crate::dataset::PatternSet;
use crate::tensor::{parse_dimensions, LabeledTensor};

// ── Header model ──────────────────────────────────────────────────────────────

/// Element types this module reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dtype {
    F32,
    F64,
    I32,
    I64,
    U8,
}

impl Dtype {
    fn size(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::F32 | Self::I32 => 4,
            Self::F64 | Self::I64 => 8,
        }
    }
}

/// One tensor's header record.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TensorEntry {
    dtype: Dtype,
    shape: Vec<usize>,
    data_offsets: [usize; 2],
}

// ── Reading ───────────────────────────────────────────────────────────────────

/// Tensor records by name plus the offset where the data section starts.
/// `__metadata__` and other non-tensor keys are ignored.
fn parse_header(bytes: &[u8]) -> Result<(HashMap<String, TensorEntry>, usize)> {
    ensure!(bytes.len() >= 8, "safetensors file too small ({} bytes)", bytes.len());
    let mut len = [0u8; 8];
    len.copy_from_slice(&bytes[..8]);
    let n = usize::try_from(u64::from_le_bytes(len)).context("header length does not fit in memory")?;
    let end = 8usize.checked_add(n).filter(|&e| e <= bytes.len()).context("safetensors header overruns file")?;
    let raw: HashMap<String, serde_json::Value> =
        serde_json::from_slice(&bytes[8..end]).context("failed to parse safetensors header")?;
    let mut entries = HashMap::with_capacity(raw.len());
    for (name, value) in raw {
        if name.starts_with("__") {
            continue;
        }
        let entry: TensorEntry =
            serde_json::from_value(value).with_context(|| format!("bad header record for '{name}'"))?;
        entries.insert(name, entry);
    }
    Ok((entries, end))
}

fn raw_bytes<'a>(bytes: &'a [u8], data_start: usize, entry: &TensorEntry) -> Result<&'a [u8]> {
    let [s, e] = entry.data_offsets;
    let raw = bytes
        .get(data_start + s..data_start + e)
        .with_context(|| format!("data offsets {s}..{e} outside file"))?;
    let expected = entry.shape.iter().product::<usize>() * entry.dtype.size();
    ensure!(raw.len() == expected, "{} bytes for shape {:?} {:?}", raw.len(), entry.shape, entry.dtype);
    Ok(raw)
}

/// Any numeric tensor, widened to f64.
fn read_numeric(bytes: &[u8], data_start: usize, entry: &TensorEntry) -> Result<ArrayD<f64>> {
    let raw = raw_bytes(bytes, data_start, entry)?;
    let vals: Vec<f64> = match entry.dtype {
        Dtype::F32 => raw.chunks_exact(4).map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64).collect(),
        Dtype::F64 => raw
            .chunks_exact(8)
            .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .collect(),
        Dtype::I32 => raw.chunks_exact(4).map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64).collect(),
        Dtype::I64 => raw
            .chunks_exact(8)
            .map(|b| i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f64)
            .collect(),
        Dtype::U8 => bail!("expected a numeric tensor, found U8 text"),
    };
    Ok(ArrayD::from_shape_vec(IxDyn(&entry.shape), vals)?)
}

fn read_strings(bytes: &[u8], data_start: usize, entry: &TensorEntry) -> Result<Vec<String>> {
    ensure!(entry.dtype == Dtype::U8, "expected U8 text, found {:?}", entry.dtype);
    let raw = std::str::from_utf8(raw_bytes(bytes, data_start, entry)?)?;
    Ok(raw.split('\n').filter(|s| !s.is_empty()).map(String::from).collect())
}

// ── Pattern sets ──────────────────────────────────────────────────────────────

/// Load a [`PatternSet`] from a safetensors file.
pub fn load_pattern_set(path: &Path) -> Result<PatternSet> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let (header, data_start) = parse_header(&bytes)?;

    let entry = header.get("patterns").context("missing 'patterns' key")?;
    let data = read_numeric(&bytes, data_start, entry)?;

    let dims = header.get("dims").context("missing 'dims' key")?;
    let dims = parse_dimensions(&read_strings(&bytes, data_start, dims)?)?;

    let events = header.get("event_types").context("missing 'event_types' key")?;
    let events = read_strings(&bytes, data_start, events)?;

    let times = match header.get("times") {
        Some(e) => Some(read_numeric(&bytes, data_start, e)?.into_iter().collect()),
        None => None,
    };

    let set = PatternSet::new(LabeledTensor::new(data, dims)?, events, times)?;
    tracing::info!(
        path = %path.display(),
        dims = ?set.patterns.dims(),
        shape = ?set.patterns.shape(),
        "loaded patterns"
    );
    Ok(set)
}

/// Write `set` in the layout [`load_pattern_set`] reads.
pub fn save_pattern_set(set: &PatternSet, path: &Path) -> Result<()> {
    let mut file = TensorFile::new();
    file.add_array("patterns", set.patterns.data().view());
    let dims: Vec<&str> = set.patterns.dims().iter().map(|d| d.name()).collect();
    file.add_strings("dims", &dims);
    file.add_strings("event_types", &set.events);
    if let Some(t) = &set.times {
        file.add_values("times", t);
    }
    file.write(path)
}

// ── Writing ───────────────────────────────────────────────────────────────────

/// Builds a safetensors file from named tensors.
///
/// Values are stored as F64, indices as I64 and label lists as newline-joined
/// U8 text.  Names must be unique and every tensor's byte length must match
/// its shape; both are checked when the file is assembled.
///
/// ```rust,no_run
/// use mcpa::io::TensorFile;
/// use std::path::Path;
/// let mut file = TensorFile::new();
/// file.add_values("mean_accuracy", &[1.0, 0.5]);
/// file.add_strings("conditions", &["face", "house"]);
/// file.write(Path::new("/tmp/out.safetensors")).unwrap();
/// ```
#[derive(Debug, Default)]
pub struct TensorFile {
    tensors: Vec<(String, TensorEntry, Vec<u8>)>,
}

impl TensorFile {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, name: &str, dtype: Dtype, shape: Vec<usize>, bytes: Vec<u8>) {
        let entry = TensorEntry { dtype, shape, data_offsets: [0, 0] };
        self.tensors.push((name.to_string(), entry, bytes));
    }

    /// N-d array of values, stored row-major whatever the memory layout.
    pub fn add_array<D: Dimension>(&mut self, name: &str, arr: ArrayView<'_, f64, D>) {
        let bytes = arr.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.push(name, Dtype::F64, arr.shape().to_vec(), bytes);
    }

    /// 1-d vector of values.
    pub fn add_values(&mut self, name: &str, values: &[f64]) {
        let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.push(name, Dtype::F64, vec![values.len()], bytes);
    }

    pub fn add_indices(&mut self, name: &str, indices: &[usize], shape: &[usize]) {
        let bytes = indices.iter().flat_map(|&i| (i as i64).to_le_bytes()).collect();
        self.push(name, Dtype::I64, shape.to_vec(), bytes);
    }

    pub fn add_strings<S: AsRef<str>>(&mut self, name: &str, items: &[S]) {
        let bytes: Vec<u8> = items.iter().map(AsRef::as_ref).collect::<Vec<_>>().join("\n").into_bytes();
        let len = bytes.len();
        self.push(name, Dtype::U8, vec![len], bytes);
    }

    /// The complete file: length prefix, space-padded JSON header, data.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut header = serde_json::Map::with_capacity(self.tensors.len());
        let mut offset = 0;
        for (name, entry, bytes) in &self.tensors {
            let expected = entry.shape.iter().product::<usize>() * entry.dtype.size();
            ensure!(
                bytes.len() == expected,
                "tensor '{name}' has {} bytes but shape {:?} needs {expected}",
                bytes.len(),
                entry.shape
            );
            let placed = TensorEntry { data_offsets: [offset, offset + bytes.len()], ..entry.clone() };
            offset += bytes.len();
            ensure!(
                header.insert(name.clone(), serde_json::to_value(placed)?).is_none(),
                "tensor '{name}' added twice"
            );
        }
        let mut json = serde_json::to_vec(&header)?;
        json.resize(json.len().next_multiple_of(8), b' ');

        let mut out = Vec::with_capacity(8 + json.len() + offset);
        out.extend_from_slice(&(json.len() as u64).to_le_bytes());
        out.extend_from_slice(&json);
        for (_, _, bytes) in &self.tensors {
            out.extend_from_slice(bytes);
        }
        Ok(out)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_bytes()?).with_context(|| format!("writing {}", path.display()))
    }
}

// ── Results ───────────────────────────────────────────────────────────────────

/// Write cross-validation results.
///
/// Both paths store `conditions`, `subjects`, `subsets` (`[n_sets, setsize]`)
/// and `accuracy`.  Binary results add `subj_x_feature` and `features`;
/// multiclass results add `mean_accuracy` per fold.
pub fn write_results(results: &McpaResults, path: &Path) -> Result<()> {
    let mut file = TensorFile::new();
    let subsets = results.subsets();
    let flat: Vec<usize> = subsets.iter().flatten().copied().collect();
    file.add_indices("subsets", &flat, &[subsets.len(), subsets.setsize()]);
    file.add_indices("subjects", results.subjects(), &[results.subjects().len()]);

    match results {
        McpaResults::Binary(r) => {
            file.add_strings("conditions", &r.conditions);
            file.add_array("accuracy", r.accuracy.view());
            file.add_array("subj_x_feature", r.subj_x_feature.view());
            file.add_indices("features", &r.features, &[r.features.len()]);
        }
        McpaResults::Multiclass(r) => {
            file.add_strings("conditions", &r.conditions);
            file.add_array("accuracy", r.accuracy.view());
            file.add_values("mean_accuracy", &r.mean_accuracy());
        }
    }
    file.write(path)?;
    tracing::info!(path = %path.display(), "results written");
    Ok(())
}
