//! Experiment identity and canonical storage keys
//!
//! An [`IdentityKey`] is derived deterministically from an
//! [`ExperimentIdentity`] and doubles as the storage address of its result:
//!
//! ```text
//! <model>/<dataset>/seed_<n>/<name>=<value>_<name>=<value>_@<tag>=<value>.json
//! └──────────── scope ─────────┘└──────────────── entry ─────────────┘
//! ```
//!
//! Keys contain no characters that are illegal in file names and are not
//! hashed: when an entry gets too long, float precision is reduced instead,
//! so the parameters can always be read back with [`IdentityKey::parse_entry`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::space::{format_significant, Configuration, ParamValue};
use crate::{Error, Result};

/// Default number of significant digits for float parameters.
pub const DEFAULT_PRECISION: usize = 5;

/// Maximum length of an entry name in bytes (file name without extension).
pub const MAX_ENTRY_BYTES: usize = 200;

/// File extension of serialized experiment records.
pub const RECORD_EXTENSION: &str = "json";

/// Entry name used for a configuration without parameters or tags.
const EMPTY_ENTRY: &str = "default";

/// Prefix marking auxiliary tags inside an entry name.
const TAG_MARKER: char = '@';

/// Everything that identifies one experiment.
///
/// A given identity maps to at most one persisted result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentIdentity {
    model: String,
    dataset: String,
    seed: u64,
    configuration: Configuration,
    #[serde(default)]
    aux_tags: BTreeMap<String, String>,
}

impl ExperimentIdentity {
    /// Create an identity without auxiliary tags.
    #[must_use]
    pub fn new(
        model: impl Into<String>,
        dataset: impl Into<String>,
        seed: u64,
        configuration: Configuration,
    ) -> Self {
        Self {
            model: model.into(),
            dataset: dataset.into(),
            seed,
            configuration,
            aux_tags: BTreeMap::new(),
        }
    }

    /// Add an auxiliary tag (e.g. an encoding index or contamination rate).
    #[must_use]
    pub fn with_tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.aux_tags.insert(name.into(), value.into());
        self
    }

    /// Add several auxiliary tags.
    #[must_use]
    pub fn with_tags(mut self, tags: &BTreeMap<String, String>) -> Self {
        self.aux_tags
            .extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Model name.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Dataset or category label.
    #[must_use]
    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// Seed.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Configuration (after parameter editing).
    #[must_use]
    pub const fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Auxiliary tags.
    #[must_use]
    pub const fn aux_tags(&self) -> &BTreeMap<String, String> {
        &self.aux_tags
    }

    /// Derive the canonical key at the given float precision.
    ///
    /// # Errors
    ///
    /// See [`IdentityKey::derive`].
    pub fn key(&self, precision: usize) -> Result<IdentityKey> {
        IdentityKey::derive(self, precision)
    }
}

/// Canonical, path-safe key of an [`ExperimentIdentity`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey {
    scope: String,
    entry: String,
    precision: usize,
}

impl IdentityKey {
    /// Derive the key for an identity.
    ///
    /// Floats are rendered with `precision` significant digits. If the entry
    /// name exceeds [`MAX_ENTRY_BYTES`], precision is lowered one digit at a
    /// time down to 1.
    ///
    /// Lowered precision coarsens identity for that entry only: two long
    /// configurations that differ only beyond the lowered digit count share
    /// one key, so the second is treated as a duplicate of the first (for
    /// example `lr=0.0012346` and `lr=0.0012349` both become `lr=0.001235`
    /// at 4 digits). [`precision`](Self::precision) reports the digit count
    /// actually used.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] if a scope component or the entry name
    /// stays too long even at a single significant digit.
    pub fn derive(identity: &ExperimentIdentity, precision: usize) -> Result<Self> {
        let scope_parts = [
            sanitize(&identity.model, &[]),
            sanitize(&identity.dataset, &[]),
            format!("seed_{}", identity.seed),
        ];
        if let Some(part) = scope_parts.iter().find(|p| p.len() > MAX_ENTRY_BYTES) {
            return Err(Error::InvalidKey(format!(
                "scope component '{part}' exceeds {MAX_ENTRY_BYTES} bytes"
            )));
        }
        let scope = scope_parts.join("/");

        for digits in (1..=precision.max(1)).rev() {
            let entry = render_entry(&identity.configuration, &identity.aux_tags, digits);
            if entry.len() <= MAX_ENTRY_BYTES {
                return Ok(Self {
                    scope,
                    entry,
                    precision: digits,
                });
            }
        }
        Err(Error::InvalidKey(format!(
            "entry for {scope} exceeds {MAX_ENTRY_BYTES} bytes even at 1 significant digit"
        )))
    }

    /// Namespace of the key: `<model>/<dataset>/seed_<n>`.
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Entry name inside the scope (no extension).
    #[must_use]
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Precision the entry was actually rendered at.
    #[must_use]
    pub const fn precision(&self) -> usize {
        self.precision
    }

    /// File name of the record: entry plus extension.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.{RECORD_EXTENSION}", self.entry)
    }

    /// Full storage key: scope and file name joined by `/`.
    #[must_use]
    pub fn storage_key(&self) -> String {
        format!("{}/{}", self.scope, self.file_name())
    }

    /// Storage prefix shared by every key in a scope.
    #[must_use]
    pub fn scope_prefix(model: &str, dataset: &str, seed: u64) -> String {
        format!(
            "{}/{}/seed_{seed}/",
            sanitize(model, &[]),
            sanitize(dataset, &[])
        )
    }

    /// Recover `name=value` pairs from an entry name.
    ///
    /// Auxiliary tags keep their `@` prefix. The `default` entry and names
    /// without `=` yield an empty map. Values come back in their rendered
    /// form (floats at key precision).
    #[must_use]
    pub fn parse_entry(entry: &str) -> BTreeMap<String, String> {
        let entry = entry
            .strip_suffix(&format!(".{RECORD_EXTENSION}"))
            .unwrap_or(entry);
        let segments: Vec<&str> = entry.split('=').collect();
        let mut pairs = BTreeMap::new();
        if segments.len() < 2 {
            return pairs;
        }
        let mut name = segments[0].to_string();
        for (i, segment) in segments.iter().enumerate().skip(1) {
            if i == segments.len() - 1 {
                pairs.insert(name.clone(), (*segment).to_string());
            } else {
                // Values never contain '_', so the first one ends the value
                let (value, next) = segment.split_once('_').unwrap_or((*segment, ""));
                pairs.insert(name.clone(), value.to_string());
                name = next.to_string();
            }
        }
        pairs
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scope, self.entry)
    }
}

/// Render one value the way it appears in a key.
///
/// Text is sanitized so it never contains `_`, `=` or path separators;
/// sequences render as `[a,b,c]`.
#[must_use]
pub fn render_value(value: &ParamValue, precision: usize) -> String {
    match value {
        ParamValue::Bool(v) => v.to_string(),
        ParamValue::Int(v) => v.to_string(),
        ParamValue::Float(v) => format_significant(*v, precision),
        ParamValue::Text(v) => sanitize(v, &['_', '=', ',', '[', ']']),
        ParamValue::Seq(items) => format!(
            "[{}]",
            items
                .iter()
                .map(|item| render_value(item, precision))
                .collect::<Vec<_>>()
                .join(",")
        ),
    }
}

fn render_entry(
    configuration: &Configuration,
    aux_tags: &BTreeMap<String, String>,
    precision: usize,
) -> String {
    let params = configuration
        .iter()
        .map(|(name, value)| format!("{}={}", sanitize_name(name), render_value(value, precision)));
    let tags = aux_tags.iter().map(|(name, value)| {
        format!(
            "{TAG_MARKER}{}={}",
            sanitize_name(name),
            sanitize(value, &['_', '='])
        )
    });
    let entry = params.chain(tags).collect::<Vec<_>>().join("_");
    if entry.is_empty() {
        EMPTY_ENTRY.to_string()
    } else {
        entry
    }
}

fn sanitize_name(name: &str) -> String {
    let name = sanitize(name, &['=']);
    match name.strip_prefix(TAG_MARKER) {
        Some(rest) => format!("~{rest}"),
        None => name,
    }
}

/// Replace characters that are unsafe in a file name component with `~`.
///
/// Also neutralises a leading `.` so components are never hidden files or
/// `..`, and maps the empty string to `~`.
fn sanitize(s: &str, extra: &[char]) -> String {
    const ILLEGAL: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];
    let mut out: String = s
        .chars()
        .map(|c| {
            if c.is_control() || c.is_whitespace() || ILLEGAL.contains(&c) || extra.contains(&c) {
                '~'
            } else {
                c
            }
        })
        .collect();
    if out.starts_with('.') {
        out.replace_range(..1, "~");
    }
    if out.is_empty() {
        out.push('~');
    }
    out
}
