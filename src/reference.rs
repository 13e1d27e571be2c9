//! Reference-width table for pinhole distance estimation.
//!
//! Keys are lowercase, finer-grained than most detector vocabularies
//! ("notebook small", "bottle water"). Detector class names that differ can
//! be mapped onto keys with aliases; aliases only affect width lookup, never
//! the label reported for a detection.

use anyhow::{anyhow, Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Built-in real-world widths in centimeters.
pub const BUILTIN_WIDTHS_CM: &[(&str, f64)] = &[
    ("pen", 1.0),
    ("pencil", 1.0),
    ("eraser", 3.0),
    ("sharpener", 4.0),
    ("ruler", 30.0),
    ("notebook small", 15.0),
    ("notebook large", 21.0),
    ("binder", 25.0),
    ("scissors", 15.0),
    ("stapler", 12.0),
    ("tape dispenser", 15.0),
    ("marker", 2.0),
    ("highlighter", 2.0),
    ("calculator", 15.0),
    ("mouse wireless", 6.0),
    ("keyboard small", 40.0),
    ("keyboard large", 50.0),
    ("monitor small", 40.0),
    ("monitor large", 60.0),
    ("printer", 50.0),
    ("scanner", 40.0),
    ("router", 20.0),
    ("modem", 15.0),
    ("external hard drive", 12.0),
    ("usb stick", 2.0),
    ("smartwatch", 5.0),
    ("headset", 18.0),
    ("speaker small", 15.0),
    ("speaker large", 30.0),
    ("microphone", 5.0),
    ("camera small", 12.0),
    ("camera dslr", 15.0),
    ("tripod small", 10.0),
    ("tripod large", 15.0),
    ("guitar acoustic", 35.0),
    ("guitar electric", 32.0),
    ("violin", 30.0),
    ("drum small", 35.0),
    ("drum large", 50.0),
    ("keyboard piano", 120.0),
    ("basketball", 24.0),
    ("soccer ball", 22.0),
    ("tennis ball", 6.5),
    ("tennis racket", 27.0),
    ("baseball bat", 7.5),
    ("helmet bike", 25.0),
    ("helmet motorbike", 30.0),
    ("backpack small", 25.0),
    ("backpack large", 35.0),
    ("suitcase small", 40.0),
    ("suitcase large", 60.0),
    ("handbag", 25.0),
    ("wallet", 10.0),
    ("shoe adult", 12.0),
    ("shoe child", 8.0),
    ("boot", 15.0),
    ("sock", 5.0),
    ("hat", 20.0),
    ("glasses", 14.0),
    ("sunglasses", 14.0),
    ("umbrella closed", 8.0),
    ("umbrella open", 100.0),
    ("chair office", 50.0),
    ("chair dining", 45.0),
    ("stool", 35.0),
    ("table small", 60.0),
    ("table large", 150.0),
    ("coffee table", 100.0),
    ("sofa 2-seater", 150.0),
    ("sofa 3-seater", 200.0),
    ("bed single", 100.0),
    ("bed double", 140.0),
    ("bed queen", 160.0),
    ("bed king", 180.0),
    ("pillow", 50.0),
    ("blanket", 150.0),
    ("curtain small", 80.0),
    ("curtain large", 150.0),
    ("door", 90.0),
    ("window small", 60.0),
    ("window large", 120.0),
    ("refrigerator small", 60.0),
    ("refrigerator large", 80.0),
    ("microwave", 50.0),
    ("oven", 60.0),
    ("sink", 60.0),
    ("washing machine", 70.0),
    ("dishwasher", 60.0),
    ("toaster", 25.0),
    ("kettle", 20.0),
    ("lamp desk", 20.0),
    ("lamp floor", 40.0),
    ("clock wall", 30.0),
    ("clock desk", 15.0),
    ("vase small", 10.0),
    ("vase large", 20.0),
    ("flower pot", 20.0),
    ("bottle water", 7.0),
    ("bottle soda", 7.0),
    ("cup small", 8.0),
    ("cup large", 10.0),
    ("plate small", 20.0),
    ("plate large", 25.0),
    ("bowl", 20.0),
    ("spoon", 5.0),
    ("fork", 5.0),
    ("knife", 5.0),
    ("chair stool", 35.0),
    ("table round", 120.0),
];

/// Immutable label → width (cm) mapping, built once at startup.
#[derive(Clone, Debug, Default)]
pub struct ReferenceWidthTable {
    widths: HashMap<String, f64>,
    aliases: HashMap<String, String>,
}

impl ReferenceWidthTable {
    /// Empty table; every lookup falls back to the height proxy.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Table populated with [`BUILTIN_WIDTHS_CM`].
    pub fn builtin() -> Self {
        Self::from_entries(
            BUILTIN_WIDTHS_CM
                .iter()
                .map(|(label, width)| (label.to_string(), *width)),
        )
    }

    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            widths: entries
                .into_iter()
                .map(|(label, width)| (label.into(), width))
                .collect(),
            aliases: HashMap::new(),
        }
    }

    /// Add or replace an entry.
    pub fn with_entry(mut self, label: impl Into<String>, width_cm: f64) -> Self {
        self.widths.insert(label.into(), width_cm);
        self
    }

    /// Map a detector label onto an existing table key.
    pub fn with_alias(mut self, label: impl Into<String>, key: impl Into<String>) -> Self {
        self.aliases.insert(label.into(), key.into());
        self
    }

    /// Merge a JSON or TOML `{ "label" = width_cm }` file over this table.
    ///
    /// The file format is chosen by extension; anything other than `.toml`
    /// is parsed as JSON. Widths must be finite and positive.
    pub fn merge_file(mut self, path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read reference widths {}", path.display()))?;
        let entries: BTreeMap<String, f64> = if is_toml(path) {
            toml::from_str(&raw)
                .with_context(|| format!("invalid reference widths {}", path.display()))?
        } else {
            serde_json::from_str(&raw)
                .with_context(|| format!("invalid reference widths {}", path.display()))?
        };
        for (label, width) in entries {
            if !width.is_finite() || width <= 0.0 {
                return Err(anyhow!(
                    "reference width for '{}' must be a positive number, got {}",
                    label,
                    width
                ));
            }
            self.widths.insert(label, width);
        }
        Ok(self)
    }

    /// Exact-match lookup, then alias lookup.
    pub fn get(&self, label: &str) -> Option<f64> {
        self.widths.get(label).copied().or_else(|| {
            self.aliases
                .get(label)
                .and_then(|key| self.widths.get(key).copied())
        })
    }

    pub fn contains(&self, label: &str) -> bool {
        self.get(label).is_some()
    }

    pub fn len(&self) -> usize {
        self.widths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widths.is_empty()
    }
}

pub(crate) fn is_toml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}
