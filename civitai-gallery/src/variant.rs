//! File variant selection.
//!
//! A version usually publishes several encodings of the same model. The
//! selector walks the variants in server order and accepts the first one that
//! shares the preferred size class, overriding whichever of precision and
//! format differ. Size class is never overridden: it decides what the model
//! physically is and how much disk and VRAM it takes.

use crate::registry::{FileVariant, VersionMetadata};

/// Preferred file encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantPreference {
    pub fp: String,
    pub size: String,
    pub format: String,
}

impl Default for VariantPreference {
    fn default() -> Self {
        Self {
            fp: "fp16".to_string(),
            size: "pruned".to_string(),
            format: "SafeTensor".to_string(),
        }
    }
}

/// Query parameters sent to the download endpoint.
///
/// All fields `None` means the server picks its default file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DownloadParams {
    pub fp: Option<String>,
    pub size: Option<String>,
    pub format: Option<String>,
}

impl DownloadParams {
    /// Parameters that let the server choose.
    pub fn server_default() -> Self {
        Self::default()
    }

    /// Whether no parameter is set.
    pub fn is_server_default(&self) -> bool {
        self.fp.is_none() && self.size.is_none() && self.format.is_none()
    }

    /// Query pairs in `fp`, `size`, `format` order, skipping unset values.
    pub fn query_pairs(&self) -> Vec<(&str, &str)> {
        [
            ("fp", self.fp.as_deref()),
            ("size", self.size.as_deref()),
            ("format", self.format.as_deref()),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k, v)))
        .collect()
    }

    fn from_preference(pref: &VariantPreference) -> Self {
        Self {
            fp: Some(pref.fp.clone()),
            size: Some(pref.size.clone()),
            format: Some(pref.format.clone()),
        }
    }
}

/// How closely a variant matched the preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    /// Precision, size and format all match.
    Exact,
    /// Precision and size match; format taken from the variant.
    FpAndSize,
    /// Size and format match; precision taken from the variant.
    SizeAndFormat,
    /// Only size matches; precision and format taken from the variant.
    SizeOnly,
}

/// The chosen variant and the parameters to request it with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Index of the variant in server order.
    pub index: usize,
    pub tier: MatchTier,
    pub params: DownloadParams,
}

fn matches(value: &Option<String>, wanted: &str) -> bool {
    value.as_deref() == Some(wanted)
}

/// Pick the first variant sharing the preferred size class.
///
/// Returns `None` when no variant has the preferred size class.
pub fn select_variant<'a, I>(variants: I, pref: &VariantPreference) -> Option<Selection>
where
    I: IntoIterator<Item = &'a FileVariant>,
{
    variants.into_iter().enumerate().find_map(|(index, v)| {
        if !matches(&v.size, &pref.size) {
            return None;
        }
        let fp = matches(&v.fp, &pref.fp);
        let format = matches(&v.format, &pref.format);

        let mut params = DownloadParams::from_preference(pref);
        let tier = match (fp, format) {
            (true, true) => MatchTier::Exact,
            (true, false) => {
                params.format = v.format.clone();
                MatchTier::FpAndSize
            }
            (false, true) => {
                params.fp = v.fp.clone();
                MatchTier::SizeAndFormat
            }
            (false, false) => {
                params.fp = v.fp.clone();
                params.format = v.format.clone();
                MatchTier::SizeOnly
            }
        };
        Some(Selection {
            index,
            tier,
            params,
        })
    })
}

/// Download parameters for a version under the given preference.
pub fn select_params(metadata: &VersionMetadata, pref: &VariantPreference) -> DownloadParams {
    select_variant(metadata.variants(), pref)
        .map(|s| s.params)
        .unwrap_or_default()
}
