//! Loader nodes exposed to the host node graph.
//!
//! The host runtime owns model loading. Each node here resolves the version id
//! from its inputs, makes sure the artifact is on disk through an
//! [`ArtifactSource`] and hands the path to a loader function supplied by the
//! host. The node result carries the thumbnail for the gallery widget.

use std::error::Error as StdError;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::artifact::{ArtifactKind, ArtifactSource};
use crate::error::FetchError;
use crate::registry::VersionId;

/// Error returned by host loader functions.
pub type LoadError = Box<dyn StdError + Send + Sync>;

/// Host function turning a model file into a loaded value.
pub type LoadFn<T> = Box<dyn Fn(&Path) -> Result<T, LoadError> + Send + Sync>;

/// Errors from loader nodes.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Neither the free-text id nor the gallery pick was set.
    #[error("model_version_id is required")]
    MissingVersionId,

    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The host failed to load the downloaded file.
    #[error("failed to load {}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: LoadError,
    },
}

/// UI payload sent back to the gallery widget.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeUi {
    pub thumbnails: Vec<Option<String>>,
}

/// A node's result values plus its UI payload.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeOutput<T> {
    pub result: T,
    pub ui: Option<NodeUi>,
}

impl<T> NodeOutput<T> {
    fn without_ui(result: T) -> Self {
        Self { result, ui: None }
    }
}

/// Registration data for one node class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeMapping {
    /// Class name the host registers the node under.
    pub class_name: &'static str,
    /// Human-readable title.
    pub display_name: &'static str,
    /// Input type of the gallery picker widget.
    pub picker_type: &'static str,
    /// Output socket types.
    pub return_types: &'static [&'static str],
    /// Menu category.
    pub category: &'static str,
}

/// Node classes provided by this crate.
pub fn node_mappings() -> &'static [NodeMapping] {
    const MAPPINGS: &[NodeMapping] = &[
        NodeMapping {
            class_name: "CivitaiGalleryCheckpointLoader",
            display_name: "CivitAI Checkpoint Gallery",
            picker_type: "CIVITAI_CHECKPOINT",
            return_types: &["MODEL", "CLIP", "VAE"],
            category: "CivitAI",
        },
        NodeMapping {
            class_name: "CivitaiGalleryLoraLoader",
            display_name: "CivitAI Lora Gallery",
            picker_type: "CIVITAI_LORA",
            return_types: &["MODEL", "CLIP"],
            category: "CivitAI",
        },
        NodeMapping {
            class_name: "CivitaiGalleryControlNetLoader",
            display_name: "CivitAI ControlNet Gallery",
            picker_type: "CIVITAI_CONTROLNET",
            return_types: &["CONTROL_NET"],
            category: "CivitAI",
        },
    ];
    MAPPINGS
}

/// Pick the version id from node inputs.
///
/// A non-blank `exact_version_id` (typed by the user) overrides
/// `model_version_id` (picked in the gallery).
pub fn select_version_id(
    exact_version_id: &str,
    model_version_id: &str,
) -> Result<VersionId, NodeError> {
    let chosen = [exact_version_id, model_version_id]
        .into_iter()
        .map(str::trim)
        .find(|id| !id.is_empty())
        .ok_or(NodeError::MissingVersionId)?;
    Ok(VersionId::new(chosen)?)
}

/// Checkpoint and ControlNet loader: fetch, load, attach the thumbnail.
pub struct ModelLoader<T> {
    kind: ArtifactKind,
    source: Arc<dyn ArtifactSource>,
    load: LoadFn<T>,
}

impl<T> ModelLoader<T> {
    pub fn new(kind: ArtifactKind, source: Arc<dyn ArtifactSource>, load: LoadFn<T>) -> Self {
        Self { kind, source, load }
    }

    /// Loader for `Checkpoint` models.
    pub fn checkpoint(source: Arc<dyn ArtifactSource>, load: LoadFn<T>) -> Self {
        Self::new(ArtifactKind::Checkpoint, source, load)
    }

    /// Loader for `Controlnet` models.
    pub fn controlnet(source: Arc<dyn ArtifactSource>, load: LoadFn<T>) -> Self {
        Self::new(ArtifactKind::ControlNet, source, load)
    }

    /// Artifact kind this loader fetches.
    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    /// Run the node.
    pub fn load(
        &self,
        exact_version_id: &str,
        model_version_id: &str,
    ) -> Result<NodeOutput<T>, NodeError> {
        let version_id = select_version_id(exact_version_id, model_version_id)?;
        let path = self.source.ensure(self.kind, &version_id)?;
        let result = (self.load)(&path).map_err(|source| NodeError::Load {
            path: path.clone(),
            source,
        })?;
        Ok(NodeOutput {
            result,
            ui: Some(NodeUi {
                thumbnails: vec![self.source.thumbnail(&version_id)],
            }),
        })
    }
}

/// Inputs of the LoRA node besides the model and clip being patched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoraInputs<'a> {
    pub exact_version_id: &'a str,
    pub model_version_id: &'a str,
    pub strength_model: f32,
    pub strength_clip: f32,
}

impl LoraInputs<'_> {
    fn is_noop(&self) -> bool {
        self.strength_model == 0.0 && self.strength_clip == 0.0
    }
}

/// LoRA loader.
///
/// Loaded weights are kept for the most recent path only, so re-running a
/// graph with the same LoRA does not reload it while switching LoRAs releases
/// the previous weights.
pub struct LoraLoader<W> {
    source: Arc<dyn ArtifactSource>,
    load: LoadFn<W>,
    loaded: Mutex<Option<(PathBuf, Arc<W>)>>,
}

impl<W> LoraLoader<W> {
    pub fn new(source: Arc<dyn ArtifactSource>, load: LoadFn<W>) -> Self {
        Self {
            source,
            load,
            loaded: Mutex::new(None),
        }
    }

    /// Run the node, patching `model` and `clip` with `apply`.
    ///
    /// With both strengths zero the inputs pass through untouched and nothing
    /// is fetched.
    pub fn load<M, C, F>(
        &self,
        model: M,
        clip: C,
        inputs: &LoraInputs<'_>,
        apply: F,
    ) -> Result<NodeOutput<(M, C)>, NodeError>
    where
        F: FnOnce(M, C, &W, f32, f32) -> (M, C),
    {
        if inputs.is_noop() {
            return Ok(NodeOutput::without_ui((model, clip)));
        }

        let version_id = select_version_id(inputs.exact_version_id, inputs.model_version_id)?;
        let path = self.source.ensure(ArtifactKind::Lora, &version_id)?;
        let weights = self.weights(&path)?;

        let patched = apply(
            model,
            clip,
            &*weights,
            inputs.strength_model,
            inputs.strength_clip,
        );
        Ok(NodeOutput {
            result: patched,
            ui: Some(NodeUi {
                thumbnails: vec![self.source.thumbnail(&version_id)],
            }),
        })
    }

    fn weights(&self, path: &Path) -> Result<Arc<W>, NodeError> {
        let mut loaded = self.loaded.lock();
        if let Some((cached_path, weights)) = loaded.as_ref() {
            if cached_path == path {
                debug!(path = %path.display(), "reusing loaded LoRA");
                return Ok(Arc::clone(weights));
            }
        }
        // Release the previous weights before loading new ones.
        *loaded = None;

        let weights = Arc::new((self.load)(path).map_err(|source| NodeError::Load {
            path: path.to_path_buf(),
            source,
        })?);
        *loaded = Some((path.to_path_buf(), Arc::clone(&weights)));
        Ok(weights)
    }
}
