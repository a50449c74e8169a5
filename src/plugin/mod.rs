//! Transformer plugins: package manifests, the host registry of transformer
//! constructors, and the load-once chain that applies them.

mod builtin;
mod chain;
mod errors;
mod manifest;
mod registry;

pub use builtin::{RandomGuardRemover, SLIME_SPAWN_RULES};
pub use chain::{
    discover, retain_compatible, Candidates, ChainState, LoadedTransformer, PluginChain,
};
pub use errors::{PluginError, TransformError};
pub use manifest::{TransformerManifest, MANIFEST_ENTRY};
pub use registry::{Transformer, TransformerFactory, TransformerRegistry};
