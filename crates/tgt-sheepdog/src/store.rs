//! Backing-store contract and registry.
//!
//! A backing store is published as a template under a well-known name;
//! the target framework instantiates one store per logical unit and
//! drives it from that unit's worker thread. Registration is explicit:
//! the framework's wiring calls [`backend::register`](crate::backend::register)
//! against a [`Registry`] at startup.

use std::collections::HashMap;
use std::sync::Arc;

use sheepdog_proto::SdResult;

use crate::scsi::ScsiCmd;

/// Per-logical-unit backing store instance.
///
/// Lifecycle, all on the unit's worker thread:
/// `init` → `open` → any number of `submit` → `close` → `exit`.
pub trait BackingStore: Send {
    /// Set up per-LU worker resources.
    fn init(&mut self) -> SdResult<()>;

    /// Tear down what `init` set up.
    fn exit(&mut self);

    /// Open the volume named by `path`. Returns the capacity in bytes.
    fn open(&mut self, path: &str) -> SdResult<u64>;

    /// Release the volume.
    fn close(&mut self);

    /// Run one SCSI command to completion, filling in its status and,
    /// on failure, its sense data.
    fn submit(&mut self, cmd: &mut ScsiCmd);
}

/// Factory for per-LU [`BackingStore`] instances.
pub trait BackingStoreTemplate: Send + Sync {
    /// The name logical units select the store by.
    fn name(&self) -> &'static str;

    /// Create a store instance for one logical unit.
    fn create(&self) -> Box<dyn BackingStore>;
}

/// Registry of backing-store templates, keyed by name.
#[derive(Default)]
pub struct Registry {
    templates: HashMap<&'static str, Arc<dyn BackingStoreTemplate>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a template. A later registration under the same name
    /// replaces the earlier one.
    pub fn register(&mut self, template: Arc<dyn BackingStoreTemplate>) {
        self.templates.insert(template.name(), template);
    }

    /// Look a template up by name.
    pub fn find(&self, name: &str) -> Option<Arc<dyn BackingStoreTemplate>> {
        self.templates.get(name).cloned()
    }
}
