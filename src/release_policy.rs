//! Release policy: the registry of burdens awaiting an explicit release.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::burden::Burden;
use crate::error::{DiError, DiResult};
use crate::key::{Instance, InstanceKey};
use crate::lifetime::LifestyleKind;
use crate::observer::TrackedComponentsDiagnostic;
use crate::registration::FastMap;

#[derive(Default)]
struct TrackTables {
    by_instance: FastMap<InstanceKey, u64>,
    ordered: BTreeMap<u64, Arc<Burden>>,
}

struct PolicyInner {
    tables: RwLock<TrackTables>,
    next_seq: AtomicU64,
    diagnostics: Arc<RwLock<Option<Arc<dyn TrackedComponentsDiagnostic>>>>,
}

impl PolicyInner {
    fn untrack(&self, key: InstanceKey, seq: u64) {
        let mut tables = self.tables.write();
        if tables.by_instance.get(&key) == Some(&seq) {
            tables.by_instance.remove(&key);
        }
        tables.ordered.remove(&seq);
    }
}

/// Tracks burdens that must be released explicitly.
///
/// Instances are keyed by reference identity. Tracking registers a
/// `Released` callback on the burden, so a burden released through any path
/// (parent release, scope end, direct call) leaves the policy on its own.
/// Cloning yields another handle to the same policy.
///
/// # Examples
///
/// ```rust
/// use ferrous_kernel::{ComponentModel, Kernel, Resolver};
///
/// struct Connection;
///
/// let kernel = Kernel::new();
/// kernel.register(
///     ComponentModel::builder("connection")
///         .service::<Connection>()
///         .factory(|_| Ok(Connection))
///         .on_destroy(|_: &Connection| {})
///         .build(),
/// ).unwrap();
///
/// let conn = kernel.get_required::<Connection>();
/// assert_eq!(kernel.release_policy().tracked_count(), 1);
/// assert!(kernel.release_typed(&conn));
/// assert_eq!(kernel.release_policy().tracked_count(), 0);
/// ```
#[derive(Clone)]
pub struct ReleasePolicy {
    inner: Arc<PolicyInner>,
}

impl ReleasePolicy {
    pub fn new() -> Self {
        Self::with_diagnostics(Arc::new(RwLock::new(None)))
    }

    fn with_diagnostics(
        diagnostics: Arc<RwLock<Option<Arc<dyn TrackedComponentsDiagnostic>>>>,
    ) -> Self {
        Self {
            inner: Arc::new(PolicyInner {
                tables: RwLock::new(TrackTables::default()),
                next_seq: AtomicU64::new(1),
                diagnostics,
            }),
        }
    }

    /// Starts tracking `burden` under the identity of `instance`.
    ///
    /// Fails when the burden does not require policy release or the instance
    /// is already tracked. An entry whose burden is already being released
    /// is replaced: a pooled instance can be lent out again before the
    /// previous loan has finished leaving the policy.
    pub fn track(&self, instance: &Instance, burden: Arc<Burden>) -> DiResult<()> {
        if !burden.requires_policy_release() {
            return Err(DiError::InvalidLifecycle(format!(
                "burden of '{}' does not require policy release",
                burden.component()
            )));
        }

        let key = InstanceKey::of(instance);
        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        {
            let mut tables = self.inner.tables.write();
            if let Some(&previous) = tables.by_instance.get(&key) {
                let stale = tables.ordered.get(&previous).map_or(true, |b| b.is_releasing());
                if !stale {
                    return Err(DiError::InvalidLifecycle(format!(
                        "instance of '{}' is already tracked",
                        burden.component()
                    )));
                }
                tables.ordered.remove(&previous);
            }
            tables.by_instance.insert(key, seq);
            tables.ordered.insert(seq, burden.clone());
        }

        let weak = Arc::downgrade(&self.inner);
        burden.on_released(move |_| {
            if let Some(inner) = weak.upgrade() {
                inner.untrack(key, seq);
            }
        });
        Ok(())
    }

    /// Releases the tracked instance. `false` when it was not tracked here.
    pub fn release(&self, instance: &Instance) -> bool {
        self.release_key(InstanceKey::of(instance))
    }

    pub(crate) fn release_key(&self, key: InstanceKey) -> bool {
        let burden = {
            let tables = self.inner.tables.read();
            tables
                .by_instance
                .get(&key)
                .and_then(|seq| tables.ordered.get(seq))
                .cloned()
        };
        match burden {
            Some(burden) => burden.release(),
            None => false,
        }
    }

    pub fn has_track(&self, instance: &Instance) -> bool {
        self.inner
            .tables
            .read()
            .by_instance
            .contains_key(&InstanceKey::of(instance))
    }

    pub fn tracked_count(&self) -> usize {
        self.inner.tables.read().ordered.len()
    }

    /// Releases every tracked burden, newest first.
    pub fn dispose(&self) {
        let burdens: Vec<Arc<Burden>> = {
            let tables = self.inner.tables.read();
            tables.ordered.values().rev().cloned().collect()
        };
        if !burdens.is_empty() {
            debug!(count = burdens.len(), "disposing release policy");
        }
        for burden in burdens {
            burden.release();
        }
    }

    /// Independent policy sharing this policy's diagnostics collector.
    pub fn create_sub_policy(&self) -> ReleasePolicy {
        Self::with_diagnostics(self.inner.diagnostics.clone())
    }

    /// Installs the collector fed by [`publish_diagnostics`](Self::publish_diagnostics).
    pub fn set_diagnostics(&self, collector: Arc<dyn TrackedComponentsDiagnostic>) {
        *self.inner.diagnostics.write() = Some(collector);
    }

    /// Hands a snapshot of tracked instances to the diagnostics collector.
    pub fn publish_diagnostics(&self) {
        let collector = self.inner.diagnostics.read().clone();
        if let Some(collector) = collector {
            collector.collect(&self.snapshot());
        }
    }

    /// Point-in-time view of tracked instances, oldest first.
    pub fn snapshot(&self) -> TrackedSnapshot {
        let tables = self.inner.tables.read();
        let instances = tables
            .ordered
            .iter()
            .map(|(seq, burden)| TrackedInstance {
                sequence: *seq,
                component: burden.component().to_string(),
                lifestyle: burden.lifestyle(),
                children: burden.children_count(),
            })
            .collect();
        TrackedSnapshot { instances }
    }
}

impl Default for ReleasePolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReleasePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleasePolicy")
            .field("tracked", &self.tracked_count())
            .finish()
    }
}

/// One tracked instance in a [`TrackedSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "diagnostics", derive(serde::Serialize))]
pub struct TrackedInstance {
    pub sequence: u64,
    pub component: String,
    pub lifestyle: LifestyleKind,
    pub children: usize,
}

/// Tracked instances of a release policy at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "diagnostics", derive(serde::Serialize))]
pub struct TrackedSnapshot {
    pub instances: Vec<TrackedInstance>,
}

impl TrackedSnapshot {
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Tracked instance count per component name.
    pub fn count_by_component(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for instance in &self.instances {
            *counts.entry(instance.component.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Serializes the snapshot as pretty-printed JSON.
    #[cfg(feature = "diagnostics")]
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
