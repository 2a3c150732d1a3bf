//! Logical description of the pass graph.
//!
//! [`GraphConfig`] is what the control side edits and what the engine rebuilds
//! from. It never owns GPU resources, so it can be copied into a
//! [`CachedConfig`](crate::CachedConfig) and survive engine teardown.
//!
//! Topologies arrive as `i32` arrays (the form a UI layer hands over), where
//! entry `i` names the pass whose output pass `i` samples, or `-1` for none.
//! [`parse_topology`] turns that into [`BufferSlot`]s and rejects anything that
//! would leave a binding undefined.

use std::path::PathBuf;

use crate::error::ConfigError;

/// Number of fixed background images bound to every pass.
pub const BACKGROUND_COUNT: usize = 3;

/// Reference to a pass output, used as the dynamic input of another pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BufferSlot {
    /// The output of the pass at this index.
    Bound(usize),
    /// No dynamic input.
    #[default]
    Unbound,
}

impl BufferSlot {
    /// Converts the `-1`-sentinel wire form. Any negative value is unbound.
    pub fn from_raw(raw: i32) -> Self {
        usize::try_from(raw).map_or(Self::Unbound, Self::Bound)
    }

    /// Inverse of [`from_raw`](Self::from_raw).
    ///
    /// Indices that do not fit the wire form come back as `-1`; slots built by
    /// [`parse_topology`] always fit.
    pub fn to_raw(self) -> i32 {
        self.index()
            .and_then(|index| i32::try_from(index).ok())
            .unwrap_or(-1)
    }

    /// Returns the referenced pass index, if any.
    pub fn index(self) -> Option<usize> {
        match self {
            Self::Bound(index) => Some(index),
            Self::Unbound => None,
        }
    }
}

/// Static attributes of one pass for one rebuild generation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PassSpec {
    /// Path to the compiled fragment shader.
    pub shader: PathBuf,
    /// Slot this pass writes to; `Unbound` for the screen pass.
    pub output_slot: BufferSlot,
    /// Slot this pass samples as its dynamic input.
    pub input_slot: BufferSlot,
}

/// Validates a raw binding array against a graph of `pass_count` passes.
///
/// Every entry must be `-1` or an index in `0..pass_count` other than its own
/// position, and following the bindings from any pass must never return to it.
/// Entries past the last pass are rejected as out of range. When `pass_count`
/// is zero (no shader list yet) the array is checked against its own length.
pub fn parse_topology(raw: &[i32], pass_count: usize) -> Result<Vec<BufferSlot>, ConfigError> {
    let limit = if pass_count == 0 { raw.len() } else { pass_count };

    let slots = raw
        .iter()
        .enumerate()
        .map(|(pass, &input)| {
            let slot = BufferSlot::from_raw(input);
            if input < -1 || pass >= limit {
                return Err(ConfigError::OutOfRange {
                    pass,
                    input,
                    pass_count: limit,
                });
            }
            match slot {
                BufferSlot::Bound(index) if index == pass => {
                    Err(ConfigError::SelfReference { pass })
                }
                BufferSlot::Bound(index) if index >= limit => Err(ConfigError::OutOfRange {
                    pass,
                    input,
                    pass_count: limit,
                }),
                _ => Ok(slot),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    // Each pass has at most one input, so the graph is a functional graph and
    // a cycle shows up as a walk that revisits a pass within `len` steps.
    for start in 0..slots.len() {
        let mut current = start;
        for _ in 0..slots.len() {
            match slots.get(current).copied().and_then(BufferSlot::index) {
                Some(next) if next == start => return Err(ConfigError::Cycle { pass: start }),
                Some(next) => current = next,
                None => break,
            }
        }
    }

    Ok(slots)
}

/// The mutable graph description shared between control and render contexts.
///
/// Fields are only changed through the `replace_*` methods, each of which
/// raises the matching dirty flag in the same call. The engine keeps this
/// behind its mutex; nothing outside the engine's lock sees a half-applied
/// update.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GraphConfig {
    pass_count: usize,
    shader_paths: Vec<PathBuf>,
    input_bind_order: Vec<BufferSlot>,
    background_paths: Vec<PathBuf>,
    topology_dirty: bool,
    images_dirty: bool,
}

impl GraphConfig {
    /// Total number of passes, including the screen pass.
    pub fn pass_count(&self) -> usize {
        self.pass_count
    }

    pub fn shader_paths(&self) -> &[PathBuf] {
        &self.shader_paths
    }

    pub fn input_bind_order(&self) -> &[BufferSlot] {
        &self.input_bind_order
    }

    pub fn background_paths(&self) -> &[PathBuf] {
        &self.background_paths
    }

    pub fn topology_dirty(&self) -> bool {
        self.topology_dirty
    }

    pub fn images_dirty(&self) -> bool {
        self.images_dirty
    }

    /// Number of passes a rebuild would produce.
    pub fn buildable_passes(&self) -> usize {
        self.shader_paths.len().min(self.pass_count)
    }

    /// True when there are passes and every one of them has a binding entry.
    pub fn bindings_complete(&self) -> bool {
        self.pass_count > 0 && self.input_bind_order.len() >= self.pass_count
    }

    /// Installs a new shader list. The old binding array described a different
    /// graph, so it is cleared; the rebuild waits for a new one.
    pub fn replace_shaders(&mut self, shader_paths: Vec<PathBuf>) {
        self.pass_count = shader_paths.len();
        self.shader_paths = shader_paths;
        self.input_bind_order.clear();
        self.topology_dirty = true;
    }

    /// Installs a new, already validated binding array.
    pub fn replace_topology(&mut self, input_bind_order: Vec<BufferSlot>) {
        self.input_bind_order = input_bind_order;
        self.topology_dirty = true;
    }

    /// Installs new background image paths without touching the topology.
    pub fn replace_backgrounds(&mut self, background_paths: Vec<PathBuf>) {
        self.background_paths = background_paths;
        self.images_dirty = true;
    }

    /// Overwrites everything with a cached snapshot.
    ///
    /// Topology is only marked dirty when the snapshot carries bindings, so a
    /// fresh engine never tries to build a graph it cannot wire.
    pub fn restore(&mut self, cached: &GraphConfig) {
        self.pass_count = cached.pass_count;
        self.shader_paths = cached.shader_paths.clone();
        self.input_bind_order = cached.input_bind_order.clone();
        if !cached.background_paths.is_empty() {
            self.background_paths = cached.background_paths.clone();
            self.images_dirty = true;
        }
        self.topology_dirty = !self.input_bind_order.is_empty();
    }

    /// Called by the engine once a rebuild from the current snapshot finished.
    pub(crate) fn mark_topology_clean(&mut self) {
        self.topology_dirty = false;
    }

    /// Takes the images-dirty flag, returning whether it was set.
    pub(crate) fn take_images_dirty(&mut self) -> bool {
        std::mem::take(&mut self.images_dirty)
    }
}

/// Shorthand for turning a list of strings into paths.
pub(crate) fn to_paths<I, P>(paths: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    paths.into_iter().map(Into::into).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_wire_form() {
        assert_eq!(BufferSlot::from_raw(-1), BufferSlot::Unbound);
        assert_eq!(BufferSlot::from_raw(3), BufferSlot::Bound(3));
        assert_eq!(BufferSlot::Bound(2).to_raw(), 2);
        assert_eq!(BufferSlot::Unbound.to_raw(), -1);
        assert_eq!(BufferSlot::Bound(usize::MAX).to_raw(), -1);
    }

    #[test]
    fn accepts_chain() {
        let slots = parse_topology(&[-1, 0, 1], 3).unwrap();
        assert_eq!(
            slots,
            vec![BufferSlot::Unbound, BufferSlot::Bound(0), BufferSlot::Bound(1)]
        );
    }

    #[test]
    fn rejects_self_reference() {
        assert_eq!(
            parse_topology(&[-1, 1], 2),
            Err(ConfigError::SelfReference { pass: 1 })
        );
    }

    #[test]
    fn rejects_out_of_range() {
        assert_eq!(
            parse_topology(&[-1, 4], 2),
            Err(ConfigError::OutOfRange {
                pass: 1,
                input: 4,
                pass_count: 2
            })
        );
        assert!(matches!(
            parse_topology(&[-2, 0], 2),
            Err(ConfigError::OutOfRange { pass: 0, .. })
        ));
    }

    #[test]
    fn rejects_entries_past_last_pass() {
        assert_eq!(
            parse_topology(&[-1, 0, 1], 2),
            Err(ConfigError::OutOfRange {
                pass: 2,
                input: 1,
                pass_count: 2
            })
        );
        assert_eq!(
            parse_topology(&[-1, 0, -1], 2),
            Err(ConfigError::OutOfRange {
                pass: 2,
                input: -1,
                pass_count: 2
            })
        );
    }

    #[test]
    fn rejects_two_pass_cycle() {
        assert_eq!(
            parse_topology(&[1, 0, 1], 3),
            Err(ConfigError::Cycle { pass: 0 })
        );
    }

    #[test]
    fn rejects_longer_cycle() {
        assert!(matches!(
            parse_topology(&[-1, 3, 1, 2], 4),
            Err(ConfigError::Cycle { .. })
        ));
    }

    #[test]
    fn without_shaders_checks_own_length() {
        assert!(parse_topology(&[-1, 0], 0).is_ok());
        assert!(parse_topology(&[-1, 2], 0).is_err());
    }

    #[test]
    fn new_shaders_clear_bindings() {
        let mut config = GraphConfig::default();
        config.replace_shaders(to_paths(["a", "b"]));
        config.replace_topology(vec![BufferSlot::Unbound, BufferSlot::Bound(0)]);
        config.mark_topology_clean();
        assert!(config.bindings_complete());

        config.replace_shaders(to_paths(["a", "b", "c"]));
        assert_eq!(config.pass_count(), 3);
        assert!(config.input_bind_order().is_empty());
        assert!(config.topology_dirty());
        assert!(!config.bindings_complete());
    }

    #[test]
    fn backgrounds_leave_topology_clean() {
        let mut config = GraphConfig::default();
        config.replace_backgrounds(to_paths(["noise.png"]));
        assert!(config.images_dirty());
        assert!(!config.topology_dirty());
        assert!(config.take_images_dirty());
        assert!(!config.images_dirty());
    }

    #[test]
    fn restore_without_bindings_stays_clean() {
        let mut cached = GraphConfig::default();
        cached.replace_shaders(to_paths(["a", "b"]));

        let mut live = GraphConfig::default();
        live.restore(&cached);
        assert_eq!(live.pass_count(), 2);
        assert!(!live.topology_dirty());

        cached.replace_topology(vec![BufferSlot::Unbound, BufferSlot::Bound(0)]);
        live.restore(&cached);
        assert!(live.topology_dirty());
    }
}
