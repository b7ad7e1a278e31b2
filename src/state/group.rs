use std::collections::HashMap;

use crate::coord::RegionPos;
use crate::state::State;

/// One snapshot event across a selected set of regions: a mapping from
/// region coordinate to the state captured for it. Immutable once stored
/// in the tracker.
#[derive(Debug, Default)]
pub struct StateGroup {
	states: HashMap<RegionPos, State>,
	has_external: bool,
}

impl StateGroup {
	pub(crate) fn put(&mut self, pos: RegionPos, state: State) {
		if !state.is_internal() {
			self.has_external = true;
		}
		self.states.insert(pos, state);
	}

	pub fn get(&self, pos: RegionPos) -> Option<&State> {
		self.states.get(&pos)
	}

	/// Whether any member is a full-file capture. Only such a group can
	/// serve as a baseline for payload diffing.
	pub fn has_external(&self) -> bool {
		self.has_external
	}

	pub fn states(&self) -> &HashMap<RegionPos, State> {
		&self.states
	}

	pub fn regions(&self) -> impl Iterator<Item = RegionPos> + '_ {
		self.states.keys().copied()
	}

	pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut State> {
		self.states.values_mut()
	}

	pub fn len(&self) -> usize {
		self.states.len()
	}

	pub fn is_empty(&self) -> bool {
		self.states.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::state::{ExternalState, InternalState, HEADER_SIZE_BYTES};

	fn sample_states() -> (State, State) {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("r.0.0.mca");
		std::fs::write(&path, vec![1u8; HEADER_SIZE_BYTES * 2]).unwrap();
		(
			State::Internal(InternalState::read_from(&path).unwrap()),
			State::External(ExternalState::read_from(&path).unwrap()),
		)
	}

	#[test]
	fn tracks_external_members() {
		let (internal, external) = sample_states();
		let mut group = StateGroup::default();
		assert!(!group.has_external());

		group.put(RegionPos::new(0, 0), internal);
		assert!(!group.has_external());

		group.put(RegionPos::new(1, 0), external);
		assert!(group.has_external());
		assert_eq!(group.len(), 2);
		assert!(group.get(RegionPos::new(1, 0)).is_some());
		assert!(group.get(RegionPos::new(2, 2)).is_none());
	}
}
