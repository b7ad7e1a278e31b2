use std::path::{Path, PathBuf};

use tracing::warn;

use crate::coord::RegionPos;
use crate::error::{EditError, EditResult};
use crate::state::{State, StateGroup};

/// An ordered history of [StateGroup]s with a cursor marking "now".
///
/// Before any change is made to the world, the affected regions are checked
/// against history; a snapshot is only stored when something actually
/// differs, and a region whose payload is unchanged since its last full
/// capture is demoted to a header-only state to bound memory use.
#[derive(Debug)]
pub struct StateTracker {
	region_directory: PathBuf,
	states: Vec<StateGroup>,
	current: Option<usize>,
}

impl StateTracker {
	pub fn new(region_directory: PathBuf) -> Self {
		Self {
			region_directory,
			states: Vec::new(),
			current: None,
		}
	}

	fn region_path(&self, pos: RegionPos) -> PathBuf {
		self.region_directory.join(pos.file_name())
	}

	fn external_state_for_region(&self, pos: RegionPos) -> EditResult<State> {
		State::read_external(&self.region_path(pos))
	}

	/// Walk history backward from the cursor for the nearest group holding
	/// any state for `pos`.
	fn find_previous_for_region(&self, pos: RegionPos) -> Option<&State> {
		let current = self.current?;
		self.states[..=current]
			.iter()
			.rev()
			.find_map(|group| group.get(pos))
	}

	/// Walk history backward from the cursor for the nearest full-file
	/// state for `pos`. Can return the current state.
	fn find_previous_external_for_region(&self, pos: RegionPos) -> Option<&State> {
		let current = self.current?;
		self.states[..=current]
			.iter()
			.rev()
			.find_map(|group| group.get(pos).filter(|state| !state.is_internal()))
	}

	/// Capture one region and decide its stored representation.
	/// Returns the state plus whether it differs from its baseline.
	fn snapshot_region(&self, pos: RegionPos) -> EditResult<(State, bool)> {
		let new_state = self.external_state_for_region(pos)?;

		let previous_any = self.find_previous_for_region(pos);
		let previous_external = self.find_previous_external_for_region(pos);
		let (Some(previous_any), Some(previous_external)) = (previous_any, previous_external)
		else {
			// No usable baseline, keep the full capture.
			return Ok((new_state, true));
		};

		if !previous_external.data_matches(&new_state)? {
			return Ok((new_state, true));
		}
		if previous_any.header_matches(&new_state)? {
			// Nothing changed for this region.
			Ok((new_state, false))
		} else {
			// Only the lookup table changed, a header is enough.
			Ok((new_state.as_internal()?, true))
		}
	}

	/// Returns `None` if no region differs from the current snapshot.
	fn snapshot(&self, regions: &[RegionPos]) -> EditResult<Option<StateGroup>> {
		let mut group = StateGroup::default();
		if self.current.is_none() {
			// No history, the snapshot can go ahead with no checks.
			for &pos in regions {
				group.put(pos, self.external_state_for_region(pos)?);
			}
			return Ok(Some(group));
		}

		let mut any_differ = false;
		for &pos in regions {
			let (state, differs) = self.snapshot_region(pos)?;
			any_differ |= differs;
			group.put(pos, state);
		}
		Ok(any_differ.then_some(group))
	}

	/// Take a snapshot of `regions` and append it after the cursor,
	/// discarding any future (redo) groups first.
	///
	/// Returns `true` if a snapshot was taken (something differed from the
	/// current state).
	pub fn snapshot_state(&mut self, regions: &[RegionPos]) -> EditResult<bool> {
		self.remove_future_states();
		let Some(snapshot) = self.snapshot(regions)? else {
			return Ok(false);
		};
		self.states.push(snapshot);
		self.current = Some(self.current.map_or(0, |index| index + 1));
		Ok(true)
	}

	/// Retake the current snapshot in place, refreshing the baseline
	/// immediately before a new destructive action.
	///
	/// Returns `true` if a snapshot was taken.
	pub fn snapshot_overwrite_current(&mut self, regions: &[RegionPos]) -> EditResult<bool> {
		self.remove_future_states();
		let Some(current) = self.current else {
			return Ok(false);
		};
		let Some(snapshot) = self.snapshot(regions)? else {
			return Ok(false);
		};
		self.states[current] = snapshot;
		Ok(true)
	}

	/// The after-edit snapshot: per-region failures are logged and
	/// collected but never abort the pass. Regions that could be read
	/// still form a group.
	pub fn snapshot_state_no_fail(&mut self, regions: &[RegionPos]) -> (bool, Vec<EditError>) {
		self.remove_future_states();
		let mut failures = Vec::new();
		let mut group = StateGroup::default();
		let mut any_differ = false;

		for &pos in regions {
			let result = if self.current.is_none() {
				self.external_state_for_region(pos).map(|state| (state, true))
			} else {
				self.snapshot_region(pos)
			};
			match result {
				Ok((state, differs)) => {
					any_differ |= differs;
					group.put(pos, state);
				}
				Err(error) => {
					warn!("failed to snapshot region {pos}: {error}");
					failures.push(error.for_region(pos));
				}
			}
		}

		if any_differ && !group.is_empty() {
			self.states.push(group);
			self.current = Some(self.current.map_or(0, |index| index + 1));
			(true, failures)
		} else {
			(false, failures)
		}
	}

	pub fn has_state(&self) -> bool {
		self.current.is_some()
	}

	pub fn current_state(&self) -> Option<&StateGroup> {
		Some(&self.states[self.current?])
	}

	pub fn has_previous_state(&self) -> bool {
		self.current.map_or(false, |index| index > 0)
	}

	/// Move the cursor back one step and return the group there.
	pub fn previous_state(&mut self) -> EditResult<&StateGroup> {
		match self.current {
			Some(index) if index > 0 => {
				self.current = Some(index - 1);
				Ok(&self.states[index - 1])
			}
			_ => Err(EditError::NoPreviousState),
		}
	}

	pub fn has_next_state(&self) -> bool {
		match self.current {
			Some(index) => index + 1 < self.states.len(),
			None => !self.states.is_empty(),
		}
	}

	/// Move the cursor forward one step and return the group there.
	pub fn next_state(&mut self) -> EditResult<&StateGroup> {
		let next = self.current.map_or(0, |index| index + 1);
		if next >= self.states.len() {
			return Err(EditError::NoNextState);
		}
		self.current = Some(next);
		Ok(&self.states[next])
	}

	/// Remove all states after the current one.
	pub fn remove_future_states(&mut self) {
		if let Some(current) = self.current {
			self.states.truncate(current + 1);
		}
	}

	pub fn state_count(&self) -> usize {
		self.states.len()
	}

	/// Remove all stored states.
	pub fn remove_all_states(&mut self) {
		self.states.clear();
		self.current = None;
	}

	/// Total memory-resident bytes across all stored states, for the
	/// caller's memory-budget policy.
	pub fn total_size_bytes(&self) -> u64 {
		self.states
			.iter()
			.flat_map(|group| group.states().values())
			.map(|state| state.size())
			.sum()
	}

	/// Total temp-file bytes across all stored states.
	pub fn total_on_disk_bytes(&self) -> u64 {
		self.states
			.iter()
			.flat_map(|group| group.states().values())
			.map(|state| state.on_disk_size())
			.sum()
	}

	/// Spill every memory-resident full-file state to disk. Hook for the
	/// caller's memory-budget policy.
	pub fn allow_states_to_disk(&mut self) {
		for group in &mut self.states {
			for state in group.iter_mut() {
				state.allow_to_disk();
			}
		}
	}

	pub fn region_directory(&self) -> &Path {
		&self.region_directory
	}
}
