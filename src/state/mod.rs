pub mod group;
pub mod tracker;

pub use group::StateGroup;
pub use tracker::StateTracker;

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::warn;

use crate::error::{EditError, EditResult};

/// Size of the lookup table at the start of every region file.
/// 1024 entries of 4 bytes each.
pub const HEADER_SIZE_BYTES: usize = 4096;

/// The bytes of one region file at one point in time.
///
/// An [Internal](State::Internal) state holds only the lookup table, used
/// when nothing past the header changed since the last full capture.
/// An [External](State::External) state holds the entire file, because some
/// of the payload changed and the safe approach is to keep all of it.
#[derive(Debug)]
pub enum State {
	Internal(InternalState),
	External(ExternalState),
}

/// A header-only snapshot of a region file. Always memory-resident.
#[derive(Debug)]
pub struct InternalState {
	header: Box<[u8; HEADER_SIZE_BYTES]>,
}

/// A snapshot of an entire region file.
///
/// Starts out memory-resident; may be spilled to a private temp file once
/// via [ExternalState::allow_to_disk], and ends its life released with
/// neither copy. The temp file is deleted when the state is released or
/// dropped.
#[derive(Debug)]
pub struct ExternalState {
	len: u64,
	residency: Residency,
}

#[derive(Debug)]
enum Residency {
	InMemory(Vec<u8>),
	OnDisk(NamedTempFile),
	Released,
}

impl InternalState {
	/// Read only the lookup table from the region file at `path`.
	pub fn read_from(path: &Path) -> EditResult<Self> {
		let mut header = Box::new([0u8; HEADER_SIZE_BYTES]);
		let mut file = File::open(path)?;
		file.read_exact(&mut header[..])?;
		Ok(Self { header })
	}

	pub fn header(&self) -> &[u8] {
		&self.header[..]
	}

	/// Write the captured lookup table back over the start of the region
	/// file at `path`. The payload past the table is left untouched.
	pub fn write_to(&self, path: &Path) -> EditResult<()> {
		let mut file = File::options().write(true).open(path)?;
		file.seek(SeekFrom::Start(0))?;
		file.write_all(&self.header[..])?;
		Ok(())
	}
}

impl ExternalState {
	/// Read the entire region file at `path`.
	pub fn read_from(path: &Path) -> EditResult<Self> {
		let bytes = std::fs::read(path)?;
		Ok(Self {
			len: bytes.len() as u64,
			residency: Residency::InMemory(bytes),
		})
	}

	/// Total length of the captured file, regardless of residency.
	pub fn len(&self) -> u64 {
		self.len
	}

	/// Copy out the byte range `[from, to)` of the captured file.
	/// The range is clamped to the captured length.
	fn read_range(&self, from: u64, to: u64) -> EditResult<Vec<u8>> {
		let to = to.min(self.len);
		let from = from.min(to);
		match &self.residency {
			Residency::InMemory(bytes) => Ok(bytes[from as usize..to as usize].to_vec()),
			Residency::OnDisk(temp) => {
				let mut file = File::open(temp.path())?;
				file.seek(SeekFrom::Start(from))?;
				let mut out = vec![0u8; (to - from) as usize];
				file.read_exact(&mut out)?;
				Ok(out)
			}
			Residency::Released => Err(EditError::ReleasedState),
		}
	}

	fn header_bytes(&self) -> EditResult<Vec<u8>> {
		self.read_range(0, HEADER_SIZE_BYTES as u64)
	}

	/// Bytes resident in memory.
	pub fn size(&self) -> u64 {
		match self.residency {
			Residency::InMemory(_) => self.len,
			_ => 0,
		}
	}

	/// Bytes resident in the temp file.
	pub fn on_disk_size(&self) -> u64 {
		match self.residency {
			Residency::OnDisk(_) => self.len,
			_ => 0,
		}
	}

	/// Spill the captured bytes to a private temp file, freeing the memory
	/// copy. No-op if already on disk. A failed spill is logged and the
	/// state stays in memory.
	///
	/// # Panics
	/// If the state was already released. Spilling a released state is a
	/// contract violation, not an I/O condition.
	pub fn allow_to_disk(&mut self) {
		let bytes = match &self.residency {
			Residency::OnDisk(_) => return,
			Residency::Released => panic!("attempted to spill a released state to disk"),
			Residency::InMemory(bytes) => bytes,
		};
		match spill(bytes) {
			Ok(temp) => self.residency = Residency::OnDisk(temp),
			Err(error) => warn!("failed to commit state to disk: {error}"),
		}
	}

	/// Free the memory copy and delete any temp file. Idempotent; any
	/// later content access fails with [EditError::ReleasedState].
	pub fn release(&mut self) {
		// Dropping the NamedTempFile deletes it.
		self.residency = Residency::Released;
	}

	/// Write the captured bytes verbatim to the region file at `path`,
	/// fully replacing its contents.
	pub fn write_to(&self, path: &Path) -> EditResult<()> {
		let bytes = self.read_range(0, self.len)?;
		std::fs::write(path, bytes)?;
		Ok(())
	}
}

fn spill(bytes: &[u8]) -> std::io::Result<NamedTempFile> {
	let mut temp = tempfile::Builder::new()
		.prefix("chunkedit-")
		.suffix(".bin")
		.tempfile()?;
	temp.write_all(bytes)?;
	temp.flush()?;
	Ok(temp)
}

impl State {
	/// Take a full capture of the region file at `path`.
	pub fn read_external(path: &Path) -> EditResult<Self> {
		Ok(State::External(ExternalState::read_from(path)?))
	}

	/// Capture only the lookup table of the region file at `path`.
	pub fn read_internal(path: &Path) -> EditResult<Self> {
		Ok(State::Internal(InternalState::read_from(path)?))
	}

	pub fn is_internal(&self) -> bool {
		matches!(self, State::Internal(_))
	}

	fn header_bytes(&self) -> EditResult<Vec<u8>> {
		match self {
			State::Internal(state) => Ok(state.header.to_vec()),
			State::External(state) => state.header_bytes(),
		}
	}

	/// Compare the lookup tables of both states, whatever their variants.
	pub fn header_matches(&self, other: &State) -> EditResult<bool> {
		Ok(self.header_bytes()? == other.header_bytes()?)
	}

	/// Compare the payload past the lookup table. An internal state has no
	/// payload, so any comparison involving one is `false`.
	pub fn data_matches(&self, other: &State) -> EditResult<bool> {
		let (State::External(this), State::External(that)) = (self, other) else {
			return Ok(false);
		};
		if this.len != that.len {
			return Ok(false);
		}
		Ok(this.read_range(HEADER_SIZE_BYTES as u64, this.len)?
			== that.read_range(HEADER_SIZE_BYTES as u64, that.len)?)
	}

	/// Get the header data from this state as an internal state.
	pub fn as_internal(&self) -> EditResult<State> {
		let bytes = self.header_bytes()?;
		let mut header = Box::new([0u8; HEADER_SIZE_BYTES]);
		header[..bytes.len()].copy_from_slice(&bytes);
		Ok(State::Internal(InternalState { header }))
	}

	/// Bytes resident in memory.
	pub fn size(&self) -> u64 {
		match self {
			State::Internal(_) => HEADER_SIZE_BYTES as u64,
			State::External(state) => state.size(),
		}
	}

	/// Bytes resident in a temp file.
	pub fn on_disk_size(&self) -> u64 {
		match self {
			State::Internal(_) => 0,
			State::External(state) => state.on_disk_size(),
		}
	}

	/// Spill a memory-resident external state to disk. No-op for internal
	/// states, which always stay in memory.
	pub fn allow_to_disk(&mut self) {
		if let State::External(state) = self {
			state.allow_to_disk();
		}
	}

	/// Release any held content. No-op for internal states.
	pub fn release(&mut self) {
		if let State::External(state) = self {
			state.release();
		}
	}

	/// Write this state's bytes back to the region file at `path`.
	/// An external state replaces the whole file; an internal state
	/// rewrites only the lookup table in place.
	pub fn write_to(&self, path: &Path) -> EditResult<()> {
		match self {
			State::Internal(state) => state.write_to(path),
			State::External(state) => state.write_to(path),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn region_bytes(header_fill: u8, payload: &[u8]) -> Vec<u8> {
		let mut bytes = vec![header_fill; HEADER_SIZE_BYTES];
		bytes.extend_from_slice(payload);
		bytes
	}

	fn write_temp(bytes: &[u8]) -> (tempfile::TempDir, std::path::PathBuf) {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("r.0.0.mca");
		std::fs::write(&path, bytes).unwrap();
		(dir, path)
	}

	#[test]
	fn header_and_data_comparison() {
		let (_dir_a, path_a) = write_temp(&region_bytes(1, b"payload"));
		let (_dir_b, path_b) = write_temp(&region_bytes(2, b"payload"));
		let (_dir_c, path_c) = write_temp(&region_bytes(1, b"other!!"));

		let a = State::read_external(&path_a).unwrap();
		let b = State::read_external(&path_b).unwrap();
		let c = State::read_external(&path_c).unwrap();

		assert!(!a.header_matches(&b).unwrap());
		assert!(a.data_matches(&b).unwrap());
		assert!(a.header_matches(&c).unwrap());
		assert!(!a.data_matches(&c).unwrap());
	}

	#[test]
	fn data_never_matches_internal() {
		let (_dir, path) = write_temp(&region_bytes(1, b"payload"));
		let external = State::read_external(&path).unwrap();
		let internal = State::read_internal(&path).unwrap();

		assert!(external.header_matches(&internal).unwrap());
		assert!(!external.data_matches(&internal).unwrap());
		assert!(!internal.data_matches(&external).unwrap());
	}

	#[test]
	fn as_internal_copies_header() {
		let (_dir, path) = write_temp(&region_bytes(7, b"payload"));
		let external = State::read_external(&path).unwrap();
		let internal = external.as_internal().unwrap();

		assert!(internal.is_internal());
		assert!(internal.header_matches(&external).unwrap());
		assert_eq!(internal.size(), HEADER_SIZE_BYTES as u64);
	}

	#[test]
	fn spill_round_trips_content() {
		let (_dir, path) = write_temp(&region_bytes(3, b"spill me"));
		let baseline = State::read_external(&path).unwrap();
		let mut spilled = State::read_external(&path).unwrap();

		let len = match &spilled {
			State::External(state) => state.len(),
			_ => unreachable!(),
		};
		spilled.allow_to_disk();
		assert_eq!(spilled.size(), 0);
		assert_eq!(spilled.on_disk_size(), len);

		// Spilling again is a no-op.
		spilled.allow_to_disk();
		assert!(spilled.header_matches(&baseline).unwrap());
		assert!(spilled.data_matches(&baseline).unwrap());
	}

	#[test]
	fn released_state_access_fails() {
		let (_dir, path) = write_temp(&region_bytes(3, b"payload"));
		let other = State::read_external(&path).unwrap();
		let mut state = State::read_external(&path).unwrap();

		state.release();
		state.release();
		assert_eq!(state.size(), 0);
		assert_eq!(state.on_disk_size(), 0);
		assert!(matches!(
			state.header_matches(&other),
			Err(EditError::ReleasedState)
		));
	}

	#[test]
	#[should_panic]
	fn spilling_released_state_panics() {
		let (_dir, path) = write_temp(&region_bytes(3, b"payload"));
		let mut state = ExternalState::read_from(&path).unwrap();
		state.release();
		state.allow_to_disk();
	}

	#[test]
	fn write_back_restores_bytes() {
		let original = region_bytes(9, b"original payload");
		let (_dir, path) = write_temp(&original);
		let state = State::read_external(&path).unwrap();

		std::fs::write(&path, region_bytes(0, b"clobbered")).unwrap();
		state.write_to(&path).unwrap();
		assert_eq!(std::fs::read(&path).unwrap(), original);
	}

	#[test]
	fn internal_write_back_keeps_payload() {
		let original = region_bytes(9, b"keep this payload");
		let (_dir, path) = write_temp(&original);
		let state = State::read_internal(&path).unwrap();

		// Clobber the header only, then restore it.
		let mut clobbered = original.clone();
		clobbered[..HEADER_SIZE_BYTES].fill(0);
		std::fs::write(&path, &clobbered).unwrap();

		state.write_to(&path).unwrap();
		assert_eq!(std::fs::read(&path).unwrap(), original);
	}
}
