use std::collections::HashMap;
use std::fs::File;
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use byteorder::{BigEndian, WriteBytesExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::{self, JoinHandle};
use tracing::{debug, warn};

use crate::coord::{ChunkPos, RegionPos};
use crate::error::{AggregateError, EditError, EditResult};
use crate::state::{StateTracker, HEADER_SIZE_BYTES};

/// Exclusive access to a world directory, guarding it against concurrent
/// structural edits. Implementations must not block in [try_lock](WorldLock::try_lock).
pub trait WorldLock: Send + Sync {
	fn try_lock(&self) -> bool;
}

/// Notifications handed off to the single-threaded owner of the in-memory
/// world view. One message per completed operation, delivered in FIFO order
/// relative to everything else sent on the same channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldEvent {
	/// Chunks were removed from disk; the world view should mark them empty.
	ChunksDeleted(Vec<ChunkPos>),
	/// Region files were rewritten by an undo; the map loader should reload them.
	RegionsRestored(Vec<RegionPos>),
}

/// Outcome of a delete or undo that ran to completion.
///
/// Once this value exists the destructive writes have been committed to
/// disk; `warning` only carries per-region and bookkeeping failures that
/// were collected while the operation kept going.
#[derive(Debug)]
#[must_use]
pub struct Completion {
	pub warning: Option<AggregateError>,
}

impl Completion {
	pub fn is_clean(&self) -> bool {
		self.warning.is_none()
	}
}

/// Coordinates destructive edits against a world's region directory.
///
/// Drives the snapshot-before / mutate / snapshot-after sequence for chunk
/// deletion, and replays stored snapshots back to disk for undo. All
/// blocking file I/O runs on the worker pool; the returned [JoinHandle]
/// represents the in-flight operation.
pub struct WorldState {
	region_directory: PathBuf,
	world_lock: Arc<dyn WorldLock>,
	tracker: Arc<Mutex<StateTracker>>,
	events: mpsc::UnboundedSender<WorldEvent>,
}

impl WorldState {
	/// Open the state for the world at `world_directory`. Region files are
	/// expected under its `region` subdirectory.
	pub fn new(
		world_directory: &Path,
		world_lock: Arc<dyn WorldLock>,
		events: mpsc::UnboundedSender<WorldEvent>,
	) -> EditResult<Self> {
		let region_directory = world_directory.join("region");
		if !region_directory.is_dir() {
			return Err(EditError::RegionDirectoryNotFound(region_directory));
		}
		Ok(Self {
			tracker: Arc::new(Mutex::new(StateTracker::new(region_directory.clone()))),
			region_directory,
			world_lock,
			events,
		})
	}

	/// Delete the given chunks from their region files.
	///
	/// Returns `None` if the operation could not start: no chunks were
	/// given, the world lock is contended, or the before-snapshot failed.
	/// Nothing has been written to disk in any of those cases. Once a
	/// handle is returned the operation runs to completion; per-region
	/// failures are aggregated into the completion's warning instead of
	/// aborting it.
	pub async fn delete_chunks<I>(&self, chunks: I) -> Option<JoinHandle<Completion>>
	where
		I: IntoIterator<Item = ChunkPos>,
	{
		if !self.world_lock.try_lock() {
			debug!("world is locked, not deleting chunks");
			return None;
		}

		let mut selection: HashMap<RegionPos, Vec<ChunkPos>> = HashMap::new();
		for chunk in chunks {
			selection.entry(chunk.region()).or_default().push(chunk);
		}
		if selection.is_empty() {
			return None;
		}
		let regions: Vec<RegionPos> = selection.keys().copied().collect();

		// Overwrite the current snapshot if one exists, ready to be undone;
		// otherwise take a fresh one.
		let before = {
			let tracker = Arc::clone(&self.tracker);
			let regions = regions.clone();
			task::spawn_blocking(move || {
				let mut tracker = tracker.blocking_lock();
				if tracker.has_state() {
					tracker.snapshot_overwrite_current(&regions)
				} else {
					tracker.snapshot_state(&regions)
				}
			})
			.await
		};
		match before {
			Ok(Ok(_)) => {}
			Ok(Err(error)) => {
				// Nothing has been written yet, so this can cancel safely.
				warn!("could not take snapshot of regions, aborting: {error}");
				return None;
			}
			Err(error) => {
				warn!("snapshot task failed, aborting: {error}");
				return None;
			}
		}

		let tracker = Arc::clone(&self.tracker);
		let region_directory = self.region_directory.clone();
		let events = self.events.clone();
		Some(tokio::spawn(async move {
			let mutation = {
				let region_directory = region_directory.clone();
				let selection = selection.clone();
				task::spawn_blocking(move || delete_from_regions(&region_directory, &selection))
					.await
			};
			let mutation_failures = match mutation {
				Ok(failures) => failures,
				Err(error) => vec![EditError::Custom(format!("deletion task failed: {error}"))],
			};

			// The chunks are now gone from disk. Snapshot the new state so
			// a later undo can detect further external changes; a failure
			// here must not be reported as a failed deletion.
			let post = {
				let tracker = Arc::clone(&tracker);
				task::spawn_blocking(move || tracker.blocking_lock().snapshot_state_no_fail(&regions))
					.await
			};
			let post_failures = match post {
				Ok((_, failures)) => failures,
				Err(error) => vec![EditError::Custom(format!(
					"post-deletion snapshot task failed: {error}"
				))],
			};

			let warning = match AggregateError::from_failures(post_failures) {
				Some(post_aggregate) => {
					let mut warning =
						AggregateError::new(EditError::PostSnapshot(Box::new(post_aggregate)));
					warning.secondary = mutation_failures;
					Some(warning)
				}
				None => AggregateError::from_failures(mutation_failures),
			};

			let deleted: Vec<ChunkPos> = selection.into_values().flatten().collect();
			if events.send(WorldEvent::ChunksDeleted(deleted)).is_err() {
				debug!("world view receiver dropped, skipping chunk notifications");
			}

			if let Some(warning) = &warning {
				warn!("chunk deletion completed with failures: {warning}");
			}
			Completion { warning }
		}))
	}

	/// Restore every region captured by the previous history entry.
	///
	/// Returns `None` if there is no previous state or the world lock is
	/// contended. Per-region write failures are aggregated; regions that
	/// could be restored still are.
	pub async fn undo(&self) -> Option<JoinHandle<Completion>> {
		if !self.tracker.lock().await.has_previous_state() {
			return None;
		}
		if !self.world_lock.try_lock() {
			debug!("world is locked, not undoing");
			return None;
		}

		let tracker = Arc::clone(&self.tracker);
		let region_directory = self.region_directory.clone();
		let events = self.events.clone();
		Some(tokio::spawn(async move {
			let restore = task::spawn_blocking(move || {
				let mut tracker = tracker.blocking_lock();
				let group = match tracker.previous_state() {
					Ok(group) => group,
					Err(error) => return (Vec::new(), vec![error]),
				};
				let mut written = Vec::new();
				let mut failures = Vec::new();
				for (&pos, state) in group.states() {
					match state.write_to(&region_directory.join(pos.file_name())) {
						Ok(()) => written.push(pos),
						Err(error) => failures.push(error.for_region(pos)),
					}
				}
				(written, failures)
			})
			.await;
			let (written, failures) = match restore {
				Ok(result) => result,
				Err(error) => (
					Vec::new(),
					vec![EditError::Custom(format!("undo task failed: {error}"))],
				),
			};

			if !written.is_empty() && events.send(WorldEvent::RegionsRestored(written)).is_err() {
				debug!("world view receiver dropped, skipping region notifications");
			}

			let warning = AggregateError::from_failures(failures);
			if let Some(warning) = &warning {
				warn!("undo completed with failures: {warning}");
			}
			Completion { warning }
		}))
	}

	/// The tracker holding this world's history. Exposed for the caller's
	/// memory-budget policy, which may spill or drop stored states.
	pub fn tracker(&self) -> Arc<Mutex<StateTracker>> {
		Arc::clone(&self.tracker)
	}

	pub fn region_directory(&self) -> &Path {
		&self.region_directory
	}
}

/// Zero the lookup-table entries for the selected chunks in each region
/// file. A failure in one region does not stop the rest; collected
/// failures are returned for aggregation.
fn delete_from_regions(
	region_directory: &Path,
	selection: &HashMap<RegionPos, Vec<ChunkPos>>,
) -> Vec<EditError> {
	let mut failures = Vec::new();
	for (&pos, chunks) in selection {
		match delete_from_region(&region_directory.join(pos.file_name()), chunks) {
			Ok(()) => {}
			Err(error @ EditError::CorruptRegionFile(_)) => {
				// The file cannot contain the table being edited.
				warn!("{error}, skipping region {pos}");
			}
			Err(error) => failures.push(error.for_region(pos)),
		}
	}
	failures
}

fn delete_from_region(path: &Path, chunks: &[ChunkPos]) -> EditResult<()> {
	let mut file = File::options().read(true).write(true).open(path)?;
	let length = file.metadata()?.len();
	if length < 2 * HEADER_SIZE_BYTES as u64 {
		return Err(EditError::CorruptRegionFile(path.to_path_buf()));
	}
	for chunk in chunks {
		// A zero table entry marks the chunk slot as empty.
		file.seek(chunk.table_offset())?;
		file.write_u32::<BigEndian>(0)?;
	}
	file.flush()?;
	Ok(())
}
