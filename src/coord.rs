use std::io::SeekFrom;

/// Coordinate of a region file within a world's region directory.
/// Each region holds a 32x32 block of chunks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegionPos {
	pub x: i32,
	pub z: i32,
}

impl RegionPos {
	#[inline(always)]
	pub fn new(x: i32, z: i32) -> Self {
		Self { x, z }
	}

	/// The name of this region's file on disk.
	pub fn file_name(&self) -> String {
		format!("r.{}.{}.mca", self.x, self.z)
	}
}

/// A chunk coordinate in world space.
/// The low 5 bits of each axis locate the chunk within its region.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkPos {
	pub x: i32,
	pub z: i32,
}

impl ChunkPos {
	#[inline(always)]
	pub fn new(x: i32, z: i32) -> Self {
		Self { x, z }
	}

	/// The region file this chunk lives in.
	pub fn region(&self) -> RegionPos {
		RegionPos::new(self.x >> 5, self.z >> 5)
	}

	/// Index of this chunk's entry in its region's lookup table.
	pub fn region_index(&self) -> usize {
		((self.x & 31) + (self.z & 31) * 32) as usize
	}

	/// Get a [SeekFrom] value that can be used to seek to the location where
	/// this chunk's entry is stored in the region's lookup table.
	pub fn table_offset(&self) -> SeekFrom {
		SeekFrom::Start(self.region_index() as u64 * 4)
	}
}

impl From<(i32, i32)> for RegionPos {
	fn from(value: (i32, i32)) -> Self {
		Self::new(value.0, value.1)
	}
}

impl From<RegionPos> for (i32, i32) {
	fn from(value: RegionPos) -> Self {
		(value.x, value.z)
	}
}

impl From<(i32, i32)> for ChunkPos {
	fn from(value: (i32, i32)) -> Self {
		Self::new(value.0, value.1)
	}
}

impl From<ChunkPos> for (i32, i32) {
	fn from(value: ChunkPos) -> Self {
		(value.x, value.z)
	}
}

impl std::fmt::Display for RegionPos {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "({}, {})", self.x, self.z)
	}
}

impl std::fmt::Display for ChunkPos {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "({}, {})", self.x, self.z)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn chunk_to_region() {
		assert_eq!(ChunkPos::new(0, 0).region(), RegionPos::new(0, 0));
		assert_eq!(ChunkPos::new(31, 31).region(), RegionPos::new(0, 0));
		assert_eq!(ChunkPos::new(32, 0).region(), RegionPos::new(1, 0));
		assert_eq!(ChunkPos::new(-1, -1).region(), RegionPos::new(-1, -1));
		assert_eq!(ChunkPos::new(-32, -33).region(), RegionPos::new(-1, -2));
	}

	#[test]
	fn table_index() {
		assert_eq!(ChunkPos::new(0, 0).region_index(), 0);
		assert_eq!(ChunkPos::new(31, 0).region_index(), 31);
		assert_eq!(ChunkPos::new(0, 1).region_index(), 32);
		assert_eq!(ChunkPos::new(31, 31).region_index(), 1023);
		// Negative coordinates wrap within the region.
		assert_eq!(ChunkPos::new(-1, -1).region_index(), 1023);
		assert_eq!(ChunkPos::new(33, 2).region_index(), 1 + 2 * 32);
	}

	#[test]
	fn table_offset_is_four_bytes_per_entry() {
		assert_eq!(ChunkPos::new(3, 2).table_offset(), SeekFrom::Start(4 * (3 + 2 * 32)));
	}

	#[test]
	fn region_file_name() {
		assert_eq!(RegionPos::new(0, 0).file_name(), "r.0.0.mca");
		assert_eq!(RegionPos::new(-3, 12).file_name(), "r.-3.12.mca");
	}
}
