use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::coord::RegionPos;

/// The master error type.
#[derive(Debug, Error)]
pub enum EditError {
	#[error("{0}")]
	Custom(String),
	#[error("IO Error: {0}")]
	IoError(#[from] std::io::Error),
	#[error("Attempted to access a released state.")]
	ReleasedState,
	#[error("Region file is too small to contain a header. {0}")]
	CorruptRegionFile(PathBuf),
	#[error("Region {pos}: {source}")]
	RegionFailed {
		pos: RegionPos,
		source: Box<EditError>,
	},
	#[error("Failed to take a complete snapshot after deleting chunks. The chunks HAVE been deleted.")]
	PostSnapshot(#[source] Box<AggregateError>),
	#[error("Tried to get previous state when none exists.")]
	NoPreviousState,
	#[error("Tried to get next state when none exists.")]
	NoNextState,
	#[error("Region directory not found. {0}")]
	RegionDirectoryNotFound(PathBuf),
}

impl EditError {
	#[inline(always)]
	pub fn custom<T, S: AsRef<str>>(msg: S) -> Result<T, Self> {
		Err(EditError::Custom(msg.as_ref().to_owned()))
	}

	/// Attach the region that a failure happened in.
	pub fn for_region(self, pos: RegionPos) -> Self {
		EditError::RegionFailed {
			pos,
			source: Box::new(self),
		}
	}
}

pub type EditResult<T> = Result<T, EditError>;

/// A primary failure plus every secondary failure that was collected while
/// the operation continued past it. Best-effort batch I/O reports one of
/// these instead of stopping at the first bad region.
#[derive(Debug)]
pub struct AggregateError {
	pub primary: EditError,
	pub secondary: Vec<EditError>,
}

impl AggregateError {
	pub fn new(primary: EditError) -> Self {
		Self {
			primary,
			secondary: Vec::new(),
		}
	}

	/// Collapse a list of collected failures into one aggregate.
	/// The first failure becomes the primary cause.
	pub fn from_failures(failures: Vec<EditError>) -> Option<Self> {
		let mut iter = failures.into_iter();
		let primary = iter.next()?;
		Some(Self {
			primary,
			secondary: iter.collect(),
		})
	}

	pub fn push(&mut self, error: EditError) {
		self.secondary.push(error);
	}
}

impl fmt::Display for AggregateError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.primary)?;
		if !self.secondary.is_empty() {
			write!(f, " ({} more failure(s) suppressed)", self.secondary.len())?;
		}
		Ok(())
	}
}

impl std::error::Error for AggregateError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		Some(&self.primary)
	}
}
