use std::str::FromStr;

use strum_macros::{Display, EnumString, IntoStaticStr};

use crate::error::WrapError;

/// Priority class of an interceptor.
///
/// The declaration order is the dispatch order: every `AlwaysContinues` entry
/// runs before every `MayContinue` entry, which runs before the (single)
/// `NeverContinues` entry.
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Display, EnumString, IntoStaticStr,
)]
#[strum(ascii_case_insensitive)]
pub enum Category {
	/// Must always call its continuation. Failing to do so is a contract
	/// violation and gets the interceptor unregistered.
	#[strum(to_string = "ALWAYS_CONTINUES", serialize = "WRAPPER")]
	AlwaysContinues,
	/// Usually continues, but may end the chain early. Ending it while other
	/// packages are still queued is reported as a potential conflict.
	#[default]
	#[strum(to_string = "MAY_CONTINUE", serialize = "MIXED")]
	MayContinue,
	/// Replaces the rest of the chain. Only one may exist per target path.
	#[strum(to_string = "NEVER_CONTINUES", serialize = "OVERRIDE")]
	NeverContinues,
}

impl Category {
	/// Parses a category name case-insensitively.
	///
	/// # Errors
	///
	/// Returns [`WrapError::InvalidCategory`] for anything but the three
	/// category names (or their short aliases).
	pub fn parse(name: &str) -> Result<Self, WrapError> {
		Self::from_str(name).map_err(|_: strum::ParseError| WrapError::InvalidCategory(name.to_string()))
	}

	/// Rank used for ordering; lower dispatches first.
	pub const fn rank(self) -> u8 {
		self as u8
	}
}

/// Dispatch strategy requested by an interceptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, IntoStaticStr)]
#[strum(ascii_case_insensitive, serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PerformanceMode {
	/// Full dispatch with conflict detection.
	Normal,
	/// Allow the precomputed per-receiver chain.
	Fast,
	/// Follow the global fast-mode setting.
	#[default]
	Automatic,
}

impl PerformanceMode {
	/// Resolves the hint against the global fast-mode flag.
	pub const fn is_fast(self, fast_mode: bool) -> bool {
		match self {
			Self::Normal => false,
			Self::Fast => true,
			Self::Automatic => fast_mode,
		}
	}
}
