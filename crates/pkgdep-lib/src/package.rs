//! Package identifiers and the set of packages already present on the target system.

use std::collections::HashSet;
use std::path::Path;

/// Name given could not be turned into a [`PackageName`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("\"{0}\" is not a usable package name")]
pub struct InvalidPackageName(pub String);

/// Normalized package identifier.
///
/// Surrounding and embedded whitespace is removed and the name is lowercased,
/// so `" LibC6 "` and `"libc6"` are the same package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageName(String);

impl PackageName {
	pub fn new(name: impl AsRef<str>) -> Result<Self, InvalidPackageName> {
		let raw = name.as_ref();
		let normalized: String = raw
			.chars()
			.filter(|c| !c.is_whitespace())
			.flat_map(char::to_lowercase)
			.collect();

		/* Names become directory and URL path components. */
		if normalized.is_empty() || normalized.contains(['/', '\\']) || normalized == "." || normalized == ".." {
			return Err(InvalidPackageName(raw.to_string()));
		}

		Ok(Self(normalized))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl std::fmt::Display for PackageName {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.0)
	}
}

impl std::str::FromStr for PackageName {
	type Err = InvalidPackageName;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}

impl TryFrom<String> for PackageName {
	type Error = InvalidPackageName;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::new(value)
	}
}

impl From<PackageName> for String {
	fn from(value: PackageName) -> Self {
		value.0
	}
}

/// Packages known to already be satisfied on the target system.
///
/// An empty set means nothing is known to be installed, so nothing is excluded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstalledSet {
	packages: HashSet<PackageName>,
}

impl InstalledSet {
	pub fn empty() -> Self {
		Self::default()
	}

	/// Loads an `apt list --installed` style manifest.
	///
	/// Each line contributes the text before the first `/` or whitespace as a package name.
	/// Headers such as `Listing...`, `#` comments and blank lines are ignored.
	/// A missing path or unreadable file gives an empty set.
	pub fn load(path: Option<&Path>) -> Self {
		let Some(path) = path else {
			return Self::empty();
		};

		match std::fs::read_to_string(path) {
			Ok(content) => {
				let set = Self::parse(&content);
				log::info!("Loaded {} installed packages from {}", set.len(), path.display());
				set
			},
			Err(e) => {
				log::warn!("Failed to read installed package list {}: {}. Treating nothing as installed.", path.display(), e);
				Self::empty()
			},
		}
	}

	pub fn parse(content: &str) -> Self {
		content
			.lines()
			.map(str::trim)
			.filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with("Listing"))
			.filter_map(|line| line.split(|c: char| c == '/' || c.is_whitespace()).next())
			.filter_map(|name| PackageName::new(name).ok())
			.collect()
	}

	pub fn is_empty(&self) -> bool {
		self.packages.is_empty()
	}

	pub fn len(&self) -> usize {
		self.packages.len()
	}

	pub fn contains(&self, name: &PackageName) -> bool {
		self.packages.contains(name)
	}

	/// Whether a discovered dependency should be expanded by the resolver.
	///
	/// Kept when nothing is known to be installed, or when the name is not installed.
	pub fn should_expand(&self, name: &PackageName) -> bool {
		self.is_empty() || !self.contains(name)
	}
}

impl FromIterator<PackageName> for InstalledSet {
	fn from_iter<T: IntoIterator<Item = PackageName>>(iter: T) -> Self {
		Self { packages: iter.into_iter().collect() }
	}
}
