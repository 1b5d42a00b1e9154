use std::collections::HashSet;
use std::sync::Mutex;

use crate::PackageName;

#[derive(Debug, Default)]
struct Inner {
	seen: HashSet<PackageName>,
	order: Vec<PackageName>,
}

/// Packages already claimed for expansion, shared by every worker of a resolve.
///
/// Claiming is a single check-and-insert under one lock, so when the same name is
/// discovered through several parents at once exactly one of them wins.
#[derive(Debug, Default)]
pub struct VisitedSet {
	inner: Mutex<Inner>,
}

impl VisitedSet {
	pub fn new() -> Self {
		Self::default()
	}

	/// Marks `name` as visited.
	///
	/// Returns `true` only for the first caller, who is then responsible for expanding it.
	pub fn claim(&self, name: &PackageName) -> bool {
		let mut inner = self.lock();
		if inner.seen.insert(name.clone()) {
			inner.order.push(name.clone());
			true
		} else {
			false
		}
	}

	pub fn len(&self) -> usize {
		self.lock().order.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Names in the order they were first claimed.
	pub fn discovery_order(&self) -> Vec<PackageName> {
		self.lock().order.clone()
	}

	pub fn into_discovery_order(self) -> Vec<PackageName> {
		self.inner.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner()).order
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
		self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}
}
