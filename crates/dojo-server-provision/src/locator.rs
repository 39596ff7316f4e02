// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Repository locator validation.
//!
//! A [`RepositoryLocator`] can only be obtained from
//! [`LocatorPolicy::validate`], so every value handed to the clone step has
//! already matched the accepted-source grammar.

use regex::Regex;

use crate::error::{ProvisionError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
	Https,
	Ssh,
}

/// A repository locator that matched the accepted-source grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryLocator {
	raw: String,
	transport: Transport,
	owner: String,
	repo: String,
}

impl RepositoryLocator {
	pub fn as_str(&self) -> &str {
		&self.raw
	}

	pub fn transport(&self) -> Transport {
		self.transport
	}

	pub fn owner(&self) -> &str {
		&self.owner
	}

	/// Repository name with any `.git` suffix removed.
	pub fn repo_name(&self) -> &str {
		self.repo.strip_suffix(".git").unwrap_or(&self.repo)
	}
}

impl std::fmt::Display for RepositoryLocator {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.raw)
	}
}

/// Accepted-source policy for a single allowed host.
#[derive(Debug, Clone)]
pub struct LocatorPolicy {
	host: String,
	pattern: Regex,
}

impl LocatorPolicy {
	pub fn new(host: &str) -> Result<Self> {
		let source = format!(
			r"^(https://{host}/|git@{host}:)([A-Za-z0-9_.-]+)/([A-Za-z0-9_.-]+)$",
			host = regex::escape(host)
		);
		let pattern = Regex::new(&source)
			.map_err(|e| ProvisionError::Validation(format!("invalid locator policy: {e}")))?;

		Ok(Self {
			host: host.to_string(),
			pattern,
		})
	}

	pub fn host(&self) -> &str {
		&self.host
	}

	/// The grammar as shown to users.
	pub fn pattern(&self) -> &str {
		self.pattern.as_str()
	}

	pub fn validate(&self, locator: &str) -> Result<RepositoryLocator> {
		let caps = self
			.pattern
			.captures(locator)
			.ok_or_else(|| self.violation())?;

		let transport = if caps[1].starts_with("https://") {
			Transport::Https
		} else {
			Transport::Ssh
		};
		let owner = caps[2].to_string();
		let repo = caps[3].to_string();

		if is_dot_segment(&owner) || is_dot_segment(&repo) {
			return Err(self.violation());
		}

		Ok(RepositoryLocator {
			raw: locator.to_string(),
			transport,
			owner,
			repo,
		})
	}

	fn violation(&self) -> ProvisionError {
		ProvisionError::Validation(format!(
			"Repository violates regular expression. Must match <code>{}</code>.",
			self.pattern.as_str()
		))
	}
}

fn is_dot_segment(segment: &str) -> bool {
	segment == "." || segment == ".."
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	fn github() -> LocatorPolicy {
		LocatorPolicy::new("github.com").unwrap()
	}

	#[test]
	fn test_accepts_https_and_ssh() {
		let policy = github();

		let https = policy.validate("https://github.com/acct/repo").unwrap();
		assert_eq!(https.transport(), Transport::Https);
		assert_eq!(https.owner(), "acct");
		assert_eq!(https.repo_name(), "repo");

		let ssh = policy.validate("git@github.com:pwn-college/intro.git").unwrap();
		assert_eq!(ssh.transport(), Transport::Ssh);
		assert_eq!(ssh.owner(), "pwn-college");
		assert_eq!(ssh.repo_name(), "intro");
		assert_eq!(ssh.as_str(), "git@github.com:pwn-college/intro.git");
	}

	#[test]
	fn test_rejects_injection_attempts() {
		let policy = github();
		for locator in [
			"git@evil.com:a/b; rm -rf /",
			"git@github.com:a/b; rm -rf /",
			"https://github.com/a/b\n",
			"https://github.com/a/b ",
			" https://github.com/a/b",
			"https://github.com/a/b/c",
			"https://github.com/a",
			"http://github.com/a/b",
			"ssh://git@github.com/a/b",
			"file:///etc/passwd",
			"https://github.com.evil.com/a/b",
			"https://githubXcom/a/b",
			"https://github.com/a/$(id)",
			"https://github.com/a/`id`",
			"https://github.com/../b",
			"https://github.com/a/..",
			"--upload-pack=touch /tmp/x",
			"",
		] {
			assert!(
				matches!(policy.validate(locator), Err(ProvisionError::Validation(_))),
				"accepted {locator:?}"
			);
		}
	}

	#[test]
	fn test_host_is_escaped() {
		let policy = LocatorPolicy::new("git.example.org").unwrap();
		assert!(policy.validate("https://git.example.org/a/b").is_ok());
		assert!(policy.validate("https://gitXexample.org/a/b").is_err());
		assert!(policy.validate("https://github.com/a/b").is_err());
	}

	#[test]
	fn test_error_message_shows_pattern() {
		let err = github().validate("nope").unwrap_err();
		let msg = err.to_string();
		assert!(msg.starts_with("Repository violates regular expression."));
		assert!(msg.contains("<code>^(https://github\\.com/|git@github\\.com:)"));
	}

	proptest! {
		#[test]
		fn prop_metacharacters_never_validate(
			owner in "[A-Za-z0-9_.-]{1,12}",
			repo in "[A-Za-z0-9_.-]{1,12}",
			bad in prop::sample::select(vec![' ', ';', '&', '|', '$', '`', '\n', '\t', '\'', '"', '>', '<', '(', ')', '\\', '*', '?', '!', '#', '~']),
			pos in 0usize..12,
		) {
			let mut repo: Vec<char> = repo.chars().collect();
			let at = pos.min(repo.len());
			repo.insert(at, bad);
			let repo: String = repo.into_iter().collect();
			let locator = format!("https://github.com/{owner}/{repo}");
			prop_assert!(github().validate(&locator).is_err());
		}

		#[test]
		fn prop_well_formed_locators_validate(
			owner in "[A-Za-z0-9_-][A-Za-z0-9_.-]{0,11}",
			repo in "[A-Za-z0-9_-][A-Za-z0-9_.-]{0,11}",
		) {
			let locator = format!("https://github.com/{owner}/{repo}");
			let validated = github().validate(&locator).unwrap();
			prop_assert_eq!(validated.as_str(), locator.as_str());
		}
	}
}
