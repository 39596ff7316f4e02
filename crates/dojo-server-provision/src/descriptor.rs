// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Parsing a staged repository into a dojo descriptor.

use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, instrument};

use crate::error::{ProvisionError, Result};
use crate::types::DojoModule;

const DESCRIPTOR_FILES: [&str; 2] = ["dojo.yml", "dojo.yaml"];
const MAX_ID_LEN: usize = 64;
const MAX_DESCRIPTOR_BYTES: u64 = 256 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DojoDescriptor {
	/// Declared id, if the descriptor sets one.
	pub id: Option<String>,
	pub name: String,
	pub description: Option<String>,
	pub modules: Vec<DojoModule>,
}

/// Parses a staged directory into a [`DojoDescriptor`].
pub trait DescriptorLoader: Send + Sync {
	fn load(&self, dir: &Path) -> Result<DojoDescriptor>;
}

#[derive(Debug, Deserialize)]
struct RawDescriptor {
	id: Option<String>,
	name: Option<String>,
	description: Option<String>,
	#[serde(default)]
	modules: Vec<DojoModule>,
}

/// Loads `dojo.yml` (or `dojo.yaml`) from the repository root.
#[derive(Debug, Default)]
pub struct YamlDescriptorLoader;

impl DescriptorLoader for YamlDescriptorLoader {
	#[instrument(skip(self))]
	fn load(&self, dir: &Path) -> Result<DojoDescriptor> {
		let path = find_descriptor(dir)?;
		let content = read_descriptor(&path)?;
		let raw: RawDescriptor = serde_yaml::from_str(&content)
			.map_err(|e| ProvisionError::Load(format!("Invalid dojo.yml: {e}")))?;

		let descriptor = validate(raw)?;
		debug!(
			modules = descriptor.modules.len(),
			challenges = descriptor.modules.iter().map(|m| m.challenges.len()).sum::<usize>(),
			"Loaded dojo descriptor"
		);
		Ok(descriptor)
	}
}

/// Locate the descriptor in `dir`. Only regular files are accepted; a
/// symlink could point anywhere on the server.
fn find_descriptor(dir: &Path) -> Result<PathBuf> {
	for name in DESCRIPTOR_FILES {
		let path = dir.join(name);
		let meta = match std::fs::symlink_metadata(&path) {
			Ok(meta) => meta,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
			Err(e) => return Err(ProvisionError::Load(format!("Failed to read {name}: {e}"))),
		};

		if meta.file_type().is_symlink() {
			return Err(ProvisionError::Load(format!(
				"{name} must be a regular file, not a symlink"
			)));
		}
		if !meta.is_file() {
			return Err(ProvisionError::Load(format!("{name} is not a regular file")));
		}
		if meta.len() > MAX_DESCRIPTOR_BYTES {
			return Err(ProvisionError::Load(format!(
				"{name} exceeds {MAX_DESCRIPTOR_BYTES} bytes"
			)));
		}
		return Ok(path);
	}

	Err(ProvisionError::Load(
		"Repository does not contain a dojo.yml".to_string(),
	))
}

fn read_descriptor(path: &Path) -> Result<String> {
	let read_error = |e: std::io::Error| ProvisionError::Load(format!("Failed to read dojo.yml: {e}"));

	let file = std::fs::File::open(path).map_err(read_error)?;
	let mut content = String::new();
	file.take(MAX_DESCRIPTOR_BYTES + 1)
		.read_to_string(&mut content)
		.map_err(read_error)?;

	if content.len() as u64 > MAX_DESCRIPTOR_BYTES {
		return Err(ProvisionError::Load(format!(
			"dojo.yml exceeds {MAX_DESCRIPTOR_BYTES} bytes"
		)));
	}
	Ok(content)
}

fn validate(raw: RawDescriptor) -> Result<DojoDescriptor> {
	if let Some(id) = raw.id.as_deref() {
		validate_id(id, "dojo id")?;
	}

	let name = raw
		.name
		.map(|n| n.trim().to_string())
		.filter(|n| !n.is_empty())
		.ok_or_else(|| ProvisionError::Load("dojo.yml must set a name".to_string()))?;

	if raw.modules.is_empty() {
		return Err(ProvisionError::Load(
			"dojo.yml must declare at least one module".to_string(),
		));
	}

	let mut module_ids = HashSet::new();
	for module in &raw.modules {
		validate_id(&module.id, "module id")?;
		if module.name.trim().is_empty() {
			return Err(ProvisionError::Load(format!(
				"module '{}' must have a name",
				module.id
			)));
		}
		if !module_ids.insert(module.id.as_str()) {
			return Err(ProvisionError::Load(format!(
				"duplicate module id '{}'",
				module.id
			)));
		}

		let mut challenge_ids = HashSet::new();
		for challenge in &module.challenges {
			validate_id(&challenge.id, "challenge id")?;
			if challenge.name.trim().is_empty() {
				return Err(ProvisionError::Load(format!(
					"challenge '{}/{}' must have a name",
					module.id, challenge.id
				)));
			}
			if !challenge_ids.insert(challenge.id.as_str()) {
				return Err(ProvisionError::Load(format!(
					"duplicate challenge id '{}' in module '{}'",
					challenge.id, module.id
				)));
			}
		}
	}

	Ok(DojoDescriptor {
		id: raw.id,
		name,
		description: raw.description,
		modules: raw.modules,
	})
}

/// Ids are used in directory names, so they are restricted to
/// `[a-z0-9][a-z0-9_-]*`.
pub fn is_valid_id(id: &str) -> bool {
	let mut chars = id.chars();
	match chars.next() {
		Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit() => {}
		_ => return false,
	}
	id.len() <= MAX_ID_LEN
		&& chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

fn validate_id(id: &str, what: &str) -> Result<()> {
	if is_valid_id(id) {
		Ok(())
	} else {
		Err(ProvisionError::Load(format!(
			"invalid {what} '{id}': must match [a-z0-9][a-z0-9_-]{{0,63}}"
		)))
	}
}

/// Derive a dojo id from a repository name: lower-cased, with every
/// character outside the id alphabet replaced by `-`.
pub fn slugify(name: &str) -> Option<String> {
	let slug: String = name
		.to_ascii_lowercase()
		.chars()
		.map(|c| {
			if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
				c
			} else {
				'-'
			}
		})
		.collect();
	let slug = slug.trim_matches(|c| c == '-' || c == '_');
	let slug: String = slug.chars().take(MAX_ID_LEN).collect();

	is_valid_id(&slug).then_some(slug)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn load_str(content: &str) -> Result<DojoDescriptor> {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join("dojo.yml"), content).unwrap();
		YamlDescriptorLoader.load(dir.path())
	}

	#[test]
	fn test_loads_modules_in_order() {
		let descriptor = load_str(
			r#"
id: intro
name: Intro to Binary Exploitation
description: Start here.
modules:
  - id: warmup
    name: Warm-up
    challenges:
      - id: level-1
        name: Level 1
      - id: level-2
        name: Level 2
        description: Harder.
  - id: shellcode
    name: Shellcode
"#,
		)
		.unwrap();

		assert_eq!(descriptor.id.as_deref(), Some("intro"));
		assert_eq!(descriptor.name, "Intro to Binary Exploitation");
		assert_eq!(descriptor.modules.len(), 2);
		assert_eq!(descriptor.modules[0].id, "warmup");
		assert_eq!(descriptor.modules[0].challenges[1].id, "level-2");
		assert!(descriptor.modules[1].challenges.is_empty());
	}

	#[test]
	fn test_empty_tree_is_load_error() {
		let dir = tempfile::tempdir().unwrap();
		let err = YamlDescriptorLoader.load(dir.path()).unwrap_err();
		assert!(matches!(err, ProvisionError::Load(ref m) if m.contains("dojo.yml")));
	}

	#[test]
	fn test_accepts_yaml_extension() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(
			dir.path().join("dojo.yaml"),
			"name: X\nmodules:\n  - id: m\n    name: M\n",
		)
		.unwrap();
		assert!(YamlDescriptorLoader.load(dir.path()).is_ok());
	}

	#[test]
	fn test_rejects_malformed_descriptors() {
		for content in [
			"{{{{ not yaml",
			"name: X\n",
			"modules:\n  - id: m\n    name: M\n",
			"id: Bad/Id\nname: X\nmodules:\n  - id: m\n    name: M\n",
			"name: X\nmodules:\n  - id: m\n    name: M\n  - id: m\n    name: Again\n",
			"name: X\nmodules:\n  - id: ../m\n    name: M\n",
			"name: X\nmodules:\n  - id: m\n    name: M\n    challenges:\n      - id: c\n        name: C\n      - id: c\n        name: D\n",
			"name: X\nmodules:\n  - id: m\n    name: '  '\n",
		] {
			assert!(
				matches!(load_str(content), Err(ProvisionError::Load(_))),
				"accepted {content:?}"
			);
		}
	}

	#[cfg(unix)]
	#[test]
	fn test_rejects_symlinked_descriptor() {
		let outside = tempfile::tempdir().unwrap();
		let secret = outside.path().join("server.env");
		std::fs::write(&secret, "db_password=hunter2-TOPSECRET").unwrap();

		let dir = tempfile::tempdir().unwrap();
		std::os::unix::fs::symlink(&secret, dir.path().join("dojo.yml")).unwrap();

		let err = YamlDescriptorLoader.load(dir.path()).unwrap_err();
		assert!(matches!(err, ProvisionError::Load(ref m) if m.contains("symlink")));
		assert!(!err.to_string().contains("TOPSECRET"));
	}

	#[test]
	fn test_rejects_descriptor_directory() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::create_dir(dir.path().join("dojo.yml")).unwrap();

		let err = YamlDescriptorLoader.load(dir.path()).unwrap_err();
		assert!(matches!(err, ProvisionError::Load(ref m) if m.contains("not a regular file")));
	}

	#[test]
	fn test_rejects_oversized_descriptor() {
		let padding = "#".repeat(MAX_DESCRIPTOR_BYTES as usize);
		let err = load_str(&format!("name: X\nmodules:\n  - id: m\n    name: M\n{padding}\n")).unwrap_err();
		assert!(matches!(err, ProvisionError::Load(ref m) if m.contains("exceeds")));
	}

	#[test]
	fn test_slugify() {
		assert_eq!(slugify("Intro.Dojo").as_deref(), Some("intro-dojo"));
		assert_eq!(slugify("repo_name").as_deref(), Some("repo_name"));
		assert_eq!(slugify("--x--").as_deref(), Some("x"));
		assert_eq!(slugify("..."), None);
	}

	#[test]
	fn test_is_valid_id() {
		assert!(is_valid_id("a"));
		assert!(is_valid_id("0day-2"));
		assert!(!is_valid_id(""));
		assert!(!is_valid_id("-a"));
		assert!(!is_valid_id("A"));
		assert!(!is_valid_id(&"a".repeat(65)));
	}
}
