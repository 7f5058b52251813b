// Copyright 2025 dentsusoken
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::error::{LockError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Name of the root resource that every table and page hangs off.
pub const DATABASE_RESOURCE: &str = "database";

const SEPARATOR: char = '/';

/// Hierarchical name of a lockable resource, e.g. `database/table1/page3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceName {
    segments: Vec<String>,
}

impl ResourceName {
    /// Creates a single-segment (root) resource name.
    pub fn root(segment: impl Into<String>) -> Result<Self> {
        let segment = segment.into();
        validate_segment(&segment)?;
        Ok(Self {
            segments: vec![segment],
        })
    }

    pub fn database() -> Self {
        Self {
            segments: vec![DATABASE_RESOURCE.to_string()],
        }
    }

    /// Builds the name of a child resource directly below this one.
    pub fn child(&self, segment: impl Into<String>) -> Result<Self> {
        let segment = segment.into();
        validate_segment(&segment)?;
        let mut segments = self.segments.clone();
        segments.push(segment);
        Ok(Self { segments })
    }

    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() <= 1 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn leaf(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// True when `other` is a strict prefix of this name.
    pub fn is_descendant_of(&self, other: &ResourceName) -> bool {
        self.segments.len() > other.segments.len()
            && self.segments.starts_with(&other.segments)
    }
}

fn validate_segment(segment: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(LockError::InvalidResourceName(
            "resource name segments must not be empty".to_string(),
        ));
    }
    if segment.contains(SEPARATOR) {
        return Err(LockError::InvalidResourceName(format!(
            "segment '{segment}' must not contain '{SEPARATOR}'"
        )));
    }
    Ok(())
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

impl FromStr for ResourceName {
    type Err = LockError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(LockError::InvalidResourceName(
                "resource name must not be empty".to_string(),
            ));
        }
        let mut parts = trimmed.split(SEPARATOR);
        let first = parts.next().unwrap_or_default();
        parts.try_fold(ResourceName::root(first)?, |name, segment| {
            name.child(segment)
        })
    }
}

impl TryFrom<String> for ResourceName {
    type Error = LockError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ResourceName> for String {
    fn from(name: ResourceName) -> Self {
        name.to_string()
    }
}
