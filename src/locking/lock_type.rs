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

use crate::error::LockError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lock modes understood by the lock manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum LockType {
    /// Shared
    S,
    /// Exclusive
    X,
    /// Intention shared
    IS,
    /// Intention exclusive
    IX,
    /// Shared plus intention exclusive
    SIX,
    /// No lock held
    NL,
}

impl LockType {
    pub const ALL: [LockType; 6] = [
        LockType::S,
        LockType::X,
        LockType::IS,
        LockType::IX,
        LockType::SIX,
        LockType::NL,
    ];

    /// Returns true when one transaction may hold `self` on a resource while another
    /// transaction holds `other` on the same resource.
    pub fn compatible(self, other: LockType) -> bool {
        use LockType::*;
        match (self, other) {
            (NL, _) | (_, NL) => true,
            (X, _) | (_, X) => false,
            (IS, _) | (_, IS) => true,
            (S, S) => true,
            (IX, IX) => true,
            (S, IX) | (IX, S) => false,
            (SIX, _) | (_, SIX) => false,
        }
    }

    /// The least permissive lock a parent resource must hold before `self` may be
    /// granted on a child.
    pub fn parent_lock(self) -> LockType {
        use LockType::*;
        match self {
            S | IS => IS,
            X | IX | SIX => IX,
            NL => NL,
        }
    }

    /// Returns true when holding `self` allows everything `required` would allow.
    pub fn substitutable(self, required: LockType) -> bool {
        use LockType::*;
        if self == required {
            return true;
        }
        match required {
            NL => true,
            S => matches!(self, X | SIX),
            IS => matches!(self, IX | SIX),
            IX => self == SIX,
            X | SIX => false,
        }
    }

    pub fn is_intent(self) -> bool {
        matches!(self, LockType::IS | LockType::IX | LockType::SIX)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LockType::S => "S",
            LockType::X => "X",
            LockType::IS => "IS",
            LockType::IX => "IX",
            LockType::SIX => "SIX",
            LockType::NL => "NL",
        }
    }
}

impl fmt::Display for LockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LockType {
    type Err = LockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        LockType::ALL
            .into_iter()
            .find(|lock_type| lock_type.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| LockError::InvalidLockType(trimmed.to_string()))
    }
}

impl TryFrom<String> for LockType {
    type Error = LockError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
