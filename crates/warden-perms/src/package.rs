//! Package grants.
//!
//! A package is stored as a single grant whose verb is the package name.
//! Membership is checked against a fixed table rather than expanded into
//! individual grants. The table is part of the wire contract with client
//! apps and must not drift.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Verbs covered by the `basic` package.
pub const BASIC_VERBS: &[&str] = &[
    "connect",
    "get_public_key",
    "nip04_decrypt",
    "nip04_encrypt",
    "nip44_decrypt",
    "nip44_encrypt",
    "sign_event:0",
    "sign_event:1",
    "sign_event:3",
    "sign_event:6",
    "sign_event:7",
    "sign_event:9734",
    "sign_event:10002",
    "sign_event:30023",
    "sign_event:10000",
    "sign_event:27235",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Package {
    Basic,
}

impl Package {
    pub const ALL: [Package; 1] = [Package::Basic];

    /// Name used as the grant verb.
    pub fn name(&self) -> &'static str {
        match self {
            Package::Basic => "basic",
        }
    }

    /// Parse a package name, ignoring case.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s))
    }

    pub fn verbs(&self) -> &'static [&'static str] {
        match self {
            Package::Basic => BASIC_VERBS,
        }
    }

    pub fn contains(&self, verb: &str) -> bool {
        self.verbs().contains(&verb)
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether `verb` is covered by the package named `package`.
///
/// Unknown package names cover nothing.
pub fn is_package_perm(package: &str, verb: &str) -> bool {
    Package::parse(package).is_some_and(|p| p.contains(verb))
}
