//! Identifier allocation.
//!
//! The allocator is pure: it turns a classified target graph and a base
//! identifier into an [`Assignment`] without touching storage. The same
//! assignment can then be replayed against the descriptor, an unpacked
//! bundle or a packaged archive.
//!
//! Every role except `Main` and `Unknown` maps to `<base>.<suffix>`. After
//! that first pass, targets sharing an identifier are disambiguated:
//!
//! - `Main` and override-pinned targets keep their identifier;
//! - if a collision group contains a pinned target, every other member is
//!   relocated;
//! - otherwise a single member holding its role's canonical value keeps it
//!   and untouched `Unknown` members move;
//! - otherwise every member is relocated;
//! - a relocated member becomes `<base>.<suffix>.<n>` with `n` counting from
//!   1 per suffix in descriptor order, skipping values already in use.
//!
//! The result only depends on the input, so running the allocator on its
//! own output yields the same assignment.

use crate::classify::{Classification, Role};
use crate::config::Overrides;
use crate::descriptor::{Descriptor, Target};
use crate::identifier::{self, BundleId, MAX_LEN};
use crate::{Error, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Upper bound on the ordinal of a disambiguator.
pub const MAX_DISAMBIGUATION_SLOTS: usize = 999;

/// Why a value was assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    /// The current value already is the assigned one, or the target is left
    /// untouched.
    Unchanged,
    /// Canonical `<base>.<suffix>` for the target's role.
    DerivedFromRole,
    /// Relocated to `<base>.<suffix>.<n>` to break a collision.
    Deduplicated,
    /// Pinned by the override map.
    Overridden,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Provenance::Unchanged => "unchanged",
            Provenance::DerivedFromRole => "derived-from-role",
            Provenance::Deduplicated => "deduplicated",
            Provenance::Overridden => "overridden",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigurationAssignment {
    pub configuration: String,
    /// Value currently declared by the configuration, if any.
    pub current: Option<String>,
    /// Value to write, `None` when the configuration is left alone.
    pub assigned: Option<BundleId>,
    pub provenance: Provenance,
}

impl ConfigurationAssignment {
    pub fn is_change(&self) -> bool {
        match (&self.assigned, &self.current) {
            (Some(assigned), Some(current)) => assigned.as_str() != current,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetAssignment {
    pub target_id: String,
    pub target_name: String,
    pub role: Role,
    /// Identifier the target carries after rewriting; `None` when the
    /// target is left untouched.
    pub identifier: Option<BundleId>,
    pub provenance: Provenance,
    pub configurations: Vec<ConfigurationAssignment>,
}

/// A collision the allocator could not break deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResidualCollision {
    pub identifier: String,
    pub targets: Vec<String>,
    pub reason: String,
}

impl fmt::Display for ResidualCollision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "`{}` shared by {}: {}",
            self.identifier,
            self.targets.join(", "),
            self.reason
        )
    }
}

/// Identifier decisions for every target of one descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assignment {
    pub base: BundleId,
    pub targets: Vec<TargetAssignment>,
    pub residual: Vec<ResidualCollision>,
}

impl Assignment {
    pub fn target(&self, target_id: &str) -> Option<&TargetAssignment> {
        self.targets.iter().find(|t| t.target_id == target_id)
    }

    /// Value assigned to one configuration of one target.
    pub fn get(&self, target_id: &str, configuration: &str) -> Option<&BundleId> {
        self.target(target_id)?
            .configurations
            .iter()
            .find(|c| c.configuration == configuration)?
            .assigned
            .as_ref()
    }

    pub fn main(&self) -> Option<&TargetAssignment> {
        self.targets.iter().find(|t| t.role == Role::Main)
    }

    pub fn is_collision_free(&self) -> bool {
        self.residual.is_empty()
    }

    /// Number of configuration values that differ from their current value.
    pub fn pending_changes(&self) -> usize {
        self.targets
            .iter()
            .flat_map(|t| &t.configurations)
            .filter(|c| c.is_change())
            .count()
    }
}

/// First-pass decision for one target.
struct Candidate {
    identifier: BundleId,
    pinned: bool,
    provenance: Provenance,
    /// Unknown targets keep their value unless relocated.
    untouched: bool,
}

/// Allocate identifiers for every classified target.
///
/// `classifications` must be aligned with `descriptor.targets`, as returned
/// by [`crate::classify::classify_all`].
///
/// # Errors
///
/// Returns [`Error::Allocation`] when `base` or an override value fails the
/// bundle identifier grammar, or when an override pins the main target.
pub fn allocate(
    descriptor: &Descriptor,
    base: &str,
    classifications: &[Classification],
    overrides: &Overrides,
) -> Result<Assignment> {
    let base = BundleId::parse(base)?;
    if classifications.len() != descriptor.targets.len() {
        return Err(Error::Classification(format!(
            "{} classifications for {} targets",
            classifications.len(),
            descriptor.targets.len()
        )));
    }

    warn_unused_overrides(descriptor, overrides);

    let mut residual = Vec::new();
    let mut candidates: Vec<Option<Candidate>> = Vec::with_capacity(descriptor.targets.len());
    for (target, class) in descriptor.targets.iter().zip(classifications) {
        let candidate = first_pass(&base, target, class.role, overrides)?;
        if candidate.is_none() && class.role != Role::Unknown {
            residual.push(ResidualCollision {
                identifier: base.to_string(),
                targets: vec![target.name.clone()],
                reason: format!(
                    "no room for the `{}` suffix within {MAX_LEN} bytes",
                    class.role.disambiguation_suffix()
                ),
            });
        }
        candidates.push(candidate);
    }

    // Group by identifier, groups ordered by their first member.
    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (index, candidate) in candidates.iter().enumerate() {
        if let Some(c) = candidate {
            groups.entry(c.identifier.as_str()).or_default().push(index);
        }
    }
    let mut collisions: Vec<Vec<usize>> = groups.into_values().filter(|g| g.len() > 1).collect();
    collisions.sort_by_key(|g| g[0]);

    let mut used: HashSet<String> = candidates
        .iter()
        .flatten()
        .map(|c| c.identifier.to_string())
        .collect();

    for group in collisions {
        let shared = candidates[group[0]]
            .as_ref()
            .map(|c| c.identifier.to_string())
            .unwrap_or_default();
        let pinned: Vec<usize> = group
            .iter()
            .copied()
            .filter(|&i| candidates[i].as_ref().is_some_and(|c| c.pinned))
            .collect();
        if pinned.len() > 1 {
            residual.push(ResidualCollision {
                identifier: shared.clone(),
                targets: pinned
                    .iter()
                    .map(|&i| descriptor.targets[i].name.clone())
                    .collect(),
                reason: "identifier is pinned for more than one target".into(),
            });
        }

        let keepers = if pinned.is_empty() {
            sole_role_holder(&group, &candidates)
        } else {
            pinned
        };

        let mut ordinals: BTreeMap<&str, usize> = BTreeMap::new();
        for index in group.into_iter().filter(|i| !keepers.contains(i)) {
            let role = classifications[index].role;
            let name = &descriptor.targets[index].name;
            let suffix = role.disambiguation_suffix();
            let ordinal = ordinals.entry(suffix).or_default();
            match next_free(&base, suffix, ordinal, &used) {
                Some(relocated) => {
                    tracing::debug!(
                        target_name = %name,
                        from = %shared,
                        to = %relocated,
                        "relocated colliding identifier"
                    );
                    used.insert(relocated.to_string());
                    if let Some(candidate) = candidates[index].as_mut() {
                        candidate.identifier = relocated;
                        candidate.provenance = Provenance::Deduplicated;
                        candidate.untouched = false;
                    }
                }
                None => {
                    tracing::warn!(target_name = %name, identifier = %shared, "no disambiguation slot left");
                    residual.push(ResidualCollision {
                        identifier: shared.clone(),
                        targets: vec![name.clone()],
                        reason: format!(
                            "all {MAX_DISAMBIGUATION_SLOTS} disambiguation slots are taken"
                        ),
                    });
                }
            }
        }
    }

    let targets = descriptor
        .targets
        .iter()
        .zip(classifications)
        .zip(candidates)
        .map(|((target, class), candidate)| build_target(target, class.role, candidate))
        .collect();

    Ok(Assignment {
        base,
        targets,
        residual,
    })
}

/// The one member of an unpinned group whose value is its role's canonical
/// identifier. Untouched `Unknown` members yield to it; two or more such
/// members are all relocated.
fn sole_role_holder(group: &[usize], candidates: &[Option<Candidate>]) -> Vec<usize> {
    let holders: Vec<usize> = group
        .iter()
        .copied()
        .filter(|&i| {
            candidates[i]
                .as_ref()
                .is_some_and(|c| c.provenance == Provenance::DerivedFromRole)
        })
        .collect();
    if holders.len() == 1 {
        holders
    } else {
        Vec::new()
    }
}

fn first_pass(
    base: &BundleId,
    target: &Target,
    role: Role,
    overrides: &Overrides,
) -> Result<Option<Candidate>> {
    if let Some(value) = overrides.identifier_for(target) {
        if role == Role::Main {
            return Err(Error::Allocation {
                value: value.to_string(),
                reason: format!(
                    "`{}` is the main target and always carries the base identifier",
                    target.name
                ),
            });
        }
        let identifier = BundleId::parse(value).map_err(|e| match e {
            Error::Allocation { value, reason } => Error::Allocation {
                value,
                reason: format!("override for `{}`: {reason}", target.name),
            },
            other => other,
        })?;
        return Ok(Some(Candidate {
            identifier,
            pinned: true,
            provenance: Provenance::Overridden,
            untouched: false,
        }));
    }

    let candidate = match role {
        Role::Main => Some(Candidate {
            identifier: base.clone(),
            pinned: true,
            provenance: Provenance::DerivedFromRole,
            untouched: false,
        }),
        Role::Unknown => target
            .configurations
            .iter()
            .filter_map(|c| c.bundle_identifier())
            .find(|value| identifier::is_valid(value))
            .and_then(|value| BundleId::parse(value).ok())
            .map(|identifier| Candidate {
                identifier,
                pinned: false,
                provenance: Provenance::Unchanged,
                untouched: true,
            }),
        role => role
            .suffix()
            .and_then(|suffix| suffixed(base, suffix, None))
            .map(|identifier| Candidate {
                identifier,
                pinned: false,
                provenance: Provenance::DerivedFromRole,
                untouched: false,
            }),
    };
    Ok(candidate)
}

/// `<base>.<suffix>[.<ordinal>]`, truncating the suffix (never the base) to
/// stay within [`MAX_LEN`].
fn suffixed(base: &BundleId, suffix: &str, ordinal: Option<usize>) -> Option<BundleId> {
    let tail = ordinal.map(|n| n.to_string());
    let tail_len = tail.as_ref().map_or(0, |t| t.len() + 1);
    let room = MAX_LEN.checked_sub(base.as_str().len() + 1 + tail_len)?;
    if room == 0 {
        return None;
    }
    // Suffixes are ASCII, so any byte index is a char boundary.
    let suffix = &suffix[..suffix.len().min(room)];
    match &tail {
        Some(t) => base.join(&[suffix, t]).ok(),
        None => base.join(&[suffix]).ok(),
    }
}

fn next_free(
    base: &BundleId,
    suffix: &str,
    ordinal: &mut usize,
    used: &HashSet<String>,
) -> Option<BundleId> {
    while *ordinal < MAX_DISAMBIGUATION_SLOTS {
        *ordinal += 1;
        let candidate = suffixed(base, suffix, Some(*ordinal))?;
        if !used.contains(candidate.as_str()) {
            return Some(candidate);
        }
    }
    None
}

fn build_target(target: &Target, role: Role, candidate: Option<Candidate>) -> TargetAssignment {
    let (identifier, provenance) = match candidate {
        Some(c) if !c.untouched => (Some(c.identifier), c.provenance),
        _ => (None, Provenance::Unchanged),
    };

    let configurations = target
        .configurations
        .iter()
        .map(|config| {
            let current = config.bundle_identifier().map(str::to_string);
            let assigned = current.as_ref().and(identifier.clone());
            let provenance = match (&assigned, &current) {
                (Some(a), Some(c)) if a.as_str() == c => Provenance::Unchanged,
                (Some(_), _) => provenance,
                (None, _) => Provenance::Unchanged,
            };
            ConfigurationAssignment {
                configuration: config.name.clone(),
                current,
                assigned,
                provenance,
            }
        })
        .collect();

    TargetAssignment {
        target_id: target.id.clone(),
        target_name: target.name.clone(),
        role,
        identifier,
        provenance,
        configurations,
    }
}

fn warn_unused_overrides(descriptor: &Descriptor, overrides: &Overrides) {
    let known = |key: &String| {
        descriptor
            .targets
            .iter()
            .any(|t| &t.name == key || &t.id == key)
    };
    for key in overrides.roles.keys().chain(overrides.identifiers.keys()) {
        if !known(key) {
            tracing::warn!(key = %key, "override does not match any target");
        }
    }
}
