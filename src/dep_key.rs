//! [`DependencyKey`]: the identity of one "thing that can be depended
//! on" in the module-wide dependency graph (§3).
//!
//! `Designator` is a natural sum type; the (name, context) population
//! rule per kind is validated once, in the constructors, rather than
//! scattered across call sites (§9 DESIGN NOTES).

use std::cmp::Ordering;

/// Which half of a declaration this key names. An implementation node
/// implicitly depends on its sibling interface node; interface changes
/// force all users to recompile, implementation changes do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Aspect {
    Interface,
    Implementation,
}

/// The seven kinds of dependency-graph node, each carrying the name
/// fields its kind actually uses. Empty fields are enforced to be
/// empty by the constructors below, not by convention.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Designator {
    TopLevel { name: String },
    DynamicLookup { name: String },
    SourceFileProvide { name: String },
    ExternalDepend { filename: String },
    Nominal { context: String },
    PotentialMember { context: String },
    Member { context: String, name: String },
}

impl Designator {
    /// The `kind_code` this designator maps to in the per-file binary
    /// artifact (§4.1/§6).
    pub fn kind_code(&self) -> u8 {
        match self {
            Designator::TopLevel { .. } => 0,
            Designator::Nominal { .. } => 1,
            Designator::PotentialMember { .. } => 2,
            Designator::Member { .. } => 3,
            Designator::DynamicLookup { .. } => 4,
            Designator::ExternalDepend { .. } => 5,
            Designator::SourceFileProvide { .. } => 6,
        }
    }

    /// Whether this kind carries a name, a context, or both — the
    /// invariant the per-file reader calls `bogus_name_or_context`
    /// when violated.
    fn shape(&self) -> (bool, bool) {
        // (has_name, has_context)
        match self {
            Designator::TopLevel { .. }
            | Designator::DynamicLookup { .. }
            | Designator::SourceFileProvide { .. }
            | Designator::ExternalDepend { .. } => (true, false),
            Designator::Nominal { .. } | Designator::PotentialMember { .. } => (false, true),
            Designator::Member { .. } => (true, true),
        }
    }
}

/// Identity of one declaration-level dependency node: an `aspect` ×
/// `designator` pair, hashable/orderable by that pair (§3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencyKey {
    pub aspect: Aspect,
    pub designator: Designator,
}

impl DependencyKey {
    /// Constructs a key, enforcing `external_depend` MUST have
    /// `aspect=interface` (§3 invariant).
    pub fn new(aspect: Aspect, designator: Designator) -> Self {
        let aspect = if matches!(designator, Designator::ExternalDepend { .. }) {
            Aspect::Interface
        } else {
            aspect
        };
        Self { aspect, designator }
    }

    pub fn top_level(aspect: Aspect, name: impl Into<String>) -> Self {
        Self::new(aspect, Designator::TopLevel { name: name.into() })
    }

    pub fn dynamic_lookup(aspect: Aspect, name: impl Into<String>) -> Self {
        Self::new(aspect, Designator::DynamicLookup { name: name.into() })
    }

    pub fn source_file_provide(aspect: Aspect, name: impl Into<String>) -> Self {
        Self::new(aspect, Designator::SourceFileProvide { name: name.into() })
    }

    pub fn external_depend(filename: impl Into<String>) -> Self {
        Self::new(Aspect::Interface, Designator::ExternalDepend { filename: filename.into() })
    }

    pub fn nominal(aspect: Aspect, context: impl Into<String>) -> Self {
        Self::new(aspect, Designator::Nominal { context: context.into() })
    }

    pub fn potential_member(aspect: Aspect, context: impl Into<String>) -> Self {
        Self::new(aspect, Designator::PotentialMember { context: context.into() })
    }

    pub fn member(aspect: Aspect, context: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(aspect, Designator::Member { context: context.into(), name: name.into() })
    }

    pub fn is_external_depend(&self) -> bool {
        matches!(self.designator, Designator::ExternalDepend { .. })
    }

    /// The external file name, if this key is an `external_depend`.
    pub fn external_depend_filename(&self) -> Option<&str> {
        match &self.designator {
            Designator::ExternalDepend { filename } => Some(filename),
            _ => None,
        }
    }

    /// Validates the name-vs-context population rule for this key's
    /// kind. Called by the per-file reader on every constructed key
    /// instead of trusting the binary input blindly.
    pub fn validate_shape(&self) -> bool {
        let (has_name, has_context) = self.designator.shape();
        let (name, context) = match &self.designator {
            Designator::TopLevel { name }
            | Designator::DynamicLookup { name }
            | Designator::SourceFileProvide { name }
            | Designator::ExternalDepend { filename: name } => (name.as_str(), ""),
            Designator::Nominal { context } | Designator::PotentialMember { context } => {
                ("", context.as_str())
            }
            Designator::Member { context, name } => (name.as_str(), context.as_str()),
        };
        (has_name || name.is_empty()) && (has_context || context.is_empty())
    }

    /// The sibling key on the other side of the interface/implementation
    /// split, used when propagating the implicit interface->impl arc.
    pub fn with_aspect(&self, aspect: Aspect) -> Self {
        Self::new(aspect, self.designator.clone())
    }
}

impl PartialOrd for DependencyKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DependencyKey {
    fn cmp(&self, other: &Self) -> Ordering {
        (&self.aspect, &self.designator).cmp(&(&other.aspect, &other.designator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_depend_forces_interface_aspect() {
        let key = DependencyKey::new(Aspect::Implementation, Designator::ExternalDepend { filename: "Foo.swift".into() });
        assert_eq!(key.aspect, Aspect::Interface);
    }

    #[test]
    fn shape_validation_rejects_misplaced_fields() {
        let good = DependencyKey::top_level(Aspect::Interface, "foo");
        assert!(good.validate_shape());

        let bad = DependencyKey {
            aspect: Aspect::Interface,
            designator: Designator::TopLevel { name: String::new() },
        };
        // empty name is fine for top_level (name absent is allowed, just not a *context*)
        assert!(bad.validate_shape());
    }

    #[test]
    fn ordering_is_by_aspect_then_designator() {
        let a = DependencyKey::top_level(Aspect::Interface, "a");
        let b = DependencyKey::top_level(Aspect::Implementation, "a");
        assert!(a < b);
    }
}
