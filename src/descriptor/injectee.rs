//! Injection points.

use std::fmt;

use crate::filter::Lookup;

/// Where an injection point sits on its owning component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InjecteePosition {
    /// Constructor or factory-method parameter index.
    Parameter(usize),
    /// Named field.
    Field(String),
}

impl fmt::Display for InjecteePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InjecteePosition::Parameter(index) => write!(f, "parameter {}", index),
            InjecteePosition::Field(name) => write!(f, "field {}", name),
        }
    }
}

/// A single injection point's requirement.
///
/// Immutable once built; the owning implementation is filled in by
/// [`DescriptorBuilder::inject`](crate::descriptor::DescriptorBuilder::inject).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Injectee {
    pub lookup: Lookup,
    pub optional: bool,
    /// Resolve every match instead of the first.
    pub multiple: bool,
    pub position: InjecteePosition,
    pub owner: Option<String>,
}

impl Injectee {
    /// A required injection point for `contract` at constructor parameter `index`.
    pub fn parameter(index: usize, contract: impl Into<String>) -> Self {
        Self {
            lookup: Lookup::contract(contract),
            optional: false,
            multiple: false,
            position: InjecteePosition::Parameter(index),
            owner: None,
        }
    }

    /// A required injection point for `contract` stored in field `name`.
    pub fn field(name: impl Into<String>, contract: impl Into<String>) -> Self {
        Self {
            lookup: Lookup::contract(contract),
            optional: false,
            multiple: false,
            position: InjecteePosition::Field(name.into()),
            owner: None,
        }
    }

    pub fn of_type<T: ?Sized + 'static>(index: usize) -> Self {
        Self::parameter(index, std::any::type_name::<T>())
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.lookup = self.lookup.named(name);
        self
    }

    pub fn qualified_by(mut self, qualifier: impl Into<String>) -> Self {
        self.lookup = self.lookup.qualified_by(qualifier);
        self
    }

    pub fn contract(&self) -> &str {
        &self.lookup.contract
    }

    pub(crate) fn describe_owner(&self) -> Option<String> {
        self.owner
            .as_ref()
            .map(|owner| format!("{} {}", owner, self.position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_injectee() {
        let injectee = Injectee::parameter(1, "app::Db").named("primary").optional();
        assert_eq!(injectee.contract(), "app::Db");
        assert_eq!(injectee.lookup.name.as_deref(), Some("primary"));
        assert!(injectee.optional);
        assert!(!injectee.multiple);
        assert_eq!(injectee.position, InjecteePosition::Parameter(1));
    }

    #[test]
    fn test_describe_owner() {
        let mut injectee = Injectee::field("db", "app::Db");
        assert_eq!(injectee.describe_owner(), None);
        injectee.owner = Some("app::Repo".to_string());
        assert_eq!(injectee.describe_owner().as_deref(), Some("app::Repo field db"));
    }
}
