//! Immutable named-route registry and its builder.

use std::collections::HashMap;

use serde::Serialize;

use portcullis_auth::{AuthRequirement, Permission};

use crate::pattern::{Params, PathPattern, RouteArgs};
use crate::{ConfigError, RouteError};

/// A registered route: name, template and authorization metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteDefinition {
    name: String,
    template: String,
    requirement: AuthRequirement,
    #[serde(skip_serializing_if = "Option::is_none")]
    group: Option<String>,
}

impl RouteDefinition {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn requirement(&self) -> &AuthRequirement {
        &self.requirement
    }

    pub fn permission(&self) -> Option<&Permission> {
        self.requirement.permission()
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }
}

#[derive(Debug, Clone)]
struct CompiledRoute {
    definition: RouteDefinition,
    pattern: PathPattern,
}

/// Per-route registration options. Unset fields inherit from the enclosing
/// group (or the builder default).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteProps {
    pub requirement: Option<AuthRequirement>,
    pub group: Option<String>,
}

impl RouteProps {
    pub fn inherit() -> Self {
        Self::default()
    }

    pub fn new(requirement: AuthRequirement) -> Self {
        Self {
            requirement: Some(requirement),
            group: None,
        }
    }

    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }
}

impl From<AuthRequirement> for RouteProps {
    fn from(value: AuthRequirement) -> Self {
        Self::new(value)
    }
}

/// Defaults applied to every route added through a [`RouteGroup`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupDefaults {
    pub requirement: Option<AuthRequirement>,
    pub tag: Option<String>,
}

impl GroupDefaults {
    pub fn new(requirement: AuthRequirement) -> Self {
        Self {
            requirement: Some(requirement),
            tag: None,
        }
    }

    pub fn tagged(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

/// Result of a successful [`RouteRegistry::match_path`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch<'a> {
    route: &'a RouteDefinition,
    params: Params,
}

impl<'a> RouteMatch<'a> {
    pub fn route(&self) -> &'a RouteDefinition {
        self.route
    }

    pub fn name(&self) -> &'a str {
        self.route.name()
    }

    pub fn requirement(&self) -> &'a AuthRequirement {
        self.route.requirement()
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// Immutable route table. Build once at startup, share behind an `Arc`.
#[derive(Debug, Clone)]
pub struct RouteRegistry {
    routes: Vec<CompiledRoute>,
    index: HashMap<String, usize>,
}

impl RouteRegistry {
    pub fn builder() -> RouteRegistryBuilder {
        RouteRegistryBuilder::new()
    }

    /// First route (in registration order) whose template matches `path`.
    pub fn match_path(&self, path: &str) -> Option<RouteMatch<'_>> {
        self.routes.iter().find_map(|route| {
            route.pattern.captures(path).map(|params| RouteMatch {
                route: &route.definition,
                params,
            })
        })
    }

    /// Generate the URL path of a named route.
    pub fn reverse(&self, name: &str, args: &RouteArgs) -> Result<String, RouteError> {
        let idx = self
            .index
            .get(name)
            .ok_or_else(|| RouteError::NotFound(name.to_string()))?;
        self.routes[*idx].pattern.generate(args)
    }

    pub fn get(&self, name: &str) -> Option<&RouteDefinition> {
        self.index
            .get(name)
            .map(|idx| &self.routes[*idx].definition)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Definitions in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &RouteDefinition> {
        self.routes.iter().map(|r| &r.definition)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Startup-time builder for [`RouteRegistry`].
#[derive(Debug)]
pub struct RouteRegistryBuilder {
    routes: Vec<CompiledRoute>,
    index: HashMap<String, usize>,
    default_requirement: AuthRequirement,
}

impl Default for RouteRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteRegistryBuilder {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            index: HashMap::new(),
            default_requirement: AuthRequirement::Public,
        }
    }

    /// Requirement for ungrouped routes that do not set one (default `Public`).
    pub fn default_requirement(mut self, requirement: AuthRequirement) -> Self {
        self.default_requirement = requirement;
        self
    }

    pub fn add(
        &mut self,
        name: &str,
        template: &str,
        props: impl Into<RouteProps>,
    ) -> Result<&mut Self, ConfigError> {
        let props = props.into();
        let requirement = props
            .requirement
            .unwrap_or_else(|| self.default_requirement.clone());
        self.insert(name, template, requirement, props.group)?;
        Ok(self)
    }

    /// Open a group whose defaults apply to every route added through it.
    pub fn group(&mut self, defaults: GroupDefaults) -> RouteGroup<'_> {
        let requirement = defaults
            .requirement
            .unwrap_or_else(|| self.default_requirement.clone());
        RouteGroup {
            builder: self,
            requirement,
            tag: defaults.tag,
        }
    }

    pub fn build(self) -> RouteRegistry {
        tracing::debug!(routes = self.routes.len(), "route registry built");
        RouteRegistry {
            routes: self.routes,
            index: self.index,
        }
    }

    fn insert(
        &mut self,
        name: &str,
        template: &str,
        requirement: AuthRequirement,
        group: Option<String>,
    ) -> Result<(), ConfigError> {
        if name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if template.trim().is_empty() {
            return Err(ConfigError::EmptyTemplate {
                name: name.to_string(),
            });
        }
        if self.index.contains_key(name) {
            return Err(ConfigError::DuplicateName(name.to_string()));
        }

        let pattern = PathPattern::compile(template)?;
        self.index.insert(name.to_string(), self.routes.len());
        self.routes.push(CompiledRoute {
            definition: RouteDefinition {
                name: name.to_string(),
                template: template.to_string(),
                requirement,
                group,
            },
            pattern,
        });
        Ok(())
    }
}

/// Scoped builder returned by [`RouteRegistryBuilder::group`].
#[derive(Debug)]
pub struct RouteGroup<'b> {
    builder: &'b mut RouteRegistryBuilder,
    requirement: AuthRequirement,
    tag: Option<String>,
}

impl RouteGroup<'_> {
    pub fn add(
        &mut self,
        name: &str,
        template: &str,
        props: impl Into<RouteProps>,
    ) -> Result<&mut Self, ConfigError> {
        let props = props.into();
        let requirement = props.requirement.unwrap_or_else(|| self.requirement.clone());
        let group = props.group.or_else(|| self.tag.clone());
        self.builder.insert(name, template, requirement, group)?;
        Ok(self)
    }

    /// Nested group; its defaults override this group's.
    pub fn group(&mut self, defaults: GroupDefaults) -> RouteGroup<'_> {
        RouteGroup {
            requirement: defaults
                .requirement
                .unwrap_or_else(|| self.requirement.clone()),
            tag: defaults.tag.or_else(|| self.tag.clone()),
            builder: &mut *self.builder,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> RouteRegistry {
        let mut b = RouteRegistry::builder();
        b.add("home", "/", RouteProps::inherit()).unwrap();
        b.add("login", "/login", AuthRequirement::UnauthenticatedOnly)
            .unwrap();
        {
            let defaults = GroupDefaults::new(AuthRequirement::Authenticated).tagged("admin");
            let mut admin = b.group(defaults);
            admin.add("users", "/users", RouteProps::inherit()).unwrap();
            admin
                .add("users.show", "/users/:id", RouteProps::inherit())
                .unwrap();
            admin
                .add(
                    "users.edit",
                    "/users/:id/edit",
                    AuthRequirement::protected("users.write"),
                )
                .unwrap();
            admin
                .add("files", "/files/:path*", RouteProps::inherit())
                .unwrap();
        }
        b.build()
    }

    #[test]
    fn add_rejects_invalid_registrations() {
        let mut b = RouteRegistry::builder();
        assert_eq!(
            b.add("", "/x", RouteProps::inherit()).err(),
            Some(ConfigError::EmptyName)
        );
        assert_eq!(
            b.add("x", "", RouteProps::inherit()).err(),
            Some(ConfigError::EmptyTemplate {
                name: "x".to_string(),
            })
        );
        b.add("x", "/x", RouteProps::inherit()).unwrap();
        assert_eq!(
            b.add("x", "/y", RouteProps::inherit()).err(),
            Some(ConfigError::DuplicateName("x".to_string()))
        );
    }

    #[test]
    fn group_defaults_apply_and_can_be_overridden() {
        let registry = sample();

        let users = registry.get("users").unwrap();
        assert_eq!(users.requirement(), &AuthRequirement::Authenticated);
        assert_eq!(users.group(), Some("admin"));

        let edit = registry.get("users.edit").unwrap();
        assert_eq!(edit.permission(), Some(&Permission::new("users.write")));
        assert_eq!(edit.group(), Some("admin"));

        assert_eq!(
            registry.get("home").unwrap().requirement(),
            &AuthRequirement::Public
        );
        assert_eq!(registry.get("home").unwrap().group(), None);
    }

    #[test]
    fn nested_groups_inherit_outer_tag() {
        let mut b = RouteRegistry::builder();
        {
            let defaults = GroupDefaults::new(AuthRequirement::Authenticated).tagged("admin");
            let mut outer = b.group(defaults);
            let mut inner = outer.group(GroupDefaults::new(AuthRequirement::elevated()));
            inner.add("roles", "/roles", RouteProps::inherit()).unwrap();
        }
        let registry = b.build();
        let roles = registry.get("roles").unwrap();
        assert_eq!(roles.requirement(), &AuthRequirement::elevated());
        assert_eq!(roles.group(), Some("admin"));
    }

    #[test]
    fn match_returns_name_and_params() {
        let registry = sample();
        let m = registry.match_path("/users/42").unwrap();
        assert_eq!(m.name(), "users.show");
        assert_eq!(m.param("id"), Some("42"));

        let m = registry.match_path("/files/a/b/c").unwrap();
        assert_eq!(m.name(), "files");
        assert_eq!(m.param("path"), Some("a/b/c"));

        assert!(registry.match_path("/nowhere").is_none());
    }

    #[test]
    fn first_registered_match_wins() {
        let mut a = RouteRegistry::builder();
        a.add("users.new", "/users/new", RouteProps::inherit())
            .unwrap();
        a.add("users.show", "/users/:id", RouteProps::inherit())
            .unwrap();
        let a = a.build();

        let mut b = RouteRegistry::builder();
        b.add("users.show", "/users/:id", RouteProps::inherit())
            .unwrap();
        b.add("users.new", "/users/new", RouteProps::inherit())
            .unwrap();
        let b = b.build();

        assert_eq!(a.match_path("/users/new").unwrap().name(), "users.new");
        assert_eq!(b.match_path("/users/new").unwrap().name(), "users.show");
    }

    #[test]
    fn reverse_unknown_route_fails() {
        let registry = sample();
        assert_eq!(
            registry.reverse("nope", &RouteArgs::new()),
            Err(RouteError::NotFound("nope".to_string()))
        );
        assert_eq!(
            registry
                .reverse("users.edit", &RouteArgs::new().with("id", "9"))
                .unwrap(),
            "/users/9/edit"
        );
    }

    proptest! {
        /// Property: reverse generation round-trips through matching.
        #[test]
        fn reverse_then_match_round_trips(
            id in "[a-zA-Z0-9_-]{1,10}",
            parts in prop::collection::vec("[a-z0-9]{1,6}", 0..4),
        ) {
            let registry = sample();
            let cases = [
                ("home", RouteArgs::new()),
                ("users", RouteArgs::new()),
                ("users.show", RouteArgs::new().with("id", id.clone())),
                ("users.edit", RouteArgs::new().with("id", id.clone())),
                ("files", RouteArgs::new().with("path", parts.clone())),
            ];
            for (name, args) in cases {
                let url = registry.reverse(name, &args).unwrap();
                let m = registry.match_path(&url).unwrap();
                prop_assert_eq!(m.name(), name);
            }
        }
    }
}
