use std::{collections::HashMap, sync::Arc};

use crate::{
    endpoint::BackendEndpoint,
    error::RoutingError,
    normalize::{Policy, normalize},
};

/// Backend name which refuses delivery outright with a temporary failure
pub const REJECT: &str = "reject";

/// The result of looking a recipient up in the table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Deliver via the named backend
    Backend(Arc<str>),
    /// Policy says no; answer with a temporary failure and connect nowhere
    Reject,
}

impl Route {
    /// Interpret a backend name from the routing file, honouring [`REJECT`]
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case(REJECT) {
            Self::Reject
        } else {
            Self::Backend(Arc::from(name))
        }
    }
}

/// An immutable routing snapshot.
///
/// A new table is built for every reload and swapped in whole; nothing
/// mutates a table once it has been published.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    users: HashMap<String, Route>,
    fallback: Option<Route>,
    policy: Policy,
    backends: HashMap<String, BackendEndpoint>,
}

impl RoutingTable {
    pub fn new(
        users: HashMap<String, Route>,
        fallback: Option<Route>,
        policy: Policy,
        backends: HashMap<String, BackendEndpoint>,
    ) -> Self {
        Self {
            users,
            fallback,
            policy,
            backends,
        }
    }

    /// The normalisation policy recipients must be folded with before lookup
    #[inline]
    pub const fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Number of configured user entries
    #[inline]
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Number of configured backends
    #[inline]
    pub fn backend_count(&self) -> usize {
        self.backends.len()
    }

    /// Fold a raw recipient into this table's lookup key
    pub fn key_for(&self, recipient: &str) -> String {
        normalize(recipient, &self.policy)
    }

    /// Look up the route for an already normalised key.
    ///
    /// Exact user match first, then the fallback.
    ///
    /// # Errors
    /// [`RoutingError::NoBackend`] if neither matches
    pub fn resolve_backend(&self, key: &str) -> Result<Route, RoutingError> {
        self.users
            .get(key)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| RoutingError::NoBackend(key.to_string()))
    }

    /// Look up how to reach a named backend
    ///
    /// # Errors
    /// [`RoutingError::UnknownBackend`] if the name is not defined
    pub fn resolve_endpoint(&self, name: &str) -> Result<&BackendEndpoint, RoutingError> {
        self.backends
            .get(name)
            .ok_or_else(|| RoutingError::UnknownBackend(name.to_string()))
    }

    /// Routes naming a backend that is not defined.
    pub(crate) fn dangling_routes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.users
            .iter()
            .map(|(user, route)| (user.as_str(), route))
            .chain(self.fallback.iter().map(|route| ("<fallback>", route)))
            .filter_map(|(user, route)| match route {
                Route::Backend(name) if !self.backends.contains_key(name.as_ref()) => {
                    Some((user, name.as_ref()))
                }
                _ => None,
            })
    }
}
