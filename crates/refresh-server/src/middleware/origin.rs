//! Origin policy for the upgrade endpoint.

/// Which request origins may open a session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OriginPolicy {
    /// Accept every origin.
    #[default]
    Any,
    /// Accept only the listed origins (exact match).
    ///
    /// Requests without an `Origin` header are accepted, since only browsers
    /// send one.
    AllowList(Vec<String>),
}

impl OriginPolicy {
    /// Build a policy from configured origins. Empty means [`OriginPolicy::Any`].
    #[must_use]
    pub fn from_allowed(origins: Vec<String>) -> Self {
        if origins.is_empty() {
            Self::Any
        } else {
            Self::AllowList(origins)
        }
    }

    /// Returns `true` if a request with this `Origin` header may upgrade.
    pub fn allows(&self, origin: Option<&str>) -> bool {
        match (self, origin) {
            (Self::Any, _) | (Self::AllowList(_), None) => true,
            (Self::AllowList(allowed), Some(origin)) => allowed.iter().any(|a| a == origin),
        }
    }
}
