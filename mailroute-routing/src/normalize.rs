use serde::{Deserialize, Serialize};

/// How raw recipient addresses are folded into routing keys
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Sub-address delimiter, e.g. `+` turns `bob+tag@example.com` into
    /// `bob@example.com`. An empty delimiter is treated as unset.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub suffix_delimiter: Option<String>,

    /// Route on the local part only, dropping `@domain`.
    #[serde(default)]
    pub strip_domain: bool,
}

impl Policy {
    fn delimiter(&self) -> Option<&str> {
        self.suffix_delimiter
            .as_deref()
            .filter(|delimiter| !delimiter.is_empty())
    }
}

/// Derive the routing key for `raw` under `policy`.
///
/// The address is lower-cased and split at the first `@`. The sub-address
/// suffix is removed from the local part if a delimiter is configured, and the
/// domain is dropped if `strip_domain` is set. The result is stable under
/// repeated application.
pub fn normalize(raw: &str, policy: &Policy) -> String {
    let lowered = raw.to_lowercase();

    let (local, domain) = match lowered.split_once('@') {
        Some((local, domain)) => (local, Some(domain)),
        None => (lowered.as_str(), None),
    };

    let local = policy
        .delimiter()
        .and_then(|delimiter| local.split_once(delimiter))
        .map_or(local, |(prefix, _suffix)| prefix);

    match domain {
        Some(domain) if !policy.strip_domain => format!("{local}@{domain}"),
        _ => local.to_string(),
    }
}
