//! Allow-list of service URL prefixes trusted as redirect targets.

use crate::error::ServiceError;

#[derive(Debug, Clone, Default)]
pub struct ServiceAllowList {
    prefixes: Vec<String>,
}

impl ServiceAllowList {
    /// Empty prefixes are dropped, they would match every URL.
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let prefixes = prefixes
            .into_iter()
            .map(Into::into)
            .filter(|prefix: &String| {
                if prefix.is_empty() {
                    tracing::warn!("ignoring empty entry in service allow-list");
                }
                !prefix.is_empty()
            })
            .collect();
        ServiceAllowList { prefixes }
    }

    /// Plain byte-prefix comparison, no normalization.
    pub fn is_allowed(&self, service: &str) -> bool {
        self.prefixes.iter().any(|prefix| service.starts_with(prefix.as_str()))
    }

    pub fn check<'a>(&self, service: Option<&'a str>) -> Result<&'a str, ServiceError> {
        match service {
            None | Some("") => Err(ServiceError::Missing),
            Some(service) if self.is_allowed(service) => Ok(service),
            Some(service) => Err(ServiceError::NotAllowed(service.to_owned())),
        }
    }
}
