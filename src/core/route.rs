// src/core/route.rs

//! Parsing and formatting of dotted routes (`serverType.service.method`).

use crate::core::errors::GarrisonError;
use std::fmt;

/// A parsed route addressing a handler somewhere in the cluster.
///
/// A two-segment route (`service.method`) addresses the local process and has
/// an empty `server_type`; three segments address a service class across the
/// cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    pub server_type: String,
    pub service: String,
    pub method: String,
}

impl Route {
    pub fn new(
        server_type: impl Into<String>,
        service: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            server_type: server_type.into(),
            service: service.into(),
            method: method.into(),
        }
    }

    /// Parses a dotted route string. Accepts `service.method` or
    /// `serverType.service.method`; anything else is rejected.
    pub fn parse(raw: &str) -> Result<Self, GarrisonError> {
        let parts: Vec<&str> = raw.split('.').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(GarrisonError::InvalidRoute(raw.to_string()));
        }
        match parts.as_slice() {
            [service, method] => Ok(Self::new("", *service, *method)),
            [server_type, service, method] => Ok(Self::new(*server_type, *service, *method)),
            _ => Err(GarrisonError::InvalidRoute(raw.to_string())),
        }
    }

    /// The route without its server type, e.g. `testsvc.method`. This is the
    /// form reported in route-not-found error metadata.
    pub fn short_name(&self) -> String {
        format!("{}.{}", self.service, self.method)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.server_type.is_empty() {
            write!(f, "{}.{}", self.service, self.method)
        } else {
            write!(f, "{}.{}.{}", self.server_type, self.service, self.method)
        }
    }
}
