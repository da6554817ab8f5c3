pub mod driver;
pub mod notification;
pub mod order;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Caller roles as supplied by the upstream auth middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Vendor,
    Driver,
    Customer,
}

impl FromStr for Role {
    type Err = ();

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "vendor" => Ok(Role::Vendor),
            "driver" => Ok(Role::Driver),
            "customer" => Ok(Role::Customer),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Admin => "admin",
            Role::Vendor => "vendor",
            Role::Driver => "driver",
            Role::Customer => "customer",
        };
        f.write_str(name)
    }
}
