//! Customer Service models.

use chrono::{DateTime, Utc};
use common::types::CustomerId;
use std::str::FromStr;

/// Customer gender as stored in the `customer.gender` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Male,
    Female,
    Unspecified,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "MALE",
            Gender::Female => "FEMALE",
            Gender::Unspecified => "UNSPECIFIED",
        }
    }
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MALE" => Ok(Gender::Male),
            "FEMALE" => Ok(Gender::Female),
            "UNSPECIFIED" => Ok(Gender::Unspecified),
            other => Err(format!("unknown gender '{}'", other)),
        }
    }
}

/// Customer database row.
#[derive(Debug, Clone)]
pub struct CustomerRow {
    pub id: CustomerId,
    pub name: String,
    pub email: String,
    /// Encoded password (never the raw value).
    pub password: String,
    pub age: i32,
    pub gender: Gender,
    /// Object key suffix of the profile image, once uploaded.
    pub profile_image_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when registering a customer.
#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub name: String,
    pub email: String,
    pub age: i32,
    pub gender: Gender,
}
