//! Random but well-formed customer data.

use customer_service::models::{Gender, NewCustomer};
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use secrecy::SecretString;
use uuid::Uuid;

const FIRST_NAMES: &[&str] = &[
    "Ada", "Alan", "Barbara", "Claude", "Donald", "Edsger", "Frances", "Grace", "Hedy", "Ivan",
    "Joan", "Ken", "Leslie", "Margaret", "Niklaus", "Radia", "Sophie", "Tony",
];

const LAST_NAMES: &[&str] = &[
    "Allen", "Backus", "Cerf", "Dijkstra", "Hamilton", "Hoare", "Hopper", "Kay", "Knuth",
    "Lamport", "Liskov", "Lovelace", "Perlman", "Ritchie", "Thompson", "Turing", "Wirth",
];

const EMAIL_DOMAINS: &[&str] = &["example.com", "example.org", "example.net"];

const GENDERS: &[Gender] = &[Gender::Male, Gender::Female, Gender::Unspecified];

/// Youngest and oldest generated age.
pub const AGE_RANGE: std::ops::RangeInclusive<i32> = 16..=99;

const PASSWORD_LEN: usize = 16;

/// Fake customer data generator.
#[derive(Debug)]
pub struct FakeData {
    rng: StdRng,
}

impl Default for FakeData {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeData {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Reproducible names, ages and genders. Emails stay unique.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn first_name(&mut self) -> String {
        pick(&mut self.rng, FIRST_NAMES).to_string()
    }

    pub fn last_name(&mut self) -> String {
        pick(&mut self.rng, LAST_NAMES).to_string()
    }

    pub fn full_name(&mut self) -> String {
        format!("{} {}", self.first_name(), self.last_name())
    }

    /// Unique per call.
    pub fn email(&mut self) -> String {
        let local = self.first_name().to_ascii_lowercase();
        let domain = pick(&mut self.rng, EMAIL_DOMAINS);
        format!("{}.{}@{}", local, Uuid::new_v4().simple(), domain)
    }

    pub fn age(&mut self) -> i32 {
        self.rng.gen_range(AGE_RANGE)
    }

    pub fn gender(&mut self) -> Gender {
        GENDERS
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(Gender::Unspecified)
    }

    pub fn password(&mut self) -> SecretString {
        let raw: String = (&mut self.rng)
            .sample_iter(&Alphanumeric)
            .take(PASSWORD_LEN)
            .map(char::from)
            .collect();
        SecretString::from(raw)
    }

    /// A complete registration payload.
    pub fn customer(&mut self) -> NewCustomer {
        NewCustomer {
            name: self.full_name(),
            email: self.email(),
            age: self.age(),
            gender: self.gender(),
        }
    }
}

fn pick<'a>(rng: &mut StdRng, values: &[&'a str]) -> &'a str {
    values.choose(rng).copied().unwrap_or_default()
}
