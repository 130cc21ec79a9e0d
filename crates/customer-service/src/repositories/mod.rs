//! Repository layer for Customer Service.
//!
//! All queries use parameterized statements.

pub mod customers;

pub use customers::CustomersRepository;
