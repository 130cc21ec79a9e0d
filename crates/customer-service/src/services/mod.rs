//! Service layer for Customer Service.

pub mod customers;

pub use customers::CustomerService;
