//! Customers repository for database operations.

use crate::errors::CustomerError;
use crate::models::{CustomerRow, Gender, NewCustomer};
use common::types::{CustomerId, ProfileImageId};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;

const CUSTOMER_COLUMNS: &str =
    "id, name, email, password, age, gender, profile_image_id, created_at";

/// Customers repository for database operations.
pub struct CustomersRepository;

impl CustomersRepository {
    /// Insert a customer with an already-encoded password.
    ///
    /// Returns `CustomerError::Conflict` if the email is taken.
    #[instrument(skip_all, name = "cs.repo.insert_customer")]
    pub async fn insert(
        pool: &PgPool,
        customer: &NewCustomer,
        encoded_password: &str,
    ) -> Result<CustomerRow, CustomerError> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO customer (name, email, password, age, gender)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {CUSTOMER_COLUMNS}
            "#
        ))
        .bind(&customer.name) // $1
        .bind(&customer.email) // $2
        .bind(encoded_password) // $3
        .bind(customer.age) // $4
        .bind(customer.gender.as_str()) // $5
        .fetch_one(pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                CustomerError::Conflict(format!("email {} already taken", customer.email))
            }
            _ => CustomerError::Database(e.to_string()),
        })?;

        map_row_to_customer(&row)
    }

    #[instrument(skip_all, name = "cs.repo.find_customer_by_id")]
    pub async fn find_by_id(
        pool: &PgPool,
        id: CustomerId,
    ) -> Result<Option<CustomerRow>, CustomerError> {
        let row = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customer WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(pool)
        .await?;

        row.as_ref().map(map_row_to_customer).transpose()
    }

    #[instrument(skip_all, name = "cs.repo.find_customer_by_email")]
    pub async fn find_by_email(
        pool: &PgPool,
        email: &str,
    ) -> Result<Option<CustomerRow>, CustomerError> {
        let row = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customer WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(pool)
        .await?;

        row.as_ref().map(map_row_to_customer).transpose()
    }

    #[instrument(skip_all, name = "cs.repo.list_customers")]
    pub async fn list(pool: &PgPool) -> Result<Vec<CustomerRow>, CustomerError> {
        let rows = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customer ORDER BY id"
        ))
        .fetch_all(pool)
        .await?;

        rows.iter().map(map_row_to_customer).collect()
    }

    #[instrument(skip_all, name = "cs.repo.count_customers")]
    pub async fn count(pool: &PgPool) -> Result<i64, CustomerError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customer")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }

    /// Record the profile image for a customer.
    ///
    /// Returns false if the customer does not exist.
    #[instrument(skip_all, name = "cs.repo.set_profile_image")]
    pub async fn set_profile_image_id(
        pool: &PgPool,
        id: CustomerId,
        image_id: ProfileImageId,
    ) -> Result<bool, CustomerError> {
        let result = sqlx::query("UPDATE customer SET profile_image_id = $1 WHERE id = $2")
            .bind(image_id.to_string())
            .bind(id.0)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}

/// Map a database row to a `CustomerRow`.
pub fn map_row_to_customer(row: &PgRow) -> Result<CustomerRow, CustomerError> {
    let gender: String = row.try_get("gender")?;

    Ok(CustomerRow {
        id: CustomerId(row.try_get("id")?),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        password: row.try_get("password")?,
        age: row.try_get("age")?,
        gender: gender.parse().map_err(CustomerError::Database)?,
        profile_image_id: row.try_get("profile_image_id")?,
        created_at: row.try_get("created_at")?,
    })
}
