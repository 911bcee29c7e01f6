//! Holder account queries.

use warden_core::db::unix_timestamp;

use super::db::{DatabaseError, WardenDatabase};
use super::models::{ContactKind, ContactRow, Contacts, Holder, HolderRow};

/// Parameters for [`WardenDatabase::create_holder`].
pub struct CreateHolderParams<'a> {
    pub id: i64,
    pub emails: &'a [String],
    pub phone_numbers: &'a [String],
    pub password_digest: &'a str,
    pub avatar_url: Option<&'a str>,
    pub countries: &'a [String],
    pub languages: &'a [String],
    pub confirmation_code: &'a str,
}

/// Full replacement of the editable profile fields.
pub struct UpdateHolderProfileParams<'a> {
    pub avatar_url: Option<&'a str>,
    pub countries: &'a [String],
    pub languages: &'a [String],
}

impl WardenDatabase {
    // =========================================================================
    // Holder queries
    // =========================================================================

    /// Insert a holder and its contacts atomically.
    ///
    /// A contact already owned by another holder fails the whole insert with
    /// [`DatabaseError::UniqueViolation`].
    pub async fn create_holder(
        &self,
        params: &CreateHolderParams<'_>,
    ) -> Result<Holder, DatabaseError> {
        let now = unix_timestamp();
        let countries = serde_json::to_string(params.countries)?;
        let languages = serde_json::to_string(params.languages)?;

        let mut tx = self.pool().begin().await?;

        sqlx::query(
            "INSERT INTO holders (id, password_digest, avatar_url, countries, languages, \
             confirmed, confirmation_code, created_at, last_modified_at) \
             VALUES (?, ?, ?, ?, ?, 0, ?, ?, ?)",
        )
        .bind(params.id)
        .bind(params.password_digest)
        .bind(params.avatar_url)
        .bind(&countries)
        .bind(&languages)
        .bind(params.confirmation_code)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let contacts = params
            .emails
            .iter()
            .map(|v| (v, ContactKind::Email))
            .chain(params.phone_numbers.iter().map(|v| (v, ContactKind::Phone)));
        for (position, (value, kind)) in contacts.enumerate() {
            #[allow(clippy::cast_possible_wrap)]
            let position = position as i64;
            sqlx::query(
                "INSERT INTO holder_contacts (value, holder_id, kind, position) VALUES (?, ?, ?, ?)",
            )
            .bind(value)
            .bind(params.id)
            .bind(kind.as_str())
            .bind(position)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        self.get_holder(params.id).await
    }

    /// Get a holder by ID.
    pub async fn get_holder(&self, id: i64) -> Result<Holder, DatabaseError> {
        let row = sqlx::query_as::<_, HolderRow>("SELECT * FROM holders WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Holder {id}")))?;

        let contacts = self.holder_contacts(id).await?;
        row.into_holder(contacts)
    }

    async fn holder_contacts(&self, holder_id: i64) -> Result<Contacts, DatabaseError> {
        let rows = sqlx::query_as::<_, ContactRow>(
            "SELECT value, kind FROM holder_contacts WHERE holder_id = ? ORDER BY position",
        )
        .bind(holder_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().collect())
    }

    /// Find the holder owning an email or phone number.
    pub async fn find_holder_by_contact(&self, value: &str) -> Result<Option<Holder>, DatabaseError> {
        let owner: Option<(i64,)> =
            sqlx::query_as("SELECT holder_id FROM holder_contacts WHERE value = ?")
                .bind(value)
                .fetch_optional(self.pool())
                .await?;

        match owner {
            Some((id,)) => self.get_holder(id).await.map(Some),
            None => Ok(None),
        }
    }

    /// Return the subset of `values` already owned by some holder, in input order.
    pub async fn holder_contacts_in_use(
        &self,
        values: &[String],
    ) -> Result<Vec<String>, DatabaseError> {
        let mut in_use = Vec::new();
        for value in values {
            let hit: Option<(String,)> =
                sqlx::query_as("SELECT value FROM holder_contacts WHERE value = ?")
                    .bind(value)
                    .fetch_optional(self.pool())
                    .await?;
            if hit.is_some() {
                in_use.push(value.clone());
            }
        }
        Ok(in_use)
    }

    /// Replace the confirmation code and clear the confirmed flag.
    pub async fn reset_holder_confirmation(
        &self,
        id: i64,
        confirmation_code: &str,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE holders SET confirmation_code = ?, confirmed = 0, last_modified_at = ? \
             WHERE id = ?",
        )
        .bind(confirmation_code)
        .bind(unix_timestamp())
        .bind(id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Holder {id}")));
        }
        Ok(())
    }

    pub async fn mark_holder_confirmed(&self, id: i64) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE holders SET confirmed = 1, last_modified_at = ? WHERE id = ?",
        )
        .bind(unix_timestamp())
        .bind(id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Holder {id}")));
        }
        Ok(())
    }

    pub async fn update_holder_password(
        &self,
        id: i64,
        password_digest: &str,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE holders SET password_digest = ?, last_modified_at = ? WHERE id = ?",
        )
        .bind(password_digest)
        .bind(unix_timestamp())
        .bind(id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Holder {id}")));
        }
        Ok(())
    }

    pub async fn update_holder_profile(
        &self,
        id: i64,
        params: &UpdateHolderProfileParams<'_>,
    ) -> Result<Holder, DatabaseError> {
        let result = sqlx::query(
            "UPDATE holders SET avatar_url = ?, countries = ?, languages = ?, \
             last_modified_at = ? WHERE id = ?",
        )
        .bind(params.avatar_url)
        .bind(serde_json::to_string(params.countries)?)
        .bind(serde_json::to_string(params.languages)?)
        .bind(unix_timestamp())
        .bind(id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Holder {id}")));
        }
        self.get_holder(id).await
    }

    /// Delete a holder. Contacts, sessions and owned nodes cascade.
    ///
    /// Returns `true` if a row was deleted.
    pub async fn delete_holder(&self, id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM holders WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
