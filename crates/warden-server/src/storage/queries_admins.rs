//! Admin account queries.

use warden_core::db::unix_timestamp;

use super::db::{DatabaseError, WardenDatabase};
use super::models::{Admin, AdminRow, ContactKind, ContactRow, Contacts};

pub struct CreateAdminParams<'a> {
    pub id: i64,
    pub emails: &'a [String],
    pub phone_numbers: &'a [String],
    pub password_digest: &'a str,
    pub avatar_url: Option<&'a str>,
    pub countries: &'a [String],
    pub languages: &'a [String],
}

impl WardenDatabase {
    // =========================================================================
    // Admin queries
    // =========================================================================

    pub async fn create_admin(&self, params: &CreateAdminParams<'_>) -> Result<Admin, DatabaseError> {
        let now = unix_timestamp();
        let countries = serde_json::to_string(params.countries)?;
        let languages = serde_json::to_string(params.languages)?;

        let mut tx = self.pool().begin().await?;

        sqlx::query(
            "INSERT INTO admins (id, password_digest, avatar_url, countries, languages, \
             created_at, last_modified_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(params.id)
        .bind(params.password_digest)
        .bind(params.avatar_url)
        .bind(&countries)
        .bind(&languages)
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
                "INSERT INTO admin_contacts (value, admin_id, kind, position) VALUES (?, ?, ?, ?)",
            )
            .bind(value)
            .bind(params.id)
            .bind(kind.as_str())
            .bind(position)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        self.get_admin(params.id).await
    }

    pub async fn get_admin(&self, id: i64) -> Result<Admin, DatabaseError> {
        let row = sqlx::query_as::<_, AdminRow>("SELECT * FROM admins WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Admin {id}")))?;

        let rows = sqlx::query_as::<_, ContactRow>(
            "SELECT value, kind FROM admin_contacts WHERE admin_id = ? ORDER BY position",
        )
        .bind(id)
        .fetch_all(self.pool())
        .await?;

        row.into_admin(rows.into_iter().collect::<Contacts>())
    }

    pub async fn find_admin_by_contact(&self, value: &str) -> Result<Option<Admin>, DatabaseError> {
        let owner: Option<(i64,)> =
            sqlx::query_as("SELECT admin_id FROM admin_contacts WHERE value = ?")
                .bind(value)
                .fetch_optional(self.pool())
                .await?;

        match owner {
            Some((id,)) => self.get_admin(id).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn update_admin_password(
        &self,
        id: i64,
        password_digest: &str,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE admins SET password_digest = ?, last_modified_at = ? WHERE id = ?",
        )
        .bind(password_digest)
        .bind(unix_timestamp())
        .bind(id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Admin {id}")));
        }
        Ok(())
    }
}
