use async_trait::async_trait;
use jsonwebkey::JsonWebKey;
use sqlx::{mysql::MySqlRow, types::Json, MySqlPool, Row};

use ident_slo::{errors, Result};

use crate::{
    key::{Keys, VerificationKey},
    Interface, KeyInterface, List,
};

#[derive(Clone, Debug)]
pub struct KeyImpl {
    pool: MySqlPool,
}

impl KeyImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    fn from_row(row: &MySqlRow) -> Result<Keys> {
        Ok(Keys {
            id: row.try_get::<String, _>("id").map_err(errors::any)?,
            signing_key: row
                .try_get::<Json<JsonWebKey>, _>("signing_key")
                .map_err(errors::any)?
                .0,
            signing_key_pub: row
                .try_get::<Json<JsonWebKey>, _>("signing_key_pub")
                .map_err(errors::any)?
                .0,
            verification_keys: row
                .try_get::<Json<Vec<VerificationKey>>, _>("verification_keys")
                .map_err(errors::any)?
                .0,
            next_rotation: row
                .try_get::<i64, _>("next_rotation")
                .map_err(errors::any)?,
        })
    }
}

#[async_trait]
impl Interface for KeyImpl {
    type T = Keys;
    type L = ();

    #[tracing::instrument(skip_all)]
    async fn put(&self, nk: &Self::T) -> Result<()> {
        sqlx::query(
            r#"REPLACE INTO `key`
            (`id`,`verification_keys`,`signing_key`,`signing_key_pub`,`next_rotation`)
            VALUES(?,?,?,?,?);"#,
        )
        .bind(&nk.id)
        .bind(Json(&nk.verification_keys))
        .bind(Json(&nk.signing_key))
        .bind(Json(&nk.signing_key_pub))
        .bind(nk.next_rotation)
        .execute(&self.pool)
        .await
        .map_err(errors::any)?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query(r#"DELETE FROM `key` WHERE `id` = ?;"#)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(errors::any)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, output))]
    async fn get(&self, id: &str, output: &mut Self::T) -> Result<()> {
        let row = sqlx::query(
            r#"SELECT `id`,`verification_keys`,`signing_key`,`signing_key_pub`,`next_rotation`
            FROM `key`
            WHERE `id` = ?;"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(errors::any)?
        .ok_or_else(|| errors::not_found("no rows"))?;
        *output = Self::from_row(&row)?;
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    async fn list(
        &self,
        _opts: &Self::L,
        output: &mut List<Self::T>,
    ) -> Result<()> {
        let rows = sqlx::query(
            r#"SELECT `id`,`verification_keys`,`signing_key`,`signing_key_pub`,`next_rotation`
            FROM `key`
            ORDER BY `id`;"#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(errors::any)?;
        for row in rows.iter() {
            output.data.push(Self::from_row(row)?);
        }
        output.total = output.data.len() as i64;
        Ok(())
    }

    async fn count(&self, _opts: &Self::L) -> Result<i64> {
        sqlx::query(r#"SELECT COUNT(*) as count FROM `key`;"#)
            .fetch_one(&self.pool)
            .await
            .map_err(errors::any)?
            .try_get::<i64, _>("count")
            .map_err(errors::any)
    }
}

#[async_trait]
impl KeyInterface for KeyImpl {
    #[tracing::instrument(skip(self, nk))]
    async fn swap(&self, nk: &Keys, expected: Option<i64>) -> Result<bool> {
        let result = match expected {
            None => sqlx::query(
                r#"INSERT IGNORE INTO `key`
                (`id`,`verification_keys`,`signing_key`,`signing_key_pub`,`next_rotation`)
                VALUES(?,?,?,?,?);"#,
            )
            .bind(&nk.id)
            .bind(Json(&nk.verification_keys))
            .bind(Json(&nk.signing_key))
            .bind(Json(&nk.signing_key_pub))
            .bind(nk.next_rotation),
            Some(next_rotation) => sqlx::query(
                r#"UPDATE `key` SET
                `verification_keys` = ?,`signing_key` = ?,`signing_key_pub` = ?,`next_rotation` = ?
                WHERE `id` = ? AND `next_rotation` = ?;"#,
            )
            .bind(Json(&nk.verification_keys))
            .bind(Json(&nk.signing_key))
            .bind(Json(&nk.signing_key_pub))
            .bind(nk.next_rotation)
            .bind(&nk.id)
            .bind(next_rotation),
        }
        .execute(&self.pool)
        .await
        .map_err(errors::any)?;

        Ok(result.rows_affected() == 1)
    }
}
