use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::{mysql::MySqlRow, MySqlPool, Row};

use ident_slo::{errors, Result};

use crate::{
    user::{ListParams, Role, User},
    Interface, List,
};

#[derive(Clone, Debug)]
pub struct UserImpl {
    pool: MySqlPool,
}

impl UserImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    fn from_row(row: &MySqlRow) -> Result<User> {
        Ok(User {
            id: row.try_get("id").map_err(errors::any)?,
            name: row.try_get("name").map_err(errors::any)?,
            email: row.try_get("email").map_err(errors::any)?,
            role: row
                .try_get::<String, _>("role")
                .map_err(errors::any)?
                .parse::<Role>()
                .map_err(|err| errors::anyhow(anyhow::anyhow!(err)))?,
            created_at: row
                .try_get::<NaiveDateTime, _>("created_at")
                .map_err(errors::any)?,
            updated_at: row
                .try_get::<NaiveDateTime, _>("updated_at")
                .map_err(errors::any)?,
        })
    }

    fn wheres(opts: &ListParams) -> String {
        let mut wheres = String::from("`deleted_at` IS NULL");
        if opts.role.is_some() {
            wheres.push_str(" AND `role` = ?");
        }
        if opts.email.is_some() {
            wheres.push_str(" AND `email` = ?");
        }
        wheres
    }
}

#[async_trait]
impl Interface for UserImpl {
    type T = User;
    type L = ListParams;

    #[tracing::instrument(skip(self))]
    async fn put(&self, input: &Self::T) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO `user` (`id`,`name`,`email`,`role`)
            VALUES(?,?,?,?)
            ON DUPLICATE KEY UPDATE
            `name` = VALUES(`name`),`email` = VALUES(`email`),`role` = VALUES(`role`);"#,
        )
        .bind(&input.id)
        .bind(&input.name)
        .bind(&input.email)
        .bind(input.role.as_str())
        .execute(&self.pool)
        .await
        .map_err(errors::any)?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query(
            r#"UPDATE `user` SET `deleted_at` = now()
            WHERE `id` = ? AND `deleted_at` IS NULL;"#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(errors::any)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, output))]
    async fn get(&self, id: &str, output: &mut Self::T) -> Result<()> {
        let row = sqlx::query(
            r#"SELECT `id`,`name`,`email`,`role`,`created_at`,`updated_at`
            FROM `user`
            WHERE `id` = ? AND `deleted_at` IS NULL;"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(errors::any)?
        .ok_or_else(|| errors::not_found("no rows"))?;
        *output = Self::from_row(&row)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, output))]
    async fn list(
        &self,
        opts: &Self::L,
        output: &mut List<Self::T>,
    ) -> Result<()> {
        let sql = format!(
            r#"SELECT `id`,`name`,`email`,`role`,`created_at`,`updated_at`
            FROM `user`
            WHERE {}
            ORDER BY `created_at` ASC;"#,
            Self::wheres(opts),
        );
        let mut query = sqlx::query(&sql);
        if let Some(role) = opts.role {
            query = query.bind(role.as_str());
        }
        if let Some(ref email) = opts.email {
            query = query.bind(email);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(errors::any)?;
        for row in rows.iter() {
            output.data.push(Self::from_row(row)?);
        }
        output.total = output.data.len() as i64;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn count(&self, opts: &Self::L) -> Result<i64> {
        let sql = format!(
            r#"SELECT COUNT(*) as count FROM `user` WHERE {};"#,
            Self::wheres(opts),
        );
        let mut query = sqlx::query(&sql);
        if let Some(role) = opts.role {
            query = query.bind(role.as_str());
        }
        if let Some(ref email) = opts.email {
            query = query.bind(email);
        }
        query
            .fetch_one(&self.pool)
            .await
            .map_err(errors::any)?
            .try_get::<i64, _>("count")
            .map_err(errors::any)
    }
}
