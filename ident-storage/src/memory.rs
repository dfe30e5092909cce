//! Process-local stores used when no database is configured and in tests.

use std::{collections::BTreeMap, sync::RwLock};

use async_trait::async_trait;
use chrono::Utc;

use ident_slo::{errors, Result};

use crate::{
    key::Keys,
    user::{ListParams, User},
    Interface, KeyInterface, List,
};

#[derive(Debug, Default)]
pub struct KeyImpl {
    rows: RwLock<BTreeMap<String, Keys>>,
}

impl KeyImpl {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Interface for KeyImpl {
    type T = Keys;
    type L = ();

    #[tracing::instrument(skip_all)]
    async fn put(&self, input: &Self::T) -> Result<()> {
        let mut rows = self.rows.write().map_err(errors::any)?;
        rows.insert(input.id.clone(), input.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut rows = self.rows.write().map_err(errors::any)?;
        rows.remove(id);
        Ok(())
    }

    async fn get(&self, id: &str, output: &mut Self::T) -> Result<()> {
        let rows = self.rows.read().map_err(errors::any)?;
        *output = rows
            .get(id)
            .cloned()
            .ok_or_else(|| errors::not_found("no rows"))?;
        Ok(())
    }

    async fn list(
        &self,
        _opts: &Self::L,
        output: &mut List<Self::T>,
    ) -> Result<()> {
        let rows = self.rows.read().map_err(errors::any)?;
        output.data.extend(rows.values().cloned());
        output.total = rows.len() as i64;
        Ok(())
    }

    async fn count(&self, _opts: &Self::L) -> Result<i64> {
        let rows = self.rows.read().map_err(errors::any)?;
        Ok(rows.len() as i64)
    }
}

#[async_trait]
impl KeyInterface for KeyImpl {
    #[tracing::instrument(skip(self, input))]
    async fn swap(&self, input: &Keys, expected: Option<i64>) -> Result<bool> {
        let mut rows = self.rows.write().map_err(errors::any)?;
        let stored = rows.get(&input.id).map(|keys| keys.next_rotation);
        if stored != expected {
            return Ok(false);
        }
        rows.insert(input.id.clone(), input.clone());
        Ok(true)
    }
}

#[derive(Debug, Default)]
pub struct UserImpl {
    rows: RwLock<BTreeMap<String, User>>,
}

impl UserImpl {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Interface for UserImpl {
    type T = User;
    type L = ListParams;

    #[tracing::instrument(skip(self))]
    async fn put(&self, input: &Self::T) -> Result<()> {
        let mut rows = self.rows.write().map_err(errors::any)?;
        let now = Utc::now().naive_utc();
        let mut user = input.clone();
        user.created_at = rows
            .get(&input.id)
            .map(|old| old.created_at)
            .unwrap_or(now);
        user.updated_at = now;
        rows.insert(user.id.clone(), user);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut rows = self.rows.write().map_err(errors::any)?;
        rows.remove(id);
        Ok(())
    }

    async fn get(&self, id: &str, output: &mut Self::T) -> Result<()> {
        let rows = self.rows.read().map_err(errors::any)?;
        *output = rows
            .get(id)
            .cloned()
            .ok_or_else(|| errors::not_found("no rows"))?;
        Ok(())
    }

    async fn list(
        &self,
        opts: &Self::L,
        output: &mut List<Self::T>,
    ) -> Result<()> {
        let rows = self.rows.read().map_err(errors::any)?;
        output
            .data
            .extend(rows.values().filter(|u| opts.matches(u)).cloned());
        output.total = output.data.len() as i64;
        Ok(())
    }

    async fn count(&self, opts: &Self::L) -> Result<i64> {
        let rows = self.rows.read().map_err(errors::any)?;
        Ok(rows.values().filter(|u| opts.matches(u)).count() as i64)
    }
}
