//! First-start seeding of the installation owner.

use chrono::Utc;
use tracing::info;
use validator::Validate;

use ident_slo::{errors::Code, Result};
use ident_storage::{
    user::{ListParams, Role, User},
    Interface, List,
};

/// Creates the owner account unless one already exists. Returns whether a
/// user was created.
pub async fn ensure_owner<S>(store: &S, email: &str, name: &str) -> Result<bool>
where
    S: Interface<T = User, L = ListParams> + ?Sized,
{
    let owners = ListParams {
        role: Some(Role::Owner),
        ..Default::default()
    };
    if store.count(&owners).await? > 0 {
        let mut existing = List::default();
        store.list(&owners, &mut existing).await?;
        if let Some(owner) = existing.data.first() {
            if !owner.email.eq_ignore_ascii_case(email) {
                info!(
                    owner = %owner.email,
                    "an owner already exists, {} was not seeded", email
                );
            }
        }
        return Ok(false);
    }

    let now = Utc::now().naive_utc();
    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        name: name.to_owned(),
        email: email.to_owned(),
        role: Role::Owner,
        created_at: now,
        updated_at: now,
    };
    user.validate().map_err(Code::Validates)?;
    store.put(&user).await?;
    info!(id = %user.id, email = %user.email, "owner seeded");
    Ok(true)
}
