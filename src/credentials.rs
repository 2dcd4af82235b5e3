//! Credential lookup and refresh.
//!
//! Lookup order: active credential bound to the specialist, then the most
//! recently created active global credential. Tokens expiring within the
//! buffer window are refreshed through the provider's token endpoint and
//! persisted before use.

use chrono::{Duration, Utc};

use crate::db::{self, Pool};
use crate::logger::{LogCategory, SyncLogger};
use crate::model::Credential;
use crate::provider::{CalendarService, SyncError};

/// Refresh when the access token expires within this many minutes.
const EXPIRY_BUFFER_MINS: i64 = 5;

pub async fn resolve(
    pool: &Pool,
    provider: &dyn CalendarService,
    logger: &SyncLogger,
    specialist_id: i64,
) -> Result<Credential, SyncError> {
    let found = db::find_credential(pool, specialist_id)
        .await
        .map_err(SyncError::from)?;
    let Some(credential) = found else {
        logger.log(
            LogCategory::Info,
            format!("No active calendar credentials for specialist {specialist_id} (specialist or global)"),
        );
        return Err(SyncError::NoCredentials { specialist_id });
    };
    if credential.specialist_id.is_none() {
        logger.log(
            LogCategory::Info,
            format!("No specialist-bound credentials for specialist {specialist_id}, using global credentials"),
        );
    }
    ensure_fresh(pool, provider, logger, credential).await
}

/// Return the credential as-is while it is comfortably valid; otherwise
/// exchange the refresh token and persist the new access material.
async fn ensure_fresh(
    pool: &Pool,
    provider: &dyn CalendarService,
    logger: &SyncLogger,
    credential: Credential,
) -> Result<Credential, SyncError> {
    let Some(expires_at) = credential.expires_at else {
        return Ok(credential);
    };
    if expires_at > Utc::now() + Duration::minutes(EXPIRY_BUFFER_MINS) {
        return Ok(credential);
    }

    logger.log(
        LogCategory::Info,
        format!(
            "Access token expiring for credential {}, refreshing",
            credential.id
        ),
    );
    let refreshed = provider.refresh_credential(&credential.refresh_token).await?;
    let expires_at = Utc::now() + Duration::seconds(refreshed.expires_in);
    db::update_credential_tokens(pool, credential.id, &refreshed.access_token, expires_at)
        .await
        .map_err(SyncError::from)?;

    Ok(Credential {
        access_token: refreshed.access_token,
        expires_at: Some(expires_at),
        ..credential
    })
}
